use crate::transport::RequestBody;
use http::StatusCode;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Response {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub data: ResponseData,
}

type DataFn = dyn Fn(Option<&RequestBody>, &[(String, String)]) -> Value + Send + Sync + 'static;

///
/// The payload of a synthetic response: either a fixed value or one computed from the request
/// body and headers when the response is delivered.
///
#[derive(Clone)]
pub enum ResponseData {
    /// A fixed value
    Literal(Value),
    /// A value computed for every matched request
    Computed(Arc<DataFn>),
}

impl fmt::Debug for ResponseData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ResponseData::Literal(ref value) => value.fmt(f),
            ResponseData::Computed(_) => f.write_str("<callback>"),
        }
    }
}

impl PartialEq for ResponseData {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ResponseData::Literal(ref a), ResponseData::Literal(ref b)) => a == b,
            (ResponseData::Computed(ref a), ResponseData::Computed(ref b)) => std::ptr::eq(
                a.as_ref() as *const DataFn as *const u8,
                b.as_ref() as *const DataFn as *const u8,
            ),
            _ => false,
        }
    }
}

impl From<Value> for ResponseData {
    fn from(value: Value) -> Self {
        ResponseData::Literal(value)
    }
}

impl<'a> From<&'a str> for ResponseData {
    fn from(value: &str) -> Self {
        ResponseData::Literal(Value::String(value.to_owned()))
    }
}

impl From<String> for ResponseData {
    fn from(value: String) -> Self {
        ResponseData::Literal(Value::String(value))
    }
}

impl ResponseData {
    ///
    /// Produces the response text. Strings are used verbatim, `null` yields no payload and any
    /// other value is serialized to JSON.
    ///
    pub(crate) fn render(
        &self,
        body: Option<&RequestBody>,
        headers: &[(String, String)],
    ) -> Option<String> {
        let value = match self {
            ResponseData::Literal(ref value) => value.clone(),
            ResponseData::Computed(ref data_fn) => data_fn(body, headers),
        };

        match value {
            Value::Null => None,
            Value::String(text) => Some(text),
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structured_values_are_serialized() {
        let data = ResponseData::from(json!({"name": "Bob", "tags": [1, 2]}));

        assert_eq!(
            Some(r#"{"name":"Bob","tags":[1,2]}"#.to_string()),
            data.render(None, &[])
        );
    }

    #[test]
    fn test_strings_are_used_verbatim() {
        let data = ResponseData::from("hello!");

        assert_eq!(Some("hello!".to_string()), data.render(None, &[]));
    }

    #[test]
    fn test_null_yields_no_payload() {
        assert_eq!(None, ResponseData::from(Value::Null).render(None, &[]));
    }

    #[test]
    fn test_computed_values_see_the_request() {
        let data = ResponseData::Computed(Arc::new(|body, headers| {
            json!({
                "echo": body.map(|b| b.text().into_owned()),
                "headers": headers.len(),
            })
        }));
        let body = RequestBody::from("ping");
        let headers = vec![("X-test".to_string(), "1".to_string())];

        assert_eq!(
            Some(r#"{"echo":"ping","headers":1}"#.to_string()),
            data.render(Some(&body), &headers)
        );
    }
}
