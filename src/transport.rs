use crate::Error;
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;

///
/// The lifecycle stage of a request object.
///
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    /// Nothing happened yet.
    #[default]
    Unsent = 0,
    /// `open` was called.
    Opened = 1,
    /// The response status and headers are available.
    HeadersReceived = 2,
    /// The response body is being received.
    Loading = 3,
    /// The request completed.
    Done = 4,
}

///
/// The observable fields of a request object.
///
/// This is also the explicit list of fields mirrored from a real transport onto a fake request
/// once a passthrough request completes.
///
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResponseState {
    /// The current lifecycle stage
    pub ready_state: ReadyState,
    /// The response status, `0` until a response was received
    pub status: u16,
    /// The response payload
    pub response: Option<String>,
    /// The response payload as text
    pub response_text: Option<String>,
    /// The response headers, in the order they were received
    pub headers: Vec<(String, String)>,
}

impl ResponseState {
    ///
    /// Renders the response headers as `name: value` lines.
    ///
    pub fn all_headers(&self) -> String {
        self.headers
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect::<Vec<String>>()
            .join("\n")
    }

    ///
    /// Looks up a response header by its exact name.
    ///
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.to_owned())
    }
}

///
/// A function invoked by a request object when it changes state.
///
pub type Callback = Box<dyn FnMut(&ResponseState) + Send + 'static>;

///
/// The payload passed to `send`.
///
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    /// A structured payload
    Json(Value),
    /// A raw payload, possibly holding serialized JSON
    Text(String),
}

/// The outcome of decoding a request body before matching it.
#[derive(Debug, PartialEq)]
pub(crate) enum DecodedBody<'a> {
    /// The body is structured or is text holding valid JSON
    Structured(Cow<'a, Value>),
    /// The body is text that isn't valid JSON
    Raw(&'a str),
}

impl RequestBody {
    ///
    /// Returns true for payloads that count as "no body": empty text or `null`.
    ///
    pub fn is_empty(&self) -> bool {
        match self {
            RequestBody::Json(value) => value.is_null(),
            RequestBody::Text(text) => text.is_empty(),
        }
    }

    ///
    /// Returns the payload as text, serializing structured values.
    ///
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            RequestBody::Json(value) => Cow::Owned(value.to_string()),
            RequestBody::Text(text) => Cow::Borrowed(text),
        }
    }

    pub(crate) fn decode(&self) -> DecodedBody<'_> {
        match self {
            RequestBody::Json(value) => DecodedBody::Structured(Cow::Borrowed(value)),
            RequestBody::Text(text) => match serde_json::from_str::<Value>(text) {
                Ok(value) => DecodedBody::Structured(Cow::Owned(value)),
                Err(_) => DecodedBody::Raw(text),
            },
        }
    }
}

impl fmt::Display for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        RequestBody::Json(value)
    }
}

impl<'a> From<&'a str> for RequestBody {
    fn from(value: &str) -> Self {
        RequestBody::Text(value.to_owned())
    }
}

impl From<String> for RequestBody {
    fn from(value: String) -> Self {
        RequestBody::Text(value)
    }
}

///
/// The request object contract.
///
/// Both the fake requests handed out by a `Backend` and real network transports implement it,
/// so code under test can be written against `Transport` and receive either one through a
/// `TransportFactory`.
///
/// Implementations use interior mutability and must never hold an internal lock while invoking
/// a callback: callbacks are allowed to call back into the same object.
///
pub trait Transport: Send + Sync {
    /// Sets the method and URL of the request.
    fn open(&self, method: &str, url: &str);

    /// Adds a request header.
    fn set_request_header(&self, name: &str, value: &str);

    /// Issues the request.
    fn send(&self, body: Option<RequestBody>) -> Result<(), Error>;

    /// Cancels the request.
    fn abort(&self);

    /// Renders all response headers as `name: value` lines.
    fn get_all_response_headers(&self) -> String;

    /// Looks up a single response header.
    fn get_response_header(&self, name: &str) -> Option<String>;

    /// Overrides the MIME type used to interpret the response.
    fn override_mime_type(&self, mime: &str);

    /// Returns a snapshot of the observable fields.
    fn state(&self) -> ResponseState;

    /// Sets the function called whenever the ready state changes.
    fn on_ready_state_change(&self, callback: Callback);

    /// Sets the function called once the request completes.
    fn on_load(&self, callback: Callback);

    /// Sets the function called when the request is aborted.
    fn on_abort(&self, callback: Callback);
}

///
/// Creates request objects. Production code receives one of these instead of building its
/// transport directly.
///
pub trait TransportFactory: Send + Sync {
    /// Returns a fresh request object.
    fn create(&self) -> Box<dyn Transport>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_body_holding_json_is_structured() {
        let body = RequestBody::from(r#"{"reno": "911"}"#);

        assert_eq!(
            DecodedBody::Structured(Cow::Owned(json!({"reno": "911"}))),
            body.decode()
        );
    }

    #[test]
    fn test_text_body_holding_plain_text_is_raw() {
        let body = RequestBody::from("hello=world");

        assert_eq!(DecodedBody::Raw("hello=world"), body.decode());
    }

    #[test]
    fn test_empty_bodies() {
        assert!(RequestBody::from("").is_empty());
        assert!(RequestBody::from(Value::Null).is_empty());
        assert!(!RequestBody::from(json!({})).is_empty());
    }

    #[test]
    fn test_all_headers() {
        let state = ResponseState {
            headers: vec![
                ("content-type".to_string(), "application/json".to_string()),
                ("x-api-key".to_string(), "1234".to_string()),
            ],
            ..Default::default()
        };

        assert_eq!(
            "content-type: application/json\nx-api-key: 1234",
            state.all_headers()
        );
        assert_eq!(Some("1234".to_string()), state.header("x-api-key"));
        assert_eq!(None, state.header("X-Api-Key"));
    }
}
