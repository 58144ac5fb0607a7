use crate::glob;
use crate::transport::{DecodedBody, RequestBody};
use assert_json_diff::{assert_json_matches_no_panic, CompareMode};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::convert::From;
use std::fmt;

///
/// Matches the URL of a request, either by a glob or by a custom regular expression.
///
/// Globs are anchored: `fixtures/*.json` matches `fixtures/data.json` but not
/// `other/fixtures/data.json`. A custom regular expression is used as-is.
///
#[derive(Clone, Debug)]
pub enum UrlMatcher {
    /// A glob pattern along with its compiled form
    Glob(String, Regex),
    /// A custom regular expression
    Regex(Regex),
}

impl UrlMatcher {
    pub(crate) fn matches(&self, url: &str) -> bool {
        match self {
            UrlMatcher::Glob(_, ref regex) | UrlMatcher::Regex(ref regex) => regex.is_match(url),
        }
    }
}

impl<'a> From<&'a str> for UrlMatcher {
    fn from(value: &str) -> Self {
        UrlMatcher::Glob(value.to_owned(), glob::compile(value))
    }
}

impl From<String> for UrlMatcher {
    fn from(value: String) -> Self {
        let regex = glob::compile(&value);
        UrlMatcher::Glob(value, regex)
    }
}

impl From<Regex> for UrlMatcher {
    fn from(value: Regex) -> Self {
        UrlMatcher::Regex(value)
    }
}

impl PartialEq for UrlMatcher {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (UrlMatcher::Glob(ref a, _), UrlMatcher::Glob(ref b, _)) => a == b,
            (UrlMatcher::Regex(ref a), UrlMatcher::Regex(ref b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl fmt::Display for UrlMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlMatcher::Glob(ref glob, _) => write!(f, "{}", glob),
            UrlMatcher::Regex(ref regex) => write!(f, "{} (regex)", regex.as_str()),
        }
    }
}

///
/// Matches the body of a request.
///
/// Text bodies holding valid JSON are parsed before being compared to the `Json` and
/// `PartialJson` matchers; any other text is compared as a JSON string.
///
#[derive(Clone, PartialEq, Debug)]
pub enum BodyMatcher {
    /// Matches a structurally equal JSON body. There's also an implementation of `From<Value>`
    /// and `From<&str>` to keep things simple.
    Json(Value),
    /// Matches a body containing at least the given JSON
    PartialJson(Value),
    /// Matches the body text by a regular expression
    Regex(String),
    /// Matches a URL-encoded key/value pair, where both key and value should be specified
    /// in plain (unencoded) format
    UrlEncoded(String, String),
}

impl From<Value> for BodyMatcher {
    fn from(value: Value) -> Self {
        BodyMatcher::Json(value)
    }
}

impl<'a> From<&'a str> for BodyMatcher {
    fn from(value: &str) -> Self {
        BodyMatcher::Json(Value::String(value.to_owned()))
    }
}

impl fmt::Display for BodyMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyMatcher::Json(Value::String(ref text)) => write!(f, "{}", text),
            BodyMatcher::Json(ref value) => write!(f, "{}", value),
            BodyMatcher::PartialJson(ref value) => write!(f, "{} (partial json)", value),
            BodyMatcher::Regex(ref value) => write!(f, "{} (regex)", value),
            BodyMatcher::UrlEncoded(ref field, ref value) => {
                write!(f, "{}={} (urlencoded)", field, value)
            }
        }
    }
}

impl BodyMatcher {
    pub(crate) fn matches(&self, body: Option<&RequestBody>) -> bool {
        let Some(body) = body else {
            return false;
        };

        match self {
            BodyMatcher::Json(ref expected) => match body.decode() {
                DecodedBody::Structured(actual) => *expected == *actual,
                DecodedBody::Raw(text) => expected.as_str() == Some(text),
            },
            BodyMatcher::PartialJson(ref expected) => match body.decode() {
                DecodedBody::Structured(actual) => {
                    let config = assert_json_diff::Config::new(CompareMode::Inclusive);
                    assert_json_matches_no_panic(actual.as_ref(), expected, config).is_ok()
                }
                DecodedBody::Raw(_) => false,
            },
            BodyMatcher::Regex(ref regex) => Regex::new(regex)
                .map(|regex| regex.is_match(&body.text()))
                .unwrap_or(false),
            BodyMatcher::UrlEncoded(ref expected_field, ref expected_value) => {
                serde_urlencoded::from_str::<HashMap<String, String>>(&body.text())
                    .map(|params: HashMap<_, _>| {
                        params.into_iter().any(|(ref field, ref value)| {
                            field == expected_field && value == expected_value
                        })
                    })
                    .unwrap_or(false)
            }
        }
    }
}

///
/// Every expected header has to be present with an identical value. Additional request headers
/// are ignored and header names are compared as-is.
///
pub(crate) fn headers_match(expected: &[(String, String)], actual: &[(String, String)]) -> bool {
    expected.iter().all(|(name, value)| {
        actual
            .iter()
            .any(|(field, actual_value)| field == name && actual_value == value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn headers(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn test_url_glob_matcher() {
        let matcher = UrlMatcher::from("fixtures/*.json");

        assert!(matcher.matches("fixtures/data.json"));
        assert!(!matcher.matches("fixtures/data.xml"));
        assert_eq!("fixtures/*.json", matcher.to_string());
    }

    #[test]
    fn test_url_regex_matcher_is_used_as_is() {
        let matcher = UrlMatcher::from(Regex::new(r"users/\d+").unwrap());

        assert!(matcher.matches("/api/users/42/profile"));
        assert!(!matcher.matches("/api/users/bob"));
        assert_eq!(r"users/\d+ (regex)", matcher.to_string());
    }

    #[test]
    fn test_json_matcher_against_structured_body() {
        let matcher = BodyMatcher::from(json!({"reno": "911"}));

        assert!(matcher.matches(Some(&RequestBody::from(json!({"reno": "911"})))));
        assert!(!matcher.matches(Some(&RequestBody::from(json!({"reno": "912"})))));
    }

    #[test]
    fn test_json_matcher_parses_text_bodies() {
        let matcher = BodyMatcher::from(json!({"yes": true}));

        assert!(matcher.matches(Some(&RequestBody::from(r#"{ "yes": true }"#))));
        assert!(!matcher.matches(Some(&RequestBody::from(r#"{"yes": false}"#))));
    }

    #[test]
    fn test_json_matcher_compares_raw_text_literally() {
        let matcher = BodyMatcher::from("hello world");

        assert!(matcher.matches(Some(&RequestBody::from("hello world"))));
        assert!(!matcher.matches(Some(&RequestBody::from("hello"))));
    }

    #[test]
    fn test_body_matcher_requires_a_body() {
        let matcher = BodyMatcher::from(json!({"a": 1}));

        assert!(!matcher.matches(None));
    }

    #[test]
    fn test_partial_json_matcher() {
        let matcher = BodyMatcher::PartialJson(json!({"user": {"name": "bob"}}));

        assert!(matcher.matches(Some(&RequestBody::from(
            json!({"user": {"name": "bob", "age": 31}, "token": "x"})
        ))));
        assert!(!matcher.matches(Some(&RequestBody::from(json!({"user": {"name": "alice"}})))));
        assert!(!matcher.matches(Some(&RequestBody::from("name=bob"))));
    }

    #[test]
    fn test_regex_body_matcher() {
        let matcher = BodyMatcher::Regex("^hello".to_string());

        assert!(matcher.matches(Some(&RequestBody::from("hello world"))));
        assert!(!matcher.matches(Some(&RequestBody::from("world hello"))));
    }

    #[test]
    fn test_urlencoded_body_matcher() {
        let matcher = BodyMatcher::UrlEncoded("greeting".to_string(), "good day".to_string());

        assert!(matcher.matches(Some(&RequestBody::from("hello=world&greeting=good%20day"))));
        assert!(!matcher.matches(Some(&RequestBody::from("greeting=bad%20day"))));
    }

    #[test]
    fn test_headers_match_is_a_subset_match() {
        let expected = headers(&[("X-test", "correct")]);

        assert!(headers_match(
            &expected,
            &headers(&[("Accept", "*/*"), ("X-test", "correct")])
        ));
        assert!(!headers_match(&expected, &headers(&[("X-test", "wrong")])));
        assert!(!headers_match(&expected, &headers(&[("x-test", "correct")])));
        assert!(!headers_match(&expected, &[]));
        assert!(headers_match(&[], &headers(&[("X-test", "anything")])));
    }
}
