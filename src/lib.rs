#![warn(missing_docs)]

//!
//! Httpbackend is a fake HTTP backend for tests. Code under test creates its request objects
//! through a `TransportFactory`; in tests that factory is a `Backend`, which answers requests
//! from registered stubs instead of the network.
//!
//! Synthetic responses are delivered after a configurable delay, on the test's own tokio runtime
//! or on a background one, or right away when the test calls `Backend::flush`.
//!
//! # Getting Started
//!
//! Write the code under test against the `Transport` contract and let it receive a
//! `TransportFactory`. Production code hands it an `HttpClient`, tests hand it a `Backend`.
//!
//! ## Example
//!
//! ```
//! use httpbackend::{Backend, Transport, TransportFactory};
//! use serde_json::json;
//! use std::sync::{Arc, Mutex};
//!
//! fn fetch_user(factory: &dyn TransportFactory, name: Arc<Mutex<String>>) {
//!     let xhr = factory.create();
//!     xhr.open("GET", "/user");
//!     xhr.on_load(Box::new(move |state| {
//!         *name.lock().unwrap() = state.response_text.clone().unwrap_or_default();
//!     }));
//!     xhr.send(None).unwrap();
//! }
//!
//! let backend = Backend::new();
//! backend.when("GET", "/user").respond(json!({"name": "Bob"}));
//!
//! let name = Arc::new(Mutex::new(String::new()));
//! fetch_user(&backend, name.clone());
//! backend.flush();
//!
//! assert_eq!(r#"{"name":"Bob"}"#, *name.lock().unwrap());
//! backend.verify_no_outstanding_request().unwrap();
//! ```
//!
//! # Stubs and expectations
//!
//! `Backend::when` registers a background stub: it matches any number of requests and stays
//! around until `Backend::clear`. `Backend::expect` registers an expectation: it is consumed by
//! the first request it matches and `Backend::verify_no_outstanding_expectation` fails until
//! that happens.
//!
//! Stubs are matched in registration order, so register specific stubs before broad ones.
//!
//! ## Example
//!
//! ```
//! use httpbackend::{Backend, Transport};
//! use serde_json::json;
//!
//! let backend = Backend::new();
//! backend.expect_get("fixtures/foo.json").respond(json!({"test": "foo"}));
//! backend.when("GET", "fixtures/*.json").respond(json!({"ding": "dong"}));
//!
//! assert!(backend.verify_no_outstanding_expectation().is_err());
//!
//! let xhr = backend.request();
//! xhr.open("GET", "fixtures/foo.json");
//! xhr.send(None).unwrap();
//!
//! backend.verify_no_outstanding_expectation().unwrap();
//! ```
//!
//! # Matching
//!
//! URLs given as strings are globs (`*`, `?`, `[abc]`, `{a,b}`) matched against the whole
//! request URL. Pass a `regex::Regex` to use a pattern as-is.
//!
//! Methods are compared case-insensitively. Headers declared with `StubBuilder::match_header`
//! must be present on the request with the same value, other request headers are ignored.
//!
//! Bodies declared with `StubBuilder::match_body` are compared structurally. Text request
//! bodies holding JSON are parsed first, any other text is compared as a string. See
//! `BodyMatcher` for partial JSON, regex and form matching.
//!
//! ## Example
//!
//! ```
//! use httpbackend::{Backend, BodyMatcher};
//! use serde_json::json;
//!
//! let backend = Backend::new();
//!
//! backend
//!     .when("POST", "api/theanswer")
//!     .match_header("X-test", "correct")
//!     .match_body(json!({"yes": true}))
//!     .respond_with_status(201, json!({"answer": 42}));
//!
//! backend
//!     .when("POST", "api/login")
//!     .match_body(BodyMatcher::PartialJson(json!({"username": "bob"})))
//!     .respond(json!({"token": "1234"}));
//! ```
//!
//! # Non-matching calls
//!
//! Sending a request no stub matches fails right away with `ErrorKind::UnmatchedRequest`. The
//! error message carries the method, the URL and the body, if any.
//!
//! ## Example
//!
//! ```
//! use httpbackend::{Backend, ErrorKind, Transport};
//! use serde_json::json;
//!
//! let backend = Backend::new();
//!
//! let xhr = backend.request();
//! xhr.open("POST", "api/login");
//! let err = xhr
//!     .send(Some(json!({"username": "bob", "password": "open-seasame"}).into()))
//!     .unwrap_err();
//!
//! assert_eq!(ErrorKind::UnmatchedRequest, err.kind);
//! assert_eq!(
//!     r#"Unexpected request: POST api/login
//! {"username":"bob","password":"open-seasame"}"#,
//!     err.to_string()
//! );
//! ```
//!
//! # Delays
//!
//! Responses are delivered after the stub's delay, zero by default. A zero delay still defers
//! the delivery, callbacks never run inside `send`.
//!
//! Inside `#[tokio::test]` deliveries run on the test's runtime, so they only happen once the
//! test awaits. Plain `#[test]` functions have no runtime and deliveries run on a background
//! thread instead, where a zero-delay response may arrive before the test reaches its next
//! line. Such tests should set a delay when they assert on pending requests.
//!
//! The delay is taken from the backend defaults when the stub is created, and can be
//! overridden per stub with `StubBuilder::options`.
//!
//! ## Example
//!
//! ```
//! use httpbackend::{Backend, Options};
//! use serde_json::json;
//!
//! let backend = Backend::new();
//! backend.set_defaults(Options::default().delay_ms(100));
//!
//! // delivered after 100ms
//! backend.when("GET", "/slow").respond(json!({}));
//!
//! // delivered after 550ms
//! backend
//!     .when("GET", "/slower")
//!     .options(Options::default().delay_ms(550))
//!     .respond(json!({}));
//! ```
//!
//! # Passthrough
//!
//! Requests matching a stub configured with `StubBuilder::passthrough` are forwarded to a real
//! transport. By default that's an `HttpClient`, use `BackendOpts` to set its base URL or to
//! inject another `TransportFactory`.
//!
//! ## Example
//!
//! ```
//! use httpbackend::{Backend, BackendOpts};
//!
//! let opts = BackendOpts {
//!     base_url: Some("http://127.0.0.1:1234".to_string()),
//!     ..Default::default()
//! };
//! let backend = Backend::new_with_opts(opts);
//!
//! backend.when("GET", "assets/*").passthrough();
//! ```
//!
//! # Cleaning up
//!
//! `Backend::verify_no_outstanding_expectation` and `Backend::verify_no_outstanding_request`
//! are meant to run at the end of a test. `Backend::clear` drops every stub and every pending
//! request without delivering it.
//!
//! ## Example
//!
//! ```
//! use httpbackend::{Backend, Options, Transport};
//! use serde_json::json;
//!
//! let backend = Backend::new();
//! backend.set_defaults(Options::default().delay_ms(1000));
//! backend.when("GET", "/user").respond(json!({"name": "Bob"}));
//!
//! let xhr = backend.request();
//! xhr.open("GET", "/user");
//! xhr.send(None).unwrap();
//!
//! assert_eq!(
//!     "Expected no outstanding requests, but there were 1\nGET /user -> 200",
//!     backend.verify_no_outstanding_request().unwrap_err().to_string()
//! );
//!
//! backend.clear();
//! backend.verify_no_outstanding_request().unwrap();
//! ```
//!
//! # Debug
//!
//! Httpbackend uses the `log` crate. Matches, scheduled deliveries and passthrough requests are
//! logged at debug level. Stub builders dropped without a response are logged as warnings.
//!
//! ```sh
//! RUST_LOG=httpbackend=debug cargo test
//! ```
//!
pub use backend::{Backend, BackendOpts};
pub use error::{Error, ErrorKind};
pub use http_transport::{HttpClient, HttpTransport};
pub use matcher::{BodyMatcher, UrlMatcher};
pub use request::FakeRequest;
pub use response::ResponseData;
pub use stub::{Options, Stub, StubBuilder};
pub use transport::{Callback, ReadyState, RequestBody, ResponseState, Transport, TransportFactory};

mod backend;
mod error;
mod glob;
mod http_transport;
mod matcher;
mod pending;
mod registry;
mod request;
mod response;
mod scheduler;
mod stub;
mod transport;
