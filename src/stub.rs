use crate::backend::{lock, Shared};
use crate::matcher::{self, BodyMatcher, UrlMatcher};
use crate::response::{Response, ResponseData};
use crate::transport::RequestBody;
use crate::{Error, ErrorKind};
use http::StatusCode;
use serde_json::Value;
use std::fmt;
use std::ops::Drop;
use std::sync::Arc;
use std::time::Duration;

///
/// Per-stub configuration. Stubs start from the backend defaults in effect when they are
/// created; options given to `StubBuilder::options` are merged over those.
///
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Options {
    /// How long a synthetic response waits before being delivered. Defaults to zero, which
    /// still defers delivery to the scheduler.
    pub delay: Option<Duration>,
}

impl Options {
    ///
    /// Sets the delivery delay.
    ///
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    ///
    /// Sets the delivery delay in milliseconds.
    ///
    pub fn delay_ms(self, millis: u64) -> Self {
        self.delay(Duration::from_millis(millis))
    }

    pub(crate) fn merge(&self, overrides: &Options) -> Options {
        Options {
            delay: overrides.delay.or(self.delay),
        }
    }

    pub(crate) fn effective_delay(&self) -> Duration {
        self.delay.unwrap_or(Duration::ZERO)
    }
}

///
/// A registered interaction: how requests are matched and what they receive.
///
#[derive(Clone, Debug, PartialEq)]
pub struct Stub {
    pub(crate) id: String,
    pub(crate) method: String,
    pub(crate) url: UrlMatcher,
    pub(crate) body: Option<BodyMatcher>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) expected: bool,
    pub(crate) response: Option<Response>,
    pub(crate) passthrough: bool,
    pub(crate) options: Options,
}

impl Stub {
    pub(crate) fn new(
        id: String,
        method: &str,
        url: UrlMatcher,
        expected: bool,
        options: Options,
    ) -> Stub {
        Stub {
            id,
            method: method.to_uppercase(),
            url,
            body: None,
            headers: Vec::new(),
            expected,
            response: None,
            passthrough: false,
            options,
        }
    }

    ///
    /// The uppercase HTTP method.
    ///
    pub fn method(&self) -> &str {
        &self.method
    }

    ///
    /// Whether this is a one-shot expectation rather than a background stub.
    ///
    pub fn is_expected(&self) -> bool {
        self.expected
    }

    ///
    /// Whether matched requests are forwarded to the real transport.
    ///
    pub fn is_passthrough(&self) -> bool {
        self.passthrough
    }

    ///
    /// The options in effect for this stub.
    ///
    pub fn options(&self) -> &Options {
        &self.options
    }

    pub(crate) fn matches(
        &self,
        method: &str,
        url: &str,
        body: Option<&RequestBody>,
        headers: &[(String, String)],
    ) -> bool {
        self.url.matches(url)
            && self.method.eq_ignore_ascii_case(method)
            && matcher::headers_match(&self.headers, headers)
            && self
                .body
                .as_ref()
                .map_or(true, |matcher| matcher.matches(body))
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.response.is_some() || self.passthrough
    }
}

impl fmt::Display for Stub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.expected {
            f.write_str("(expecting) ")?;
        }

        write!(f, "{} {}", self.method, self.url)?;

        if let Some(ref body) = self.body {
            write!(f, "\n{}", body)?;
        }

        if !self.headers.is_empty() {
            let headers: serde_json::Map<String, Value> = self
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), Value::String(value.clone())))
                .collect();
            write!(f, "\n{}", Value::Object(headers))?;
        }

        Ok(())
    }
}

///
/// Configures a registered stub. Returned by `Backend::when`, `Backend::expect` and the
/// `Backend::expect_*` shortcuts.
///
/// The stub takes part in matching as soon as it is registered, but a request matching it fails
/// with `ErrorKind::IncompleteStub` until one of the `respond*` methods or `passthrough` is
/// called.
///
pub struct StubBuilder {
    shared: Arc<Shared>,
    id: String,
    response_headers: Vec<(String, String)>,
    /// Used to warn of stubs dropped without a response
    completed: bool,
}

impl StubBuilder {
    pub(crate) fn new(shared: Arc<Shared>, id: String) -> StubBuilder {
        StubBuilder {
            shared,
            id,
            response_headers: Vec::new(),
            completed: false,
        }
    }

    fn update<F: FnOnce(&mut Stub)>(&self, f: F) {
        let mut state = lock(&self.shared.state);
        match state.registry.get_mut(&self.id) {
            Some(stub) => f(stub),
            None => log::debug!("stub {} is no longer registered", self.id),
        }
    }

    ///
    /// Only match requests with this body.
    ///
    /// ## Example
    ///
    /// ```
    /// use serde_json::json;
    ///
    /// let backend = httpbackend::Backend::new();
    ///
    /// backend
    ///     .when("POST", "api/login")
    ///     .match_body(json!({"username": "bob"}))
    ///     .respond(json!({"token": "1234"}));
    /// ```
    ///
    pub fn match_body<M: Into<BodyMatcher>>(self, body: M) -> Self {
        let body = body.into();
        self.update(|stub| stub.body = Some(body));
        self
    }

    ///
    /// Only match requests carrying this header with this exact value. Other request headers
    /// are ignored and the header name is compared as-is.
    ///
    pub fn match_header(self, field: &str, value: &str) -> Self {
        self.update(|stub| stub.headers.push((field.to_owned(), value.to_owned())));
        self
    }

    ///
    /// Overrides the backend defaults for this stub only.
    ///
    /// ## Example
    ///
    /// ```
    /// use httpbackend::Options;
    /// use serde_json::json;
    ///
    /// let backend = httpbackend::Backend::new();
    ///
    /// backend
    ///     .when("GET", "fixtures/data.json")
    ///     .options(Options::default().delay_ms(550))
    ///     .respond(json!({"test": "oh my glob"}));
    /// ```
    ///
    pub fn options(self, options: Options) -> Self {
        self.update(|stub| stub.options = stub.options.merge(&options));
        self
    }

    ///
    /// Responds with `200` and the given data. Strings are delivered verbatim, any other value is
    /// serialized to JSON.
    ///
    pub fn respond<D: Into<ResponseData>>(self, data: D) -> Self {
        self.set_response(StatusCode::OK, data.into())
    }

    ///
    /// Responds with the given status code and data.
    ///
    #[track_caller]
    pub fn respond_with_status<D: Into<ResponseData>>(self, status: u16, data: D) -> Self {
        let status = StatusCode::from_u16(status)
            .map_err(|_| Error::new_with_context(ErrorKind::InvalidStatusCode, status))
            .unwrap();

        self.set_response(status, data.into())
    }

    ///
    /// Responds with `200` and data computed from the request body and headers every time the
    /// stub matches.
    ///
    /// ## Example
    ///
    /// ```
    /// use serde_json::json;
    ///
    /// let backend = httpbackend::Backend::new();
    ///
    /// backend
    ///     .when("POST", "api/echo")
    ///     .respond_from_request(|body, _headers| {
    ///         json!({ "echo": body.map(|b| b.to_string()) })
    ///     });
    /// ```
    ///
    pub fn respond_from_request(
        self,
        callback: impl Fn(Option<&RequestBody>, &[(String, String)]) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.set_response(StatusCode::OK, ResponseData::Computed(Arc::new(callback)))
    }

    ///
    /// Adds a header to the synthetic response.
    ///
    pub fn with_response_header(mut self, field: &str, value: &str) -> Self {
        let header = (field.to_owned(), value.to_owned());
        self.response_headers.push(header.clone());
        self.update(|stub| {
            if let Some(ref mut response) = stub.response {
                response.headers.push(header);
            }
        });
        self
    }

    ///
    /// Forwards matched requests to the real transport instead of responding.
    ///
    pub fn passthrough(mut self) -> Self {
        self.update(|stub| stub.passthrough = true);
        self.completed = true;
        self
    }

    fn set_response(mut self, status: StatusCode, data: ResponseData) -> Self {
        let response = Response {
            status,
            headers: self.response_headers.clone(),
            data,
        };
        self.update(|stub| stub.response = Some(response));
        self.completed = true;
        self
    }
}

impl Drop for StubBuilder {
    fn drop(&mut self) {
        if self.completed {
            return;
        }

        let state = lock(&self.shared.state);
        if let Some(stub) = state.registry.get(&self.id) {
            log::warn!(
                "Missing .respond() or .passthrough() call on stub {}",
                stub
            );
        }
    }
}

impl fmt::Debug for StubBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StubBuilder")
            .field("id", &self.id)
            .field("completed", &self.completed)
            .finish()
    }
}
