use crate::backend::lock;
use crate::scheduler::Scheduler;
use crate::transport::{
    Callback, ReadyState, RequestBody, ResponseState, Transport, TransportFactory,
};
use crate::{Error, ErrorKind};
use bytes::Bytes;
use http::{Method, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

type HyperClient = Client<HttpConnector, Full<Bytes>>;

///
/// Creates `HttpTransport` objects: real HTTP/1 requests performed with hyper on a background
/// runtime.
///
/// This is what production code should be handed instead of a `Backend`, and what a `Backend`
/// uses for passthrough stubs unless told otherwise.
///
pub struct HttpClient {
    handle: Handle,
    // shared by every transport, so connections are pooled
    client: HyperClient,
    base_url: Option<String>,
    // keeps the runtime alive when the client owns it
    _scheduler: Option<Arc<Scheduler>>,
}

impl HttpClient {
    ///
    /// Starts a client with its own background runtime.
    ///
    pub fn new() -> Result<HttpClient, Error> {
        let scheduler = Scheduler::start()?;

        Ok(HttpClient {
            handle: scheduler.handle(),
            client: Client::builder(TokioExecutor::new()).build_http(),
            base_url: None,
            _scheduler: Some(Arc::new(scheduler)),
        })
    }

    ///
    /// Resolves relative request URLs against `base_url`.
    ///
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.to_owned());
        self
    }

    pub(crate) fn with_handle(handle: Handle, base_url: Option<String>) -> HttpClient {
        HttpClient {
            handle,
            client: Client::builder(TokioExecutor::new()).build_http(),
            base_url,
            _scheduler: None,
        }
    }
}

impl TransportFactory for HttpClient {
    fn create(&self) -> Box<dyn Transport> {
        Box::new(HttpTransport::new(
            self.handle.clone(),
            self.client.clone(),
            self.base_url.clone(),
        ))
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Default)]
struct Inner {
    method: String,
    url: String,
    headers: Vec<(String, String)>,
    mime_type: Option<String>,
    state: ResponseState,
    on_ready_state_change: Option<Callback>,
    on_load: Option<Callback>,
    on_abort: Option<Callback>,
    task: Option<AbortHandle>,
}

#[derive(Clone, Copy)]
enum Slot {
    ReadyStateChange,
    Load,
    Abort,
}

impl Inner {
    fn slot(&mut self, slot: Slot) -> &mut Option<Callback> {
        match slot {
            Slot::ReadyStateChange => &mut self.on_ready_state_change,
            Slot::Load => &mut self.on_load,
            Slot::Abort => &mut self.on_abort,
        }
    }
}

///
/// A real HTTP request object.
///
pub struct HttpTransport {
    handle: Handle,
    client: HyperClient,
    base_url: Option<String>,
    inner: Arc<Mutex<Inner>>,
}

impl HttpTransport {
    fn new(handle: Handle, client: HyperClient, base_url: Option<String>) -> HttpTransport {
        HttpTransport {
            handle,
            client,
            base_url,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    fn resolve_url(&self, url: &str) -> String {
        match self.base_url {
            Some(ref base) if !url.starts_with("http://") && !url.starts_with("https://") => {
                format!(
                    "{}/{}",
                    base.trim_end_matches('/'),
                    url.trim_start_matches('/')
                )
            }
            _ => url.to_owned(),
        }
    }

    fn build_request(
        &self,
        inner: &Inner,
        body: Option<RequestBody>,
    ) -> Result<Request<Full<Bytes>>, Error> {
        let method = Method::from_bytes(inner.method.as_bytes())
            .map_err(|err| Error::new_with_context(ErrorKind::TransportFailure, err))?;
        let uri: Uri = self
            .resolve_url(&inner.url)
            .parse()
            .map_err(|err| Error::new_with_context(ErrorKind::TransportFailure, err))?;

        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in &inner.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let body = body
            .map(|body| Bytes::from(body.text().into_owned()))
            .unwrap_or_default();

        builder
            .body(Full::new(body))
            .map_err(|err| Error::new_with_context(ErrorKind::TransportFailure, err))
    }
}

// Invokes a callback with no lock held, then puts it back unless it was replaced meanwhile.
fn notify(inner: &Mutex<Inner>, slot: Slot, state: &ResponseState) {
    let callback = lock(inner).slot(slot).take();

    if let Some(mut callback) = callback {
        callback(state);

        let mut inner = lock(inner);
        let current = inner.slot(slot);
        if current.is_none() {
            *current = Some(callback);
        }
    }
}

fn finish(inner: &Mutex<Inner>, state: ResponseState) {
    {
        let mut inner = lock(inner);
        inner.state = state.clone();
        inner.task = None;
    }

    notify(inner, Slot::ReadyStateChange, &state);
    notify(inner, Slot::Load, &state);
}

async fn perform(
    client: HyperClient,
    request: Request<Full<Bytes>>,
) -> Result<ResponseState, Error> {
    let response: http::Response<Incoming> = client
        .request(request)
        .await
        .map_err(|err| Error::new_with_context(ErrorKind::TransportFailure, err))?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_owned(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();

    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|err| Error::new_with_context(ErrorKind::TransportFailure, err))?
        .to_bytes();
    let text = String::from_utf8_lossy(&body).into_owned();

    Ok(ResponseState {
        ready_state: ReadyState::Done,
        status,
        response: Some(text.clone()),
        response_text: Some(text),
        headers,
    })
}

impl Transport for HttpTransport {
    fn open(&self, method: &str, url: &str) {
        let state = {
            let mut inner = lock(&self.inner);
            inner.method = method.to_owned();
            inner.url = url.to_owned();
            inner.state = ResponseState {
                ready_state: ReadyState::Opened,
                ..Default::default()
            };
            inner.state.clone()
        };

        notify(&self.inner, Slot::ReadyStateChange, &state);
    }

    fn set_request_header(&self, name: &str, value: &str) {
        lock(&self.inner)
            .headers
            .push((name.to_owned(), value.to_owned()));
    }

    fn send(&self, body: Option<RequestBody>) -> Result<(), Error> {
        let mut inner = lock(&self.inner);
        if inner.state.ready_state != ReadyState::Opened || inner.task.is_some() {
            return Err(Error::new_with_context(
                ErrorKind::InvalidState,
                "send() requires an opened request",
            ));
        }

        let request = self.build_request(&inner, body)?;
        if let Some(ref mime_type) = inner.mime_type {
            log::debug!("interpreting the response to {} as {}", inner.url, mime_type);
        }

        let shared = self.inner.clone();
        let client = self.client.clone();
        let task = self.handle.spawn(async move {
            let state = match perform(client, request).await {
                Ok(state) => state,
                Err(err) => {
                    log::warn!("{}", err);
                    ResponseState {
                        ready_state: ReadyState::Done,
                        ..Default::default()
                    }
                }
            };

            finish(&shared, state);
        });

        inner.task = Some(task.abort_handle());
        Ok(())
    }

    fn abort(&self) {
        let state = {
            let mut inner = lock(&self.inner);
            let Some(task) = inner.task.take() else {
                return;
            };
            task.abort();
            inner.state = ResponseState::default();
            inner.state.clone()
        };

        notify(&self.inner, Slot::Abort, &state);
    }

    fn get_all_response_headers(&self) -> String {
        lock(&self.inner).state.all_headers()
    }

    fn get_response_header(&self, name: &str) -> Option<String> {
        let inner = lock(&self.inner);
        inner
            .state
            .headers
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.to_owned())
    }

    fn override_mime_type(&self, mime: &str) {
        lock(&self.inner).mime_type = Some(mime.to_owned());
    }

    fn state(&self) -> ResponseState {
        lock(&self.inner).state.clone()
    }

    fn on_ready_state_change(&self, callback: Callback) {
        *lock(&self.inner).slot(Slot::ReadyStateChange) = Some(callback);
    }

    fn on_load(&self, callback: Callback) {
        *lock(&self.inner).slot(Slot::Load) = Some(callback);
    }

    fn on_abort(&self, callback: Callback) {
        *lock(&self.inner).slot(Slot::Abort) = Some(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_urls_are_joined_with_the_base_url() {
        let client = HttpClient::new()
            .unwrap()
            .with_base_url("http://127.0.0.1:8080/");
        let transport = HttpTransport::new(
            client.handle.clone(),
            client.client.clone(),
            client.base_url.clone(),
        );

        assert_eq!(
            "http://127.0.0.1:8080/fixtures/data.json",
            transport.resolve_url("fixtures/data.json")
        );
        assert_eq!(
            "http://127.0.0.1:8080/user",
            transport.resolve_url("/user")
        );
        assert_eq!(
            "http://example.com/user",
            transport.resolve_url("http://example.com/user")
        );
    }

    #[test]
    fn test_send_requires_open() {
        let client = HttpClient::new().unwrap();
        let transport = client.create();

        let err = transport.send(None).unwrap_err();
        assert_eq!(ErrorKind::InvalidState, err.kind);
    }

    #[test]
    fn test_invalid_urls_fail_synchronously() {
        let client = HttpClient::new().unwrap();
        let transport = client.create();

        transport.open("GET", "not a url");
        let err = transport.send(None).unwrap_err();
        assert_eq!(ErrorKind::TransportFailure, err.kind);
    }
}
