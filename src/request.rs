use crate::backend::{lock, Shared};
use crate::pending::PendingEntry;
use crate::stub::Stub;
use crate::transport::{Callback, ReadyState, RequestBody, ResponseState, Transport};
use crate::{Error, ErrorKind};
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Created,
    Opened,
    Resolving,
    Delegating,
    Completed,
    Aborted,
}

struct Inner {
    phase: Phase,
    method: String,
    url: String,
    headers: Vec<(String, String)>,
    stub: Option<Stub>,
    state: ResponseState,
    on_ready_state_change: Option<Callback>,
    on_load: Option<Callback>,
    on_abort: Option<Callback>,
}

impl Inner {
    // the ready state callback wins over the load callback, only one of them fires
    fn take_completion_callback(&mut self) -> Option<Callback> {
        self.on_ready_state_change
            .take()
            .or_else(|| self.on_load.take())
    }

    fn is_passthrough(&self) -> bool {
        self.stub.as_ref().map_or(false, Stub::is_passthrough)
    }
}

///
/// A fake request object handed out by a `Backend`.
///
/// It implements the same `Transport` contract as a real transport. On `send` it looks for a
/// matching stub and either schedules a synthetic response or forwards the request to the real
/// transport it was created with.
///
/// Clones share the same underlying request.
///
/// ## Example
///
/// ```
/// use httpbackend::{Backend, Transport};
/// use serde_json::json;
///
/// let backend = Backend::new();
/// backend.when("GET", "/user").respond(json!({"name": "Bob"}));
///
/// let xhr = backend.request();
/// xhr.open("GET", "/user");
/// xhr.send(None).unwrap();
///
/// backend.flush();
/// assert_eq!(Some(r#"{"name":"Bob"}"#.to_string()), xhr.response_text());
/// ```
///
#[derive(Clone)]
pub struct FakeRequest {
    inner: Arc<Mutex<Inner>>,
    shared: Weak<Shared>,
    transport: Arc<dyn Transport>,
}

impl FakeRequest {
    pub(crate) fn new(shared: Weak<Shared>, transport: Box<dyn Transport>) -> FakeRequest {
        let inner = Inner {
            phase: Phase::Created,
            method: String::new(),
            url: String::new(),
            headers: Vec::new(),
            stub: None,
            state: ResponseState::default(),
            on_ready_state_change: None,
            on_load: None,
            on_abort: None,
        };

        FakeRequest {
            inner: Arc::new(Mutex::new(inner)),
            shared,
            transport: Arc::from(transport),
        }
    }

    ///
    /// The current ready state.
    ///
    pub fn ready_state(&self) -> ReadyState {
        lock(&self.inner).state.ready_state
    }

    ///
    /// The response status, `0` until the request was resolved.
    ///
    pub fn status(&self) -> u16 {
        lock(&self.inner).state.status
    }

    ///
    /// The response payload.
    ///
    pub fn response(&self) -> Option<String> {
        lock(&self.inner).state.response.clone()
    }

    ///
    /// The response payload as text.
    ///
    pub fn response_text(&self) -> Option<String> {
        lock(&self.inner).state.response_text.clone()
    }

    fn describe(&self, inner: &Inner) -> String {
        format!("{} {} -> {}", inner.method, inner.url, inner.state.status)
    }

    pub(crate) fn same_request(&self, other: &FakeRequest) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    ///
    /// Marks a scheduled request as completed. Returns `None` if it was aborted or already
    /// completed, in which case no callback must fire.
    ///
    pub(crate) fn complete(&self) -> Option<ResponseState> {
        let mut inner = lock(&self.inner);
        if inner.phase != Phase::Resolving {
            return None;
        }

        inner.phase = Phase::Completed;
        Some(inner.state.clone())
    }

    fn send_fake(&self, shared: &Shared, stub: Stub, body: Option<RequestBody>) {
        // computed responses run user code, so no lock is held while rendering
        let headers = lock(&self.inner).headers.clone();
        let Some(response) = stub.response.clone() else {
            return;
        };
        let text = response.data.render(body.as_ref(), &headers);
        let delay = stub.options.effective_delay();

        let callback = {
            let mut inner = lock(&self.inner);
            inner.state = ResponseState {
                ready_state: ReadyState::Done,
                status: response.status.as_u16(),
                response: text.clone(),
                response_text: text,
                headers: response.headers.clone(),
            };
            inner.stub = Some(stub);
            inner.phase = Phase::Resolving;
            inner.take_completion_callback()
        };

        // the entry is added under the same lock the delivery needs, so it can't fire first
        let mut state = lock(&shared.state);
        let request = self.clone();
        let backend = self.shared.clone();
        let handle = shared.scheduler.schedule(delay, move || {
            if let Some(shared) = backend.upgrade() {
                shared.deliver(&request);
            }
        });

        log::debug!("scheduled {} in {:?}", self, delay);
        state
            .pending
            .add(PendingEntry::new(handle, self.clone(), callback));
    }

    fn send_real(&self, stub: Stub, body: Option<RequestBody>) -> Result<(), Error> {
        let (method, url, headers, from_ready_state, callback) = {
            let mut inner = lock(&self.inner);
            inner.stub = Some(stub);
            inner.phase = Phase::Delegating;
            let from_ready_state = inner.on_ready_state_change.is_some();
            let callback = inner.take_completion_callback();
            (
                inner.method.clone(),
                inner.url.clone(),
                inner.headers.clone(),
                from_ready_state,
                callback,
            )
        };

        let fake = self.inner.clone();
        let captured = Arc::new(Mutex::new(callback));
        let completion = captured.clone();
        self.transport
            .on_ready_state_change(Box::new(move |state: &ResponseState| {
                if state.ready_state != ReadyState::Done {
                    return;
                }

                {
                    let mut inner = lock(&fake);
                    if inner.phase != Phase::Delegating {
                        return;
                    }
                    inner.phase = Phase::Completed;
                    inner.state = state.clone();
                }

                let callback = lock(&completion).take();
                if let Some(mut callback) = callback {
                    callback(state);
                }
            }));

        log::debug!("passing {} {} through to the real transport", method, url);

        self.transport.open(&method, &url);
        for (name, value) in &headers {
            self.transport.set_request_header(name, value);
        }

        let result = self.transport.send(body);
        if let Err(ref err) = result {
            log::debug!("real transport refused {} {}: {}", method, url, err);

            let callback = lock(&captured).take();
            let mut inner = lock(&self.inner);
            if inner.phase == Phase::Delegating {
                inner.phase = Phase::Opened;
                inner.stub = None;
            }
            if let Some(callback) = callback {
                let slot = if from_ready_state {
                    &mut inner.on_ready_state_change
                } else {
                    &mut inner.on_load
                };
                if slot.is_none() {
                    *slot = Some(callback);
                }
            }
        }

        result
    }
}

impl Transport for FakeRequest {
    ///
    /// Captures the method and URL. Re-opening before `send` overwrites them; opening a request
    /// that is still in flight is ignored.
    ///
    fn open(&self, method: &str, url: &str) {
        let mut inner = lock(&self.inner);
        if matches!(inner.phase, Phase::Resolving | Phase::Delegating) {
            log::debug!("ignoring open() on in-flight request {} {}", method, url);
            return;
        }

        inner.method = method.to_owned();
        inner.url = url.to_owned();
        inner.stub = None;
        inner.state = ResponseState::default();
        inner.phase = Phase::Opened;
    }

    fn set_request_header(&self, name: &str, value: &str) {
        let mut inner = lock(&self.inner);
        match inner.headers.iter_mut().find(|(field, _)| field == name) {
            Some(header) => header.1 = value.to_owned(),
            None => inner.headers.push((name.to_owned(), value.to_owned())),
        }
    }

    fn send(&self, body: Option<RequestBody>) -> Result<(), Error> {
        let body = body.filter(|body| !body.is_empty());

        let (method, url, headers) = {
            let inner = lock(&self.inner);
            match inner.phase {
                Phase::Opened => {}
                Phase::Created => {
                    return Err(Error::new_with_context(
                        ErrorKind::InvalidState,
                        "send() called before open()",
                    ))
                }
                _ => {
                    return Err(Error::new_with_context(
                        ErrorKind::InvalidState,
                        format!("send() called twice on {}", self.describe(&inner)),
                    ))
                }
            }
            (
                inner.method.clone(),
                inner.url.clone(),
                inner.headers.clone(),
            )
        };

        let shared = self.shared.upgrade().ok_or_else(|| {
            Error::new_with_context(ErrorKind::InvalidState, "the backend was dropped")
        })?;

        let matched = lock(&shared.state)
            .registry
            .match_request(&method, &url, body.as_ref(), &headers);

        let Some(stub) = matched else {
            let mut context = format!("{} {}", method, url);
            if let Some(ref body) = body {
                context.push('\n');
                context.push_str(&body.text());
            }
            return Err(Error::new_with_context(
                ErrorKind::UnmatchedRequest,
                context,
            ));
        };

        if !stub.is_complete() {
            return Err(Error::new_with_context(ErrorKind::IncompleteStub, &stub));
        }

        log::debug!("matched {} {} against {}", method, url, stub);

        if stub.passthrough {
            self.send_real(stub, body)
        } else {
            self.send_fake(&shared, stub, body);
            Ok(())
        }
    }

    fn abort(&self) {
        let phase = {
            let mut inner = lock(&self.inner);
            let phase = inner.phase;
            if !matches!(phase, Phase::Resolving | Phase::Delegating) {
                return;
            }
            inner.phase = Phase::Aborted;
            phase
        };

        if phase == Phase::Delegating {
            self.transport.abort();
            return;
        }

        if let Some(shared) = self.shared.upgrade() {
            lock(&shared.state).pending.remove(self);
        }

        let (on_abort, state) = {
            let mut inner = lock(&self.inner);
            (inner.on_abort.take(), inner.state.clone())
        };

        if let Some(mut on_abort) = on_abort {
            on_abort(&state);

            let mut inner = lock(&self.inner);
            if inner.on_abort.is_none() {
                inner.on_abort = Some(on_abort);
            }
        }
    }

    fn get_all_response_headers(&self) -> String {
        let inner = lock(&self.inner);
        if inner.is_passthrough() {
            drop(inner);
            return self.transport.get_all_response_headers();
        }

        inner.state.all_headers()
    }

    fn get_response_header(&self, name: &str) -> Option<String> {
        let inner = lock(&self.inner);
        if inner.is_passthrough() {
            drop(inner);
            return self.transport.get_response_header(name);
        }

        inner.state.header(name)
    }

    fn override_mime_type(&self, mime: &str) {
        self.transport.override_mime_type(mime);
    }

    fn state(&self) -> ResponseState {
        lock(&self.inner).state.clone()
    }

    fn on_ready_state_change(&self, callback: Callback) {
        lock(&self.inner).on_ready_state_change = Some(callback);
    }

    fn on_load(&self, callback: Callback) {
        lock(&self.inner).on_load = Some(callback);
    }

    fn on_abort(&self, callback: Callback) {
        lock(&self.inner).on_abort = Some(callback);
    }
}

impl fmt::Display for FakeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.write_str(&self.describe(&inner))
    }
}

impl fmt::Debug for FakeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FakeRequest").field(&self.to_string()).finish()
    }
}
