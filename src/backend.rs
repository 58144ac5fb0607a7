use crate::http_transport::HttpClient;
use crate::matcher::UrlMatcher;
use crate::pending::PendingLedger;
use crate::registry::Registry;
use crate::request::FakeRequest;
use crate::scheduler::Scheduler;
use crate::stub::{Options, Stub, StubBuilder};
use crate::transport::{Transport, TransportFactory};
use crate::{Error, ErrorKind};
use std::cell::Cell;
use std::fmt;
use std::ops::Drop;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

thread_local! {
    static DELIVERING: Cell<bool> = const { Cell::new(false) };
}

#[derive(Debug, Default)]
pub(crate) struct State {
    pub(crate) registry: Registry,
    pub(crate) pending: PendingLedger,
    pub(crate) defaults: Options,
    // scheduled deliveries taken off the ledger whose callback is still running
    in_delivery: usize,
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<State>,
    pub(crate) scheduler: Scheduler,
    delivered: Condvar,
    transport: Arc<dyn TransportFactory>,
    assert_on_drop: bool,
}

impl Shared {
    ///
    /// Delivers the response of `request` once its delay elapsed, unless it was flushed, aborted
    /// or cleared in the meantime.
    ///
    pub(crate) fn deliver(&self, request: &FakeRequest) {
        let entry = {
            let mut state = lock(&self.state);
            let entry = state.pending.take(request);
            if entry.is_some() {
                state.in_delivery += 1;
            }
            entry
        };

        let Some(entry) = entry else {
            return;
        };

        let _guard = DeliveryGuard::enter(self);
        log::debug!("delivering {}", request);
        entry.resolve();
    }
}

// Keeps `flush` waiting until the callback returned, even if it panics.
struct DeliveryGuard<'a> {
    shared: &'a Shared,
}

impl<'a> DeliveryGuard<'a> {
    fn enter(shared: &'a Shared) -> DeliveryGuard<'a> {
        DELIVERING.with(|delivering| delivering.set(true));
        DeliveryGuard { shared }
    }
}

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        DELIVERING.with(|delivering| delivering.set(false));
        lock(&self.shared.state).in_delivery -= 1;
        self.shared.delivered.notify_all();
    }
}

// Held by `Backend` clones only, so the last clone going away checks the expectations on the
// dropping thread. Stub builders and scheduled deliveries keep `Shared` alive longer.
struct DropGuard {
    shared: Arc<Shared>,
}

impl Drop for DropGuard {
    fn drop(&mut self) {
        if !self.shared.assert_on_drop || thread::panicking() {
            return;
        }

        let result = verify_expectations(&lock(&self.shared.state));
        if let Err(err) = result {
            panic!("{}", err);
        }
    }
}

fn verify_expectations(state: &State) -> Result<(), Error> {
    let expected = state.registry.outstanding_expected();
    match expected.first() {
        Some(first) => Err(Error::new_with_context(
            ErrorKind::OutstandingExpectation,
            format!("{}\n{}", expected.len(), first),
        )),
        None => Ok(()),
    }
}

///
/// Options to configure a `Backend`, see `Backend::new_with_opts`.
///
#[derive(Clone, Default)]
pub struct BackendOpts {
    /// The defaults applied to every stub created afterwards
    pub defaults: Options,
    /// Joined with relative URLs when requests are passed through to the default HTTP transport
    pub base_url: Option<String>,
    /// Creates the real transports used for passthrough requests. Defaults to an `HttpClient`.
    pub transport: Option<Arc<dyn TransportFactory>>,
    /// Panic when the last clone of the backend is dropped while expectations are outstanding
    pub assert_on_drop: bool,
}

impl fmt::Debug for BackendOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendOpts")
            .field("defaults", &self.defaults)
            .field("base_url", &self.base_url)
            .field("transport", &self.transport.as_ref().map(|_| "<custom>"))
            .field("assert_on_drop", &self.assert_on_drop)
            .finish()
    }
}

///
/// A fake HTTP backend. Register stubs and expectations on it, hand it to the code under test as
/// its `TransportFactory` and drive the responses from the test.
///
/// Cloning a backend is cheap and every clone shares the same stubs and pending requests.
///
/// ## Example
///
/// ```
/// use httpbackend::{Backend, Options, Transport};
/// use serde_json::json;
///
/// let backend = Backend::new();
/// backend
///     .expect_get("fixtures/foo.json")
///     .options(Options::default().delay_ms(1000))
///     .respond(json!({"test": "foo"}));
///
/// let xhr = backend.request();
/// xhr.open("GET", "fixtures/foo.json");
/// xhr.send(None).unwrap();
///
/// assert!(backend.verify_no_outstanding_request().is_err());
/// backend.flush();
///
/// backend.verify_no_outstanding_request().unwrap();
/// backend.verify_no_outstanding_expectation().unwrap();
/// ```
///
#[derive(Clone)]
pub struct Backend {
    shared: Arc<Shared>,
    _guard: Arc<DropGuard>,
}

impl Backend {
    ///
    /// Starts a new backend with the default options.
    ///
    /// Panics if the background runtime can't be started, see `Backend::try_new_with_opts`.
    ///
    #[track_caller]
    pub fn new() -> Backend {
        Backend::new_with_opts(BackendOpts::default())
    }

    ///
    /// Starts a new backend with the given options.
    ///
    /// ## Example
    ///
    /// ```
    /// use httpbackend::{Backend, BackendOpts, Options};
    ///
    /// let opts = BackendOpts {
    ///     defaults: Options::default().delay_ms(100),
    ///     base_url: Some("http://127.0.0.1:8080".to_string()),
    ///     ..Default::default()
    /// };
    /// let backend = Backend::new_with_opts(opts);
    /// ```
    ///
    #[track_caller]
    pub fn new_with_opts(opts: BackendOpts) -> Backend {
        Backend::try_new_with_opts(opts).unwrap_or_else(|err| panic!("{}", err))
    }

    ///
    /// Same as `Backend::new_with_opts`, but returns an error if the background runtime can't be
    /// started.
    ///
    pub fn try_new_with_opts(opts: BackendOpts) -> Result<Backend, Error> {
        let scheduler = Scheduler::start()?;
        let transport = match opts.transport {
            Some(transport) => transport,
            None => Arc::new(HttpClient::with_handle(scheduler.handle(), opts.base_url)),
        };

        let state = State {
            defaults: opts.defaults,
            ..Default::default()
        };

        let shared = Shared {
            state: Mutex::new(state),
            scheduler,
            delivered: Condvar::new(),
            transport,
            assert_on_drop: opts.assert_on_drop,
        };

        let shared = Arc::new(shared);
        let guard = DropGuard {
            shared: shared.clone(),
        };

        Ok(Backend {
            shared,
            _guard: Arc::new(guard),
        })
    }

    ///
    /// Registers a background stub for the given method and URL. Background stubs match any
    /// number of requests and stay registered until `Backend::clear`.
    ///
    /// Plain strings are treated as globs, a `regex::Regex` is used as-is.
    ///
    /// ## Example
    ///
    /// ```
    /// use serde_json::json;
    ///
    /// let backend = httpbackend::Backend::new();
    ///
    /// backend.when("GET", "fixtures/*.json").respond(json!({"ding": "dong"}));
    /// backend
    ///     .when("GET", regex::Regex::new(r"^users/\d+$").unwrap())
    ///     .respond_with_status(404, "not found");
    /// ```
    ///
    pub fn when<U: Into<UrlMatcher>>(&self, method: &str, url: U) -> StubBuilder {
        self.register(method, url.into(), false)
    }

    ///
    /// Registers a one-shot expectation. It is consumed by the first request it matches and is
    /// reported by `Backend::verify_no_outstanding_expectation` until then.
    ///
    pub fn expect<U: Into<UrlMatcher>>(&self, method: &str, url: U) -> StubBuilder {
        self.register(method, url.into(), true)
    }

    ///
    /// Same as `Backend::expect("GET", url)`.
    ///
    pub fn expect_get<U: Into<UrlMatcher>>(&self, url: U) -> StubBuilder {
        self.expect("GET", url)
    }

    ///
    /// Same as `Backend::expect("POST", url)`.
    ///
    pub fn expect_post<U: Into<UrlMatcher>>(&self, url: U) -> StubBuilder {
        self.expect("POST", url)
    }

    ///
    /// Same as `Backend::expect("PUT", url)`.
    ///
    pub fn expect_put<U: Into<UrlMatcher>>(&self, url: U) -> StubBuilder {
        self.expect("PUT", url)
    }

    ///
    /// Same as `Backend::expect("DELETE", url)`.
    ///
    pub fn expect_delete<U: Into<UrlMatcher>>(&self, url: U) -> StubBuilder {
        self.expect("DELETE", url)
    }

    ///
    /// Same as `Backend::expect("PATCH", url)`.
    ///
    pub fn expect_patch<U: Into<UrlMatcher>>(&self, url: U) -> StubBuilder {
        self.expect("PATCH", url)
    }

    fn register(&self, method: &str, url: UrlMatcher, expected: bool) -> StubBuilder {
        let mut state = lock(&self.shared.state);
        let defaults = state.defaults.clone();
        let id = state
            .registry
            .create(method, url, expected, defaults)
            .id
            .clone();

        StubBuilder::new(self.shared.clone(), id)
    }

    ///
    /// Creates a fake request object. A real transport is created alongside it, in case a
    /// passthrough stub ends up matching.
    ///
    pub fn request(&self) -> FakeRequest {
        let transport = self.shared.transport.create();
        FakeRequest::new(Arc::downgrade(&self.shared), transport)
    }

    ///
    /// Fails if any expectation was not consumed yet. The message holds the number of
    /// outstanding expectations and the first one of them.
    ///
    pub fn verify_no_outstanding_expectation(&self) -> Result<(), Error> {
        verify_expectations(&lock(&self.shared.state))
    }

    ///
    /// Fails if any synthetic response was not delivered yet. The message holds the number of
    /// pending requests and the first one of them.
    ///
    pub fn verify_no_outstanding_request(&self) -> Result<(), Error> {
        let pending = lock(&self.shared.state).pending.outstanding();
        match pending.first() {
            Some(first) => Err(Error::new_with_context(
                ErrorKind::OutstandingRequest,
                format!("{}\n{}", pending.len(), first),
            )),
            None => Ok(()),
        }
    }

    ///
    /// Delivers every pending synthetic response right away, in the order the requests were
    /// sent and regardless of their delays. Requests issued by the callbacks themselves are
    /// delivered in the same pass.
    ///
    /// Deliveries already started on another thread are waited for, so every callback
    /// has returned once `flush` does.
    ///
    pub fn flush(&self) {
        let mut state = lock(&self.shared.state);
        loop {
            if let Some(entry) = state.pending.take_earliest() {
                drop(state);
                entry.resolve();
                state = lock(&self.shared.state);
                continue;
            }

            // a callback flushing from within its own delivery would otherwise wait on itself
            if state.in_delivery == 0 || DELIVERING.with(Cell::get) {
                break;
            }

            state = self
                .shared
                .delivered
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    ///
    /// Removes every stub and drops every pending request without delivering it.
    ///
    pub fn clear(&self) {
        let mut state = lock(&self.shared.state);
        state.registry.clear();
        state.pending.clear();
    }

    ///
    /// The defaults applied to stubs when they are created.
    ///
    pub fn defaults(&self) -> Options {
        lock(&self.shared.state).defaults.clone()
    }

    ///
    /// Replaces the defaults. Stubs created before keep the defaults they were created with.
    ///
    pub fn set_defaults(&self, defaults: Options) {
        lock(&self.shared.state).defaults = defaults;
    }

    ///
    /// The expectations not consumed yet, in registration order.
    ///
    pub fn outstanding_expectations(&self) -> Vec<Stub> {
        lock(&self.shared.state).registry.outstanding_expected()
    }

    ///
    /// The requests waiting for their synthetic response, in the order they were sent.
    ///
    pub fn pending_requests(&self) -> Vec<FakeRequest> {
        lock(&self.shared.state).pending.outstanding()
    }
}

impl Default for Backend {
    fn default() -> Self {
        Backend::new()
    }
}

impl TransportFactory for Backend {
    fn create(&self) -> Box<dyn Transport> {
        Box::new(self.request())
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.shared.state);
        f.debug_struct("Backend")
            .field("stubs", &state.registry)
            .field("pending", &state.pending.len())
            .field("defaults", &state.defaults)
            .finish()
    }
}
