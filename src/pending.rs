use crate::request::FakeRequest;
use crate::transport::Callback;
use std::collections::VecDeque;
use std::fmt;
use tokio::task::AbortHandle;

///
/// A matched synthetic request waiting for its response to be delivered.
///
pub(crate) struct PendingEntry {
    handle: AbortHandle,
    request: FakeRequest,
    callback: Option<Callback>,
}

impl PendingEntry {
    pub(crate) fn new(
        handle: AbortHandle,
        request: FakeRequest,
        callback: Option<Callback>,
    ) -> PendingEntry {
        PendingEntry {
            handle,
            request,
            callback,
        }
    }

    ///
    /// Completes the request and invokes the callback captured when it was scheduled. Requests
    /// aborted in the meantime stay silent.
    ///
    pub(crate) fn resolve(self) {
        let Some(state) = self.request.complete() else {
            return;
        };

        if let Some(mut callback) = self.callback {
            callback(&state);
        }
    }
}

impl fmt::Debug for PendingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingEntry")
            .field("request", &self.request.to_string())
            .finish()
    }
}

///
/// The in-flight synthetic requests, in the order they were issued.
///
/// At most one entry exists per request. Removing an entry cancels its scheduled delivery, and
/// removing a request that isn't pending is a no-op.
///
#[derive(Debug, Default)]
pub(crate) struct PendingLedger {
    entries: VecDeque<PendingEntry>,
}

impl PendingLedger {
    pub(crate) fn add(&mut self, entry: PendingEntry) {
        self.take(&entry.request);
        self.entries.push_back(entry);
    }

    ///
    /// Removes the entry owned by `request` and cancels its scheduled delivery.
    ///
    pub(crate) fn remove(&mut self, request: &FakeRequest) -> Option<PendingEntry> {
        let entry = self.take(request)?;
        entry.handle.abort();
        Some(entry)
    }

    ///
    /// Removes the entry owned by `request` without touching its schedule. Used by the scheduled
    /// delivery itself.
    ///
    pub(crate) fn take(&mut self, request: &FakeRequest) -> Option<PendingEntry> {
        let position = self
            .entries
            .iter()
            .position(|entry| entry.request.same_request(request))?;

        self.entries.remove(position)
    }

    ///
    /// Removes the earliest entry and cancels its scheduled delivery, so that it can be resolved
    /// right away.
    ///
    pub(crate) fn take_earliest(&mut self) -> Option<PendingEntry> {
        let entry = self.entries.pop_front()?;
        entry.handle.abort();
        Some(entry)
    }

    pub(crate) fn outstanding(&self) -> Vec<FakeRequest> {
        self.entries
            .iter()
            .map(|entry| entry.request.clone())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    ///
    /// Cancels every scheduled delivery and forgets the entries without invoking callbacks.
    ///
    pub(crate) fn clear(&mut self) {
        for entry in self.entries.drain(..) {
            entry.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;
    use crate::Backend;
    use std::sync::mpsc;
    use std::time::Duration;

    fn entry(scheduler: &Scheduler, request: &FakeRequest) -> (PendingEntry, mpsc::Receiver<()>) {
        let (sender, receiver) = mpsc::channel();
        let handle = scheduler.schedule(Duration::from_millis(50), move || {
            let _ = sender.send(());
        });

        (PendingEntry::new(handle, request.clone(), None), receiver)
    }

    #[test]
    fn test_outstanding_keeps_insertion_order() {
        let backend = Backend::new();
        let scheduler = Scheduler::start().unwrap();
        let first = backend.request();
        let second = backend.request();

        let mut ledger = PendingLedger::default();
        ledger.add(entry(&scheduler, &first).0);
        ledger.add(entry(&scheduler, &second).0);

        let outstanding = ledger.outstanding();
        assert_eq!(2, outstanding.len());
        assert!(outstanding[0].same_request(&first));
        assert!(outstanding[1].same_request(&second));
    }

    #[test]
    fn test_one_entry_per_request() {
        let backend = Backend::new();
        let scheduler = Scheduler::start().unwrap();
        let request = backend.request();

        let mut ledger = PendingLedger::default();
        ledger.add(entry(&scheduler, &request).0);
        ledger.add(entry(&scheduler, &request).0);

        assert_eq!(1, ledger.len());
    }

    #[test]
    fn test_remove_cancels_and_is_idempotent() {
        let backend = Backend::new();
        let scheduler = Scheduler::start().unwrap();
        let request = backend.request();
        let (pending, fired) = entry(&scheduler, &request);

        let mut ledger = PendingLedger::default();
        ledger.add(pending);

        assert!(ledger.remove(&request).is_some());
        assert!(ledger.remove(&request).is_none());
        assert_eq!(0, ledger.len());
        assert!(fired.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_take_earliest_is_fifo() {
        let backend = Backend::new();
        let scheduler = Scheduler::start().unwrap();
        let first = backend.request();
        let second = backend.request();

        let mut ledger = PendingLedger::default();
        ledger.add(entry(&scheduler, &first).0);
        ledger.add(entry(&scheduler, &second).0);

        assert!(ledger.take_earliest().unwrap().request.same_request(&first));
        assert!(ledger.take_earliest().unwrap().request.same_request(&second));
        assert!(ledger.take_earliest().is_none());
    }

    #[test]
    fn test_clear_cancels_every_schedule() {
        let backend = Backend::new();
        let scheduler = Scheduler::start().unwrap();
        let (first, first_fired) = entry(&scheduler, &backend.request());
        let (second, second_fired) = entry(&scheduler, &backend.request());

        let mut ledger = PendingLedger::default();
        ledger.add(first);
        ledger.add(second);
        ledger.clear();

        assert_eq!(0, ledger.len());
        assert!(first_fired.recv_timeout(Duration::from_millis(200)).is_err());
        assert!(second_fired.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_resolve_is_silent_for_requests_not_in_flight() {
        let backend = Backend::new();
        let scheduler = Scheduler::start().unwrap();
        let request = backend.request();
        let (sender, receiver) = mpsc::channel();

        let handle = scheduler.schedule(Duration::from_secs(60), || {});
        let callback: Callback = Box::new(move |_| {
            let _ = sender.send(());
        });
        PendingEntry::new(handle, request, Some(callback)).resolve();

        assert!(receiver.try_recv().is_err());
    }
}
