use crate::{Error, ErrorKind};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

///
/// Runs delayed callbacks on the tokio runtime of the caller, or on a background thread owning a
/// single-threaded runtime when the caller has none.
///
/// The background runtime stops, dropping every task that didn't fire yet, when the scheduler is
/// dropped.
///
#[derive(Debug)]
pub(crate) struct Scheduler {
    handle: Handle,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Scheduler {
    pub(crate) fn start() -> Result<Scheduler, Error> {
        // a std channel, so that backends can be created from within async tests
        let (handle_sender, handle_receiver) = mpsc::sync_channel(1);
        let (shutdown_sender, shutdown_receiver) = oneshot::channel::<()>();

        thread::Builder::new()
            .name("httpbackend::scheduler".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        let _ = handle_sender.send(Err(err));
                        return;
                    }
                };

                let _ = handle_sender.send(Ok(runtime.handle().clone()));

                runtime.block_on(async {
                    let _ = shutdown_receiver.await;
                });
            })
            .map_err(|err| Error::new_with_context(ErrorKind::RuntimeFailure, err))?;

        let handle = handle_receiver
            .recv()
            .map_err(|_| Error::new(ErrorKind::RuntimeFailure))?
            .map_err(|err| Error::new_with_context(ErrorKind::RuntimeFailure, err))?;

        Ok(Scheduler {
            handle,
            shutdown: Some(shutdown_sender),
        })
    }

    pub(crate) fn handle(&self) -> Handle {
        self.handle.clone()
    }

    ///
    /// Runs `callback` once `delay` elapsed. A zero delay still defers the callback to the
    /// runtime, it never runs inline.
    ///
    /// Called from within a tokio runtime, the callback is spawned on that runtime: on a
    /// current-thread runtime it only runs once the caller yields. Delays other than zero
    /// need the runtime's time driver.
    ///
    pub(crate) fn schedule<F>(&self, delay: Duration, callback: F) -> AbortHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let task = async move {
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }

            callback();
        };

        let handle = match Handle::try_current() {
            Ok(handle) => handle.spawn(task),
            Err(_) => self.handle.spawn(task),
        };

        handle.abort_handle()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Instant;

    #[test]
    fn test_schedule_runs_after_the_delay() {
        let scheduler = Scheduler::start().unwrap();
        let (sender, receiver) = mpsc::channel();
        let started = Instant::now();

        scheduler.schedule(Duration::from_millis(50), move || {
            sender.send(Instant::now()).unwrap();
        });

        let fired_at = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(fired_at.duration_since(started) >= Duration::from_millis(50));
    }

    #[test]
    fn test_aborted_callbacks_never_run() {
        let scheduler = Scheduler::start().unwrap();
        let (sender, receiver) = mpsc::channel::<()>();

        let handle = scheduler.schedule(Duration::from_millis(50), move || {
            sender.send(()).unwrap();
        });
        handle.abort();

        assert!(receiver.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_zero_delay_is_deferred() {
        let scheduler = Scheduler::start().unwrap();
        let (sender, receiver) = mpsc::channel();

        scheduler.schedule(Duration::ZERO, move || {
            sender.send("fired").unwrap();
        });

        assert_eq!(
            "fired",
            receiver.recv_timeout(Duration::from_secs(5)).unwrap()
        );
    }

    #[tokio::test]
    async fn test_callbacks_run_on_the_calling_runtime() {
        let scheduler = Scheduler::start().unwrap();
        let (sender, mut receiver) = tokio::sync::oneshot::channel();
        let caller = thread::current().id();

        scheduler.schedule(Duration::ZERO, move || {
            sender.send(thread::current().id()).unwrap();
        });

        // nothing runs on a current-thread runtime until the test yields
        assert!(receiver.try_recv().is_err());
        assert_eq!(caller, receiver.await.unwrap());
    }
}
