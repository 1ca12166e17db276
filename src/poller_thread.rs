//! A background poller thread that periodically fetches toggle definitions and installs them in
//! a toggle repository.
use std::{
    sync::{mpsc::RecvTimeoutError, Arc, Condvar, Mutex},
    time::Duration,
};

use rand::{thread_rng, Rng};

use crate::{
    fetcher::{refresh, Fetcher},
    repository::ToggleRepository,
    Error, Result,
};

/// Configuration for [`PollerThread`].
// Not implementing `Copy` as we may add non-copyable fields in the future.
#[derive(Debug, Clone)]
pub struct PollerThreadConfig {
    /// Interval to wait between refreshes.
    ///
    /// Defaults to [`PollerThreadConfig::DEFAULT_POLL_INTERVAL`].
    pub interval: Duration,
    /// Jitter applies a randomized duration to wait between refreshes. This helps to avoid
    /// multiple server instances synchronizing and producing spiky network load.
    ///
    /// Defaults to [`PollerThreadConfig::DEFAULT_POLL_JITTER`].
    pub jitter: Duration,
}

impl PollerThreadConfig {
    /// Default value for [`PollerThreadConfig::interval`].
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);
    /// Default value for [`PollerThreadConfig::jitter`].
    pub const DEFAULT_POLL_JITTER: Duration = Duration::from_secs(2);

    /// Create a new `PollerThreadConfig` using default configuration.
    pub fn new() -> PollerThreadConfig {
        PollerThreadConfig::default()
    }

    /// Update poll interval with `interval`.
    pub fn with_interval(mut self, interval: Duration) -> PollerThreadConfig {
        self.interval = interval;
        self
    }

    /// Update poll interval jitter with `jitter`.
    pub fn with_jitter(mut self, jitter: Duration) -> PollerThreadConfig {
        self.jitter = jitter;
        self
    }
}

impl Default for PollerThreadConfig {
    fn default() -> PollerThreadConfig {
        PollerThreadConfig {
            interval: PollerThreadConfig::DEFAULT_POLL_INTERVAL,
            jitter: PollerThreadConfig::DEFAULT_POLL_JITTER,
        }
    }
}

/// A toggle definitions poller thread.
///
/// The poller thread runs [`refresh`] immediately and then once per interval. Evaluation never
/// waits on it: readers keep using whatever snapshot is installed in the [`ToggleRepository`].
pub struct PollerThread {
    join_handle: std::thread::JoinHandle<()>,

    /// Used to send a stop command to the poller thread.
    stop_sender: std::sync::mpsc::SyncSender<()>,

    /// Holds `None` if definitions haven't been fetched yet. Holds `Some(Ok(()))` once a refresh
    /// has succeeded. Holds `Some(Err(...))` if the poller hit an unrecoverable error before the
    /// first success.
    result: Arc<(Mutex<Option<Result<()>>>, Condvar)>,
}

impl PollerThread {
    /// Starts the poller thread with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the thread failed to start.
    pub fn start<F>(fetcher: F, repository: Arc<ToggleRepository>) -> std::io::Result<PollerThread>
    where
        F: Fetcher + Send + 'static,
    {
        PollerThread::start_with_config(fetcher, repository, PollerThreadConfig::default())
    }

    /// Starts the poller thread with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the thread failed to start.
    pub fn start_with_config<F>(
        mut fetcher: F,
        repository: Arc<ToggleRepository>,
        config: PollerThreadConfig,
    ) -> std::io::Result<PollerThread>
    where
        F: Fetcher + Send + 'static,
    {
        // Using `sync_channel` here as it makes `stop_sender` `Sync` (shareable between
        // threads). Buffer size of 1 is enough: we only ever send a stop command, and a full
        // buffer means another thread has already sent one.
        let (stop_sender, stop_receiver) = std::sync::mpsc::sync_channel::<()>(1);

        let result = Arc::new((Mutex::new(None), Condvar::new()));

        let join_handle = {
            // Cloning Arc for move into thread
            let result = Arc::clone(&result);
            let update_result = move |value: Result<()>| {
                let (lock, condvar) = &*result;
                let mut slot = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                // Once a refresh has succeeded, waiters only ever see that success.
                if !matches!(*slot, Some(Ok(()))) {
                    *slot = Some(value);
                }
                condvar.notify_all();
            };

            std::thread::Builder::new()
                .name("toggles-poller".to_owned())
                .spawn(move || {
                    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| loop {
                        match refresh(&mut fetcher, &repository) {
                            Ok(()) => update_result(Ok(())),
                            Err(err) if err.is_unrecoverable() => {
                                log::warn!(target: "toggles", "stopping poller thread: {err}");
                                update_result(Err(err));
                                return;
                            }
                            Err(_) => {
                                // Already logged by `refresh`. Retry on the next tick.
                            }
                        }

                        let timeout = jittered(config.interval, config.jitter);
                        match stop_receiver.recv_timeout(timeout) {
                            Err(RecvTimeoutError::Timeout) => {
                                // Timed out. Loop back to refresh.
                            }
                            Ok(()) => {
                                log::debug!(target: "toggles", "poller thread received stop command");
                                // Release waiters if nothing was fetched yet.
                                update_result(Err(Error::PollerStopped));
                                return;
                            }
                            Err(RecvTimeoutError::Disconnected) => {
                                log::debug!(target: "toggles", "poller thread handle dropped, stopping");
                                update_result(Err(Error::PollerStopped));
                                return;
                            }
                        }
                    }));

                    if outcome.is_err() {
                        log::warn!(target: "toggles", "poller thread panicked, toggle definitions will no longer refresh");
                        update_result(Err(Error::PollerThreadPanicked));
                    }
                })?
        };

        Ok(PollerThread {
            join_handle,
            stop_sender,
            result,
        })
    }

    /// Block until the first refresh outcome is known.
    ///
    /// Returns `Ok(())` once any refresh has succeeded. Recoverable fetch errors do not end the
    /// wait (the poller keeps retrying).
    ///
    /// # Errors
    ///
    /// - [`Error::Unauthorized`] if the fetcher rejected our credentials.
    /// - [`Error::PollerThreadPanicked`] if the poller thread panicked.
    /// - [`Error::PollerStopped`] if the poller was stopped before any refresh succeeded.
    pub fn wait_for_features(&self) -> Result<()> {
        let (lock, condvar) = &*self.result;
        let mut slot = lock.lock().map_err(|_| Error::PollerThreadPanicked)?;
        loop {
            match &*slot {
                Some(result) => return result.clone(),
                None => {
                    slot = condvar.wait(slot).map_err(|_| Error::PollerThreadPanicked)?;
                }
            }
        }
    }

    /// Stop the poller thread.
    ///
    /// This function does not wait for the thread to actually stop.
    pub fn stop(&self) {
        // Error means that the receiver was dropped (thread exited) or the channel buffer is
        // full (another stop command is pending). Either way the thread is stopping.
        let _ = self.stop_sender.try_send(());
    }

    /// Stop the poller thread and block waiting for it to exit.
    ///
    /// If you don't need to wait for the thread to exit, use [`PollerThread::stop`] instead.
    ///
    /// # Errors
    ///
    /// - [`Error::PollerThreadPanicked`] if the thread has panicked.
    pub fn shutdown(self) -> Result<()> {
        self.stop();

        self.join_handle
            .join()
            .map_err(|_| Error::PollerThreadPanicked)?;

        Ok(())
    }
}

/// Shorten `interval` by a random amount of at most `max_jitter`, never going below zero.
fn jittered(interval: Duration, max_jitter: Duration) -> Duration {
    if max_jitter.is_zero() {
        return interval;
    }
    interval.saturating_sub(thread_rng().gen_range(Duration::ZERO..=max_jitter))
}
