//! A background poller thread that periodically invokes a refresh callback.
use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use rand::{thread_rng, Rng};

use crate::{Error, Result};

/// Outcome of a single refresh invocation.
///
/// The callback decides how bad a failure is. The poller keeps running after a soft failure and
/// halts permanently after a hard one, leaving the retry policy to the host.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// Configuration was refreshed.
    Success,
    /// Refresh failed but may succeed on a later attempt (e.g., network hiccup).
    SoftFailure(Error),
    /// Refresh failed in a way that will not fix itself (e.g., invalid API key). The poller stops.
    HardFailure(Error),
}

/// Observable state of a [`PollerThread`].
#[derive(Debug, Clone)]
pub enum PollerState {
    /// The poller is scheduling refreshes.
    Running,
    /// The poller was stopped by the host.
    Stopped,
    /// The poller halted after a hard failure or a panicking callback. It will not be restarted
    /// automatically.
    Halted(Error),
}

/// Configuration for [`PollerThread`].
// Not implementing `Copy` as we may add non-copyable fields in the future.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Nominal period between refreshes.
    ///
    /// Defaults to [`PollerConfig::DEFAULT_POLL_INTERVAL`].
    pub interval: Duration,
    /// Jitter subtracts a random duration from every period. This helps to avoid multiple server
    /// instances synchronizing and producing spiky network load.
    ///
    /// Defaults to zero.
    pub jitter: Duration,
    /// Invoke the callback as soon as the thread starts instead of waiting for the first period.
    ///
    /// Defaults to `false`.
    pub refresh_on_start: bool,
}

impl PollerConfig {
    /// Default value for [`PollerConfig::interval`].
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

    /// Create a new `PollerConfig` using default configuration.
    pub fn new() -> PollerConfig {
        PollerConfig::default()
    }

    /// Update poll interval with `interval`.
    pub fn with_interval(mut self, interval: Duration) -> PollerConfig {
        self.interval = interval;
        self
    }

    /// Update poll interval jitter with `jitter`.
    pub fn with_jitter(mut self, jitter: Duration) -> PollerConfig {
        self.jitter = jitter;
        self
    }

    /// Set whether the first refresh happens immediately.
    pub fn with_refresh_on_start(mut self, refresh_on_start: bool) -> PollerConfig {
        self.refresh_on_start = refresh_on_start;
        self
    }
}

impl Default for PollerConfig {
    fn default() -> PollerConfig {
        PollerConfig {
            interval: PollerConfig::DEFAULT_POLL_INTERVAL,
            jitter: Duration::ZERO,
            refresh_on_start: false,
        }
    }
}

struct Status {
    state: PollerState,
    /// `None` until the first refresh outcome is known.
    first_refresh: Option<Result<()>>,
}

struct Shared {
    /// Set to `true` by `stop()`. Checked before every invocation.
    stopped: Mutex<bool>,
    wakeup: Condvar,

    status: Mutex<Status>,
    status_changed: Condvar,
}

impl Shared {
    fn status(&self) -> MutexGuard<'_, Status> {
        // Callbacks run outside of this lock, so it can only be poisoned by a bug in this module.
        self.status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_stopped(&self) -> bool {
        *self
            .stopped
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, outcome: &RefreshOutcome) {
        let mut status = self.status();
        if status.first_refresh.is_none() {
            status.first_refresh = Some(match outcome {
                RefreshOutcome::Success => Ok(()),
                RefreshOutcome::SoftFailure(err) | RefreshOutcome::HardFailure(err) => {
                    Err(err.clone())
                }
            });
        }
        if let RefreshOutcome::HardFailure(err) = outcome {
            status.state = PollerState::Halted(err.clone());
        }
        self.status_changed.notify_all();
    }

    fn finish(&self, state: PollerState) {
        let mut status = self.status();
        if matches!(status.state, PollerState::Running) {
            status.state = state;
        }
        self.status_changed.notify_all();
    }

    /// Sleep until `deadline` or until stopped.
    ///
    /// Returns `None` if the poller was stopped. Otherwise returns the guard of the stop flag,
    /// which must be held until the refresh completes so that `stop()` cannot return while a
    /// refresh is starting.
    fn sleep_until(&self, deadline: Instant) -> Option<MutexGuard<'_, bool>> {
        let stopped = self
            .stopped
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let timeout = deadline.saturating_duration_since(Instant::now());
        let (stopped, _) = self
            .wakeup
            .wait_timeout_while(stopped, timeout, |stopped| {
                !*stopped && Instant::now() < deadline
            })
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *stopped {
            None
        } else {
            Some(stopped)
        }
    }
}

/// A poller thread.
///
/// The poller thread invokes a refresh callback once per [`PollerConfig::interval`] until it is
/// stopped or the callback reports a [`RefreshOutcome::HardFailure`] (or panics).
pub struct PollerThread {
    join_handle: std::thread::JoinHandle<()>,
    shared: Arc<Shared>,
}

impl PollerThread {
    /// Starts the poller thread.
    ///
    /// # Errors
    ///
    /// This method can return the following errors:
    /// - [`Error::Io`] if the thread failed to start.
    pub fn start<F>(mut callback: F, config: PollerConfig) -> Result<PollerThread>
    where
        F: FnMut() -> RefreshOutcome + Send + 'static,
    {
        let shared = Arc::new(Shared {
            stopped: Mutex::new(false),
            wakeup: Condvar::new(),
            status: Mutex::new(Status {
                state: PollerState::Running,
                first_refresh: None,
            }),
            status_changed: Condvar::new(),
        });

        let join_handle = {
            // Cloning Arc for move into thread
            let shared = Arc::clone(&shared);

            std::thread::Builder::new()
                .name("eppo-poller".to_owned())
                .spawn(move || {
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        let mut deadline = Instant::now();
                        if !config.refresh_on_start {
                            deadline += jitter(config.interval, config.jitter);
                        }

                        loop {
                            let Some(running) = shared.sleep_until(deadline) else {
                                log::debug!(target: "eppo", "poller thread received stop command");
                                return PollerState::Stopped;
                            };

                            log::debug!(target: "eppo", "invoking refresh callback");
                            let outcome = callback();
                            shared.record(&outcome);
                            drop(running);
                            match outcome {
                                RefreshOutcome::Success => {}
                                RefreshOutcome::SoftFailure(err) => {
                                    log::warn!(target: "eppo", "refresh failed, will retry: {err}");
                                }
                                RefreshOutcome::HardFailure(err) => {
                                    log::warn!(target: "eppo", "refresh failed, stopping poller: {err}");
                                    return PollerState::Halted(err);
                                }
                            }

                            // Next deadline is relative to the previous one, not to the end of
                            // the callback.
                            deadline += jitter(config.interval, config.jitter);
                            let now = Instant::now();
                            if deadline < now {
                                deadline = now;
                            }
                        }
                    }));

                    match result {
                        Ok(state) => shared.finish(state),
                        Err(_panic_info) => {
                            log::warn!(target: "eppo", "refresh callback panicked, stopping poller");
                            shared.record(&RefreshOutcome::HardFailure(Error::PollerThreadPanicked));
                            shared.finish(PollerState::Halted(Error::PollerThreadPanicked));
                        }
                    }
                })?
        };

        Ok(PollerThread {
            join_handle,
            shared,
        })
    }

    /// Current state of the poller.
    pub fn state(&self) -> PollerState {
        self.shared.status().state.clone()
    }

    /// Return `true` while the poller is scheduling refreshes.
    pub fn is_running(&self) -> bool {
        matches!(self.state(), PollerState::Running)
    }

    /// Waits for the first refresh.
    ///
    /// This method blocks until the callback has been invoked once, or the poller has stopped.
    ///
    /// # Errors
    ///
    /// Returns the error reported by the first refresh, the error that halted the poller, or
    /// [`Error::PollerThreadPanicked`] if the callback panicked.
    pub fn wait_for_configuration(&self) -> Result<()> {
        let mut status = self.shared.status();
        loop {
            if let Some(result) = &status.first_refresh {
                // The poller has already refreshed. Return Ok(()) or a possible error.
                return result.clone();
            }
            match &status.state {
                PollerState::Running => {}
                PollerState::Stopped => return Ok(()),
                PollerState::Halted(err) => return Err(err.clone()),
            }
            status = self
                .shared
                .status_changed
                .wait(status)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Stop the poller thread.
    ///
    /// No refresh begins after this returns. A refresh that is already in progress runs to
    /// completion and this call blocks until it does. Calling `stop()` multiple times, from any
    /// thread, is fine. It must not be called from within the refresh callback.
    ///
    /// This function does not wait for the thread to actually exit.
    pub fn stop(&self) {
        let mut stopped = self
            .shared
            .stopped
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *stopped = true;
        self.shared.wakeup.notify_all();
    }

    /// Stop the poller thread and block waiting for it to exit.
    ///
    /// If you don't need to wait for the thread to exit, use [`PollerThread::stop`] instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PollerThreadPanicked`] if the thread has panicked.
    pub fn shutdown(self) -> Result<()> {
        // Send stop signal in case it wasn't sent before.
        self.stop();

        self.join_handle
            .join()
            .map_err(|_| Error::PollerThreadPanicked)?;

        Ok(())
    }

    /// Return `true` if [`PollerThread::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }
}

/// Apply randomized `jitter` to `interval`.
fn jitter(interval: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return interval;
    }
    interval.saturating_sub(thread_rng().gen_range(Duration::ZERO..=jitter))
}
