//! Periodic heartbeat thread

use crate::error::{HealthError, HealthResult};
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

/// Background thread calling a tick function at a fixed interval.
///
/// The thread ends when the handle is stopped or dropped, or when the tick
/// returns `false`.
#[derive(Debug)]
pub struct Heartbeat {
    interval: Duration,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Heartbeat {
    pub fn start<F>(interval: Duration, tick: F) -> HealthResult<Self>
    where
        F: Fn() -> bool + Send + 'static,
    {
        if interval.is_zero() {
            return Err(HealthError::internal("heartbeat interval must be positive"));
        }

        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("healthmon-heartbeat".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            if !tick() {
                                break;
                            }
                        }
                        // Stop requested, or the handle was dropped
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Heartbeat thread exiting");
            })
            .map_err(|err| HealthError::internal(format!("cannot start heartbeat thread: {err}")))?;

        info!(interval_ms = interval.as_millis() as u64, "Heartbeat started");
        Ok(Self { interval, stop: Some(stop_tx), handle: Some(handle) })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the thread and wait for it to exit
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            // The last monitor reference may be released on the heartbeat thread itself
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}
