//! Background maintenance thread.

use crate::service::VaultService;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

struct Shared {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Periodically runs [`VaultService::run_maintenance`] on a dedicated
/// thread until stopped or dropped.
///
/// The thread sleeps on a condvar, so [`stop`](Self::stop) returns
/// promptly instead of waiting out the interval.
pub struct MaintenanceScheduler {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl MaintenanceScheduler {
    /// Spawns the maintenance thread with the service's configured
    /// interval.
    pub fn start(service: Arc<VaultService>, interval_ms: u64) -> Self {
        let shared = Arc::new(Shared {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        });
        let thread_shared = shared.clone();
        let handle = std::thread::Builder::new()
            .name("notevault-maintenance".into())
            .spawn(move || {
                let interval = Duration::from_millis(interval_ms);
                let mut stopped = thread_shared.stopped.lock();
                while !*stopped {
                    thread_shared.wake.wait_for(&mut stopped, interval);
                    if *stopped {
                        break;
                    }
                    drop(stopped);
                    service.run_maintenance();
                    stopped = thread_shared.stopped.lock();
                }
            })
            // Spawn only fails on resource exhaustion, at which point the
            // process has bigger problems.
            .ok();
        if handle.is_none() {
            tracing::error!("failed to spawn maintenance thread");
        }
        Self {
            shared,
            handle,
        }
    }

    /// Signals the thread and waits for it to exit.
    pub fn stop(&mut self) {
        *self.shared.stopped.lock() = true;
        self.shared.wake.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MaintenanceScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
