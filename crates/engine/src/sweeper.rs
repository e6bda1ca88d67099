use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use caseboard_core::Entity;
use tracing::debug;

use crate::overlay::OverlayEngine;

/// Handle to the periodic TTL sweep thread.
///
/// The loop wakes every sweep interval and evicts expired overlay entries.
/// `stop()` (or dropping the handle) signals the loop and joins the thread,
/// so no sweep timer survives teardown.
pub struct Sweeper {
    stop: mpsc::Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Sweeper {
    pub(crate) fn start<T: Entity>(engine: OverlayEngine<T>, interval: Duration) -> Self {
        let (stop, wakeups) = mpsc::channel();
        let handle = thread::spawn(move || {
            debug!(?interval, "overlay sweeper started");
            loop {
                match wakeups.recv_timeout(interval) {
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        let removed = engine.evict_expired();
                        if removed > 0 {
                            debug!(removed, "sweep evicted expired overlay entries");
                        }
                    }
                    // Stop requested, or the handle was dropped.
                    Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!("overlay sweeper stopped");
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signal the sweep loop and join its thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}
