//! # Progress Tracking Module
//!
//! Polling loop che osserva i task del batch e aggiorna la progress bar.
//! Ogni tick conta i task terminati; il loop esce quando sono tutti finiti
//! oppure quando arriva una richiesta di stop.

use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::progress::ProgressManager;

/// Watches spawned tasks and mirrors their completion on a progress bar
pub struct ProgressTracker {
    progress: ProgressManager,
    poll_interval: Duration,
}

impl ProgressTracker {
    pub fn new(progress: ProgressManager, poll_interval: Duration) -> Self {
        Self {
            progress,
            poll_interval,
        }
    }

    /// Poll until every task has finished. Returns `true` if a stop
    /// request arrived first.
    pub async fn watch<T>(&self, handles: &[JoinHandle<T>], stop: &mut broadcast::Receiver<()>) -> bool {
        let total = handles.len();
        let mut ticker = tokio::time::interval(self.poll_interval);
        let mut stop_open = true;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let done = handles.iter().filter(|h| h.is_finished()).count();
                    self.progress.set_completed(done as u64);

                    if done == total {
                        self.progress.finish("done");
                        return false;
                    }
                }
                signal = stop.recv(), if stop_open => {
                    match signal {
                        Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                            self.progress.abandon("interrupted");
                            return true;
                        }
                        Err(broadcast::error::RecvError::Closed) => stop_open = false,
                    }
                }
            }
        }
    }
}
