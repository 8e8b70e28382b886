//! Fixed-capacity admission gate.
//!
//! Bounds how many submissions compile and run at once. Acquisition waits
//! up to a caller-supplied timeout; the returned permit restores the slot
//! and the active gauge when dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

use crate::error::{Error, Result};
use crate::metrics::JudgeMetrics;

pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    metrics: Arc<JudgeMetrics>,
}

/// An occupied admission slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
    metrics: Arc<JudgeMetrics>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.metrics.record_active_decrease();
    }
}

impl AdmissionGate {
    pub fn new(max_concurrent: usize, metrics: Arc<JudgeMetrics>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            metrics,
        }
    }

    /// Wait at most `timeout` for a free slot.
    pub async fn admit(&self, timeout: Duration) -> Result<AdmissionPermit> {
        let acquired = tokio::time::timeout(timeout, self.semaphore.clone().acquire_owned()).await;

        match acquired {
            Ok(Ok(permit)) => {
                self.metrics.record_queue_wait();
                self.metrics.record_active_increase();
                Ok(AdmissionPermit {
                    _permit: permit,
                    metrics: Arc::clone(&self.metrics),
                })
            }
            Ok(Err(_)) => {
                // The semaphore is never closed while the gate lives.
                Err(Error::SandboxInternal("admission gate closed".into()))
            }
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "admission wait timed out");
                self.metrics.record_queue_timeout();
                Err(Error::QueueFull)
            }
        }
    }

    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }
}
