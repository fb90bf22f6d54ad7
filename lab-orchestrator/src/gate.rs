//! Named mutual-exclusion gates for create-class and delete-class work.
//!
//! Identifier allocation reads a snapshot and then acts on it; nothing on
//! the platform side makes that atomic. The gates bound the race window
//! by serializing each operation class process-wide. Acquisition waits up
//! to a configured bound and then surfaces a retryable busy error rather
//! than queueing forever.

use std::time::Duration;

use lab_core::error::{LabError, Result};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

pub struct Gate {
    name: &'static str,
    wait: Duration,
    inner: Mutex<()>,
}

/// Held for the duration of one gated operation; dropping it releases
/// the gate.
pub struct GateGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl Gate {
    pub fn new(name: &'static str, wait: Duration) -> Self {
        Self {
            name,
            wait,
            inner: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Blocks up to the bounded wait; timing out is the retryable
    /// "operation in progress" condition, never a silent failure.
    pub async fn acquire(&self) -> Result<GateGuard<'_>> {
        match tokio::time::timeout(self.wait, self.inner.lock()).await {
            Ok(guard) => {
                debug!(gate = self.name, "gate acquired");
                Ok(GateGuard { _guard: guard })
            }
            Err(_) => Err(LabError::Busy(self.name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn contended_gate_reports_busy() {
        let gate = Gate::new("create", Duration::from_millis(50));
        let _held = gate.acquire().await.expect("first acquire");

        let second = gate.acquire().await;
        assert!(matches!(second, Err(LabError::Busy(name)) if name == "create"));
    }

    #[tokio::test]
    async fn released_gate_can_be_reacquired() {
        let gate = Gate::new("delete", Duration::from_millis(50));
        {
            let _held = gate.acquire().await.expect("first acquire");
        }
        assert!(gate.acquire().await.is_ok());
    }
}
