//! Bounded polling for asynchronous platform operations.
//!
//! The platform performs clones and shutdowns asynchronously and offers
//! no completion callback, so the engine polls. One primitive serves both
//! clone-materialization and stop-confirmation: bounded attempts with
//! capped exponential backoff, never an indefinite loop.

use std::future::Future;
use std::time::Duration;

use lab_config::Tunables;
use lab_core::error::Result;

/// Attempt budget and backoff curve for one polling loop.
#[derive(Debug, Clone)]
pub struct PollBudget {
    pub attempts: u32,
    pub initial: Duration,
    pub max: Duration,
}

impl PollBudget {
    pub fn from_tunables(tunables: &Tunables) -> Self {
        Self {
            attempts: tunables.poll_attempts,
            initial: Duration::from_millis(tunables.poll_initial_ms),
            max: Duration::from_millis(tunables.poll_max_ms),
        }
    }
}

impl Default for PollBudget {
    fn default() -> Self {
        Self::from_tunables(&Tunables::default())
    }
}

/// Polls `probe` until it yields a value or the budget runs out.
///
/// The probe returns `Ok(Some(v))` when the condition holds, `Ok(None)`
/// to keep waiting, and `Err` for a fatal platform failure. Exhaustion
/// returns `Ok(None)`; the caller owns the error it maps that to, since
/// only it knows which VM and which condition were being waited on.
pub async fn await_condition<T, F, Fut>(budget: &PollBudget, mut probe: F) -> Result<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let mut delay = budget.initial;
    for attempt in 0..budget.attempts {
        if attempt > 0 {
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(budget.max);
        }
        if let Some(value) = probe().await? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}
