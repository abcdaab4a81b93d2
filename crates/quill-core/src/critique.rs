//! Retry-on-rejection wrapper around the runner
//!
//! Only validation failures are retried. Each retry sees the previous
//! attempt's validation details in its prompt, and every execution record
//! carries the budget status of its attempt.

use crate::cancel::CancellationToken;
use crate::context::{CritiqueFeedback, PhaseContext};
use crate::error::PhaseError;
use crate::runner::{PhaseRunResult, PhaseRunner};
use quill_types::PhaseKind;
use serde::{Deserialize, Serialize};

/// Default number of attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Bounded critique loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CritiqueLoop {
    /// Total attempts, including the first
    pub max_attempts: u32,
}

impl Default for CritiqueLoop {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl CritiqueLoop {
    /// Loop allowing `max_attempts` attempts (at least one)
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Run `phase` until the reply passes validation or the budget is spent
    ///
    /// # Errors
    ///
    /// The last attempt's [`PhaseError::ValidationFailed`] once the budget
    /// is exhausted; any other error immediately.
    pub async fn execute(
        &self,
        runner: &PhaseRunner,
        phase: PhaseKind,
        ctx: &PhaseContext,
        cancel: &CancellationToken,
    ) -> Result<PhaseRunResult, PhaseError> {
        let max_attempts = self.max_attempts.max(1);
        let mut details = Vec::new();
        let mut attempt = 1;
        loop {
            let mut attempt_ctx = ctx.clone();
            attempt_ctx.critique = Some(CritiqueFeedback {
                attempt,
                max_attempts,
                details: std::mem::take(&mut details),
            });

            match runner.execute(phase, &attempt_ctx, cancel).await {
                Err(error @ PhaseError::ValidationFailed { .. }) if attempt < max_attempts => {
                    details = error.validation().map(|v| v.details()).unwrap_or_default();
                    tracing::info!(
                        %phase,
                        attempt,
                        max_attempts,
                        violations = details.len(),
                        "reply rejected; retrying with critique"
                    );
                    attempt += 1;
                }
                Err(error @ PhaseError::ValidationFailed { .. }) => {
                    tracing::warn!(%phase, attempts = attempt, "critique budget exhausted");
                    return Err(error);
                }
                other => return other,
            }
        }
    }

    /// Like [`Self::execute`], folding the error into the result
    pub async fn run(
        &self,
        runner: &PhaseRunner,
        phase: PhaseKind,
        ctx: &PhaseContext,
        cancel: &CancellationToken,
    ) -> PhaseRunResult {
        match self.execute(runner, phase, ctx, cancel).await {
            Ok(result) => result,
            Err(error) => {
                PhaseRunResult::from_error(phase, error, runner.config().snippet_chars)
            }
        }
    }
}
