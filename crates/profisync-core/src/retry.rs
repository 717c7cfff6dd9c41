//! Retry-policy and catch-binding matching.
//!
//! Stateless logic: all functions take configuration and the failure's
//! category as parameters. The engine tracks attempt counts; this module
//! only answers "does this policy/binding cover this failure, and how long
//! is the wait".

use std::time::Duration;

use profisync_types::error::ErrorCategory;
use profisync_types::workflow::{CatchBinding, RetryPolicy};

// ---------------------------------------------------------------------------
// RetryHandler
// ---------------------------------------------------------------------------

/// Stateless retry and catch matcher.
pub struct RetryHandler;

impl RetryHandler {
    /// Whether a matcher list covers a category. `None` matches everything.
    pub fn covers(on: &Option<Vec<ErrorCategory>>, category: ErrorCategory) -> bool {
        match on {
            None => true,
            Some(categories) => categories.contains(&category),
        }
    }

    /// The wait before the next attempt, or `None` when the failure must
    /// propagate to catch evaluation.
    ///
    /// The first policy covering the category governs. `attempt` is the
    /// 1-based number of attempts already made; with `max_attempts = 2` the
    /// only retry happens after attempt 1.
    ///
    /// Wait is `interval_secs * backoff_rate^(attempt-1)`; a backoff rate of
    /// 1 gives a constant interval.
    pub fn next_delay(
        policies: &[RetryPolicy],
        category: ErrorCategory,
        attempt: u32,
    ) -> Option<Duration> {
        let policy = policies.iter().find(|p| Self::covers(&p.on, category))?;
        if attempt >= policy.max_attempts {
            return None;
        }
        let exponent = attempt.saturating_sub(1);
        let secs = policy.interval_secs as f64 * policy.backoff_rate.powi(exponent as i32);
        Some(Duration::from_secs_f64(secs))
    }

    /// The first catch binding covering the category, if any.
    pub fn matching_catch(
        bindings: &[CatchBinding],
        category: ErrorCategory,
    ) -> Option<&CatchBinding> {
        bindings.iter().find(|b| Self::covers(&b.on, category))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
