//! Deadline installation and cooperative checking.
//!
//! The executor computes the remaining flow budget before each step,
//! installs an absolute [`Instant`] deadline on the context's metadata,
//! and clears it afterwards. Components observe it through
//! [`check_deadline`], which also flips the `deadline_checked` flag used
//! by the strict-mode rule.

use std::time::{Duration, Instant};

use crate::context::FlowContext;
use crate::error::FlowError;

/// Seconds a cooperative component may run without calling
/// `check_deadline` before the engine warns (or fails, when
/// `require_deadline_check` is set).
pub const DEADLINE_CHECK_WARNING_THRESHOLD: f64 = 1.0;

/// Install a deadline for the step about to run. A `None` budget clears
/// any previous deadline. Resets the checked flag either way.
pub fn install(ctx: &mut FlowContext, remaining: Option<Duration>) {
    ctx.metadata.deadline = remaining.map(|r| Instant::now() + r);
    ctx.metadata.deadline_checked = false;
}

/// Clear deadline state after a step, success or failure.
pub fn clear(ctx: &mut FlowContext) {
    ctx.metadata.deadline = None;
    ctx.metadata.deadline_checked = false;
}

/// Cooperative deadline probe. Marks the context as checked; raises
/// [`FlowError::Timeout`] once the installed deadline has passed. A
/// context without a deadline always passes.
pub fn check(ctx: &mut FlowContext, step: &str) -> Result<(), FlowError> {
    ctx.metadata.deadline_checked = true;
    if let Some(deadline) = ctx.metadata.deadline {
        let now = Instant::now();
        if now >= deadline {
            let overshoot = now.duration_since(deadline).as_secs_f64();
            return Err(FlowError::Timeout {
                message: format!("deadline exceeded in '{step}'"),
                timeout: None,
                elapsed: overshoot,
                step: Some(step.to_string()),
            });
        }
    }
    Ok(())
}
