//! Execution hooks: observers of step lifecycle events.
//!
//! Hooks are observers, not middleware: they receive events and cannot
//! mutate execution flow. Every hook call runs inside a panic isolation
//! boundary; a hook that panics is logged and never alters which steps
//! run or their outcomes.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::context::FlowContext;
use crate::error::ComponentFailure;

/// Observer interface for flow lifecycle events. All methods default to
/// no-ops; implement the ones you care about.
pub trait ExecutionHook: Send + Sync {
    /// A node (or step) is about to execute.
    fn on_node_start(&self, _node_id: &str, _component: &str, _ctx: &FlowContext) {}

    /// A node finished successfully. `duration` is seconds of wall time.
    fn on_node_complete(&self, _node_id: &str, _component: &str, _ctx: &FlowContext, _duration: f64) {
    }

    /// A node's `process` failed.
    fn on_node_error(
        &self,
        _node_id: &str,
        _component: &str,
        _error: &ComponentFailure,
        _ctx: &FlowContext,
    ) {
    }

    /// A node was skipped (condition false, error policy, unreachable).
    fn on_node_skipped(&self, _node_id: &str, _component: &str, _reason: &str) {}

    /// The flow suspended; `checkpoint_id` is present when a store was
    /// configured and the snapshot was saved.
    fn on_flow_suspended(&self, _node_id: &str, _reason: &str, _checkpoint_id: Option<&str>) {}

    /// A cyclic execution re-entered a cycle (fires per back-edge re-entry).
    fn on_iteration_start(&self, _iteration: u32, _node_id: &str) {}

    /// The cyclic executor hit `max_iterations`, before the policy applies.
    fn on_max_iterations(&self, _max_iterations: u32, _node_id: &str) {}
}

/// Fan an event out to every hook, isolating panics. `event` names the
/// callback for the warning log.
pub(crate) fn fan_out(hooks: &[Box<dyn ExecutionHook>], event: &str, f: impl Fn(&dyn ExecutionHook)) {
    for hook in hooks {
        let result = catch_unwind(AssertUnwindSafe(|| f(hook.as_ref())));
        if result.is_err() {
            tracing::warn!(event, "execution hook panicked; ignoring");
        }
    }
}
