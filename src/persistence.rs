//! Serde-friendly persisted forms of runtime state.
//!
//! [`PersistedContext`] is the full round-trip image of a
//! [`FlowContext`](crate::context::FlowContext): `{data, input, metadata}`
//! with ISO-8601 timestamps. Conversions are localized here so the
//! checkpoint code stays lean and declarative. The active port is
//! deliberately absent: it is per-node transient state with no meaning
//! outside the node boundary that set it.
//!
//! This module performs no I/O; it is pure data transformation glue.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::FlowContext;
use crate::metadata::ExecutionMetadata;

/// Persisted shape of a flow context.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistedContext {
    #[serde(default)]
    pub data: FxHashMap<String, Value>,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub metadata: ExecutionMetadata,
}

impl From<&FlowContext> for PersistedContext {
    fn from(ctx: &FlowContext) -> Self {
        PersistedContext {
            data: ctx.data.clone(),
            input: ctx.input.clone(),
            metadata: ctx.metadata.clone(),
        }
    }
}

impl From<PersistedContext> for FlowContext {
    fn from(persisted: PersistedContext) -> Self {
        let mut ctx = FlowContext::new();
        ctx.data = persisted.data;
        ctx.input = persisted.input;
        ctx.metadata = persisted.metadata;
        // Transient deadline state never survives restoration; the serde
        // skip already guarantees it, restated here for the by-hand path.
        ctx.metadata.deadline = None;
        ctx.metadata.deadline_checked = false;
        ctx
    }
}
