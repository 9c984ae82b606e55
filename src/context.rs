//! Execution context: the mutable state threaded through a flow.
//!
//! [`FlowContext`] owns the key-value `data` bag, the read-only-by-convention
//! `input` payload, the execution [`metadata`](crate::metadata::ExecutionMetadata),
//! and the transient active output port the graph executor reads for edge
//! routing.
//!
//! # Dotted-path reads
//!
//! [`FlowContext::get_path`] resolves `"user.profile.age"` by successive
//! map lookups. Any missing segment yields `Value::Null`, never an error.
//! This is the guarantee condition expressions rely on: `context.data.x
//! is not None` is simply false when `x` was never set.
//!
//! # Examples
//!
//! ```rust
//! use flowloom::context::FlowContext;
//! use serde_json::json;
//!
//! let mut ctx = FlowContext::new();
//! ctx.set("user", json!({"name": "Alice", "age": 30}));
//!
//! assert_eq!(ctx.get_path("user.name"), json!("Alice"));
//! assert_eq!(ctx.get_path("user.missing.deep"), serde_json::Value::Null);
//! ```

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::FlowError;
use crate::metadata::ExecutionMetadata;
use crate::persistence::PersistedContext;

/// In-memory state passed through a flow execution.
#[derive(Clone, Debug)]
pub struct FlowContext {
    /// Key-value data bag; values are JSON values.
    pub data: FxHashMap<String, Value>,
    /// Initial payload set at execution start. Immutable by convention.
    pub input: Value,
    /// Per-execution telemetry and suspension state.
    pub metadata: ExecutionMetadata,
    /// Output port set by the current node's `process`; cleared before
    /// each node begins. Never serialized.
    active_port: Option<String>,
}

impl Default for FlowContext {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowContext {
    pub fn new() -> Self {
        FlowContext {
            data: FxHashMap::default(),
            input: Value::Null,
            metadata: ExecutionMetadata::new(),
            active_port: None,
        }
    }

    /// A context pre-seeded with an input payload.
    pub fn with_input(input: Value) -> Self {
        let mut ctx = Self::new();
        ctx.input = input;
        ctx
    }

    /// Set a data key.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Read a data key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Read a dotted path into the data bag. Missing segments yield null.
    pub fn get_path(&self, path: &str) -> Value {
        let mut segments = path.split('.');
        let first = match segments.next() {
            Some(s) => s,
            None => return Value::Null,
        };
        let mut current = match self.data.get(first) {
            Some(v) => v.clone(),
            None => return Value::Null,
        };
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment).cloned().unwrap_or(Value::Null),
                _ => return Value::Null,
            };
        }
        current
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn delete(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// The port left by the current node's `process`, if any.
    pub fn active_port(&self) -> Option<&str> {
        self.active_port.as_deref()
    }

    pub fn set_active_port(&mut self, port: impl Into<String>) {
        self.active_port = Some(port.into());
    }

    /// Clear the active port. Executors call this before every node.
    pub fn clear_port(&mut self) {
        self.active_port = None;
    }

    /// Signal suspension from inside a component's `process`.
    ///
    /// The executor observes the flag after teardown, stops, and the
    /// engine issues a checkpoint. `node_id` names the node that must
    /// re-execute on resume.
    pub fn suspend(&mut self, node_id: impl Into<String>, reason: impl Into<String>) {
        self.metadata.suspended = true;
        self.metadata.suspended_at_node = Some(node_id.into());
        self.metadata.suspension_reason = Some(reason.into());
    }

    /// Serialize to the persisted JSON form (`{data, input, metadata}`).
    pub fn to_json(&self) -> Result<String, FlowError> {
        let persisted = PersistedContext::from(self);
        Ok(serde_json::to_string(&persisted)?)
    }

    /// Restore from the persisted JSON form.
    pub fn from_json(text: &str) -> Result<Self, FlowError> {
        let persisted: PersistedContext = serde_json::from_str(text)?;
        Ok(FlowContext::from(persisted))
    }
}
