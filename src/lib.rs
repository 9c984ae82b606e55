//! Flowloom: a declarative flow execution engine.
//!
//! Flows are configured, not coded: a loaded [`FlowConfig`] describes a
//! sequential pipeline, a first-match branch, or a node-and-edge graph
//! over user-supplied [`Component`]s, and the [`FlowEngine`] executes it
//! with timeout enforcement, safe condition expressions, error policies,
//! checkpoint/resume, and per-step telemetry.
//!
//! # Core pieces
//!
//! - [`FlowContext`]: the mutable state threaded through an execution:
//!   data bag, input payload, metadata, active output port.
//! - [`Component`]: the processing-unit contract (`init`, `setup`,
//!   `process`/`process_async`, `teardown`, validation, health).
//! - [`ConditionEvaluator`]: a restricted expression language for step
//!   conditions, evaluated against the context; unsafe constructs are
//!   rejected before evaluation.
//! - [`FlowEngine`]: dispatch, deadlines, hook fan-out, suspension,
//!   resume.
//! - [`CheckpointStore`]: key-addressable snapshot persistence;
//!   [`InMemoryCheckpointStore`] ships as the default.
//!
//! # Quick start
//!
//! ```rust
//! use flowloom::prelude::*;
//! use rustc_hash::FxHashMap;
//! use serde_json::json;
//!
//! struct Greet;
//!
//! impl Component for Greet {
//!     fn name(&self) -> &str {
//!         "greet"
//!     }
//!     fn process(&self, ctx: &mut FlowContext) -> Result<(), ComponentFailure> {
//!         ctx.set("greeting", json!("hello"));
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), FlowError> {
//! let config: FlowConfig = serde_json::from_value(json!({
//!     "name": "Greeting Flow",
//!     "components": [{"name": "greet", "type": "example.Greet", "config": {}}],
//!     "flow": {"type": "sequential", "steps": [{"component": "greet"}]}
//! }))?;
//!
//! let mut components: FxHashMap<String, Box<dyn Component>> = FxHashMap::default();
//! components.insert("greet".to_string(), Box::new(Greet));
//!
//! let engine = FlowEngine::new(config, components)?;
//! let result = engine.execute(None).await?;
//! assert_eq!(result.get("greeting"), Some(&json!("hello")));
//! # Ok(())
//! # }
//! ```
//!
//! # Timeout modes
//!
//! Cooperative (inline, components poll `check_deadline`), hard-async
//! (worker task raced against the deadline), and hard-process (spawned
//! worker process, killed on expiry). For hard-process, the host binary
//! must call [`isolation::run_worker_if_requested`] first thing in
//! `main`. See the [`isolation`] module.

pub mod checkpoint;
pub mod component;
pub mod config;
pub mod context;
pub mod deadline;
pub mod engine;
pub mod error;
pub mod eval;
pub(crate) mod graph;
pub mod hooks;
pub mod isolation;
pub mod metadata;
pub mod persistence;
pub mod registry;

pub use crate::checkpoint::{Checkpoint, CheckpointStore, InMemoryCheckpointStore};
pub use crate::component::Component;
pub use crate::config::{
    ComponentConfig, EdgeConfig, FlowConfig, FlowDefinition, FlowSettings, FlowType, NodeConfig,
    OnConditionError, OnError, OnMaxIterations, StepConfig, TimeoutMode,
};
pub use crate::context::FlowContext;
pub use crate::engine::FlowEngine;
pub use crate::error::{ComponentFailure, FlowError};
pub use crate::eval::{ConditionEvaluator, EvalError};
pub use crate::hooks::ExecutionHook;
pub use crate::metadata::{ConditionErrorRecord, ErrorRecord, ExecutionMetadata, StepTiming};
pub use crate::persistence::PersistedContext;
pub use crate::registry::ComponentRegistry;

/// Convenience re-exports for the common surface.
pub mod prelude {
    pub use crate::checkpoint::{CheckpointStore, InMemoryCheckpointStore};
    pub use crate::component::Component;
    pub use crate::config::{FlowConfig, FlowSettings, FlowType, TimeoutMode};
    pub use crate::context::FlowContext;
    pub use crate::engine::FlowEngine;
    pub use crate::error::{ComponentFailure, FlowError};
    pub use crate::eval::ConditionEvaluator;
    pub use crate::hooks::ExecutionHook;
    pub use crate::registry::ComponentRegistry;
}
