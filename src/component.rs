//! The component contract.
//!
//! A [`Component`] is one reusable processing unit. The engine constructs
//! it once, calls [`init`](Component::init) once with its declared config
//! block, then brackets every invocation with
//! [`setup`](Component::setup)/[`teardown`](Component::teardown).
//! `teardown` runs whenever `setup` ran, regardless of how `process`
//! ended.
//!
//! # Sync and async processing
//!
//! [`process`](Component::process) is the synchronous entry point every
//! component must provide. Components doing cooperative async work
//! override [`process_async`](Component::process_async) and return `true`
//! from [`supports_async`](Component::supports_async); the executor then
//! awaits the async variant instead.
//!
//! # Examples
//!
//! ```rust
//! use flowloom::component::Component;
//! use flowloom::context::FlowContext;
//! use flowloom::error::ComponentFailure;
//! use serde_json::{json, Map, Value};
//!
//! struct Doubler {
//!     name: String,
//!     factor: i64,
//! }
//!
//! impl Component for Doubler {
//!     fn name(&self) -> &str {
//!         &self.name
//!     }
//!
//!     fn init(&mut self, config: Map<String, Value>) {
//!         self.factor = config.get("factor").and_then(Value::as_i64).unwrap_or(2);
//!     }
//!
//!     fn process(&self, ctx: &mut FlowContext) -> Result<(), ComponentFailure> {
//!         let value = ctx.get("value").and_then(Value::as_i64).unwrap_or(0);
//!         ctx.set("value", json!(value * self.factor));
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::context::FlowContext;
use crate::deadline;
use crate::error::{ComponentFailure, FlowError};

/// One processing unit in a flow.
#[async_trait]
pub trait Component: Send + Sync {
    /// Instance name; matches the component name used in the flow config.
    fn name(&self) -> &str;

    /// One-time initialization with the component's declared config block.
    /// Called exactly once, before the first use.
    fn init(&mut self, _config: Map<String, Value>) {}

    /// Per-invocation preparation; runs before every `process`.
    fn setup(&self, _ctx: &mut FlowContext) {}

    /// Synchronous processing. Mutate the context, optionally set an
    /// output port, optionally signal suspension via
    /// [`FlowContext::suspend`].
    fn process(&self, ctx: &mut FlowContext) -> Result<(), ComponentFailure>;

    /// Cooperative-async processing. The default delegates to
    /// [`process`](Self::process); override together with
    /// [`supports_async`](Self::supports_async) to do real async work.
    async fn process_async(&self, ctx: &mut FlowContext) -> Result<(), ComponentFailure> {
        self.process(ctx)
    }

    /// Whether the executor should prefer [`process_async`](Self::process_async).
    fn supports_async(&self) -> bool {
        false
    }

    /// Per-invocation cleanup; runs after every `process`, success or not.
    fn teardown(&self, _ctx: &mut FlowContext) {}

    /// Configuration problems, as human-readable strings. Empty means valid.
    fn validate_config(&self) -> Vec<String> {
        Vec::new()
    }

    /// Liveness probe.
    fn health_check(&self) -> bool {
        true
    }

    /// Cooperative deadline probe for use inside `process`. Propagate the
    /// error with `?`; the executor re-raises it as a flow timeout.
    fn check_deadline(&self, ctx: &mut FlowContext) -> Result<(), FlowError> {
        deadline::check(ctx, self.name())
    }

    /// Select which outgoing graph edges fire for this node.
    fn set_output_port(&self, ctx: &mut FlowContext, port: &str) {
        ctx.set_active_port(port);
    }
}

impl std::fmt::Debug for dyn Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component").field("name", &self.name()).finish()
    }
}
