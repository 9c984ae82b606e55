//! Error taxonomy for flow execution.
//!
//! Two layers of errors exist:
//!
//! - [`FlowError`]: engine-level errors surfaced to the caller of
//!   [`FlowEngine`](crate::engine::FlowEngine) operations.
//! - [`ComponentFailure`]: what a component's `process` returns on
//!   failure. The executors translate these into [`FlowError::Component`]
//!   or record them in metadata, depending on the error policy in effect.

use miette::Diagnostic;
use thiserror::Error;

use crate::eval::EvalError;

/// Engine-level errors.
///
/// `Timeout`, `DeadlineCheck`, and `MaxIterations` are always fatal to the
/// current execution regardless of `fail_fast`.
#[derive(Debug, Error, Diagnostic)]
pub enum FlowError {
    /// The loaded configuration is structurally invalid.
    #[error("invalid flow configuration: {message}")]
    #[diagnostic(
        code(flowloom::config::invalid),
        help("Fix the listed configuration problems before constructing the engine.")
    )]
    Configuration {
        message: String,
        details: Vec<String>,
    },

    /// A component's `process` failed and the error policy was `fail`.
    #[error("component '{component}' failed: {message}")]
    #[diagnostic(code(flowloom::component::failed))]
    Component {
        component: String,
        message: String,
        error_type: String,
    },

    /// The flow deadline passed.
    #[error("{message}")]
    #[diagnostic(
        code(flowloom::engine::timeout),
        help("Raise timeout_seconds, or make the component check deadlines cooperatively.")
    )]
    Timeout {
        message: String,
        /// Configured flow timeout in seconds, when known at the raise site.
        timeout: Option<f64>,
        /// Elapsed wall time in seconds at the point the overrun was observed.
        elapsed: f64,
        /// Step or node at which the overrun was observed.
        step: Option<String>,
    },

    /// Strict-mode violation: a long-running component never called
    /// `check_deadline` in cooperative mode.
    #[error(
        "component '{component}' ran for {duration:.2}s without calling check_deadline \
         (threshold {threshold:.1}s, require_deadline_check is enabled)"
    )]
    #[diagnostic(
        code(flowloom::engine::deadline_check),
        help("Call check_deadline(context) periodically inside process().")
    )]
    DeadlineCheck {
        component: String,
        duration: f64,
        threshold: f64,
    },

    /// A step condition could not be evaluated.
    #[error("condition evaluation failed for '{condition}': {source}")]
    #[diagnostic(code(flowloom::eval::condition))]
    ConditionEval {
        component: Option<String>,
        condition: String,
        #[source]
        source: EvalError,
    },

    /// Cyclic executor exceeded `max_iterations` with the `fail` policy.
    #[error(
        "cycle at node '{cycle_entry_node}' reached max_iterations={max_iterations} \
         (actual {actual_iterations})"
    )]
    #[diagnostic(
        code(flowloom::graph::max_iterations),
        help("Raise max_iterations, set per-node max_visits, or route out of the cycle.")
    )]
    MaxIterations {
        max_iterations: u32,
        actual_iterations: u32,
        cycle_entry_node: String,
    },

    /// `resume` was called with an id the store does not know.
    #[error("checkpoint not found: {checkpoint_id}")]
    #[diagnostic(code(flowloom::checkpoint::not_found))]
    CheckpointNotFound { checkpoint_id: String },

    /// Internal execution failure (missing component, no store configured,
    /// worker protocol breakage).
    #[error("flow execution failed: {0}")]
    #[diagnostic(code(flowloom::engine::execution))]
    Execution(String),

    /// Serialization failure while checkpointing or restoring a context.
    #[error("serialization failed: {source}")]
    #[diagnostic(code(flowloom::persistence::serde))]
    Serde {
        #[from]
        source: serde_json::Error,
    },
}

impl FlowError {
    /// True for errors that abort the execution regardless of `fail_fast`
    /// and per-step error policies.
    pub fn is_always_fatal(&self) -> bool {
        matches!(
            self,
            FlowError::Timeout { .. }
                | FlowError::DeadlineCheck { .. }
                | FlowError::MaxIterations { .. }
        )
    }
}

/// Failure returned by a component's `process`.
///
/// The `Failure` variant is the ordinary case: a message plus a short
/// `error_type` label that lands in `metadata.errors[].error_type`. The
/// `Flow` variant carries engine-level signals raised inside a component
/// (a `check_deadline` timeout propagated with `?`) back out without
/// losing their identity.
#[derive(Debug, Error, Diagnostic)]
pub enum ComponentFailure {
    #[error("{message}")]
    Failure {
        message: String,
        error_type: String,
        details: serde_json::Value,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Flow(#[from] FlowError),
}

impl ComponentFailure {
    /// A plain failure with the default `"error"` type label.
    pub fn msg(message: impl Into<String>) -> Self {
        ComponentFailure::Failure {
            message: message.into(),
            error_type: "error".to_string(),
            details: serde_json::Value::Null,
        }
    }

    /// A failure with an explicit type label.
    pub fn with_type(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        ComponentFailure::Failure {
            message: message.into(),
            error_type: error_type.into(),
            details: serde_json::Value::Null,
        }
    }

    /// Attach structured details to a `Failure`; no-op on `Flow`.
    pub fn with_details(self, details: serde_json::Value) -> Self {
        match self {
            ComponentFailure::Failure {
                message,
                error_type,
                ..
            } => ComponentFailure::Failure {
                message,
                error_type,
                details,
            },
            other => other,
        }
    }

    /// The type label recorded in `metadata.errors`.
    pub fn error_type(&self) -> &str {
        match self {
            ComponentFailure::Failure { error_type, .. } => error_type,
            ComponentFailure::Flow(FlowError::Timeout { .. }) => "Timeout",
            ComponentFailure::Flow(FlowError::DeadlineCheck { .. }) => "DeadlineCheck",
            ComponentFailure::Flow(_) => "FlowError",
        }
    }
}

impl From<String> for ComponentFailure {
    fn from(message: String) -> Self {
        ComponentFailure::msg(message)
    }
}

impl From<&str> for ComponentFailure {
    fn from(message: &str) -> Self {
        ComponentFailure::msg(message)
    }
}

impl From<serde_json::Error> for ComponentFailure {
    fn from(err: serde_json::Error) -> Self {
        ComponentFailure::with_type(err.to_string(), "SerdeError")
    }
}
