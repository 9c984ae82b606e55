//! Per-execution telemetry.
//!
//! [`ExecutionMetadata`] travels inside the [`FlowContext`](crate::context::FlowContext)
//! and accumulates everything observable about one execution: timings,
//! skips, errors, graph bookkeeping, and suspension state. It serializes
//! as part of the context (the transient deadline fields are skipped) and
//! round-trips through checkpoints.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;

/// Timing record for one executed step or node.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StepTiming {
    /// Index of the step in the flow definition (step flows only).
    pub step_index: Option<usize>,
    /// Component name that ran.
    pub component: String,
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration in seconds.
    pub duration: f64,
    /// Position in the actual execution order (0-based, skips excluded).
    pub execution_order: usize,
}

/// One recorded component error.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorRecord {
    pub component: String,
    pub message: String,
    pub error_type: String,
    pub timestamp: DateTime<Utc>,
}

/// One recorded condition-evaluation error.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConditionErrorRecord {
    pub component: String,
    pub condition: String,
    pub message: String,
}

/// Telemetry for a single flow execution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    /// Fresh unique identifier generated at execution start.
    pub flow_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Ordered per-step timings.
    pub step_timings: Vec<StepTiming>,
    /// Aggregate duration per component name (sums repeated executions).
    pub component_timings: FxHashMap<String, f64>,
    /// Components skipped by condition or error policy, in order.
    pub skipped_components: Vec<String>,
    pub errors: Vec<ErrorRecord>,
    pub condition_errors: Vec<ConditionErrorRecord>,
    /// Graph nodes that terminated normally; resume skips these.
    pub completed_nodes: Vec<String>,
    /// Source of truth for cyclic flows: executions per node id.
    pub node_visit_counts: FxHashMap<String, u32>,
    /// Total back-edge re-entries across all cycles.
    pub iteration_count: u32,
    pub max_iterations_reached: bool,
    pub suspended: bool,
    pub suspended_at_node: Option<String>,
    pub suspension_reason: Option<String>,

    /// Wall-clock deadline for the step currently executing. Installed
    /// and cleared by the executor; read by `check_deadline`. Transient.
    #[serde(skip)]
    pub deadline: Option<Instant>,
    /// Whether the current step called `check_deadline` at least once.
    /// Transient.
    #[serde(skip)]
    pub deadline_checked: bool,
}

impl Default for ExecutionMetadata {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionMetadata {
    pub fn new() -> Self {
        ExecutionMetadata {
            flow_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            completed_at: None,
            step_timings: Vec::new(),
            component_timings: FxHashMap::default(),
            skipped_components: Vec::new(),
            errors: Vec::new(),
            condition_errors: Vec::new(),
            completed_nodes: Vec::new(),
            node_visit_counts: FxHashMap::default(),
            iteration_count: 0,
            max_iterations_reached: false,
            suspended: false,
            suspended_at_node: None,
            suspension_reason: None,
            deadline: None,
            deadline_checked: false,
        }
    }

    /// Record a timing entry. `execution_order` continues from the number
    /// of entries already present, so it stays correct across a
    /// checkpoint/restore boundary.
    pub fn record_timing(
        &mut self,
        component: &str,
        duration: f64,
        started_at: DateTime<Utc>,
        step_index: Option<usize>,
    ) {
        let execution_order = self.step_timings.len();
        self.step_timings.push(StepTiming {
            step_index,
            component: component.to_string(),
            started_at,
            duration,
            execution_order,
        });
        *self
            .component_timings
            .entry(component.to_string())
            .or_insert(0.0) += duration;
    }

    pub fn add_error(&mut self, component: &str, error_type: &str, message: &str) {
        self.errors.push(ErrorRecord {
            component: component.to_string(),
            message: message.to_string(),
            error_type: error_type.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn add_condition_error(&mut self, component: &str, condition: &str, message: &str) {
        self.condition_errors.push(ConditionErrorRecord {
            component: component.to_string(),
            condition: condition.to_string(),
            message: message.to_string(),
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Total execution duration in seconds, once completed.
    pub fn total_duration(&self) -> Option<f64> {
        self.completed_at.map(|done| {
            (done - self.started_at)
                .to_std()
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0)
        })
    }

    /// Attribute projection for the condition evaluator
    /// (`context.metadata.<attr>`). Unknown attributes resolve to null,
    /// matching the data bag's missing-path behavior.
    pub fn eval_attr(&self, attr: &str) -> Value {
        match attr {
            "flow_id" => json!(self.flow_id),
            "has_errors" => json!(self.has_errors()),
            "iteration_count" => json!(self.iteration_count),
            "max_iterations_reached" => json!(self.max_iterations_reached),
            "suspended" => json!(self.suspended),
            "completed_nodes" => json!(self.completed_nodes),
            "skipped_components" => json!(self.skipped_components),
            _ => Value::Null,
        }
    }
}
