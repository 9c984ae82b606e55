//! Flow configuration types.
//!
//! The engine receives a fully parsed configuration, typically
//! deserialized from YAML or JSON by the host, shaped like:
//!
//! ```yaml
//! name: "My Flow"
//! version: "1.0"
//! components:
//!   - name: fetcher
//!     type: myapp.FetchComponent
//!     config:
//!       url: "https://api.example.com"
//! flow:
//!   type: sequential
//!   settings:
//!     fail_fast: true
//!     timeout_seconds: 60
//!   steps:
//!     - component: fetcher
//! ```
//!
//! Parsing the file format is the host's concern; this module only defines
//! the shape (everything derives [`serde::Deserialize`]) and the structural
//! validation the engine runs before execution.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::FlowError;

/// Flow execution type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    /// Run every step in order; conditions gate individual steps.
    #[default]
    Sequential,
    /// First-match branching: stop after the first step whose condition holds.
    Conditional,
    /// Node-and-edge execution with port-based routing.
    Graph,
}

/// Timeout enforcement mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutMode {
    /// Components run inline and must call `check_deadline` to respect
    /// timeouts.
    #[default]
    Cooperative,
    /// Steps run on a worker task raced against the deadline; cancellation
    /// is best-effort.
    HardAsync,
    /// Steps run in a spawned worker process that is killed on expiry.
    HardProcess,
}

/// Per-step/per-node error policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Abort the flow.
    #[default]
    Fail,
    /// Record the error, mark the step skipped, continue.
    Skip,
    /// Record the error and continue; the step counts as run.
    Continue,
}

/// Policy for condition evaluation failures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnConditionError {
    #[default]
    Fail,
    Skip,
    Warn,
}

/// Policy when a cyclic graph reaches `max_iterations`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnMaxIterations {
    #[default]
    Fail,
    Exit,
    Warn,
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> Option<f64> {
    Some(300.0)
}

fn default_max_iterations() -> u32 {
    10
}

fn default_version() -> String {
    "1.0".to_string()
}

/// Flow execution settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlowSettings {
    /// Stop on the first component error. Default true.
    #[serde(default = "default_true")]
    pub fail_fast: bool,
    /// Maximum flow execution time in seconds. `None` disables the
    /// deadline entirely. Default 300.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: Option<f64>,
    #[serde(default)]
    pub timeout_mode: TimeoutMode,
    /// In cooperative mode, fail (rather than warn) when a long-running
    /// component never calls `check_deadline`. Default false.
    #[serde(default)]
    pub require_deadline_check: bool,
    #[serde(default)]
    pub on_condition_error: OnConditionError,
    /// Iteration budget for cyclic graphs. Default 10.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default)]
    pub on_max_iterations: OnMaxIterations,
}

impl Default for FlowSettings {
    fn default() -> Self {
        FlowSettings {
            fail_fast: true,
            timeout_seconds: default_timeout(),
            timeout_mode: TimeoutMode::default(),
            require_deadline_check: false,
            on_condition_error: OnConditionError::default(),
            max_iterations: default_max_iterations(),
            on_max_iterations: OnMaxIterations::default(),
        }
    }
}

/// One step of a sequential or conditional flow.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepConfig {
    /// Name of the component to execute.
    pub component: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Boolean condition expression gating this step.
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub on_error: OnError,
}

impl StepConfig {
    pub fn new(component: impl Into<String>) -> Self {
        StepConfig {
            component: component.into(),
            description: None,
            condition: None,
            on_error: OnError::default(),
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_on_error(mut self, on_error: OnError) -> Self {
        self.on_error = on_error;
        self
    }
}

/// A node in a graph flow.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique node id within the graph.
    pub id: String,
    /// Name of the component this node executes.
    pub component: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub on_error: OnError,
    /// Maximum executions of this node in cyclic graphs. `None` falls back
    /// to the flow-level `max_iterations`.
    #[serde(default)]
    pub max_visits: Option<u32>,
}

impl NodeConfig {
    pub fn new(id: impl Into<String>, component: impl Into<String>) -> Self {
        NodeConfig {
            id: id.into(),
            component: component.into(),
            description: None,
            on_error: OnError::default(),
            max_visits: None,
        }
    }

    pub fn with_max_visits(mut self, max_visits: u32) -> Self {
        self.max_visits = Some(max_visits);
        self
    }

    pub fn with_on_error(mut self, on_error: OnError) -> Self {
        self.on_error = on_error;
        self
    }
}

/// A directed edge between two graph nodes, optionally gated on a port.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EdgeConfig {
    pub source: String,
    pub target: String,
    /// Output port name. `None` means the edge fires unconditionally.
    #[serde(default)]
    pub port: Option<String>,
}

impl EdgeConfig {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        EdgeConfig {
            source: source.into(),
            target: target.into(),
            port: None,
        }
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }
}

/// Declaration of one component instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Unique component name within the flow.
    pub name: String,
    /// Component type name, resolvable through a
    /// [`ComponentRegistry`](crate::registry::ComponentRegistry).
    #[serde(rename = "type")]
    pub type_name: String,
    /// Component-specific configuration.
    #[serde(default)]
    pub config: Map<String, Value>,
}

/// Flow structure definition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlowDefinition {
    #[serde(rename = "type", default)]
    pub flow_type: FlowType,
    #[serde(default)]
    pub settings: FlowSettings,
    /// Ordered steps (sequential/conditional flows).
    #[serde(default)]
    pub steps: Option<Vec<StepConfig>>,
    /// Graph nodes (graph flows).
    #[serde(default)]
    pub nodes: Option<Vec<NodeConfig>>,
    /// Graph edges (graph flows).
    #[serde(default)]
    pub edges: Option<Vec<EdgeConfig>>,
}

impl Default for FlowDefinition {
    fn default() -> Self {
        FlowDefinition {
            flow_type: FlowType::Sequential,
            settings: FlowSettings::default(),
            steps: None,
            nodes: None,
            edges: None,
        }
    }
}

/// Complete flow configuration: the root object handed to the engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlowConfig {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
    pub flow: FlowDefinition,
}

impl FlowConfig {
    /// Shortcut to the flow settings.
    pub fn settings(&self) -> &FlowSettings {
        &self.flow.settings
    }

    /// Steps of a step-based flow (empty slice for graph flows).
    pub fn steps(&self) -> &[StepConfig] {
        self.flow.steps.as_deref().unwrap_or(&[])
    }

    /// Nodes of a graph flow (empty slice for step flows).
    pub fn nodes(&self) -> &[NodeConfig] {
        self.flow.nodes.as_deref().unwrap_or(&[])
    }

    /// Edges of a graph flow.
    pub fn edges(&self) -> &[EdgeConfig] {
        self.flow.edges.as_deref().unwrap_or(&[])
    }

    /// Configuration block for a named component, if declared.
    pub fn component_config(&self, name: &str) -> Option<&ComponentConfig> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Structural validation: the checks a schema loader would perform.
    ///
    /// Returns `FlowError::Configuration` listing every problem found.
    pub fn validate_structure(&self) -> Result<(), FlowError> {
        let mut details: Vec<String> = Vec::new();

        // Unique component names.
        let mut comp_names: Vec<&str> = Vec::new();
        for comp in &self.components {
            if comp_names.contains(&comp.name.as_str()) {
                details.push(format!("duplicate component name: {}", comp.name));
            }
            comp_names.push(&comp.name);
        }

        match self.flow.flow_type {
            FlowType::Sequential | FlowType::Conditional => {
                if self.steps().is_empty() {
                    details.push("sequential/conditional flows require 'steps'".to_string());
                }
                for step in self.steps() {
                    if !comp_names.is_empty() && !comp_names.contains(&step.component.as_str()) {
                        details.push(format!(
                            "step references undefined component: {}",
                            step.component
                        ));
                    }
                }
            }
            FlowType::Graph => {
                if self.nodes().is_empty() {
                    details.push("graph flows require 'nodes'".to_string());
                }
                let mut node_ids: Vec<&str> = Vec::new();
                for node in self.nodes() {
                    if node_ids.contains(&node.id.as_str()) {
                        details.push(format!("duplicate node id: {}", node.id));
                    }
                    node_ids.push(&node.id);
                    if !comp_names.is_empty() && !comp_names.contains(&node.component.as_str()) {
                        details.push(format!(
                            "node '{}' references undefined component: {}",
                            node.id, node.component
                        ));
                    }
                }
                for edge in self.edges() {
                    if !node_ids.contains(&edge.source.as_str()) {
                        details.push(format!("edge source '{}' not found in nodes", edge.source));
                    }
                    if !node_ids.contains(&edge.target.as_str()) {
                        details.push(format!("edge target '{}' not found in nodes", edge.target));
                    }
                }
            }
        }

        if let Some(timeout) = self.flow.settings.timeout_seconds {
            if timeout <= 0.0 {
                details.push("timeout_seconds must be positive".to_string());
            }
        }
        if self.flow.settings.max_iterations == 0 {
            details.push("max_iterations must be at least 1".to_string());
        }

        if details.is_empty() {
            Ok(())
        } else {
            Err(FlowError::Configuration {
                message: format!("{} problem(s) found", details.len()),
                details,
            })
        }
    }
}
