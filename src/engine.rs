//! The flow engine: dispatch, suspension, resume.
//!
//! [`FlowEngine`] owns a validated configuration and the component
//! instances, selects the executor matching the flow type, installs the
//! deadline, fans lifecycle events out to hooks, turns suspension signals
//! into checkpoints, and implements resume.
//!
//! # Examples
//!
//! ```rust,no_run
//! use flowloom::config::FlowConfig;
//! use flowloom::context::FlowContext;
//! use flowloom::engine::FlowEngine;
//! use flowloom::component::Component;
//! use rustc_hash::FxHashMap;
//!
//! # async fn example(config: FlowConfig, components: FxHashMap<String, Box<dyn Component>>)
//! #     -> Result<(), flowloom::error::FlowError> {
//! let engine = FlowEngine::new(config, components)?;
//! let result = engine.execute(None).await?;
//! println!("{}", result.to_json()?);
//! # Ok(())
//! # }
//! ```

use chrono::Utc;
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::component::Component;
use crate::config::{FlowConfig, FlowType, OnConditionError, OnError, StepConfig};
use crate::context::FlowContext;
use crate::error::FlowError;
use crate::eval::ConditionEvaluator;
use crate::graph::analysis::GraphAnalysis;
use crate::graph::GraphExecutor;
use crate::hooks::{fan_out, ExecutionHook};
use crate::isolation::{self, ProcessOutcome, WorkerSpec};
use crate::persistence::PersistedContext;
use crate::registry::ComponentRegistry;

/// Whether a step actually ran. A step that errored under
/// `on_error = continue` counts as run; downstream conditions see the
/// data it wrote before failing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StepResult {
    Executed,
    Skipped,
}

/// Executes a flow defined by a configuration.
pub struct FlowEngine {
    config: FlowConfig,
    components: FxHashMap<String, Arc<dyn Component>>,
    evaluator: ConditionEvaluator,
    checkpoint_store: Option<Arc<dyn CheckpointStore>>,
    hooks: Vec<Box<dyn ExecutionHook>>,
    worker_specs: FxHashMap<String, WorkerSpec>,
    on_condition_error: OnConditionError,
}

impl std::fmt::Debug for FlowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowEngine")
            .field("config", &self.config)
            .field("on_condition_error", &self.on_condition_error)
            .finish_non_exhaustive()
    }
}

impl FlowEngine {
    /// Build an engine from a configuration and a name→instance map.
    ///
    /// Validates the configuration structure, initializes every
    /// referenced component with its declared config block, and surfaces
    /// `validate_config` complaints.
    pub fn new(
        config: FlowConfig,
        mut components: FxHashMap<String, Box<dyn Component>>,
    ) -> Result<Self, FlowError> {
        config.validate_structure()?;

        // Conditional flows default to lenient condition-error handling:
        // a failing condition skips its branch instead of killing the
        // dispatch. An explicit non-default setting is preserved.
        let mut on_condition_error = config.settings().on_condition_error;
        if config.flow.flow_type == FlowType::Conditional
            && on_condition_error == OnConditionError::Fail
        {
            tracing::debug!("conditional flow: defaulting on_condition_error to skip");
            on_condition_error = OnConditionError::Skip;
        }

        // Initialize each referenced component exactly once.
        let mut referenced: Vec<&str> = match config.flow.flow_type {
            FlowType::Graph => config.nodes().iter().map(|n| n.component.as_str()).collect(),
            _ => config.steps().iter().map(|s| s.component.as_str()).collect(),
        };
        referenced.sort_unstable();
        referenced.dedup();
        for name in referenced {
            let component = components
                .get_mut(name)
                .ok_or_else(|| FlowError::Execution(format!("component not found: {name}")))?;
            let block = config
                .component_config(name)
                .map(|c| c.config.clone())
                .unwrap_or_default();
            component.init(block);
            let problems = component.validate_config();
            if !problems.is_empty() {
                return Err(FlowError::Execution(format!(
                    "invalid config for {name}: {problems:?}"
                )));
            }
        }

        let worker_specs = config
            .components
            .iter()
            .map(|c| {
                (
                    c.name.clone(),
                    WorkerSpec {
                        type_name: c.type_name.clone(),
                        config: c.config.clone(),
                    },
                )
            })
            .collect();

        let components = components
            .into_iter()
            .map(|(name, boxed)| (name, Arc::from(boxed)))
            .collect();

        Ok(FlowEngine {
            config,
            components,
            evaluator: ConditionEvaluator::new(),
            checkpoint_store: None,
            hooks: Vec::new(),
            worker_specs,
            on_condition_error,
        })
    }

    /// Build an engine by instantiating components from the config's
    /// `type` fields through a registry.
    pub fn from_config(
        config: FlowConfig,
        registry: &ComponentRegistry,
    ) -> Result<Self, FlowError> {
        let mut components: FxHashMap<String, Box<dyn Component>> = FxHashMap::default();
        for declared in &config.components {
            let instance = registry.create(&declared.type_name, &declared.name)?;
            components.insert(declared.name.clone(), instance);
        }
        Self::new(config, components)
    }

    /// Attach a checkpoint store, enabling suspend/resume.
    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoint_store = Some(store);
        self
    }

    /// Register an execution hook.
    pub fn with_hook(mut self, hook: impl ExecutionHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Replace the condition evaluator.
    pub fn with_evaluator(mut self, evaluator: ConditionEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Execute the flow, creating a fresh context unless one is given.
    ///
    /// On success the final context is returned, with metadata indicating
    /// completion. On suspension, `data["checkpoint_id"]`
    /// carries the snapshot id when a store is configured.
    pub async fn execute(&self, initial: Option<FlowContext>) -> Result<FlowContext, FlowError> {
        let mut ctx = initial.unwrap_or_default();
        self.execute_with(&mut ctx).await?;
        Ok(ctx)
    }

    /// Execute with an input payload attached to a fresh context.
    pub async fn execute_with_input(&self, input: Value) -> Result<FlowContext, FlowError> {
        self.execute(Some(FlowContext::with_input(input))).await
    }

    /// Execute against a caller-owned context. On error the caller keeps
    /// the context, with timings, errors, and `completed_at` populated up
    /// to the failure point.
    pub async fn execute_with(&self, ctx: &mut FlowContext) -> Result<(), FlowError> {
        tracing::info!(
            flow_id = %ctx.metadata.flow_id,
            flow_type = ?self.config.flow.flow_type,
            "starting flow execution"
        );

        let result = match self.config.flow.flow_type {
            FlowType::Graph => self.run_graph(ctx).await,
            FlowType::Sequential | FlowType::Conditional => self.run_steps(ctx).await,
        };

        if !ctx.metadata.suspended {
            ctx.metadata.completed_at = Some(Utc::now());
        }
        result?;

        if ctx.metadata.suspended {
            let checkpoint_id = match &self.checkpoint_store {
                Some(store) => {
                    let checkpoint =
                        Checkpoint::new(self.config.name.clone(), PersistedContext::from(&*ctx));
                    let id = store.save(checkpoint)?;
                    ctx.set("checkpoint_id", json!(id.clone()));
                    Some(id)
                }
                None => None,
            };
            let node = ctx.metadata.suspended_at_node.clone().unwrap_or_default();
            let reason = ctx.metadata.suspension_reason.clone().unwrap_or_default();
            fan_out(&self.hooks, "on_flow_suspended", |h| {
                h.on_flow_suspended(&node, &reason, checkpoint_id.as_deref())
            });
            tracing::info!(flow_id = %ctx.metadata.flow_id, node = %node, "flow suspended");
        } else {
            tracing::info!(
                flow_id = %ctx.metadata.flow_id,
                executed = ctx.metadata.step_timings.len(),
                "flow completed"
            );
        }
        Ok(())
    }

    /// Resume a suspended flow from a checkpoint.
    ///
    /// Restores the context (completed nodes and visit counts included),
    /// attaches `resume_data` under `data["resume_data"]`, and re-invokes
    /// the executor. Nodes already in `completed_nodes` are skipped; the
    /// suspended node re-executes. The consumed checkpoint is deleted
    /// once the re-dispatched run finishes.
    pub async fn resume(
        &self,
        checkpoint_id: &str,
        resume_data: Option<Value>,
    ) -> Result<FlowContext, FlowError> {
        let store = self
            .checkpoint_store
            .as_ref()
            .ok_or_else(|| FlowError::Execution("no checkpoint store configured".to_string()))?;

        let checkpoint = store
            .load(checkpoint_id)?
            .ok_or_else(|| FlowError::CheckpointNotFound {
                checkpoint_id: checkpoint_id.to_string(),
            })?;

        let mut ctx = FlowContext::from(checkpoint.context);
        ctx.metadata.suspended = false;
        ctx.metadata.suspension_reason = None;
        // suspended_at_node stays set until the executor consumes it, so
        // the suspended node re-executes.
        if let Some(data) = resume_data {
            ctx.set("resume_data", data);
        }

        self.execute_with(&mut ctx).await?;
        store.delete(checkpoint_id)?;
        Ok(ctx)
    }

    /// Validate the flow configuration against the loaded components.
    pub fn validate(&self) -> Vec<String> {
        let mut errors: Vec<String> = Vec::new();

        match self.config.flow.flow_type {
            FlowType::Graph => {
                for node in self.config.nodes() {
                    if !self.components.contains_key(&node.component) {
                        errors.push(format!("unknown component: {}", node.component));
                    }
                }
            }
            _ => {
                for step in self.config.steps() {
                    if !self.components.contains_key(&step.component) {
                        errors.push(format!("unknown component: {}", step.component));
                    }
                }
            }
        }

        let mut names: Vec<&String> = self.components.keys().collect();
        names.sort_unstable();
        for name in names {
            for problem in self.components[name].validate_config() {
                errors.push(format!("{name}: {problem}"));
            }
        }

        for step in self.config.steps() {
            if let Some(condition) = &step.condition {
                for problem in self.evaluator.validate(condition) {
                    errors.push(format!("{} condition: {problem}", step.component));
                }
            }
        }

        errors
    }

    /// List the component names the executor would run, without invoking
    /// any component. Conditions are evaluated against the given context;
    /// a condition that errors counts as no-match. DAG graphs report
    /// topological order; cyclic graphs report every referenced component
    /// in declaration order (they have no topological listing).
    pub fn dry_run(&self, context: Option<&FlowContext>) -> Vec<String> {
        let fresh;
        let ctx = match context {
            Some(ctx) => ctx,
            None => {
                fresh = FlowContext::new();
                &fresh
            }
        };

        match self.config.flow.flow_type {
            FlowType::Graph => {
                let analysis = GraphAnalysis::new(self.config.nodes(), self.config.edges());
                if analysis.has_cycles() {
                    return self
                        .config
                        .nodes()
                        .iter()
                        .map(|n| n.component.clone())
                        .collect();
                }
                let order = match analysis.topological_order() {
                    Ok(order) => order,
                    Err(_) => return Vec::new(),
                };
                order
                    .iter()
                    .filter_map(|id| {
                        self.config
                            .nodes()
                            .iter()
                            .find(|n| &n.id == id)
                            .map(|n| n.component.clone())
                    })
                    .collect()
            }
            FlowType::Sequential => self
                .config
                .steps()
                .iter()
                .filter(|step| self.condition_holds(step, ctx))
                .map(|step| step.component.clone())
                .collect(),
            FlowType::Conditional => self
                .config
                .steps()
                .iter()
                .find(|step| self.condition_holds(step, ctx))
                .map(|step| vec![step.component.clone()])
                .unwrap_or_default(),
        }
    }

    fn condition_holds(&self, step: &StepConfig, ctx: &FlowContext) -> bool {
        match &step.condition {
            None => true,
            Some(condition) => self.evaluator.evaluate(condition, ctx).unwrap_or(false),
        }
    }

    async fn run_graph(&self, ctx: &mut FlowContext) -> Result<(), FlowError> {
        let executor = GraphExecutor::new(
            self.config.nodes(),
            self.config.edges(),
            self.config.settings(),
            &self.components,
            &self.hooks,
            &self.worker_specs,
        );
        executor.execute(ctx).await
    }

    async fn run_steps(&self, ctx: &mut FlowContext) -> Result<(), FlowError> {
        let flow_start = Instant::now();
        let conditional = self.config.flow.flow_type == FlowType::Conditional;
        // Step flows have no per-node queue to seed; the marker is
        // consumed here and resume relies on the step:{i} completion ids.
        ctx.metadata.suspended_at_node = None;

        let steps = self.config.steps();
        for (idx, step) in steps.iter().enumerate() {
            let step_marker = format!("step:{idx}");
            if self.checkpoint_store.is_some()
                && ctx.metadata.completed_nodes.iter().any(|n| *n == step_marker)
            {
                tracing::debug!(component = %step.component, "skipping already-completed step");
                continue;
            }

            let executed = self.execute_step(step, idx, ctx, flow_start).await?;

            if ctx.metadata.suspended {
                return Ok(());
            }

            if executed == StepResult::Executed {
                // Completion markers only matter when resume is possible;
                // plain runs keep clean metadata.
                if self.checkpoint_store.is_some() {
                    ctx.metadata.completed_nodes.push(step_marker);
                }
                if conditional {
                    tracing::debug!(
                        component = %step.component,
                        "conditional flow: stopping after first match"
                    );
                    for later in &steps[idx + 1..] {
                        ctx.metadata
                            .skipped_components
                            .push(later.component.clone());
                    }
                    break;
                }
            }
        }
        Ok(())
    }

    async fn execute_step(
        &self,
        step: &StepConfig,
        idx: usize,
        ctx: &mut FlowContext,
        flow_start: Instant,
    ) -> Result<StepResult, FlowError> {
        let component = self.components.get(&step.component).ok_or_else(|| {
            FlowError::Execution(format!("component not found: {}", step.component))
        })?;

        if let Some(condition) = &step.condition {
            match self.evaluator.evaluate(condition, ctx) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!(component = %step.component, "skipping step: condition not met");
                    ctx.metadata
                        .skipped_components
                        .push(step.component.clone());
                    fan_out(&self.hooks, "on_node_skipped", |h| {
                        h.on_node_skipped(&step.component, &step.component, "condition not met")
                    });
                    return Ok(StepResult::Skipped);
                }
                Err(eval_err) => {
                    ctx.metadata.add_condition_error(
                        &step.component,
                        condition,
                        &eval_err.to_string(),
                    );
                    match self.on_condition_error {
                        OnConditionError::Fail => {
                            tracing::error!(
                                component = %step.component,
                                error = %eval_err,
                                "condition evaluation failed"
                            );
                            return Err(FlowError::ConditionEval {
                                component: Some(step.component.clone()),
                                condition: condition.clone(),
                                source: eval_err,
                            });
                        }
                        OnConditionError::Skip => {
                            tracing::info!(
                                component = %step.component,
                                error = %eval_err,
                                "skipping step due to condition error"
                            );
                        }
                        OnConditionError::Warn => {
                            tracing::warn!(
                                component = %step.component,
                                error = %eval_err,
                                "condition evaluation failed; skipping step"
                            );
                        }
                    }
                    ctx.metadata
                        .skipped_components
                        .push(step.component.clone());
                    fan_out(&self.hooks, "on_node_skipped", |h| {
                        h.on_node_skipped(&step.component, &step.component, "condition error")
                    });
                    return Ok(StepResult::Skipped);
                }
            }
        }

        tracing::debug!(component = %step.component, "executing step");
        fan_out(&self.hooks, "on_node_start", |h| {
            h.on_node_start(&step.component, &step.component, ctx)
        });

        let outcome = isolation::run_step(
            component,
            ctx,
            self.config.settings(),
            flow_start,
            &step.component,
            Some(idx),
            self.worker_specs.get(&step.component).cloned(),
        )
        .await?;

        match outcome {
            ProcessOutcome::Completed { duration } => {
                fan_out(&self.hooks, "on_node_complete", |h| {
                    h.on_node_complete(&step.component, &step.component, ctx, duration)
                });
                tracing::info!(component = %step.component, duration, "completed step");
                Ok(StepResult::Executed)
            }
            ProcessOutcome::Failed { failure, .. } => {
                fan_out(&self.hooks, "on_node_error", |h| {
                    h.on_node_error(&step.component, &step.component, &failure, ctx)
                });
                tracing::error!(component = %step.component, error = %failure, "step failed");

                if step.on_error == OnError::Fail || self.config.settings().fail_fast {
                    return Err(FlowError::Component {
                        component: step.component.clone(),
                        message: failure.to_string(),
                        error_type: failure.error_type().to_string(),
                    });
                }
                if step.on_error == OnError::Skip {
                    ctx.metadata
                        .skipped_components
                        .push(step.component.clone());
                    Ok(StepResult::Skipped)
                } else {
                    Ok(StepResult::Executed)
                }
            }
        }
    }
}
