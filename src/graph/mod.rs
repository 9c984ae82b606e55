//! Graph flow execution.
//!
//! Each execution classifies edges first. Acyclic graphs take the DAG
//! fast path: one topological pass with port-gated edge activation.
//! Graphs with back-edges take the cyclic path: a ready-queue BFS bounded
//! by `max_iterations`, with per-node visit caps.
//!
//! Bookkeeping rules that make checkpoint/resume correct:
//! `node_visit_counts` is the source of truth for cycle-participant
//! nodes; `completed_nodes` only holds nodes that have fully terminated
//! (terminal nodes and nodes outside every cycle). On resume, a node in
//! `completed_nodes` is skipped while a node with only a visit count is
//! eligible to run again.

pub(crate) mod analysis;

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use crate::component::Component;
use crate::config::{FlowSettings, NodeConfig, OnError, OnMaxIterations};
use crate::context::FlowContext;
use crate::error::FlowError;
use crate::hooks::{fan_out, ExecutionHook};
use crate::isolation::{self, ProcessOutcome, WorkerSpec};

use analysis::GraphAnalysis;

/// How one node execution ended, policy already applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NodeOutcome {
    Completed,
    /// Errored under `on_error = continue`: downstream edges fire with no
    /// active port.
    ErroredContinue,
    /// Errored under `on_error = skip`: downstream edges do not fire.
    ErroredSkip,
}

pub(crate) struct GraphExecutor<'a> {
    nodes: FxHashMap<&'a str, &'a NodeConfig>,
    settings: &'a FlowSettings,
    components: &'a FxHashMap<String, Arc<dyn Component>>,
    hooks: &'a [Box<dyn ExecutionHook>],
    worker_specs: &'a FxHashMap<String, WorkerSpec>,
    analysis: GraphAnalysis,
}

impl<'a> GraphExecutor<'a> {
    pub fn new(
        nodes: &'a [NodeConfig],
        edges: &'a [crate::config::EdgeConfig],
        settings: &'a FlowSettings,
        components: &'a FxHashMap<String, Arc<dyn Component>>,
        hooks: &'a [Box<dyn ExecutionHook>],
        worker_specs: &'a FxHashMap<String, WorkerSpec>,
    ) -> Self {
        let analysis = GraphAnalysis::new(nodes, edges);
        GraphExecutor {
            nodes: nodes.iter().map(|n| (n.id.as_str(), n)).collect(),
            settings,
            components,
            hooks,
            worker_specs,
            analysis,
        }
    }

    pub async fn execute(&self, ctx: &mut FlowContext) -> Result<(), FlowError> {
        let flow_start = Instant::now();
        if self.analysis.has_cycles() {
            self.execute_cyclic(ctx, flow_start).await
        } else {
            self.execute_dag(ctx, flow_start).await
        }
    }

    /// Topological pass with activation tracking. Root nodes are always
    /// activated; other nodes run only when an incoming edge fired.
    async fn execute_dag(&self, ctx: &mut FlowContext, flow_start: Instant) -> Result<(), FlowError> {
        let order = self.analysis.topological_order()?;
        // The DAG path re-runs the suspended node automatically (it is not
        // in completed_nodes); the marker is just consumed here.
        ctx.metadata.suspended_at_node = None;

        let mut activated: FxHashSet<String> = self.analysis.roots().into_iter().collect();

        for node_id in &order {
            let node = self.node(node_id)?;

            if ctx.metadata.completed_nodes.iter().any(|n| n == node_id) {
                tracing::debug!(node_id = %node_id, "skipping already-completed node");
                // The port the node chose before suspension is unknown;
                // propagate along unconditional edges only.
                for target in self.analysis.reachable_targets(node_id, None) {
                    activated.insert(target);
                }
                continue;
            }

            if !activated.contains(node_id.as_str()) {
                tracing::info!(node_id = %node_id, "skipping unreachable node");
                ctx.metadata
                    .skipped_components
                    .push(node.component.clone());
                fan_out(self.hooks, "on_node_skipped", |h| {
                    h.on_node_skipped(node_id, &node.component, "unreachable")
                });
                continue;
            }

            let outcome = self.execute_node(node_id, node, ctx, flow_start).await?;

            // A suspended node is deliberately NOT marked completed, so it
            // re-runs on resume and sees the resume payload.
            if ctx.metadata.suspended {
                return Ok(());
            }

            match outcome {
                NodeOutcome::Completed => {
                    ctx.metadata.completed_nodes.push(node_id.clone());
                    let port = ctx.active_port().map(str::to_string);
                    for target in self.analysis.reachable_targets(node_id, port.as_deref()) {
                        activated.insert(target);
                    }
                }
                NodeOutcome::ErroredContinue => {
                    ctx.metadata.completed_nodes.push(node_id.clone());
                    for target in self.analysis.reachable_targets(node_id, None) {
                        activated.insert(target);
                    }
                }
                NodeOutcome::ErroredSkip => {
                    // Downstream edges do not fire; nodes reachable only
                    // through this one will be skipped as unreachable.
                }
            }
        }
        Ok(())
    }

    /// Ready-queue BFS for graphs with back-edges. `iteration_count`
    /// increments when a node is enqueued along a back-edge, and the
    /// `on_max_iterations` policy applies immediately after the increment.
    async fn execute_cyclic(
        &self,
        ctx: &mut FlowContext,
        flow_start: Instant,
    ) -> Result<(), FlowError> {
        let cycle_nodes = self.analysis.cycle_nodes();

        let mut queue: VecDeque<String> = match ctx.metadata.suspended_at_node.take() {
            Some(node) => VecDeque::from([node]),
            None => self.analysis.cyclic_roots().into(),
        };

        while let Some(node_id) = queue.pop_front() {
            let node = self.node(&node_id)?;

            let visits = ctx
                .metadata
                .node_visit_counts
                .get(&node_id)
                .copied()
                .unwrap_or(0);
            let effective_max = node.max_visits.unwrap_or(self.settings.max_iterations);
            if visits >= effective_max {
                // This path is exhausted.
                continue;
            }

            let outcome = self.execute_node(&node_id, node, ctx, flow_start).await?;
            *ctx
                .metadata
                .node_visit_counts
                .entry(node_id.clone())
                .or_insert(0) += 1;

            if ctx.metadata.suspended {
                return Ok(());
            }

            // Cycle participants are tracked by visit counts only.
            if outcome != NodeOutcome::ErroredSkip
                && !cycle_nodes.contains(node_id.as_str())
                && !ctx.metadata.completed_nodes.iter().any(|n| *n == node_id)
            {
                ctx.metadata.completed_nodes.push(node_id.clone());
            }

            let fire_port = match outcome {
                NodeOutcome::Completed => ctx.active_port().map(str::to_string),
                NodeOutcome::ErroredContinue => None,
                NodeOutcome::ErroredSkip => continue,
            };

            for target in self
                .analysis
                .reachable_targets(&node_id, fire_port.as_deref())
            {
                if self.analysis.is_back_edge(&node_id, &target) {
                    ctx.metadata.iteration_count += 1;
                    let iteration = ctx.metadata.iteration_count;
                    fan_out(self.hooks, "on_iteration_start", |h| {
                        h.on_iteration_start(iteration, &target)
                    });

                    if iteration >= self.settings.max_iterations {
                        ctx.metadata.max_iterations_reached = true;
                        fan_out(self.hooks, "on_max_iterations", |h| {
                            h.on_max_iterations(self.settings.max_iterations, &target)
                        });
                        match self.settings.on_max_iterations {
                            OnMaxIterations::Fail => {
                                return Err(FlowError::MaxIterations {
                                    max_iterations: self.settings.max_iterations,
                                    actual_iterations: iteration,
                                    cycle_entry_node: target,
                                });
                            }
                            OnMaxIterations::Warn => {
                                tracing::warn!(
                                    node_id = %target,
                                    max = self.settings.max_iterations,
                                    actual = iteration,
                                    "max iterations reached; stopping cyclic execution"
                                );
                                return Ok(());
                            }
                            OnMaxIterations::Exit => return Ok(()),
                        }
                    }
                }
                queue.push_back(target);
            }
        }
        Ok(())
    }

    /// Full node lifecycle: port clearing, hooks, invocation under the
    /// timeout mode, error policy.
    async fn execute_node(
        &self,
        node_id: &str,
        node: &NodeConfig,
        ctx: &mut FlowContext,
        flow_start: Instant,
    ) -> Result<NodeOutcome, FlowError> {
        let component = self.components.get(&node.component).ok_or_else(|| {
            FlowError::Execution(format!(
                "component not found for node '{node_id}': {}",
                node.component
            ))
        })?;

        // The active port is per-node transient state.
        ctx.clear_port();

        fan_out(self.hooks, "on_node_start", |h| {
            h.on_node_start(node_id, &node.component, ctx)
        });

        let outcome = isolation::run_step(
            component,
            ctx,
            self.settings,
            flow_start,
            node_id,
            None,
            self.worker_specs.get(&node.component).cloned(),
        )
        .await?;

        match outcome {
            ProcessOutcome::Completed { duration } => {
                fan_out(self.hooks, "on_node_complete", |h| {
                    h.on_node_complete(node_id, &node.component, ctx, duration)
                });
                tracing::info!(node_id, duration, "completed node");
                Ok(NodeOutcome::Completed)
            }
            ProcessOutcome::Failed { failure, .. } => {
                fan_out(self.hooks, "on_node_error", |h| {
                    h.on_node_error(node_id, &node.component, &failure, ctx)
                });
                tracing::error!(node_id, error = %failure, "node failed");

                if node.on_error == OnError::Fail || self.settings.fail_fast {
                    return Err(FlowError::Component {
                        component: node.component.clone(),
                        message: failure.to_string(),
                        error_type: failure.error_type().to_string(),
                    });
                }
                if node.on_error == OnError::Skip {
                    ctx.metadata
                        .skipped_components
                        .push(node.component.clone());
                    Ok(NodeOutcome::ErroredSkip)
                } else {
                    Ok(NodeOutcome::ErroredContinue)
                }
            }
        }
    }

    fn node(&self, node_id: &str) -> Result<&'a NodeConfig, FlowError> {
        self.nodes.get(node_id).copied().ok_or_else(|| {
            FlowError::Execution(format!("unknown node id in execution state: {node_id}"))
        })
    }
}
