//! Step invocation under the three timeout enforcement modes.
//!
//! One step runs at a time; what differs per mode is *where* `process`
//! runs and how the deadline is enforced:
//!
//! - **Cooperative**: inline on the calling task. The component is
//!   expected to call `check_deadline`; a strict-mode rule flags
//!   long-running components that never do.
//! - **Hard async**: `process` runs on a worker (a `spawn_blocking`
//!   thread for sync components, the component's own future for async
//!   ones) raced against `tokio::time::timeout`. The worker gets a clone
//!   of the context and its result is adopted only on success, so a
//!   timed-out worker can never mutate state the flow continues with.
//! - **Hard process**: `process` runs in a spawned worker process (a
//!   re-exec of the current executable) that is killed on expiry. The
//!   host must call [`run_worker_if_requested`] first thing in `main`
//!   and register the component type in the worker-side registry.
//!
//! `setup` and `teardown` always run in the caller, and `teardown` runs
//! whenever `setup` ran, whether `process` succeeded, failed, or timed out.

use std::io::Read;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;

use crate::component::Component;
use crate::config::{FlowSettings, TimeoutMode};
use crate::context::FlowContext;
use crate::deadline::{self, DEADLINE_CHECK_WARNING_THRESHOLD};
use crate::error::{ComponentFailure, FlowError};
use crate::persistence::PersistedContext;
use crate::registry::ComponentRegistry;

/// Environment marker that switches a process into worker mode.
pub const WORKER_ENV: &str = "FLOWLOOM_ISOLATION_WORKER";

/// What the subprocess worker needs to reconstruct the component.
#[derive(Clone, Debug)]
pub(crate) struct WorkerSpec {
    pub type_name: String,
    pub config: Map<String, Value>,
}

/// Result of one step invocation, after timing has been recorded.
#[derive(Debug)]
pub(crate) enum ProcessOutcome {
    Completed { duration: f64 },
    Failed { failure: ComponentFailure, duration: f64 },
}

/// Run one step end to end: budget check, deadline install, lifecycle
/// under the configured timeout mode, timing, strict-mode check.
///
/// Fatal errors (flow timeout, strict deadline-check violation) come back
/// as `Err`; ordinary component failures come back as
/// `ProcessOutcome::Failed` with the error already recorded in metadata,
/// leaving the policy decision to the caller.
pub(crate) async fn run_step(
    component: &Arc<dyn Component>,
    ctx: &mut FlowContext,
    settings: &FlowSettings,
    flow_start: Instant,
    step_identifier: &str,
    step_index: Option<usize>,
    worker: Option<WorkerSpec>,
) -> Result<ProcessOutcome, FlowError> {
    // Remaining flow budget.
    let remaining = match settings.timeout_seconds {
        Some(timeout) => {
            let elapsed = flow_start.elapsed().as_secs_f64();
            let remaining = timeout - elapsed;
            if remaining <= 0.0 {
                return Err(FlowError::Timeout {
                    message: format!("flow timeout exceeded: {elapsed:.2}s > {timeout}s"),
                    timeout: Some(timeout),
                    elapsed,
                    step: Some(step_identifier.to_string()),
                });
            }
            Some(Duration::from_secs_f64(remaining))
        }
        None => None,
    };

    deadline::install(ctx, remaining);
    let started_at = chrono::Utc::now();
    let start = Instant::now();

    let result = run_process(component, ctx, settings.timeout_mode, remaining, worker).await;

    let elapsed = start.elapsed().as_secs_f64();
    let checked = ctx.metadata.deadline_checked;
    ctx.metadata
        .record_timing(component.name(), elapsed, started_at, step_index);
    deadline::clear(ctx);

    match result {
        Ok(()) => {
            if settings.timeout_mode == TimeoutMode::Cooperative
                && remaining.is_some()
                && elapsed > DEADLINE_CHECK_WARNING_THRESHOLD
                && !checked
            {
                if settings.require_deadline_check {
                    return Err(FlowError::DeadlineCheck {
                        component: component.name().to_string(),
                        duration: elapsed,
                        threshold: DEADLINE_CHECK_WARNING_THRESHOLD,
                    });
                }
                tracing::warn!(
                    component = component.name(),
                    elapsed,
                    "component never called check_deadline; consider adding deadline checks"
                );
            }
            Ok(ProcessOutcome::Completed { duration: elapsed })
        }
        Err(ComponentFailure::Flow(flow_err)) if flow_err.is_always_fatal() => Err(flow_err),
        Err(failure) => {
            ctx.metadata.add_error(
                component.name(),
                failure.error_type(),
                &failure.to_string(),
            );
            Ok(ProcessOutcome::Failed {
                failure,
                duration: elapsed,
            })
        }
    }
}

/// The lifecycle under one timeout mode. `setup` and `teardown` bracket
/// the call in the caller's context in every mode.
async fn run_process(
    component: &Arc<dyn Component>,
    ctx: &mut FlowContext,
    mode: TimeoutMode,
    remaining: Option<Duration>,
    worker: Option<WorkerSpec>,
) -> Result<(), ComponentFailure> {
    component.setup(ctx);
    let result = match mode {
        TimeoutMode::Cooperative => {
            if component.supports_async() {
                component.process_async(ctx).await
            } else {
                component.process(ctx)
            }
        }
        TimeoutMode::HardAsync => process_hard_async(component, ctx, remaining).await,
        TimeoutMode::HardProcess => process_hard_process(component, ctx, remaining, worker).await,
    };
    component.teardown(ctx);
    result
}

async fn process_hard_async(
    component: &Arc<dyn Component>,
    ctx: &mut FlowContext,
    remaining: Option<Duration>,
) -> Result<(), ComponentFailure> {
    let work = ctx.clone();

    if component.supports_async() {
        let future = async {
            let mut work = work;
            component.process_async(&mut work).await?;
            Ok::<FlowContext, ComponentFailure>(work)
        };
        let outcome = match remaining {
            Some(budget) => match tokio::time::timeout(budget, future).await {
                Ok(inner) => inner,
                Err(_) => return Err(hard_timeout("async", component.name(), remaining)),
            },
            None => future.await,
        };
        let work = outcome?;
        *ctx = work;
        return Ok(());
    }

    let worker_component = Arc::clone(component);
    let handle = tokio::task::spawn_blocking(move || {
        let mut work = work;
        worker_component.process(&mut work).map(|()| work)
    });

    let joined = match remaining {
        Some(budget) => match tokio::time::timeout(budget, handle).await {
            Ok(joined) => joined,
            // The blocking thread may run on briefly; we do not wait for it.
            Err(_) => return Err(hard_timeout("async", component.name(), remaining)),
        },
        None => handle.await,
    };

    match joined {
        Ok(Ok(work)) => {
            *ctx = work;
            Ok(())
        }
        Ok(Err(failure)) => Err(failure),
        Err(join_err) => Err(ComponentFailure::with_type(
            format!("worker task failed: {join_err}"),
            "JoinError",
        )),
    }
}

async fn process_hard_process(
    component: &Arc<dyn Component>,
    ctx: &mut FlowContext,
    remaining: Option<Duration>,
    worker: Option<WorkerSpec>,
) -> Result<(), ComponentFailure> {
    let spec = worker.ok_or_else(|| {
        ComponentFailure::Flow(FlowError::Execution(format!(
            "hard_process mode requires a declared component type for '{}'",
            component.name()
        )))
    })?;

    let job = WorkerJob {
        type_name: spec.type_name,
        component_name: component.name().to_string(),
        config: spec.config,
        context: PersistedContext::from(&*ctx),
    };
    let job_json = serde_json::to_string(&job)?;

    let exe = std::env::current_exe().map_err(|e| {
        ComponentFailure::Flow(FlowError::Execution(format!(
            "cannot locate current executable for worker spawn: {e}"
        )))
    })?;

    let mut child = tokio::process::Command::new(exe)
        .env(WORKER_ENV, "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            ComponentFailure::Flow(FlowError::Execution(format!(
                "failed to spawn isolation worker: {e}"
            )))
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(job_json.as_bytes()).await.map_err(|e| {
            ComponentFailure::Flow(FlowError::Execution(format!(
                "failed to send job to isolation worker: {e}"
            )))
        })?;
        // Dropping stdin closes the pipe so the worker sees EOF.
    }

    let wait = child.wait_with_output();
    let output = match remaining {
        Some(budget) => match tokio::time::timeout(budget, wait).await {
            Ok(output) => output,
            // kill_on_drop reaps the worker when the wait future drops.
            Err(_) => return Err(hard_timeout("process", component.name(), remaining)),
        },
        None => wait.await,
    };

    let output = output.map_err(|e| {
        ComponentFailure::Flow(FlowError::Execution(format!(
            "isolation worker I/O failed: {e}"
        )))
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if output.status.success() {
        let restored: PersistedContext = serde_json::from_str(stdout.trim()).map_err(|e| {
            ComponentFailure::Flow(FlowError::Execution(format!(
                "isolation worker returned malformed context: {e}"
            )))
        })?;
        *ctx = FlowContext::from(restored);
        Ok(())
    } else {
        match serde_json::from_str::<WorkerFailure>(stdout.trim()) {
            Ok(failure) => Err(ComponentFailure::with_type(
                failure.message,
                failure.error_type,
            )),
            Err(_) => Err(ComponentFailure::Flow(FlowError::Execution(format!(
                "isolation worker exited with {}",
                output.status
            )))),
        }
    }
}

fn hard_timeout(kind: &str, component: &str, remaining: Option<Duration>) -> ComponentFailure {
    let budget = remaining.map(|d| d.as_secs_f64()).unwrap_or(0.0);
    ComponentFailure::Flow(FlowError::Timeout {
        message: format!("hard {kind} timeout: component '{component}' exceeded {budget:.2}s"),
        timeout: Some(budget),
        elapsed: budget,
        step: Some(component.to_string()),
    })
}

/// Job shipped to the isolation worker over stdin.
#[derive(Debug, Serialize, Deserialize)]
struct WorkerJob {
    type_name: String,
    component_name: String,
    config: Map<String, Value>,
    context: PersistedContext,
}

/// Failure report the worker prints on a non-zero exit.
#[derive(Debug, Serialize, Deserialize)]
struct WorkerFailure {
    message: String,
    error_type: String,
}

/// Subprocess-isolation entry point for host binaries.
///
/// Call this first thing in `main`, passing a registry containing every
/// component type that may run under `hard_process`. When the process was
/// spawned as an isolation worker, this reads the job from stdin, runs
/// the component's `process` (setup/teardown stay in the parent), writes
/// the resulting context to stdout, and exits; it never returns in that
/// case. In a normal process it returns immediately.
pub fn run_worker_if_requested(registry: &ComponentRegistry) {
    if std::env::var(WORKER_ENV).is_err() {
        return;
    }
    let code = run_worker(registry);
    std::process::exit(code);
}

fn run_worker(registry: &ComponentRegistry) -> i32 {
    let mut input = String::new();
    if std::io::stdin().read_to_string(&mut input).is_err() {
        eprintln!("isolation worker: failed to read job from stdin");
        return 2;
    }

    let job: WorkerJob = match serde_json::from_str(&input) {
        Ok(job) => job,
        Err(e) => {
            eprintln!("isolation worker: malformed job: {e}");
            return 2;
        }
    };

    let mut component = match registry.create(&job.type_name, &job.component_name) {
        Ok(component) => component,
        Err(e) => {
            eprintln!("isolation worker: {e}");
            return 2;
        }
    };
    component.init(job.config);

    let mut ctx = FlowContext::from(job.context);
    match component.process(&mut ctx) {
        Ok(()) => {
            let persisted = PersistedContext::from(&ctx);
            match serde_json::to_string(&persisted) {
                Ok(json) => {
                    println!("{json}");
                    0
                }
                Err(e) => {
                    eprintln!("isolation worker: failed to serialize context: {e}");
                    2
                }
            }
        }
        Err(failure) => {
            let report = WorkerFailure {
                message: failure.to_string(),
                error_type: failure.error_type().to_string(),
            };
            match serde_json::to_string(&report) {
                Ok(json) => println!("{json}"),
                Err(_) => eprintln!("isolation worker: component failed: {failure}"),
            }
            1
        }
    }
}
