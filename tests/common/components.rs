//! Reusable test components.
//!
//! All of them keep their state in the context (never in the component),
//! so instances stay reusable across steps and resume boundaries.
#![allow(dead_code)]

use flowloom::component::Component;
use flowloom::context::FlowContext;
use flowloom::error::ComponentFailure;
use serde_json::{json, Value};

/// Appends its name to `data["order"]` and bumps `data["{name}_runs"]`.
pub struct Appender {
    pub name: String,
}

impl Appender {
    pub fn boxed(name: &str) -> Box<dyn Component> {
        Box::new(Appender {
            name: name.to_string(),
        })
    }
}

fn bump_runs(ctx: &mut FlowContext, name: &str) {
    let key = format!("{name}_runs");
    let runs = ctx.get(&key).and_then(Value::as_i64).unwrap_or(0);
    ctx.set(key, json!(runs + 1));
}

fn push_order(ctx: &mut FlowContext, name: &str) {
    let mut order = ctx.get("order").cloned().unwrap_or_else(|| json!([]));
    order
        .as_array_mut()
        .expect("order must stay an array")
        .push(json!(name));
    ctx.set("order", order);
}

impl Component for Appender {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, ctx: &mut FlowContext) -> Result<(), ComponentFailure> {
        push_order(ctx, &self.name);
        bump_runs(ctx, &self.name);
        Ok(())
    }
}

/// Increments `data["count"]`.
pub struct Counter {
    pub name: String,
}

impl Counter {
    pub fn boxed(name: &str) -> Box<dyn Component> {
        Box::new(Counter {
            name: name.to_string(),
        })
    }
}

impl Component for Counter {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, ctx: &mut FlowContext) -> Result<(), ComponentFailure> {
        let count = ctx.get("count").and_then(Value::as_i64).unwrap_or(0);
        ctx.set("count", json!(count + 1));
        bump_runs(ctx, &self.name);
        Ok(())
    }
}

/// Sets a fixed key to a fixed value.
pub struct Setter {
    pub name: String,
    pub key: String,
    pub value: Value,
}

impl Setter {
    pub fn boxed(name: &str, key: &str, value: Value) -> Box<dyn Component> {
        Box::new(Setter {
            name: name.to_string(),
            key: key.to_string(),
            value,
        })
    }
}

impl Component for Setter {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, ctx: &mut FlowContext) -> Result<(), ComponentFailure> {
        ctx.set(self.key.clone(), self.value.clone());
        push_order(ctx, &self.name);
        Ok(())
    }
}

/// Always fails.
pub struct Failing {
    pub name: String,
}

impl Failing {
    pub fn boxed(name: &str) -> Box<dyn Component> {
        Box::new(Failing {
            name: name.to_string(),
        })
    }
}

impl Component for Failing {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, _ctx: &mut FlowContext) -> Result<(), ComponentFailure> {
        Err(ComponentFailure::msg("intentional failure"))
    }
}

/// Runs, then selects a fixed output port.
pub struct PortSetter {
    pub name: String,
    pub port: String,
}

impl PortSetter {
    pub fn boxed(name: &str, port: &str) -> Box<dyn Component> {
        Box::new(PortSetter {
            name: name.to_string(),
            port: port.to_string(),
        })
    }
}

impl Component for PortSetter {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, ctx: &mut FlowContext) -> Result<(), ComponentFailure> {
        push_order(ctx, &self.name);
        let port = self.port.clone();
        self.set_output_port(ctx, &port);
        Ok(())
    }
}

/// Cycle router: emits `loop_port` until its node has run `exit_after`
/// times, then emits `exit_port`. Reads its own visit count from
/// metadata, which the executor increments after each run.
pub struct CycleRouter {
    pub name: String,
    pub node_id: String,
    pub loop_port: String,
    pub exit_port: String,
    pub exit_after: u32,
}

impl CycleRouter {
    pub fn boxed(
        name: &str,
        node_id: &str,
        loop_port: &str,
        exit_port: &str,
        exit_after: u32,
    ) -> Box<dyn Component> {
        Box::new(CycleRouter {
            name: name.to_string(),
            node_id: node_id.to_string(),
            loop_port: loop_port.to_string(),
            exit_port: exit_port.to_string(),
            exit_after,
        })
    }
}

impl Component for CycleRouter {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, ctx: &mut FlowContext) -> Result<(), ComponentFailure> {
        push_order(ctx, &self.name);
        let visit = ctx
            .metadata
            .node_visit_counts
            .get(&self.node_id)
            .copied()
            .unwrap_or(0)
            + 1;
        let port = if visit >= self.exit_after {
            self.exit_port.clone()
        } else {
            self.loop_port.clone()
        };
        self.set_output_port(ctx, &port);
        Ok(())
    }
}

/// Suspends on first execution; on a resumed run (resume_data present)
/// it records the payload and completes.
pub struct Suspender {
    pub name: String,
    pub node_id: String,
}

impl Suspender {
    pub fn boxed(name: &str, node_id: &str) -> Box<dyn Component> {
        Box::new(Suspender {
            name: name.to_string(),
            node_id: node_id.to_string(),
        })
    }
}

impl Component for Suspender {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, ctx: &mut FlowContext) -> Result<(), ComponentFailure> {
        bump_runs(ctx, &self.name);
        if let Some(resume_data) = ctx.get("resume_data").cloned() {
            ctx.set("approval", resume_data);
            push_order(ctx, &self.name);
        } else {
            ctx.suspend(self.node_id.clone(), "awaiting approval");
        }
        Ok(())
    }
}

/// Blocks the thread without ever checking the deadline.
pub struct Sleeper {
    pub name: String,
    pub millis: u64,
}

impl Sleeper {
    pub fn boxed(name: &str, millis: u64) -> Box<dyn Component> {
        Box::new(Sleeper {
            name: name.to_string(),
            millis,
        })
    }
}

impl Component for Sleeper {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, ctx: &mut FlowContext) -> Result<(), ComponentFailure> {
        std::thread::sleep(std::time::Duration::from_millis(self.millis));
        ctx.set("slept", json!(true));
        Ok(())
    }
}

/// Sleeps in small increments, checking the deadline between them.
pub struct CooperativeSleeper {
    pub name: String,
    pub iterations: u32,
    pub millis_per_iteration: u64,
}

impl CooperativeSleeper {
    pub fn boxed(name: &str, iterations: u32, millis_per_iteration: u64) -> Box<dyn Component> {
        Box::new(CooperativeSleeper {
            name: name.to_string(),
            iterations,
            millis_per_iteration,
        })
    }
}

impl Component for CooperativeSleeper {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, ctx: &mut FlowContext) -> Result<(), ComponentFailure> {
        for i in 0..self.iterations {
            self.check_deadline(ctx)?;
            std::thread::sleep(std::time::Duration::from_millis(self.millis_per_iteration));
            ctx.set("iteration", json!(i + 1));
        }
        ctx.set("completed", json!(true));
        Ok(())
    }
}

/// Cooperative-async variant of [`Counter`].
pub struct AsyncCounter {
    pub name: String,
}

impl AsyncCounter {
    pub fn boxed(name: &str) -> Box<dyn Component> {
        Box::new(AsyncCounter {
            name: name.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl Component for AsyncCounter {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_async(&self) -> bool {
        true
    }

    fn process(&self, ctx: &mut FlowContext) -> Result<(), ComponentFailure> {
        let count = ctx.get("count").and_then(Value::as_i64).unwrap_or(0);
        ctx.set("count", json!(count + 1));
        Ok(())
    }

    async fn process_async(&self, ctx: &mut FlowContext) -> Result<(), ComponentFailure> {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let count = ctx.get("count").and_then(Value::as_i64).unwrap_or(0);
        ctx.set("count", json!(count + 1));
        ctx.set("async_ran", json!(true));
        Ok(())
    }
}

/// Component whose config demands a `required_field` key.
pub struct Demanding {
    pub name: String,
    pub required_field: Option<Value>,
}

impl Demanding {
    pub fn boxed(name: &str) -> Box<dyn Component> {
        Box::new(Demanding {
            name: name.to_string(),
            required_field: None,
        })
    }
}

impl Component for Demanding {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, config: serde_json::Map<String, Value>) {
        self.required_field = config.get("required_field").cloned();
    }

    fn validate_config(&self) -> Vec<String> {
        if self.required_field.is_none() {
            vec!["required_field is required".to_string()]
        } else {
            Vec::new()
        }
    }

    fn process(&self, _ctx: &mut FlowContext) -> Result<(), ComponentFailure> {
        Ok(())
    }
}
