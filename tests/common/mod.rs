//! Shared fixtures for integration tests.
#![allow(dead_code)]

pub mod components;

use flowloom::component::Component;
use flowloom::config::FlowConfig;
use rustc_hash::FxHashMap;
use std::sync::Mutex;

pub type Components = FxHashMap<String, Box<dyn Component>>;

/// Deserialize a test configuration from inline JSON.
pub fn config_from(value: serde_json::Value) -> FlowConfig {
    serde_json::from_value(value).expect("test config must deserialize")
}

/// Build a component map from (name, instance) pairs.
pub fn components(pairs: Vec<(&str, Box<dyn Component>)>) -> Components {
    pairs
        .into_iter()
        .map(|(name, component)| (name.to_string(), component))
        .collect()
}

/// Hook that records every callback it receives.
#[derive(Default)]
pub struct RecordingHook {
    pub events: std::sync::Arc<Mutex<Vec<String>>>,
}

impl RecordingHook {
    pub fn new() -> (Self, std::sync::Arc<Mutex<Vec<String>>>) {
        let events = std::sync::Arc::new(Mutex::new(Vec::new()));
        (
            RecordingHook {
                events: events.clone(),
            },
            events,
        )
    }

    fn record(&self, entry: String) {
        self.events.lock().unwrap().push(entry);
    }
}

impl flowloom::hooks::ExecutionHook for RecordingHook {
    fn on_node_start(&self, node_id: &str, _component: &str, _ctx: &flowloom::FlowContext) {
        self.record(format!("start:{node_id}"));
    }

    fn on_node_complete(
        &self,
        node_id: &str,
        _component: &str,
        _ctx: &flowloom::FlowContext,
        _duration: f64,
    ) {
        self.record(format!("complete:{node_id}"));
    }

    fn on_node_error(
        &self,
        node_id: &str,
        _component: &str,
        _error: &flowloom::ComponentFailure,
        _ctx: &flowloom::FlowContext,
    ) {
        self.record(format!("error:{node_id}"));
    }

    fn on_node_skipped(&self, node_id: &str, _component: &str, reason: &str) {
        self.record(format!("skipped:{node_id}:{reason}"));
    }

    fn on_flow_suspended(&self, node_id: &str, _reason: &str, checkpoint_id: Option<&str>) {
        self.record(format!(
            "suspended:{node_id}:{}",
            checkpoint_id.map(|_| "with-checkpoint").unwrap_or("no-checkpoint")
        ));
    }

    fn on_iteration_start(&self, iteration: u32, node_id: &str) {
        self.record(format!("iteration:{iteration}:{node_id}"));
    }

    fn on_max_iterations(&self, max_iterations: u32, node_id: &str) {
        self.record(format!("max_iterations:{max_iterations}:{node_id}"));
    }
}

/// Hook that panics on every callback; flows must shrug it off.
pub struct PanickingHook;

impl flowloom::hooks::ExecutionHook for PanickingHook {
    fn on_node_start(&self, _node_id: &str, _component: &str, _ctx: &flowloom::FlowContext) {
        panic!("broken hook: start");
    }

    fn on_node_complete(
        &self,
        _node_id: &str,
        _component: &str,
        _ctx: &flowloom::FlowContext,
        _duration: f64,
    ) {
        panic!("broken hook: complete");
    }

    fn on_node_skipped(&self, _node_id: &str, _component: &str, _reason: &str) {
        panic!("broken hook: skipped");
    }
}
