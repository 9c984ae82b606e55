//! Engine surface: validate, dry_run, hooks, registry construction.

mod common;

use common::components::*;
use common::*;
use flowloom::{ComponentRegistry, FlowContext, FlowEngine, FlowError};
use serde_json::json;

#[tokio::test]
async fn validate_reports_condition_problems() {
    let config = config_from(json!({
        "name": "Validation",
        "flow": {
            "type": "sequential",
            "steps": [
                {"component": "a", "condition": "len(x) > 0"},
                {"component": "b", "condition": "x > > 5"}
            ]
        }
    }));
    let engine = FlowEngine::new(
        config,
        components(vec![("a", Counter::boxed("a")), ("b", Counter::boxed("b"))]),
    )
    .unwrap();

    let problems = engine.validate();
    assert!(problems.iter().any(|p| p.starts_with("a condition:") && p.contains("Call")));
    assert!(problems
        .iter()
        .any(|p| p.starts_with("b condition:") && p.to_lowercase().contains("syntax")));
}

#[tokio::test]
async fn validate_surfaces_component_config_problems() {
    let config = config_from(json!({
        "name": "Validation",
        "flow": {
            "type": "sequential",
            "steps": [{"component": "a"}]
        }
    }));
    // `picky` is present in the map but unreferenced, so construction
    // does not initialize it; validate() still inspects it.
    let engine = FlowEngine::new(
        config,
        components(vec![
            ("a", Counter::boxed("a")),
            ("picky", Demanding::boxed("picky")),
        ]),
    )
    .unwrap();

    let problems = engine.validate();
    assert!(problems
        .iter()
        .any(|p| p.starts_with("picky:") && p.contains("required_field")));
}

#[tokio::test]
async fn construction_fails_for_missing_component() {
    let config = config_from(json!({
        "name": "Missing",
        "flow": {
            "type": "sequential",
            "steps": [{"component": "ghost"}]
        }
    }));
    let err = FlowEngine::new(config, components(vec![])).unwrap_err();
    match err {
        FlowError::Execution(message) => assert!(message.contains("ghost")),
        other => panic!("expected Execution error, got {other:?}"),
    }
}

#[tokio::test]
async fn construction_fails_for_invalid_component_config() {
    let config = config_from(json!({
        "name": "Bad Config",
        "components": [
            {"name": "picky", "type": "test.Demanding", "config": {}}
        ],
        "flow": {
            "type": "sequential",
            "steps": [{"component": "picky"}]
        }
    }));
    let err = FlowEngine::new(
        config,
        components(vec![("picky", Demanding::boxed("picky"))]),
    )
    .unwrap_err();
    match err {
        FlowError::Execution(message) => assert!(message.contains("required_field")),
        other => panic!("expected Execution error, got {other:?}"),
    }
}

#[tokio::test]
async fn dry_run_sequential_respects_conditions() {
    let config = config_from(json!({
        "name": "Dry Sequential",
        "flow": {
            "type": "sequential",
            "steps": [
                {"component": "always"},
                {"component": "gated", "condition": "context.data.go == True"},
                {"component": "broken", "condition": "len(x) > 0"}
            ]
        }
    }));
    let engine = FlowEngine::new(
        config,
        components(vec![
            ("always", Counter::boxed("always")),
            ("gated", Counter::boxed("gated")),
            ("broken", Counter::boxed("broken")),
        ]),
    )
    .unwrap();

    // Without data, only the unconditional step would run; a condition
    // that errors counts as no-match.
    assert_eq!(engine.dry_run(None), vec!["always"]);

    let mut ctx = FlowContext::new();
    ctx.set("go", json!(true));
    assert_eq!(engine.dry_run(Some(&ctx)), vec!["always", "gated"]);
}

#[tokio::test]
async fn dry_run_conditional_stops_at_first_match() {
    let config = config_from(json!({
        "name": "Dry Conditional",
        "flow": {
            "type": "conditional",
            "steps": [
                {"component": "a", "condition": "context.data.kind == 'a'"},
                {"component": "b", "condition": "context.data.kind == 'b'"},
                {"component": "fallback"}
            ]
        }
    }));
    let engine = FlowEngine::new(
        config,
        components(vec![
            ("a", Counter::boxed("a")),
            ("b", Counter::boxed("b")),
            ("fallback", Counter::boxed("fallback")),
        ]),
    )
    .unwrap();

    let mut ctx = FlowContext::new();
    ctx.set("kind", json!("b"));
    assert_eq!(engine.dry_run(Some(&ctx)), vec!["b"]);
    assert_eq!(engine.dry_run(None), vec!["fallback"]);
}

#[tokio::test]
async fn dry_run_dag_lists_topological_order() {
    let config = config_from(json!({
        "name": "Dry DAG",
        "flow": {
            "type": "graph",
            "nodes": [
                {"id": "fetch", "component": "fetch_comp"},
                {"id": "process", "component": "process_comp"},
                {"id": "save", "component": "save_comp"}
            ],
            "edges": [
                {"source": "fetch", "target": "process"},
                {"source": "process", "target": "save"}
            ]
        }
    }));
    let engine = FlowEngine::new(
        config,
        components(vec![
            ("fetch_comp", Counter::boxed("fetch_comp")),
            ("process_comp", Counter::boxed("process_comp")),
            ("save_comp", Counter::boxed("save_comp")),
        ]),
    )
    .unwrap();

    assert_eq!(
        engine.dry_run(None),
        vec!["fetch_comp", "process_comp", "save_comp"]
    );
}

#[tokio::test]
async fn dry_run_cyclic_lists_all_components() {
    let config = config_from(json!({
        "name": "Dry Cyclic",
        "flow": {
            "type": "graph",
            "nodes": [
                {"id": "a", "component": "a_comp"},
                {"id": "b", "component": "b_comp"}
            ],
            "edges": [
                {"source": "a", "target": "b"},
                {"source": "b", "target": "a"}
            ]
        }
    }));
    let engine = FlowEngine::new(
        config,
        components(vec![
            ("a_comp", Counter::boxed("a_comp")),
            ("b_comp", Counter::boxed("b_comp")),
        ]),
    )
    .unwrap();

    assert_eq!(engine.dry_run(None), vec!["a_comp", "b_comp"]);
}

// Hooks are observers: a panicking hook must not change which steps run,
// their outcomes, or what other hooks see.
#[tokio::test]
async fn broken_hooks_do_not_affect_execution() {
    let (recording, events) = RecordingHook::new();
    let config = config_from(json!({
        "name": "Hook Isolation",
        "flow": {
            "type": "sequential",
            "steps": [
                {"component": "a"},
                {"component": "b", "condition": "False"},
                {"component": "c"}
            ]
        }
    }));
    let engine = FlowEngine::new(
        config,
        components(vec![
            ("a", Appender::boxed("a")),
            ("b", Appender::boxed("b")),
            ("c", Appender::boxed("c")),
        ]),
    )
    .unwrap()
    .with_hook(PanickingHook)
    .with_hook(recording);

    let result = engine.execute(None).await.unwrap();
    assert_eq!(result.get("order"), Some(&json!(["a", "c"])));
    assert_eq!(result.metadata.skipped_components, vec!["b"]);

    let events = events.lock().unwrap();
    assert_eq!(
        *events,
        vec![
            "start:a",
            "complete:a",
            "skipped:b:condition not met",
            "start:c",
            "complete:c",
        ]
    );
}

#[tokio::test]
async fn every_executed_step_has_one_terminal_hook_event() {
    let (recording, events) = RecordingHook::new();
    let config = config_from(json!({
        "name": "Hook Accounting",
        "flow": {
            "type": "sequential",
            "settings": {"fail_fast": false},
            "steps": [
                {"component": "good"},
                {"component": "boom", "on_error": "skip"},
                {"component": "tail"}
            ]
        }
    }));
    let engine = FlowEngine::new(
        config,
        components(vec![
            ("good", Counter::boxed("good")),
            ("boom", Failing::boxed("boom")),
            ("tail", Counter::boxed("tail")),
        ]),
    )
    .unwrap()
    .with_hook(recording);

    let result = engine.execute(None).await.unwrap();
    assert_eq!(result.metadata.step_timings.len(), 3);

    let events = events.lock().unwrap();
    for step in ["good", "boom", "tail"] {
        let starts = events.iter().filter(|e| **e == format!("start:{step}")).count();
        assert_eq!(starts, 1, "{step} should start exactly once");
        let terminals = events
            .iter()
            .filter(|e| {
                **e == format!("complete:{step}")
                    || **e == format!("error:{step}")
                    || e.starts_with(&format!("skipped:{step}"))
            })
            .count();
        assert_eq!(terminals, 1, "{step} should terminate exactly once");
    }
}

#[tokio::test]
async fn from_config_builds_components_through_registry() {
    let mut registry = ComponentRegistry::new();
    registry.register("test.Counter", |name| Counter::boxed(name));
    registry.register("test.Appender", |name| Appender::boxed(name));

    let config = config_from(json!({
        "name": "Registry Flow",
        "components": [
            {"name": "tick", "type": "test.Counter", "config": {}},
            {"name": "log", "type": "test.Appender", "config": {}}
        ],
        "flow": {
            "type": "sequential",
            "steps": [
                {"component": "tick"},
                {"component": "log"}
            ]
        }
    }));

    let engine = FlowEngine::from_config(config, &registry).unwrap();
    let result = engine.execute(None).await.unwrap();
    assert_eq!(result.get("count"), Some(&json!(1)));
    assert_eq!(result.get("order"), Some(&json!(["log"])));
}

#[tokio::test]
async fn from_config_rejects_unknown_type() {
    let registry = ComponentRegistry::new();
    let config = config_from(json!({
        "name": "Unknown Type",
        "components": [
            {"name": "x", "type": "not.Registered", "config": {}}
        ],
        "flow": {
            "type": "sequential",
            "steps": [{"component": "x"}]
        }
    }));

    let err = FlowEngine::from_config(config, &registry).unwrap_err();
    assert!(err.to_string().contains("not.Registered"));
}
