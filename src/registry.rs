//! Component registry: type names to constructors.
//!
//! The registry backs [`FlowEngine::from_config`](crate::engine::FlowEngine::from_config)
//! (auto-instantiating components from the config's `type` fields) and the
//! subprocess isolation worker, which must reconstruct a component from its
//! type name inside the child process.

use rustc_hash::FxHashMap;

use crate::component::Component;
use crate::error::FlowError;

type Constructor = Box<dyn Fn(&str) -> Box<dyn Component> + Send + Sync>;

/// Maps component type names to constructor functions.
#[derive(Default)]
pub struct ComponentRegistry {
    constructors: FxHashMap<String, Constructor>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for a type name. The constructor receives
    /// the instance name.
    pub fn register<F>(&mut self, type_name: impl Into<String>, constructor: F)
    where
        F: Fn(&str) -> Box<dyn Component> + Send + Sync + 'static,
    {
        self.constructors
            .insert(type_name.into(), Box::new(constructor));
    }

    /// Create an instance of a registered type.
    pub fn create(
        &self,
        type_name: &str,
        instance_name: &str,
    ) -> Result<Box<dyn Component>, FlowError> {
        match self.constructors.get(type_name) {
            Some(ctor) => Ok(ctor(instance_name)),
            None => Err(FlowError::Execution(format!(
                "component type not registered: {type_name}"
            ))),
        }
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    /// Registered type names, sorted for stable output.
    pub fn registered(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("registered", &self.registered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FlowContext;
    use crate::error::ComponentFailure;

    struct Counter {
        name: String,
    }

    impl Component for Counter {
        fn name(&self) -> &str {
            &self.name
        }

        fn process(&self, ctx: &mut FlowContext) -> Result<(), ComponentFailure> {
            let count = ctx
                .get("count")
                .and_then(serde_json::Value::as_i64)
                .unwrap_or(0);
            ctx.set("count", serde_json::json!(count + 1));
            Ok(())
        }
    }

    #[test]
    fn register_and_create() {
        let mut registry = ComponentRegistry::new();
        registry.register("test.Counter", |name| {
            Box::new(Counter {
                name: name.to_string(),
            })
        });

        let instance = registry.create("test.Counter", "my_counter").unwrap();
        assert_eq!(instance.name(), "my_counter");
        assert!(registry.contains("test.Counter"));
    }

    #[test]
    fn unknown_type_errors() {
        let registry = ComponentRegistry::new();
        let err = registry.create("missing.Type", "x").unwrap_err();
        assert!(err.to_string().contains("missing.Type"));
    }

    #[test]
    fn registered_lists_sorted() {
        let mut registry = ComponentRegistry::new();
        registry.register("b.B", |n| {
            Box::new(Counter {
                name: n.to_string(),
            })
        });
        registry.register("a.A", |n| {
            Box::new(Counter {
                name: n.to_string(),
            })
        });
        assert_eq!(registry.registered(), vec!["a.A", "b.B"]);
    }
}
