//! Context Propagation (provide / inject)
//!
//! A chained key-value lookup mirroring the component tree. `provide`
//! publishes a value for all descendants of the current component; `inject`
//! resolves the nearest ancestor's value for a key.
//!
//! # Copy-on-write inheritance
//!
//! Every instance starts out aliasing its parent's provide map. The first
//! local `provide` replaces the alias with a fresh map whose failed lookups
//! fall back to the parent's map, an explicit-chain rendition of prototype
//! inheritance. Later `provide` calls mutate that map in place, and the
//! ancestor's map is never touched.
//!
//! Both operations are only meaningful during component setup; outside of
//! it they warn and do nothing.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::warn;

use super::component::current_instance;
use crate::reactive::Value;

/// One level of the provide chain.
pub struct ProvideMap {
    entries: RwLock<IndexMap<String, Value>>,
    parent: Option<Arc<ProvideMap>>,
}

impl ProvideMap {
    /// A chain root with no fallback.
    pub fn root() -> Arc<Self> {
        Arc::new(Self {
            entries: RwLock::new(IndexMap::new()),
            parent: None,
        })
    }

    /// An empty map that falls back to `parent` on failed lookups.
    pub fn child_of(parent: &Arc<ProvideMap>) -> Arc<Self> {
        Arc::new(Self {
            entries: RwLock::new(IndexMap::new()),
            parent: Some(Arc::clone(parent)),
        })
    }

    pub fn insert(&self, key: &str, value: Value) {
        self.entries.write().insert(key.to_string(), value);
    }

    /// Chained lookup: own entries first, then the parent chain.
    pub fn lookup(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.entries.read().get(key) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.lookup(key))
    }
}

impl std::fmt::Debug for ProvideMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvideMap")
            .field("len", &self.entries.read().len())
            .field("chained", &self.parent.is_some())
            .finish()
    }
}

/// Publish `value` under `key` for descendants of the current component.
///
/// Must run during setup; otherwise warns and no-ops.
pub fn provide(key: &str, value: Value) {
    let Some(instance) = current_instance() else {
        warn!(key, "provide called outside component setup");
        return;
    };

    let own = instance.provides();
    let parent_provides = instance.parent().map(|parent| parent.provides());

    // Still aliasing the parent's map? Break the alias with a chained
    // child map before the first local write.
    let target = match &parent_provides {
        Some(parent_map) if Arc::ptr_eq(&own, parent_map) => {
            let fresh = ProvideMap::child_of(parent_map);
            instance.set_provides(Arc::clone(&fresh));
            fresh
        }
        _ => own,
    };

    target.insert(key, value);
}

/// Resolve `key` from the nearest providing ancestor.
///
/// Falls back to `default` when no ancestor provides the key; a callable
/// default is invoked. Outside setup: warns and returns `Null`.
pub fn inject(key: &str, default: Option<Value>) -> Value {
    let Some(instance) = current_instance() else {
        warn!(key, "inject called outside component setup");
        return Value::Null;
    };

    // Lookup starts at the parent: a component does not see its own
    // provides.
    let provided = instance
        .parent()
        .and_then(|parent| parent.provides().lookup(key));

    match provided {
        Some(value) => value,
        None => match default {
            Some(Value::Func(factory)) => factory.call(&[]),
            Some(value) => value,
            None => Value::Null,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_chains_to_parent() {
        let root = ProvideMap::root();
        root.insert("theme", Value::from("dark"));

        let child = ProvideMap::child_of(&root);
        assert_eq!(child.lookup("theme"), Some(Value::from("dark")));

        child.insert("theme", Value::from("light"));
        assert_eq!(child.lookup("theme"), Some(Value::from("light")));
        // The ancestor map is untouched.
        assert_eq!(root.lookup("theme"), Some(Value::from("dark")));
    }

    #[test]
    fn missing_key_resolves_none() {
        let root = ProvideMap::root();
        let child = ProvideMap::child_of(&root);
        assert_eq!(child.lookup("nope"), None);
    }

    #[test]
    fn provide_outside_setup_warns_and_noops() {
        provide("k", Value::Int(1));
    }

    #[test]
    fn inject_outside_setup_returns_null() {
        assert_eq!(inject("k", Some(Value::Int(5))), Value::Null);
    }
}
