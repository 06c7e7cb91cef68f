//! Reactive Store
//!
//! The interception layer over plain data. A `Store` wraps an ordered
//! field map and routes every read through [`crate::reactive::tracking::track`]
//! and every write through [`crate::reactive::tracking::trigger`].
//!
//! # Modes
//!
//! - `Mutable` (from [`reactive`]): reads track, writes trigger.
//! - `Readonly` (from [`readonly`]): reads never track, writes are rejected
//!   with a warning. Nested aggregates come back readonly too.
//! - `ShallowReadonly` (from [`shallow_readonly`]): like readonly, but
//!   nested aggregates are returned raw instead of wrapped.
//!
//! A readonly store is a *view*: it shares the data and identity of the
//! store it wraps, so writes made through the mutable handle stay visible
//! through every view. Wrapping a store in its own mode is transparent.
//!
//! # Nested aggregates
//!
//! Reading a field that holds a plain map promotes it to a child store and
//! caches the promotion back into the field, so repeated reads observe the
//! same child identity. Promotion happens on read, never eagerly for the
//! whole structure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use super::tracking;
use super::value::{has_changed, Fields, Value};

/// Unique identity of a store's underlying data. Shared by every view of
/// that data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreId(u64);

impl StoreId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreMode {
    Mutable,
    Readonly,
    ShallowReadonly,
}

struct StoreData {
    id: StoreId,
    fields: RwLock<Fields>,
}

impl Drop for StoreData {
    fn drop(&mut self) {
        // The dependency registry must never be what keeps a store alive;
        // reclaim its entry as soon as the data goes away.
        tracking::release_store(self.id);
    }
}

/// A reactive (or readonly) wrapper over an ordered field map.
#[derive(Clone)]
pub struct Store {
    data: Arc<StoreData>,
    mode: StoreMode,
}

/// Create a mutable reactive store over `fields`.
pub fn reactive(fields: Fields) -> Store {
    Store {
        data: Arc::new(StoreData {
            id: StoreId::next(),
            fields: RwLock::new(fields),
        }),
        mode: StoreMode::Mutable,
    }
}

/// A readonly view of `store`: same data, same identity, writes rejected,
/// reads untracked.
pub fn readonly(store: &Store) -> Store {
    Store {
        data: Arc::clone(&store.data),
        mode: StoreMode::Readonly,
    }
}

/// A readonly view that hands nested aggregates back raw.
pub fn shallow_readonly(store: &Store) -> Store {
    Store {
        data: Arc::clone(&store.data),
        mode: StoreMode::ShallowReadonly,
    }
}

impl Store {
    pub fn id(&self) -> StoreId {
        self.data.id
    }

    pub fn is_reactive(&self) -> bool {
        self.mode == StoreMode::Mutable
    }

    pub fn is_readonly(&self) -> bool {
        self.mode != StoreMode::Mutable
    }

    /// Read a field. Tracks `(store, key)` in mutable mode, including reads
    /// of absent keys (a later insertion then re-triggers the reader).
    pub fn get(&self, key: &str) -> Value {
        if self.mode == StoreMode::Mutable {
            tracking::track(self.data.id, key);
        }
        self.resolve(key)
    }

    /// Read a field without establishing any dependency.
    pub fn get_untracked(&self, key: &str) -> Value {
        self.resolve(key)
    }

    fn resolve(&self, key: &str) -> Value {
        let value = self.data.fields.read().get(key).cloned();
        match value {
            None => Value::Null,
            Some(Value::Map(map)) => match self.mode {
                // Shallow: no wrapping of nested values.
                StoreMode::ShallowReadonly => Value::Map(map),
                StoreMode::Mutable => Value::Store(self.promote(key)),
                StoreMode::Readonly => Value::Store(readonly(&self.promote(key))),
            },
            Some(Value::Store(child)) => match self.mode {
                StoreMode::Readonly => Value::Store(readonly(&child)),
                _ => Value::Store(child),
            },
            Some(other) => other,
        }
    }

    /// Replace a plain-map field with a child store, caching it back so the
    /// child identity is stable across reads and views.
    fn promote(&self, key: &str) -> Store {
        let mut fields = self.data.fields.write();
        match fields.get(key) {
            Some(Value::Map(map)) => {
                let child = reactive(map.clone());
                fields.insert(key.to_string(), Value::Store(child.clone()));
                child
            }
            // Another view promoted it between our read and this write.
            Some(Value::Store(child)) => child.clone(),
            _ => unreachable!("promoted field changed shape mid-read"),
        }
    }

    /// Write a field. Rejected with a warning on readonly views; a no-op
    /// when the value is unchanged; otherwise writes and triggers.
    pub fn set(&self, key: &str, value: Value) {
        if self.is_readonly() {
            warn!(key, "write rejected: store is readonly");
            return;
        }

        let changed = {
            let mut fields = self.data.fields.write();
            match fields.get(key) {
                Some(old) if !has_changed(old, &value) => false,
                _ => {
                    fields.insert(key.to_string(), value);
                    true
                }
            }
        };

        if changed {
            tracking::trigger(self.data.id, key);
        }
    }

    /// Whether the field exists. Tracked in mutable mode, like a read.
    pub fn contains(&self, key: &str) -> bool {
        if self.mode == StoreMode::Mutable {
            tracking::track(self.data.id, key);
        }
        self.data.fields.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.fields.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.fields.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.data.fields.read().keys().cloned().collect()
    }

    /// Untracked copy of the current fields.
    pub fn snapshot(&self) -> Fields {
        self.data.fields.read().clone()
    }

    /// Swap the whole field map without triggering. Used by the runtime
    /// when a parent re-render pushes a new props aggregate; props are not
    /// dependency-tracked, so no notification is due.
    pub(crate) fn replace_fields_untracked(&self, fields: Fields) {
        *self.data.fields.write() = fields;
    }
}

impl PartialEq for Store {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.data.id)
            .field("mode", &self.mode)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::effect;
    use std::sync::atomic::AtomicI32;

    fn fields(pairs: &[(&str, Value)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn get_and_set() {
        let store = reactive(fields(&[("age", Value::Int(10))]));
        assert_eq!(store.get("age"), Value::Int(10));

        store.set("age", Value::Int(11));
        assert_eq!(store.get("age"), Value::Int(11));

        assert_eq!(store.get("missing"), Value::Null);
    }

    #[test]
    fn identity_checks() {
        let store = reactive(Fields::new());
        let ro = readonly(&store);
        let shallow = shallow_readonly(&store);

        assert!(store.is_reactive());
        assert!(!store.is_readonly());
        assert!(!ro.is_reactive());
        assert!(ro.is_readonly());
        assert!(shallow.is_readonly());

        // Views share identity with the data they wrap.
        assert_eq!(store.id(), ro.id());
        assert_eq!(store, ro);
    }

    #[test]
    fn readonly_rejects_writes_without_mutating() {
        let store = reactive(fields(&[("n", Value::Int(1))]));
        let ro = readonly(&store);

        ro.set("n", Value::Int(99));
        assert_eq!(store.get_untracked("n"), Value::Int(1));

        // Writes through the mutable handle stay visible in the view.
        store.set("n", Value::Int(2));
        assert_eq!(ro.get("n"), Value::Int(2));
    }

    #[test]
    fn readonly_reads_never_track() {
        let store = reactive(fields(&[("n", Value::Int(1))]));
        let ro = readonly(&store);
        let runs = Arc::new(AtomicI32::new(0));

        let r = runs.clone();
        let view = ro.clone();
        let _runner = effect(move || {
            r.fetch_add(1, Ordering::SeqCst);
            let _ = view.get("n");
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        store.set("n", Value::Int(2));
        // The effect only read through the readonly view: no subscription.
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unchanged_write_does_not_trigger() {
        let store = reactive(fields(&[("n", Value::Int(5))]));
        let runs = Arc::new(AtomicI32::new(0));

        let s = store.clone();
        let r = runs.clone();
        let _runner = effect(move || {
            r.fetch_add(1, Ordering::SeqCst);
            let _ = s.get("n");
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        store.set("n", Value::Int(5));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        store.set("n", Value::Int(6));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn nested_maps_promote_to_stores_with_stable_identity() {
        let store = reactive(fields(&[(
            "user",
            Value::Map(fields(&[("name", Value::from("ada"))])),
        )]));

        let first = store.get("user");
        let second = store.get("user");
        let (a, b) = match (&first, &second) {
            (Value::Store(a), Value::Store(b)) => (a.clone(), b.clone()),
            other => panic!("expected nested stores, got {other:?}"),
        };
        assert_eq!(a, b);
        assert!(a.is_reactive());
        assert_eq!(a.get("name"), Value::from("ada"));
    }

    #[test]
    fn nested_reads_follow_the_view_mode() {
        let store = reactive(fields(&[(
            "user",
            Value::Map(fields(&[("name", Value::from("ada"))])),
        )]));
        let ro = readonly(&store);
        let shallow = shallow_readonly(&store);

        match ro.get("user") {
            Value::Store(child) => assert!(child.is_readonly()),
            other => panic!("expected readonly child store, got {other:?}"),
        }

        // Shallow hands the aggregate back raw.
        match shallow.get("user") {
            Value::Map(_) | Value::Store(_) => {}
            other => panic!("unexpected shallow read {other:?}"),
        }
    }

    #[test]
    fn insertion_of_new_key_triggers_readers_of_that_key() {
        let store = reactive(Fields::new());
        let seen = Arc::new(AtomicI32::new(-1));

        let s = store.clone();
        let out = seen.clone();
        let _runner = effect(move || {
            out.store(
                s.get("later").as_int().unwrap_or(-1) as i32,
                Ordering::SeqCst,
            );
        });

        assert_eq!(seen.load(Ordering::SeqCst), -1);
        store.set("later", Value::Int(7));
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }
}
