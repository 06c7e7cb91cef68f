//! Computed Values
//!
//! A `Computed` is a caching effect exposed as a value: push-invalidated,
//! pull-recomputed. Writes to its dependencies only flip a dirty flag (the
//! inner effect's scheduler); the getter re-runs on the next read, and
//! repeated reads in a clean period return the cached value.
//!
//! The getter runs zero times before the first read.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::effect::{EffectOptions, ReactiveEffect};

/// A lazily recomputed, memoized derived value.
pub struct Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    value: Arc<RwLock<Option<T>>>,
    dirty: Arc<AtomicBool>,
    effect: ReactiveEffect,
}

/// Wrap `getter` as a computed value.
pub fn computed<T, F>(getter: F) -> Computed<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    let value = Arc::new(RwLock::new(None));
    let dirty = Arc::new(AtomicBool::new(true));

    let slot = Arc::clone(&value);
    let flag = Arc::clone(&dirty);
    let effect = ReactiveEffect::new_lazy(
        move || {
            let computed = getter();
            *slot.write() = Some(computed);
        },
        EffectOptions {
            // Invalidate only; recomputation waits for the next read.
            scheduler: Some(Arc::new(move || {
                flag.store(true, Ordering::SeqCst);
            })),
            on_stop: None,
        },
    );

    Computed {
        value,
        dirty,
        effect,
    }
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Current value, recomputing first if a dependency changed since the
    /// last read.
    pub fn get(&self) -> T {
        if self.dirty.swap(false, Ordering::SeqCst) {
            self.effect.run();
        }
        self.value
            .read()
            .clone()
            .expect("clean computed has a cached value")
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Detach from all dependencies. Reads keep returning the last cached
    /// value (recomputing manually if still dirty).
    pub fn stop(&self) {
        self.effect.stop();
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            dirty: Arc::clone(&self.dirty),
            effect: self.effect.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Computed<T>
where
    T: Clone + Send + Sync + std::fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("dirty", &self.is_dirty())
            .field("value", &*self.value.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::store::reactive;
    use crate::reactive::value::{Fields, Value};
    use std::sync::atomic::AtomicI32;

    #[test]
    fn lazy_until_first_read() {
        let calls = Arc::new(AtomicI32::new(0));
        let c = calls.clone();
        let derived = computed(move || {
            c.fetch_add(1, Ordering::SeqCst);
            42
        });

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(derived.get(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn memoizes_while_clean() {
        let calls = Arc::new(AtomicI32::new(0));
        let c = calls.clone();
        let derived = computed(move || {
            c.fetch_add(1, Ordering::SeqCst);
            1
        });

        let _ = derived.get();
        let _ = derived.get();
        let _ = derived.get();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn recomputes_once_per_dirty_period() {
        let store = reactive(Fields::from_iter([("n".to_string(), Value::Int(1))]));
        let calls = Arc::new(AtomicI32::new(0));

        let s = store.clone();
        let c = calls.clone();
        let doubled = computed(move || {
            c.fetch_add(1, Ordering::SeqCst);
            s.get("n").as_int().unwrap_or(0) * 2
        });

        assert_eq!(doubled.get(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        store.set("n", Value::Int(5));
        assert!(doubled.is_dirty());
        // Still lazy: nothing recomputed until read.
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(doubled.get(), 10);
        assert_eq!(doubled.get(), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unchanged_dependency_write_leaves_it_clean() {
        let store = reactive(Fields::from_iter([("n".to_string(), Value::Int(1))]));
        let s = store.clone();
        let derived = computed(move || s.get("n").as_int().unwrap_or(0));

        assert_eq!(derived.get(), 1);
        store.set("n", Value::Int(1));
        assert!(!derived.is_dirty());
    }
}
