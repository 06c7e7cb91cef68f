//! Reactive Effect
//!
//! A `ReactiveEffect` is a re-runnable unit of computation. While it runs,
//! every store field it reads subscribes it to that field; when any of those
//! fields later changes, the effect either re-runs synchronously or defers
//! through its scheduler.
//!
//! # Lifecycle
//!
//! - Created active. [`effect`] runs it once eagerly to establish the
//!   initial subscriptions.
//! - Each tracked run first clears the previous subscriptions, then
//!   re-collects them from what the function actually reads. Branches the
//!   function no longer visits therefore stop re-triggering it.
//! - [`ReactiveEffect::stop`] unsubscribes everywhere, fires the optional
//!   `on_stop` callback once and deactivates the effect. A stopped effect
//!   can still be invoked manually, but it no longer tracks anything.
//!
//! # Scheduler
//!
//! An effect with a scheduler is never re-run directly by a write. The
//! write invokes the scheduler instead, which typically enqueues a job on
//! the [`crate::runtime::scheduler`] queue. This is what lets a burst of
//! synchronous mutations collapse into a single deferred re-render.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::store::StoreId;
use super::tracking;

/// Unique identifier for an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectId(u64);

impl EffectId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value, usable as a scheduler job key.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

type SchedulerFn = Arc<dyn Fn() + Send + Sync>;
type StopFn = Box<dyn FnOnce() + Send + Sync>;

/// Construction options: an optional scheduler and an optional stop hook.
#[derive(Default)]
pub struct EffectOptions {
    pub scheduler: Option<SchedulerFn>,
    pub on_stop: Option<StopFn>,
}

pub(crate) struct EffectInner {
    id: EffectId,
    func: Box<dyn Fn() + Send + Sync>,
    scheduler: Option<SchedulerFn>,
    on_stop: Mutex<Option<StopFn>>,
    active: AtomicBool,
    /// Reverse links: every `(store, key)` set this effect is a member of.
    deps: Mutex<SmallVec<[(StoreId, String); 4]>>,
}

impl EffectInner {
    pub(crate) fn id(&self) -> EffectId {
        self.id
    }

    pub(crate) fn scheduler(&self) -> Option<SchedulerFn> {
        self.scheduler.clone()
    }

    pub(crate) fn record_dep(&self, owner: StoreId, key: &str) {
        self.deps.lock().push((owner, key.to_string()));
    }

    pub(crate) fn take_deps(&self) -> SmallVec<[(StoreId, String); 4]> {
        std::mem::take(&mut *self.deps.lock())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Run the computation. Active effects re-track; stopped effects just
    /// execute the function.
    pub(crate) fn run(self: &Arc<Self>) {
        if !self.is_active() {
            (self.func)();
            return;
        }

        tracking::cleanup_effect(self);
        let _scope = tracking::TrackScope::enter(Arc::clone(self));
        (self.func)();
    }

    fn stop(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            tracking::cleanup_effect(self);
            if let Some(on_stop) = self.on_stop.lock().take() {
                on_stop();
            }
        }
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        // Last handle gone: leave no dangling memberships or registry entry.
        tracking::cleanup_effect(self);
        tracking::unregister_effect(self.id);
    }
}

/// Handle to a reactive effect: re-invocable and stoppable.
///
/// Clones share the underlying effect.
#[derive(Clone)]
pub struct ReactiveEffect {
    inner: Arc<EffectInner>,
}

impl ReactiveEffect {
    /// Create an effect without running it. Used where the first run is
    /// driven externally (computed values, render effects).
    pub fn new_lazy<F>(func: F, options: EffectOptions) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let inner = Arc::new(EffectInner {
            id: EffectId::next(),
            func: Box::new(func),
            scheduler: options.scheduler,
            on_stop: Mutex::new(options.on_stop),
            active: AtomicBool::new(true),
            deps: Mutex::new(SmallVec::new()),
        });
        tracking::register_effect(&inner);
        Self { inner }
    }

    pub fn id(&self) -> EffectId {
        self.inner.id
    }

    /// Execute the effect now, re-collecting subscriptions if it is still
    /// active.
    pub fn run(&self) {
        self.inner.run();
    }

    /// Unsubscribe from everything and deactivate. Idempotent; later writes
    /// to previously-tracked fields no longer reach this effect.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }
}

impl std::fmt::Debug for ReactiveEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveEffect")
            .field("id", &self.inner.id)
            .field("active", &self.inner.is_active())
            .finish()
    }
}

/// Create an effect and run it once immediately.
pub fn effect<F>(func: F) -> ReactiveEffect
where
    F: Fn() + Send + Sync + 'static,
{
    effect_with(func, EffectOptions::default())
}

/// Create an effect with options and run it once immediately.
pub fn effect_with<F>(func: F, options: EffectOptions) -> ReactiveEffect
where
    F: Fn() + Send + Sync + 'static,
{
    let runner = ReactiveEffect::new_lazy(func, options);
    runner.run();
    runner
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::store::reactive;
    use crate::reactive::value::{Fields, Value};
    use std::sync::atomic::AtomicI32;

    fn counter_store(initial: i64) -> crate::reactive::store::Store {
        reactive(Fields::from_iter([("n".to_string(), Value::Int(initial))]))
    }

    #[test]
    fn effect_runs_eagerly_and_on_writes() {
        let store = counter_store(10);
        let seen = Arc::new(AtomicI32::new(0));

        let s = store.clone();
        let out = seen.clone();
        let _runner = effect(move || {
            let n = s.get("n").as_int().unwrap_or(0);
            out.store(n as i32 + 1, Ordering::SeqCst);
        });

        assert_eq!(seen.load(Ordering::SeqCst), 11);

        store.set("n", Value::Int(20));
        assert_eq!(seen.load(Ordering::SeqCst), 21);
    }

    #[test]
    fn manual_rerun_through_handle() {
        let runs = Arc::new(AtomicI32::new(0));
        let r = runs.clone();
        let runner = effect(move || {
            r.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        runner.run();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn scheduler_defers_rerun() {
        let store = counter_store(1);
        let runs = Arc::new(AtomicI32::new(0));
        let scheduled = Arc::new(AtomicI32::new(0));

        let s = store.clone();
        let r = runs.clone();
        let sched_count = scheduled.clone();
        let runner = effect_with(
            move || {
                r.fetch_add(1, Ordering::SeqCst);
                let _ = s.get("n");
            },
            EffectOptions {
                scheduler: Some(Arc::new(move || {
                    sched_count.fetch_add(1, Ordering::SeqCst);
                })),
                on_stop: None,
            },
        );

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduled.load(Ordering::SeqCst), 0);

        store.set("n", Value::Int(2));
        // The function did not re-run; only the scheduler fired.
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduled.load(Ordering::SeqCst), 1);

        runner.run();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stop_unsubscribes_but_allows_manual_runs() {
        let store = counter_store(1);
        let seen = Arc::new(AtomicI32::new(0));

        let s = store.clone();
        let out = seen.clone();
        let runner = effect(move || {
            out.store(s.get("n").as_int().unwrap_or(0) as i32, Ordering::SeqCst);
        });

        store.set("n", Value::Int(2));
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        runner.stop();
        store.set("n", Value::Int(3));
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        // Manual invocation still executes the function, without tracking.
        runner.run();
        assert_eq!(seen.load(Ordering::SeqCst), 3);

        store.set("n", Value::Int(4));
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn on_stop_fires_once() {
        let stops = Arc::new(AtomicI32::new(0));
        let s = stops.clone();
        let runner = effect_with(
            || {},
            EffectOptions {
                scheduler: None,
                on_stop: Some(Box::new(move || {
                    s.fetch_add(1, Ordering::SeqCst);
                })),
            },
        );

        runner.stop();
        runner.stop();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn nested_effects_restore_outer_context() {
        let outer_store = counter_store(0);
        let inner_store = counter_store(0);
        let outer_runs = Arc::new(AtomicI32::new(0));
        let inner_runs = Arc::new(AtomicI32::new(0));

        let os = outer_store.clone();
        let inner = inner_store.clone();
        let or = outer_runs.clone();
        let ir = inner_runs.clone();
        let inner_slot: Arc<Mutex<Option<ReactiveEffect>>> = Arc::new(Mutex::new(None));
        let slot = inner_slot.clone();
        let _outer = effect(move || {
            or.fetch_add(1, Ordering::SeqCst);
            let inner2 = inner.clone();
            let ir2 = ir.clone();
            *slot.lock() = Some(effect(move || {
                ir2.fetch_add(1, Ordering::SeqCst);
                let _ = inner2.get("n");
            }));
            // Read after the inner effect finished: must track the OUTER
            // effect, not the inner one.
            let _ = os.get("n");
        });

        assert_eq!(outer_runs.load(Ordering::SeqCst), 1);
        assert_eq!(inner_runs.load(Ordering::SeqCst), 1);

        outer_store.set("n", Value::Int(1));
        assert_eq!(outer_runs.load(Ordering::SeqCst), 2);
    }
}
