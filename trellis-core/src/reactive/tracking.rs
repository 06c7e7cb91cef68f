//! Dependency Tracking
//!
//! The registry that connects reactive stores to the effects that read them,
//! plus the thread-local context that identifies *which* effect is currently
//! reading.
//!
//! # How It Works
//!
//! 1. While an effect runs, it sits on top of the thread-local tracking
//!    stack. Nested effects push and pop, so the outer effect becomes
//!    current again when an inner one finishes.
//!
//! 2. When a store field is read, [`track`] records the current effect as a
//!    subscriber of `(store, key)` and gives the effect a reverse link so it
//!    can unsubscribe in O(its own dependency count).
//!
//! 3. When a store field is written, [`trigger`] notifies every subscriber
//!    of `(store, key)`: effects with a scheduler have their scheduler
//!    invoked (deferred path), the rest re-run synchronously.
//!
//! # Ownership
//!
//! Both registries are process-wide singletons. The effect registry holds
//! `Weak` references so it never keeps an effect alive; the dependency map
//! is keyed by store id and reclaimed when the store's data is dropped, so
//! it never keeps a store alive either.
//!
//! # Reentrancy
//!
//! [`trigger`] iterates over a snapshot of the subscriber set, not the live
//! set: an effect re-run mutates its own memberships mid-notification, and
//! iterating the live set would be a mutate-while-iterate hazard. A write
//! performed by the currently running effect never re-notifies that same
//! effect (self-writes during a run are supported and must not loop).

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;

use super::effect::{EffectId, EffectInner};
use super::store::StoreId;

/// Subscribers per store field: store id -> key -> effect ids.
static DEP_MAP: OnceLock<DashMap<StoreId, HashMap<String, HashSet<EffectId>>>> = OnceLock::new();

/// All live effects, by id. Weak so the registry never owns an effect.
static EFFECTS: OnceLock<DashMap<EffectId, Weak<EffectInner>>> = OnceLock::new();

fn dep_map() -> &'static DashMap<StoreId, HashMap<String, HashSet<EffectId>>> {
    DEP_MAP.get_or_init(DashMap::new)
}

fn effects() -> &'static DashMap<EffectId, Weak<EffectInner>> {
    EFFECTS.get_or_init(DashMap::new)
}

thread_local! {
    /// Stack of effects currently running on this thread, innermost last.
    static TRACKING_STACK: RefCell<Vec<Arc<EffectInner>>> = RefCell::new(Vec::new());
}

/// Guard that marks an effect as the current tracking target.
///
/// Popped on drop, so the enclosing effect is restored even if the
/// computation panics.
pub(crate) struct TrackScope {
    id: EffectId,
}

impl TrackScope {
    pub(crate) fn enter(effect: Arc<EffectInner>) -> Self {
        let id = effect.id();
        TRACKING_STACK.with(|stack| stack.borrow_mut().push(effect));
        Self { id }
    }
}

impl Drop for TrackScope {
    fn drop(&mut self) {
        TRACKING_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            if let Some(effect) = popped {
                debug_assert_eq!(
                    effect.id(),
                    self.id,
                    "tracking stack mismatch on scope exit"
                );
            }
        });
    }
}

/// The effect currently being tracked, if any.
pub(crate) fn current_effect() -> Option<Arc<EffectInner>> {
    TRACKING_STACK.with(|stack| stack.borrow().last().cloned())
}

/// True while some effect is running with tracking enabled.
pub fn is_tracking() -> bool {
    TRACKING_STACK.with(|stack| !stack.borrow().is_empty())
}

pub(crate) fn register_effect(effect: &Arc<EffectInner>) {
    effects().insert(effect.id(), Arc::downgrade(effect));
}

pub(crate) fn unregister_effect(id: EffectId) {
    effects().remove(&id);
}

/// Register the current effect as a subscriber of `(owner, key)`.
///
/// No-op outside a tracking context. Membership is checked before insert so
/// repeated reads of the same field within one run add a single reverse
/// link.
pub fn track(owner: StoreId, key: &str) {
    let Some(effect) = current_effect() else {
        return;
    };

    let inserted = {
        let mut entry = dep_map().entry(owner).or_default();
        entry
            .entry(key.to_string())
            .or_default()
            .insert(effect.id())
    };

    if inserted {
        effect.record_dep(owner, key);
    }
}

/// Notify every subscriber of `(owner, key)`.
///
/// Effects carrying a scheduler are deferred through it; the rest run
/// synchronously before this call returns. The currently running effect is
/// never re-notified by its own write.
pub fn trigger(owner: StoreId, key: &str) {
    // Snapshot the subscriber ids before touching any effect.
    let subscriber_ids: Vec<EffectId> = {
        let Some(keys) = dep_map().get(&owner) else {
            return;
        };
        let Some(subscribers) = keys.get(key) else {
            return;
        };
        subscribers.iter().copied().collect()
    };

    if subscriber_ids.is_empty() {
        return;
    }

    let current = current_effect().map(|e| e.id());

    // Upgrade while no registry guard is held across the effect calls.
    let mut to_notify = Vec::with_capacity(subscriber_ids.len());
    for id in subscriber_ids {
        if Some(id) == current {
            continue;
        }
        let upgraded = effects().get(&id).and_then(|weak| weak.upgrade());
        if let Some(effect) = upgraded {
            to_notify.push(effect);
        }
    }

    for effect in to_notify {
        match effect.scheduler() {
            Some(scheduler) => scheduler(),
            None => effect.run(),
        }
    }
}

/// Remove `effect` from every dependency set it joined.
///
/// Called before each re-run (stale subscriptions from branches the effect
/// no longer reads must be dropped) and on stop.
pub(crate) fn cleanup_effect(effect: &EffectInner) {
    let id = effect.id();
    for (owner, key) in effect.take_deps() {
        if let Some(mut keys) = dep_map().get_mut(&owner) {
            if let Some(subscribers) = keys.get_mut(&key) {
                subscribers.remove(&id);
                if subscribers.is_empty() {
                    keys.remove(&key);
                }
            }
        }
    }
}

/// Drop every dependency set owned by a store. Called when the store's data
/// is dropped; the registry entry must not outlive the store.
pub(crate) fn release_store(owner: StoreId) {
    dep_map().remove(&owner);
}
