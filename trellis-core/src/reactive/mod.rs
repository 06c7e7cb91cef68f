//! Reactive Primitives
//!
//! This module implements the fine-grained reactivity engine: reactive
//! stores, effects and computed values, held together by a dependency
//! registry.
//!
//! # Concepts
//!
//! ## Stores
//!
//! A [`Store`] wraps an ordered field map and intercepts reads and writes.
//! Reading a field inside a running effect subscribes that effect to the
//! field; writing a field notifies every subscriber. Readonly views share
//! the same data but never track and reject writes.
//!
//! ## Effects
//!
//! An [`effect`] is a re-runnable computation. It runs once eagerly to
//! collect its dependencies and re-runs (or defers via its scheduler) when
//! any of them changes. Each re-run re-collects dependencies from scratch,
//! so conditional reads behave correctly.
//!
//! ## Computed values
//!
//! A [`computed`] is an effect wearing a value's clothes: lazily evaluated
//! on read, cached while clean, invalidated (not recomputed) by dependency
//! writes.
//!
//! # Implementation Notes
//!
//! Dependency detection is automatic: a thread-local stack records which
//! effect is currently running, and store reads consult it. The same
//! transparent-tracking approach is used by the major fine-grained
//! frameworks; the stack (rather than a single slot) is what makes nested
//! effects restore the outer tracking context correctly.

mod computed;
mod effect;
mod store;
mod tracking;
mod value;

pub use computed::{computed, Computed};
pub use effect::{effect, effect_with, EffectId, EffectOptions, ReactiveEffect};
pub use store::{reactive, readonly, shallow_readonly, Store, StoreId};
pub use tracking::{is_tracking, track, trigger};
pub use value::{has_changed, Callback, Fields, Value};
