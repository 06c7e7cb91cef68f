//! Trellis Core
//!
//! This crate provides the execution core for the Trellis declarative UI
//! framework. It implements:
//!
//! - Fine-grained reactivity (reactive stores, effects, computed values)
//! - A virtual node model and keyed reconciliation engine
//! - Component instances with scheduled render effects
//! - Provide/inject context propagation and update batching
//!
//! The crate is host-agnostic: all platform mutation happens behind the
//! [`runtime::HostOps`] trait, so the same core drives a DOM backend, a
//! native widget tree or the in-memory host used by the test suite.
//!
//! # Architecture
//!
//! The crate is organized into two layers:
//!
//! - `reactive`: dependency tracking, reactive stores, effects, computed
//! - `runtime`: virtual nodes, the renderer, components, scheduling
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::reactive::{effect, reactive, Fields, Value};
//!
//! // Create a reactive store
//! let state = reactive(Fields::from_iter([
//!     ("count".to_string(), Value::Int(0)),
//! ]));
//!
//! // Create an effect; it re-runs whenever a field it read changes
//! let s = state.clone();
//! effect(move || {
//!     println!("count = {}", s.get("count").display());
//! });
//!
//! // Update the store; the effect runs again, prints: "count = 5"
//! state.set("count", Value::Int(5));
//! ```

pub mod reactive;
pub mod runtime;
