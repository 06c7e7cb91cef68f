//! Runtime Core
//!
//! The rendering half of the framework: the virtual node model, the
//! reconciliation engine that diffs trees into host mutations, component
//! instances with their scheduled render effects, provide/inject context
//! propagation and the job queue that batches updates.
//!
//! The runtime never touches a real UI tree; all platform mutation goes
//! through the [`host::HostOps`] trait.

pub mod app;
pub mod component;
pub mod context;
pub mod host;
pub mod renderer;
pub mod scheduler;
mod sequence;
pub mod vnode;

pub use app::App;
pub use component::{
    current_instance, register_compiler, ComponentDef, ComponentInstance, RenderContext, RenderFn,
    SetupContext, SetupFn, TemplateError,
};
pub use context::{inject, provide};
pub use host::{HostHandle, HostOps};
pub use renderer::Renderer;
pub use scheduler::{flush_jobs, has_pending_jobs, next_tick, queue_job, Job};
pub use vnode::{Children, NodeType, ShapeFlags, SlotFn, VNode};
