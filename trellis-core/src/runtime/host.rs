//! Host Platform Boundary
//!
//! The runtime core is host-agnostic: it never touches a real UI tree.
//! Everything it needs from the platform is behind [`HostOps`], and host
//! nodes are referred to only through opaque [`HostHandle`] ids allocated
//! by the host.
//!
//! A DOM backend maps these onto element/text nodes; the test suite maps
//! them onto an in-memory op log.

use std::fmt::Debug;

use crate::reactive::Value;

/// Opaque identifier of a host node. Allocated and interpreted by the host
/// renderer; the core only stores and passes it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostHandle(pub u64);

/// The abstract operations the reconciliation engine emits.
pub trait HostOps: Send + Sync {
    /// Create an element node for `tag`.
    fn create_element(&self, tag: &str) -> HostHandle;

    /// Create a text node with initial `text`.
    fn create_text(&self, text: &str) -> HostHandle;

    /// Apply a prop change. `new == None` signals removal. Keys following
    /// an event-handler naming convention (`onClick`, `onAddFoo`, ...) are
    /// the host's cue to attach or detach listeners instead of mutating
    /// attributes.
    fn patch_prop(&self, el: HostHandle, key: &str, old: Option<&Value>, new: Option<&Value>);

    /// Insert `el` into `container`, before `anchor` if given, else at the
    /// end.
    fn insert(&self, el: HostHandle, container: HostHandle, anchor: Option<HostHandle>);

    /// Detach `el` from its parent.
    fn remove(&self, el: HostHandle);

    /// Replace the text content of `el`.
    fn set_text(&self, el: HostHandle, text: &str);
}
