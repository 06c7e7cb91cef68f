//! Application Root
//!
//! The entry point that turns a root component definition into a mounted
//! tree: wrap the definition in a component vnode, hand it to the renderer.

use std::sync::Arc;

use tracing::info;

use super::component::ComponentDef;
use super::host::HostHandle;
use super::renderer::Renderer;
use super::vnode::{Children, VNode};
use crate::reactive::Fields;

/// An application: a root component bound to a renderer, not yet mounted.
pub struct App {
    renderer: Renderer,
    root: Arc<ComponentDef>,
}

impl Renderer {
    /// Package `root` as an app driven by this renderer.
    pub fn create_app(&self, root: Arc<ComponentDef>) -> App {
        App {
            renderer: self.clone(),
            root,
        }
    }
}

impl App {
    /// Mount the root component into `container`. Returns the root vnode,
    /// which owns the mounted component tree.
    pub fn mount(&self, container: HostHandle) -> Arc<VNode> {
        info!(
            component = self.root.name.as_deref().unwrap_or("anonymous"),
            "mounting application root"
        );
        let vnode = VNode::component(Arc::clone(&self.root), Fields::new(), Children::None);
        self.renderer.render(&vnode, container);
        vnode
    }
}
