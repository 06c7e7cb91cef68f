//! Virtual Node Model
//!
//! A `VNode` is a lightweight, immutable-shape description of one node of
//! rendered output. Render functions build fresh trees on every run; the
//! reconciliation engine diffs consecutive trees and mutates the host.
//!
//! Only two fields change after construction, both populated during
//! mounting: the host handle (`el`) and, for component nodes, the owning
//! component instance.

use std::sync::Arc;

use bitflags::bitflags;
use indexmap::IndexMap;
use parking_lot::RwLock;

use super::component::{ComponentDef, ComponentInstance};
use super::host::HostHandle;
use crate::reactive::{Fields, Value};

bitflags! {
    /// Node classification, precomputed at construction so patch dispatch
    /// is a flag test instead of repeated shape inspection.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ShapeFlags: u8 {
        const ELEMENT = 1;
        const STATEFUL_COMPONENT = 1 << 1;
        const TEXT_CHILDREN = 1 << 2;
        const ARRAY_CHILDREN = 1 << 3;
        const SLOT_CHILDREN = 1 << 4;
    }
}

/// A named slot: a function from slot props to the nodes it renders.
pub type SlotFn = Arc<dyn Fn(&Fields) -> Vec<Arc<VNode>> + Send + Sync>;

/// What a node is.
#[derive(Clone)]
pub enum NodeType {
    /// A host element with a tag name.
    Element(String),
    /// A host text node; the text lives in `Children::Text`.
    Text,
    /// No host node of its own; only its children render.
    Fragment,
    /// A stateful component; compared by definition identity.
    Component(Arc<ComponentDef>),
}

impl NodeType {
    fn same(&self, other: &NodeType) -> bool {
        match (self, other) {
            (NodeType::Element(a), NodeType::Element(b)) => a == b,
            (NodeType::Text, NodeType::Text) => true,
            (NodeType::Fragment, NodeType::Fragment) => true,
            (NodeType::Component(a), NodeType::Component(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeType::Element(tag) => write!(f, "Element({tag})"),
            NodeType::Text => f.write_str("Text"),
            NodeType::Fragment => f.write_str("Fragment"),
            NodeType::Component(def) => {
                write!(f, "Component({})", def.name.as_deref().unwrap_or("anonymous"))
            }
        }
    }
}

/// Node children, in one of the shapes the diff dispatches on.
#[derive(Clone)]
pub enum Children {
    None,
    Text(String),
    Nodes(Vec<Arc<VNode>>),
    /// Named slots, only meaningful on component nodes.
    Slots(IndexMap<String, SlotFn>),
}

impl std::fmt::Debug for Children {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Children::None => f.write_str("None"),
            Children::Text(t) => write!(f, "Text({t:?})"),
            Children::Nodes(nodes) => write!(f, "Nodes(len={})", nodes.len()),
            Children::Slots(slots) => write!(f, "Slots(len={})", slots.len()),
        }
    }
}

/// One node of the virtual tree.
#[derive(Debug)]
pub struct VNode {
    pub node_type: NodeType,
    pub props: Fields,
    pub children: Children,
    /// Stable sibling identity for the keyed diff. Pulled out of the
    /// reserved `key` prop at construction.
    pub key: Option<String>,
    pub shape: ShapeFlags,
    el: RwLock<Option<HostHandle>>,
    instance: RwLock<Option<Arc<ComponentInstance>>>,
}

fn children_flags(children: &Children) -> ShapeFlags {
    match children {
        Children::None => ShapeFlags::empty(),
        Children::Text(_) => ShapeFlags::TEXT_CHILDREN,
        Children::Nodes(_) => ShapeFlags::ARRAY_CHILDREN,
        Children::Slots(_) => ShapeFlags::SLOT_CHILDREN,
    }
}

fn split_key(props: &mut Fields) -> Option<String> {
    match props.shift_remove("key") {
        Some(Value::Str(s)) => Some(s),
        Some(Value::Int(i)) => Some(i.to_string()),
        Some(other) => Some(other.display()),
        None => None,
    }
}

impl VNode {
    fn new(node_type: NodeType, mut props: Fields, children: Children, base: ShapeFlags) -> Arc<Self> {
        let key = split_key(&mut props);
        let shape = base | children_flags(&children);
        Arc::new(Self {
            node_type,
            props,
            children,
            key,
            shape,
            el: RwLock::new(None),
            instance: RwLock::new(None),
        })
    }

    /// An element node: `element("div", props, children)`.
    pub fn element(tag: &str, props: Fields, children: Children) -> Arc<Self> {
        Self::new(
            NodeType::Element(tag.to_string()),
            props,
            children,
            ShapeFlags::ELEMENT,
        )
    }

    /// A text node.
    pub fn text(text: &str) -> Arc<Self> {
        Self::new(
            NodeType::Text,
            Fields::new(),
            Children::Text(text.to_string()),
            ShapeFlags::empty(),
        )
    }

    /// A fragment: renders its children with no host node of its own.
    pub fn fragment(children: Vec<Arc<VNode>>) -> Arc<Self> {
        Self::new(
            NodeType::Fragment,
            Fields::new(),
            Children::Nodes(children),
            ShapeFlags::empty(),
        )
    }

    /// A component node.
    pub fn component(def: Arc<ComponentDef>, props: Fields, children: Children) -> Arc<Self> {
        Self::new(
            NodeType::Component(def),
            props,
            children,
            ShapeFlags::STATEFUL_COMPONENT,
        )
    }

    /// Same-node test for patch-in-place: type identity and key must both
    /// match, otherwise the old node is replaced wholesale.
    pub fn same_node_type(&self, other: &VNode) -> bool {
        self.node_type.same(&other.node_type) && self.key == other.key
    }

    pub fn el(&self) -> Option<HostHandle> {
        *self.el.read()
    }

    pub(crate) fn set_el(&self, el: Option<HostHandle>) {
        *self.el.write() = el;
    }

    pub fn instance(&self) -> Option<Arc<ComponentInstance>> {
        self.instance.read().clone()
    }

    pub(crate) fn set_instance(&self, instance: Arc<ComponentInstance>) {
        *self.instance.write() = Some(instance);
    }
}
