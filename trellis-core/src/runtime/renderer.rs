//! Reconciliation Engine
//!
//! Diffs consecutive virtual trees and emits the minimal host mutations
//! through [`HostOps`]. Dispatch is by node type; within a node, by child
//! shape. Keyed child lists go through a two-ended diff with
//! longest-increasing-subsequence move minimization, so a reorder moves
//! only the nodes that are actually out of place.
//!
//! # Component updates
//!
//! Each mounted component owns one lazy render effect. Its scheduler
//! enqueues the instance's update job keyed by the effect id, so a burst of
//! state writes collapses into one re-render at the next flush. A parent
//! re-render that changes a child's props pushes the pending vnode onto the
//! child and runs its update synchronously.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::component::{setup_component, ComponentInstance};
use super::host::{HostHandle, HostOps};
use super::scheduler::{queue_job, Job};
use super::sequence::longest_increasing_indices;
use super::vnode::{Children, NodeType, ShapeFlags, VNode};
use crate::reactive::{EffectOptions, ReactiveEffect};

/// Drives mounting and patching against one host backend.
#[derive(Clone)]
pub struct Renderer {
    host: Arc<dyn HostOps>,
    /// Last tree rendered into each container, the baseline for the next
    /// top-level render.
    roots: Arc<Mutex<HashMap<u64, Arc<VNode>>>>,
}

impl Renderer {
    pub fn new(host: Arc<dyn HostOps>) -> Self {
        Self {
            host,
            roots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Render `vnode` into `container`: a mount the first time, a patch
    /// against the container's previous tree afterwards.
    pub fn render(&self, vnode: &Arc<VNode>, container: HostHandle) {
        let prev = self.roots.lock().insert(container.0, Arc::clone(vnode));
        self.patch(prev.as_ref(), vnode, container, None, None);
    }

    /// The central dispatch: mount when `prev` is absent, patch in place
    /// when the node types match, replace otherwise.
    fn patch(
        &self,
        prev: Option<&Arc<VNode>>,
        next: &Arc<VNode>,
        container: HostHandle,
        anchor: Option<HostHandle>,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        let prev = match prev {
            Some(p) if !p.same_node_type(next) => {
                // Incompatible node: tear down and mount fresh.
                self.unmount(p);
                None
            }
            other => other,
        };

        match &next.node_type {
            NodeType::Text => self.process_text(prev, next, container, anchor),
            NodeType::Fragment => self.process_fragment(prev, next, container, anchor, parent),
            NodeType::Element(_) => self.process_element(prev, next, container, anchor, parent),
            NodeType::Component(_) => self.process_component(prev, next, container, anchor, parent),
        }
    }

    fn process_text(
        &self,
        prev: Option<&Arc<VNode>>,
        next: &Arc<VNode>,
        container: HostHandle,
        anchor: Option<HostHandle>,
    ) {
        let text = match &next.children {
            Children::Text(text) => text.as_str(),
            _ => "",
        };

        match prev {
            None => {
                let el = self.host.create_text(text);
                next.set_el(Some(el));
                self.host.insert(el, container, anchor);
            }
            Some(prev) => {
                let el = prev.el();
                next.set_el(el);
                let old_text = match &prev.children {
                    Children::Text(t) => t.as_str(),
                    _ => "",
                };
                if let Some(el) = el {
                    if old_text != text {
                        self.host.set_text(el, text);
                    }
                }
            }
        }
    }

    /// A fragment contributes no host node; its children render directly
    /// into the surrounding container.
    fn process_fragment(
        &self,
        prev: Option<&Arc<VNode>>,
        next: &Arc<VNode>,
        container: HostHandle,
        anchor: Option<HostHandle>,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        match prev {
            None => {
                if let Children::Nodes(children) = &next.children {
                    for child in children {
                        self.patch(None, child, container, anchor, parent);
                    }
                }
            }
            Some(prev) => self.patch_children(prev, next, container, anchor, parent),
        }
    }

    fn process_element(
        &self,
        prev: Option<&Arc<VNode>>,
        next: &Arc<VNode>,
        container: HostHandle,
        anchor: Option<HostHandle>,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        match prev {
            None => self.mount_element(next, container, anchor, parent),
            Some(prev) => self.patch_element(prev, next, parent),
        }
    }

    fn mount_element(
        &self,
        vnode: &Arc<VNode>,
        container: HostHandle,
        anchor: Option<HostHandle>,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        let tag = match &vnode.node_type {
            NodeType::Element(tag) => tag.as_str(),
            other => unreachable!("mount_element on {other:?}"),
        };
        let el = self.host.create_element(tag);
        vnode.set_el(Some(el));
        trace!(tag, ?el, "element mounted");

        match &vnode.children {
            Children::Text(text) => self.host.set_text(el, text),
            Children::Nodes(children) => {
                for child in children {
                    self.patch(None, child, el, None, parent);
                }
            }
            Children::None | Children::Slots(_) => {}
        }

        for (key, value) in &vnode.props {
            self.host.patch_prop(el, key, None, Some(value));
        }

        self.host.insert(el, container, anchor);
    }

    fn patch_element(
        &self,
        prev: &Arc<VNode>,
        next: &Arc<VNode>,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        let Some(el) = prev.el() else {
            return;
        };
        next.set_el(Some(el));
        self.patch_props(el, prev, next);
        self.patch_children(prev, next, el, None, parent);
    }

    /// Apply prop changes: new and changed keys first, then removals.
    fn patch_props(&self, el: HostHandle, prev: &VNode, next: &VNode) {
        for (key, new) in &next.props {
            let old = prev.props.get(key);
            if old != Some(new) {
                self.host.patch_prop(el, key, old, Some(new));
            }
        }
        for (key, old) in &prev.props {
            if !next.props.contains_key(key) {
                self.host.patch_prop(el, key, Some(old), None);
            }
        }
    }

    /// Child-shape transitions, then the keyed diff for list-to-list.
    fn patch_children(
        &self,
        prev: &VNode,
        next: &VNode,
        container: HostHandle,
        anchor: Option<HostHandle>,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        let prev_shape = prev.shape;
        let next_shape = next.shape;

        if next_shape.contains(ShapeFlags::TEXT_CHILDREN) {
            if prev_shape.contains(ShapeFlags::ARRAY_CHILDREN) {
                if let Children::Nodes(old_children) = &prev.children {
                    for child in old_children {
                        self.unmount(child);
                    }
                }
            }
            let text = match &next.children {
                Children::Text(t) => t.as_str(),
                _ => "",
            };
            let old_text = match &prev.children {
                Children::Text(t) => Some(t.as_str()),
                _ => None,
            };
            if old_text != Some(text) {
                self.host.set_text(container, text);
            }
            return;
        }

        if next_shape.contains(ShapeFlags::ARRAY_CHILDREN) {
            let new_children = match &next.children {
                Children::Nodes(nodes) => nodes,
                _ => return,
            };
            if prev_shape.contains(ShapeFlags::TEXT_CHILDREN) {
                // Clear the text, then mount the list.
                self.host.set_text(container, "");
                for child in new_children {
                    self.patch(None, child, container, anchor, parent);
                }
            } else if prev_shape.contains(ShapeFlags::ARRAY_CHILDREN) {
                if let Children::Nodes(old_children) = &prev.children {
                    self.patch_keyed_children(
                        old_children,
                        new_children,
                        container,
                        anchor,
                        parent,
                    );
                }
            } else {
                for child in new_children {
                    self.patch(None, child, container, anchor, parent);
                }
            }
            return;
        }

        // Next has no children: tear down whatever was there.
        if prev_shape.contains(ShapeFlags::ARRAY_CHILDREN) {
            if let Children::Nodes(old_children) = &prev.children {
                for child in old_children {
                    self.unmount(child);
                }
            }
        } else if prev_shape.contains(ShapeFlags::TEXT_CHILDREN) {
            self.host.set_text(container, "");
        }
    }

    /// Two-ended keyed diff.
    ///
    /// Phases: sync matching heads, sync matching tails, then handle the
    /// pure-append / pure-removal shortcuts; an irregular middle builds a
    /// key index, patches survivors, unmounts the rest and moves only the
    /// nodes outside the longest stable (increasing old-index) run,
    /// walking back-to-front so each insertion anchor is already placed.
    fn patch_keyed_children(
        &self,
        c1: &[Arc<VNode>],
        c2: &[Arc<VNode>],
        container: HostHandle,
        parent_anchor: Option<HostHandle>,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        let mut i = 0usize;
        let mut e1 = c1.len() as isize - 1;
        let mut e2 = c2.len() as isize - 1;

        // Head sync.
        while (i as isize) <= e1 && (i as isize) <= e2 {
            let (old, new) = (&c1[i], &c2[i]);
            if !old.same_node_type(new) {
                break;
            }
            self.patch(Some(old), new, container, parent_anchor, parent);
            i += 1;
        }

        // Tail sync.
        while (i as isize) <= e1 && (i as isize) <= e2 {
            let (old, new) = (&c1[e1 as usize], &c2[e2 as usize]);
            if !old.same_node_type(new) {
                break;
            }
            self.patch(Some(old), new, container, parent_anchor, parent);
            e1 -= 1;
            e2 -= 1;
        }

        if (i as isize) > e1 {
            // Old side exhausted: everything left in new is a fresh mount,
            // anchored before the first already-placed tail node.
            if (i as isize) <= e2 {
                let anchor_index = (e2 + 1) as usize;
                let anchor = if anchor_index < c2.len() {
                    c2[anchor_index].el()
                } else {
                    parent_anchor
                };
                for new in &c2[i..=(e2 as usize)] {
                    self.patch(None, new, container, anchor, parent);
                }
            }
            return;
        }

        if (i as isize) > e2 {
            // New side exhausted: the old remainder is pure removal.
            for old in &c1[i..=(e1 as usize)] {
                self.unmount(old);
            }
            return;
        }

        // Irregular middle.
        let s1 = i;
        let s2 = i;
        let to_patch = (e2 as usize) - s2 + 1;

        let mut key_index = indexmap::IndexMap::new();
        for (offset, new) in c2[s2..=(e2 as usize)].iter().enumerate() {
            if let Some(key) = &new.key {
                key_index.insert(key.clone(), s2 + offset);
            }
        }

        // For each new-middle slot, the old index of its counterpart, or -1
        // for a fresh mount.
        let mut new_to_old: Vec<i64> = vec![-1; to_patch];
        let mut patched = 0usize;
        let mut moved = false;
        let mut max_new_index = 0usize;

        for (offset, old) in c1[s1..=(e1 as usize)].iter().enumerate() {
            let old_index = s1 + offset;
            if patched >= to_patch {
                // Every new slot already has a counterpart.
                self.unmount(old);
                continue;
            }

            let new_index = match &old.key {
                Some(key) => key_index.get(key).copied(),
                // Keyless: first unclaimed same-type slot.
                None => c2[s2..=(e2 as usize)]
                    .iter()
                    .enumerate()
                    .find(|(offset, new)| {
                        new_to_old[*offset] == -1 && old.same_node_type(new)
                    })
                    .map(|(offset, _)| s2 + offset),
            };

            match new_index {
                None => self.unmount(old),
                Some(new_index) => {
                    new_to_old[new_index - s2] = old_index as i64;
                    if new_index >= max_new_index {
                        max_new_index = new_index;
                    } else {
                        moved = true;
                    }
                    self.patch(Some(old), &c2[new_index], container, parent_anchor, parent);
                    patched += 1;
                }
            }
        }

        let stable = if moved {
            longest_increasing_indices(&new_to_old)
        } else {
            Vec::new()
        };
        let mut stable_cursor = stable.len() as isize - 1;

        // Back-to-front: the anchor for each node is its next sibling,
        // already in final position.
        for offset in (0..to_patch).rev() {
            let new_index = s2 + offset;
            let new = &c2[new_index];
            let anchor = if new_index + 1 < c2.len() {
                c2[new_index + 1].el()
            } else {
                parent_anchor
            };

            if new_to_old[offset] == -1 {
                self.patch(None, new, container, anchor, parent);
            } else if moved {
                if stable_cursor < 0 || offset != stable[stable_cursor as usize] {
                    if let Some(el) = new.el() {
                        debug!(key = ?new.key, "child moved");
                        self.host.insert(el, container, anchor);
                    }
                } else {
                    stable_cursor -= 1;
                }
            }
        }
    }

    /// Tear a mounted node down: components stop their render effect and
    /// unmount their subtree, fragments unmount their children, host nodes
    /// are removed directly. Components nested under a removed host node
    /// still need their effects stopped, so the host arm deactivates its
    /// descendants first.
    fn unmount(&self, vnode: &Arc<VNode>) {
        match &vnode.node_type {
            NodeType::Component(_) => {
                if let Some(instance) = vnode.instance() {
                    if let Some(runner) = instance.take_update_runner() {
                        runner.stop();
                    }
                    if let Some(subtree) = instance.take_subtree() {
                        self.unmount(&subtree);
                    }
                }
            }
            NodeType::Fragment => {
                if let Children::Nodes(children) = &vnode.children {
                    for child in children {
                        self.unmount(child);
                    }
                }
            }
            _ => {
                if let Children::Nodes(children) = &vnode.children {
                    for child in children {
                        self.deactivate(child);
                    }
                }
                if let Some(el) = vnode.el() {
                    self.host.remove(el);
                }
            }
        }
    }

    /// Stop every render effect in a subtree whose host nodes are leaving
    /// with an ancestor's removal. No host ops are emitted; removing the
    /// ancestor detaches the whole subtree.
    fn deactivate(&self, vnode: &Arc<VNode>) {
        match &vnode.node_type {
            NodeType::Component(_) => {
                if let Some(instance) = vnode.instance() {
                    if let Some(runner) = instance.take_update_runner() {
                        runner.stop();
                    }
                    if let Some(subtree) = instance.take_subtree() {
                        self.deactivate(&subtree);
                    }
                }
            }
            _ => {
                if let Children::Nodes(children) = &vnode.children {
                    for child in children {
                        self.deactivate(child);
                    }
                }
            }
        }
    }

    fn process_component(
        &self,
        prev: Option<&Arc<VNode>>,
        next: &Arc<VNode>,
        container: HostHandle,
        anchor: Option<HostHandle>,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        match prev {
            None => self.mount_component(next, container, anchor, parent),
            Some(prev) => self.update_component(prev, next),
        }
    }

    fn mount_component(
        &self,
        vnode: &Arc<VNode>,
        container: HostHandle,
        anchor: Option<HostHandle>,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        let instance = ComponentInstance::new(Arc::clone(vnode), parent.cloned());
        vnode.set_instance(Arc::clone(&instance));
        debug!(
            component = instance.definition().name.as_deref().unwrap_or("anonymous"),
            "component mounting"
        );
        setup_component(&instance);
        self.setup_render_effect(&instance, container, anchor);
    }

    fn update_component(&self, prev: &Arc<VNode>, next: &Arc<VNode>) {
        let Some(instance) = prev.instance() else {
            return;
        };
        next.set_instance(Arc::clone(&instance));

        if should_update(prev, next) {
            // Pending vnode consumed by the synchronous update run.
            instance.set_next(Arc::clone(next));
            if let Some(runner) = instance.update_runner() {
                runner.run();
            }
        } else {
            // Same props: keep the rendered output, just re-point identity.
            next.set_el(prev.el());
            instance.set_vnode(Arc::clone(next));
        }
    }

    /// Create the component's lazy render effect, wire its scheduler to the
    /// job queue and run it once to mount.
    fn setup_render_effect(
        &self,
        instance: &Arc<ComponentInstance>,
        container: HostHandle,
        anchor: Option<HostHandle>,
    ) {
        let renderer = self.clone();
        let weak = Arc::downgrade(instance);
        let update_fn = move || {
            let Some(instance) = weak.upgrade() else {
                return;
            };

            if !instance.is_mounted() {
                let Some(subtree) = instance.run_render() else {
                    return;
                };
                renderer.patch(None, &subtree, container, anchor, Some(&instance));
                // The component's own handle is its subtree root's.
                instance.vnode().set_el(subtree.el());
                instance.set_subtree(subtree);
                instance.set_mounted();
                return;
            }

            if let Some(next) = instance.take_next() {
                next.set_el(instance.vnode().el());
                instance.adopt(next);
            }
            let Some(next_tree) = instance.run_render() else {
                return;
            };
            let prev_tree = instance.take_subtree();
            renderer.patch(prev_tree.as_ref(), &next_tree, container, anchor, Some(&instance));
            instance.vnode().set_el(next_tree.el());
            instance.set_subtree(next_tree);
        };

        let sched_weak = Arc::downgrade(instance);
        let scheduler = Arc::new(move || {
            let Some(instance) = sched_weak.upgrade() else {
                return;
            };
            if let Some(runner) = instance.update_runner() {
                let id = runner.id().raw();
                queue_job(Job::new(id, move || runner.run()));
            }
        });

        let runner = ReactiveEffect::new_lazy(
            update_fn,
            EffectOptions {
                scheduler: Some(scheduler),
                on_stop: None,
            },
        );
        instance.set_update_runner(runner.clone());
        runner.run();
    }
}

/// A child re-render is only due when the parent handed it different props.
fn should_update(prev: &VNode, next: &VNode) -> bool {
    prev.props != next.props
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Fields, Value};

    #[test]
    fn should_update_compares_props_shallowly() {
        let mut p1 = Fields::new();
        p1.insert("count".to_string(), Value::Int(1));
        let mut p2 = Fields::new();
        p2.insert("count".to_string(), Value::Int(1));
        let mut p3 = Fields::new();
        p3.insert("count".to_string(), Value::Int(2));

        let def = Arc::new(super::super::component::ComponentDef::default());
        let a = VNode::component(def.clone(), p1, Children::None);
        let b = VNode::component(def.clone(), p2, Children::None);
        let c = VNode::component(def, p3, Children::None);

        assert!(!should_update(&a, &b));
        assert!(should_update(&a, &c));
    }
}
