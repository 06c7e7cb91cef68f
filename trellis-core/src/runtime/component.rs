//! Component Model
//!
//! Component definitions (the authoring surface), component instances (the
//! renderer-owned runtime state) and the render context handed to render
//! functions.
//!
//! # Setup
//!
//! `setup` runs exactly once, at mount, with the component's props as a
//! shallow-readonly store and a context exposing `emit`. While it runs, a
//! thread-local "current instance" pointer is set so instance-scoped APIs
//! (`provide`, `inject`, [`current_instance`]) resolve; the pointer is
//! cleared the moment setup returns, which is why those APIs are only
//! usable during setup.
//!
//! The fields `setup` returns become instance state, wrapped in a reactive
//! store so render-time reads subscribe the render effect.
//!
//! # Render resolution
//!
//! An explicit `render` function wins. Otherwise, if the definition carries
//! a `template` and a compiler was installed via [`register_compiler`], the
//! template is compiled at mount. A malformed template is fatal: it cannot
//! produce a usable render function. A component with neither render nor
//! compilable template warns and renders nothing.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::warn;

use super::context::ProvideMap;
use super::host::HostHandle;
use super::vnode::{Children, ShapeFlags, SlotFn, VNode};
use crate::reactive::{reactive, shallow_readonly, Callback, Fields, ReactiveEffect, Store, Value};

/// A render function: context in, virtual tree out.
pub type RenderFn = Arc<dyn Fn(&RenderContext) -> Arc<VNode> + Send + Sync>;

/// The setup callback: shallow-readonly props plus a setup context; the
/// returned fields become reactive instance state.
pub type SetupFn = Arc<dyn Fn(Store, &SetupContext) -> Option<Fields> + Send + Sync>;

/// Error surfaced by the external template compiler. Fatal: a malformed
/// template cannot yield a render function.
#[derive(Debug, Error)]
#[error("template compilation failed: {message}")]
pub struct TemplateError {
    pub message: String,
}

impl TemplateError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Hook type for the external template-to-render-function compiler.
pub type CompilerFn = Arc<dyn Fn(&str) -> Result<RenderFn, TemplateError> + Send + Sync>;

static COMPILER: RwLock<Option<CompilerFn>> = RwLock::new(None);

/// Install the template compiler collaborator. Components declaring a
/// `template` (and no `render`) are compiled through it at mount.
pub fn register_compiler(compiler: CompilerFn) {
    *COMPILER.write() = Some(compiler);
}

/// A component definition, as authored by user code.
#[derive(Default)]
pub struct ComponentDef {
    pub name: Option<String>,
    pub setup: Option<SetupFn>,
    pub render: Option<RenderFn>,
    pub template: Option<String>,
}

impl ComponentDef {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn with_setup<F>(mut self, setup: F) -> Self
    where
        F: Fn(Store, &SetupContext) -> Option<Fields> + Send + Sync + 'static,
    {
        self.setup = Some(Arc::new(setup));
        self
    }

    pub fn with_render<F>(mut self, render: F) -> Self
    where
        F: Fn(&RenderContext) -> Arc<VNode> + Send + Sync + 'static,
    {
        self.render = Some(Arc::new(render));
        self
    }

    pub fn with_template(mut self, template: &str) -> Self {
        self.template = Some(template.to_string());
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl std::fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDef")
            .field("name", &self.name)
            .field("has_setup", &self.setup.is_some())
            .field("has_render", &self.render.is_some())
            .field("has_template", &self.template.is_some())
            .finish()
    }
}

/// Runtime state of one mounted component. Owned by the renderer: created
/// on first mount of a component vnode, destroyed on unmount.
pub struct ComponentInstance {
    def: Arc<ComponentDef>,
    vnode: RwLock<Arc<VNode>>,
    /// Pending vnode pushed by a parent re-render, consumed by the next
    /// update run.
    next: Mutex<Option<Arc<VNode>>>,
    /// Shallow-readonly view handed to setup and the render context.
    props: RwLock<Store>,
    slots: RwLock<indexmap::IndexMap<String, SlotFn>>,
    provides: RwLock<Arc<ProvideMap>>,
    parent: Option<Weak<ComponentInstance>>,
    mounted: AtomicBool,
    /// The subtree produced by the previous render, diffed against the
    /// next one.
    subtree: Mutex<Option<Arc<VNode>>>,
    state: RwLock<Option<Store>>,
    render: RwLock<Option<RenderFn>>,
    update: RwLock<Option<ReactiveEffect>>,
}

impl ComponentInstance {
    pub(crate) fn new(vnode: Arc<VNode>, parent: Option<Arc<ComponentInstance>>) -> Arc<Self> {
        let def = match &vnode.node_type {
            super::vnode::NodeType::Component(def) => Arc::clone(def),
            other => unreachable!("component instance for non-component node {other:?}"),
        };

        // Alias the parent's provide map until the first local provide.
        let provides = match &parent {
            Some(parent) => parent.provides(),
            None => ProvideMap::root(),
        };

        let props_store = shallow_readonly(&reactive(vnode.props.clone()));

        Arc::new(Self {
            def,
            vnode: RwLock::new(vnode),
            next: Mutex::new(None),
            props: RwLock::new(props_store),
            slots: RwLock::new(indexmap::IndexMap::new()),
            provides: RwLock::new(provides),
            parent: parent.map(|p| Arc::downgrade(&p)),
            mounted: AtomicBool::new(false),
            subtree: Mutex::new(None),
            state: RwLock::new(None),
            render: RwLock::new(None),
            update: RwLock::new(None),
        })
    }

    pub fn definition(&self) -> &Arc<ComponentDef> {
        &self.def
    }

    pub fn vnode(&self) -> Arc<VNode> {
        self.vnode.read().clone()
    }

    pub fn parent(&self) -> Option<Arc<ComponentInstance>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn provides(&self) -> Arc<ProvideMap> {
        self.provides.read().clone()
    }

    pub(crate) fn set_provides(&self, provides: Arc<ProvideMap>) {
        *self.provides.write() = provides;
    }

    pub fn props(&self) -> Store {
        self.props.read().clone()
    }

    pub fn state(&self) -> Option<Store> {
        self.state.read().clone()
    }

    pub fn slot(&self, name: &str) -> Option<SlotFn> {
        self.slots.read().get(name).cloned()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    pub(crate) fn set_mounted(&self) {
        self.mounted.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_next(&self, vnode: Arc<VNode>) {
        *self.next.lock() = Some(vnode);
    }

    pub(crate) fn take_next(&self) -> Option<Arc<VNode>> {
        self.next.lock().take()
    }

    pub(crate) fn subtree(&self) -> Option<Arc<VNode>> {
        self.subtree.lock().clone()
    }

    pub(crate) fn set_subtree(&self, subtree: Arc<VNode>) {
        *self.subtree.lock() = Some(subtree);
    }

    pub(crate) fn take_subtree(&self) -> Option<Arc<VNode>> {
        self.subtree.lock().take()
    }

    pub(crate) fn update_runner(&self) -> Option<ReactiveEffect> {
        self.update.read().clone()
    }

    pub(crate) fn set_update_runner(&self, runner: ReactiveEffect) {
        *self.update.write() = Some(runner);
    }

    pub(crate) fn take_update_runner(&self) -> Option<ReactiveEffect> {
        self.update.write().take()
    }

    /// Adopt the vnode a parent re-render produced for this component:
    /// replace the instance vnode and swap in the new props aggregate.
    /// Props are not dependency-tracked, so the swap does not trigger.
    pub(crate) fn adopt(&self, vnode: Arc<VNode>) {
        self.props.read().replace_fields_untracked(vnode.props.clone());
        *self.vnode.write() = vnode;
    }

    pub(crate) fn set_vnode(&self, vnode: Arc<VNode>) {
        *self.vnode.write() = vnode;
    }

    /// Invoke the resolved render function, if any.
    pub(crate) fn run_render(self: &Arc<Self>) -> Option<Arc<VNode>> {
        let render = self.render.read().clone()?;
        let ctx = RenderContext {
            instance: Arc::clone(self),
        };
        Some(render(&ctx))
    }
}

impl std::fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("component", &self.def.name)
            .field("mounted", &self.is_mounted())
            .finish()
    }
}

thread_local! {
    /// The instance whose setup is currently running, innermost last.
    static CURRENT_INSTANCE: RefCell<Vec<Arc<ComponentInstance>>> = RefCell::new(Vec::new());
}

/// The component instance whose setup is running, if any.
pub fn current_instance() -> Option<Arc<ComponentInstance>> {
    CURRENT_INSTANCE.with(|stack| stack.borrow().last().cloned())
}

struct InstanceScope;

impl InstanceScope {
    fn enter(instance: Arc<ComponentInstance>) -> Self {
        CURRENT_INSTANCE.with(|stack| stack.borrow_mut().push(instance));
        Self
    }
}

impl Drop for InstanceScope {
    fn drop(&mut self) {
        CURRENT_INSTANCE.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// The context handed to `setup`.
pub struct SetupContext {
    instance: Arc<ComponentInstance>,
}

impl SetupContext {
    /// Fire a component event: resolves the parent-supplied handler prop
    /// (`submit` -> `onSubmit`, `add-foo` -> `onAddFoo`) and invokes it.
    pub fn emit(&self, event: &str, args: &[Value]) -> Value {
        emit(&self.instance, event, args)
    }
}

/// Run a component's setup flow: props, slots, setup callback, render
/// resolution.
pub(crate) fn setup_component(instance: &Arc<ComponentInstance>) {
    init_slots(instance);

    if let Some(setup) = instance.def.setup.clone() {
        let _scope = InstanceScope::enter(Arc::clone(instance));
        let ctx = SetupContext {
            instance: Arc::clone(instance),
        };
        if let Some(state_fields) = setup(instance.props(), &ctx) {
            // Reactive wrap: render-time reads of these fields subscribe
            // the render effect.
            *instance.state.write() = Some(reactive(state_fields));
        }
    }

    finish_component_setup(instance);
}

fn init_slots(instance: &Arc<ComponentInstance>) {
    let vnode = instance.vnode();
    if !vnode.shape.contains(ShapeFlags::SLOT_CHILDREN) {
        return;
    }
    if let Children::Slots(slots) = &vnode.children {
        *instance.slots.write() = slots.clone();
    }
}

fn finish_component_setup(instance: &Arc<ComponentInstance>) {
    let resolved = if let Some(render) = instance.def.render.clone() {
        Some(render)
    } else if let Some(template) = instance.def.template.as_deref() {
        let compiler = COMPILER.read().clone();
        match compiler {
            Some(compile) => match compile(template) {
                Ok(render) => Some(render),
                Err(err) => panic!("{err}"),
            },
            None => {
                warn!(
                    component = instance.def.name.as_deref().unwrap_or("anonymous"),
                    "component declares a template but no compiler is registered"
                );
                None
            }
        }
    } else {
        None
    };

    if resolved.is_none() {
        warn!(
            component = instance.def.name.as_deref().unwrap_or("anonymous"),
            "component has no render function"
        );
    }
    *instance.render.write() = resolved;
}

/// Resolve and invoke the parent-supplied handler for `event`.
pub(crate) fn emit(instance: &Arc<ComponentInstance>, event: &str, args: &[Value]) -> Value {
    let handler_key = to_handler_key(event);
    match instance.props().get_untracked(&handler_key) {
        Value::Func(handler) => handler.call(args),
        Value::Null => Value::Null,
        other => {
            warn!(event, ?other, "event handler prop is not callable");
            Value::Null
        }
    }
}

/// `add-foo` -> `onAddFoo`: camelCase the event name, capitalize, prefix
/// `on`.
fn to_handler_key(event: &str) -> String {
    let mut out = String::with_capacity(event.len() + 2);
    out.push_str("on");
    let mut upper_next = true;
    for ch in event.chars() {
        if ch == '-' {
            upper_next = true;
            continue;
        }
        if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// The proxied view of an instance that render functions receive.
///
/// Lookup resolves in priority order: state shadows props, props shadow the
/// well-known accessors.
pub struct RenderContext {
    instance: Arc<ComponentInstance>,
}

impl RenderContext {
    /// Read a name from the instance. State reads track; props reads do
    /// not (props changes arrive via the parent's re-render, not via
    /// dependency triggering).
    pub fn get(&self, key: &str) -> Value {
        if let Some(state) = self.instance.state() {
            if state.contains(key) {
                return state.get(key);
            }
        }

        let props = self.instance.props();
        if props.contains(key) {
            return props.get(key);
        }

        match key {
            "$props" => Value::Store(self.instance.props()),
            _ => Value::Null,
        }
    }

    /// Write through to instance state.
    pub fn set(&self, key: &str, value: Value) {
        match self.instance.state() {
            Some(state) => state.set(key, value),
            None => warn!(key, "write to a component without setup state"),
        }
    }

    /// The host handle of the component's root, once mounted (`$el`).
    pub fn el(&self) -> Option<HostHandle> {
        self.instance.vnode().el()
    }

    pub fn emit(&self, event: &str, args: &[Value]) -> Value {
        emit(&self.instance, event, args)
    }

    /// Render a named slot with `props`, wrapped in a fragment so the slot
    /// adds no host node of its own.
    pub fn render_slot(&self, name: &str, props: &Fields) -> Option<Arc<VNode>> {
        let slot = self.instance.slot(name)?;
        Some(VNode::fragment(slot(props)))
    }

    /// A callback that emits `event` with fixed args; convenient for
    /// wiring handler props when building vnodes.
    pub fn emitter(&self, event: &str) -> Callback {
        let instance = Arc::clone(&self.instance);
        let event = event.to_string();
        Callback::new(move |args| emit(&instance, &event, args))
    }
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("component", &self.instance.def.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_key_conversion() {
        assert_eq!(to_handler_key("add"), "onAdd");
        assert_eq!(to_handler_key("add-foo"), "onAddFoo");
        assert_eq!(to_handler_key("my-long-event"), "onMyLongEvent");
    }

    #[test]
    fn current_instance_is_none_outside_setup() {
        assert!(current_instance().is_none());
    }

    #[test]
    fn emit_resolves_handler_props() {
        use std::sync::atomic::AtomicI32;

        let hits = Arc::new(AtomicI32::new(0));
        let h = hits.clone();
        let mut props = Fields::new();
        props.insert(
            "onAddOne".to_string(),
            Value::Func(Callback::handler(move |args| {
                let delta = args.first().and_then(Value::as_int).unwrap_or(0);
                h.fetch_add(delta as i32, Ordering::SeqCst);
            })),
        );

        let def = ComponentDef::named("Emitter").build();
        let vnode = VNode::component(def, props, Children::None);
        let instance = ComponentInstance::new(vnode, None);

        emit(&instance, "add-one", &[Value::Int(5)]);
        assert_eq!(hits.load(Ordering::SeqCst), 5);

        // Unknown events resolve no handler and are a quiet no-op.
        emit(&instance, "missing", &[]);
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn setup_state_is_reachable_through_render_context() {
        let def = ComponentDef::named("Stateful")
            .with_setup(|_props, _ctx| {
                let mut state = Fields::new();
                state.insert("count".to_string(), Value::Int(1));
                Some(state)
            })
            .build();

        let vnode = VNode::component(def, Fields::new(), Children::None);
        let instance = ComponentInstance::new(vnode, None);
        setup_component(&instance);

        let ctx = RenderContext {
            instance: Arc::clone(&instance),
        };
        assert_eq!(ctx.get("count"), Value::Int(1));

        ctx.set("count", Value::Int(2));
        assert_eq!(ctx.get("count"), Value::Int(2));
    }

    #[test]
    fn state_shadows_props() {
        let mut props = Fields::new();
        props.insert("label".to_string(), Value::from("from-props"));
        props.insert("other".to_string(), Value::from("prop-only"));

        let def = ComponentDef::named("Shadow")
            .with_setup(|_props, _ctx| {
                let mut state = Fields::new();
                state.insert("label".to_string(), Value::from("from-state"));
                Some(state)
            })
            .build();

        let vnode = VNode::component(def, props, Children::None);
        let instance = ComponentInstance::new(vnode, None);
        setup_component(&instance);

        let ctx = RenderContext {
            instance: Arc::clone(&instance),
        };
        assert_eq!(ctx.get("label"), Value::from("from-state"));
        assert_eq!(ctx.get("other"), Value::from("prop-only"));
        assert!(matches!(ctx.get("$props"), Value::Store(_)));
    }

    #[test]
    fn setup_receives_readonly_props() {
        let mut props = Fields::new();
        props.insert("n".to_string(), Value::Int(1));

        let def = ComponentDef::named("ReadonlyProps")
            .with_setup(|props, _ctx| {
                assert!(props.is_readonly());
                // Rejected, reported, not applied.
                props.set("n", Value::Int(99));
                assert_eq!(props.get_untracked("n"), Value::Int(1));
                None
            })
            .build();

        let vnode = VNode::component(def, props, Children::None);
        let instance = ComponentInstance::new(vnode, None);
        setup_component(&instance);
    }
}
