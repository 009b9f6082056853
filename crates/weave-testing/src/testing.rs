use std::rc::Rc;

use weave_core::{
    Child, Host, MutationStats, NodeId, NodeKind, RenderConfig, RenderError, Renderer, Skeleton,
    SkeletonBuilder, SlotRef, Template, Tree, UnitId, Value,
};

/// Headless harness for exercising render passes in tests.
///
/// `RenderTestRule` owns a [`Renderer`] with one root mounted into a `main`
/// container. Pool consistency checks are strict, so a violation fails the
/// test instead of being logged. The mutation counters of the most recent
/// pass are kept for assertions about how much work a pass did.
pub struct RenderTestRule {
    renderer: Renderer,
    container: NodeId,
    root: UnitId,
    content: Option<Box<dyn FnMut() -> Value>>,
    last_pass: MutationStats,
}

impl RenderTestRule {
    /// Create a new test rule with strict pool checking.
    pub fn new() -> Self {
        Self::with_config(RenderConfig::default().with_strict_pools(true))
    }

    pub fn with_config(config: RenderConfig) -> Self {
        Self::mount(Renderer::new(config))
    }

    pub fn with_host(config: RenderConfig, host: impl Host + 'static) -> Self {
        Self::mount(Renderer::with_host(config, host))
    }

    fn mount(mut renderer: Renderer) -> Self {
        let container = renderer.tree_mut().create_element("main");
        let root = match renderer.mount(container) {
            Ok(root) => root,
            Err(err) => panic!("mounting into a fresh container failed: {err}"),
        };
        Self {
            renderer,
            container,
            root,
            content: None,
            last_pass: MutationStats::default(),
        }
    }

    /// Install the provided content producer and perform an initial render.
    pub fn set_content(&mut self, content: impl FnMut() -> Value + 'static) -> Result<(), RenderError> {
        self.content = Some(Box::new(content));
        self.rerender()
    }

    /// Render the installed content again.
    pub fn rerender(&mut self) -> Result<(), RenderError> {
        let Some(content) = self.content.as_mut() else {
            return Ok(());
        };
        let value = content();
        self.render_value(value)
    }

    /// Render a one-off value into the root, bypassing installed content.
    pub fn render_value(&mut self, value: impl Into<Value>) -> Result<(), RenderError> {
        let before = self.renderer.tree().stats();
        let result = self.renderer.render(self.root, value);
        self.last_pass = self.renderer.tree().stats().since(&before);
        result
    }

    /// Tree operations performed by the most recent render.
    pub fn last_pass(&self) -> MutationStats {
        self.last_pass
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    pub fn root(&self) -> UnitId {
        self.root
    }

    pub fn container(&self) -> NodeId {
        self.container
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer {
        &mut self.renderer
    }

    pub fn tree(&self) -> &Tree {
        self.renderer.tree()
    }

    /// Units rendered into a content slot, in order. Caller-owned nodes are
    /// skipped.
    pub fn child_units(&self, slot: SlotRef) -> Vec<UnitId> {
        self.renderer
            .slot_children(slot)
            .unwrap_or_default()
            .iter()
            .filter_map(|child| match child {
                Child::Unit(unit) => Some(*unit),
                Child::Node(_) => None,
            })
            .collect()
    }

    /// Units directly under the root.
    pub fn root_units(&self) -> Vec<UnitId> {
        self.child_units(SlotRef::new(self.root, 0))
    }

    /// Every text node under the container, in document order.
    pub fn text_nodes(&self) -> Vec<NodeId> {
        let tree = self.tree();
        let mut found = Vec::new();
        let mut stack = vec![self.container];
        while let Some(node) = stack.pop() {
            if tree.text(node).is_some() {
                found.push(node);
            }
            let mut children = tree.children(node);
            children.reverse();
            stack.extend(children);
        }
        found
    }

    /// Contents of [`text_nodes`](Self::text_nodes).
    pub fn texts(&self) -> Vec<String> {
        self.text_nodes()
            .into_iter()
            .filter_map(|node| self.tree().text(node).map(str::to_string))
            .collect()
    }

    /// Elements under the container with the given tag, in document order.
    pub fn elements(&self, tag: &str) -> Vec<NodeId> {
        let tree = self.tree();
        let mut found = Vec::new();
        let mut stack = vec![self.container];
        while let Some(node) = stack.pop() {
            if matches!(tree.kind(node), Some(NodeKind::Element { tag: t }) if t == tag) {
                found.push(node);
            }
            let mut children = tree.children(node);
            children.reverse();
            stack.extend(children);
        }
        found
    }

    pub fn dump(&self) -> String {
        self.tree().dump_tree(Some(self.container))
    }
}

impl Default for RenderTestRule {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for tests that only need temporary access to a
/// `RenderTestRule`.
pub fn run_test_render<R>(f: impl FnOnce(&mut RenderTestRule) -> R) -> R {
    let mut rule = RenderTestRule::new();
    f(&mut rule)
}

fn stock(builder: SkeletonBuilder) -> Rc<Skeleton> {
    match builder.build() {
        Ok(skeleton) => Rc::new(skeleton),
        Err(err) => panic!("stock skeleton failed to build: {err}"),
    }
}

/// `<ul>${items}</ul>`
pub fn list_skeleton() -> Rc<Skeleton> {
    stock(SkeletonBuilder::new().open("ul").content().close())
}

/// `<li>${label}</li>`
pub fn item_skeleton() -> Rc<Skeleton> {
    stock(SkeletonBuilder::new().open("li").content().close())
}

/// `<ul>` whose children are bare text units.
pub fn text_list(list: &Rc<Skeleton>, labels: &[&str]) -> Value {
    let items = Value::list(labels.iter().map(|label| Value::from(*label)));
    Template::new(Rc::clone(list), vec![items]).into()
}

/// `<ul>` whose children are `<li>` template units.
pub fn item_list(list: &Rc<Skeleton>, item: &Rc<Skeleton>, labels: &[&str]) -> Value {
    let items = Value::list(
        labels
            .iter()
            .map(|label| Value::Template(Template::new(Rc::clone(item), vec![Value::from(*label)]))),
    );
    Template::new(Rc::clone(list), vec![items]).into()
}
