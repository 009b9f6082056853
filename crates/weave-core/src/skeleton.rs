//! Immutable template structure and slot descriptors.
//!
//! A [`Skeleton`] is what the template compiler hands the engine: the static
//! nodes of one template plus an ordered list of [`SlotDescriptor`]s saying
//! where dynamic values land. The engine never parses markup; compilers (and
//! tests) assemble skeletons through [`SkeletonBuilder`].
//!
//! Skeletons are memoised per distinct static-string array, either through
//! an owned [`SkeletonCache`] or the thread-local one behind
//! [`get_skeleton`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::collections::map::HashMap;
use crate::error::{NodeError, SkeletonError};
use crate::hash::hash_one;
use crate::tree::{NodeId, Tree};

/// Text of the comment opening a content slot.
pub const OPEN_MARKER: &str = "[";
/// Text of the comment closing a content slot; it anchors the slot's region.
pub const CLOSE_MARKER: &str = "]";

static NEXT_SKELETON_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SkeletonId(u64);

impl SkeletonId {
    fn next() -> Self {
        Self(NEXT_SKELETON_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SkeletonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaticNode {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
        children: Vec<StaticNode>,
        placeholder: bool,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Content,
    WholeAttribute,
    AttributeValue,
    Event,
    Comment,
    HostAttributeValue,
}

/// Whether an attribute name is also a settable property on its element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    AttributeOnly,
    TextProperty(&'static str),
    FlagProperty(&'static str),
}

const PROPERTY_TABLE: &[(&str, &str, Capability)] = &[
    ("input", "value", Capability::TextProperty("value")),
    ("textarea", "value", Capability::TextProperty("value")),
    ("select", "value", Capability::TextProperty("value")),
    ("input", "checked", Capability::FlagProperty("checked")),
    ("option", "selected", Capability::FlagProperty("selected")),
    ("*", "disabled", Capability::FlagProperty("disabled")),
    ("*", "hidden", Capability::FlagProperty("hidden")),
];

pub fn capability_for(tag: &str, name: &str) -> Capability {
    PROPERTY_TABLE
        .iter()
        .find(|(t, n, _)| (*t == "*" || t.eq_ignore_ascii_case(tag)) && n.eq_ignore_ascii_case(name))
        .map(|(_, _, capability)| *capability)
        .unwrap_or(Capability::AttributeOnly)
}

#[derive(Debug, Clone)]
pub struct SlotDescriptor {
    kind: SlotKind,
    path: Vec<usize>,
    name: Option<String>,
    fragments: Vec<String>,
    expressions: usize,
    capability: Capability,
    context: String,
}

impl SlotDescriptor {
    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    /// Child indices from the template roots to the slot's node. Content
    /// slots point at their opening marker; host attributes have an empty
    /// path.
    pub fn path(&self) -> &[usize] {
        &self.path
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// Number of values this slot consumes.
    pub fn expressions(&self) -> usize {
        self.expressions
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Static markup around the slot, for error messages.
    pub fn context(&self) -> &str {
        &self.context
    }
}

#[derive(Debug)]
pub struct Skeleton {
    id: SkeletonId,
    roots: Vec<StaticNode>,
    slots: Vec<SlotDescriptor>,
    offsets: Vec<usize>,
    value_count: usize,
}

impl Skeleton {
    pub fn id(&self) -> SkeletonId {
        self.id
    }

    pub fn roots(&self) -> &[StaticNode] {
        &self.roots
    }

    pub fn slots(&self) -> &[SlotDescriptor] {
        &self.slots
    }

    /// Index of the first value consumed by each slot.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn value_count(&self) -> usize {
        self.value_count
    }

    /// Clones the static structure into `tree`, returning the new roots.
    pub fn instantiate(&self, tree: &mut Tree) -> Result<Vec<NodeId>, NodeError> {
        self.roots
            .iter()
            .map(|node| instantiate_node(tree, node))
            .collect()
    }
}

fn instantiate_node(tree: &mut Tree, node: &StaticNode) -> Result<NodeId, NodeError> {
    match node {
        StaticNode::Element {
            tag,
            attributes,
            children,
            placeholder,
        } => {
            let id = if *placeholder {
                tree.create_placeholder(tag)
            } else {
                tree.create_element(tag)
            };
            for (name, value) in attributes {
                tree.set_attribute(id, name, value)?;
            }
            for child in children {
                let child = instantiate_node(tree, child)?;
                tree.append_child(id, child)?;
            }
            Ok(id)
        }
        StaticNode::Text(text) => Ok(tree.create_text(text)),
        StaticNode::Comment(text) => Ok(tree.create_comment(text)),
    }
}

/// Follows a descriptor path through freshly instantiated roots.
pub fn resolve_path(tree: &Tree, roots: &[NodeId], path: &[usize]) -> Option<NodeId> {
    let (first, rest) = path.split_first()?;
    let mut current = *roots.get(*first)?;
    for index in rest {
        current = tree.child_at(current, *index)?;
    }
    Some(current)
}

struct OpenElement {
    tag: String,
    attributes: Vec<(String, String)>,
    children: Vec<StaticNode>,
    placeholder: bool,
    path: Vec<usize>,
}

/// Assembles a [`Skeleton`] in document order.
///
/// Slots are numbered in the order they are added, which must match the
/// order of the values later supplied for them.
#[derive(Default)]
pub struct SkeletonBuilder {
    roots: Vec<StaticNode>,
    stack: Vec<OpenElement>,
    slots: Vec<SlotDescriptor>,
    error: Option<SkeletonError>,
}

impl SkeletonBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn fail(&mut self, error: SkeletonError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn next_child_path(&self) -> Vec<usize> {
        match self.stack.last() {
            Some(open) => {
                let mut path = open.path.clone();
                path.push(open.children.len());
                path
            }
            None => vec![self.roots.len()],
        }
    }

    fn push_node(&mut self, node: StaticNode) {
        match self.stack.last_mut() {
            Some(open) => open.children.push(node),
            None => self.roots.push(node),
        }
    }

    fn open_element(mut self, tag: &str, placeholder: bool) -> Self {
        let path = self.next_child_path();
        self.stack.push(OpenElement {
            tag: tag.to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
            placeholder,
            path,
        });
        self
    }

    pub fn open(self, tag: &str) -> Self {
        self.open_element(tag, false)
    }

    /// Opens an element the host lifecycle layer will upgrade.
    pub fn open_placeholder(self, tag: &str) -> Self {
        self.open_element(tag, true)
    }

    pub fn close(mut self) -> Self {
        match self.stack.pop() {
            Some(open) => self.push_node(StaticNode::Element {
                tag: open.tag,
                attributes: open.attributes,
                children: open.children,
                placeholder: open.placeholder,
            }),
            None => self.fail(SkeletonError::UnbalancedClose),
        }
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.push_node(StaticNode::Text(text.to_string()));
        self
    }

    pub fn comment(mut self, text: &str) -> Self {
        self.push_node(StaticNode::Comment(text.to_string()));
        self
    }

    /// Static attribute on the innermost open element.
    pub fn attribute(mut self, name: &str, value: &str) -> Self {
        match self.stack.last_mut() {
            Some(open) => open.attributes.push((name.to_string(), value.to_string())),
            None => self.fail(SkeletonError::NoOpenElement { what: "attribute" }),
        }
        self
    }

    pub fn content(mut self) -> Self {
        let path = self.next_child_path();
        let context = match self.stack.last() {
            Some(open) => format!("<{}>${{…}}", open.tag),
            None => "${…}".to_string(),
        };
        self.push_node(StaticNode::Comment(OPEN_MARKER.to_string()));
        self.push_node(StaticNode::Comment(CLOSE_MARKER.to_string()));
        self.slots.push(SlotDescriptor {
            kind: SlotKind::Content,
            path,
            name: None,
            fragments: Vec::new(),
            expressions: 1,
            capability: Capability::AttributeOnly,
            context,
        });
        self
    }

    /// `name="a${…}b${…}c"`: `fragments` are the static parts around the
    /// expressions, so there is one more fragment than expressions.
    pub fn attribute_value(mut self, name: &str, fragments: &[&str]) -> Self {
        let Some(open) = self.stack.last() else {
            self.fail(SkeletonError::NoOpenElement {
                what: "attribute value",
            });
            return self;
        };
        if fragments.len() < 2 {
            self.fail(SkeletonError::MissingExpression {
                name: name.to_string(),
            });
            return self;
        }
        let descriptor = SlotDescriptor {
            kind: SlotKind::AttributeValue,
            path: open.path.clone(),
            name: Some(name.to_string()),
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            expressions: fragments.len() - 1,
            capability: capability_for(&open.tag, name),
            context: format!("<{} {}=\"{}\">", open.tag, name, fragments.join("${…}")),
        };
        self.slots.push(descriptor);
        self
    }

    /// `<tag ${…}>`: the value expands into any number of attributes.
    pub fn whole_attribute(mut self) -> Self {
        let Some(open) = self.stack.last() else {
            self.fail(SkeletonError::NoOpenElement {
                what: "whole attribute",
            });
            return self;
        };
        let descriptor = SlotDescriptor {
            kind: SlotKind::WholeAttribute,
            path: open.path.clone(),
            name: None,
            fragments: Vec::new(),
            expressions: 1,
            capability: Capability::AttributeOnly,
            context: format!("<{} ${{…}}>", open.tag),
        };
        self.slots.push(descriptor);
        self
    }

    pub fn event(mut self, name: &str) -> Self {
        let Some(open) = self.stack.last() else {
            self.fail(SkeletonError::NoOpenElement { what: "event" });
            return self;
        };
        let descriptor = SlotDescriptor {
            kind: SlotKind::Event,
            path: open.path.clone(),
            name: Some(name.to_string()),
            fragments: Vec::new(),
            expressions: 1,
            capability: Capability::AttributeOnly,
            context: format!("<{} on{}=${{…}}>", open.tag, name),
        };
        self.slots.push(descriptor);
        self
    }

    /// An inert comment holding `expressions` values that are never applied.
    pub fn comment_slot(mut self, expressions: usize) -> Self {
        let path = self.next_child_path();
        self.push_node(StaticNode::Comment(String::new()));
        self.slots.push(SlotDescriptor {
            kind: SlotKind::Comment,
            path,
            name: None,
            fragments: Vec::new(),
            expressions,
            capability: Capability::AttributeOnly,
            context: "<!--${…}-->".to_string(),
        });
        self
    }

    /// Attribute written onto the element hosting the render root.
    pub fn host_attribute(mut self, name: &str, fragments: &[&str]) -> Self {
        if fragments.len() < 2 {
            self.fail(SkeletonError::MissingExpression {
                name: name.to_string(),
            });
            return self;
        }
        self.slots.push(SlotDescriptor {
            kind: SlotKind::HostAttributeValue,
            path: Vec::new(),
            name: Some(name.to_string()),
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            expressions: fragments.len() - 1,
            capability: capability_for("*", name),
            context: format!("<:host {}=\"{}\">", name, fragments.join("${…}")),
        });
        self
    }

    pub fn build(mut self) -> Result<Skeleton, SkeletonError> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        if let Some(open) = self.stack.pop() {
            return Err(SkeletonError::UnclosedElement { tag: open.tag });
        }
        if self.roots.is_empty() {
            self.roots.push(StaticNode::Text(String::new()));
        }
        let mut offsets = Vec::with_capacity(self.slots.len());
        let mut value_count = 0;
        for slot in &self.slots {
            offsets.push(value_count);
            value_count += slot.expressions;
        }
        Ok(Skeleton {
            id: SkeletonId::next(),
            roots: self.roots,
            slots: self.slots,
            offsets,
            value_count,
        })
    }
}

/// The external template compiler.
pub trait TemplateCompiler {
    fn compile(&self, strings: &[&str]) -> Result<Skeleton, SkeletonError>;
}

impl<F> TemplateCompiler for F
where
    F: Fn(&[&str]) -> Result<Skeleton, SkeletonError>,
{
    fn compile(&self, strings: &[&str]) -> Result<Skeleton, SkeletonError> {
        self(strings)
    }
}

/// Skeletons memoised by structural equality of their static strings.
#[derive(Default)]
pub struct SkeletonCache {
    buckets: HashMap<u64, Vec<(Vec<String>, Rc<Skeleton>)>>,
}

impl SkeletonCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, strings: &[&str]) -> Option<Rc<Skeleton>> {
        self.buckets
            .get(&hash_one(strings))?
            .iter()
            .find(|(stored, _)| stored.iter().map(String::as_str).eq(strings.iter().copied()))
            .map(|(_, skeleton)| Rc::clone(skeleton))
    }

    pub fn insert(&mut self, strings: &[&str], skeleton: Rc<Skeleton>) {
        let owned = strings.iter().map(|s| s.to_string()).collect();
        self.buckets
            .entry(hash_one(strings))
            .or_default()
            .push((owned, skeleton));
    }

    pub fn get_or_compile<C: TemplateCompiler + ?Sized>(
        &mut self,
        strings: &[&str],
        compiler: &C,
    ) -> Result<Rc<Skeleton>, SkeletonError> {
        if let Some(skeleton) = self.lookup(strings) {
            return Ok(skeleton);
        }
        let skeleton = Rc::new(compiler.compile(strings)?);
        log::debug!("compiled skeleton {} ({} slots)", skeleton.id(), skeleton.slots().len());
        self.insert(strings, Rc::clone(&skeleton));
        Ok(skeleton)
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

thread_local! {
    static SKELETONS: RefCell<SkeletonCache> = RefCell::new(SkeletonCache::new());
}

/// Process-lifetime memoised skeleton for `strings`.
///
/// The compiler runs outside the cache borrow, so it may itself request
/// other skeletons.
pub fn get_skeleton<C: TemplateCompiler + ?Sized>(
    strings: &[&str],
    compiler: &C,
) -> Result<Rc<Skeleton>, SkeletonError> {
    if let Some(skeleton) = SKELETONS.with(|cache| cache.borrow().lookup(strings)) {
        return Ok(skeleton);
    }
    let skeleton = Rc::new(compiler.compile(strings)?);
    SKELETONS.with(|cache| cache.borrow_mut().insert(strings, Rc::clone(&skeleton)));
    Ok(skeleton)
}
