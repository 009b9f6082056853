//! Arena-backed output tree.
//!
//! Nodes live in a `Vec<Option<NodeData>>` and are addressed by [`NodeId`].
//! Ids are never reused within one tree, so a stale id reports
//! [`NodeError::Missing`] instead of aliasing a newer node. Siblings are
//! doubly linked so that render unit boundaries can be walked and contiguous
//! ranges spliced without scanning the parent's child list.

use std::fmt::Write as _;

use indexmap::IndexMap;

use crate::error::NodeError;

pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element { tag: String },
    Text(String),
    Comment(String),
    Fragment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropValue {
    Text(String),
    Flag(bool),
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
    prev: Option<NodeId>,
    next: Option<NodeId>,
    attributes: IndexMap<String, String>,
    properties: IndexMap<String, PropValue>,
    listeners: Vec<String>,
    placeholder: bool,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            first_child: None,
            last_child: None,
            prev: None,
            next: None,
            attributes: IndexMap::new(),
            properties: IndexMap::new(),
            listeners: Vec::new(),
            placeholder: false,
        }
    }

    fn is_container(&self) -> bool {
        matches!(self.kind, NodeKind::Element { .. } | NodeKind::Fragment)
    }
}

/// One recorded tree operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Create { node: NodeId },
    Insert { node: NodeId, parent: NodeId },
    Move { node: NodeId },
    Remove { node: NodeId },
    Clear { parent: NodeId, count: usize },
    Stash { node: NodeId },
    Replace { old: NodeId, new: NodeId },
    SetText { node: NodeId },
    SetAttribute { node: NodeId, name: String },
    RemoveAttribute { node: NodeId, name: String },
    SetProperty { node: NodeId, name: String },
    Listen { node: NodeId, event: String },
    Unlisten { node: NodeId, event: String },
    Dispose { node: NodeId },
}

/// Running totals of tree operations.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MutationStats {
    pub created: usize,
    pub inserted: usize,
    pub moved: usize,
    pub removed: usize,
    pub cleared: usize,
    pub stashed: usize,
    pub replaced: usize,
    pub text_updates: usize,
    pub attribute_updates: usize,
    pub property_updates: usize,
    pub listener_updates: usize,
    pub disposed: usize,
}

impl MutationStats {
    /// Counters accumulated after `earlier` was taken.
    pub fn since(&self, earlier: &MutationStats) -> MutationStats {
        MutationStats {
            created: self.created.saturating_sub(earlier.created),
            inserted: self.inserted.saturating_sub(earlier.inserted),
            moved: self.moved.saturating_sub(earlier.moved),
            removed: self.removed.saturating_sub(earlier.removed),
            cleared: self.cleared.saturating_sub(earlier.cleared),
            stashed: self.stashed.saturating_sub(earlier.stashed),
            replaced: self.replaced.saturating_sub(earlier.replaced),
            text_updates: self.text_updates.saturating_sub(earlier.text_updates),
            attribute_updates: self
                .attribute_updates
                .saturating_sub(earlier.attribute_updates),
            property_updates: self
                .property_updates
                .saturating_sub(earlier.property_updates),
            listener_updates: self
                .listener_updates
                .saturating_sub(earlier.listener_updates),
            disposed: self.disposed.saturating_sub(earlier.disposed),
        }
    }

    /// Every counted operation, creations and holding traffic included.
    pub fn total(&self) -> usize {
        self.created
            + self.inserted
            + self.moved
            + self.removed
            + self.cleared
            + self.stashed
            + self.replaced
            + self.text_updates
            + self.attribute_updates
            + self.property_updates
            + self.listener_updates
            + self.disposed
    }
}

pub struct Tree {
    nodes: Vec<Option<NodeData>>,
    holding: NodeId,
    stats: MutationStats,
    journal: Option<Vec<Mutation>>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        let mut nodes = Vec::new();
        nodes.push(Some(NodeData::new(NodeKind::Fragment)));
        Self {
            nodes,
            holding: 0,
            stats: MutationStats::default(),
            journal: None,
        }
    }

    /// The never-displayed fragment that keeps detached render units.
    pub fn holding(&self) -> NodeId {
        self.holding
    }

    pub fn stats(&self) -> MutationStats {
        self.stats
    }

    /// Starts or stops recording the ordered mutation journal.
    pub fn set_recording(&mut self, enabled: bool) {
        match (enabled, self.journal.is_some()) {
            (true, false) => self.journal = Some(Vec::new()),
            (false, true) => self.journal = None,
            _ => {}
        }
    }

    /// Drains the recorded journal; empty when recording is off.
    pub fn take_journal(&mut self) -> Vec<Mutation> {
        self.journal.as_mut().map(std::mem::take).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(id), Some(Some(_)))
    }

    fn record(&mut self, mutation: Mutation) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(mutation);
        }
    }

    fn node(&self, id: NodeId) -> Result<&NodeData, NodeError> {
        self.nodes
            .get(id)
            .and_then(Option::as_ref)
            .ok_or(NodeError::Missing { id })
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeData, NodeError> {
        self.nodes
            .get_mut(id)
            .and_then(Option::as_mut)
            .ok_or(NodeError::Missing { id })
    }

    fn create(&mut self, data: NodeData) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Some(data));
        self.stats.created += 1;
        self.record(Mutation::Create { node: id });
        id
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.create(NodeData::new(NodeKind::Element {
            tag: tag.to_string(),
        }))
    }

    /// Creates an element the host is expected to upgrade.
    pub fn create_placeholder(&mut self, tag: &str) -> NodeId {
        let mut data = NodeData::new(NodeKind::Element {
            tag: tag.to_string(),
        });
        data.placeholder = true;
        self.create(data)
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.create(NodeData::new(NodeKind::Text(text.to_string())))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.create(NodeData::new(NodeKind::Comment(text.to_string())))
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.node(id).ok().map(|n| &n.kind)
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match self.kind(id)? {
            NodeKind::Element { tag } => Some(tag.as_str()),
            _ => None,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.kind(id)? {
            NodeKind::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn is_placeholder(&self, id: NodeId) -> bool {
        self.node(id).map(|n| n.placeholder).unwrap_or(false)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok().and_then(|n| n.parent)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok().and_then(|n| n.next)
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok().and_then(|n| n.prev)
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok().and_then(|n| n.first_child)
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.first_child(id);
        while let Some(child) = current {
            out.push(child);
            current = self.next_sibling(child);
        }
        out
    }

    /// Siblings strictly between `after` and `before`.
    pub fn nodes_between(&self, after: NodeId, before: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.next_sibling(after);
        while let Some(node) = current {
            if node == before {
                break;
            }
            out.push(node);
            current = self.next_sibling(node);
        }
        out
    }

    /// The nth child of `id`, used to resolve skeleton paths.
    pub fn child_at(&self, id: NodeId, index: usize) -> Option<NodeId> {
        let mut current = self.first_child(id);
        for _ in 0..index {
            current = self.next_sibling(current?);
        }
        current
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id)
            .ok()
            .and_then(|n| n.attributes.get(name))
            .map(String::as_str)
    }

    pub fn attributes(&self, id: NodeId) -> Vec<(String, String)> {
        self.node(id)
            .map(|n| {
                n.attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn property(&self, id: NodeId, name: &str) -> Option<&PropValue> {
        self.node(id).ok().and_then(|n| n.properties.get(name))
    }

    pub fn listeners(&self, id: NodeId) -> &[String] {
        self.node(id).map(|n| n.listeners.as_slice()).unwrap_or(&[])
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            Some(NodeKind::Text(text)) => out.push_str(text),
            Some(NodeKind::Element { .. }) | Some(NodeKind::Fragment) => {
                for child in self.children(id) {
                    self.collect_text(child, out);
                }
            }
            _ => {}
        }
    }

    fn detach(&mut self, id: NodeId) -> Result<Option<NodeId>, NodeError> {
        let (parent, prev, next) = {
            let node = self.node(id)?;
            (node.parent, node.prev, node.next)
        };
        let Some(parent) = parent else {
            return Ok(None);
        };
        match prev {
            Some(prev) => self.node_mut(prev)?.next = next,
            None => self.node_mut(parent)?.first_child = next,
        }
        match next {
            Some(next) => self.node_mut(next)?.prev = prev,
            None => self.node_mut(parent)?.last_child = prev,
        }
        let node = self.node_mut(id)?;
        node.parent = None;
        node.prev = None;
        node.next = None;
        Ok(Some(parent))
    }

    fn link_before(
        &mut self,
        parent: NodeId,
        id: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), NodeError> {
        let prev = match reference {
            Some(reference) => {
                let node = self.node(reference)?;
                if node.parent != Some(parent) {
                    return Err(NodeError::NotAChild {
                        parent,
                        child: reference,
                    });
                }
                node.prev
            }
            None => self.node(parent)?.last_child,
        };
        {
            let node = self.node_mut(id)?;
            node.parent = Some(parent);
            node.prev = prev;
            node.next = reference;
        }
        match prev {
            Some(prev) => self.node_mut(prev)?.next = Some(id),
            None => self.node_mut(parent)?.first_child = Some(id),
        }
        match reference {
            Some(reference) => self.node_mut(reference)?.prev = Some(id),
            None => self.node_mut(parent)?.last_child = Some(id),
        }
        Ok(())
    }

    fn check_container(&self, parent: NodeId) -> Result<(), NodeError> {
        if self.node(parent)?.is_container() {
            Ok(())
        } else {
            Err(NodeError::NotAContainer { id: parent })
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), NodeError> {
        self.insert_before(parent, child, None)
    }

    /// Places `child` before `reference` (or last), detaching it first.
    ///
    /// Repositioning within the same parent counts as a move; arriving from
    /// anywhere else counts as an insert.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), NodeError> {
        self.check_container(parent)?;
        if reference == Some(child) {
            return Ok(());
        }
        let previous_parent = self.detach(child)?;
        self.link_before(parent, child, reference)?;
        if previous_parent == Some(parent) {
            self.stats.moved += 1;
            self.record(Mutation::Move { node: child });
        } else {
            self.stats.inserted += 1;
            self.record(Mutation::Insert {
                node: child,
                parent,
            });
        }
        Ok(())
    }

    /// Detaches `id` from its parent. The node stays alive.
    pub fn remove(&mut self, id: NodeId) -> Result<(), NodeError> {
        if self.detach(id)?.is_some() {
            self.stats.removed += 1;
            self.record(Mutation::Remove { node: id });
        }
        Ok(())
    }

    /// Splices out every sibling between `after` and `before` in one step.
    pub fn clear_between(
        &mut self,
        after: NodeId,
        before: NodeId,
    ) -> Result<Vec<NodeId>, NodeError> {
        let parent = self
            .parent(after)
            .ok_or(NodeError::Missing { id: after })?;
        if self.parent(before) != Some(parent) {
            return Err(NodeError::NotAChild {
                parent,
                child: before,
            });
        }
        let removed = self.nodes_between(after, before);
        if removed.is_empty() {
            return Ok(removed);
        }
        for &id in &removed {
            let node = self.node_mut(id)?;
            node.parent = None;
            node.prev = None;
            node.next = None;
        }
        self.node_mut(after)?.next = Some(before);
        self.node_mut(before)?.prev = Some(after);
        self.stats.cleared += 1;
        self.record(Mutation::Clear {
            parent,
            count: removed.len(),
        });
        Ok(removed)
    }

    /// Appends `id` to the holding fragment.
    pub fn stash(&mut self, id: NodeId) -> Result<(), NodeError> {
        let holding = self.holding;
        self.detach(id)?;
        self.link_before(holding, id, None)?;
        self.stats.stashed += 1;
        self.record(Mutation::Stash { node: id });
        Ok(())
    }

    /// Puts `new` where `old` is; `old` ends up detached.
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> Result<(), NodeError> {
        self.node(new)?;
        if let Some(parent) = self.parent(old) {
            let next = self.next_sibling(old);
            self.detach(new)?;
            self.detach(old)?;
            self.link_before(parent, new, next)?;
        }
        self.stats.replaced += 1;
        self.record(Mutation::Replace { old, new });
        Ok(())
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) -> Result<(), NodeError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Text(current) | NodeKind::Comment(current) => {
                if current == text {
                    return Ok(());
                }
                current.clear();
                current.push_str(text);
            }
            _ => return Err(NodeError::NotText { id }),
        }
        self.stats.text_updates += 1;
        self.record(Mutation::SetText { node: id });
        Ok(())
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), NodeError> {
        let node = self.node_mut(id)?;
        if node.attributes.get(name).map(String::as_str) == Some(value) {
            return Ok(());
        }
        node.attributes.insert(name.to_string(), value.to_string());
        self.stats.attribute_updates += 1;
        self.record(Mutation::SetAttribute {
            node: id,
            name: name.to_string(),
        });
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<(), NodeError> {
        if self.node_mut(id)?.attributes.shift_remove(name).is_some() {
            self.stats.attribute_updates += 1;
            self.record(Mutation::RemoveAttribute {
                node: id,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn set_property(&mut self, id: NodeId, name: &str, value: PropValue) -> Result<(), NodeError> {
        let node = self.node_mut(id)?;
        if node.properties.get(name) == Some(&value) {
            return Ok(());
        }
        node.properties.insert(name.to_string(), value);
        self.stats.property_updates += 1;
        self.record(Mutation::SetProperty {
            node: id,
            name: name.to_string(),
        });
        Ok(())
    }

    pub fn listen(&mut self, id: NodeId, event: &str) -> Result<(), NodeError> {
        self.node_mut(id)?.listeners.push(event.to_string());
        self.stats.listener_updates += 1;
        self.record(Mutation::Listen {
            node: id,
            event: event.to_string(),
        });
        Ok(())
    }

    pub fn unlisten(&mut self, id: NodeId, event: &str) -> Result<(), NodeError> {
        let listeners = &mut self.node_mut(id)?.listeners;
        if let Some(index) = listeners.iter().position(|e| e == event) {
            listeners.remove(index);
            self.stats.listener_updates += 1;
            self.record(Mutation::Unlisten {
                node: id,
                event: event.to_string(),
            });
        }
        Ok(())
    }

    /// Frees `id` and its whole subtree.
    pub fn dispose(&mut self, id: NodeId) -> Result<(), NodeError> {
        if id == self.holding {
            return Ok(());
        }
        self.detach(id)?;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            stack.extend(self.children(current));
            let taken = self.nodes.get_mut(current).and_then(Option::take);
            if taken.is_some() {
                self.stats.disposed += 1;
                self.record(Mutation::Dispose { node: current });
            }
        }
        Ok(())
    }

    pub fn dump_tree(&self, root: Option<NodeId>) -> String {
        let mut output = String::new();
        if let Some(root_id) = root {
            self.dump_node(&mut output, root_id, 0);
        } else {
            output.push_str("(no root)\n");
        }
        output
    }

    fn dump_node(&self, output: &mut String, id: NodeId, depth: usize) {
        let indent = "  ".repeat(depth);
        let Ok(node) = self.node(id) else {
            let _ = writeln!(output, "{indent}[{id}] (missing)");
            return;
        };
        match &node.kind {
            NodeKind::Element { tag } => {
                let _ = write!(output, "{indent}[{id}] <{tag}");
                for (name, value) in &node.attributes {
                    let _ = write!(output, " {name}=\"{value}\"");
                }
                let _ = writeln!(output, ">");
            }
            NodeKind::Text(text) => {
                let _ = writeln!(output, "{indent}[{id}] {text:?}");
            }
            NodeKind::Comment(text) => {
                let _ = writeln!(output, "{indent}[{id}] <!--{text}-->");
            }
            NodeKind::Fragment => {
                let _ = writeln!(output, "{indent}[{id}] #fragment");
            }
        }
        for child in self.children(id) {
            self.dump_node(output, child, depth + 1);
        }
    }
}
