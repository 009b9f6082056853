//! The reconciliation engine.
//!
//! [`Renderer`] owns the output [`Tree`], every [`RenderUnit`] and the
//! listener registry. A render pass applies values to a unit's slots in
//! reverse slot order. Content slots claim units from their own pools in
//! two passes (exact key first, then close key with value reapplication),
//! create whatever is still missing, and hand the old and new node
//! sequences to [`reconcile`]. Units dropped from a sequence move to the
//! holding fragment and stay claimable from the slot's detached pool until
//! retention evicts them.

use std::rc::Rc;

use crate::collections::map::{HashMap, HashSet};
use crate::config::RenderConfig;
use crate::error::{report_pool_violation, NodeError, RenderError};
use crate::key::{KeyHasher, UnitKey, UnitKeys};
use crate::platform::{Host, NoopHost};
use crate::reconcile::{reconcile, Region};
use crate::skeleton::{resolve_path, Capability, Skeleton, SlotDescriptor, SlotKind, CLOSE_MARKER, OPEN_MARKER};
use crate::slot::{attribute_text, parse_attribute_pairs, scalar_text, AttributeSlot, Child, ContentSlot, Slot};
use crate::tree::{NodeId, PropValue, Tree};
use crate::unit::{RenderUnit, SlotRef, UnitArena, UnitId, UnitOrigin};
use crate::value::{next_identity, EvalScope, Event, Template, Value};

/// One flattened entry of a content value.
enum Item {
    Text(String),
    Template(Template),
    Node(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolKind {
    Placed,
    Detached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Match {
    Exact,
    Close,
}

/// Units a content pass took out of its pools, for rollback.
#[derive(Default)]
struct PassClaims {
    revived: Vec<UnitId>,
    created: Vec<UnitId>,
}

impl PassClaims {
    fn note(&mut self, unit: UnitId, from: PoolKind) {
        if from == PoolKind::Detached {
            self.revived.push(unit);
        }
    }
}

fn stale_key() -> UnitKey {
    UnitKey::new(format!("#stale{};", next_identity()))
}

pub struct Renderer {
    tree: Tree,
    units: UnitArena,
    listeners: HashMap<(NodeId, String), SlotRef>,
    host: Box<dyn Host>,
    hasher: KeyHasher,
    config: RenderConfig,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(RenderConfig::default())
    }
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        Self::with_host(config, NoopHost)
    }

    pub fn with_host(config: RenderConfig, host: impl Host + 'static) -> Self {
        let mut tree = Tree::new();
        tree.set_recording(config.record_mutations);
        Self {
            tree,
            units: UnitArena::default(),
            listeners: HashMap::new(),
            host: Box::new(host),
            hasher: KeyHasher::new(config.max_key_depth),
            config,
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Live render units, roots included.
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Current sequence of a content slot.
    pub fn slot_children(&self, slot: SlotRef) -> Option<&[Child]> {
        match self.units.get(slot.unit)?.slots.get(slot.slot)? {
            Slot::Content(content) => Some(&content.children),
            _ => None,
        }
    }

    /// Units retained in a content slot's detached pool, oldest first.
    pub fn detached_units(&self, slot: SlotRef) -> Vec<UnitId> {
        match self.units.get(slot.unit).and_then(|u| u.slots.get(slot.slot)) {
            Some(Slot::Content(content)) => content.detached_order.iter().copied().collect(),
            _ => Vec::new(),
        }
    }

    fn unit(&self, id: UnitId) -> Result<&RenderUnit, RenderError> {
        self.units.get(id).ok_or(RenderError::MissingUnit(id))
    }

    fn violation(&self, message: &str) {
        report_pool_violation(self.config.strict_pools, message);
    }

    /// Creates a root unit rendering into `container`.
    pub fn mount(&mut self, container: NodeId) -> Result<UnitId, RenderError> {
        let open = self.tree.create_comment(OPEN_MARKER);
        let close = self.tree.create_comment(CLOSE_MARKER);
        self.tree.append_child(container, open)?;
        self.tree.append_child(container, close)?;
        let id = self.units.next_id();
        let unit = RenderUnit {
            origin: UnitOrigin::Root { container },
            first: open,
            last: close,
            slots: vec![Slot::Content(ContentSlot::new(open, close))],
            keys: UnitKeys {
                exact: UnitKey::new(format!("#root:{}", id.index())),
                close: UnitKey::new("#root"),
            },
            parent: None,
        };
        let id = self.units.insert(unit);
        log::debug!("mounted root {id} into node {container}");
        Ok(id)
    }

    /// Applies `values` to the slots of `unit`.
    ///
    /// A unit sitting in a parent slot is taken out of that slot's pools
    /// while its values change and re-indexed under its new exact key
    /// afterwards. Arity and binding errors abort the pass.
    pub fn apply_values(&mut self, unit: UnitId, values: &[Value]) -> Result<(), RenderError> {
        let parent = self.unit(unit)?.parent;
        let Some(parent) = parent else {
            return self.apply_slots(unit, values);
        };
        let indexed = self.unindex(parent, unit);
        let result = self.apply_slots(unit, values);
        let fresh = if result.is_ok() {
            self.keys_after_apply(unit, values)
        } else {
            None
        };
        let mut changed = true;
        if let Some(u) = self.units.get_mut(unit) {
            match fresh {
                Some(keys) => {
                    changed = keys.exact != u.keys.exact;
                    u.keys = keys;
                }
                None => u.keys.exact = stale_key(),
            }
        }
        self.reindex(parent, unit, indexed.unwrap_or(PoolKind::Placed));
        if changed {
            self.invalidate_ancestors(parent.unit);
        }
        result
    }

    /// `apply_values(root, [value])` followed by [`release`](Self::release).
    pub fn render(&mut self, root: UnitId, value: impl Into<Value>) -> Result<(), RenderError> {
        let value = value.into();
        self.apply_values(root, std::slice::from_ref(&value))?;
        self.release(root)
    }

    /// The unit's contiguous output nodes, `first..=last`.
    pub fn output_nodes(&self, unit: UnitId) -> Result<Vec<NodeId>, RenderError> {
        let u = self.unit(unit)?;
        Ok(self.node_range(u.first, u.last))
    }

    /// Returns every live descendant of `unit` to its slot's placed pool so
    /// the next pass can claim it.
    pub fn release(&mut self, unit: UnitId) -> Result<(), RenderError> {
        self.unit(unit)?;
        let mut stack = vec![unit];
        let mut released = 0usize;
        while let Some(current) = stack.pop() {
            let Some(u) = self.units.get(current) else {
                self.violation(&format!("released unit {current} no longer exists"));
                continue;
            };
            let live: Vec<(usize, UnitId)> = u
                .slots
                .iter()
                .enumerate()
                .filter_map(|(index, slot)| match slot {
                    Slot::Content(content) => Some((index, content)),
                    _ => None,
                })
                .flat_map(|(index, content)| {
                    content.children.iter().filter_map(move |child| match child {
                        Child::Unit(id) => Some((index, *id)),
                        Child::Node(_) => None,
                    })
                })
                .collect();
            for (index, child) in live {
                let Some(keys) = self.units.get(child).map(|c| c.keys.clone()) else {
                    self.violation(&format!("live child {child} of {current} was disposed"));
                    continue;
                };
                let slot = SlotRef::new(current, index);
                let Some(content) = self.content_mut(slot) else {
                    continue;
                };
                let was_detached = content.detached.remove(&keys, child);
                if was_detached {
                    content.forget_detached(child);
                }
                content.placed.insert(&keys, child);
                if was_detached {
                    self.violation(&format!("unit {child} is live in {slot} but was retained as detached"));
                }
                released += 1;
                stack.push(child);
            }
        }
        log::trace!("released {released} units under {unit}");
        Ok(())
    }

    /// Delivers `name` to the nearest bound event slot at or above `target`.
    ///
    /// Returns `false` when no handler was found.
    pub fn dispatch_event(&self, target: NodeId, name: &str, detail: Value) -> bool {
        let mut current = Some(target);
        while let Some(node) = current {
            if let Some(slot) = self.listeners.get(&(node, name.to_string())) {
                let callback = match self.units.get(slot.unit).and_then(|u| u.slots.get(slot.slot)) {
                    Some(Slot::Event {
                        callback: Some(callback),
                        ..
                    }) => Some(callback.clone()),
                    _ => None,
                };
                if let Some(callback) = callback {
                    let event = Event {
                        name: name.to_string(),
                        target,
                        current_target: node,
                        detail,
                    };
                    log::trace!("dispatching {name} from node {target} to {slot}");
                    callback.invoke(&event);
                    return true;
                }
            }
            current = self.tree.parent(node);
        }
        false
    }

    fn content_mut(&mut self, slot: SlotRef) -> Option<&mut ContentSlot> {
        match self.units.get_mut(slot.unit)?.slots.get_mut(slot.slot)? {
            Slot::Content(content) => Some(content),
            _ => None,
        }
    }

    /// Removes `unit` from both pools of `slot`, reporting where it was.
    fn unindex(&mut self, slot: SlotRef, unit: UnitId) -> Option<PoolKind> {
        let keys = self.units.get(unit)?.keys.clone();
        let content = self.content_mut(slot)?;
        if content.placed.remove(&keys, unit) {
            return Some(PoolKind::Placed);
        }
        if content.detached.remove(&keys, unit) {
            content.forget_detached(unit);
            return Some(PoolKind::Detached);
        }
        None
    }

    fn reindex(&mut self, slot: SlotRef, unit: UnitId, kind: PoolKind) {
        let Some(keys) = self.units.get(unit).map(|u| u.keys.clone()) else {
            return;
        };
        let Some(content) = self.content_mut(slot) else {
            return;
        };
        match kind {
            PoolKind::Placed => content.placed.insert(&keys, unit),
            PoolKind::Detached => {
                content.detached.insert(&keys, unit);
                content.detached_order.push_back(unit);
            }
        }
    }

    fn keys_after_apply(&self, unit: UnitId, values: &[Value]) -> Option<UnitKeys> {
        let u = self.units.get(unit)?;
        match &u.origin {
            UnitOrigin::Template(skeleton) => Some(self.hasher.template_keys(skeleton, values)),
            UnitOrigin::Text => self.tree.text(u.first).map(KeyHasher::text_keys),
            UnitOrigin::Root { .. } => None,
        }
    }

    /// Ancestors of a unit whose content changed out of band no longer
    /// match their exact keys; they stay claimable by close key.
    fn invalidate_ancestors(&mut self, start: UnitId) {
        let mut current = start;
        while let Some(parent) = self.units.get(current).and_then(|u| u.parent) {
            let kind = self.unindex(parent, current).unwrap_or(PoolKind::Placed);
            if let Some(u) = self.units.get_mut(current) {
                u.keys.exact = stale_key();
            }
            self.reindex(parent, current, kind);
            current = parent.unit;
        }
    }

    fn apply_slots(&mut self, unit: UnitId, values: &[Value]) -> Result<(), RenderError> {
        let origin = self.unit(unit)?.origin.clone();
        match origin {
            UnitOrigin::Root { .. } => {
                let [value] = values else {
                    return Err(RenderError::UnitArity {
                        unit,
                        expected: 1,
                        actual: values.len(),
                    });
                };
                self.apply_content(SlotRef::new(unit, 0), value)
            }
            UnitOrigin::Text => {
                let [value] = values else {
                    return Err(RenderError::UnitArity {
                        unit,
                        expected: 1,
                        actual: values.len(),
                    });
                };
                let value = self.force(value, EvalScope::new(unit, 0))?;
                let text = scalar_text(&value).ok_or_else(|| RenderError::BindingType {
                    slot: 0,
                    context: "text unit".to_string(),
                    expected: "scalar",
                    found: value.kind_name(),
                })?;
                let first = self.unit(unit)?.first;
                self.tree.set_text(first, &text)?;
                Ok(())
            }
            UnitOrigin::Template(skeleton) => {
                if values.len() != skeleton.value_count() {
                    return Err(RenderError::Arity {
                        skeleton: skeleton.id(),
                        expected: skeleton.value_count(),
                        actual: values.len(),
                    });
                }
                // Later slots first: a selection control needs its options
                // before its selected value.
                for index in (0..skeleton.slots().len()).rev() {
                    let descriptor = &skeleton.slots()[index];
                    let start = skeleton.offsets()[index];
                    let slot_values = &values[start..start + descriptor.expressions()];
                    self.apply_slot(SlotRef::new(unit, index), descriptor, slot_values)?;
                }
                Ok(())
            }
        }
    }

    fn apply_slot(
        &mut self,
        slot: SlotRef,
        descriptor: &SlotDescriptor,
        values: &[Value],
    ) -> Result<(), RenderError> {
        let scope = EvalScope::new(slot.unit, slot.slot);
        match descriptor.kind() {
            SlotKind::Comment => Ok(()),
            SlotKind::Content => match values {
                [value] => self.apply_content(slot, value),
                _ => Ok(()),
            },
            SlotKind::AttributeValue | SlotKind::HostAttributeValue => {
                self.apply_attribute(slot, descriptor, values, scope)
            }
            SlotKind::WholeAttribute => match values {
                [value] => self.apply_whole_attribute(slot, descriptor, value, scope),
                _ => Ok(()),
            },
            SlotKind::Event => match values {
                [value] => self.apply_event(slot, descriptor, value, scope),
                _ => Ok(()),
            },
        }
    }

    /// Evaluates thunks, including those nested in lists.
    fn force(&self, value: &Value, scope: EvalScope) -> Result<Value, RenderError> {
        match value {
            Value::Thunk(thunk) => {
                if scope.depth >= self.config.max_thunk_depth {
                    return Err(RenderError::ThunkDepth {
                        limit: self.config.max_thunk_depth,
                    });
                }
                let produced = thunk.eval(&scope);
                self.force(&produced, scope.nested())
            }
            Value::List(items)
                if items
                    .iter()
                    .any(|item| matches!(item, Value::Thunk(_) | Value::List(_))) =>
            {
                let forced = items
                    .iter()
                    .map(|item| self.force(item, scope))
                    .collect::<Result<Rc<[Value]>, _>>()?;
                Ok(Value::List(forced))
            }
            other => Ok(other.clone()),
        }
    }

    fn binding_error(
        descriptor: &SlotDescriptor,
        slot: SlotRef,
        expected: &'static str,
        found: &'static str,
    ) -> RenderError {
        RenderError::BindingType {
            slot: slot.slot,
            context: descriptor.context().to_string(),
            expected,
            found,
        }
    }

    fn apply_attribute(
        &mut self,
        slot: SlotRef,
        descriptor: &SlotDescriptor,
        values: &[Value],
        scope: EvalScope,
    ) -> Result<(), RenderError> {
        let values = values
            .iter()
            .map(|value| self.force(value, scope))
            .collect::<Result<Vec<_>, _>>()?;
        let fragments = descriptor.fragments();
        let toggles = matches!(values.as_slice(), [Value::Bool(_) | Value::Null])
            && fragments.iter().all(String::is_empty);
        let desired = if toggles {
            matches!(values[0], Value::Bool(true)).then(String::new)
        } else {
            let mut joined = fragments.first().cloned().unwrap_or_default();
            for (index, value) in values.iter().enumerate() {
                attribute_text(value, &mut joined)
                    .map_err(|found| Self::binding_error(descriptor, slot, "attribute text", found))?;
                if let Some(fragment) = fragments.get(index + 1) {
                    joined.push_str(fragment);
                }
            }
            Some(joined)
        };

        let Self { units, tree, .. } = self;
        let state = match units.get_mut(slot.unit).and_then(|u| u.slots.get_mut(slot.slot)) {
            Some(Slot::AttributeValue(state)) | Some(Slot::HostAttributeValue(state)) => state,
            _ => return Err(RenderError::MissingUnit(slot.unit)),
        };
        if state.applied == desired {
            return Ok(());
        }
        log::trace!("{slot}: {}={desired:?}", state.name);
        match &desired {
            Some(value) => tree.set_attribute(state.target, &state.name, value)?,
            None => tree.remove_attribute(state.target, &state.name)?,
        }
        match state.capability {
            Capability::TextProperty(property) => tree.set_property(
                state.target,
                property,
                PropValue::Text(desired.clone().unwrap_or_default()),
            )?,
            Capability::FlagProperty(property) => {
                tree.set_property(state.target, property, PropValue::Flag(desired.is_some()))?
            }
            Capability::AttributeOnly => {}
        }
        state.applied = desired;
        Ok(())
    }

    fn apply_whole_attribute(
        &mut self,
        slot: SlotRef,
        descriptor: &SlotDescriptor,
        value: &Value,
        scope: EvalScope,
    ) -> Result<(), RenderError> {
        let value = self.force(value, scope)?;
        let mut text = String::new();
        attribute_text(&value, &mut text)
            .map_err(|found| Self::binding_error(descriptor, slot, "attribute list", found))?;
        let pairs = parse_attribute_pairs(&text);

        let Self { units, tree, .. } = self;
        let Some(Slot::WholeAttribute { target, applied }) =
            units.get_mut(slot.unit).and_then(|u| u.slots.get_mut(slot.slot))
        else {
            return Err(RenderError::MissingUnit(slot.unit));
        };
        for (name, value) in &pairs {
            tree.set_attribute(*target, name, value)?;
        }
        for name in applied.iter() {
            if !pairs.iter().any(|(current, _)| current == name) {
                tree.remove_attribute(*target, name)?;
            }
        }
        *applied = pairs.into_iter().map(|(name, _)| name).collect();
        Ok(())
    }

    fn apply_event(
        &mut self,
        slot: SlotRef,
        descriptor: &SlotDescriptor,
        value: &Value,
        scope: EvalScope,
    ) -> Result<(), RenderError> {
        let next = match self.force(value, scope)? {
            Value::Callback(callback) => Some(callback),
            Value::Null => None,
            other => {
                return Err(Self::binding_error(
                    descriptor,
                    slot,
                    "callback",
                    other.kind_name(),
                ))
            }
        };

        let Self {
            units,
            tree,
            listeners,
            ..
        } = self;
        let Some(Slot::Event {
            target,
            name,
            callback,
        }) = units.get_mut(slot.unit).and_then(|u| u.slots.get_mut(slot.slot))
        else {
            return Err(RenderError::MissingUnit(slot.unit));
        };
        let same = matches!(
            (callback.as_ref(), next.as_ref()),
            (Some(current), Some(next)) if current.id() == next.id()
        );
        if !same {
            if callback.is_some() {
                tree.unlisten(*target, name)?;
                listeners.remove(&(*target, name.clone()));
            }
            if next.is_some() {
                tree.listen(*target, name)?;
                listeners.insert((*target, name.clone()), slot);
            }
        }
        *callback = next;
        Ok(())
    }

    fn slot_context(&self, slot: SlotRef) -> String {
        self.units
            .get(slot.unit)
            .and_then(|u| u.skeleton())
            .and_then(|skeleton| skeleton.slots().get(slot.slot))
            .map(|descriptor| descriptor.context().to_string())
            .unwrap_or_else(|| "root content".to_string())
    }

    fn flatten(
        &self,
        value: &Value,
        scope: EvalScope,
        slot: SlotRef,
        out: &mut Vec<Item>,
    ) -> Result<(), RenderError> {
        match value {
            Value::Null => Ok(()),
            Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Text(_) => {
                out.push(Item::Text(scalar_text(value).unwrap_or_default()));
                Ok(())
            }
            Value::List(items) => items
                .iter()
                .try_for_each(|item| self.flatten(item, scope, slot, out)),
            Value::Thunk(thunk) => {
                if scope.depth >= self.config.max_thunk_depth {
                    return Err(RenderError::ThunkDepth {
                        limit: self.config.max_thunk_depth,
                    });
                }
                let produced = thunk.eval(&scope);
                self.flatten(&produced, scope.nested(), slot, out)
            }
            Value::Template(template) => {
                let skeleton = template.skeleton();
                if template.values().len() != skeleton.value_count() {
                    return Err(RenderError::Arity {
                        skeleton: skeleton.id(),
                        expected: skeleton.value_count(),
                        actual: template.values().len(),
                    });
                }
                out.push(Item::Template(template.clone()));
                Ok(())
            }
            Value::Node(node) => {
                out.push(Item::Node(*node));
                Ok(())
            }
            Value::Callback(_) => Err(RenderError::BindingType {
                slot: slot.slot,
                context: self.slot_context(slot),
                expected: "content",
                found: "callback",
            }),
        }
    }

    fn apply_content(&mut self, slot: SlotRef, value: &Value) -> Result<(), RenderError> {
        let mut items = Vec::new();
        self.flatten(value, EvalScope::new(slot.unit, slot.slot), slot, &mut items)?;

        let taken = self
            .units
            .get_mut(slot.unit)
            .and_then(|u| u.slots.get_mut(slot.slot))
            .map(|state| std::mem::replace(state, Slot::Comment));
        let mut content = match taken {
            Some(Slot::Content(content)) => content,
            Some(other) => {
                self.put_slot(slot, other);
                return Err(RenderError::MissingUnit(slot.unit));
            }
            None => return Err(RenderError::MissingUnit(slot.unit)),
        };
        let result = self.update_content(slot, &mut content, items);
        self.put_slot(slot, Slot::Content(content));
        result
    }

    fn put_slot(&mut self, slot: SlotRef, state: Slot) {
        if let Some(target) = self
            .units
            .get_mut(slot.unit)
            .and_then(|u| u.slots.get_mut(slot.slot))
        {
            *target = state;
        }
    }

    fn update_content(
        &mut self,
        slot: SlotRef,
        content: &mut ContentSlot,
        items: Vec<Item>,
    ) -> Result<(), RenderError> {
        self.refill(slot, content);
        let mut claims = PassClaims::default();
        let children = match self.resolve_children(slot, content, &items, &mut claims) {
            Ok(children) => children,
            Err(err) => {
                self.roll_back(slot, content, claims);
                return Err(err);
            }
        };
        self.place_children(slot, content, children)
    }

    /// Units still in the slot's sequence from the previous pass go back to
    /// the placed pool unless `release` already put them there.
    fn refill(&self, slot: SlotRef, content: &mut ContentSlot) {
        let live: Vec<UnitId> = content
            .children
            .iter()
            .filter_map(|child| match child {
                Child::Unit(unit) => Some(*unit),
                Child::Node(_) => None,
            })
            .collect();
        for unit in live {
            let Some(keys) = self.units.get(unit).map(|u| u.keys.clone()) else {
                self.violation(&format!("live child {unit} of {slot} was disposed"));
                continue;
            };
            if content.placed.contains(keys.exact.as_str(), unit) {
                continue;
            }
            if content.detached.remove(&keys, unit) {
                content.forget_detached(unit);
                self.violation(&format!("unit {unit} is live in {slot} but was retained as detached"));
            }
            content.placed.insert(&keys, unit);
        }
    }

    fn resolve_children(
        &mut self,
        slot: SlotRef,
        content: &mut ContentSlot,
        items: &[Item],
        claims: &mut PassClaims,
    ) -> Result<Vec<Child>, RenderError> {
        let mut resolved: Vec<Option<Child>> = vec![None; items.len()];
        let mut keys: Vec<Option<UnitKeys>> = Vec::with_capacity(items.len());
        let mut seen_nodes = HashSet::new();
        let mut deferred = Vec::new();

        for (index, item) in items.iter().enumerate() {
            let item_keys = match item {
                Item::Node(node) => {
                    if seen_nodes.insert(*node) {
                        resolved[index] = Some(Child::Node(*node));
                    } else {
                        log::warn!("node {node} supplied twice to {slot}; keeping the first");
                    }
                    keys.push(None);
                    continue;
                }
                Item::Text(text) => KeyHasher::text_keys(text),
                Item::Template(template) => self
                    .hasher
                    .template_keys(template.skeleton(), template.values()),
            };
            match self.claim(content, item_keys.exact.as_str(), Match::Exact) {
                Some((unit, from)) => {
                    log::trace!("{slot}: {unit} reused by exact key");
                    claims.note(unit, from);
                    resolved[index] = Some(Child::Unit(unit));
                }
                None => deferred.push(index),
            }
            keys.push(Some(item_keys));
        }

        for index in deferred {
            let Some(item_keys) = keys[index].take() else {
                continue;
            };
            let unit = match self.claim(content, item_keys.close.as_str(), Match::Close) {
                Some((unit, from)) => {
                    log::debug!("{slot}: {unit} reused by close key {}", item_keys.close);
                    claims.note(unit, from);
                    self.reapply(unit, &items[index], item_keys)?;
                    unit
                }
                None => {
                    let unit = self.create(slot, &items[index], item_keys)?;
                    claims.created.push(unit);
                    unit
                }
            };
            resolved[index] = Some(Child::Unit(unit));
        }

        Ok(resolved.into_iter().flatten().collect())
    }

    /// Undoes the pool bookkeeping of a pass that failed before its
    /// sequence was placed. Units revived from the detached pool return
    /// there; units created by the pass are freed.
    fn roll_back(&mut self, slot: SlotRef, content: &mut ContentSlot, claims: PassClaims) {
        for unit in claims.revived {
            if content.children.contains(&Child::Unit(unit)) {
                continue;
            }
            let Some(keys) = self.units.get(unit).map(|u| u.keys.clone()) else {
                continue;
            };
            content.detached.insert(&keys, unit);
            content.detached_order.push_back(unit);
        }
        for unit in claims.created {
            if let Err(err) = self.dispose_unit(unit) {
                log::warn!("{slot}: failed to free {unit} after an aborted pass: {err}");
            }
        }
        if let Err(err) = self.evict(content) {
            log::warn!("{slot}: eviction after an aborted pass failed: {err}");
        }
        log::debug!("{slot}: pass aborted, pools restored");
    }

    fn place_children(
        &mut self,
        slot: SlotRef,
        content: &mut ContentSlot,
        children: Vec<Child>,
    ) -> Result<(), RenderError> {
        let live: HashSet<UnitId> = children
            .iter()
            .filter_map(|child| match child {
                Child::Unit(unit) => Some(*unit),
                Child::Node(_) => None,
            })
            .collect();
        let orphans: Vec<UnitId> = content
            .children
            .iter()
            .filter_map(|child| match child {
                Child::Unit(unit) if !live.contains(unit) => Some(*unit),
                _ => None,
            })
            .collect();
        let orphan_nodes: Vec<Vec<NodeId>> = orphans.iter().map(|u| self.unit_nodes(*u)).collect();

        let old_nodes = self.tree.nodes_between(content.open, content.close);
        let mut new_nodes = Vec::with_capacity(children.len());
        for child in &children {
            match child {
                Child::Unit(unit) => new_nodes.extend(self.unit_nodes(*unit)),
                Child::Node(node) => new_nodes.push(*node),
            }
        }
        let parent = self
            .tree
            .parent(content.close)
            .ok_or(NodeError::Missing { id: content.close })?;
        let region = Region {
            parent,
            open: content.open,
            close: content.close,
        };
        let stats = reconcile(&mut self.tree, region, &old_nodes, &new_nodes)?;
        if !stats.is_noop() {
            log::debug!("{slot}: reconciled {} -> {} nodes, {stats:?}", old_nodes.len(), new_nodes.len());
        }

        for nodes in &orphan_nodes {
            for &node in nodes {
                self.tree.stash(node)?;
            }
        }
        for unit in orphans {
            let Some(unit_keys) = self.units.get(unit).map(|u| u.keys.clone()) else {
                continue;
            };
            content.placed.remove(&unit_keys, unit);
            content.detached.insert(&unit_keys, unit);
            content.detached_order.push_back(unit);
        }
        content.children = children;
        self.evict(content)
    }

    /// Takes one unit indexed under `key` out of the slot's pools, placed
    /// pool first.
    fn claim(
        &mut self,
        content: &mut ContentSlot,
        key: &str,
        by: Match,
    ) -> Option<(UnitId, PoolKind)> {
        for kind in [PoolKind::Placed, PoolKind::Detached] {
            loop {
                let (found, other) = match kind {
                    PoolKind::Placed => (&mut content.placed, &mut content.detached),
                    PoolKind::Detached => (&mut content.detached, &mut content.placed),
                };
                let Some(unit) = found.first(key) else {
                    break;
                };
                let Some(keys) = self.units.get(unit).map(|u| u.keys.clone()) else {
                    found.remove_key(key, unit);
                    self.violation(&format!("pool entry {key} refers to disposed unit {unit}"));
                    continue;
                };
                let counterpart = match by {
                    Match::Exact => keys.close.as_str(),
                    Match::Close => keys.exact.as_str(),
                };
                found.remove_key(key, unit);
                let consistent = found.remove_key(counterpart, unit);
                let also_other = other.remove(&keys, unit);
                if kind == PoolKind::Detached || also_other {
                    content.forget_detached(unit);
                }
                if !consistent {
                    self.violation(&format!("unit {unit} indexed under {key} but not under {counterpart}"));
                }
                self.claim_ancestors(unit);
                return Some((unit, kind));
            }
        }
        None
    }

    /// A claimed unit's ancestors are no longer independently reusable.
    fn claim_ancestors(&mut self, unit: UnitId) {
        let mut current = unit;
        while let Some(owner) = self.units.get(current).and_then(|u| u.parent).map(|p| p.unit) {
            if let Some(grand) = self.units.get(owner).and_then(|u| u.parent) {
                self.unindex(grand, owner);
            }
            current = owner;
        }
    }

    fn reapply(&mut self, unit: UnitId, item: &Item, keys: UnitKeys) -> Result<(), RenderError> {
        let result = match item {
            Item::Text(text) => match self.unit(unit).map(|u| u.first) {
                Ok(first) => self.tree.set_text(first, text).map_err(RenderError::from),
                Err(err) => Err(err),
            },
            Item::Template(template) => self.apply_slots(unit, template.values()),
            Item::Node(_) => Ok(()),
        };
        if let Some(u) = self.units.get_mut(unit) {
            match &result {
                Ok(()) => u.keys = keys,
                // Partially applied: reusable by close key only.
                Err(_) => u.keys.exact = stale_key(),
            }
        }
        result
    }

    fn create(&mut self, slot: SlotRef, item: &Item, keys: UnitKeys) -> Result<UnitId, RenderError> {
        match item {
            Item::Text(text) => {
                let node = self.tree.create_text(text);
                self.tree.stash(node)?;
                let unit = self.units.insert(RenderUnit {
                    origin: UnitOrigin::Text,
                    first: node,
                    last: node,
                    slots: Vec::new(),
                    keys,
                    parent: Some(slot),
                });
                log::trace!("{slot}: created text {unit}");
                Ok(unit)
            }
            Item::Template(template) => {
                let unit = self.instantiate(slot, template.skeleton(), keys)?;
                log::debug!("{slot}: created {unit} from skeleton {}", template.skeleton().id());
                if let Err(err) = self.apply_slots(unit, template.values()) {
                    self.dispose_unit(unit)?;
                    return Err(err);
                }
                Ok(unit)
            }
            Item::Node(node) => Err(RenderError::Node(NodeError::Missing { id: *node })),
        }
    }

    fn instantiate(
        &mut self,
        parent: SlotRef,
        skeleton: &Rc<Skeleton>,
        keys: UnitKeys,
    ) -> Result<UnitId, RenderError> {
        let mut roots = skeleton.instantiate(&mut self.tree)?;
        for &root in &roots {
            self.tree.stash(root)?;
        }
        let mut targets: Vec<Option<NodeId>> = skeleton
            .slots()
            .iter()
            .map(|descriptor| resolve_path(&self.tree, &roots, descriptor.path()))
            .collect();

        for placeholder in self.placeholders(&roots) {
            let Some(real) = self.host.upgrade_placeholder(&mut self.tree, placeholder) else {
                continue;
            };
            if real == placeholder {
                continue;
            }
            for child in self.tree.children(placeholder) {
                self.tree.append_child(real, child)?;
            }
            self.tree.replace(placeholder, real)?;
            self.tree.dispose(placeholder)?;
            for node in roots.iter_mut().chain(targets.iter_mut().flatten()) {
                if *node == placeholder {
                    *node = real;
                }
            }
            log::debug!("placeholder {placeholder} upgraded to {real}");
        }

        let needs_host = skeleton
            .slots()
            .iter()
            .any(|d| d.kind() == SlotKind::HostAttributeValue);
        let host_container = if needs_host {
            self.host_container(parent)
        } else {
            None
        };

        let mut slots = Vec::with_capacity(targets.len());
        for (index, (descriptor, target)) in skeleton.slots().iter().zip(targets).enumerate() {
            let unresolved = RenderError::UnresolvedSlot {
                skeleton: skeleton.id(),
                slot: index,
            };
            let attribute = |target: NodeId| AttributeSlot {
                target,
                name: descriptor.name().unwrap_or_default().to_string(),
                capability: descriptor.capability(),
                applied: None,
            };
            let state = match descriptor.kind() {
                SlotKind::Comment => Slot::Comment,
                SlotKind::HostAttributeValue => {
                    Slot::HostAttributeValue(attribute(host_container.ok_or(unresolved)?))
                }
                kind => {
                    let target = target.ok_or(unresolved)?;
                    match kind {
                        SlotKind::Content => {
                            let close = self
                                .tree
                                .next_sibling(target)
                                .ok_or(NodeError::Missing { id: target })?;
                            Slot::Content(ContentSlot::new(target, close))
                        }
                        SlotKind::WholeAttribute => Slot::WholeAttribute {
                            target,
                            applied: Vec::new(),
                        },
                        SlotKind::Event => Slot::Event {
                            target,
                            name: descriptor.name().unwrap_or_default().to_string(),
                            callback: None,
                        },
                        _ => Slot::AttributeValue(attribute(target)),
                    }
                }
            };
            slots.push(state);
        }

        let (Some(&first), Some(&last)) = (roots.first(), roots.last()) else {
            return Err(RenderError::UnresolvedSlot {
                skeleton: skeleton.id(),
                slot: 0,
            });
        };
        Ok(self.units.insert(RenderUnit {
            origin: UnitOrigin::Template(Rc::clone(skeleton)),
            first,
            last,
            slots,
            keys,
            parent: Some(parent),
        }))
    }

    fn placeholders(&self, roots: &[NodeId]) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = roots.iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            if self.tree.is_placeholder(node) {
                found.push(node);
            }
            let mut children = self.tree.children(node);
            children.reverse();
            stack.extend(children);
        }
        found
    }

    /// The container of the root the given slot ultimately renders into.
    fn host_container(&self, slot: SlotRef) -> Option<NodeId> {
        let mut current = slot.unit;
        loop {
            let unit = self.units.get(current)?;
            match (&unit.origin, unit.parent) {
                (UnitOrigin::Root { container }, _) => return Some(*container),
                (_, Some(parent)) => current = parent.unit,
                (_, None) => return None,
            }
        }
    }

    fn unit_nodes(&self, unit: UnitId) -> Vec<NodeId> {
        match self.units.get(unit) {
            Some(u) => self.node_range(u.first, u.last),
            None => Vec::new(),
        }
    }

    fn node_range(&self, first: NodeId, last: NodeId) -> Vec<NodeId> {
        if self.tree.parent(first) != self.tree.parent(last) {
            self.violation(&format!("unit boundary {first}..{last} spans different parents"));
        }
        let mut nodes = Vec::new();
        let mut current = Some(first);
        while let Some(node) = current {
            nodes.push(node);
            if node == last {
                break;
            }
            current = self.tree.next_sibling(node);
        }
        nodes
    }

    fn evict(&mut self, content: &mut ContentSlot) -> Result<(), RenderError> {
        let Some(capacity) = self.config.detached_capacity else {
            return Ok(());
        };
        while content.detached_order.len() > capacity {
            let Some(unit) = content.detached_order.pop_front() else {
                break;
            };
            if let Some(keys) = self.units.get(unit).map(|u| u.keys.clone()) {
                content.detached.remove(&keys, unit);
            }
            self.dispose_unit(unit)?;
        }
        Ok(())
    }

    /// Frees a unit and everything it still holds. Caller-owned nodes are
    /// detached, never freed.
    fn dispose_unit(&mut self, unit: UnitId) -> Result<(), RenderError> {
        let mut doomed = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![unit];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(u) = self.units.get(current) else {
                continue;
            };
            doomed.push(current);
            for state in &u.slots {
                if let Slot::Content(content) = state {
                    stack.extend(content.children.iter().filter_map(|child| match child {
                        Child::Unit(id) => Some(*id),
                        Child::Node(_) => None,
                    }));
                    stack.extend(content.detached.units());
                    stack.extend(content.placed.units());
                }
            }
        }

        let mut external = Vec::new();
        let mut bound = Vec::new();
        for &id in &doomed {
            let Some(u) = self.units.get(id) else {
                continue;
            };
            for state in &u.slots {
                match state {
                    Slot::Content(content) => {
                        external.extend(content.children.iter().filter_map(|child| match child {
                            Child::Node(node) => Some(*node),
                            Child::Unit(_) => None,
                        }))
                    }
                    Slot::Event {
                        target,
                        name,
                        callback: Some(_),
                    } => bound.push((*target, name.clone())),
                    _ => {}
                }
            }
        }
        for node in external {
            if self.tree.contains(node) {
                self.tree.remove(node)?;
            }
        }
        for key in bound {
            self.listeners.remove(&key);
        }

        for &id in &doomed {
            let Some(u) = self.units.remove(id) else {
                continue;
            };
            if !self.tree.contains(u.first) {
                continue;
            }
            for node in self.node_range(u.first, u.last) {
                if self.tree.contains(node) {
                    self.tree.dispose(node)?;
                }
            }
        }
        log::debug!("disposed {unit} ({} units)", doomed.len());
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/renderer_tests.rs"]
mod tests;
