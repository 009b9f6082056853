//! Render units: realised, boundary-delimited template instances.

use std::fmt;
use std::rc::Rc;

use crate::key::UnitKeys;
use crate::skeleton::Skeleton;
use crate::slot::Slot;
use crate::tree::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(usize);

impl UnitId {
    #[inline]
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}", self.0)
    }
}

/// A slot addressed through its owning unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotRef {
    pub unit: UnitId,
    pub slot: usize,
}

impl SlotRef {
    pub fn new(unit: UnitId, slot: usize) -> Self {
        Self { unit, slot }
    }
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.unit, self.slot)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum UnitOrigin {
    /// Mounted into a host container; owns a single content slot.
    Root { container: NodeId },
    Template(Rc<Skeleton>),
    Text,
}

#[derive(Debug)]
pub(crate) struct RenderUnit {
    pub origin: UnitOrigin,
    /// Boundary pair; every node of the unit is a sibling in `first..=last`.
    pub first: NodeId,
    pub last: NodeId,
    pub slots: Vec<Slot>,
    pub keys: UnitKeys,
    /// The content slot this unit renders into; `None` for roots.
    pub parent: Option<SlotRef>,
}

impl RenderUnit {
    pub fn skeleton(&self) -> Option<&Rc<Skeleton>> {
        match &self.origin {
            UnitOrigin::Template(skeleton) => Some(skeleton),
            _ => None,
        }
    }
}

/// Unit storage. Ids are never reused, so a stale [`UnitId`] reads as
/// missing rather than aliasing a newer unit.
#[derive(Debug, Default)]
pub(crate) struct UnitArena {
    units: Vec<Option<RenderUnit>>,
    live: usize,
}

impl UnitArena {
    pub fn insert(&mut self, unit: RenderUnit) -> UnitId {
        let id = UnitId(self.units.len());
        self.units.push(Some(unit));
        self.live += 1;
        id
    }

    /// The id the next [`insert`](Self::insert) will hand out.
    pub fn next_id(&self) -> UnitId {
        UnitId(self.units.len())
    }

    pub fn get(&self, id: UnitId) -> Option<&RenderUnit> {
        self.units.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut RenderUnit> {
        self.units.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn remove(&mut self, id: UnitId) -> Option<RenderUnit> {
        let removed = self.units.get_mut(id.0).and_then(Option::take);
        if removed.is_some() {
            self.live -= 1;
        }
        removed
    }

    pub fn contains(&self, id: UnitId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.live
    }
}
