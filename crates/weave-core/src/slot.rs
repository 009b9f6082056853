//! Per-location slot state and the text helpers attribute slots share.

use std::collections::VecDeque;

use crate::pool::UnitPool;
use crate::skeleton::Capability;
use crate::tree::NodeId;
use crate::unit::UnitId;
use crate::value::{Callback, Value};

/// One entry of a content slot's rendered sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Child {
    Unit(UnitId),
    /// A caller-owned node placed as-is.
    Node(NodeId),
}

#[derive(Debug)]
pub(crate) struct ContentSlot {
    pub open: NodeId,
    pub close: NodeId,
    pub children: Vec<Child>,
    /// Units rendered here during the previous pass, waiting to be claimed.
    pub placed: UnitPool,
    /// Units dropped from the sequence but retained in holding.
    pub detached: UnitPool,
    /// Detached units, oldest first, for retention eviction.
    pub detached_order: VecDeque<UnitId>,
}

impl ContentSlot {
    pub fn new(open: NodeId, close: NodeId) -> Self {
        Self {
            open,
            close,
            children: Vec::new(),
            placed: UnitPool::new(),
            detached: UnitPool::new(),
            detached_order: VecDeque::new(),
        }
    }

    pub fn forget_detached(&mut self, unit: UnitId) {
        self.detached_order.retain(|candidate| *candidate != unit);
    }
}

#[derive(Debug)]
pub(crate) struct AttributeSlot {
    pub target: NodeId,
    pub name: String,
    pub capability: Capability,
    /// `None` while the attribute is absent.
    pub applied: Option<String>,
}

#[derive(Debug)]
pub(crate) enum Slot {
    Content(ContentSlot),
    WholeAttribute {
        target: NodeId,
        applied: Vec<String>,
    },
    AttributeValue(AttributeSlot),
    Event {
        target: NodeId,
        name: String,
        callback: Option<Callback>,
    },
    Comment,
    HostAttributeValue(AttributeSlot),
}

/// Text form of a scalar; `None` for values that have no text form.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(v) => Some(v.to_string()),
        Value::Int(v) => Some(v.to_string()),
        Value::Float(v) => Some(v.to_string()),
        Value::Text(v) => Some(v.to_string()),
        _ => None,
    }
}

/// Joins attribute text; list items are space separated.
pub(crate) fn attribute_text(value: &Value, out: &mut String) -> Result<(), &'static str> {
    match value {
        Value::List(items) => {
            let mut first = true;
            for item in items.iter() {
                if item.is_null() {
                    continue;
                }
                if !first {
                    out.push(' ');
                }
                first = false;
                attribute_text(item, out)?;
            }
            Ok(())
        }
        other => match scalar_text(other) {
            Some(text) => {
                out.push_str(&text);
                Ok(())
            }
            None => Err(other.kind_name()),
        },
    }
}

/// Splits `a=1 b="x y" c` into name/value pairs; bare names get `""`.
pub(crate) fn parse_attribute_pairs(input: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut chars = input.chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let mut name = String::new();
        while let Some(c) = chars.next_if(|c| !c.is_whitespace() && *c != '=') {
            name.push(c);
        }
        if name.is_empty() {
            // Stray `=` with no name.
            if chars.next().is_none() {
                break;
            }
            continue;
        }
        let mut value = String::new();
        if chars.next_if_eq(&'=').is_some() {
            match chars.next_if(|c| *c == '"' || *c == '\'') {
                Some(quote) => {
                    for c in chars.by_ref() {
                        if c == quote {
                            break;
                        }
                        value.push(c);
                    }
                }
                None => {
                    while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                        value.push(c);
                    }
                }
            }
        }
        pairs.push((name, value));
    }
    pairs
}
