//! Structural identity strings for render units.
//!
//! The close key names only the structure (`s<id>` for a skeleton, `#text`
//! for text). The exact key additionally encodes the values. Every encoding
//! is self-delimiting (length-prefixed text, bracketed lists, parenthesised
//! template values), so two different value lists can never produce the same
//! exact key.
//!
//! Thunks, callbacks and external nodes are encoded by identity token rather
//! than content. Nested templates are encoded through their own exact key.
//! Below `max_depth` nesting levels, templates fall back to their identity
//! token and lists to a fresh token: such values never exact-match again but
//! remain eligible for close matches.

use std::borrow::Borrow;
use std::fmt::{self, Write as _};
use std::rc::Rc;

use crate::skeleton::Skeleton;
use crate::value::{next_identity, Value};

pub const TEXT_CLOSE_KEY: &str = "#text";

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitKey(Rc<str>);

impl UnitKey {
    pub fn new(key: impl Into<Rc<str>>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for UnitKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnitKey({:?})", &*self.0)
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Exact and close key of one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitKeys {
    pub exact: UnitKey,
    pub close: UnitKey,
}

#[derive(Debug, Clone, Copy)]
pub struct KeyHasher {
    max_depth: usize,
}

impl Default for KeyHasher {
    fn default() -> Self {
        Self::new(32)
    }
}

impl KeyHasher {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn close_key(skeleton: &Skeleton) -> UnitKey {
        UnitKey::new(skeleton.id().to_string())
    }

    pub fn template_keys(&self, skeleton: &Skeleton, values: &[Value]) -> UnitKeys {
        let mut exact = String::new();
        self.write_template(&mut exact, skeleton, values, 0);
        UnitKeys {
            exact: UnitKey::new(exact),
            close: Self::close_key(skeleton),
        }
    }

    pub fn text_keys(text: &str) -> UnitKeys {
        UnitKeys {
            exact: UnitKey::new(format!("{TEXT_CLOSE_KEY}:{}:{text}", text.len())),
            close: UnitKey::new(TEXT_CLOSE_KEY),
        }
    }

    fn write_template(&self, out: &mut String, skeleton: &Skeleton, values: &[Value], depth: usize) {
        let _ = write!(out, "{}(", skeleton.id());
        for value in values {
            self.write_value(out, value, depth + 1);
        }
        out.push(')');
    }

    fn write_value(&self, out: &mut String, value: &Value, depth: usize) {
        match value {
            Value::Null => out.push('n'),
            Value::Bool(true) => out.push_str("b1"),
            Value::Bool(false) => out.push_str("b0"),
            Value::Int(v) => {
                let _ = write!(out, "i{v};");
            }
            Value::Float(v) => {
                let _ = write!(out, "f{:x};", v.to_bits());
            }
            Value::Text(text) => {
                let _ = write!(out, "t{}:{text}", text.len());
            }
            Value::Node(id) => {
                let _ = write!(out, "x{id};");
            }
            Value::Thunk(thunk) => {
                let _ = write!(out, "g{};", thunk.id());
            }
            Value::Callback(callback) => {
                let _ = write!(out, "c{}[", callback.id());
                for arg in callback.args() {
                    self.write_value(out, arg, depth + 1);
                }
                out.push(']');
            }
            Value::List(items) => {
                if depth >= self.max_depth {
                    let _ = write!(out, "#{};", next_identity());
                    return;
                }
                out.push('[');
                for item in items.iter() {
                    self.write_value(out, item, depth + 1);
                }
                out.push(']');
            }
            Value::Template(template) => {
                if depth >= self.max_depth {
                    let _ = write!(out, "#{};", template.id());
                    return;
                }
                out.push('u');
                self.write_template(out, template.skeleton(), template.values(), depth);
            }
        }
    }
}
