//! Error types for the reconciliation engine.
//!
//! Arity and binding errors are fatal and propagate to the caller of
//! [`Renderer::apply_values`](crate::Renderer::apply_values). Pool
//! consistency problems never surface here; they go through
//! [`report_pool_violation`].

use crate::skeleton::SkeletonId;
use crate::tree::NodeId;
use crate::unit::UnitId;

/// Failure of a structural tree operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    #[error("node {id} missing")]
    Missing { id: NodeId },

    #[error("node {id} cannot hold children")]
    NotAContainer { id: NodeId },

    #[error("node {id} carries no text")]
    NotText { id: NodeId },

    #[error("node {child} is not a child of node {parent}")]
    NotAChild { parent: NodeId, child: NodeId },
}

/// Problems detected while assembling a [`Skeleton`](crate::Skeleton).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkeletonError {
    #[error("element <{tag}> was never closed")]
    UnclosedElement { tag: String },

    #[error("{what} requires an open element")]
    NoOpenElement { what: &'static str },

    #[error("close() called with no open element")]
    UnbalancedClose,

    #[error("attribute `{name}` has no expression between its fragments")]
    MissingExpression { name: String },
}

/// Errors surfaced by a render pass.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The number of supplied values does not match the skeleton's slots.
    #[error("skeleton {skeleton} expects {expected} values but {actual} were supplied")]
    Arity {
        skeleton: SkeletonId,
        expected: usize,
        actual: usize,
    },

    /// Root and text units take exactly one value.
    #[error("render unit {unit} expects {expected} value but {actual} were supplied")]
    UnitArity {
        unit: UnitId,
        expected: usize,
        actual: usize,
    },

    /// A slot received a value it cannot bind.
    #[error("slot {slot} ({context}) expects {expected}, found {found}")]
    BindingType {
        slot: usize,
        context: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A slot path did not resolve inside a fresh instance.
    #[error("slot {slot} of skeleton {skeleton} has no target node")]
    UnresolvedSlot { skeleton: SkeletonId, slot: usize },

    #[error("value thunks nested deeper than {limit}")]
    ThunkDepth { limit: usize },

    #[error("render unit {0} does not exist")]
    MissingUnit(UnitId),

    #[error(transparent)]
    Node(#[from] NodeError),
}

/// Reports a broken pool invariant.
///
/// With `strict` set this is a hard assertion; otherwise the breach is logged
/// and rendering continues best-effort.
pub fn report_pool_violation(strict: bool, message: &str) {
    if strict {
        panic!("pool consistency violation: {message}");
    }
    log::warn!("pool consistency violation: {message}");
}
