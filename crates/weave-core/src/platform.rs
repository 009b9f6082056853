//! Host lifecycle hooks.
//!
//! The renderer never constructs components itself. Elements a skeleton
//! marks as placeholders are offered to the [`Host`] right after a unit is
//! instantiated, before any value is applied to it.

use crate::tree::{NodeId, Tree};

pub trait Host {
    /// Offers a placeholder element for upgrade.
    ///
    /// Returning a node swaps it in for `placeholder`: the placeholder's
    /// children are appended to it, the placeholder is freed, and unit
    /// boundaries and slots that pointed at it are retargeted. Returning
    /// `None` keeps the placeholder.
    fn upgrade_placeholder(&mut self, tree: &mut Tree, placeholder: NodeId) -> Option<NodeId>;
}

/// Host that leaves every placeholder in place.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHost;

impl Host for NoopHost {
    fn upgrade_placeholder(&mut self, _tree: &mut Tree, _placeholder: NodeId) -> Option<NodeId> {
        None
    }
}
