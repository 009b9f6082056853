//! Ordered node-sequence reconciliation.
//!
//! [`reconcile`] rewrites the live children of a region so that they read as
//! `new`, reusing every node common to both sequences in place. Matching
//! heads and tails are skipped first; the remainder is patched in a single
//! linear pass that moves known nodes and inserts unknown ones, after which
//! unmatched old nodes are detached. Adversarial permutations may cost more
//! moves than the theoretical minimum.

use crate::collections::map::HashSet;
use crate::error::NodeError;
use crate::tree::{NodeId, Tree};

/// Where a sequence lives: strictly between `open` and `close` under
/// `parent`. The close marker never moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub parent: NodeId,
    pub open: NodeId,
    pub close: NodeId,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileStats {
    pub inserted: usize,
    pub moved: usize,
    pub removed: usize,
    /// Nodes dropped through the bulk clear path.
    pub cleared: usize,
}

impl ReconcileStats {
    pub fn is_noop(&self) -> bool {
        *self == ReconcileStats::default()
    }
}

/// True when the region's markers are the only boundaries of their parent,
/// so an emptied region can be cleared in one operation.
fn spans_container(tree: &Tree, region: Region) -> bool {
    region.parent != tree.holding()
        && tree.prev_sibling(region.open).is_none()
        && tree.next_sibling(region.close).is_none()
}

pub fn reconcile(
    tree: &mut Tree,
    region: Region,
    old: &[NodeId],
    new: &[NodeId],
) -> Result<ReconcileStats, NodeError> {
    let mut stats = ReconcileStats::default();
    if old == new {
        return Ok(stats);
    }
    if new.is_empty() && spans_container(tree, region) {
        stats.cleared = tree.clear_between(region.open, region.close)?.len();
        return Ok(stats);
    }

    let parent = region.parent;
    let (mut old_head, mut new_head) = (0, 0);
    let (mut old_tail, mut new_tail) = (old.len(), new.len());

    while old_head < old_tail && new_head < new_tail && old[old_head] == new[new_head] {
        old_head += 1;
        new_head += 1;
    }
    while old_head < old_tail && new_head < new_tail && old[old_tail - 1] == new[new_tail - 1] {
        old_tail -= 1;
        new_tail -= 1;
    }

    let after = if new_tail < new.len() {
        new[new_tail]
    } else {
        region.close
    };

    if old_head == old_tail {
        for &node in &new[new_head..new_tail] {
            tree.insert_before(parent, node, Some(after))?;
            stats.inserted += 1;
        }
        return Ok(stats);
    }
    if new_head == new_tail {
        for &node in &old[old_head..old_tail] {
            tree.remove(node)?;
            stats.removed += 1;
        }
        return Ok(stats);
    }

    let known: HashSet<NodeId> = old[old_head..old_tail].iter().copied().collect();
    let wanted: HashSet<NodeId> = new[new_head..new_tail].iter().copied().collect();

    // Everything from the cursor up to `after` is an old node not yet
    // consumed; wanted nodes are pulled in front of it.
    let mut cursor = Some(old[old_head]);
    for &node in &new[new_head..new_tail] {
        while let Some(current) = cursor {
            if current == after || wanted.contains(&current) {
                break;
            }
            cursor = tree.next_sibling(current);
        }
        if cursor == Some(node) {
            cursor = tree.next_sibling(node);
            continue;
        }
        let reference = cursor.unwrap_or(after);
        tree.insert_before(parent, node, Some(reference))?;
        if known.contains(&node) {
            stats.moved += 1;
        } else {
            stats.inserted += 1;
        }
    }

    for &node in &old[old_head..old_tail] {
        if !wanted.contains(&node) {
            tree.remove(node)?;
            stats.removed += 1;
        }
    }
    Ok(stats)
}
