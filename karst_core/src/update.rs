// Copyright 2026 the Karst Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dirty propagation: turning accumulated status flags into a minimal
//! re-evaluation batch.
//!
//! Status flags accrue on the nodes where edits happen. Before evaluation
//! they are *escalated* down onto the affected brushes (a modified branch
//! dirties every brush beneath it), then *expanded* sideways once through
//! the touching cache (a reshaped brush also invalidates the neighbors it
//! overlaps). The expansion is deliberately non-recursive: neighbors
//! re-evaluate, but their own neighbors do not.

use alloc::vec::Vec;

use hashbrown::{HashMap, HashSet};

use crate::compact::CompactTree;
use crate::node::{CompactIndex, Hierarchy};
use crate::status::NodeStatus;

/// Remembered geometric adjacency between brushes, fed by evaluator output.
///
/// Entries are keyed by arena slot and carry the brush's [`CompactIndex`]
/// at recording time: when the slot is recycled the stored generation no
/// longer matches and the entry reads as empty.
#[derive(Clone, Debug, Default)]
pub struct TouchesCache {
    map: HashMap<u32, (CompactIndex, Vec<CompactIndex>)>,
}

impl TouchesCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the touching set reported for `brush`, replacing any
    /// previous entry for its slot.
    pub fn record(&mut self, brush: CompactIndex, touching: Vec<CompactIndex>) {
        self.map.insert(brush.index(), (brush, touching));
    }

    /// Returns the remembered touching set of `brush`, or an empty slice
    /// when none is recorded or the entry is stale.
    #[must_use]
    pub fn touching_of(&self, brush: CompactIndex) -> &[CompactIndex] {
        match self.map.get(&brush.index()) {
            Some((recorded, touching)) if *recorded == brush => touching,
            _ => &[],
        }
    }

    /// Drops the entry for `brush`, if any.
    pub fn forget(&mut self, brush: CompactIndex) {
        if let Some((recorded, _)) = self.map.get(&brush.index())
            && *recorded == brush
        {
            self.map.remove(&brush.index());
        }
    }

    /// Drops every entry. Used when a whole tree is rebuilt from scratch.
    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// Number of recorded entries (including stale ones not yet evicted).
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns whether the cache has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// The minimal work order derived from one tree's accumulated flags.
#[derive(Clone, Debug, Default)]
pub struct UpdateBatch {
    /// Brushes whose own (or escalated) flags require re-evaluation, in
    /// composition order.
    pub modified: Vec<CompactIndex>,
    /// Brushes dragged in through the touching cache. Disjoint from
    /// `modified`; re-evaluated but never expanded further.
    pub indirect: Vec<CompactIndex>,
    /// Brushes whose world transform must be recomputed before evaluation.
    pub transforms: Vec<CompactIndex>,
}

impl UpdateBatch {
    /// Returns whether the batch requires any evaluation work.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.indirect.is_empty() && self.transforms.is_empty()
    }

    /// Total number of brushes to re-evaluate.
    #[must_use]
    pub fn evaluation_count(&self) -> usize {
        self.modified.len() + self.indirect.len()
    }
}

/// Flags that also invalidate the brush's touching neighbors. Movement
/// counts: a brush that translated away still overlapped its old neighbors
/// last cycle.
const INVALIDATES_NEIGHBORS: NodeStatus = NodeStatus::SHAPE_MODIFIED
    .union(NodeStatus::HIERARCHY_MODIFIED)
    .union(NodeStatus::TRANSFORMATION_MODIFIED);

/// Escalates ancestor flags onto brushes and expands once through the
/// touching cache, producing this cycle's work order.
///
/// Escalated flags are written back onto the brush slots so a later
/// [`finish_cycle`](crate::scheduler::finish_cycle) clears exactly what was
/// acted on.
#[must_use]
pub fn find_modified_brushes(
    hierarchy: &mut Hierarchy,
    tree: &CompactTree,
    touches: &TouchesCache,
) -> UpdateBatch {
    let mut batch = UpdateBatch::default();
    let mut in_batch: HashSet<u32> = HashSet::new();

    // Escalation pass, in composition order.
    for (order, entry) in tree.brushes().iter().enumerate() {
        let brush = entry.index;
        if !hierarchy.is_alive(brush) {
            // The snapshot can outlive a brush deleted since the rebuild.
            continue;
        }
        let mut effective = hierarchy.status_of(brush).unwrap_or_default();
        #[expect(
            clippy::cast_possible_truncation,
            reason = "brush orders fit in u32 by construction"
        )]
        for &ancestor in tree.ancestors_of(order as u32) {
            let node = tree.nodes()[ancestor as usize].index;
            effective |= hierarchy.status_of(node).unwrap_or_default();
        }

        if effective.intersects(NodeStatus::TRANSFORMATION_MODIFIED | NodeStatus::NEED_TRANSFORM_UPDATE)
        {
            effective |= NodeStatus::NEED_TRANSFORM_UPDATE;
            batch.transforms.push(brush);
        }
        if effective.intersects(INVALIDATES_NEIGHBORS) {
            effective |= NodeStatus::NEED_ALL_TOUCHING_UPDATED;
        }
        // Any flag at all puts the brush in the rebuild set.
        if !effective.is_empty() {
            batch.modified.push(brush);
            in_batch.insert(brush.index());
        }
        if let Some(own) = hierarchy.status_of(brush)
            && own != effective
        {
            // Write the escalated view back so the cycle acts on it.
            let _ = hierarchy.mark_status(brush, effective);
        }
    }

    // Single expansion through remembered adjacency.
    for brush in batch.modified.clone() {
        let status = hierarchy.status_of(brush).unwrap_or_default();
        if !status.contains(NodeStatus::NEED_ALL_TOUCHING_UPDATED) {
            continue;
        }
        for &neighbor in touches.touching_of(brush) {
            if in_batch.contains(&neighbor.index()) {
                continue;
            }
            // Stale neighbors (deleted or pruned from the tree) drop out.
            if !hierarchy.is_alive(neighbor) || tree.order_of(neighbor).is_none() {
                continue;
            }
            in_batch.insert(neighbor.index());
            batch.indirect.push(neighbor);
        }
    }

    batch
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::node::Operation::Additive;
    use crate::transform::Transform3d;

    fn tree_with_brushes(count: i32) -> (Hierarchy, Vec<CompactIndex>) {
        let mut h = Hierarchy::with_root(1, 0);
        let root = h.root();
        let brushes = (0..count)
            .map(|i| {
                let b = h.create_brush(Additive, i, i);
                h.attach(root, b).unwrap();
                b
            })
            .collect();
        (h, brushes)
    }

    #[test]
    fn clean_tree_yields_empty_batch() {
        let (mut h, _) = tree_with_brushes(3);
        h.clear_all_status();
        let tree = CompactTree::build(&h);
        let batch = find_modified_brushes(&mut h, &tree, &TouchesCache::new());
        assert!(batch.is_empty());
    }

    #[test]
    fn shape_edit_selects_only_that_brush() {
        let (mut h, brushes) = tree_with_brushes(3);
        h.clear_all_status();
        h.set_mesh(brushes[1], 99).unwrap();

        let tree = CompactTree::build(&h);
        let batch = find_modified_brushes(&mut h, &tree, &TouchesCache::new());
        assert_eq!(batch.modified, vec![brushes[1]]);
        assert!(batch.indirect.is_empty());
        assert!(batch.transforms.is_empty());
    }

    #[test]
    fn branch_flags_escalate_to_descendant_brushes() {
        let mut h = Hierarchy::with_root(1, 0);
        let root = h.root();
        let branch = h.create_branch(Additive, 0);
        let under = h.create_brush(Additive, 0, 1);
        let outside = h.create_brush(Additive, 0, 2);
        h.attach(root, branch).unwrap();
        h.attach(branch, under).unwrap();
        h.attach(root, outside).unwrap();
        h.clear_all_status();

        h.set_transform(branch, Transform3d::from_translation(1.0, 0.0, 0.0))
            .unwrap();
        let tree = CompactTree::build(&h);
        let batch = find_modified_brushes(&mut h, &tree, &TouchesCache::new());

        assert_eq!(batch.modified, vec![under]);
        assert_eq!(batch.transforms, vec![under]);
        assert!(
            h.status_of(under)
                .unwrap()
                .contains(NodeStatus::NEED_TRANSFORM_UPDATE),
            "escalation is written back onto the brush"
        );
    }

    #[test]
    fn touching_expansion_is_single_step() {
        let (mut h, brushes) = tree_with_brushes(3);
        h.clear_all_status();
        h.set_mesh(brushes[0], 99).unwrap();

        // 0 touches 1, 1 touches 2; only 1 is dragged in.
        let mut touches = TouchesCache::new();
        touches.record(brushes[0], vec![brushes[1]]);
        touches.record(brushes[1], vec![brushes[0], brushes[2]]);

        let tree = CompactTree::build(&h);
        let batch = find_modified_brushes(&mut h, &tree, &touches);
        assert_eq!(batch.modified, vec![brushes[0]]);
        assert_eq!(batch.indirect, vec![brushes[1]]);
    }

    #[test]
    fn stale_touching_entries_are_ignored() {
        let (mut h, brushes) = tree_with_brushes(2);
        let mut touches = TouchesCache::new();
        touches.record(brushes[0], vec![brushes[1]]);

        h.delete(brushes[1]).unwrap();
        h.clear_all_status();
        h.set_mesh(brushes[0], 99).unwrap();

        let tree = CompactTree::build(&h);
        let batch = find_modified_brushes(&mut h, &tree, &touches);
        assert_eq!(batch.modified, vec![brushes[0]]);
        assert!(batch.indirect.is_empty());
    }

    #[test]
    fn cache_entry_goes_stale_with_its_slot() {
        let (mut h, brushes) = tree_with_brushes(2);
        let mut touches = TouchesCache::new();
        touches.record(brushes[0], vec![brushes[1]]);
        assert_eq!(touches.touching_of(brushes[0]).len(), 1);

        h.delete(brushes[0]).unwrap();
        let reused = h.create_brush(Additive, 0, 5);
        assert_eq!(reused.index(), brushes[0].index());
        assert!(touches.touching_of(reused).is_empty());

        touches.forget(brushes[0]);
        assert!(touches.is_empty() || touches.len() == 1);
    }

    #[test]
    fn movement_invalidates_old_neighbors() {
        let (mut h, brushes) = tree_with_brushes(2);
        h.clear_all_status();
        h.set_transform(brushes[0], Transform3d::from_translation(2.0, 0.0, 0.0))
            .unwrap();

        let mut touches = TouchesCache::new();
        touches.record(brushes[0], vec![brushes[1]]);

        let tree = CompactTree::build(&h);
        let batch = find_modified_brushes(&mut h, &tree, &touches);
        assert_eq!(batch.modified, vec![brushes[0]]);
        assert_eq!(batch.transforms, vec![brushes[0]]);
        assert_eq!(
            batch.indirect,
            vec![brushes[1]],
            "a brush that moved away still overlapped its neighbor last cycle"
        );
    }
}
