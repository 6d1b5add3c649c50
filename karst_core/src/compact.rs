// Copyright 2026 the Karst Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Flattened snapshot of one document tree for evaluation.
//!
//! [`CompactTree::build`] walks the live hierarchy breadth-first and emits a
//! dense node array plus a per-brush ancestor table, the shape the
//! dirty-propagation and evaluation layers consume. Children that cannot
//! contribute geometry (a leading run of subtractive or intersecting
//! siblings, which would combine against nothing) are pruned together with
//! their subtrees.

use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::node::{CompactIndex, Hierarchy, INVALID, NodeKind, Operation};

/// One node of the flattened tree.
///
/// Breadth-first layout keeps each node's children contiguous, so the
/// child list is a `(offset, count)` run into the same node array.
#[derive(Clone, Copy, Debug)]
pub struct CompactNode {
    /// Arena reference of the source node.
    pub index: CompactIndex,
    /// Kind of the source node.
    pub kind: NodeKind,
    /// Boolean operation of the source node.
    pub operation: Operation,
    /// Position of the parent in the node array, or `u32::MAX` for the root.
    pub parent: u32,
    /// Position of the first retained child in the node array.
    pub child_offset: u32,
    /// Number of retained children.
    pub child_count: u32,
}

/// One brush of the flattened tree, in composition order.
#[derive(Clone, Copy, Debug)]
pub struct BrushEntry {
    /// Arena reference of the source brush.
    pub index: CompactIndex,
    /// Position of this brush in the node array.
    pub node: u32,
    /// Boolean operation of the brush.
    pub operation: Operation,
    /// Brush-mesh id.
    pub mesh_id: i32,
}

/// A flattened, pruned snapshot of one document tree.
///
/// The snapshot borrows nothing from the hierarchy; it stays coherent while
/// the arena is mutated, and is rebuilt at the start of any cycle whose tree
/// carries a hierarchy change.
#[derive(Clone, Debug, Default)]
pub struct CompactTree {
    nodes: Vec<CompactNode>,
    brushes: Vec<BrushEntry>,
    /// One flat array of ancestor positions; each brush owns one run.
    ancestors: Vec<u32>,
    /// Per brush (same order as `brushes`): `(offset, length)` of its run
    /// in `ancestors`. The run lists branch ancestors nearest first,
    /// excluding the root.
    ancestor_runs: Vec<(u32, u32)>,
    /// Arena slot of each included brush, mapped to its composition order.
    brush_order: HashMap<u32, u32>,
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "compact-tree sizes fit in u32 by construction"
)]
const fn as_u32(n: usize) -> u32 {
    n as u32
}

impl CompactTree {
    /// Flattens the live tree rooted in `hierarchy`.
    ///
    /// Returns an empty snapshot for an arena without a root.
    #[must_use]
    pub fn build(hierarchy: &Hierarchy) -> Self {
        let mut tree = Self::default();
        let root = hierarchy.root();
        if !root.is_valid() {
            return tree;
        }

        // Breadth-first: (source node, parent position in `nodes`).
        let mut queue: Vec<(CompactIndex, u32)> = Vec::new();
        let mut head = 0;
        queue.push((root, INVALID));

        while head < queue.len() {
            let (index, parent) = queue[head];
            head += 1;

            let position = as_u32(tree.nodes.len());
            let kind = hierarchy.kind(index).unwrap_or(NodeKind::Branch);
            let operation = hierarchy.operation(index).unwrap_or_default();
            tree.nodes.push(CompactNode {
                index,
                kind,
                operation,
                parent,
                child_offset: 0,
                child_count: 0,
            });

            if kind == NodeKind::Brush {
                let order = as_u32(tree.brushes.len());
                tree.brushes.push(BrushEntry {
                    index,
                    node: position,
                    operation,
                    mesh_id: hierarchy.mesh(index).unwrap_or(0),
                });
                tree.brush_order.insert(index.index(), order);
                tree.push_ancestor_run(parent);
            } else {
                // Breadth-first order makes queue position and node-array
                // position coincide, so the children being enqueued now
                // form a contiguous run starting at the current tail.
                let child_offset = as_u32(queue.len());
                // A leading run of non-base children combines against empty
                // space and produces nothing; prune it with its subtrees.
                let mut base_seen = false;
                for child in hierarchy.children(index) {
                    let base = hierarchy
                        .operation(child)
                        .unwrap_or_default()
                        .is_base();
                    if !base_seen && !base {
                        continue;
                    }
                    base_seen = true;
                    queue.push((child, position));
                }
                let node = &mut tree.nodes[position as usize];
                node.child_offset = child_offset;
                node.child_count = as_u32(queue.len()) - child_offset;
            }
        }
        tree
    }

    fn push_ancestor_run(&mut self, mut cursor: u32) {
        let offset = as_u32(self.ancestors.len());
        while cursor != INVALID && self.nodes[cursor as usize].parent != INVALID {
            self.ancestors.push(cursor);
            cursor = self.nodes[cursor as usize].parent;
        }
        self.ancestor_runs
            .push((offset, as_u32(self.ancestors.len()) - offset));
    }

    /// Returns whether the snapshot contains no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the flattened node array, breadth-first.
    #[must_use]
    pub fn nodes(&self) -> &[CompactNode] {
        &self.nodes
    }

    /// Returns the included brushes in composition order.
    #[must_use]
    pub fn brushes(&self) -> &[BrushEntry] {
        &self.brushes
    }

    /// Returns the composition order of a brush, or `None` if the brush was
    /// pruned or is not part of this tree.
    #[must_use]
    pub fn order_of(&self, brush: CompactIndex) -> Option<u32> {
        let order = *self.brush_order.get(&brush.index())?;
        (self.brushes[order as usize].index == brush).then_some(order)
    }

    /// Returns the node-array positions of a brush's branch ancestors,
    /// nearest first, excluding the tree root.
    #[must_use]
    pub fn ancestors_of(&self, order: u32) -> &[u32] {
        let (offset, length) = self.ancestor_runs[order as usize];
        &self.ancestors[offset as usize..(offset + length) as usize]
    }

    /// Returns the retained children of the node at `position`, as a slice
    /// of the node array.
    #[must_use]
    pub fn children_of(&self, position: u32) -> &[CompactNode] {
        let node = &self.nodes[position as usize];
        let start = node.child_offset as usize;
        &self.nodes[start..start + node.child_count as usize]
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;
    use crate::node::Operation::{Additive, Intersecting, Subtractive};

    #[test]
    fn empty_arena_builds_empty_snapshot() {
        let h = Hierarchy::new(0);
        let tree = CompactTree::build(&h);
        assert!(tree.is_empty());
        assert!(tree.brushes().is_empty());
    }

    #[test]
    fn brushes_appear_in_breadth_first_order() {
        let mut h = Hierarchy::with_root(1, 0);
        let root = h.root();
        let branch = h.create_branch(Additive, 0);
        let a = h.create_brush(Additive, 0, 1);
        let b = h.create_brush(Additive, 0, 2);
        let c = h.create_brush(Additive, 0, 3);
        h.attach(root, a).unwrap();
        h.attach(root, branch).unwrap();
        h.attach(branch, b).unwrap();
        h.attach(root, c).unwrap();

        let tree = CompactTree::build(&h);
        let meshes: Vec<i32> = tree.brushes().iter().map(|e| e.mesh_id).collect();
        // Siblings of the root before the nested brush.
        assert_eq!(meshes, [1, 3, 2]);
        assert_eq!(tree.order_of(a), Some(0));
        assert_eq!(tree.order_of(b), Some(2));
    }

    #[test]
    fn leading_non_base_children_are_pruned() {
        let mut h = Hierarchy::with_root(1, 0);
        let root = h.root();
        let cut = h.create_brush(Subtractive, 0, 1);
        let base = h.create_brush(Additive, 0, 2);
        let late_cut = h.create_brush(Intersecting, 0, 3);
        h.attach(root, cut).unwrap();
        h.attach(root, base).unwrap();
        h.attach(root, late_cut).unwrap();

        let tree = CompactTree::build(&h);
        let meshes: Vec<i32> = tree.brushes().iter().map(|e| e.mesh_id).collect();
        // The leading subtractive contributes nothing; the one after a base
        // sibling stays.
        assert_eq!(meshes, [2, 3]);
        assert_eq!(tree.order_of(cut), None);
    }

    #[test]
    fn pruning_drops_the_whole_leading_subtree() {
        let mut h = Hierarchy::with_root(1, 0);
        let root = h.root();
        let cut_branch = h.create_branch(Subtractive, 0);
        let inner = h.create_brush(Additive, 0, 9);
        let base = h.create_brush(Additive, 0, 2);
        h.attach(root, cut_branch).unwrap();
        h.attach(cut_branch, inner).unwrap();
        h.attach(root, base).unwrap();

        let tree = CompactTree::build(&h);
        assert_eq!(tree.brushes().len(), 1);
        assert_eq!(tree.order_of(inner), None);
    }

    #[test]
    fn ancestor_table_excludes_root_and_brush() {
        let mut h = Hierarchy::with_root(1, 0);
        let root = h.root();
        let outer = h.create_branch(Additive, 0);
        let inner = h.create_branch(Additive, 0);
        let brush = h.create_brush(Additive, 0, 1);
        h.attach(root, outer).unwrap();
        h.attach(outer, inner).unwrap();
        h.attach(inner, brush).unwrap();

        let tree = CompactTree::build(&h);
        let order = tree.order_of(brush).unwrap();
        let chain = tree.ancestors_of(order);
        assert_eq!(chain.len(), 2, "two branch ancestors, no root");
        assert_eq!(tree.nodes()[chain[0] as usize].index, inner);
        assert_eq!(tree.nodes()[chain[1] as usize].index, outer);
    }

    #[test]
    fn child_runs_are_contiguous() {
        let mut h = Hierarchy::with_root(1, 0);
        let root = h.root();
        let branch = h.create_branch(Additive, 0);
        let a = h.create_brush(Additive, 0, 1);
        let b = h.create_brush(Additive, 0, 2);
        let c = h.create_brush(Additive, 0, 3);
        h.attach(root, a).unwrap();
        h.attach(root, branch).unwrap();
        h.attach(branch, b).unwrap();
        h.attach(branch, c).unwrap();

        let tree = CompactTree::build(&h);
        let root_children = tree.children_of(0);
        assert_eq!(root_children.len(), 2);
        assert_eq!(root_children[0].index, a);
        assert_eq!(root_children[1].index, branch);

        let branch_node = tree
            .nodes()
            .iter()
            .position(|n| n.index == branch)
            .unwrap();
        #[expect(clippy::cast_possible_truncation, reason = "test sizes are tiny")]
        let branch_children = tree.children_of(branch_node as u32);
        assert_eq!(branch_children.len(), 2);
        assert_eq!(branch_children[0].index, b);
        assert_eq!(branch_children[1].index, c);
    }

    #[test]
    fn stale_snapshot_order_lookup_misses_after_reuse() {
        let mut h = Hierarchy::with_root(1, 0);
        let root = h.root();
        let brush = h.create_brush(Additive, 0, 1);
        h.attach(root, brush).unwrap();
        let tree = CompactTree::build(&h);

        h.delete(brush).unwrap();
        let replacement = h.create_brush(Additive, 0, 2);
        h.attach(root, replacement).unwrap();

        // Same slot, new generation: the old snapshot must not claim it.
        assert_eq!(tree.order_of(replacement), None);
    }
}
