// Copyright 2026 the Karst Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Struct-of-arrays node storage with allocation, topology, and status
//! management.
//!
//! Nodes are addressed by [`CompactIndex`] references. Internally, each node
//! occupies a slot in parallel arrays. Destroyed nodes are recycled via a
//! LIFO free list, and a generation counter per slot makes stale references
//! resolve to nothing rather than aliasing a reused slot.
//!
//! Every mutation either succeeds completely or returns a categorized
//! [`NodeError`] with the structure untouched.

use alloc::vec::Vec;

use crate::error::NodeError;
use crate::status::NodeStatus;
use crate::transform::Transform3d;

use super::id::{CompactIndex, INVALID, NodeHandle};
use super::traverse::{Ancestors, Children};

/// What role a node plays in the composition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Root of one document tree; cannot be nested.
    Tree,
    /// Interior grouping node combining its children under one operation.
    Branch,
    /// Leaf node contributing one convex solid.
    Brush,
}

/// Boolean operation applied when a node's geometry joins the composition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Union with the result accumulated so far.
    #[default]
    Additive,
    /// Difference from the result accumulated so far.
    Subtractive,
    /// Intersection with the result accumulated so far.
    Intersecting,
    /// Replaces the result accumulated so far.
    Copy,
}

impl Operation {
    /// Whether geometry with this operation can start a composition.
    ///
    /// Subtracting or intersecting against nothing produces nothing, so a
    /// leading run of non-base siblings contributes no geometry.
    #[inline]
    #[must_use]
    pub const fn is_base(self) -> bool {
        matches!(self, Self::Additive | Self::Copy)
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "arena slot counts fit in u32 by construction"
)]
const fn as_u32(n: usize) -> u32 {
    n as u32
}

/// Struct-of-arrays storage for the nodes of one tree document.
///
/// A hierarchy with a `Tree` root holds one document tree; the hierarchy
/// with id 0 is the detached arena where freshly created nodes live until
/// they are attached under a tree.
#[derive(Clone, Debug)]
pub struct Hierarchy {
    pub(crate) id: u32,

    // -- Topology --
    pub(crate) kind: Vec<NodeKind>,
    pub(crate) operation: Vec<Operation>,
    pub(crate) parent: Vec<u32>,
    pub(crate) children: Vec<Vec<u32>>,

    // -- Payload --
    pub(crate) user_id: Vec<i32>,
    pub(crate) mesh_id: Vec<i32>,
    pub(crate) local_transform: Vec<Transform3d>,
    pub(crate) world_transform: Vec<Transform3d>,
    pub(crate) status: Vec<NodeStatus>,
    pub(crate) handle: Vec<NodeHandle>,

    // -- Allocation --
    pub(crate) generation: Vec<u32>,
    pub(crate) free_list: Vec<u32>,
    pub(crate) len: u32,

    pub(crate) root: u32,
    pub(crate) brushes: u32,
    pub(crate) pending: bool,
}

impl Hierarchy {
    /// Creates an empty arena with no root (a detached arena).
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self {
            id,
            kind: Vec::new(),
            operation: Vec::new(),
            parent: Vec::new(),
            children: Vec::new(),
            user_id: Vec::new(),
            mesh_id: Vec::new(),
            local_transform: Vec::new(),
            world_transform: Vec::new(),
            status: Vec::new(),
            handle: Vec::new(),
            generation: Vec::new(),
            free_list: Vec::new(),
            len: 0,
            root: INVALID,
            brushes: 0,
            pending: false,
        }
    }

    /// Creates an arena owning one document tree, with its `Tree` root
    /// already allocated.
    #[must_use]
    pub fn with_root(id: u32, user_id: i32) -> Self {
        let mut hierarchy = Self::new(id);
        let slot = hierarchy.alloc_slot(NodeKind::Tree, Operation::Additive, user_id, 0);
        hierarchy.root = slot;
        hierarchy
    }

    /// Returns this arena's id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Returns the `Tree` root, or [`CompactIndex::INVALID`] for a
    /// detached arena.
    #[must_use]
    pub fn root(&self) -> CompactIndex {
        if self.root == INVALID {
            CompactIndex::INVALID
        } else {
            self.index_at(self.root)
        }
    }

    /// Returns the number of live nodes in the arena.
    #[must_use]
    pub fn node_count(&self) -> u32 {
        self.len - as_u32(self.free_list.len())
    }

    /// Returns the number of live brushes in the arena.
    #[inline]
    #[must_use]
    pub const fn brush_count(&self) -> u32 {
        self.brushes
    }

    /// Returns whether any node carries uncleared status flags.
    ///
    /// A hierarchy without pending flags can skip its update cycle at zero
    /// cost.
    #[inline]
    #[must_use]
    pub const fn has_pending(&self) -> bool {
        self.pending
    }

    // -- Allocation --

    fn alloc_slot(&mut self, kind: NodeKind, operation: Operation, user_id: i32, mesh_id: i32) -> u32 {
        let slot = if let Some(slot) = self.free_list.pop() {
            let s = slot as usize;
            self.kind[s] = kind;
            self.operation[s] = operation;
            self.parent[s] = INVALID;
            self.children[s].clear();
            self.user_id[s] = user_id;
            self.mesh_id[s] = mesh_id;
            self.local_transform[s] = Transform3d::IDENTITY;
            self.world_transform[s] = Transform3d::IDENTITY;
            self.status[s] = NodeStatus::empty();
            self.handle[s] = NodeHandle::INVALID;
            slot
        } else {
            let slot = self.len;
            self.len += 1;
            self.kind.push(kind);
            self.operation.push(operation);
            self.parent.push(INVALID);
            self.children.push(Vec::new());
            self.user_id.push(user_id);
            self.mesh_id.push(mesh_id);
            self.local_transform.push(Transform3d::IDENTITY);
            self.world_transform.push(Transform3d::IDENTITY);
            self.status.push(NodeStatus::empty());
            self.handle.push(NodeHandle::INVALID);
            self.generation.push(1);
            slot
        };
        if kind == NodeKind::Brush {
            self.brushes += 1;
        }
        slot
    }

    /// Creates a detached brush node.
    ///
    /// The new brush starts with an identity transform and its shape and
    /// transform queued for the next cycle it participates in.
    pub fn create_brush(&mut self, operation: Operation, user_id: i32, mesh_id: i32) -> CompactIndex {
        let slot = self.alloc_slot(NodeKind::Brush, operation, user_id, mesh_id);
        self.status[slot as usize] =
            NodeStatus::SHAPE_MODIFIED | NodeStatus::NEED_TRANSFORM_UPDATE;
        self.pending = true;
        self.index_at(slot)
    }

    /// Creates a detached branch node with no children.
    pub fn create_branch(&mut self, operation: Operation, user_id: i32) -> CompactIndex {
        let slot = self.alloc_slot(NodeKind::Branch, operation, user_id, 0);
        self.index_at(slot)
    }

    /// Returns whether `index` refers to a live node in this arena.
    #[must_use]
    pub fn is_alive(&self, index: CompactIndex) -> bool {
        self.validate(index).is_ok()
    }

    pub(crate) fn index_at(&self, slot: u32) -> CompactIndex {
        CompactIndex {
            index: slot,
            generation: self.generation[slot as usize],
            hierarchy: self.id,
        }
    }

    fn validate(&self, index: CompactIndex) -> Result<usize, NodeError> {
        if index.is_valid()
            && index.hierarchy == self.id
            && index.index < self.len
            && self.generation[index.index as usize] == index.generation
        {
            Ok(index.index as usize)
        } else {
            Err(NodeError::InvalidHandle)
        }
    }

    // -- Read accessors --

    /// Returns the kind of a node.
    #[must_use]
    pub fn kind(&self, index: CompactIndex) -> Option<NodeKind> {
        self.validate(index).ok().map(|s| self.kind[s])
    }

    /// Returns the boolean operation of a node.
    #[must_use]
    pub fn operation(&self, index: CompactIndex) -> Option<Operation> {
        self.validate(index).ok().map(|s| self.operation[s])
    }

    /// Returns the caller-assigned user id of a node.
    #[must_use]
    pub fn user_id(&self, index: CompactIndex) -> Option<i32> {
        self.validate(index).ok().map(|s| self.user_id[s])
    }

    /// Returns the brush-mesh id of a brush node.
    #[must_use]
    pub fn mesh(&self, index: CompactIndex) -> Option<i32> {
        let s = self.validate(index).ok()?;
        (self.kind[s] == NodeKind::Brush).then(|| self.mesh_id[s])
    }

    /// Returns the local transform of a node.
    #[must_use]
    pub fn local_transform(&self, index: CompactIndex) -> Option<Transform3d> {
        self.validate(index).ok().map(|s| self.local_transform[s])
    }

    /// Returns the world transform computed by the last update cycle.
    #[must_use]
    pub fn world_transform(&self, index: CompactIndex) -> Option<Transform3d> {
        self.validate(index).ok().map(|s| self.world_transform[s])
    }

    /// Returns the accumulated status flags of a node.
    #[must_use]
    pub fn status_of(&self, index: CompactIndex) -> Option<NodeStatus> {
        self.validate(index).ok().map(|s| self.status[s])
    }

    /// Returns the parent of a node, if it has one.
    #[must_use]
    pub fn parent_of(&self, index: CompactIndex) -> Option<CompactIndex> {
        let s = self.validate(index).ok()?;
        let p = self.parent[s];
        (p != INVALID).then(|| self.index_at(p))
    }

    /// Returns the number of children of a node.
    #[must_use]
    pub fn child_count(&self, index: CompactIndex) -> Option<u32> {
        self.validate(index)
            .ok()
            .map(|s| as_u32(self.children[s].len()))
    }

    /// Returns the child at `position` among a node's children.
    #[must_use]
    pub fn child_at(&self, index: CompactIndex, position: u32) -> Option<CompactIndex> {
        let s = self.validate(index).ok()?;
        self.children[s]
            .get(position as usize)
            .map(|&slot| self.index_at(slot))
    }

    /// Returns a node's position among its parent's children, or `None` if
    /// it has no parent (including the root).
    #[must_use]
    pub fn sibling_index_of(&self, index: CompactIndex) -> Option<u32> {
        let s = self.validate(index).ok()?;
        let p = self.parent[s];
        if p == INVALID {
            return None;
        }
        self.children[p as usize]
            .iter()
            .position(|&slot| slot as usize == s)
            .map(as_u32)
    }

    /// Returns an iterator over the direct children of a node.
    ///
    /// Yields nothing for a stale reference.
    #[must_use]
    pub fn children(&self, index: CompactIndex) -> Children<'_> {
        match self.validate(index) {
            Ok(s) => Children::new(self, as_u32(s)),
            Err(_) => Children::empty(self),
        }
    }

    /// Returns an iterator over a node's ancestors, nearest first.
    #[must_use]
    pub fn ancestors(&self, index: CompactIndex) -> Ancestors<'_> {
        match self.validate(index) {
            Ok(s) => Ancestors::new(self, self.parent[s]),
            Err(_) => Ancestors::new(self, INVALID),
        }
    }

    /// Returns whether `node` is a (transitive) descendant of `ancestor`.
    #[must_use]
    pub fn is_descendant_of(&self, node: CompactIndex, ancestor: CompactIndex) -> bool {
        let (Ok(n), Ok(a)) = (self.validate(node), self.validate(ancestor)) else {
            return false;
        };
        self.slot_has_ancestor(as_u32(n), as_u32(a))
    }

    /// Returns the number of (transitive) descendants of a node.
    #[must_use]
    pub fn descendant_count(&self, index: CompactIndex) -> Option<u32> {
        let s = self.validate(index).ok()?;
        Some(as_u32(self.collect_subtree_slots(as_u32(s)).len()) - 1)
    }

    // -- Topology mutation --

    /// Attaches `child` as the last child of `parent`.
    ///
    /// See [`attach_at`](Self::attach_at) for the failure conditions.
    pub fn attach(&mut self, parent: CompactIndex, child: CompactIndex) -> Result<(), NodeError> {
        let p = self.validate(parent)?;
        let position = as_u32(self.children[p].len());
        self.attach_at(parent, position, child)
    }

    /// Attaches `child` under `parent` at `position` among its children.
    ///
    /// If the child already has a parent it is detached first; sibling
    /// indices stay contiguous on both sides. Parent and child gain
    /// [`NodeStatus::HIERARCHY_MODIFIED`], and the tree root is marked.
    /// Re-attaching a node at the position it already occupies is a
    /// successful no-op that sets no flags.
    ///
    /// Fails without mutation when the child is stale
    /// ([`NodeError::InvalidHandle`]), the child equals the parent
    /// ([`NodeError::SelfReference`]), the parent is a descendant of the
    /// child ([`NodeError::AncestorCycle`]), the child is a tree
    /// ([`NodeError::TreeAsChild`]), or `position` exceeds the child count
    /// ([`NodeError::IndexOutOfRange`]).
    pub fn attach_at(
        &mut self,
        parent: CompactIndex,
        position: u32,
        child: CompactIndex,
    ) -> Result<(), NodeError> {
        let p = self.validate(parent)?;
        let c = self.validate(child)?;
        if p == c {
            return Err(NodeError::SelfReference);
        }
        if self.kind[c] == NodeKind::Tree {
            return Err(NodeError::TreeAsChild);
        }
        if self.slot_has_ancestor(as_u32(p), as_u32(c)) {
            return Err(NodeError::AncestorCycle);
        }

        let count = as_u32(self.children[p].len());
        if position > count {
            return Err(NodeError::IndexOutOfRange {
                index: position,
                count,
            });
        }

        let old_parent = self.parent[c];
        if old_parent == as_u32(p) {
            // Reposition under the same parent.
            let current = self.sibling_index_of(child).unwrap_or(0);
            let adjusted = if position > current { position - 1 } else { position };
            if adjusted == current {
                return Ok(());
            }
            self.children[p].remove(current as usize);
            self.children[p].insert(adjusted as usize, as_u32(c));
        } else {
            if old_parent != INVALID {
                self.unlink_slot(as_u32(c));
                self.status[old_parent as usize] |= NodeStatus::HIERARCHY_MODIFIED;
            }
            self.parent[c] = as_u32(p);
            self.children[p].insert(position as usize, as_u32(c));
        }

        self.status[p] |= NodeStatus::HIERARCHY_MODIFIED;
        self.status[c] |= NodeStatus::HIERARCHY_MODIFIED;
        self.touch_root();
        self.pending = true;
        Ok(())
    }

    /// Detaches `node` from its parent. The node keeps its own children;
    /// only the edge to the former parent is cut.
    ///
    /// Returns [`NodeError::NotAttached`] if the node has no parent.
    pub fn detach(&mut self, node: CompactIndex) -> Result<(), NodeError> {
        let c = self.validate(node)?;
        let p = self.parent[c];
        if p == INVALID {
            return Err(NodeError::NotAttached);
        }
        self.unlink_slot(as_u32(c));
        self.status[p as usize] |= NodeStatus::HIERARCHY_MODIFIED;
        self.status[c] |= NodeStatus::HIERARCHY_MODIFIED;
        self.touch_root();
        self.pending = true;
        Ok(())
    }

    /// Detaches the child at `position` among `parent`'s children and
    /// returns it.
    pub fn detach_at(
        &mut self,
        parent: CompactIndex,
        position: u32,
    ) -> Result<CompactIndex, NodeError> {
        let p = self.validate(parent)?;
        let count = as_u32(self.children[p].len());
        if position >= count {
            return Err(NodeError::IndexOutOfRange {
                index: position,
                count,
            });
        }
        let c = self.children[p][position as usize];
        self.unlink_slot(c);
        self.status[p] |= NodeStatus::HIERARCHY_MODIFIED;
        self.status[c as usize] |= NodeStatus::HIERARCHY_MODIFIED;
        self.touch_root();
        self.pending = true;
        Ok(self.index_at(c))
    }

    /// Deletes `node`, recycling its slot.
    ///
    /// Direct children become parentless but remain valid, addressable
    /// nodes, so callers may re-parent them before cleanup.
    pub fn delete(&mut self, node: CompactIndex) -> Result<(), NodeError> {
        let c = self.validate(node)?;
        if self.parent[c] != INVALID {
            let p = self.parent[c];
            self.unlink_slot(as_u32(c));
            self.status[p as usize] |= NodeStatus::HIERARCHY_MODIFIED;
        }
        let orphans = core::mem::take(&mut self.children[c]);
        for slot in orphans {
            self.parent[slot as usize] = INVALID;
            self.status[slot as usize] |= NodeStatus::HIERARCHY_MODIFIED;
        }
        self.recycle_slot(as_u32(c));
        self.touch_root();
        self.pending = true;
        Ok(())
    }

    /// Deletes `node` and every descendant, returning the handles of all
    /// deleted nodes so the owning document can recycle them.
    pub fn delete_recursive(&mut self, node: CompactIndex) -> Result<Vec<NodeHandle>, NodeError> {
        let c = self.validate(node)?;
        if self.parent[c] != INVALID {
            let p = self.parent[c];
            self.unlink_slot(as_u32(c));
            self.status[p as usize] |= NodeStatus::HIERARCHY_MODIFIED;
        }
        let slots = self.collect_subtree_slots(as_u32(c));
        let mut handles = Vec::with_capacity(slots.len());
        for slot in slots {
            handles.push(self.handle[slot as usize]);
            self.recycle_slot(slot);
        }
        self.touch_root();
        self.pending = true;
        Ok(handles)
    }

    // -- Property mutation --

    /// Sets the boolean operation of a node.
    ///
    /// Marks the node's shape modified; a no-op when the operation is
    /// unchanged.
    pub fn set_operation(&mut self, index: CompactIndex, operation: Operation) -> Result<(), NodeError> {
        let s = self.validate(index)?;
        if self.operation[s] == operation {
            return Ok(());
        }
        self.operation[s] = operation;
        self.status[s] |= NodeStatus::SHAPE_MODIFIED;
        self.pending = true;
        Ok(())
    }

    /// Sets the local transform of a node.
    ///
    /// World transforms are inherited, so the whole subtree is marked for
    /// transform recomputation.
    pub fn set_transform(&mut self, index: CompactIndex, transform: Transform3d) -> Result<(), NodeError> {
        let s = self.validate(index)?;
        self.local_transform[s] = transform;
        for slot in self.collect_subtree_slots(as_u32(s)) {
            self.status[slot as usize] |=
                NodeStatus::TRANSFORMATION_MODIFIED | NodeStatus::NEED_TRANSFORM_UPDATE;
        }
        self.pending = true;
        Ok(())
    }

    /// Sets the brush-mesh id of a brush node.
    ///
    /// Returns [`NodeError::InvalidHandle`] for non-brush nodes, which
    /// cannot carry a mesh.
    pub fn set_mesh(&mut self, index: CompactIndex, mesh_id: i32) -> Result<(), NodeError> {
        let s = self.validate(index)?;
        if self.kind[s] != NodeKind::Brush {
            return Err(NodeError::InvalidHandle);
        }
        self.mesh_id[s] = mesh_id;
        self.status[s] |= NodeStatus::SHAPE_MODIFIED;
        self.pending = true;
        Ok(())
    }

    /// Adds status flags to a node (diagnostic hook).
    pub fn mark_status(&mut self, index: CompactIndex, flags: NodeStatus) -> Result<(), NodeError> {
        let s = self.validate(index)?;
        self.status[s] |= flags;
        if !flags.is_empty() {
            self.pending = true;
        }
        Ok(())
    }

    /// Clears all status flags of a node (diagnostic hook).
    pub fn clear_status(&mut self, index: CompactIndex) -> Result<(), NodeError> {
        let s = self.validate(index)?;
        self.status[s] = NodeStatus::empty();
        Ok(())
    }

    // -- World transforms --

    /// Computes a node's world transform as the product of its ancestors'
    /// local transforms, root first. Read-only; safe to fan out across
    /// brushes.
    #[must_use]
    pub fn compute_world_transform(&self, index: CompactIndex) -> Option<Transform3d> {
        let s = self.validate(index).ok()?;
        let mut chain = Vec::new();
        let mut cursor = as_u32(s);
        while cursor != INVALID {
            chain.push(cursor);
            cursor = self.parent[cursor as usize];
        }
        let mut world = Transform3d::IDENTITY;
        for slot in chain.into_iter().rev() {
            world = world * self.local_transform[slot as usize];
        }
        Some(world)
    }

    /// Stores a computed world transform.
    pub fn store_world_transform(&mut self, index: CompactIndex, transform: Transform3d) {
        if let Ok(s) = self.validate(index) {
            self.world_transform[s] = transform;
        }
    }

    // -- Internal helpers --

    /// Removes `slot` from its parent's child list and clears its parent
    /// pointer. Subsequent siblings shift down to stay contiguous.
    fn unlink_slot(&mut self, slot: u32) {
        let p = self.parent[slot as usize];
        if p != INVALID {
            self.children[p as usize].retain(|&child| child != slot);
            self.parent[slot as usize] = INVALID;
        }
    }

    fn slot_has_ancestor(&self, slot: u32, ancestor: u32) -> bool {
        let mut cursor = self.parent[slot as usize];
        while cursor != INVALID {
            if cursor == ancestor {
                return true;
            }
            cursor = self.parent[cursor as usize];
        }
        false
    }

    fn touch_root(&mut self) {
        if self.root != INVALID {
            self.status[self.root as usize] |= NodeStatus::HIERARCHY_MODIFIED;
        }
    }

    /// Collects `slot` and all its descendants in depth-first pre-order.
    pub(crate) fn collect_subtree_slots(&self, slot: u32) -> Vec<u32> {
        let mut out = Vec::new();
        let mut stack = Vec::new();
        stack.push(slot);
        while let Some(current) = stack.pop() {
            out.push(current);
            for &child in self.children[current as usize].iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Recycles a slot, bumping its generation so outstanding references
    /// are permanently invalid.
    pub(crate) fn recycle_slot(&mut self, slot: u32) {
        let s = slot as usize;
        if self.kind[s] == NodeKind::Brush {
            self.brushes -= 1;
        }
        if self.root == slot {
            self.root = INVALID;
        }
        self.parent[s] = INVALID;
        self.children[s].clear();
        self.status[s] = NodeStatus::empty();
        self.handle[s] = NodeHandle::INVALID;
        self.generation[s] += 1;
        self.free_list.push(slot);
    }

    /// Copies one node record (payload only, no topology) out of `src`
    /// into this arena, returning the new slot.
    pub(crate) fn clone_record_from(&mut self, src: &Self, slot: u32) -> u32 {
        let s = slot as usize;
        let new_slot = self.alloc_slot(src.kind[s], src.operation[s], src.user_id[s], src.mesh_id[s]);
        let n = new_slot as usize;
        self.local_transform[n] = src.local_transform[s];
        self.world_transform[n] = src.world_transform[s];
        self.status[n] = src.status[s];
        self.handle[n] = src.handle[s];
        if !src.status[s].is_empty() {
            self.pending = true;
        }
        new_slot
    }

    /// Binds the document-level handle backing `index`, used to redirect
    /// handles when the node moves between arenas.
    pub(crate) fn bind_handle(&mut self, index: CompactIndex, handle: NodeHandle) {
        if let Ok(s) = self.validate(index) {
            self.handle[s] = handle;
        }
    }

    /// Returns the document-level handle backing `index`.
    pub(crate) fn handle_of(&self, index: CompactIndex) -> NodeHandle {
        match self.validate(index) {
            Ok(s) => self.handle[s],
            Err(_) => NodeHandle::INVALID,
        }
    }

    /// Clears every status flag in the arena after a completed cycle.
    pub(crate) fn clear_all_status(&mut self) {
        for status in &mut self.status {
            *status = NodeStatus::empty();
        }
        self.pending = false;
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;

    fn tree() -> Hierarchy {
        Hierarchy::with_root(1, 0)
    }

    #[test]
    fn create_and_query() {
        let mut h = tree();
        let brush = h.create_brush(Operation::Additive, 7, 42);
        assert_eq!(h.kind(brush), Some(NodeKind::Brush));
        assert_eq!(h.user_id(brush), Some(7));
        assert_eq!(h.mesh(brush), Some(42));
        assert_eq!(h.parent_of(brush), None);
        assert_eq!(h.brush_count(), 1);
    }

    #[test]
    fn generation_prevents_stale_access() {
        let mut h = tree();
        let old = h.create_brush(Operation::Additive, 0, 1);
        h.delete(old).unwrap();
        let new = h.create_brush(Operation::Additive, 0, 2);

        // Same slot, next generation.
        assert_eq!(new.index(), old.index());
        assert_eq!(new.generation(), old.generation() + 1);
        assert!(!h.is_alive(old));
        assert!(h.is_alive(new));
        assert_eq!(h.mesh(old), None);
    }

    #[test]
    fn attach_rejects_self_reference() {
        let mut h = tree();
        let branch = h.create_branch(Operation::Additive, 0);
        assert_eq!(h.attach(branch, branch), Err(NodeError::SelfReference));
    }

    #[test]
    fn attach_rejects_ancestor_cycle() {
        let mut h = tree();
        let outer = h.create_branch(Operation::Additive, 0);
        let inner = h.create_branch(Operation::Additive, 0);
        h.attach(h.root(), outer).unwrap();
        h.attach(outer, inner).unwrap();

        assert_eq!(h.attach(inner, outer), Err(NodeError::AncestorCycle));
        // Structure unchanged.
        assert_eq!(h.parent_of(outer), Some(h.root()));
        assert_eq!(h.parent_of(inner), Some(outer));
    }

    #[test]
    fn attach_rejects_tree_as_child() {
        let mut h = tree();
        let branch = h.create_branch(Operation::Additive, 0);
        h.attach(h.root(), branch).unwrap();
        let root = h.root();
        assert_eq!(h.attach(branch, root), Err(NodeError::TreeAsChild));
        assert_eq!(h.parent_of(root), None);
    }

    #[test]
    fn attach_rejects_out_of_range_position() {
        let mut h = tree();
        let brush = h.create_brush(Operation::Additive, 0, 1);
        let root = h.root();
        assert_eq!(
            h.attach_at(root, 1, brush),
            Err(NodeError::IndexOutOfRange { index: 1, count: 0 })
        );
    }

    #[test]
    fn sibling_indices_stay_contiguous() {
        let mut h = tree();
        let root = h.root();
        let kids: Vec<CompactIndex> = (0..5)
            .map(|i| {
                let b = h.create_brush(Operation::Additive, i, i);
                h.attach(root, b).unwrap();
                b
            })
            .collect();

        // Remove from the middle, insert at the front.
        h.detach(kids[2]).unwrap();
        h.attach_at(root, 0, kids[4]).unwrap();

        let mut seen: Vec<u32> = h
            .children(root)
            .map(|c| h.sibling_index_of(c).unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, [0, 1, 2, 3], "indices must form a gapless run");
    }

    #[test]
    fn reattach_at_same_position_is_a_noop() {
        let mut h = tree();
        let root = h.root();
        let a = h.create_brush(Operation::Additive, 0, 1);
        let b = h.create_brush(Operation::Additive, 0, 2);
        h.attach(root, a).unwrap();
        h.attach(root, b).unwrap();
        h.clear_all_status();

        // `b` is already the last child; re-appending changes nothing.
        h.attach(root, b).unwrap();
        assert_eq!(h.status_of(b), Some(NodeStatus::empty()));
        assert!(!h.has_pending(), "a positional no-op must not set flags");

        // Repositioning does set flags.
        h.attach_at(root, 0, b).unwrap();
        assert_eq!(h.sibling_index_of(b), Some(0));
        assert!(h.status_of(b).unwrap().contains(NodeStatus::HIERARCHY_MODIFIED));
    }

    #[test]
    fn attach_moves_from_old_parent() {
        let mut h = tree();
        let root = h.root();
        let left = h.create_branch(Operation::Additive, 0);
        let right = h.create_branch(Operation::Additive, 0);
        let brush = h.create_brush(Operation::Additive, 0, 1);
        h.attach(root, left).unwrap();
        h.attach(root, right).unwrap();
        h.attach(left, brush).unwrap();

        h.attach(right, brush).unwrap();
        assert_eq!(h.parent_of(brush), Some(right));
        assert_eq!(h.child_count(left), Some(0));
        assert_eq!(h.child_count(right), Some(1));
    }

    #[test]
    fn detach_preserves_subtree() {
        let mut h = tree();
        let root = h.root();
        let branch = h.create_branch(Operation::Additive, 0);
        let a = h.create_brush(Operation::Additive, 0, 1);
        let b = h.create_brush(Operation::Subtractive, 0, 2);
        h.attach(root, branch).unwrap();
        h.attach(branch, a).unwrap();
        h.attach(branch, b).unwrap();

        h.detach(branch).unwrap();
        assert_eq!(h.parent_of(branch), None);
        assert_eq!(h.parent_of(a), Some(branch), "children stay attached");
        assert_eq!(h.parent_of(b), Some(branch));
        assert_eq!(h.child_count(branch), Some(2));
    }

    #[test]
    fn detach_without_parent_fails() {
        let mut h = tree();
        let brush = h.create_brush(Operation::Additive, 0, 1);
        assert_eq!(h.detach(brush), Err(NodeError::NotAttached));
    }

    #[test]
    fn delete_orphans_children_but_keeps_them_alive() {
        let mut h = tree();
        let root = h.root();
        let branch = h.create_branch(Operation::Additive, 0);
        let a = h.create_brush(Operation::Additive, 0, 1);
        h.attach(root, branch).unwrap();
        h.attach(branch, a).unwrap();

        h.delete(branch).unwrap();
        assert!(!h.is_alive(branch));
        assert!(h.is_alive(a), "orphans stay addressable for re-parenting");
        assert_eq!(h.parent_of(a), None);
    }

    #[test]
    fn delete_recursive_removes_whole_subtree() {
        let mut h = tree();
        let root = h.root();
        let branch = h.create_branch(Operation::Additive, 0);
        let a = h.create_brush(Operation::Additive, 0, 1);
        let b = h.create_brush(Operation::Additive, 0, 2);
        h.attach(root, branch).unwrap();
        h.attach(branch, a).unwrap();
        h.attach(branch, b).unwrap();

        let deleted = h.delete_recursive(branch).unwrap();
        assert_eq!(deleted.len(), 3);
        assert!(!h.is_alive(branch));
        assert!(!h.is_alive(a));
        assert!(!h.is_alive(b));
        assert_eq!(h.brush_count(), 0);
    }

    #[test]
    fn structural_edits_mark_the_tree_root() {
        let mut h = tree();
        let root = h.root();
        let brush = h.create_brush(Operation::Additive, 0, 1);
        h.clear_all_status();

        h.attach(root, brush).unwrap();
        assert!(
            h.status_of(root).unwrap().contains(NodeStatus::HIERARCHY_MODIFIED),
            "the tree ancestor of an edit must be marked dirty"
        );
        assert!(h.has_pending());
    }

    #[test]
    fn set_transform_marks_subtree() {
        let mut h = tree();
        let root = h.root();
        let branch = h.create_branch(Operation::Additive, 0);
        let brush = h.create_brush(Operation::Additive, 0, 1);
        h.attach(root, branch).unwrap();
        h.attach(branch, brush).unwrap();
        h.clear_all_status();

        h.set_transform(branch, Transform3d::from_translation(1.0, 0.0, 0.0))
            .unwrap();
        assert!(
            h.status_of(brush).unwrap().contains(NodeStatus::NEED_TRANSFORM_UPDATE),
            "descendant brushes inherit the transform change"
        );
    }

    #[test]
    fn world_transform_composes_ancestor_chain() {
        let mut h = tree();
        let root = h.root();
        let branch = h.create_branch(Operation::Additive, 0);
        let brush = h.create_brush(Operation::Additive, 0, 1);
        h.attach(root, branch).unwrap();
        h.attach(branch, brush).unwrap();

        h.set_transform(branch, Transform3d::from_translation(10.0, 0.0, 0.0))
            .unwrap();
        h.set_transform(brush, Transform3d::from_translation(0.0, 5.0, 0.0))
            .unwrap();

        let world = h.compute_world_transform(brush).unwrap();
        assert_eq!(world.translation(), [10.0, 5.0, 0.0]);
    }

    #[test]
    fn set_mesh_rejects_non_brush() {
        let mut h = tree();
        let branch = h.create_branch(Operation::Additive, 0);
        assert_eq!(h.set_mesh(branch, 3), Err(NodeError::InvalidHandle));
    }

    #[test]
    fn set_operation_same_value_is_a_noop() {
        let mut h = tree();
        let brush = h.create_brush(Operation::Additive, 0, 1);
        h.clear_all_status();
        h.set_operation(brush, Operation::Additive).unwrap();
        assert!(!h.has_pending());
        h.set_operation(brush, Operation::Subtractive).unwrap();
        assert!(h.status_of(brush).unwrap().contains(NodeStatus::SHAPE_MODIFIED));
    }
}
