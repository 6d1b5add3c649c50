// Copyright 2026 the Karst Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The handle-based API surface tying everything together.
//!
//! A [`Document`] owns one arena per tree plus a *detached arena* (id 0)
//! where freshly created and removed nodes live. Callers only ever hold
//! [`NodeHandle`]s; the document maps them to arena slots through a
//! generation-checked table, so handles stay valid across slot reuse and
//! cross-tree moves.
//!
//! Attaching a node under a parent in a different arena moves the node's
//! whole subtree into the parent's arena first. The handles of every moved
//! node are redirected in the same call, so from the caller's point of view
//! the parent and owning tree change atomically.

use alloc::vec::Vec;

use hashbrown::HashSet;

use crate::error::NodeError;
use crate::evaluator::BooleanEvaluator;
use crate::node::{CompactIndex, HandleTable, Hierarchy, INVALID, NodeHandle, NodeKind, Operation};
use crate::scheduler::{CycleReport, TreeCache, run_cycle};
use crate::status::NodeStatus;
use crate::trace::Tracer;
use crate::transform::Transform3d;

/// Arena id of the detached arena.
const DETACHED: u32 = 0;

/// A forest of CSG trees addressed through stable handles.
#[derive(Debug)]
pub struct Document {
    handles: HandleTable,
    /// Arena 0 is the detached arena; every later arena holds one tree.
    hierarchies: Vec<Hierarchy>,
    /// One cache per arena, index-parallel with `hierarchies`. The entry
    /// for the detached arena is never used.
    caches: Vec<TreeCache>,
}

/// One tree's mutable state, borrowed out of a document for an update
/// cycle. Distinct trees borrow disjoint state, so cycles for different
/// trees can run concurrently.
#[derive(Debug)]
pub struct TreeCycle<'d> {
    /// The tree's arena.
    pub hierarchy: &'d mut Hierarchy,
    /// The tree's persistent cycle state.
    pub cache: &'d mut TreeCache,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeCycle<'_> {
    /// Live brushes in this tree; drivers sort descending on this so the
    /// largest workloads start first.
    #[must_use]
    pub fn brush_count(&self) -> u32 {
        self.hierarchy.brush_count()
    }

    /// Runs this tree's update cycle.
    pub fn run(
        &mut self,
        evaluator: &dyn BooleanEvaluator,
        tracer: &mut Tracer<'_>,
    ) -> Option<CycleReport> {
        run_cycle(self.hierarchy, self.cache, evaluator, tracer)
    }
}

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handles: HandleTable::default(),
            hierarchies: alloc::vec![Hierarchy::new(DETACHED)],
            caches: alloc::vec![TreeCache::new()],
        }
    }

    // -- Creation --

    /// Creates a new tree and returns the handle of its root.
    pub fn create_tree(&mut self, user_id: i32) -> NodeHandle {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "arena counts fit in u32 by construction"
        )]
        let id = self.hierarchies.len() as u32;
        let hierarchy = Hierarchy::with_root(id, user_id);
        let root = hierarchy.root();
        self.hierarchies.push(hierarchy);
        self.caches.push(TreeCache::new());
        self.bind(root)
    }

    /// Creates a detached branch node.
    pub fn create_branch(&mut self, operation: Operation, user_id: i32) -> NodeHandle {
        let index = self.hierarchies[0].create_branch(operation, user_id);
        self.bind(index)
    }

    /// Creates a detached brush node.
    pub fn create_brush(&mut self, operation: Operation, user_id: i32, mesh_id: i32) -> NodeHandle {
        let index = self.hierarchies[0].create_brush(operation, user_id, mesh_id);
        self.bind(index)
    }

    fn bind(&mut self, index: CompactIndex) -> NodeHandle {
        let handle = self.handles.allocate(index);
        self.hierarchies[index.hierarchy() as usize].bind_handle(index, handle);
        handle
    }

    // -- Resolution --

    /// Resolves a handle to its current arena slot, or `None` if the node
    /// was destroyed.
    #[must_use]
    pub fn resolve(&self, handle: NodeHandle) -> Option<CompactIndex> {
        let index = self.handles.resolve(handle)?;
        let hierarchy = self.hierarchies.get(index.hierarchy() as usize)?;
        hierarchy.is_alive(index).then_some(index)
    }

    /// Returns whether the handle still refers to a live node.
    #[must_use]
    pub fn is_alive(&self, handle: NodeHandle) -> bool {
        self.resolve(handle).is_some()
    }

    /// Number of live nodes across all arenas.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.handles.live_count()
    }

    fn arena(&self, index: CompactIndex) -> &Hierarchy {
        &self.hierarchies[index.hierarchy() as usize]
    }

    fn arena_mut(&mut self, index: CompactIndex) -> &mut Hierarchy {
        &mut self.hierarchies[index.hierarchy() as usize]
    }

    // -- Queries --

    /// Returns the parent of a node.
    #[must_use]
    pub fn parent(&self, handle: NodeHandle) -> Option<NodeHandle> {
        let index = self.resolve(handle)?;
        let arena = self.arena(index);
        let parent = arena.parent_of(index)?;
        let parent_handle = arena.handle_of(parent);
        parent_handle.is_valid().then_some(parent_handle)
    }

    /// Returns the root handle of the tree owning this node, or `None` for
    /// detached nodes.
    #[must_use]
    pub fn tree_of(&self, handle: NodeHandle) -> Option<NodeHandle> {
        let index = self.resolve(handle)?;
        if index.hierarchy() == DETACHED {
            return None;
        }
        let arena = self.arena(index);
        let root_handle = arena.handle_of(arena.root());
        root_handle.is_valid().then_some(root_handle)
    }

    /// Returns the kind of a node.
    #[must_use]
    pub fn kind(&self, handle: NodeHandle) -> Option<NodeKind> {
        let index = self.resolve(handle)?;
        self.arena(index).kind(index)
    }

    /// Returns the boolean operation of a node.
    #[must_use]
    pub fn operation(&self, handle: NodeHandle) -> Option<Operation> {
        let index = self.resolve(handle)?;
        self.arena(index).operation(index)
    }

    /// Returns the caller-assigned user id of a node.
    #[must_use]
    pub fn user_id(&self, handle: NodeHandle) -> Option<i32> {
        let index = self.resolve(handle)?;
        self.arena(index).user_id(index)
    }

    /// Returns the accumulated status flags of a node.
    #[must_use]
    pub fn dirty(&self, handle: NodeHandle) -> Option<NodeStatus> {
        let index = self.resolve(handle)?;
        self.arena(index).status_of(index)
    }

    /// Returns the number of children of a node.
    #[must_use]
    pub fn child_count(&self, handle: NodeHandle) -> Option<u32> {
        let index = self.resolve(handle)?;
        self.arena(index).child_count(index)
    }

    /// Returns a node's position among its parent's children.
    ///
    /// `None` when the node has no parent, including tree roots. Positions
    /// shift when siblings are inserted or removed, so callers re-query
    /// after any structural edit touching the parent.
    #[must_use]
    pub fn sibling_index_of(&self, handle: NodeHandle) -> Option<u32> {
        let index = self.resolve(handle)?;
        self.arena(index).sibling_index_of(index)
    }

    /// Returns the position of `child` among `parent`'s children.
    #[must_use]
    pub fn index_of(&self, parent: NodeHandle, child: NodeHandle) -> Option<u32> {
        let p = self.resolve(parent)?;
        let c = self.resolve(child)?;
        let arena = self.arena(p);
        (arena.parent_of(c)? == p).then(|| arena.sibling_index_of(c))?
    }

    /// Returns the children of a node as handles, in sibling order.
    #[must_use]
    pub fn children_to_array(&self, handle: NodeHandle) -> Vec<NodeHandle> {
        let Some(index) = self.resolve(handle) else {
            return Vec::new();
        };
        let arena = self.arena(index);
        arena.children(index).map(|c| arena.handle_of(c)).collect()
    }

    /// Number of live nodes in the tree rooted at `tree`, root included.
    #[must_use]
    pub fn tree_node_count(&self, tree: NodeHandle) -> Option<u32> {
        let index = self.resolve(tree)?;
        let arena = self.arena(index);
        (arena.kind(index)? == NodeKind::Tree).then(|| arena.node_count())
    }

    /// Number of live brushes in the tree rooted at `tree`.
    #[must_use]
    pub fn tree_brush_count(&self, tree: NodeHandle) -> Option<u32> {
        let index = self.resolve(tree)?;
        let arena = self.arena(index);
        (arena.kind(index)? == NodeKind::Tree).then(|| arena.brush_count())
    }

    // -- Property edits --

    /// Sets the boolean operation of a node.
    pub fn set_operation(&mut self, handle: NodeHandle, operation: Operation) -> Result<(), NodeError> {
        let index = self.resolve(handle).ok_or(NodeError::InvalidHandle)?;
        self.arena_mut(index).set_operation(index, operation)
    }

    /// Sets the local transform of a node.
    pub fn set_transform(&mut self, handle: NodeHandle, transform: Transform3d) -> Result<(), NodeError> {
        let index = self.resolve(handle).ok_or(NodeError::InvalidHandle)?;
        self.arena_mut(index).set_transform(index, transform)
    }

    /// Sets the brush-mesh id of a brush node.
    pub fn set_mesh(&mut self, handle: NodeHandle, mesh_id: i32) -> Result<(), NodeError> {
        let index = self.resolve(handle).ok_or(NodeError::InvalidHandle)?;
        self.arena_mut(index).set_mesh(index, mesh_id)
    }

    /// Adds status flags by hand (test/diagnostic hook).
    pub fn set_dirty(&mut self, handle: NodeHandle, flags: NodeStatus) -> Result<(), NodeError> {
        let index = self.resolve(handle).ok_or(NodeError::InvalidHandle)?;
        self.arena_mut(index).mark_status(index, flags)
    }

    /// Clears a node's status flags (test/diagnostic hook).
    pub fn clear_dirty(&mut self, handle: NodeHandle) -> Result<(), NodeError> {
        let index = self.resolve(handle).ok_or(NodeError::InvalidHandle)?;
        self.arena_mut(index).clear_status(index)
    }

    // -- Structural edits --

    /// Attaches `child` as the last child of `parent`, moving the child's
    /// subtree into the parent's tree if it lives elsewhere.
    pub fn add(&mut self, parent: NodeHandle, child: NodeHandle) -> Result<(), NodeError> {
        let p = self.resolve(parent).ok_or(NodeError::InvalidHandle)?;
        let count = self.arena(p).child_count(p).ok_or(NodeError::InvalidHandle)?;
        self.insert(parent, count, child)
    }

    /// Attaches `child` under `parent` at `position` among its children.
    ///
    /// All preconditions are checked before anything moves, so a failure
    /// leaves both trees untouched. See [`Hierarchy::attach_at`] for the
    /// error taxonomy.
    pub fn insert(
        &mut self,
        parent: NodeHandle,
        position: u32,
        child: NodeHandle,
    ) -> Result<(), NodeError> {
        let p = self.resolve(parent).ok_or(NodeError::InvalidHandle)?;
        let c = self.resolve(child).ok_or(NodeError::InvalidHandle)?;
        self.check_attachable(p, c, position)?;
        // Leaving another arena: cut the old edge there first so the old
        // tree sees the departure, then bring the subtree over.
        if c.hierarchy() != p.hierarchy() && self.arena(c).parent_of(c).is_some() {
            self.arena_mut(c).detach(c)?;
        }
        let c = self.adopt(p.hierarchy(), c);
        self.arena_mut(p).attach_at(p, position, c)
    }

    /// Attaches several children under `parent` starting at `position`, in
    /// slice order. Fails without mutation if any child fails the
    /// preconditions or appears twice ([`NodeError::DuplicateChild`]).
    pub fn insert_range(
        &mut self,
        parent: NodeHandle,
        position: u32,
        children: &[NodeHandle],
    ) -> Result<(), NodeError> {
        let p = self.resolve(parent).ok_or(NodeError::InvalidHandle)?;
        let mut seen: HashSet<NodeHandle> = HashSet::with_capacity(children.len());
        for &child in children {
            let c = self.resolve(child).ok_or(NodeError::InvalidHandle)?;
            self.check_attachable(p, c, position)?;
            if !seen.insert(child) {
                return Err(NodeError::DuplicateChild);
            }
        }
        for (offset, &child) in children.iter().enumerate() {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "child counts fit in u32 by construction"
            )]
            let at = position + offset as u32;
            self.insert(parent, at, child)?;
        }
        Ok(())
    }

    /// Everything that can be rejected before any arena is mutated.
    fn check_attachable(
        &self,
        parent: CompactIndex,
        child: CompactIndex,
        position: u32,
    ) -> Result<(), NodeError> {
        if parent == child {
            return Err(NodeError::SelfReference);
        }
        let parent_arena = self.arena(parent);
        if self.arena(child).kind(child) == Some(NodeKind::Tree) {
            return Err(NodeError::TreeAsChild);
        }
        if child.hierarchy() == parent.hierarchy() && parent_arena.is_descendant_of(parent, child) {
            return Err(NodeError::AncestorCycle);
        }
        let count = parent_arena
            .child_count(parent)
            .ok_or(NodeError::InvalidHandle)?;
        // Same-arena re-attachment only shuffles, so one extra slot is not
        // needed; a foreign child appends, making `count` the last slot.
        if position > count {
            return Err(NodeError::IndexOutOfRange {
                index: position,
                count,
            });
        }
        Ok(())
    }

    /// Detaches the child at `position` under `parent` and parks its
    /// subtree in the detached arena. Returns the child's handle.
    pub fn remove_at(&mut self, parent: NodeHandle, position: u32) -> Result<NodeHandle, NodeError> {
        let p = self.resolve(parent).ok_or(NodeError::InvalidHandle)?;
        let arena_id = p.hierarchy();
        let child = self.hierarchies[arena_id as usize].detach_at(p, position)?;
        self.invalidate_neighbors(child);
        let parked = self.adopt(DETACHED, child);
        Ok(self.hierarchies[0].handle_of(parked))
    }

    /// Removes `count` consecutive children starting at `position`.
    pub fn remove_range(
        &mut self,
        parent: NodeHandle,
        position: u32,
        count: u32,
    ) -> Result<(), NodeError> {
        let p = self.resolve(parent).ok_or(NodeError::InvalidHandle)?;
        let have = self.arena(p).child_count(p).ok_or(NodeError::InvalidHandle)?;
        match position.checked_add(count) {
            Some(end) if end <= have => {}
            _ => {
                return Err(NodeError::IndexOutOfRange {
                    index: position.saturating_add(count),
                    count: have,
                });
            }
        }
        for _ in 0..count {
            self.remove_at(parent, position)?;
        }
        Ok(())
    }

    /// Removes every child of `parent`.
    pub fn clear(&mut self, parent: NodeHandle) -> Result<(), NodeError> {
        let p = self.resolve(parent).ok_or(NodeError::InvalidHandle)?;
        let count = self.arena(p).child_count(p).ok_or(NodeError::InvalidHandle)?;
        self.remove_range(parent, 0, count)
    }

    /// Destroys a node and its whole subtree. Handles of destroyed nodes
    /// become permanently invalid.
    pub fn destroy(&mut self, handle: NodeHandle) -> Result<(), NodeError> {
        let index = self.resolve(handle).ok_or(NodeError::InvalidHandle)?;
        self.invalidate_neighbors(index);
        let arena_id = index.hierarchy() as usize;
        let removed = self.hierarchies[arena_id].delete_recursive(index)?;
        for dead in removed {
            if dead.is_valid() {
                self.handles.recycle(dead);
            }
        }
        Ok(())
    }

    /// Destroys every handle in the batch, skipping ones already dead.
    /// Returns how many were destroyed.
    pub fn destroy_batch(&mut self, handles: &[NodeHandle]) -> u32 {
        let mut destroyed = 0;
        for &handle in handles {
            if self.destroy(handle).is_ok() {
                destroyed += 1;
            }
        }
        destroyed
    }

    /// The touching cache is one cycle behind: brushes that overlapped a
    /// node leaving the tree must re-evaluate even though nothing about
    /// them changed directly. The departing node may be a whole subtree,
    /// so every brush under it has its recorded neighbors marked.
    fn invalidate_neighbors(&mut self, index: CompactIndex) {
        let arena_id = index.hierarchy() as usize;
        for slot in self.hierarchies[arena_id].collect_subtree_slots(index.index()) {
            let node = self.hierarchies[arena_id].index_at(slot);
            let neighbors: Vec<CompactIndex> = self.caches[arena_id]
                .touches
                .touching_of(node)
                .to_vec();
            for neighbor in neighbors {
                let _ =
                    self.hierarchies[arena_id].mark_status(neighbor, NodeStatus::HIERARCHY_MODIFIED);
            }
            self.caches[arena_id].touches.forget(node);
        }
    }

    /// Moves the subtree rooted at `node` (which must be parentless) into
    /// arena `dst`, redirecting every moved handle. Returns the subtree
    /// root's new index.
    fn adopt(&mut self, dst: u32, node: CompactIndex) -> CompactIndex {
        if node.hierarchy() == dst {
            return node;
        }
        let src = node.hierarchy() as usize;
        let dst_id = dst as usize;

        let (source, target) = two_arenas(&mut self.hierarchies, src, dst_id);
        let slots = source.collect_subtree_slots(node.index());
        let mut mapped: Vec<(u32, u32)> = Vec::with_capacity(slots.len());
        for &slot in &slots {
            mapped.push((slot, target.clone_record_from(source, slot)));
        }
        let lookup = |old: u32| -> u32 {
            mapped
                .iter()
                .find(|&&(from, _)| from == old)
                .map(|&(_, to)| to)
                .unwrap_or(INVALID)
        };
        // Rewire the copied topology; the subtree root stays parentless
        // until the caller attaches it.
        for &(old, new) in &mapped {
            let children: Vec<u32> = source.children[old as usize]
                .iter()
                .map(|&c| lookup(c))
                .collect();
            for &c in &children {
                target.parent[c as usize] = new;
            }
            target.children[new as usize] = children;
        }

        let mut root_index = CompactIndex::INVALID;
        for &(old, new) in &mapped {
            let handle = target.handle[new as usize];
            let new_index = target.index_at(new);
            if handle.is_valid() {
                self.handles.redirect(handle, new_index);
            }
            if old == node.index() {
                root_index = new_index;
            }
        }
        for &(old, _) in &mapped {
            let old_index = self.hierarchies[src].index_at(old);
            self.caches[src].touches.forget(old_index);
            self.hierarchies[src].recycle_slot(old);
        }
        root_index
    }

    // -- Update cycles --

    /// Runs the update cycle of every tree, serially, and returns one
    /// report per tree that did work.
    pub fn update(
        &mut self,
        evaluator: &dyn BooleanEvaluator,
        tracer: &mut Tracer<'_>,
    ) -> Vec<CycleReport> {
        let mut reports = Vec::new();
        for mut cycle in self.cycles_mut() {
            if let Some(report) = cycle.run(evaluator, tracer) {
                reports.push(report);
            }
        }
        reports
    }

    /// Borrows every tree's cycle state, skipping the detached arena.
    /// Drivers collect these to schedule trees across threads.
    pub fn cycles_mut(&mut self) -> impl Iterator<Item = TreeCycle<'_>> {
        self.hierarchies[1..]
            .iter_mut()
            .zip(&mut self.caches[1..])
            .map(|(hierarchy, cache)| TreeCycle { hierarchy, cache })
    }
}

fn two_arenas(arenas: &mut [Hierarchy], a: usize, b: usize) -> (&mut Hierarchy, &mut Hierarchy) {
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = arenas.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = arenas.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}
