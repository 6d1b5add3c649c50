// Copyright 2026 the Karst Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Handle table mapping stable external handles to arena slots.
//!
//! The table is the one indirection between user-facing [`NodeHandle`]s and
//! the [`CompactIndex`] a node currently occupies. Compaction and
//! cross-arena moves repoint the table entry; the handle itself never
//! changes. Destroyed slots are recycled LIFO to keep the table compact
//! under churn, and a generation counter per slot makes dangling handles
//! resolve to nothing instead of aliasing the reused slot.

use alloc::vec::Vec;

use super::id::{CompactIndex, NodeHandle};

/// Maps [`NodeHandle`]s to the [`CompactIndex`] each node currently
/// occupies.
#[derive(Clone, Debug, Default)]
pub struct HandleTable {
    target: Vec<CompactIndex>,
    generation: Vec<u32>,
    free_list: Vec<u32>,
}

impl HandleTable {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            target: Vec::new(),
            generation: Vec::new(),
            free_list: Vec::new(),
        }
    }

    /// Allocates a handle pointing at `target`.
    ///
    /// Reuses the most recently freed slot when one exists.
    pub fn allocate(&mut self, target: CompactIndex) -> NodeHandle {
        if let Some(slot) = self.free_list.pop() {
            self.target[slot as usize] = target;
            return NodeHandle::from_slot(slot, self.generation[slot as usize]);
        }
        let slot = u32::try_from(self.target.len()).expect("handle table exceeds u32 slots");
        self.target.push(target);
        // Generations start at 1 so the {0,0} sentinel can never resolve.
        self.generation.push(1);
        NodeHandle::from_slot(slot, 1)
    }

    /// Resolves a handle to the node's current arena location.
    ///
    /// Stale, recycled, and syntactically invalid handles all yield `None`;
    /// resolution never panics.
    #[must_use]
    pub fn resolve(&self, handle: NodeHandle) -> Option<CompactIndex> {
        if !handle.is_valid() {
            return None;
        }
        let slot = handle.slot() as usize;
        if slot >= self.target.len() || self.generation[slot] != handle.generation {
            return None;
        }
        let target = self.target[slot];
        target.is_valid().then_some(target)
    }

    /// Repoints a live handle at a new location.
    ///
    /// Used after compaction or a cross-arena move. Returns `false` (and
    /// changes nothing) if the handle is stale.
    pub fn redirect(&mut self, handle: NodeHandle, target: CompactIndex) -> bool {
        if self.resolve(handle).is_none() {
            return false;
        }
        self.target[handle.slot() as usize] = target;
        true
    }

    /// Recycles a handle's slot, bumping its generation so every copy of
    /// the handle is permanently invalid.
    ///
    /// Returns `false` if the handle was already stale.
    pub fn recycle(&mut self, handle: NodeHandle) -> bool {
        if self.resolve(handle).is_none() {
            return false;
        }
        let slot = handle.slot();
        self.generation[slot as usize] += 1;
        self.target[slot as usize] = CompactIndex::INVALID;
        self.free_list.push(slot);
        true
    }

    /// Returns the number of live handles.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.target.len() - self.free_list.len()
    }
}
