// Copyright 2026 the Karst Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Iterators over the stored hierarchy.

use super::id::{CompactIndex, INVALID};
use super::store::Hierarchy;

/// Iterator over the direct children of a node, in sibling order.
#[derive(Debug)]
pub struct Children<'h> {
    hierarchy: &'h Hierarchy,
    parent: u32,
    cursor: usize,
}

impl<'h> Children<'h> {
    pub(crate) const fn new(hierarchy: &'h Hierarchy, parent: u32) -> Self {
        Self {
            hierarchy,
            parent,
            cursor: 0,
        }
    }

    pub(crate) const fn empty(hierarchy: &'h Hierarchy) -> Self {
        Self {
            hierarchy,
            parent: INVALID,
            cursor: 0,
        }
    }
}

impl Iterator for Children<'_> {
    type Item = CompactIndex;

    fn next(&mut self) -> Option<Self::Item> {
        if self.parent == INVALID {
            return None;
        }
        let list = &self.hierarchy.children[self.parent as usize];
        let slot = *list.get(self.cursor)?;
        self.cursor += 1;
        Some(self.hierarchy.index_at(slot))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.parent == INVALID {
            return (0, Some(0));
        }
        let remaining = self.hierarchy.children[self.parent as usize]
            .len()
            .saturating_sub(self.cursor);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Children<'_> {}

/// Iterator over a node's ancestors, nearest first, ending at the arena
/// root.
#[derive(Debug)]
pub struct Ancestors<'h> {
    hierarchy: &'h Hierarchy,
    cursor: u32,
}

impl<'h> Ancestors<'h> {
    pub(crate) const fn new(hierarchy: &'h Hierarchy, start: u32) -> Self {
        Self {
            hierarchy,
            cursor: start,
        }
    }
}

impl Iterator for Ancestors<'_> {
    type Item = CompactIndex;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == INVALID {
            return None;
        }
        let slot = self.cursor;
        self.cursor = self.hierarchy.parent[slot as usize];
        Some(self.hierarchy.index_at(slot))
    }
}
