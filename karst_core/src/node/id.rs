// Copyright 2026 the Karst Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node identity types.

use core::fmt;

/// Sentinel slot value indicating "no node" in parent/child fields.
pub const INVALID: u32 = u32::MAX;

/// A stable, generation-checked handle to a node in a [`Document`].
///
/// Handles are the only identity exposed across the API boundary. They stay
/// valid across internal compaction and cross-arena moves, and resolve to
/// nothing (rather than aliasing a reused slot) once the node is destroyed.
///
/// Live handle values are `slot + 1`, so the all-zero sentinel
/// [`NodeHandle::INVALID`] never collides with a real node.
///
/// [`Document`]: crate::document::Document
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    pub(crate) value: u32,
    pub(crate) generation: u32,
}

impl NodeHandle {
    /// The invalid handle. Resolves to nothing in every document.
    pub const INVALID: Self = Self {
        value: 0,
        generation: 0,
    };

    /// Returns whether this handle is syntactically valid.
    ///
    /// A `true` result does not mean the node is still alive; use
    /// [`Document`](crate::document::Document) queries for that.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.value != 0
    }

    /// Returns the raw handle value (for diagnostics only).
    #[inline]
    #[must_use]
    pub const fn value(self) -> u32 {
        self.value
    }

    /// Returns the generation counter.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    pub(crate) const fn from_slot(slot: u32, generation: u32) -> Self {
        Self {
            value: slot + 1,
            generation,
        }
    }

    /// Table slot behind this handle. Callers check [`is_valid`](Self::is_valid) first.
    pub(crate) const fn slot(self) -> u32 {
        self.value - 1
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "NodeHandle({}@gen{})", self.value, self.generation)
        } else {
            write!(f, "NodeHandle(invalid)")
        }
    }
}

/// A dense slot reference inside one specific [`Hierarchy`] arena.
///
/// Unlike [`NodeHandle`], a `CompactIndex` is pinned to an arena and a
/// generation: it goes stale when the node is destroyed *or* moved to a
/// different arena. It is cheap to resolve and is the currency of the
/// compact-tree and dirty-propagation layers.
///
/// [`Hierarchy`]: crate::node::Hierarchy
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompactIndex {
    pub(crate) index: u32,
    pub(crate) generation: u32,
    pub(crate) hierarchy: u32,
}

impl CompactIndex {
    /// The invalid index. Never alive in any arena.
    pub const INVALID: Self = Self {
        index: INVALID,
        generation: 0,
        hierarchy: 0,
    };

    /// Returns whether this index is syntactically valid.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.index != INVALID
    }

    /// Returns the arena slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the generation counter.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Returns the id of the owning hierarchy arena.
    #[inline]
    #[must_use]
    pub const fn hierarchy(self) -> u32 {
        self.hierarchy
    }
}

impl fmt::Debug for CompactIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(
                f,
                "CompactIndex({}@gen{} in h{})",
                self.index, self.generation, self.hierarchy
            )
        } else {
            write!(f, "CompactIndex(invalid)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_handle_is_not_valid() {
        assert!(!NodeHandle::INVALID.is_valid());
        assert!(!CompactIndex::INVALID.is_valid());
    }

    #[test]
    fn slot_zero_round_trips() {
        let handle = NodeHandle::from_slot(0, 1);
        assert!(handle.is_valid());
        assert_eq!(handle.slot(), 0);
        assert_eq!(handle.generation(), 1);
    }
}
