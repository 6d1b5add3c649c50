// Copyright 2026 the Karst Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-node status flags driving incremental re-evaluation.
//!
//! Flags accumulate on a node as edits land and are consumed by one update
//! cycle. Only the scheduler clears them, and only after the cycle that
//! observed them completes successfully; a failed or skipped cycle leaves
//! every flag in place for the next attempt.
//!
//! # Escalation
//!
//! During dirty propagation some flags widen into
//! [`NEED_ALL_TOUCHING_UPDATED`](NodeStatus::NEED_ALL_TOUCHING_UPDATED):
//! a brush whose shape, transform, or ancestry changed has also invalidated
//! the cached surfaces of every brush it touches, so those neighbors join
//! the rebuild batch. The expansion is deliberately one level deep — the
//! next cycle's intersection pass discovers any newly created adjacency.

use bitflags::bitflags;

bitflags! {
    /// Edits accumulated on a node since the last completed update cycle.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct NodeStatus: u32 {
        /// The node's own geometry changed (brush mesh or operation).
        const SHAPE_MODIFIED = 1 << 0;
        /// The node's local transform changed.
        const TRANSFORMATION_MODIFIED = 1 << 1;
        /// The node's parent, children, or sibling order changed.
        const HIERARCHY_MODIFIED = 1 << 2;
        /// The node's world transform must be recomputed this cycle.
        const NEED_TRANSFORM_UPDATE = 1 << 3;
        /// Every brush touching this one must be rebuilt as well.
        const NEED_ALL_TOUCHING_UPDATED = 1 << 4;
    }
}
