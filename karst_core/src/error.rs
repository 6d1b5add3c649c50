// Copyright 2026 the Karst Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error taxonomy for hierarchy and allocator operations.
//!
//! Every failure here is local and recoverable: a rejected mutation leaves
//! the structure exactly as it was (no partial edits), and the caller
//! decides whether to retry, skip, or surface the error. Nothing in this
//! crate aborts the process over a bad argument.

use core::fmt;

/// A categorized, recoverable failure from a hierarchy or allocator
/// operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeError {
    /// The operation referenced a destroyed, never-allocated, or
    /// wrong-kind node.
    InvalidHandle,
    /// A node was offered as its own child.
    SelfReference,
    /// Attaching would have made a node its own descendant.
    AncestorCycle,
    /// A tree node was offered as a child; trees cannot be nested.
    TreeAsChild,
    /// An insert/remove/access index fell outside the valid range.
    IndexOutOfRange {
        /// The index that was requested.
        index: u32,
        /// The number of elements the index was checked against.
        count: u32,
    },
    /// The same node appeared twice in one bulk operation.
    DuplicateChild,
    /// A detach was requested for a node that has no parent.
    NotAttached,
    /// The range allocator was asked to free a range it never handed out.
    UnknownRange {
        /// Start offset of the unrecognized range.
        offset: u32,
        /// Length of the unrecognized range.
        length: u32,
    },
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHandle => write!(f, "stale or invalid node reference"),
            Self::SelfReference => write!(f, "node cannot be its own child"),
            Self::AncestorCycle => {
                write!(f, "attach would make a node a descendant of itself")
            }
            Self::TreeAsChild => write!(f, "tree nodes cannot be attached as children"),
            Self::IndexOutOfRange { index, count } => {
                write!(f, "index {index} out of range (count {count})")
            }
            Self::DuplicateChild => {
                write!(f, "the same node appears more than once in one bulk operation")
            }
            Self::NotAttached => write!(f, "node has no parent to detach from"),
            Self::UnknownRange { offset, length } => {
                write!(f, "range [{offset}, {}) was never allocated", offset + length)
            }
        }
    }
}

impl core::error::Error for NodeError {}
