// Copyright 2026 the Karst Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core node forest for CSG document trees.
//!
//! `karst_core` provides the bookkeeping side of a constructive-solid-
//! geometry editor: stable handles, compact tree storage, dirty tracking,
//! and update scheduling. It deliberately contains no geometry code; the
//! boolean/meshing engine plugs in behind the
//! [`BooleanEvaluator`](evaluator::BooleanEvaluator) trait. The crate is
//! `no_std` compatible (with `alloc`) and uses array-based struct-of-arrays
//! storage with generational references for cache-friendly traversal.
//!
//! # Architecture
//!
//! Edits accumulate status flags; an update cycle turns them into the
//! minimal ordered batch of brushes the evaluator must recompute:
//!
//! ```text
//!   Document (handles) ──► Hierarchy (arena per tree)
//!                               │ edits set NodeStatus flags
//!                               ▼
//!   run_cycle ──► CompactTree::build ──► find_modified_brushes
//!                                              │ ordered batch
//!                                              ▼
//!   BooleanEvaluator::evaluate ──► touching sets ──► TouchesCache
//! ```
//!
//! **[`document`]** — [`Document`](document::Document), the handle-based
//! API surface: creation, attachment, removal, destruction, queries, and
//! cross-tree subtree moves with atomic handle redirection.
//!
//! **[`node`]** — Struct-of-arrays node arenas with generational
//! [`CompactIndex`](node::CompactIndex) references, structural invariant
//! enforcement, and traversal iterators.
//!
//! **[`status`]** — Per-node dirty flags and their escalation rules.
//!
//! **[`compact`]** — Flattened, pruned per-tree snapshots with the
//! per-brush ancestor table used for evaluation ordering.
//!
//! **[`update`]** — Dirty propagation: flag escalation plus one-step
//! expansion through the cached brush-touching graph.
//!
//! **[`scheduler`]** — The per-tree update cycle, whole ([`run_cycle`])
//! and in pieces for custom drivers.
//!
//! **[`evaluator`]** — The [`BooleanEvaluator`](evaluator::BooleanEvaluator)
//! trait geometry engines implement.
//!
//! **[`range`]** — Free-list interval allocator for packed per-node
//! buffers; independent of the hierarchy.
//!
//! **[`transform`]** — 3D affine transform type for brush positioning.
//!
//! **[`trace`]** — [`TraceSink`](trace::TraceSink) trait and event types
//! for cycle instrumentation, with zero-overhead
//! [`Tracer`](trace::Tracer) wrapper.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one
//!   branch per call site).
//!
//! [`run_cycle`]: scheduler::run_cycle

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod compact;
pub mod document;
pub mod error;
pub mod evaluator;
pub mod node;
pub mod range;
pub mod scheduler;
pub mod status;
pub mod trace;
pub mod transform;
pub mod update;
