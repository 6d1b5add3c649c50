// Copyright 2026 the Karst Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The seam between the node forest and the geometry engine.
//!
//! Karst tracks *which* brushes need boolean re-evaluation and in what
//! order; it never computes geometry itself. A [`BooleanEvaluator`]
//! implementation (a CSG mesher, a collision layer, a test double) is handed
//! the batch each cycle and reports back per-brush results, including the
//! set of brushes each result geometrically touches. The touching sets feed
//! the next cycle's indirect-update expansion.

use alloc::vec::Vec;

use crate::compact::CompactTree;
use crate::node::{CompactIndex, Hierarchy};

/// Opaque token naming surface data held by the evaluator.
///
/// Karst never interprets the value; it only carries it between the
/// evaluator and the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SurfaceToken(pub u64);

/// One cycle's work order for the evaluator.
#[derive(Debug)]
pub struct EvaluationRequest<'a> {
    /// The arena holding the tree under evaluation.
    pub hierarchy: &'a Hierarchy,
    /// Flattened snapshot of the tree, already rebuilt if it was stale.
    pub tree: &'a CompactTree,
    /// Brushes to re-evaluate, in composition order.
    pub brushes: &'a [CompactIndex],
}

/// The evaluator's result for one brush.
#[derive(Clone, Debug)]
pub struct BrushResult {
    /// The brush this result belongs to.
    pub brush: CompactIndex,
    /// Token for the produced surface data.
    pub surface: SurfaceToken,
    /// Brushes whose geometry intersects this brush's bounds. Feeds the
    /// touching cache; when this brush changes shape again, these neighbors
    /// are re-evaluated too.
    pub touching: Vec<CompactIndex>,
}

/// Everything an evaluator produced for one cycle.
#[derive(Clone, Debug, Default)]
pub struct EvaluationOutput {
    /// One entry per requested brush, in request order.
    pub results: Vec<BrushResult>,
}

/// Computes boolean surface geometry for batches of brushes.
///
/// Implementations take `&self` so one evaluator can serve several trees
/// concurrently; any caching they do must be internally synchronized.
pub trait BooleanEvaluator {
    /// Evaluates every brush in `request`, in the given order.
    fn evaluate(&self, request: &EvaluationRequest<'_>) -> EvaluationOutput;

    /// Notifies the evaluator that a brush was destroyed so cached surface
    /// data can be released. The default does nothing.
    fn forget(&self, brush: CompactIndex) {
        let _ = brush;
    }
}
