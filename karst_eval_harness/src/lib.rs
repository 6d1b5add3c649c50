// Copyright 2026 the Karst Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A deliberately simple [`BooleanEvaluator`] for tests and demos.
//!
//! [`BoxEvaluator`] models every brush as an axis-aligned box: a registered
//! half-extent per mesh id, positioned by the brush's world-transform
//! translation. "Evaluation" just reports which boxes overlap, which is
//! exactly the signal the core's touching cache and indirect-update
//! expansion need. Call counters let tests assert how much work a cycle
//! actually scheduled.

#![no_std]

extern crate alloc;

use core::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use karst_core::evaluator::{
    BooleanEvaluator, BrushResult, EvaluationOutput, EvaluationRequest, SurfaceToken,
};
use karst_core::node::CompactIndex;

/// Half extents of an axis-aligned box.
pub type HalfExtents = [f64; 3];

const DEFAULT_HALF_EXTENTS: HalfExtents = [0.5, 0.5, 0.5];

/// Box-overlap evaluator with evaluation counters.
///
/// The mesh registry is filled up front with [`register_mesh`]
/// (`&mut self`); evaluation itself only reads it, so one evaluator can be
/// shared across concurrently updating trees.
///
/// [`register_mesh`]: Self::register_mesh
#[derive(Debug, Default)]
pub struct BoxEvaluator {
    meshes: HashMap<i32, HalfExtents>,
    batches: AtomicU64,
    evaluated: AtomicU64,
    next_token: AtomicU64,
}

impl BoxEvaluator {
    /// Creates an evaluator with an empty mesh registry. Unregistered mesh
    /// ids fall back to a unit cube.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the half extents for a mesh id.
    pub fn register_mesh(&mut self, mesh_id: i32, half_extents: HalfExtents) {
        self.meshes.insert(mesh_id, half_extents);
    }

    /// Number of evaluation batches received so far.
    #[must_use]
    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    /// Total number of brushes evaluated so far.
    #[must_use]
    pub fn evaluated(&self) -> u64 {
        self.evaluated.load(Ordering::Relaxed)
    }

    fn half_extents(&self, mesh_id: i32) -> HalfExtents {
        self.meshes
            .get(&mesh_id)
            .copied()
            .unwrap_or(DEFAULT_HALF_EXTENTS)
    }

    fn bounds(&self, request: &EvaluationRequest<'_>, brush: CompactIndex, mesh_id: i32) -> Aabb {
        let center = request
            .hierarchy
            .world_transform(brush)
            .map(|t| t.translation())
            .unwrap_or_default();
        Aabb::new(center, self.half_extents(mesh_id))
    }
}

impl BooleanEvaluator for BoxEvaluator {
    fn evaluate(&self, request: &EvaluationRequest<'_>) -> EvaluationOutput {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.evaluated
            .fetch_add(request.brushes.len() as u64, Ordering::Relaxed);

        let results = request
            .brushes
            .iter()
            .map(|&brush| {
                let mesh_id = request.hierarchy.mesh(brush).unwrap_or(0);
                let bounds = self.bounds(request, brush, mesh_id);
                // Overlap is checked against every brush in the tree, not
                // just the batch: unmodified neighbors still touch.
                let touching = request
                    .tree
                    .brushes()
                    .iter()
                    .filter(|entry| entry.index != brush)
                    .filter(|entry| {
                        bounds.overlaps(&self.bounds(request, entry.index, entry.mesh_id))
                    })
                    .map(|entry| entry.index)
                    .collect();
                BrushResult {
                    brush,
                    surface: SurfaceToken(self.next_token.fetch_add(1, Ordering::Relaxed)),
                    touching,
                }
            })
            .collect();
        EvaluationOutput { results }
    }
}

#[derive(Clone, Copy, Debug)]
struct Aabb {
    min: [f64; 3],
    max: [f64; 3],
}

impl Aabb {
    fn new(center: [f64; 3], half: HalfExtents) -> Self {
        let mut min = [0.0; 3];
        let mut max = [0.0; 3];
        for axis in 0..3 {
            min[axis] = center[axis] - half[axis];
            max[axis] = center[axis] + half[axis];
        }
        Self { min, max }
    }

    fn overlaps(&self, other: &Self) -> bool {
        (0..3).all(|axis| self.min[axis] <= other.max[axis] && other.min[axis] <= self.max[axis])
    }
}
