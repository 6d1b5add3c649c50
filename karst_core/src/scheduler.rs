// Copyright 2026 the Karst Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-tree update cycle.
//!
//! A cycle runs the fixed sequence: skip if clean, rebuild the compact
//! snapshot if the topology changed, propagate dirty flags into a work
//! order, recompute queued world transforms, hand the ordered batch to the
//! evaluator, absorb its touching sets, and clear every flag.
//!
//! [`run_cycle`] performs the whole sequence serially. The individual
//! phases are public so a driver can substitute its own execution strategy
//! (e.g. fanning the transform recompute out across threads) while keeping
//! the sequence and its invariants.

use alloc::vec::Vec;

use crate::compact::CompactTree;
use crate::evaluator::{BooleanEvaluator, EvaluationOutput, EvaluationRequest};
use crate::node::{CompactIndex, Hierarchy};
use crate::status::NodeStatus;
use crate::trace::{BatchEvent, CycleBeginEvent, CycleEndEvent, RebuildEvent, Tracer};
use crate::update::{TouchesCache, UpdateBatch, find_modified_brushes};

/// Per-tree state that persists between cycles.
#[derive(Clone, Debug, Default)]
pub struct TreeCache {
    /// Flattened snapshot of the tree, rebuilt lazily on topology change.
    pub snapshot: CompactTree,
    /// Brush adjacency reported by previous evaluations.
    pub touches: TouchesCache,
    snapshot_valid: bool,
}

impl TreeCache {
    /// Creates an empty cache; the first cycle will build the snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces a snapshot rebuild on the next cycle.
    pub fn invalidate(&mut self) {
        self.snapshot_valid = false;
    }
}

/// What one completed cycle did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Id of the updated hierarchy.
    pub tree: u32,
    /// Whether the compact snapshot was rebuilt this cycle.
    pub rebuilt: bool,
    /// Directly modified brushes.
    pub modified: u32,
    /// Brushes dragged in through the touching cache.
    pub indirect: u32,
    /// Brushes whose world transform was recomputed.
    pub transforms: u32,
    /// Brushes handed to the evaluator.
    pub evaluated: u32,
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "batch sizes fit in u32 by construction"
)]
const fn as_u32(n: usize) -> u32 {
    n as u32
}

/// Rebuilds the snapshot if the tree's topology changed since it was built.
///
/// Returns whether a rebuild happened. Every structural edit marks the tree
/// root, so the root's flag is the rebuild trigger.
pub fn ensure_snapshot(hierarchy: &Hierarchy, cache: &mut TreeCache, tracer: &mut Tracer<'_>) -> bool {
    let root = hierarchy.root();
    let topology_dirty = hierarchy
        .status_of(root)
        .is_some_and(|s| s.contains(NodeStatus::HIERARCHY_MODIFIED));
    if cache.snapshot_valid && !topology_dirty {
        return false;
    }
    cache.snapshot = CompactTree::build(hierarchy);
    cache.snapshot_valid = true;
    tracer.rebuild(&RebuildEvent {
        tree: hierarchy.id(),
        node_count: as_u32(cache.snapshot.nodes().len()),
        brush_count: as_u32(cache.snapshot.brushes().len()),
    });
    true
}

/// Serially recomputes and stores the world transform of each queued brush.
///
/// The computation side is read-only; drivers that want to fan it out keep
/// [`Hierarchy::compute_world_transform`] for the parallel part and
/// [`Hierarchy::store_world_transform`] for the serial write-back.
pub fn recompute_transforms(hierarchy: &mut Hierarchy, brushes: &[CompactIndex]) {
    for &brush in brushes {
        if let Some(world) = hierarchy.compute_world_transform(brush) {
            hierarchy.store_world_transform(brush, world);
        }
    }
}

/// Merges the direct and indirect sets into the stable per-tree brush
/// order the evaluator requires.
#[must_use]
pub fn evaluation_order(tree: &CompactTree, batch: &UpdateBatch) -> Vec<CompactIndex> {
    let mut ordered: Vec<CompactIndex> = batch
        .modified
        .iter()
        .chain(&batch.indirect)
        .copied()
        .collect();
    ordered.sort_unstable_by_key(|&brush| tree.order_of(brush).unwrap_or(u32::MAX));
    ordered
}

/// Folds evaluator output back into the touching cache for the next cycle.
pub fn absorb_results(touches: &mut TouchesCache, output: &EvaluationOutput) {
    for result in &output.results {
        touches.record(result.brush, result.touching.clone());
    }
}

/// Clears every status flag in the tree, completing the cycle.
pub fn finish_cycle(hierarchy: &mut Hierarchy) {
    hierarchy.clear_all_status();
}

/// Runs one full update cycle for one tree.
///
/// Returns `None` without touching anything when the tree carries no
/// pending flags or the arena has no root (the detached arena keeps its
/// flags until its nodes are attached under a tree).
pub fn run_cycle(
    hierarchy: &mut Hierarchy,
    cache: &mut TreeCache,
    evaluator: &dyn BooleanEvaluator,
    tracer: &mut Tracer<'_>,
) -> Option<CycleReport> {
    if !hierarchy.has_pending() || !hierarchy.root().is_valid() {
        return None;
    }

    tracer.cycle_begin(&CycleBeginEvent {
        tree: hierarchy.id(),
        brush_count: hierarchy.brush_count(),
    });

    let rebuilt = ensure_snapshot(hierarchy, cache, tracer);
    let mut report = CycleReport {
        tree: hierarchy.id(),
        rebuilt,
        ..CycleReport::default()
    };

    if cache.snapshot.brushes().is_empty() {
        // Nothing can be evaluated; the edits are acknowledged and cleared.
        finish_cycle(hierarchy);
        tracer.cycle_end(&CycleEndEvent {
            tree: report.tree,
            evaluated: 0,
        });
        return Some(report);
    }

    let batch = find_modified_brushes(hierarchy, &cache.snapshot, &cache.touches);
    report.modified = as_u32(batch.modified.len());
    report.indirect = as_u32(batch.indirect.len());
    report.transforms = as_u32(batch.transforms.len());
    tracer.batch(&BatchEvent {
        tree: report.tree,
        modified: report.modified,
        indirect: report.indirect,
        transforms: report.transforms,
    });

    recompute_transforms(hierarchy, &batch.transforms);

    let ordered = evaluation_order(&cache.snapshot, &batch);
    report.evaluated = as_u32(ordered.len());
    if !ordered.is_empty() {
        let request = EvaluationRequest {
            hierarchy,
            tree: &cache.snapshot,
            brushes: &ordered,
        };
        let output = evaluator.evaluate(&request);
        absorb_results(&mut cache.touches, &output);
    }

    finish_cycle(hierarchy);
    tracer.cycle_end(&CycleEndEvent {
        tree: report.tree,
        evaluated: report.evaluated,
    });
    Some(report)
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;
    use core::cell::RefCell;

    use super::*;
    use crate::evaluator::{BrushResult, SurfaceToken};
    use crate::node::Operation::Additive;
    use crate::transform::Transform3d;

    /// Records each batch it is handed and reports every requested brush as
    /// touching every other brush in the same request.
    #[derive(Default)]
    struct MutualEvaluator {
        calls: RefCell<Vec<Vec<CompactIndex>>>,
    }

    impl BooleanEvaluator for MutualEvaluator {
        fn evaluate(&self, request: &EvaluationRequest<'_>) -> EvaluationOutput {
            self.calls.borrow_mut().push(request.brushes.to_vec());
            let results = request
                .brushes
                .iter()
                .map(|&brush| BrushResult {
                    brush,
                    surface: SurfaceToken(u64::from(brush.index())),
                    touching: request
                        .brushes
                        .iter()
                        .copied()
                        .filter(|&other| other != brush)
                        .collect(),
                })
                .collect();
            EvaluationOutput { results }
        }
    }

    fn tree_with_brushes(count: i32) -> (Hierarchy, Vec<CompactIndex>) {
        let mut h = Hierarchy::with_root(1, 0);
        let root = h.root();
        let brushes = (0..count)
            .map(|i| {
                let b = h.create_brush(Additive, i, i);
                h.attach(root, b).unwrap();
                b
            })
            .collect();
        (h, brushes)
    }

    #[test]
    fn clean_tree_skips_at_zero_cost() {
        let (mut h, _) = tree_with_brushes(2);
        h.clear_all_status();
        let mut cache = TreeCache::new();
        let evaluator = MutualEvaluator::default();

        let report = run_cycle(&mut h, &mut cache, &evaluator, &mut Tracer::none());
        assert!(report.is_none());
        assert!(evaluator.calls.borrow().is_empty());
    }

    #[test]
    fn first_cycle_evaluates_everything_then_settles() {
        let (mut h, brushes) = tree_with_brushes(3);
        let mut cache = TreeCache::new();
        let evaluator = MutualEvaluator::default();

        let report = run_cycle(&mut h, &mut cache, &evaluator, &mut Tracer::none())
            .expect("fresh tree has pending work");
        assert!(report.rebuilt);
        assert_eq!(report.evaluated, 3);
        assert_eq!(evaluator.calls.borrow()[0], brushes);
        assert!(!h.has_pending());

        // Nothing changed since; the next cycle is a no-op.
        assert!(run_cycle(&mut h, &mut cache, &evaluator, &mut Tracer::none()).is_none());
    }

    #[test]
    fn shape_edit_drags_in_cached_neighbors() {
        let (mut h, brushes) = tree_with_brushes(3);
        let mut cache = TreeCache::new();
        let evaluator = MutualEvaluator::default();
        run_cycle(&mut h, &mut cache, &evaluator, &mut Tracer::none()).unwrap();

        h.set_mesh(brushes[1], 99).unwrap();
        let report = run_cycle(&mut h, &mut cache, &evaluator, &mut Tracer::none()).unwrap();
        assert_eq!(report.modified, 1);
        assert_eq!(report.indirect, 2, "the first cycle recorded mutual touching");
        assert!(!report.rebuilt, "a shape edit does not change topology");
        // Handed over in stable composition order.
        assert_eq!(evaluator.calls.borrow()[1], brushes);
    }

    #[test]
    fn transform_recompute_stores_world_transforms() {
        let (mut h, brushes) = tree_with_brushes(1);
        let mut cache = TreeCache::new();
        let evaluator = MutualEvaluator::default();
        run_cycle(&mut h, &mut cache, &evaluator, &mut Tracer::none()).unwrap();

        h.set_transform(brushes[0], Transform3d::from_translation(4.0, 0.0, 0.0))
            .unwrap();
        let report = run_cycle(&mut h, &mut cache, &evaluator, &mut Tracer::none()).unwrap();
        assert_eq!(report.transforms, 1);
        assert_eq!(
            h.world_transform(brushes[0]).unwrap().translation(),
            [4.0, 0.0, 0.0]
        );
    }

    #[test]
    fn structural_edit_triggers_rebuild() {
        let (mut h, brushes) = tree_with_brushes(2);
        let mut cache = TreeCache::new();
        let evaluator = MutualEvaluator::default();
        run_cycle(&mut h, &mut cache, &evaluator, &mut Tracer::none()).unwrap();

        h.detach(brushes[0]).unwrap();
        let report = run_cycle(&mut h, &mut cache, &evaluator, &mut Tracer::none()).unwrap();
        assert!(report.rebuilt);
        assert_eq!(cache.snapshot.brushes().len(), 1, "detached brush left the tree");
    }

    #[test]
    fn brushless_tree_completes_with_empty_report() {
        let mut h = Hierarchy::with_root(1, 0);
        let root = h.root();
        let branch = h.create_branch(Additive, 0);
        h.attach(root, branch).unwrap();

        let mut cache = TreeCache::new();
        let evaluator = MutualEvaluator::default();
        let report = run_cycle(&mut h, &mut cache, &evaluator, &mut Tracer::none()).unwrap();
        assert_eq!(report.evaluated, 0);
        assert!(!h.has_pending(), "flags are acknowledged even with nothing to do");
        assert!(evaluator.calls.borrow().is_empty());
    }

    #[test]
    fn rootless_arena_is_left_alone() {
        let mut h = Hierarchy::new(0);
        let brush = h.create_brush(Additive, 0, 1);
        let mut cache = TreeCache::new();
        let evaluator = MutualEvaluator::default();

        assert!(run_cycle(&mut h, &mut cache, &evaluator, &mut Tracer::none()).is_none());
        assert!(
            h.status_of(brush).unwrap().contains(NodeStatus::SHAPE_MODIFIED),
            "detached nodes keep their flags for the tree they join"
        );
    }
}
