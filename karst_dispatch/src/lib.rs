// Copyright 2026 the Karst Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Parallel update-cycle driver for [`Document`]s.
//!
//! `karst_core` runs one tree's cycle serially; this crate spreads the work
//! across a rayon pool along the two axes the cycle model permits:
//!
//! - **Across trees** — distinct trees own disjoint arenas, so their whole
//!   cycles run as independent tasks. Trees are queued largest-first
//!   (by brush count) so the slowest workloads start immediately and small
//!   ones fill the scheduling gaps.
//! - **Across brushes** — within one cycle, world-transform recomputation
//!   only reads the frozen hierarchy, so it fans out per brush; the results
//!   are written back serially before evaluation.
//!
//! Edits stay single-writer: the caller mutates the document between
//! [`update_parallel`] calls, never during one.

use karst_core::document::{Document, TreeCycle};
use karst_core::evaluator::{BooleanEvaluator, EvaluationRequest};
use karst_core::node::{CompactIndex, Hierarchy};
use karst_core::scheduler::{
    CycleReport, absorb_results, ensure_snapshot, evaluation_order, finish_cycle,
};
use karst_core::trace::Tracer;
use karst_core::transform::Transform3d;
use karst_core::update::find_modified_brushes;
use rayon::prelude::*;

#[expect(
    clippy::cast_possible_truncation,
    reason = "batch sizes fit in u32 by construction"
)]
const fn as_u32(n: usize) -> u32 {
    n as u32
}

/// Runs the update cycle of every dirty tree on the rayon pool.
///
/// Returns one report per tree that did work, sorted by tree id so the
/// result is deterministic regardless of completion order.
pub fn update_parallel(
    document: &mut Document,
    evaluator: &(dyn BooleanEvaluator + Sync),
) -> Vec<CycleReport> {
    let mut cycles: Vec<TreeCycle<'_>> = document
        .cycles_mut()
        .filter(|cycle| cycle.hierarchy.has_pending())
        .collect();
    cycles.sort_by_key(|cycle| core::cmp::Reverse(cycle.brush_count()));

    let mut reports: Vec<CycleReport> = cycles
        .into_par_iter()
        .filter_map(|mut cycle| run_cycle_fanout(&mut cycle, evaluator))
        .collect();
    reports.sort_by_key(|report| report.tree);
    reports
}

/// One tree's cycle with the transform recompute fanned out per brush.
///
/// Phase-for-phase equivalent to [`karst_core::scheduler::run_cycle`]; only
/// the execution strategy of the transform phase differs.
pub fn run_cycle_fanout(
    cycle: &mut TreeCycle<'_>,
    evaluator: &(dyn BooleanEvaluator + Sync),
) -> Option<CycleReport> {
    let hierarchy: &mut Hierarchy = cycle.hierarchy;
    if !hierarchy.has_pending() || !hierarchy.root().is_valid() {
        return None;
    }

    let rebuilt = ensure_snapshot(hierarchy, cycle.cache, &mut Tracer::none());
    let mut report = CycleReport {
        tree: hierarchy.id(),
        rebuilt,
        ..CycleReport::default()
    };

    if cycle.cache.snapshot.brushes().is_empty() {
        finish_cycle(hierarchy);
        return Some(report);
    }

    let batch = find_modified_brushes(hierarchy, &cycle.cache.snapshot, &cycle.cache.touches);
    report.modified = as_u32(batch.modified.len());
    report.indirect = as_u32(batch.indirect.len());
    report.transforms = as_u32(batch.transforms.len());

    // Read-only fan-out over the frozen hierarchy, serial write-back.
    let computed: Vec<(CompactIndex, Transform3d)> = {
        let frozen: &Hierarchy = hierarchy;
        batch
            .transforms
            .par_iter()
            .filter_map(|&brush| {
                frozen
                    .compute_world_transform(brush)
                    .map(|world| (brush, world))
            })
            .collect()
    };
    for (brush, world) in computed {
        hierarchy.store_world_transform(brush, world);
    }

    let ordered = evaluation_order(&cycle.cache.snapshot, &batch);
    report.evaluated = as_u32(ordered.len());
    if !ordered.is_empty() {
        let request = EvaluationRequest {
            hierarchy,
            tree: &cycle.cache.snapshot,
            brushes: &ordered,
        };
        let output = evaluator.evaluate(&request);
        absorb_results(&mut cycle.cache.touches, &output);
    }

    finish_cycle(hierarchy);
    Some(report)
}

#[cfg(test)]
mod tests {
    use karst_core::node::Operation::Additive;
    use karst_core::transform::Transform3d;
    use karst_eval_harness::BoxEvaluator;

    use super::*;

    fn forest(trees: usize, brushes_per_tree: i32) -> Document {
        let mut doc = Document::new();
        for t in 0..trees {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "test sizes are tiny"
            )]
            let tree = doc.create_tree(t as i32);
            for i in 0..brushes_per_tree {
                let brush = doc.create_brush(Additive, i, 1);
                doc.add(tree, brush).unwrap();
                doc.set_transform(brush, Transform3d::from_translation(f64::from(i) * 10.0, 0.0, 0.0))
                    .unwrap();
            }
        }
        doc
    }

    #[test]
    fn parallel_update_matches_serial_results() {
        let evaluator = BoxEvaluator::new();

        let mut parallel = forest(4, 8);
        let parallel_reports = update_parallel(&mut parallel, &evaluator);

        let mut serial = forest(4, 8);
        let serial_reports = serial.update(&evaluator, &mut Tracer::none());

        assert_eq!(parallel_reports, serial_reports);
        assert_eq!(parallel_reports.len(), 4);
        assert!(parallel_reports.iter().all(|r| r.evaluated == 8));
    }

    #[test]
    fn settled_forest_produces_no_reports() {
        let evaluator = BoxEvaluator::new();
        let mut doc = forest(3, 2);
        update_parallel(&mut doc, &evaluator);

        let before = evaluator.batches();
        assert!(update_parallel(&mut doc, &evaluator).is_empty());
        assert_eq!(evaluator.batches(), before, "clean trees cost nothing");
    }

    #[test]
    fn fanout_transforms_land_in_the_arena() {
        let evaluator = BoxEvaluator::new();
        let mut doc = Document::new();
        let tree = doc.create_tree(0);
        let brush = doc.create_brush(Additive, 0, 1);
        doc.add(tree, brush).unwrap();
        doc.set_transform(brush, Transform3d::from_translation(0.0, 7.0, 0.0))
            .unwrap();

        update_parallel(&mut doc, &evaluator);
        let index = doc.resolve(brush).unwrap();
        let mut cycle = doc.cycles_mut().next().unwrap();
        let world = cycle.hierarchy.world_transform(index).unwrap();
        assert_eq!(world.translation(), [0.0, 7.0, 0.0]);
        assert!(cycle.run(&evaluator, &mut Tracer::none()).is_none());
    }

    #[test]
    fn only_dirty_trees_are_scheduled() {
        let evaluator = BoxEvaluator::new();
        let mut doc = Document::new();
        let tree_a = doc.create_tree(0);
        let tree_b = doc.create_tree(1);
        let a = doc.create_brush(Additive, 0, 1);
        let b = doc.create_brush(Additive, 0, 1);
        doc.add(tree_a, a).unwrap();
        doc.add(tree_b, b).unwrap();
        update_parallel(&mut doc, &evaluator);

        // A node parked in the detached arena schedules nothing.
        let parked = doc.create_brush(Additive, 9, 1);
        assert!(update_parallel(&mut doc, &evaluator).is_empty());

        // Attaching it dirties exactly one tree.
        doc.add(tree_b, parked).unwrap();
        let reports = update_parallel(&mut doc, &evaluator);
        assert_eq!(reports.len(), 1);
        assert_eq!(doc.tree_of(parked), Some(tree_b));
    }
}
