// Copyright 2026 the Karst Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the update cycle.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that
//! the scheduler calls at each stage of a cycle. All method bodies default
//! to no-ops, so implementing only the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace`
//! feature is **off**, every `Tracer` method compiles to nothing (zero
//! overhead). When **on**, each method performs a single `Option` branch
//! before dispatching.

/// Emitted when a tree's update cycle starts doing real work (clean trees
/// are skipped without an event).
#[derive(Clone, Copy, Debug)]
pub struct CycleBeginEvent {
    /// Id of the hierarchy under update.
    pub tree: u32,
    /// Live brushes in the tree at cycle start.
    pub brush_count: u32,
}

/// Emitted when a stale compact-tree snapshot is rebuilt.
#[derive(Clone, Copy, Debug)]
pub struct RebuildEvent {
    /// Id of the hierarchy under update.
    pub tree: u32,
    /// Nodes in the rebuilt snapshot.
    pub node_count: u32,
    /// Brushes in the rebuilt snapshot (after pruning).
    pub brush_count: u32,
}

/// Emitted once dirty propagation has produced the cycle's work order.
#[derive(Clone, Copy, Debug)]
pub struct BatchEvent {
    /// Id of the hierarchy under update.
    pub tree: u32,
    /// Directly modified brushes.
    pub modified: u32,
    /// Brushes dragged in through the touching cache.
    pub indirect: u32,
    /// Brushes whose world transform was recomputed.
    pub transforms: u32,
}

/// Emitted when a cycle completes and its flags are cleared.
#[derive(Clone, Copy, Debug)]
pub struct CycleEndEvent {
    /// Id of the hierarchy under update.
    pub tree: u32,
    /// Brushes handed to the evaluator this cycle.
    pub evaluated: u32,
}

/// Receives trace events from the update cycle.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when a cycle starts.
    fn on_cycle_begin(&mut self, e: &CycleBeginEvent) {
        _ = e;
    }

    /// Called after a snapshot rebuild.
    fn on_rebuild(&mut self, e: &RebuildEvent) {
        _ = e;
    }

    /// Called once the work order is known.
    fn on_batch(&mut self, e: &BatchEvent) {
        _ = e;
    }

    /// Called when a cycle finishes.
    fn on_cycle_end(&mut self, e: &CycleEndEvent) {
        _ = e;
    }
}

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing.
/// When **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits a [`CycleBeginEvent`].
    #[inline]
    pub fn cycle_begin(&mut self, e: &CycleBeginEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_cycle_begin(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`RebuildEvent`].
    #[inline]
    pub fn rebuild(&mut self, e: &RebuildEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_rebuild(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`BatchEvent`].
    #[inline]
    pub fn batch(&mut self, e: &BatchEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_batch(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`CycleEndEvent`].
    #[inline]
    pub fn cycle_end(&mut self, e: &CycleEndEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_cycle_end(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }
}

#[cfg(all(test, feature = "trace"))]
mod tests {
    use alloc::vec::Vec;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Vec<&'static str>,
    }

    impl TraceSink for Recorder {
        fn on_cycle_begin(&mut self, _: &CycleBeginEvent) {
            self.events.push("begin");
        }
        fn on_cycle_end(&mut self, _: &CycleEndEvent) {
            self.events.push("end");
        }
    }

    #[test]
    fn tracer_dispatches_to_sink() {
        let mut recorder = Recorder::default();
        let mut tracer = Tracer::new(&mut recorder);
        tracer.cycle_begin(&CycleBeginEvent {
            tree: 1,
            brush_count: 0,
        });
        tracer.cycle_end(&CycleEndEvent {
            tree: 1,
            evaluated: 0,
        });
        assert_eq!(recorder.events, ["begin", "end"]);
    }

    #[test]
    fn none_tracer_is_silent() {
        let mut tracer = Tracer::none();
        tracer.batch(&BatchEvent {
            tree: 1,
            modified: 0,
            indirect: 0,
            transforms: 0,
        });
    }
}
