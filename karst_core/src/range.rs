// Copyright 2026 the Karst Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Free-list interval allocator for packed per-node buffers.
//!
//! A [`SectionList`] carves contiguous integer ranges out of one growable
//! address space and recycles them. It has no dependency on the hierarchy;
//! any subsystem that packs variable-sized per-node data (ancestor runs,
//! auxiliary channels) allocates its ranges here.
//!
//! Invariants maintained by every operation:
//!
//! - Sections are ordered by `start` and tile the space without gaps.
//! - Two consecutive free sections never exist (they are merged).
//! - The last section is never free (a freed tail shrinks the list).
//!
//! All operations are `O(count)` over the section count, which stays small
//! in practice; this is a flat list, not a tree.

use alloc::vec::Vec;

use crate::error::NodeError;

/// One contiguous run of allocated or free space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Section {
    /// First offset covered by this section.
    pub start: u32,
    /// Number of offsets covered.
    pub length: u32,
    /// Whether the run is available for allocation.
    pub free: bool,
}

impl Section {
    /// Returns the first offset past this section.
    #[inline]
    #[must_use]
    pub const fn end(self) -> u32 {
        self.start + self.length
    }
}

/// Ordered list of [`Section`]s covering `[0, total_length)`.
#[derive(Clone, Debug, Default)]
pub struct SectionList {
    sections: Vec<Section>,
}

impl SectionList {
    /// Creates an empty allocator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sections: Vec::new(),
        }
    }

    /// Returns the number of sections (allocated and free).
    #[must_use]
    pub fn count(&self) -> usize {
        self.sections.len()
    }

    /// Returns the total covered length, i.e. the end of the last section.
    #[must_use]
    pub fn total_length(&self) -> u32 {
        self.sections.last().map_or(0, |s| s.end())
    }

    /// Returns the sections in start order.
    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Allocates a contiguous range of `length` offsets and returns its
    /// start.
    ///
    /// Scans for the first free section that fits, splitting it when
    /// strictly larger; extends the address space at the end when nothing
    /// fits.
    ///
    /// # Panics
    ///
    /// Panics if `length` is zero.
    pub fn allocate(&mut self, length: u32) -> u32 {
        assert!(length > 0, "cannot allocate a zero-length range");

        for i in 0..self.sections.len() {
            let section = self.sections[i];
            if !section.free || section.length < length {
                continue;
            }
            self.sections[i].free = false;
            if section.length > length {
                // Split, leaving the remainder free.
                self.sections[i].length = length;
                self.sections.insert(
                    i + 1,
                    Section {
                        start: section.start + length,
                        length: section.length - length,
                        free: true,
                    },
                );
            }
            return section.start;
        }

        // No fit: grow the space with one new allocated section.
        let start = self.total_length();
        self.sections.push(Section {
            start,
            length,
            free: false,
        });
        start
    }

    /// Frees the range `[offset, offset + length)`.
    ///
    /// The covered sections become free, merge with free neighbors on both
    /// sides, and a resulting trailing free section is dropped entirely so
    /// the address space shrinks instead of keeping a free tail.
    ///
    /// Returns [`NodeError::UnknownRange`] if the range does not exactly
    /// cover a run of allocated sections; the list is left unchanged.
    pub fn free(&mut self, offset: u32, length: u32) -> Result<(), NodeError> {
        let run = self.allocated_run(offset, length)?;
        for section in &mut self.sections[run.clone()] {
            section.free = true;
        }
        self.normalize();
        Ok(())
    }

    /// Resizes the range at `offset` from `old_length` to `new_length`,
    /// returning the (possibly new) start offset.
    ///
    /// Shrinking stays in place and frees the vacated suffix. Growing stays
    /// in place when the following section is free with enough room (or the
    /// range is the last section); otherwise the range is freed and a fresh
    /// allocation is returned.
    ///
    /// Returns [`NodeError::UnknownRange`] if `[offset, offset +
    /// old_length)` is not a single allocated section.
    pub fn reallocate(
        &mut self,
        offset: u32,
        old_length: u32,
        new_length: u32,
    ) -> Result<u32, NodeError> {
        let i = self.exact_section(offset, old_length)?;

        if new_length == old_length {
            return Ok(offset);
        }

        if new_length == 0 {
            self.free(offset, old_length)?;
            return Ok(offset);
        }

        if new_length < old_length {
            // Shrink in place; the suffix becomes free.
            self.sections[i].length = new_length;
            self.sections.insert(
                i + 1,
                Section {
                    start: offset + new_length,
                    length: old_length - new_length,
                    free: true,
                },
            );
            self.normalize();
            return Ok(offset);
        }

        let need = new_length - old_length;
        if i + 1 == self.sections.len() {
            // Last section: grow into fresh address space.
            self.sections[i].length = new_length;
            return Ok(offset);
        }
        let next = self.sections[i + 1];
        if next.free && next.length >= need {
            // Grow in place by consuming part or all of the free neighbor.
            self.sections[i].length = new_length;
            if next.length == need {
                self.sections.remove(i + 1);
            } else {
                self.sections[i + 1].start += need;
                self.sections[i + 1].length -= need;
            }
            return Ok(offset);
        }

        // Relocate: free the old range, then allocate fresh.
        self.free(offset, old_length)?;
        Ok(self.allocate(new_length))
    }

    /// Finds the contiguous run of allocated sections exactly covering
    /// `[offset, offset + length)`.
    fn allocated_run(
        &self,
        offset: u32,
        length: u32,
    ) -> Result<core::ops::Range<usize>, NodeError> {
        let err = NodeError::UnknownRange { offset, length };
        if length == 0 {
            return Err(err);
        }
        let first = self
            .sections
            .iter()
            .position(|s| s.start == offset && !s.free)
            .ok_or(err)?;

        let mut covered = 0;
        let mut last = first;
        while covered < length {
            let section = self.sections.get(last).ok_or(err)?;
            if section.free {
                return Err(err);
            }
            covered += section.length;
            last += 1;
        }
        if covered != length {
            return Err(err);
        }
        Ok(first..last)
    }

    /// Finds the single allocated section at exactly `[offset, offset + length)`.
    fn exact_section(&self, offset: u32, length: u32) -> Result<usize, NodeError> {
        self.sections
            .iter()
            .position(|s| s.start == offset && s.length == length && !s.free)
            .ok_or(NodeError::UnknownRange { offset, length })
    }

    /// Merges consecutive free sections and drops a free tail.
    fn normalize(&mut self) {
        let mut i = 0;
        while i + 1 < self.sections.len() {
            if self.sections[i].free && self.sections[i + 1].free {
                self.sections[i].length += self.sections[i + 1].length;
                self.sections.remove(i + 1);
            } else {
                i += 1;
            }
        }
        if self.sections.last().is_some_and(|s| s.free) {
            self.sections.pop();
        }
    }
}
