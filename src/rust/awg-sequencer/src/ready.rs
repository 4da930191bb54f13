// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Read-only program handle for the real-time trigger layer.
//!
//! [`ReadyProgram`] exposes only precomputed descriptors. It owns no device
//! handle and offers no method that allocates, blocks or talks to hardware,
//! so code holding it cannot reach the upload path.
use std::sync::Arc;

use crate::Samples;
use crate::fingerprint::Fingerprint;
use crate::operation::AdvanceMode;
use crate::program::{EndOfProgram, Program, SlotId};
use crate::samples::samples_to_length;

/// What the trigger layer needs to know about one segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentDescriptor {
    pub slot: SlotId,
    pub advance: AdvanceMode,
    /// Duration of one pass through the segment, including finite loops.
    pub duration_samples: Samples,
    pub duration_s: f64,
}

impl SegmentDescriptor {
    pub fn waits_for_trigger(&self) -> bool {
        self.advance.waits_for_trigger()
    }
}

#[derive(Debug)]
struct Inner {
    fingerprint: Fingerprint,
    end: EndOfProgram,
    segments: Box<[SegmentDescriptor]>,
}

/// Immutable, fully resolved program that is resident on the card.
///
/// Cheap to clone and `Send + Sync`, so it can be handed to another thread.
#[derive(Debug, Clone)]
pub struct ReadyProgram(Arc<Inner>);

impl ReadyProgram {
    pub(crate) fn new(program: &Program, sample_rate_hz: f64) -> Self {
        let segments = program
            .segments()
            .iter()
            .enumerate()
            .map(|(index, segment)| {
                let duration_samples = segment.length() * Samples::from(segment.loops());
                SegmentDescriptor {
                    slot: SlotId::from(index),
                    advance: segment.advance(),
                    duration_samples,
                    duration_s: samples_to_length(duration_samples, sample_rate_hz),
                }
            })
            .collect();
        Self(Arc::new(Inner {
            fingerprint: program.fingerprint(),
            end: program.end_of_program(),
            segments,
        }))
    }

    pub fn segments(&self) -> &[SegmentDescriptor] {
        &self.0.segments
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.0.fingerprint
    }

    pub fn end_of_program(&self) -> EndOfProgram {
        self.0.end
    }

    /// Number of external triggers needed to play through the program once.
    pub fn trigger_count(&self) -> usize {
        self.0
            .segments
            .iter()
            .filter(|segment| segment.waits_for_trigger())
            .count()
    }
}
