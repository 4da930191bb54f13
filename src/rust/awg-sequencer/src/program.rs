// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;
use std::fmt::{self, Write};

use crate::fingerprint::{Fingerprint, FingerprintHasher};
use crate::samples::format_samples_time;
use crate::segment::ResolvedSegment;

/// Index of a segment in the card's segment memory.
///
/// Segments occupy slots positionally: the n-th segment of a program lives in slot n.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SlotId(pub u32);

impl SlotId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for SlotId {
    fn from(value: usize) -> Self {
        SlotId(value as u32)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the card does after the last segment of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndOfProgram {
    /// Stop and hold the last sample.
    #[default]
    Halt,
    /// Continue with the first segment.
    Wrap,
}

/// Ordered, resolved segments with a fingerprint over content and order.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    segments: Vec<ResolvedSegment>,
    end: EndOfProgram,
    fingerprint: Fingerprint,
}

impl Program {
    pub(crate) fn new(segments: Vec<ResolvedSegment>, end: EndOfProgram) -> Self {
        let mut hasher = FingerprintHasher::new();
        let end_tag: &[u8] = match end {
            EndOfProgram::Halt => b"halt",
            EndOfProgram::Wrap => b"wrap",
        };
        hasher.update(end_tag);
        hasher.update(&(segments.len() as u64).to_le_bytes());
        for segment in &segments {
            hasher.update(segment.fingerprint().as_bytes());
        }
        Self {
            fingerprint: hasher.finish(),
            segments,
            end,
        }
    }

    pub fn segments(&self) -> &[ResolvedSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn end_of_program(&self) -> EndOfProgram {
        self.end
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Table of requested versus quantized segment lengths.
    pub fn quantization_report(&self, sample_rate_hz: f64, segment_quantum: u64) -> String {
        let mut report = format!(
            "segment quantum: {}\n",
            format_samples_time(segment_quantum, sample_rate_hz)
        );
        for (index, segment) in self.segments.iter().enumerate() {
            let q = segment.quantization();
            let name = segment
                .label()
                .map(str::to_string)
                .unwrap_or_else(|| format!("#{index}"));
            writeln!(
                report,
                "- {}: {} -> {} | advance={:?} loops={}",
                name,
                format_samples_time(q.requested, sample_rate_hz),
                format_samples_time(q.quantized, sample_rate_hz),
                segment.advance(),
                segment.loops(),
            )
            .expect("Writing to a String cannot fail");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::tests::tone_segment;

    #[test]
    fn test_program_fingerprint_is_deterministic() {
        let a = Program::new(
            vec![tone_segment(1e6, 6400), tone_segment(2e6, 6400)],
            EndOfProgram::Halt,
        );
        let b = Program::new(
            vec![tone_segment(1e6, 6400), tone_segment(2e6, 6400)],
            EndOfProgram::Halt,
        );
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_program_fingerprint_depends_on_order() {
        let a = Program::new(
            vec![tone_segment(1e6, 6400), tone_segment(2e6, 6400)],
            EndOfProgram::Halt,
        );
        let b = Program::new(
            vec![tone_segment(2e6, 6400), tone_segment(1e6, 6400)],
            EndOfProgram::Halt,
        );
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_program_fingerprint_depends_on_end_of_program() {
        let a = Program::new(vec![tone_segment(1e6, 6400)], EndOfProgram::Halt);
        let b = Program::new(vec![tone_segment(1e6, 6400)], EndOfProgram::Wrap);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_quantization_report() {
        let program = Program::new(vec![tone_segment(1e6, 6400)], EndOfProgram::Halt);
        assert_eq!(
            program.quantization_report(640e6, 6400),
            "segment quantum: 10.000 us (6400 Sa)\n\
             - #0: 10.000 us (6400 Sa) -> 10.000 us (6400 Sa) | advance=Auto loops=1\n"
        );
    }
}
