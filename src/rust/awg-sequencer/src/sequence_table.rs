// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;
use serde_json::json;

use crate::device_traits::CardTraits;
use crate::fingerprint::Fingerprint;
use crate::operation::{AdvanceMode, LoopCount};
use crate::program::{EndOfProgram, Program, SlotId};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepCondition {
    /// Advance once the loops of the step completed.
    Always,
    /// Repeat the segment until an external trigger arrives, then advance.
    OnTrigger,
}

/// One transition rule of the sequence table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceStep {
    pub step: u32,
    pub segment: SlotId,
    pub next: u32,
    pub loops: u32,
    pub condition: StepCondition,
    /// Stop playback after this step.
    pub end: bool,
}

/// Device-side transition table mirroring the order of a [`Program`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceTable {
    steps: Vec<SequenceStep>,
    end: EndOfProgram,
    program: Fingerprint,
}

/// Build one transition rule per segment of `program`.
///
/// Step `n` plays slot `n`. The successor of the last step is selected by the
/// program's [`EndOfProgram`] policy.
pub fn assemble(program: &Program) -> SequenceTable {
    let count = program.len();
    let steps = program
        .segments()
        .iter()
        .enumerate()
        .map(|(index, segment)| {
            let (loops, condition) = match segment.advance() {
                AdvanceMode::Auto => (1, StepCondition::Always),
                AdvanceMode::Hold | AdvanceMode::Loop(LoopCount::UntilTrigger) => {
                    (1, StepCondition::OnTrigger)
                }
                AdvanceMode::Loop(LoopCount::Finite(n)) => (n, StepCondition::Always),
            };
            let is_last = index + 1 == count;
            let next = if is_last { 0 } else { index + 1 };
            SequenceStep {
                step: index as u32,
                segment: SlotId::from(index),
                next: next as u32,
                loops,
                condition,
                end: is_last && program.end_of_program() == EndOfProgram::Halt,
            }
        })
        .collect();
    SequenceTable {
        steps,
        end: program.end_of_program(),
        program: program.fingerprint(),
    }
}

impl SequenceTable {
    pub fn steps(&self) -> &[SequenceStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn end_of_program(&self) -> EndOfProgram {
        self.end
    }

    /// Fingerprint of the program the table was assembled from.
    pub fn program_fingerprint(&self) -> Fingerprint {
        self.program
    }

    /// Check that the table fits into the card's segment and step memory.
    pub fn check_capacity(&self, traits: &CardTraits) -> Result<()> {
        let segments = self
            .steps
            .iter()
            .map(|step| step.segment.index() + 1)
            .max()
            .unwrap_or(0);
        if segments > traits.max_segments as usize {
            return Err(Error::Capacity {
                what: "segments",
                required: segments,
                available: traits.max_segments as usize,
            });
        }
        if self.steps.len() > traits.max_sequence_steps as usize {
            return Err(Error::Capacity {
                what: "sequence steps",
                required: self.steps.len(),
                available: traits.max_sequence_steps as usize,
            });
        }
        Ok(())
    }

    /// Verify that the table was assembled from `program`.
    pub fn verify_against(&self, program: &Program) -> Result<()> {
        if self.steps.len() != program.len() {
            return Err(Error::consistency(format!(
                "Sequence table has {} steps, program has {} segments",
                self.steps.len(),
                program.len()
            )));
        }
        if self.program != program.fingerprint() {
            return Err(Error::consistency(format!(
                "Sequence table was assembled for program {}, not {}",
                self.program.short(),
                program.fingerprint().short()
            )));
        }
        Ok(())
    }

    /// JSON rendering of the table, for logs and debugging.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "header": {
                "program": self.program,
                "end_of_program": self.end,
                "steps": self.steps.len(),
            },
            "table": self.steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::ToneParameters;
    use crate::device_traits::M4I_66XX_TRAITS;
    use crate::operation::RampShape;
    use crate::segment::tests::tone_segment;
    use crate::segment::{QuantizationInfo, ResolvedSegment};

    fn with_advance(advance: AdvanceMode) -> ResolvedSegment {
        ResolvedSegment::new(
            "H".into(),
            0,
            vec![ToneParameters::constant(1e6, 0.5, 0.0)],
            RampShape::Linear,
            QuantizationInfo {
                requested: 384,
                quantized: 384,
            },
            advance,
            None,
        )
    }

    #[test]
    fn test_linear_program_halts() {
        let program = Program::new(
            vec![tone_segment(1e6, 6400), tone_segment(2e6, 6400)],
            EndOfProgram::Halt,
        );
        let table = assemble(&program);
        assert_eq!(
            table.steps(),
            &[
                SequenceStep {
                    step: 0,
                    segment: SlotId(0),
                    next: 1,
                    loops: 1,
                    condition: StepCondition::Always,
                    end: false,
                },
                SequenceStep {
                    step: 1,
                    segment: SlotId(1),
                    next: 0,
                    loops: 1,
                    condition: StepCondition::Always,
                    end: true,
                },
            ]
        );
        table.verify_against(&program).unwrap();
    }

    #[test]
    fn test_wrap_links_back_to_first_step() {
        let program = Program::new(
            vec![tone_segment(1e6, 6400), tone_segment(2e6, 6400)],
            EndOfProgram::Wrap,
        );
        let last = assemble(&program).steps()[1].clone();
        assert_eq!(last.next, 0);
        assert!(!last.end);
    }

    #[test]
    fn test_advance_modes() {
        let program = Program::new(
            vec![
                with_advance(AdvanceMode::Hold),
                with_advance(AdvanceMode::Loop(LoopCount::Finite(5))),
                with_advance(AdvanceMode::Loop(LoopCount::UntilTrigger)),
                with_advance(AdvanceMode::Auto),
            ],
            EndOfProgram::Halt,
        );
        let rules = assemble(&program)
            .steps()
            .iter()
            .map(|step| (step.loops, step.condition))
            .collect::<Vec<_>>();
        assert_eq!(
            rules,
            vec![
                (1, StepCondition::OnTrigger),
                (5, StepCondition::Always),
                (1, StepCondition::OnTrigger),
                (1, StepCondition::Always),
            ]
        );
    }

    #[test]
    fn test_verify_rejects_other_program() {
        let a = Program::new(vec![tone_segment(1e6, 6400)], EndOfProgram::Halt);
        let b = Program::new(vec![tone_segment(2e6, 6400)], EndOfProgram::Halt);
        let c = Program::new(
            vec![tone_segment(1e6, 6400), tone_segment(1e6, 6400)],
            EndOfProgram::Halt,
        );
        let table = assemble(&a);
        assert!(matches!(
            table.verify_against(&b),
            Err(Error::Consistency(_))
        ));
        assert!(matches!(
            table.verify_against(&c),
            Err(Error::Consistency(_))
        ));
    }

    #[test]
    fn test_capacity() {
        let program = Program::new(
            (0..3).map(|_| tone_segment(1e6, 384)).collect(),
            EndOfProgram::Halt,
        );
        let table = assemble(&program);
        table.check_capacity(&M4I_66XX_TRAITS).unwrap();
        let small = CardTraits {
            max_sequence_steps: 2,
            ..M4I_66XX_TRAITS
        };
        assert!(matches!(
            table.check_capacity(&small),
            Err(Error::Capacity {
                what: "sequence steps",
                required: 3,
                ..
            })
        ));
        let small = CardTraits {
            max_segments: 2,
            ..M4I_66XX_TRAITS
        };
        assert!(matches!(
            table.check_capacity(&small),
            Err(Error::Capacity {
                what: "segments",
                ..
            })
        ));
    }

    #[test]
    fn test_to_json() {
        let program = Program::new(vec![tone_segment(1e6, 6400)], EndOfProgram::Wrap);
        let json = assemble(&program).to_json();
        assert_eq!(json["header"]["end_of_program"], "wrap");
        assert_eq!(json["header"]["steps"], 1);
        assert_eq!(
            json["header"]["program"],
            program.fingerprint().to_string()
        );
        assert_eq!(
            json["table"][0],
            json!({
                "step": 0,
                "segment": 0,
                "next": 0,
                "loops": 1,
                "condition": "always",
                "end": false,
            })
        );
    }
}
