// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Ordered collection of operations contributed by the experiment tree.
//!
//! Contributors never see hardware state. They receive a [`Contributor`]
//! handle during a depth-first, pre-order traversal and may only append.
//! The resulting program order is the order of the `contribute` calls.
//! [`SegmentBuilder::resolve`] consumes the builder, so nothing can be
//! contributed once the traversal of a pass has finished.
use crate::calibration::{CalibrationContext, CalibrationTransform, SegmentParameters};
use crate::operation::{AdvanceMode, ChannelUid, LoopCount, Operation};
use crate::program::{EndOfProgram, Program};
use crate::samples::{ceil_to_grid, length_to_samples};
use crate::segment::{QuantizationInfo, ResolvedSegment};
use crate::{Error, Result};

/// Summed tone amplitudes may exceed full scale by this much before clipping is reported.
const AMPLITUDE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Default)]
pub struct SegmentBuilder {
    operations: Vec<(Operation, ChannelUid)>,
    end: EndOfProgram,
}

impl SegmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_end_of_program(mut self, end: EndOfProgram) -> Self {
        self.end = end;
        self
    }

    pub fn end_of_program(&self) -> EndOfProgram {
        self.end
    }

    /// Append an operation; returns its contributor index.
    pub fn contribute(&mut self, operation: Operation, channel: impl Into<ChannelUid>) -> usize {
        self.operations.push((operation, channel.into()));
        self.operations.len() - 1
    }

    /// Append-only handle to pass down the contributor hierarchy.
    pub fn contributor(&mut self) -> Contributor<'_> {
        Contributor { builder: self }
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations(&self) -> impl Iterator<Item = (&Operation, &ChannelUid)> {
        self.operations.iter().map(|(op, channel)| (op, channel))
    }

    /// Resolve every contributed operation, in order, into a [`Program`].
    ///
    /// Either every operation resolves or an error naming the first offending
    /// contributor index is returned; a partial program is never produced.
    pub fn resolve<C>(self, context: &CalibrationContext<'_>, calibration: &C) -> Result<Program>
    where
        C: CalibrationTransform + ?Sized,
    {
        if self.operations.is_empty() {
            return Err(Error::new(
                "Cannot resolve an empty program: no operations were contributed",
            ));
        }
        let segments = self
            .operations
            .into_iter()
            .enumerate()
            .map(|(index, (operation, channel))| {
                resolve_operation(index, operation, channel, context, calibration)
            })
            .collect::<Result<Vec<_>>>()?;
        let program = Program::new(segments, self.end);
        awg_log::diagnostic!(
            "Resolved program {}:\n{}",
            program.fingerprint().short(),
            program.quantization_report(context.sample_rate_hz, context.segment_quantum)
        );
        Ok(program)
    }
}

/// Capability to append operations to the builder of the current pass.
pub struct Contributor<'a> {
    builder: &'a mut SegmentBuilder,
}

impl Contributor<'_> {
    pub fn contribute(&mut self, operation: Operation, channel: impl Into<ChannelUid>) -> usize {
        self.builder.contribute(operation, channel)
    }

    /// Handle for a child contributor. The parent can append again once the child is dropped.
    pub fn child(&mut self) -> Contributor<'_> {
        Contributor {
            builder: &mut *self.builder,
        }
    }

    /// Number of operations contributed so far in this pass.
    pub fn position(&self) -> usize {
        self.builder.len()
    }
}

fn resolve_operation<C>(
    index: usize,
    operation: Operation,
    channel: ChannelUid,
    context: &CalibrationContext<'_>,
    calibration: &C,
) -> Result<ResolvedSegment>
where
    C: CalibrationTransform + ?Sized,
{
    let fail = |channel: &ChannelUid, reason: String| Error::Calibration {
        index,
        channel: channel.clone(),
        reason,
    };
    let hardware_channel = context
        .hardware_channel(&channel)
        .ok_or_else(|| fail(&channel, "Unknown channel".to_string()))?;
    check_advance(operation.advance(), context).map_err(|reason| fail(&channel, reason))?;
    let parameters = calibration
        .transform(&operation, &channel, context)
        .map_err(|e| fail(&channel, format!("{e:#}")))?;
    check_parameters(&parameters, context).map_err(|reason| fail(&channel, reason))?;

    let requested = length_to_samples(parameters.duration_s, context.sample_rate_hz);
    if requested == 0 {
        return Err(fail(
            &channel,
            format!(
                "Duration {} s is shorter than one sample",
                parameters.duration_s
            ),
        ));
    }
    let max_samples = context.traits.max_segment_samples;
    let quantized = ceil_to_grid(requested, context.segment_quantum);
    if requested > max_samples || quantized > max_samples {
        return Err(fail(
            &channel,
            format!(
                "Duration {} s needs {} samples, the card holds at most {max_samples} per segment",
                parameters.duration_s,
                requested.max(quantized)
            ),
        ));
    }
    Ok(ResolvedSegment::new(
        channel,
        hardware_channel,
        parameters.tones,
        parameters.shape,
        QuantizationInfo {
            requested,
            quantized,
        },
        operation.advance(),
        operation.label().map(str::to_string),
    ))
}

fn check_advance(advance: AdvanceMode, context: &CalibrationContext<'_>) -> Result<(), String> {
    if let AdvanceMode::Loop(LoopCount::Finite(count)) = advance {
        if count == 0 {
            return Err("Loop count must be at least 1".to_string());
        }
        if count > context.traits.max_loops {
            return Err(format!(
                "Loop count {count} exceeds the card maximum of {}",
                context.traits.max_loops
            ));
        }
    }
    Ok(())
}

fn check_parameters(
    parameters: &SegmentParameters,
    context: &CalibrationContext<'_>,
) -> Result<(), String> {
    if !parameters.duration_s.is_finite() || parameters.duration_s <= 0.0 {
        return Err(format!(
            "Duration must be positive, got {} s",
            parameters.duration_s
        ));
    }
    let nyquist = context.nyquist_hz();
    let mut total_amplitude = 0.0;
    for tone in &parameters.tones {
        for frequency in [tone.start_frequency_hz, tone.end_frequency_hz] {
            if !frequency.is_finite() || frequency < 0.0 || frequency >= nyquist {
                return Err(format!(
                    "Frequency {frequency} Hz outside of [0, {nyquist}) Hz"
                ));
            }
        }
        if !tone.peak_amplitude().is_finite() || !tone.phase_rad.is_finite() {
            return Err("Tone amplitude and phase must be finite".to_string());
        }
        total_amplitude += tone.peak_amplitude();
    }
    if total_amplitude > 1.0 + AMPLITUDE_TOLERANCE {
        return Err(format!(
            "Summed tone amplitude {total_amplitude:.6} exceeds full scale and would clip"
        ));
    }
    Ok(())
}
