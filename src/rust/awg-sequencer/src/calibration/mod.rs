// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Calibration plumbing between physics-domain operations and hardware
//! parameters.
//!
//! The numerical transform itself is injected through [`CalibrationTransform`].
//! Any `Fn(&Operation, &ChannelUid, &CalibrationContext) -> anyhow::Result<SegmentParameters>`
//! closure qualifies, as does the bundled [`DirectCalibration`].
mod direct;
mod physical_setup;

pub use direct::DirectCalibration;
pub use physical_setup::{ChannelCalibration, PhysicalSetup, lookup_physical_setup};

use crate::Samples;
use crate::device_traits::CardTraits;
use crate::operation::{ChannelUid, Operation, RampShape};

/// Hardware parameters of one tone.
///
/// Amplitudes are fractions of the DAC full scale, frequencies in Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneParameters {
    pub start_frequency_hz: f64,
    pub end_frequency_hz: f64,
    pub start_amplitude: f64,
    pub end_amplitude: f64,
    pub phase_rad: f64,
}

impl ToneParameters {
    pub fn constant(frequency_hz: f64, amplitude: f64, phase_rad: f64) -> Self {
        Self {
            start_frequency_hz: frequency_hz,
            end_frequency_hz: frequency_hz,
            start_amplitude: amplitude,
            end_amplitude: amplitude,
            phase_rad,
        }
    }

    pub fn peak_amplitude(&self) -> f64 {
        self.start_amplitude.abs().max(self.end_amplitude.abs())
    }
}

/// Output of a calibration transform for one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentParameters {
    pub tones: Vec<ToneParameters>,
    pub shape: RampShape,
    pub duration_s: f64,
}

/// Read-only context handed to calibration transforms.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationContext<'a> {
    pub sample_rate_hz: f64,
    /// Output range of the card, in mV peak.
    pub card_max_mv: f64,
    /// Segment lengths are rounded up to a multiple of this.
    pub segment_quantum: Samples,
    pub physical_setup: &'a PhysicalSetup,
    pub traits: &'static CardTraits,
}

impl CalibrationContext<'_> {
    pub fn hardware_channel(&self, channel: &ChannelUid) -> Option<u16> {
        self.physical_setup.hardware_channel(channel)
    }

    pub fn channel_calibration(&self, channel: &ChannelUid) -> Option<&ChannelCalibration> {
        self.physical_setup.calibration(channel)
    }

    pub fn nyquist_hz(&self) -> f64 {
        self.sample_rate_hz / 2.0
    }
}

/// Pure mapping from a physics-domain operation to hardware parameters.
///
/// Implementations must be deterministic: equal inputs must produce equal
/// parameters, otherwise the segment cache cannot recognize unchanged content.
pub trait CalibrationTransform {
    fn transform(
        &self,
        operation: &Operation,
        channel: &ChannelUid,
        context: &CalibrationContext<'_>,
    ) -> anyhow::Result<SegmentParameters>;
}

impl<F> CalibrationTransform for F
where
    F: Fn(&Operation, &ChannelUid, &CalibrationContext<'_>) -> anyhow::Result<SegmentParameters>,
{
    fn transform(
        &self,
        operation: &Operation,
        channel: &ChannelUid,
        context: &CalibrationContext<'_>,
    ) -> anyhow::Result<SegmentParameters> {
        self(operation, channel, context)
    }
}
