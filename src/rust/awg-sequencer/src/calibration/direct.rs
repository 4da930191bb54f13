// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use anyhow::{anyhow, bail};

use super::{CalibrationContext, CalibrationTransform, SegmentParameters, ToneParameters};
use crate::operation::{ChannelUid, Operation, OperationKind, RampShape, Tone};

/// Uncalibrated transform: amplitudes are given in mV at the card output.
///
/// Frequencies and amplitudes are checked against the channel window of the
/// physical setup, then amplitudes are scaled to fractions of the card range.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectCalibration;

impl DirectCalibration {
    fn check_tone(
        tone: &Tone,
        channel: &ChannelUid,
        context: &CalibrationContext<'_>,
    ) -> anyhow::Result<()> {
        let calibration = context
            .channel_calibration(channel)
            .ok_or_else(|| anyhow!("No calibration for channel '{channel}'"))?;
        if !calibration.contains_frequency(tone.frequency_hz) {
            bail!(
                "Frequency {} Hz outside of the calibrated window [{}, {}] Hz",
                tone.frequency_hz,
                calibration.freq_min_hz,
                calibration.freq_max_hz
            );
        }
        if tone.amplitude.abs() > calibration.max_amplitude_mv {
            bail!(
                "Amplitude {} mV exceeds the channel limit of {} mV",
                tone.amplitude,
                calibration.max_amplitude_mv
            );
        }
        Ok(())
    }
}

impl CalibrationTransform for DirectCalibration {
    fn transform(
        &self,
        operation: &Operation,
        channel: &ChannelUid,
        context: &CalibrationContext<'_>,
    ) -> anyhow::Result<SegmentParameters> {
        let full_scale_mv = context.card_max_mv;
        let (tones, shape) = match operation.kind() {
            OperationKind::Hold { tones, .. } => {
                let mut out = Vec::with_capacity(tones.len());
                for tone in tones {
                    Self::check_tone(tone, channel, context)?;
                    out.push(ToneParameters::constant(
                        tone.frequency_hz,
                        tone.amplitude / full_scale_mv,
                        tone.phase_rad,
                    ));
                }
                (out, RampShape::Linear)
            }
            OperationKind::Ramp {
                from, to, shape, ..
            } => {
                if from.len() != to.len() {
                    bail!(
                        "Ramp moves {} tones into {} tones; counts must match",
                        from.len(),
                        to.len()
                    );
                }
                let mut out = Vec::with_capacity(from.len());
                for (start, end) in from.iter().zip(to) {
                    Self::check_tone(start, channel, context)?;
                    Self::check_tone(end, channel, context)?;
                    out.push(ToneParameters {
                        start_frequency_hz: start.frequency_hz,
                        end_frequency_hz: end.frequency_hz,
                        start_amplitude: start.amplitude / full_scale_mv,
                        end_amplitude: end.amplitude / full_scale_mv,
                        phase_rad: start.phase_rad,
                    });
                }
                (out, *shape)
            }
            OperationKind::Off { .. } => (vec![], RampShape::Linear),
        };
        Ok(SegmentParameters {
            tones,
            shape,
            duration_s: operation.kind().duration_s(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{ChannelCalibration, PhysicalSetup};
    use crate::device_traits::M4I_66XX_TRAITS;

    fn setup() -> PhysicalSetup {
        PhysicalSetup::new("test").with_channel("H", 0, ChannelCalibration::new(80e6, 120e6, 200.0))
    }

    fn context(setup: &PhysicalSetup) -> CalibrationContext<'_> {
        CalibrationContext {
            sample_rate_hz: 625e6,
            card_max_mv: 400.0,
            segment_quantum: 32,
            physical_setup: setup,
            traits: &M4I_66XX_TRAITS,
        }
    }

    #[test]
    fn test_hold_scales_amplitude() {
        let setup = setup();
        let op = Operation::hold(vec![Tone::new(100e6, 100.0).with_phase(0.5)], 10e-6);
        let params = DirectCalibration
            .transform(&op, &"H".into(), &context(&setup))
            .unwrap();
        assert_eq!(params.duration_s, 10e-6);
        assert_eq!(params.tones, vec![ToneParameters::constant(100e6, 0.25, 0.5)]);
    }

    #[test]
    fn test_ramp_keeps_shape() {
        let setup = setup();
        let op = Operation::ramp(
            vec![Tone::new(90e6, 40.0)],
            vec![Tone::new(110e6, 80.0)],
            20e-6,
            RampShape::MinimumJerk,
        );
        let params = DirectCalibration
            .transform(&op, &"H".into(), &context(&setup))
            .unwrap();
        assert_eq!(params.shape, RampShape::MinimumJerk);
        assert_eq!(params.tones[0].start_frequency_hz, 90e6);
        assert_eq!(params.tones[0].end_frequency_hz, 110e6);
        assert_eq!(params.tones[0].end_amplitude, 0.2);
    }

    #[test]
    fn test_rejects_frequency_outside_window() {
        let setup = setup();
        let op = Operation::hold(vec![Tone::new(150e6, 10.0)], 10e-6);
        let err = DirectCalibration
            .transform(&op, &"H".into(), &context(&setup))
            .unwrap_err();
        assert!(err.to_string().contains("outside of the calibrated window"));
    }

    #[test]
    fn test_rejects_amplitude_over_limit() {
        let setup = setup();
        let op = Operation::hold(vec![Tone::new(100e6, 250.0)], 10e-6);
        assert!(
            DirectCalibration
                .transform(&op, &"H".into(), &context(&setup))
                .is_err()
        );
    }

    #[test]
    fn test_rejects_mismatched_ramp() {
        let setup = setup();
        let op = Operation::ramp(
            vec![Tone::new(90e6, 40.0)],
            vec![],
            20e-6,
            RampShape::Linear,
        );
        assert!(
            DirectCalibration
                .transform(&op, &"H".into(), &context(&setup))
                .is_err()
        );
    }
}
