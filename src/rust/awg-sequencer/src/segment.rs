// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Hardware-ready segment descriptors.
//!
//! A [`ResolvedSegment`] is immutable: its fingerprint is computed once at
//! construction from every field except the label, so two segments with
//! identical hardware content always carry identical fingerprints.
use serde::Serialize;

use crate::Samples;
use crate::calibration::ToneParameters;
use crate::fingerprint::Fingerprint;
use crate::operation::{AdvanceMode, ChannelUid, LoopCount, RampShape};
use crate::utils::normalize_f64;

/// Segment length before and after rounding to the segment quantum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuantizationInfo {
    pub requested: Samples,
    pub quantized: Samples,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSegment {
    channel: ChannelUid,
    hardware_channel: u16,
    tones: Vec<ToneParameters>,
    shape: RampShape,
    quantization: QuantizationInfo,
    advance: AdvanceMode,
    label: Option<String>,
    fingerprint: Fingerprint,
}

/// Canonical view of the fingerprinted fields.
#[derive(Serialize)]
struct FingerprintFields<'a> {
    channel: &'a ChannelUid,
    hardware_channel: u16,
    tones: Vec<[u64; 5]>,
    shape: RampShape,
    quantization: QuantizationInfo,
    advance: AdvanceMode,
}

impl ResolvedSegment {
    pub fn new(
        channel: ChannelUid,
        hardware_channel: u16,
        tones: Vec<ToneParameters>,
        shape: RampShape,
        quantization: QuantizationInfo,
        advance: AdvanceMode,
        label: Option<String>,
    ) -> Self {
        let fingerprint = Fingerprint::of(&FingerprintFields {
            channel: &channel,
            hardware_channel,
            tones: tones
                .iter()
                .map(|tone| {
                    [
                        normalize_f64(tone.start_frequency_hz),
                        normalize_f64(tone.end_frequency_hz),
                        normalize_f64(tone.start_amplitude),
                        normalize_f64(tone.end_amplitude),
                        normalize_f64(tone.phase_rad),
                    ]
                })
                .collect(),
            shape,
            quantization,
            advance,
        });
        Self {
            channel,
            hardware_channel,
            tones,
            shape,
            quantization,
            advance,
            label,
            fingerprint,
        }
    }

    pub fn channel(&self) -> &ChannelUid {
        &self.channel
    }

    pub fn hardware_channel(&self) -> u16 {
        self.hardware_channel
    }

    pub fn tones(&self) -> &[ToneParameters] {
        &self.tones
    }

    pub fn shape(&self) -> RampShape {
        self.shape
    }

    /// Length in samples, after quantization.
    pub fn length(&self) -> Samples {
        self.quantization.quantized
    }

    pub fn quantization(&self) -> QuantizationInfo {
        self.quantization
    }

    pub fn advance(&self) -> AdvanceMode {
        self.advance
    }

    /// Number of back-to-back repetitions per pass; `1` unless looping a finite count.
    pub fn loops(&self) -> u32 {
        match self.advance {
            AdvanceMode::Loop(LoopCount::Finite(count)) => count,
            _ => 1,
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Single-tone segment of `length` samples on channel "H".
    pub(crate) fn tone_segment(frequency_hz: f64, length: Samples) -> ResolvedSegment {
        ResolvedSegment::new(
            "H".into(),
            0,
            vec![ToneParameters::constant(frequency_hz, 0.5, 0.0)],
            RampShape::Linear,
            QuantizationInfo {
                requested: length,
                quantized: length,
            },
            AdvanceMode::Auto,
            None,
        )
    }

    #[test]
    fn test_identical_fields_identical_fingerprint() {
        assert_eq!(
            tone_segment(1e6, 6400).fingerprint(),
            tone_segment(1e6, 6400).fingerprint()
        );
    }

    #[test]
    fn test_label_is_not_fingerprinted() {
        let a = tone_segment(1e6, 6400);
        let b = ResolvedSegment::new(
            a.channel().clone(),
            a.hardware_channel(),
            a.tones().to_vec(),
            a.shape(),
            a.quantization(),
            a.advance(),
            Some("chirp".to_string()),
        );
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_signed_zero_fingerprint() {
        let mut tone = ToneParameters::constant(1e6, 0.5, 0.0);
        let a = ResolvedSegment::new(
            "H".into(),
            0,
            vec![tone],
            RampShape::Linear,
            QuantizationInfo {
                requested: 64,
                quantized: 64,
            },
            AdvanceMode::Auto,
            None,
        );
        tone.phase_rad = -0.0;
        let b = ResolvedSegment::new(
            "H".into(),
            0,
            vec![tone],
            RampShape::Linear,
            a.quantization(),
            AdvanceMode::Auto,
            None,
        );
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    /// Every fingerprinted field must change the fingerprint.
    #[test]
    fn test_fingerprint_sensitivity() {
        let base = tone_segment(1e6, 6400);
        let rebuild = |channel: &str,
                       hardware_channel: u16,
                       tone: ToneParameters,
                       shape: RampShape,
                       quantized: Samples,
                       advance: AdvanceMode| {
            ResolvedSegment::new(
                channel.into(),
                hardware_channel,
                vec![tone],
                shape,
                QuantizationInfo {
                    requested: 6400,
                    quantized,
                },
                advance,
                None,
            )
        };
        let tone = base.tones()[0];
        let cases = vec![
            (
                "channel",
                rebuild("V", 0, tone, RampShape::Linear, 6400, AdvanceMode::Auto),
            ),
            (
                "hardware_channel",
                rebuild("H", 1, tone, RampShape::Linear, 6400, AdvanceMode::Auto),
            ),
            (
                "end_frequency",
                rebuild(
                    "H",
                    0,
                    ToneParameters {
                        end_frequency_hz: 2e6,
                        ..tone
                    },
                    RampShape::Linear,
                    6400,
                    AdvanceMode::Auto,
                ),
            ),
            (
                "amplitude",
                rebuild(
                    "H",
                    0,
                    ToneParameters {
                        start_amplitude: 0.4,
                        ..tone
                    },
                    RampShape::Linear,
                    6400,
                    AdvanceMode::Auto,
                ),
            ),
            (
                "phase",
                rebuild(
                    "H",
                    0,
                    ToneParameters {
                        phase_rad: 0.1,
                        ..tone
                    },
                    RampShape::Linear,
                    6400,
                    AdvanceMode::Auto,
                ),
            ),
            (
                "shape",
                rebuild("H", 0, tone, RampShape::MinimumJerk, 6400, AdvanceMode::Auto),
            ),
            (
                "length",
                rebuild("H", 0, tone, RampShape::Linear, 6432, AdvanceMode::Auto),
            ),
            (
                "advance",
                rebuild("H", 0, tone, RampShape::Linear, 6400, AdvanceMode::Hold),
            ),
            (
                "loops",
                rebuild(
                    "H",
                    0,
                    tone,
                    RampShape::Linear,
                    6400,
                    AdvanceMode::Loop(LoopCount::Finite(2)),
                ),
            ),
        ];
        for (desc, other) in cases {
            assert_ne!(
                base.fingerprint(),
                other.fingerprint(),
                "Fingerprint sensitivity failed on field: {desc}"
            );
        }
    }

    #[test]
    fn test_loops() {
        let segment = |advance| {
            ResolvedSegment::new(
                "H".into(),
                0,
                vec![],
                RampShape::Linear,
                QuantizationInfo {
                    requested: 32,
                    quantized: 32,
                },
                advance,
                None,
            )
        };
        assert_eq!(segment(AdvanceMode::Auto).loops(), 1);
        assert_eq!(segment(AdvanceMode::Hold).loops(), 1);
        assert_eq!(segment(AdvanceMode::Loop(LoopCount::Finite(7))).loops(), 7);
        assert_eq!(segment(AdvanceMode::Loop(LoopCount::UntilTrigger)).loops(), 1);
    }

    proptest! {
        #[test]
        fn prop_fingerprint_is_pure(freq in 1.0f64..1e9, length in 1u64..1_000_000) {
            prop_assert_eq!(
                tone_segment(freq, length).fingerprint(),
                tone_segment(freq, length).fingerprint()
            );
        }

        #[test]
        fn prop_fingerprint_separates_frequencies(a in 1.0f64..1e9, b in 1.0f64..1e9) {
            prop_assume!(a != b);
            prop_assert_ne!(
                tone_segment(a, 6400).fingerprint(),
                tone_segment(b, 6400).fingerprint()
            );
        }
    }
}
