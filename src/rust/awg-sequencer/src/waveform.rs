// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::f64::consts::TAU;

use crate::segment::ResolvedSegment;

/// Render the DAC codes of one segment.
///
/// Each tone sweeps from its start to its end frequency and amplitude along
/// the segment's ramp shape. Phase is accumulated sample by sample, so
/// frequency ramps are continuous. The sum of all tones is clamped to the
/// DAC range.
pub fn render_segment(
    segment: &ResolvedSegment,
    sample_rate_hz: f64,
    full_scale: i16,
) -> Vec<i16> {
    let length = segment.length() as usize;
    let mut acc = vec![0.0f64; length];
    let shape = segment.shape();
    for tone in segment.tones() {
        let mut phase = tone.phase_rad;
        for (n, value) in acc.iter_mut().enumerate() {
            let p = shape.progress(n as f64 / length as f64);
            let frequency =
                tone.start_frequency_hz + (tone.end_frequency_hz - tone.start_frequency_hz) * p;
            let amplitude = tone.start_amplitude + (tone.end_amplitude - tone.start_amplitude) * p;
            *value += amplitude * phase.sin();
            phase = (phase + TAU * frequency / sample_rate_hz) % TAU;
        }
    }
    let scale = f64::from(full_scale);
    acc.into_iter()
        .map(|value| (value.clamp(-1.0, 1.0) * scale).round() as i16)
        .collect()
}

/// Little-endian byte image of DAC codes, as transferred to the card.
pub fn to_le_bytes(codes: &[i16]) -> Vec<u8> {
    codes.iter().flat_map(|code| code.to_le_bytes()).collect()
}
