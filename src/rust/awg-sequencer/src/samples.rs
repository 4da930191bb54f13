// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use crate::Samples;

/// Round `value` up to the next multiple of `grid`.
///
/// Saturates to the largest multiple of `grid` that fits into [`Samples`].
pub fn ceil_to_grid(value: Samples, grid: Samples) -> Samples {
    if grid == 0 {
        return value;
    }
    let padding = (grid - (value % grid)) % grid;
    value
        .checked_add(padding)
        .unwrap_or(Samples::MAX - Samples::MAX % grid)
}

/// Convert a duration in seconds to the nearest number of samples.
///
/// Negative durations saturate to zero.
pub fn length_to_samples(t: f64, sampling_rate: f64) -> Samples {
    (t * sampling_rate).round() as Samples
}

pub fn samples_to_length(samples: Samples, sampling_rate: f64) -> f64 {
    samples as f64 / sampling_rate
}

/// Human readable time of a sample count, e.g. `40.000 us (25000 Sa)`.
pub fn format_samples_time(samples: Samples, sampling_rate: f64) -> String {
    let seconds = samples_to_length(samples, sampling_rate);
    let (value, unit) = if seconds >= 1e-3 {
        (seconds * 1e3, "ms")
    } else if seconds >= 1e-6 {
        (seconds * 1e6, "us")
    } else {
        (seconds * 1e9, "ns")
    };
    format!("{value:.3} {unit} ({samples} Sa)")
}
