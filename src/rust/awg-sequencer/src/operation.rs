// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Physics-domain operations contributed by the experiment tree.
//!
//! An [`Operation`] describes what a channel should output for one segment,
//! in the units the contributor thinks in. It carries no hardware state; the
//! calibration transform turns it into hardware parameters during resolution.
use serde::Serialize;
use std::fmt;

/// Name of a logical output channel, e.g. `"H"` or `"V"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ChannelUid(String);

impl ChannelUid {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelUid {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ChannelUid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A single sinusoidal tone.
///
/// The unit of `amplitude` is defined by the calibration in use
/// (millivolts for [`crate::calibration::DirectCalibration`]).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub frequency_hz: f64,
    pub amplitude: f64,
    pub phase_rad: f64,
}

impl Tone {
    pub fn new(frequency_hz: f64, amplitude: f64) -> Self {
        Self {
            frequency_hz,
            amplitude,
            phase_rad: 0.0,
        }
    }

    pub fn with_phase(mut self, phase_rad: f64) -> Self {
        self.phase_rad = phase_rad;
        self
    }
}

/// Trajectory followed by a ramp between its start and end tones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RampShape {
    #[default]
    Linear,
    /// Fifth order polynomial with zero velocity and acceleration at both ends.
    MinimumJerk,
}

impl RampShape {
    /// Fraction of the ramp completed at normalized time `x` in `[0, 1]`.
    pub fn progress(&self, x: f64) -> f64 {
        let x = x.clamp(0.0, 1.0);
        match self {
            RampShape::Linear => x,
            RampShape::MinimumJerk => x * x * x * (10.0 - 15.0 * x + 6.0 * x * x),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperationKind {
    /// Play static tones.
    Hold { tones: Vec<Tone>, duration_s: f64 },
    /// Move tones from `from` to `to`, pairwise by index.
    Ramp {
        from: Vec<Tone>,
        to: Vec<Tone>,
        duration_s: f64,
        shape: RampShape,
    },
    /// Output silence.
    Off { duration_s: f64 },
}

impl OperationKind {
    pub fn duration_s(&self) -> f64 {
        match self {
            OperationKind::Hold { duration_s, .. }
            | OperationKind::Ramp { duration_s, .. }
            | OperationKind::Off { duration_s } => *duration_s,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopCount {
    Finite(u32),
    /// Repeat until an external trigger arrives.
    UntilTrigger,
}

/// How playback leaves a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceMode {
    /// Play once, then advance to the next segment.
    #[default]
    Auto,
    /// Repeat until an external trigger, then advance.
    Hold,
    Loop(LoopCount),
}

impl AdvanceMode {
    /// Whether leaving the segment requires an external trigger.
    pub fn waits_for_trigger(&self) -> bool {
        matches!(
            self,
            AdvanceMode::Hold | AdvanceMode::Loop(LoopCount::UntilTrigger)
        )
    }
}

/// An immutable physics-domain instruction for one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    kind: OperationKind,
    advance: AdvanceMode,
    label: Option<String>,
}

impl Operation {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            advance: AdvanceMode::Auto,
            label: None,
        }
    }

    pub fn hold(tones: Vec<Tone>, duration_s: f64) -> Self {
        Self::new(OperationKind::Hold { tones, duration_s })
    }

    pub fn ramp(from: Vec<Tone>, to: Vec<Tone>, duration_s: f64, shape: RampShape) -> Self {
        Self::new(OperationKind::Ramp {
            from,
            to,
            duration_s,
            shape,
        })
    }

    pub fn off(duration_s: f64) -> Self {
        Self::new(OperationKind::Off { duration_s })
    }

    pub fn with_advance(mut self, advance: AdvanceMode) -> Self {
        self.advance = advance;
        self
    }

    /// Attach a name shown in logs and reports.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    pub fn advance(&self) -> AdvanceMode {
        self.advance
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}
