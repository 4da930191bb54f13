// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Settings of one sequencer session.
use crate::Samples;
use crate::calibration::{CalibrationContext, PhysicalSetup, lookup_physical_setup};
use crate::device::CardConfig;
use crate::device_traits::{CardKind, CardTraits};
use crate::program::EndOfProgram;
use crate::samples::{ceil_to_grid, format_samples_time, length_to_samples, samples_to_length};
use crate::{Error, Result};

/// Largest hardware channel index that fits into the channel mask.
const MAX_HARDWARE_CHANNEL: u16 = 31;

#[derive(Debug, Clone)]
pub struct SanitizationChange {
    pub field: &'static str,
    pub original: String,
    pub sanitized: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct SequencerSettings {
    card: CardKind,
    sample_rate_hz: f64,
    card_max_mv: f64,
    segment_quantum_s: f64,
    physical_setup: PhysicalSetup,
    pub end_of_program: EndOfProgram,
    pub trigger_level_v: f64,
}

impl Default for SequencerSettings {
    fn default() -> Self {
        Self {
            card: CardKind::default(),
            sample_rate_hz: 625e6,
            card_max_mv: 282.0,
            segment_quantum_s: 40e-6,
            physical_setup: PhysicalSetup::default(),
            end_of_program: EndOfProgram::Halt,
            trigger_level_v: 0.8,
        }
    }
}

impl SequencerSettings {
    pub fn new(
        card: CardKind,
        sample_rate_hz: f64,
        card_max_mv: f64,
        segment_quantum_s: f64,
        physical_setup: PhysicalSetup,
        end_of_program: EndOfProgram,
    ) -> Self {
        Self {
            card,
            sample_rate_hz,
            card_max_mv,
            segment_quantum_s,
            physical_setup,
            end_of_program,
            ..Default::default()
        }
    }

    /// Replace the physical setup by a built-in one.
    pub fn with_physical_setup_name(mut self, name: &str) -> Result<Self> {
        self.physical_setup = lookup_physical_setup(name)?;
        Ok(self)
    }

    pub fn card(&self) -> CardKind {
        self.card
    }

    pub fn traits(&self) -> &'static CardTraits {
        self.card.traits()
    }

    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    pub fn card_max_mv(&self) -> f64 {
        self.card_max_mv
    }

    pub fn segment_quantum_s(&self) -> f64 {
        self.segment_quantum_s
    }

    pub fn physical_setup(&self) -> &PhysicalSetup {
        &self.physical_setup
    }

    pub fn segment_quantum_samples(&self) -> Samples {
        length_to_samples(self.segment_quantum_s, self.sample_rate_hz)
    }

    pub fn calibration_context(&self) -> CalibrationContext<'_> {
        CalibrationContext {
            sample_rate_hz: self.sample_rate_hz,
            card_max_mv: self.card_max_mv,
            segment_quantum: self.segment_quantum_samples(),
            physical_setup: &self.physical_setup,
            traits: self.traits(),
        }
    }

    pub fn card_config(&self) -> CardConfig {
        CardConfig {
            sample_rate_hz: self.sample_rate_hz,
            amplitude_mv: self.card_max_mv,
            channel_mask: self.physical_setup.channel_mask(),
            trigger_level_v: self.trigger_level_v,
        }
    }

    /// Validate the settings against the card and round the segment quantum
    /// to a length the card can play.
    pub fn sanitize(&mut self) -> Result<Vec<SanitizationChange>> {
        let traits = self.traits();
        if !(self.sample_rate_hz > 0.0 && self.sample_rate_hz <= traits.max_sample_rate_hz) {
            return Err(Error::new(&format!(
                "Sample rate {} Hz outside of (0, {}] Hz",
                self.sample_rate_hz, traits.max_sample_rate_hz
            )));
        }
        if !(self.card_max_mv.is_finite() && self.card_max_mv > 0.0) {
            return Err(Error::new(&format!(
                "Expected a positive card output range, got {} mV",
                self.card_max_mv
            )));
        }
        if !(self.segment_quantum_s.is_finite() && self.segment_quantum_s >= 0.0) {
            return Err(Error::new(&format!(
                "Expected a non-negative segment quantum, got {} s",
                self.segment_quantum_s
            )));
        }
        if !self.trigger_level_v.is_finite() {
            return Err(Error::new("Trigger level must be finite"));
        }
        for channel in self.physical_setup.logical_channels() {
            let index = self.physical_setup.hardware_channel(channel).unwrap_or(0);
            if index > MAX_HARDWARE_CHANNEL {
                return Err(Error::new(&format!(
                    "Channel '{channel}' maps to hardware output {index}, the card has at most {}",
                    MAX_HARDWARE_CHANNEL + 1
                )));
            }
        }

        let mut changes = vec![];
        let requested = self.segment_quantum_samples();
        let (sanitized, reason) = sanitize_segment_quantum(requested, traits);
        if let Some(reason) = reason {
            changes.push(SanitizationChange {
                field: "segment_quantum_s",
                original: format_samples_time(requested, self.sample_rate_hz),
                sanitized: format_samples_time(sanitized, self.sample_rate_hz),
                reason,
            });
            self.segment_quantum_s = samples_to_length(sanitized, self.sample_rate_hz);
        }
        Ok(changes)
    }
}

fn sanitize_segment_quantum(value: Samples, traits: &CardTraits) -> (Samples, Option<String>) {
    if value < traits.min_segment_samples {
        return (
            traits.min_segment_samples,
            Some(format!(
                "Shorter than the minimum segment length of {} samples.",
                traits.min_segment_samples
            )),
        );
    }
    if !value.is_multiple_of(traits.sample_step) {
        return (
            ceil_to_grid(value, traits.sample_step),
            Some(format!("Not a multiple of {} samples.", traits.sample_step)),
        );
    }
    (value, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::ChannelCalibration;
    use crate::device_traits::{M2P_65XX_TRAITS, M4I_66XX_TRAITS};

    #[test]
    fn test_sanitize_segment_quantum() {
        assert_eq!(sanitize_segment_quantum(384, &M4I_66XX_TRAITS), (384, None));
        assert_eq!(sanitize_segment_quantum(0, &M4I_66XX_TRAITS).0, 384);
        assert_eq!(sanitize_segment_quantum(100, &M4I_66XX_TRAITS).0, 384);
        assert_eq!(sanitize_segment_quantum(25000, &M4I_66XX_TRAITS).0, 25024);
        assert_eq!(sanitize_segment_quantum(25000, &M2P_65XX_TRAITS), (25000, None));
    }

    #[test]
    fn test_sanitization_change() {
        let mut settings = SequencerSettings::default();
        assert_eq!(settings.segment_quantum_samples(), 25000);
        let changes = settings.sanitize().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, "segment_quantum_s");
        assert_eq!(changes[0].original, "40.000 us (25000 Sa)");
        assert_eq!(changes[0].sanitized, "40.038 us (25024 Sa)");
        assert_eq!(settings.segment_quantum_samples(), 25024);

        // Sanitized settings are a fixed point.
        assert!(settings.sanitize().unwrap().is_empty());
    }

    #[test]
    fn test_rejects_invalid_settings() {
        let base = SequencerSettings::default();
        let mut settings = SequencerSettings {
            sample_rate_hz: 2e9,
            ..base.clone()
        };
        assert!(settings.sanitize().is_err());
        let mut settings = SequencerSettings {
            card_max_mv: 0.0,
            ..base.clone()
        };
        assert!(settings.sanitize().is_err());
        let mut settings = SequencerSettings {
            segment_quantum_s: f64::NAN,
            ..base.clone()
        };
        assert!(settings.sanitize().is_err());
        let mut settings = SequencerSettings {
            physical_setup: PhysicalSetup::new("wide").with_channel(
                "X",
                32,
                ChannelCalibration::unrestricted(),
            ),
            ..base
        };
        assert!(settings.sanitize().is_err());
    }

    #[test]
    fn test_card_config() {
        let settings = SequencerSettings::default()
            .with_physical_setup_name("AWG_817_CALIB")
            .unwrap();
        let config = settings.card_config();
        assert_eq!(config.channel_mask, 0b11);
        assert_eq!(config.amplitude_mv, 282.0);
        assert_eq!(config.trigger_level_v, 0.8);
        assert!(
            SequencerSettings::default()
                .with_physical_setup_name("nope")
                .is_err()
        );
    }
}
