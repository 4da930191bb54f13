// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use indexmap::IndexMap;

use crate::operation::ChannelUid;
use crate::{Error, Result};

/// Operating window of one hardware output.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelCalibration {
    pub freq_min_hz: f64,
    pub freq_max_hz: f64,
    /// Largest amplitude a single tone may request, in mV.
    pub max_amplitude_mv: f64,
}

impl ChannelCalibration {
    pub fn new(freq_min_hz: f64, freq_max_hz: f64, max_amplitude_mv: f64) -> Self {
        Self {
            freq_min_hz,
            freq_max_hz,
            max_amplitude_mv,
        }
    }

    /// A window that only excludes DC and negative frequencies.
    pub fn unrestricted() -> Self {
        Self::new(0.0, f64::INFINITY, f64::INFINITY)
    }

    pub fn contains_frequency(&self, frequency_hz: f64) -> bool {
        frequency_hz >= self.freq_min_hz && frequency_hz <= self.freq_max_hz
    }
}

/// What the card outputs are connected to: the logical channel names used by
/// contributors, their hardware output index and their calibration window.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalSetup {
    name: String,
    channels: IndexMap<ChannelUid, (u16, ChannelCalibration)>,
}

impl PhysicalSetup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channels: IndexMap::new(),
        }
    }

    /// Setup with the given logical channels mapped to outputs 0, 1, ... in order,
    /// without frequency or amplitude restrictions.
    pub fn uncalibrated<I, C>(channels: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ChannelUid>,
    {
        channels
            .into_iter()
            .enumerate()
            .fold(Self::new("uncalibrated"), |setup, (index, channel)| {
                setup.with_channel(channel, index as u16, ChannelCalibration::unrestricted())
            })
    }

    pub fn with_channel(
        mut self,
        channel: impl Into<ChannelUid>,
        hardware_channel: u16,
        calibration: ChannelCalibration,
    ) -> Self {
        self.channels
            .insert(channel.into(), (hardware_channel, calibration));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hardware_channel(&self, channel: &ChannelUid) -> Option<u16> {
        self.channels.get(channel).map(|(index, _)| *index)
    }

    pub fn calibration(&self, channel: &ChannelUid) -> Option<&ChannelCalibration> {
        self.channels.get(channel).map(|(_, calibration)| calibration)
    }

    pub fn logical_channels(&self) -> impl Iterator<Item = &ChannelUid> {
        self.channels.keys()
    }

    /// Bit mask of the hardware outputs in use.
    ///
    /// Outputs above 31 have no bit in the mask and are left out.
    pub fn channel_mask(&self) -> u32 {
        self.channels.values().fold(0, |mask, (index, _)| {
            mask | 1u32.checked_shl(u32::from(*index)).unwrap_or(0)
        })
    }
}

impl Default for PhysicalSetup {
    fn default() -> Self {
        Self::uncalibrated(["H"])
    }
}

const AOD_MAX_AMPLITUDE_MV: f64 = 282.0;

fn builtin_setups() -> Vec<PhysicalSetup> {
    vec![
        PhysicalSetup::new("AWG_817_CALIB")
            .with_channel(
                "H",
                0,
                ChannelCalibration::new(80e6, 120e6, AOD_MAX_AMPLITUDE_MV),
            )
            .with_channel(
                "V",
                1,
                ChannelCalibration::new(80e6, 120e6, AOD_MAX_AMPLITUDE_MV),
            ),
        PhysicalSetup::new("AWG_938_CALIB").with_channel(
            "H",
            0,
            ChannelCalibration::new(90e6, 246.5e6, AOD_MAX_AMPLITUDE_MV),
        ),
        PhysicalSetup::new("AWG_1145_CALIB").with_channel(
            "H",
            0,
            ChannelCalibration::new(85e6, 135e6, AOD_MAX_AMPLITUDE_MV),
        ),
    ]
}

/// Look up one of the built-in physical setups by name.
pub fn lookup_physical_setup(name: &str) -> Result<PhysicalSetup> {
    let setups = builtin_setups();
    if let Some(setup) = setups.iter().find(|s| s.name == name) {
        return Ok(setup.clone());
    }
    let mut valid = setups.iter().map(|s| s.name.as_str()).collect::<Vec<_>>();
    valid.sort_unstable();
    Err(Error::new(&format!(
        "Unknown physical setup '{name}'. Valid options: {}",
        valid.join(", ")
    )))
}
