// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Host-side ownership of one AWG card.
//!
//! A [`DeviceHandle`] couples the transport to the card with the record of
//! what is resident on it. All upload paths take the handle by `&mut`, so at
//! most one pipeline pass can touch a card and its [`UploadedState`] at a time.
use std::collections::BTreeSet;

use crate::cache::UploadedState;
use crate::device_traits::CardTraits;
use crate::program::SlotId;
use crate::sequence_table::SequenceTable;

/// One-time card setup applied before the first transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct CardConfig {
    pub sample_rate_hz: f64,
    /// Output range, in mV peak.
    pub amplitude_mv: f64,
    /// Enabled hardware channels, bit `n` for channel `n`.
    pub channel_mask: u32,
    /// Level of the external trigger input, in V.
    pub trigger_level_v: f64,
}

/// Blocking transfer primitives of a card driver.
///
/// Each call either completes or errors; a failed call may have left the
/// target partially written.
pub trait DeviceTransport {
    fn configure(&mut self, config: &CardConfig) -> anyhow::Result<()>;

    fn write_segment(&mut self, slot: SlotId, data: &[u8]) -> anyhow::Result<()>;

    fn write_sequence_table(&mut self, table: &SequenceTable) -> anyhow::Result<()>;
}

impl<T: DeviceTransport + ?Sized> DeviceTransport for Box<T> {
    fn configure(&mut self, config: &CardConfig) -> anyhow::Result<()> {
        (**self).configure(config)
    }

    fn write_segment(&mut self, slot: SlotId, data: &[u8]) -> anyhow::Result<()> {
        (**self).write_segment(slot, data)
    }

    fn write_sequence_table(&mut self, table: &SequenceTable) -> anyhow::Result<()> {
        (**self).write_sequence_table(table)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
}

/// Device objects whose content is unknown after a failed upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Taint {
    pub slots: BTreeSet<SlotId>,
    pub sequence_table: bool,
}

impl Taint {
    pub fn is_clean(&self) -> bool {
        self.slots.is_empty() && !self.sequence_table
    }
}

pub struct DeviceHandle<T> {
    transport: T,
    traits: &'static CardTraits,
    config: CardConfig,
    state: UploadedState,
    configured: bool,
    playback: PlaybackState,
    taint: Taint,
}

impl<T: DeviceTransport> DeviceHandle<T> {
    /// Wrap a transport. The uploaded state starts cold.
    pub fn new(transport: T, traits: &'static CardTraits, config: CardConfig) -> Self {
        Self {
            transport,
            traits,
            config,
            state: UploadedState::new(),
            configured: false,
            playback: PlaybackState::Stopped,
            taint: Taint::default(),
        }
    }

    pub fn uploaded_state(&self) -> &UploadedState {
        &self.state
    }

    pub fn traits(&self) -> &'static CardTraits {
        self.traits
    }

    pub fn config(&self) -> &CardConfig {
        &self.config
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback
    }

    /// Record that the trigger layer started playback.
    pub fn playback_started(&mut self) {
        self.playback = PlaybackState::Playing;
    }

    /// Signal that playback finished and the card may be reprogrammed.
    pub fn safe_to_reprogram(&mut self) {
        self.playback = PlaybackState::Stopped;
    }

    /// Whether an upload may run now.
    pub fn may_upload(&self) -> bool {
        self.playback == PlaybackState::Stopped || self.traits.double_buffered
    }

    /// Slots that must be rewritten regardless of their recorded fingerprint.
    pub fn tainted_slots(&self) -> impl Iterator<Item = SlotId> + '_ {
        self.taint.slots.iter().copied()
    }

    /// Drop all knowledge about the card content, e.g. after a power cycle.
    ///
    /// The next pass uploads everything and reconfigures the card.
    pub fn forget(&mut self) {
        self.state = UploadedState::new();
        self.taint = Taint::default();
        self.configured = false;
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub(crate) fn ensure_configured(&mut self) -> anyhow::Result<()> {
        if !self.configured {
            self.transport.configure(&self.config)?;
            self.configured = true;
        }
        Ok(())
    }

    pub(crate) fn invalidate_configuration(&mut self) {
        self.configured = false;
    }

    pub(crate) fn taint(&self) -> &Taint {
        &self.taint
    }

    pub(crate) fn taint_mut(&mut self) -> &mut Taint {
        &mut self.taint
    }

    pub(crate) fn state_mut(&mut self) -> &mut UploadedState {
        &mut self.state
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::device_traits::M4I_66XX_TRAITS;
    use crate::simulation::{SimulatedCard, TransferRecord};

    pub(crate) fn card_config() -> CardConfig {
        CardConfig {
            sample_rate_hz: 640e6,
            amplitude_mv: 282.0,
            channel_mask: 0b1,
            trigger_level_v: 0.8,
        }
    }

    #[test]
    fn test_configures_once() {
        let mut handle = DeviceHandle::new(SimulatedCard::new(), &M4I_66XX_TRAITS, card_config());
        handle.ensure_configured().unwrap();
        handle.ensure_configured().unwrap();
        assert_eq!(
            handle.transport().records(),
            &[TransferRecord::Configure(card_config())]
        );
        handle.invalidate_configuration();
        handle.ensure_configured().unwrap();
        assert_eq!(handle.transport().records().len(), 2);
    }

    #[test]
    fn test_playback_gate() {
        let mut handle = DeviceHandle::new(SimulatedCard::new(), &M4I_66XX_TRAITS, card_config());
        assert!(handle.may_upload());
        handle.playback_started();
        assert_eq!(handle.playback_state(), PlaybackState::Playing);
        assert!(!handle.may_upload());
        handle.safe_to_reprogram();
        assert!(handle.may_upload());

        static DOUBLE_BUFFERED: CardTraits = CardTraits {
            double_buffered: true,
            ..M4I_66XX_TRAITS
        };
        let mut handle = DeviceHandle::new(SimulatedCard::new(), &DOUBLE_BUFFERED, card_config());
        handle.playback_started();
        assert!(handle.may_upload());
    }

    #[test]
    fn test_forget() {
        let mut handle = DeviceHandle::new(SimulatedCard::new(), &M4I_66XX_TRAITS, card_config());
        handle.ensure_configured().unwrap();
        handle.taint_mut().slots.insert(SlotId(3));
        handle.forget();
        assert!(handle.uploaded_state().is_cold());
        assert_eq!(handle.tainted_slots().count(), 0);
        handle.ensure_configured().unwrap();
        assert_eq!(handle.transport().records().len(), 2);
    }
}
