// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

/// Card specific limits of the sequence-mode replay engine.
///
/// The values bound the programs the builder may produce; they are checked
/// before any hardware access.
#[derive(Debug, PartialEq)]
pub struct CardTraits {
    /// Segment lengths must be a multiple of this many samples.
    pub sample_step: u64,
    /// Shortest segment the card accepts, in samples.
    pub min_segment_samples: u64,
    /// Longest segment that fits into card memory, in samples.
    pub max_segment_samples: u64,
    pub max_segments: u32,
    pub max_sequence_steps: u32,
    pub max_loops: u32,
    /// Largest positive DAC code.
    pub dac_full_scale: i16,
    pub max_sample_rate_hz: f64,
    /// Whether segments and sequence table may be rewritten while the card plays.
    pub double_buffered: bool,
}

pub const M4I_66XX_TRAITS: CardTraits = CardTraits {
    sample_step: 32,
    min_segment_samples: 384,
    max_segment_samples: 1 << 30,
    max_segments: 65536,
    max_sequence_steps: 4096,
    max_loops: (1 << 20) - 1,
    dac_full_scale: i16::MAX,
    max_sample_rate_hz: 1.25e9,
    double_buffered: false,
};

pub const M2P_65XX_TRAITS: CardTraits = CardTraits {
    sample_step: 8,
    min_segment_samples: 32,
    max_segment_samples: 1 << 29,
    max_segments: 32768,
    max_sequence_steps: 4096,
    max_loops: (1 << 20) - 1,
    dac_full_scale: i16::MAX,
    max_sample_rate_hz: 125e6,
    double_buffered: false,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CardKind {
    #[default]
    M4i66xx,
    M2p65xx,
}

impl CardKind {
    pub fn traits(&self) -> &'static CardTraits {
        match self {
            CardKind::M4i66xx => &M4I_66XX_TRAITS,
            CardKind::M2p65xx => &M2P_65XX_TRAITS,
        }
    }
}
