// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Segment builder, calibration resolution and incremental upload engine for
//! AWG cards running in sequence mode.
//!
//! The host-side flow of one experiment iteration is
//! [`SegmentBuilder`] → [`diff`] → [`upload::apply`], driven end to end by
//! [`AwgSession`]. The result is a [`ReadyProgram`], the only type handed to
//! the real-time trigger layer.

pub mod builder;
pub mod cache;
pub mod calibration;
pub mod device;
pub mod device_traits;
pub mod fingerprint;
pub mod operation;
pub mod pipeline;
pub mod program;
pub mod ready;
pub mod samples;
pub mod segment;
pub mod sequence_table;
pub mod settings;
pub mod simulation;
pub mod upload;
pub mod waveform;
pub(crate) mod utils;

pub use builder::{Contributor, SegmentBuilder};
pub use cache::{SlotAction, UploadPlan, UploadedState, diff};
pub use calibration::{CalibrationContext, CalibrationTransform, SegmentParameters};
pub use device::{CardConfig, DeviceHandle, DeviceTransport, PlaybackState};
pub use fingerprint::Fingerprint;
pub use operation::{AdvanceMode, ChannelUid, LoopCount, Operation, OperationKind, RampShape};
pub use pipeline::{AwgSession, PipelineState, PreparedUpload};
pub use program::{EndOfProgram, Program, SlotId};
pub use ready::{ReadyProgram, SegmentDescriptor};
pub use segment::ResolvedSegment;
pub use sequence_table::{SequenceTable, assemble};
pub use settings::{SanitizationChange, SequencerSettings};
pub use upload::CommitResult;

pub type Samples = u64;

/// Hardware object a failed transfer was addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadTarget {
    Configuration,
    Segment(SlotId),
    SequenceTable,
}

impl std::fmt::Display for UploadTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadTarget::Configuration => write!(f, "card configuration"),
            UploadTarget::Segment(slot) => write!(f, "segment slot {slot}"),
            UploadTarget::SequenceTable => write!(f, "sequence table"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An operation could not be resolved into hardware parameters.
    ///
    /// `index` is the position of the operation in contribution order.
    #[error("Failed to resolve operation #{index} on channel '{channel}': {reason}")]
    Calibration {
        index: usize,
        channel: ChannelUid,
        reason: String,
    },
    /// A host-to-device transfer failed. The uploaded state was left untouched.
    #[error("Upload of {target} failed")]
    Upload {
        target: UploadTarget,
        #[source]
        source: anyhow::Error,
    },
    /// Internal mismatch between program, plan and sequence table.
    #[error("Internal error: {0}")]
    Consistency(String),
    #[error("Program requires {required} {what}, but the card supports at most {available}")]
    Capacity {
        what: &'static str,
        required: usize,
        available: usize,
    },
    #[error(
        "The card is playing and does not support double-buffered switching; signal that it is safe to reprogram first"
    )]
    PlaybackActive,
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    pub fn new(msg: &str) -> Self {
        Error::Anyhow(anyhow::anyhow!(msg.to_string()))
    }

    pub(crate) fn consistency(msg: impl Into<String>) -> Self {
        Error::Consistency(msg.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
