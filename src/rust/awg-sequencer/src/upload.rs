// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Upload scheduler.
//!
//! Blocking host-side I/O lives here and only here. Nothing in this module
//! may be called from the real-time trigger path.
use crate::cache::{SlotAction, UploadPlan, diff};
use crate::device::{DeviceHandle, DeviceTransport};
use crate::fingerprint::Fingerprint;
use crate::program::{Program, SlotId};
use crate::sequence_table::SequenceTable;
use crate::waveform::{render_segment, to_le_bytes};
use crate::{Error, Result, UploadTarget};

/// Outcome of a successful [`apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    /// Slots written, in transfer order.
    pub transferred: Vec<SlotId>,
    /// Slots no longer referenced by the sequence table.
    pub freed: Vec<SlotId>,
    pub sequence_table_written: bool,
    pub bytes_transferred: usize,
    /// Fingerprint of the program now resident on the card.
    pub program: Fingerprint,
}

impl CommitResult {
    /// True if the device was not touched.
    pub fn skipped(&self) -> bool {
        self.transferred.is_empty() && !self.sequence_table_written
    }
}

/// Diff `program` against what `device` holds.
///
/// Slots left in an unknown state by a failed upload are scheduled for
/// transfer even when their recorded fingerprint matches.
pub fn plan<T: DeviceTransport>(program: &Program, device: &DeviceHandle<T>) -> UploadPlan {
    let mut plan = diff(program, device.uploaded_state());
    let taint = device.taint();
    if !taint.is_clean() {
        plan.force(&taint.slots, taint.sequence_table, program);
    }
    plan
}

fn check_consistency<T: DeviceTransport>(
    plan: &UploadPlan,
    table: &SequenceTable,
    device: &DeviceHandle<T>,
) -> Result<()> {
    if table.program_fingerprint() != plan.target_fingerprint() {
        return Err(Error::consistency(format!(
            "Sequence table belongs to program {}, upload plan to {}",
            table.program_fingerprint().short(),
            plan.target_fingerprint().short()
        )));
    }
    if table.len() != plan.target_len() {
        return Err(Error::consistency(format!(
            "Sequence table has {} steps, upload plan covers {} slots",
            table.len(),
            plan.target_len()
        )));
    }
    if plan.base_fingerprint() != device.uploaded_state().program_fingerprint() {
        return Err(Error::consistency(
            "Upload plan was computed against a different device state",
        ));
    }
    let taint = device.taint();
    if let Some(slot) = taint.slots.iter().find(|slot| {
        slot.index() < plan.target_len()
            && plan.action(**slot).and_then(SlotAction::segment).is_none()
    }) {
        return Err(Error::consistency(format!(
            "Upload plan does not rewrite slot {slot}, which a failed upload left in an unknown state"
        )));
    }
    if taint.sequence_table && !plan.rewrites_sequence_table() {
        return Err(Error::consistency(
            "Upload plan does not rewrite the sequence table, which a failed upload left in an unknown state",
        ));
    }
    Ok(())
}

/// Transfer the changed segments of `plan` and the sequence table, then commit.
///
/// Segments are written in ascending slot order, followed by the sequence
/// table. The uploaded state of `device` is updated only after every transfer
/// succeeded. On failure it is left as it was, and the slots touched by the
/// failed call are rewritten by the next [`plan`].
pub fn apply<T: DeviceTransport>(
    plan: &UploadPlan,
    table: &SequenceTable,
    device: &mut DeviceHandle<T>,
) -> Result<CommitResult> {
    check_consistency(plan, table, device)?;
    table.check_capacity(device.traits())?;

    let program = plan.target_fingerprint();
    let freed = plan.freed().collect::<Vec<_>>();
    if plan.is_empty() {
        awg_log::debug!("Program {} already resident, skipping upload", program.short());
        return Ok(CommitResult {
            transferred: vec![],
            freed,
            sequence_table_written: false,
            bytes_transferred: 0,
            program,
        });
    }
    if !device.may_upload() {
        return Err(Error::PlaybackActive);
    }
    if device.uploaded_state().is_cold() {
        awg_log::info!("Cold start: uploading all {} segments", plan.transfer_count());
    }

    device.ensure_configured().map_err(|source| Error::Upload {
        target: UploadTarget::Configuration,
        source,
    })?;

    let sample_rate_hz = device.config().sample_rate_hz;
    let full_scale = device.traits().dac_full_scale;
    let mut transferred = Vec::with_capacity(plan.transfer_count());
    let mut bytes_transferred = 0;
    for (slot, segment) in plan.transfers() {
        let data = to_le_bytes(&render_segment(segment, sample_rate_hz, full_scale));
        device.taint_mut().slots.insert(slot);
        if let Err(source) = device.transport_mut().write_segment(slot, &data) {
            device.invalidate_configuration();
            return Err(Error::Upload {
                target: UploadTarget::Segment(slot),
                source,
            });
        }
        awg_log::debug!(
            "Wrote segment {} to slot {} ({} bytes)",
            segment.fingerprint().short(),
            slot,
            data.len()
        );
        bytes_transferred += data.len();
        transferred.push(slot);
    }

    let sequence_table_written = plan.rewrites_sequence_table();
    if sequence_table_written {
        device.taint_mut().sequence_table = true;
        if let Err(source) = device.transport_mut().write_sequence_table(table) {
            device.invalidate_configuration();
            return Err(Error::Upload {
                target: UploadTarget::SequenceTable,
                source,
            });
        }
        awg_log::debug!("Wrote sequence table: {}", table.to_json());
    }
    if !freed.is_empty() {
        awg_log::debug!("Slots {:?} are no longer referenced", freed);
    }

    device.state_mut().commit(plan);
    *device.taint_mut() = Default::default();
    awg_log::info!(
        "Committed program {}: {} segments transferred ({} bytes), {} freed",
        program.short(),
        transferred.len(),
        bytes_transferred,
        freed.len()
    );
    Ok(CommitResult {
        transferred,
        freed,
        sequence_table_written,
        bytes_transferred,
        program,
    })
}
