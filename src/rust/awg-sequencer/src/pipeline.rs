// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! One resolve → diff → upload pass per experiment iteration.
//!
//! [`AwgSession::prepare`] touches host memory only and may run while the
//! card still plays the previous program. [`AwgSession::commit`] performs the
//! blocking transfers. Dropping a [`PreparedUpload`] instead of committing it
//! cancels the pass without side effects.
use crate::Result;
use crate::builder::SegmentBuilder;
use crate::cache::UploadPlan;
use crate::calibration::CalibrationTransform;
use crate::device::{DeviceHandle, DeviceTransport};
use crate::program::Program;
use crate::ready::ReadyProgram;
use crate::sequence_table::{SequenceTable, assemble};
use crate::settings::SequencerSettings;
use crate::upload::{self, CommitResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Resolving,
    /// Plan computed, waiting for commit.
    Diffing,
    Uploading,
    /// The program is resident and may be played.
    Ready,
}

/// Resolved program with its upload plan and sequence table.
#[derive(Debug, Clone)]
pub struct PreparedUpload {
    program: Program,
    plan: UploadPlan,
    table: SequenceTable,
}

impl PreparedUpload {
    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn plan(&self) -> &UploadPlan {
        &self.plan
    }

    pub fn sequence_table(&self) -> &SequenceTable {
        &self.table
    }

    /// True if committing will not touch the device.
    pub fn is_noop(&self) -> bool {
        self.plan.is_empty()
    }
}

/// Owner of one card and its pipeline.
pub struct AwgSession<T, C> {
    settings: SequencerSettings,
    device: DeviceHandle<T>,
    calibration: C,
    state: PipelineState,
    ready: Option<ReadyProgram>,
}

impl<T, C> AwgSession<T, C>
where
    T: DeviceTransport,
    C: CalibrationTransform,
{
    pub fn new(mut settings: SequencerSettings, transport: T, calibration: C) -> Result<Self> {
        for change in settings.sanitize()? {
            awg_log::warn!(
                "Setting '{}' changed from {} to {}: {}",
                change.field,
                change.original,
                change.sanitized,
                change.reason
            );
        }
        let device = DeviceHandle::new(transport, settings.traits(), settings.card_config());
        Ok(Self {
            settings,
            device,
            calibration,
            state: PipelineState::Idle,
            ready: None,
        })
    }

    /// Empty builder for the next pass.
    pub fn builder(&self) -> SegmentBuilder {
        SegmentBuilder::new().with_end_of_program(self.settings.end_of_program)
    }

    /// Resolve the contributed operations and compute the upload plan.
    ///
    /// No device I/O happens here.
    pub fn prepare(&mut self, builder: SegmentBuilder) -> Result<PreparedUpload> {
        self.ready = None;
        self.state = PipelineState::Resolving;
        let program = match builder.resolve(&self.settings.calibration_context(), &self.calibration)
        {
            Ok(program) => program,
            Err(err) => {
                self.state = PipelineState::Idle;
                return Err(err);
            }
        };
        self.state = PipelineState::Diffing;
        let table = assemble(&program);
        if let Err(err) = table
            .verify_against(&program)
            .and_then(|()| table.check_capacity(self.device.traits()))
        {
            self.state = PipelineState::Idle;
            return Err(err);
        }
        let plan = upload::plan(&program, &self.device);
        awg_log::debug!(
            "Prepared program {}: {} of {} segments to transfer",
            program.fingerprint().short(),
            plan.transfer_count(),
            program.len()
        );
        Ok(PreparedUpload {
            program,
            plan,
            table,
        })
    }

    /// Upload a prepared pass. Skips the upload if nothing changed.
    pub fn commit(&mut self, prepared: PreparedUpload) -> Result<CommitResult> {
        self.upload(prepared).map(|(result, _)| result)
    }

    fn upload(&mut self, prepared: PreparedUpload) -> Result<(CommitResult, ReadyProgram)> {
        if !prepared.is_noop() {
            self.state = PipelineState::Uploading;
        }
        match upload::apply(&prepared.plan, &prepared.table, &mut self.device) {
            Ok(result) => {
                let ready = ReadyProgram::new(&prepared.program, self.settings.sample_rate_hz());
                self.ready = Some(ready.clone());
                self.state = PipelineState::Ready;
                Ok((result, ready))
            }
            Err(err) => {
                self.state = PipelineState::Idle;
                Err(err)
            }
        }
    }

    /// Abandon a prepared pass before any transfer.
    pub fn cancel(&mut self, prepared: PreparedUpload) {
        awg_log::debug!(
            "Cancelled upload of program {}",
            prepared.program.fingerprint().short()
        );
        self.state = PipelineState::Idle;
    }

    /// Full pass: resolve, diff and upload.
    pub fn run(&mut self, builder: SegmentBuilder) -> Result<ReadyProgram> {
        let prepared = self.prepare(builder)?;
        self.upload(prepared).map(|(_, ready)| ready)
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Handle for the trigger layer; only available in [`PipelineState::Ready`].
    pub fn ready_program(&self) -> Option<&ReadyProgram> {
        self.ready.as_ref()
    }

    pub fn settings(&self) -> &SequencerSettings {
        &self.settings
    }

    pub fn device(&self) -> &DeviceHandle<T> {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut DeviceHandle<T> {
        &mut self.device
    }
}
