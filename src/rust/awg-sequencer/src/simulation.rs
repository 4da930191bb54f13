// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! In-memory card for dry runs and tests.
use std::collections::BTreeMap;

use anyhow::bail;

use crate::device::{CardConfig, DeviceTransport};
use crate::program::SlotId;
use crate::sequence_table::SequenceTable;

/// A transfer as seen by the simulated card.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferRecord {
    Configure(CardConfig),
    Segment { slot: SlotId, bytes: usize },
    SequenceTable { steps: usize },
}

/// Transfer at which the next failure is injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    Configure,
    Segment(SlotId),
    SequenceTable,
}

/// Transport that keeps the card memory in host RAM.
///
/// Successful transfers are recorded in order. An armed [`FailurePoint`]
/// fails exactly once; a failing segment write leaves half of the data in
/// the slot, like an interrupted DMA transfer would.
#[derive(Debug, Default)]
pub struct SimulatedCard {
    records: Vec<TransferRecord>,
    memory: BTreeMap<SlotId, Vec<u8>>,
    table: Option<SequenceTable>,
    config: Option<CardConfig>,
    fail_at: Option<FailurePoint>,
}

impl SimulatedCard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next transfer that matches `point`.
    pub fn fail_at(&mut self, point: FailurePoint) {
        self.fail_at = Some(point);
    }

    pub fn records(&self) -> &[TransferRecord] {
        &self.records
    }

    pub fn clear_records(&mut self) {
        self.records.clear();
    }

    /// Slots written since the records were last cleared, in transfer order.
    pub fn written_slots(&self) -> Vec<SlotId> {
        self.records
            .iter()
            .filter_map(|record| match record {
                TransferRecord::Segment { slot, .. } => Some(*slot),
                _ => None,
            })
            .collect()
    }

    pub fn segment(&self, slot: SlotId) -> Option<&[u8]> {
        self.memory.get(&slot).map(Vec::as_slice)
    }

    pub fn sequence_table(&self) -> Option<&SequenceTable> {
        self.table.as_ref()
    }

    pub fn config(&self) -> Option<&CardConfig> {
        self.config.as_ref()
    }

    fn take_failure(&mut self, point: FailurePoint) -> bool {
        if self.fail_at == Some(point) {
            self.fail_at = None;
            return true;
        }
        false
    }
}

impl DeviceTransport for SimulatedCard {
    fn configure(&mut self, config: &CardConfig) -> anyhow::Result<()> {
        if self.take_failure(FailurePoint::Configure) {
            bail!("Simulated failure while configuring the card");
        }
        self.config = Some(config.clone());
        self.records.push(TransferRecord::Configure(config.clone()));
        Ok(())
    }

    fn write_segment(&mut self, slot: SlotId, data: &[u8]) -> anyhow::Result<()> {
        if self.take_failure(FailurePoint::Segment(slot)) {
            self.memory.insert(slot, data[..data.len() / 2].to_vec());
            bail!("Simulated DMA failure after {} of {} bytes", data.len() / 2, data.len());
        }
        self.memory.insert(slot, data.to_vec());
        self.records.push(TransferRecord::Segment {
            slot,
            bytes: data.len(),
        });
        Ok(())
    }

    fn write_sequence_table(&mut self, table: &SequenceTable) -> anyhow::Result<()> {
        if self.take_failure(FailurePoint::SequenceTable) {
            self.table = None;
            bail!("Simulated failure while writing the sequence table");
        }
        self.table = Some(table.clone());
        self.records
            .push(TransferRecord::SequenceTable { steps: table.len() });
        Ok(())
    }
}
