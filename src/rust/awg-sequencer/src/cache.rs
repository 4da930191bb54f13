// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Content-addressed record of what is resident on the card, and the diff
//! that turns a new [`Program`] into a minimal [`UploadPlan`].
use std::collections::{BTreeMap, BTreeSet};

use crate::fingerprint::Fingerprint;
use crate::program::{Program, SlotId};
use crate::segment::ResolvedSegment;

/// Fingerprints currently resident on the card, per slot.
///
/// Updated only after an upload completed in full; a fresh state is the cold start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadedState {
    slots: BTreeMap<SlotId, Fingerprint>,
    program: Option<Fingerprint>,
}

impl UploadedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if nothing was ever committed.
    pub fn is_cold(&self) -> bool {
        self.program.is_none()
    }

    pub fn slot(&self, slot: SlotId) -> Option<Fingerprint> {
        self.slots.get(&slot).copied()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Fingerprint of the program whose sequence table is resident.
    pub fn program_fingerprint(&self) -> Option<Fingerprint> {
        self.program
    }

    pub(crate) fn commit(&mut self, plan: &UploadPlan) {
        self.slots = plan
            .layout
            .iter()
            .enumerate()
            .map(|(index, fingerprint)| (SlotId::from(index), *fingerprint))
            .collect();
        self.program = Some(plan.target);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SlotAction {
    Unchanged,
    Replace(ResolvedSegment),
    /// Slot beyond the previously uploaded program.
    Append(ResolvedSegment),
    /// Slot no longer used. Left stale on the card; the new sequence table
    /// does not reference it.
    Free,
}

impl SlotAction {
    pub fn segment(&self) -> Option<&ResolvedSegment> {
        match self {
            SlotAction::Replace(segment) | SlotAction::Append(segment) => Some(segment),
            SlotAction::Unchanged | SlotAction::Free => None,
        }
    }
}

/// Per-slot actions that bring the card from one uploaded state to a new program.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadPlan {
    /// Sorted by slot.
    actions: Vec<(SlotId, SlotAction)>,
    rewrite_sequence_table: bool,
    /// Program the plan was computed against.
    base: Option<Fingerprint>,
    target: Fingerprint,
    /// Fingerprints of the target program, by slot.
    layout: Vec<Fingerprint>,
}

impl UploadPlan {
    pub fn actions(&self) -> &[(SlotId, SlotAction)] {
        &self.actions
    }

    pub fn action(&self, slot: SlotId) -> Option<&SlotAction> {
        self.actions
            .binary_search_by_key(&slot, |(s, _)| *s)
            .ok()
            .map(|index| &self.actions[index].1)
    }

    /// Segments to transfer, in ascending slot order.
    pub fn transfers(&self) -> impl Iterator<Item = (SlotId, &ResolvedSegment)> {
        self.actions
            .iter()
            .filter_map(|(slot, action)| action.segment().map(|segment| (*slot, segment)))
    }

    pub fn freed(&self) -> impl Iterator<Item = SlotId> + '_ {
        self.actions
            .iter()
            .filter(|(_, action)| matches!(action, SlotAction::Free))
            .map(|(slot, _)| *slot)
    }

    pub fn transfer_count(&self) -> usize {
        self.transfers().count()
    }

    pub fn rewrites_sequence_table(&self) -> bool {
        self.rewrite_sequence_table
    }

    /// Nothing to transfer and the resident sequence table already matches.
    pub fn is_empty(&self) -> bool {
        !self.rewrite_sequence_table && self.transfers().next().is_none()
    }

    pub fn base_fingerprint(&self) -> Option<Fingerprint> {
        self.base
    }

    pub fn target_fingerprint(&self) -> Fingerprint {
        self.target
    }

    /// Number of slots the target program occupies.
    pub fn target_len(&self) -> usize {
        self.layout.len()
    }

    /// Force `Unchanged` slots listed in `slots` to be transferred again, and
    /// optionally force a sequence table rewrite.
    ///
    /// Used for slots whose content on the card is unknown after a failed upload.
    pub(crate) fn force(
        &mut self,
        slots: &BTreeSet<SlotId>,
        sequence_table: bool,
        program: &Program,
    ) {
        for (slot, action) in self.actions.iter_mut() {
            if matches!(action, SlotAction::Unchanged) && slots.contains(slot) {
                *action = SlotAction::Replace(program.segments()[slot.index()].clone());
            }
        }
        self.rewrite_sequence_table |= sequence_table;
    }
}

/// Classify every slot of `program` against `prior`.
///
/// A slot is unchanged only if its fingerprint matches the resident one. When
/// the program length differs from the resident one, every slot from the first
/// mismatch onward counts as changed, even where content happens to match,
/// since its sequence table wiring moved.
pub fn diff(program: &Program, prior: &UploadedState) -> UploadPlan {
    let new_len = program.len();
    let old_len = prior.slot_count();
    let first_changed = if new_len != old_len {
        program
            .segments()
            .iter()
            .take(old_len)
            .enumerate()
            .position(|(index, segment)| {
                prior.slot(SlotId::from(index)) != Some(segment.fingerprint())
            })
            .unwrap_or(new_len.min(old_len))
    } else {
        new_len
    };

    let mut actions = Vec::with_capacity(new_len.max(old_len));
    for (index, segment) in program.segments().iter().enumerate() {
        let slot = SlotId::from(index);
        let action = if index >= old_len {
            SlotAction::Append(segment.clone())
        } else if index >= first_changed || prior.slot(slot) != Some(segment.fingerprint()) {
            SlotAction::Replace(segment.clone())
        } else {
            SlotAction::Unchanged
        };
        actions.push((slot, action));
    }
    actions.extend((new_len..old_len).map(|index| (SlotId::from(index), SlotAction::Free)));

    UploadPlan {
        actions,
        rewrite_sequence_table: prior.program_fingerprint() != Some(program.fingerprint()),
        base: prior.program_fingerprint(),
        target: program.fingerprint(),
        layout: program
            .segments()
            .iter()
            .map(ResolvedSegment::fingerprint)
            .collect(),
    }
}
