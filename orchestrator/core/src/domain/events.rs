// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::budget::BudgetSnapshot;
use crate::domain::entity::{EntityType, Verdict};
use crate::domain::investigation::InvestigationId;
use crate::domain::work_item::SpecialistKind;

/// Investigation lifecycle events streamed over the event bus.
///
/// Observers (CLI progress output, future SSE endpoints) subscribe to these;
/// nothing in the core depends on anyone listening.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvestigationEvent {
    InvestigationStarted {
        investigation_id: InvestigationId,
        root: String,
        entity_type: EntityType,
        started_at: DateTime<Utc>,
    },
    TriageCompleted {
        investigation_id: InvestigationId,
        verdict: Verdict,
        score: Option<u8>,
        work_items: usize,
    },
    RoundStarted {
        investigation_id: InvestigationId,
        iteration: u32,
        pending_items: usize,
    },
    SpecialistStarted {
        investigation_id: InvestigationId,
        kind: SpecialistKind,
        targets: usize,
    },
    SpecialistCompleted {
        investigation_id: InvestigationId,
        kind: SpecialistKind,
        degraded: bool,
    },
    EdgeRejected {
        investigation_id: InvestigationId,
        source: String,
        target: String,
        kind: String,
    },
    BudgetStop {
        investigation_id: InvestigationId,
        reason: String,
        budget: BudgetSnapshot,
    },
    InvestigationCompleted {
        investigation_id: InvestigationId,
        iterations: u32,
        completed_at: DateTime<Utc>,
    },
    InvestigationFailed {
        investigation_id: InvestigationId,
        reason: String,
        failed_at: DateTime<Utc>,
    },
}
