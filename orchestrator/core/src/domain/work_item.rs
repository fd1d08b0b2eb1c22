// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Work items: directed instructions from one investigation round to the
//! next, each assigned to a specialist kind.

use serde::{Deserialize, Serialize};

use crate::domain::entity::EntityType;

/// The specialist that must act on a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialistKind {
    Malware,
    Infrastructure,
}

impl SpecialistKind {
    /// Files go to the malware specialist; network indicators to the
    /// infrastructure specialist.
    pub fn for_entity(entity_type: EntityType) -> SpecialistKind {
        match entity_type {
            EntityType::File => SpecialistKind::Malware,
            _ => SpecialistKind::Infrastructure,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SpecialistKind::Malware => "malware",
            SpecialistKind::Infrastructure => "infrastructure",
        }
    }
}

impl std::fmt::Display for SpecialistKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    Pending,
    Completed,
}

/// One instruction: analyze `entity_id` (recoverable from the task text when
/// absent). Created by triage or the lead reviewer; consumed and completed
/// by the executing specialist, mutated by nobody else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub assignee: SpecialistKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    pub task: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub status: WorkItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<String>,
}

impl WorkItem {
    pub fn new(
        assignee: SpecialistKind,
        entity_id: Option<String>,
        task: impl Into<String>,
        context: Option<String>,
    ) -> Self {
        Self {
            assignee,
            entity_id,
            task: task.into(),
            context,
            status: WorkItemStatus::Pending,
            result_summary: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == WorkItemStatus::Pending
    }

    pub fn complete(&mut self, summary: Option<String>) {
        self.status = WorkItemStatus::Completed;
        self.result_summary = summary;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_by_entity_type() {
        assert_eq!(SpecialistKind::for_entity(EntityType::File), SpecialistKind::Malware);
        assert_eq!(
            SpecialistKind::for_entity(EntityType::IpAddress),
            SpecialistKind::Infrastructure
        );
        assert_eq!(
            SpecialistKind::for_entity(EntityType::Domain),
            SpecialistKind::Infrastructure
        );
        assert_eq!(SpecialistKind::for_entity(EntityType::Url), SpecialistKind::Infrastructure);
    }

    #[test]
    fn test_complete_marks_status_and_summary() {
        let mut item = WorkItem::new(
            SpecialistKind::Malware,
            Some("9f8a".to_string()),
            "Analyze dropped file",
            None,
        );
        assert!(item.is_pending());
        item.complete(Some("ransomware loader".to_string()));
        assert_eq!(item.status, WorkItemStatus::Completed);
        assert_eq!(item.result_summary.as_deref(), Some("ransomware loader"));
    }
}
