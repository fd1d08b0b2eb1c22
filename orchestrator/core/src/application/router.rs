// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Routing: maps pending work items to the specialist kinds that must run
//! this round.
//!
//! Each kind runs at most once per round; a kind with several work items
//! consumes all of them in one invocation. An empty pending set is the fast
//! path straight to the lead reviewer.

use std::collections::BTreeSet;

use crate::domain::work_item::{SpecialistKind, WorkItem};

/// The set of specialist kinds with pending work.
pub fn route(items: &[WorkItem]) -> BTreeSet<SpecialistKind> {
    items
        .iter()
        .filter(|item| item.is_pending())
        .map(|item| item.assignee)
        .collect()
}

/// Pending items assigned to one kind, cloned for the worker invocation.
pub fn items_for(items: &[WorkItem], kind: SpecialistKind) -> Vec<WorkItem> {
    items
        .iter()
        .filter(|item| item.is_pending() && item.assignee == kind)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(kind: SpecialistKind, entity: &str) -> WorkItem {
        WorkItem::new(kind, Some(entity.to_string()), format!("analyze {}", entity), None)
    }

    #[test]
    fn test_route_deduplicates_kinds() {
        let items = vec![
            item(SpecialistKind::Malware, "aaa"),
            item(SpecialistKind::Malware, "bbb"),
            item(SpecialistKind::Infrastructure, "1.2.3.4"),
        ];
        let kinds = route(&items);
        assert_eq!(kinds.len(), 2);
        assert!(kinds.contains(&SpecialistKind::Malware));
        assert!(kinds.contains(&SpecialistKind::Infrastructure));
    }

    #[test]
    fn test_route_empty_is_fast_path() {
        assert!(route(&[]).is_empty());
    }

    #[test]
    fn test_route_ignores_completed_items() {
        let mut done = item(SpecialistKind::Malware, "aaa");
        done.complete(None);
        let items = vec![done, item(SpecialistKind::Infrastructure, "evil.com")];
        let kinds = route(&items);
        assert_eq!(kinds.len(), 1);
        assert!(kinds.contains(&SpecialistKind::Infrastructure));
    }

    #[test]
    fn test_items_for_filters_by_kind_and_status() {
        let mut done = item(SpecialistKind::Malware, "aaa");
        done.complete(None);
        let items = vec![
            done,
            item(SpecialistKind::Malware, "bbb"),
            item(SpecialistKind::Infrastructure, "evil.com"),
        ];
        let malware_items = items_for(&items, SpecialistKind::Malware);
        assert_eq!(malware_items.len(), 1);
        assert_eq!(malware_items[0].entity_id.as_deref(), Some("bbb"));
    }
}
