use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::budget::BudgetSnapshot;
use crate::domain::entity::{EntityNode, EntityType, Relationship, Verdict};
use crate::domain::work_item::{SpecialistKind, WorkItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvestigationId(pub Uuid);

impl InvestigationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InvestigationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InvestigationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationStatus {
    Running,
    Completed,
    Failed,
}

/// Minimal structured result one specialist hands to the lead reviewer.
///
/// The full-detail discoveries land in the graph cache first; this is the
/// summary that crosses back to the controller. A degraded finding preserves
/// the raw worker output so no evidence is lost to a parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub agent: SpecialistKind,
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threat_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pivot_findings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_indicators: Vec<String>,
    pub summary: String,
    /// True when the worker could not produce a usable structured result.
    #[serde(default)]
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
}

impl Finding {
    /// Explicit "analysis failed" record; never claims a verdict it did not
    /// derive from evidence.
    pub fn degraded(agent: SpecialistKind, summary: impl Into<String>, raw_output: Option<String>) -> Self {
        Self {
            agent,
            verdict: Verdict::Error,
            threat_score: None,
            categories: Vec::new(),
            pivot_findings: Vec::new(),
            related_indicators: Vec::new(),
            summary: summary.into(),
            degraded: true,
            raw_output,
        }
    }
}

/// Serializable view of the full investigation state, exposed to reporting
/// and UI collaborators. Analyzed and merely-discovered entities stay
/// distinguishable through each node's `analyzed` flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationSnapshot {
    pub id: InvestigationId,
    pub root: String,
    pub root_type: EntityType,
    pub status: InvestigationStatus,
    pub iteration: u32,
    pub nodes: Vec<EntityNode>,
    pub edges: Vec<Relationship>,
    /// Findings per specialist kind, in the order the rounds produced them.
    pub findings: BTreeMap<String, Vec<Finding>>,
    pub work_items: Vec<WorkItem>,
    pub budget: BudgetSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl InvestigationSnapshot {
    /// Entities discovered but never analyzed (budget-capped leftovers).
    pub fn unanalyzed(&self) -> impl Iterator<Item = &EntityNode> {
        self.nodes.iter().filter(|n| !n.analyzed)
    }
}
