// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Threat-intelligence source domain interface.
//!
//! Typed report and relationship-pivot lookups consumed by triage and by the
//! specialists' relationship expansion. Implementations live in
//! infrastructure/intel/.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::domain::entity::{EntityType, Verdict};
use crate::domain::tool::ToolError;

/// Parsed report for one indicator.
#[derive(Debug, Clone)]
pub struct IntelReport {
    pub verdict: Verdict,
    pub score: Option<u8>,
    pub attributes: HashMap<String, Value>,
    /// Full upstream payload, preserved for specialist context.
    pub raw: Value,
}

/// One entity returned by a relationship pivot.
#[derive(Debug, Clone)]
pub struct RelatedEntity {
    pub id: String,
    pub entity_type: EntityType,
    /// Relationship name as the feed labels it (e.g. "contacted_domains").
    pub relationship: String,
    pub attributes: HashMap<String, Value>,
}

#[async_trait]
pub trait IntelSource: Send + Sync {
    async fn report(&self, entity_type: EntityType, id: &str) -> Result<IntelReport, ToolError>;

    async fn related(
        &self,
        entity_type: EntityType,
        id: &str,
        relationship: &str,
    ) -> Result<Vec<RelatedEntity>, ToolError>;
}

/// Relationship pivots worth expanding per entity type.
pub fn pivot_relationships(entity_type: EntityType) -> &'static [&'static str] {
    match entity_type {
        EntityType::File => &["contacted_domains", "contacted_ips", "dropped_files"],
        EntityType::IpAddress => &["resolutions", "communicating_files", "downloaded_files"],
        EntityType::Domain => &["resolutions", "subdomains", "communicating_files", "downloaded_files"],
        EntityType::Url => &["network_location", "downloaded_files", "contacted_domains", "contacted_ips"],
    }
}
