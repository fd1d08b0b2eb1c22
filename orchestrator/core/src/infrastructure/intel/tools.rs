// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Callable tool wrappers over an intel source.
//!
//! One tool per lookup, returning the raw JSON payload as text; the worker
//! loop appends failures as text too, so these never need to swallow errors
//! themselves.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::domain::entity::EntityType;
use crate::domain::intel::IntelSource;
use crate::domain::tool::{required_arg, Tool, ToolError, ToolSchema};

/// Report lookup tool for one entity type.
pub struct ReportTool {
    intel: Arc<dyn IntelSource>,
    entity_type: EntityType,
    name: &'static str,
    description: &'static str,
    arg: &'static str,
}

#[async_trait]
impl Tool for ReportTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(self.name, self.description).with_param(
            self.arg,
            "Indicator to look up",
            true,
        )
    }

    async fn invoke(&self, args: &HashMap<String, String>) -> Result<String, ToolError> {
        let id = required_arg(args, self.arg)?;
        let report = self.intel.report(self.entity_type, id).await?;
        Ok(report.raw.to_string())
    }
}

/// Relationship pivot tool for one entity type.
pub struct RelationshipsTool {
    intel: Arc<dyn IntelSource>,
    entity_type: EntityType,
    name: &'static str,
    description: &'static str,
    arg: &'static str,
}

#[async_trait]
impl Tool for RelationshipsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(self.name, self.description)
            .with_param(self.arg, "Indicator to pivot from", true)
            .with_param("relationship", "Relationship name to expand", true)
    }

    async fn invoke(&self, args: &HashMap<String, String>) -> Result<String, ToolError> {
        let id = required_arg(args, self.arg)?;
        let relationship = required_arg(args, "relationship")?;
        let entities = self.intel.related(self.entity_type, id, relationship).await?;

        let payload: Vec<Value> = entities
            .iter()
            .map(|e| {
                json!({
                    "id": e.id,
                    "type": e.entity_type.as_str(),
                    "relationship": e.relationship,
                    "attributes": e.attributes,
                })
            })
            .collect();
        Ok(Value::Array(payload).to_string())
    }
}

pub fn file_report_tool(intel: Arc<dyn IntelSource>) -> ReportTool {
    ReportTool {
        intel,
        entity_type: EntityType::File,
        name: "get_file_report",
        description: "Get threat report for a file hash.",
        arg: "hash",
    }
}

pub fn file_relationships_tool(intel: Arc<dyn IntelSource>) -> RelationshipsTool {
    RelationshipsTool {
        intel,
        entity_type: EntityType::File,
        name: "get_entities_related_to_a_file",
        description: "Get entities related to a file. Relationships: contacted_domains, contacted_ips, dropped_files.",
        arg: "hash",
    }
}

pub fn domain_report_tool(intel: Arc<dyn IntelSource>) -> ReportTool {
    ReportTool {
        intel,
        entity_type: EntityType::Domain,
        name: "get_domain_report",
        description: "Get threat report for a domain.",
        arg: "domain",
    }
}

pub fn domain_relationships_tool(intel: Arc<dyn IntelSource>) -> RelationshipsTool {
    RelationshipsTool {
        intel,
        entity_type: EntityType::Domain,
        name: "get_entities_related_to_a_domain",
        description: "Get entities related to a domain. Relationships: resolutions, subdomains, communicating_files.",
        arg: "domain",
    }
}

pub fn ip_report_tool(intel: Arc<dyn IntelSource>) -> ReportTool {
    ReportTool {
        intel,
        entity_type: EntityType::IpAddress,
        name: "get_ip_address_report",
        description: "Get threat report for an IP address.",
        arg: "ip_address",
    }
}

pub fn ip_relationships_tool(intel: Arc<dyn IntelSource>) -> RelationshipsTool {
    RelationshipsTool {
        intel,
        entity_type: EntityType::IpAddress,
        name: "get_entities_related_to_an_ip_address",
        description: "Get entities related to an IP. Relationships: resolutions, communicating_files, referrer_files.",
        arg: "ip_address",
    }
}

pub fn url_report_tool(intel: Arc<dyn IntelSource>) -> ReportTool {
    ReportTool {
        intel,
        entity_type: EntityType::Url,
        name: "get_url_report",
        description: "Get threat report for a URL.",
        arg: "url",
    }
}

pub fn url_relationships_tool(intel: Arc<dyn IntelSource>) -> RelationshipsTool {
    RelationshipsTool {
        intel,
        entity_type: EntityType::Url,
        name: "get_entities_related_to_an_url",
        description: "Get entities related to a URL. Relationships: downloaded_files, network_location.",
        arg: "url",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::intel::{IntelReport, RelatedEntity};
    use crate::domain::entity::Verdict;

    struct FixtureIntel;

    #[async_trait]
    impl IntelSource for FixtureIntel {
        async fn report(&self, _entity_type: EntityType, id: &str) -> Result<IntelReport, ToolError> {
            if id == "down" {
                return Err(ToolError::Upstream("timeout".to_string()));
            }
            Ok(IntelReport {
                verdict: Verdict::Malicious,
                score: Some(90),
                attributes: HashMap::new(),
                raw: json!({ "data": { "id": id } }),
            })
        }

        async fn related(
            &self,
            _entity_type: EntityType,
            _id: &str,
            relationship: &str,
        ) -> Result<Vec<RelatedEntity>, ToolError> {
            Ok(vec![RelatedEntity {
                id: "1.2.3.4".to_string(),
                entity_type: EntityType::IpAddress,
                relationship: relationship.to_string(),
                attributes: HashMap::new(),
            }])
        }
    }

    #[tokio::test]
    async fn test_report_tool_returns_raw_json() {
        let tool = domain_report_tool(Arc::new(FixtureIntel));
        let mut args = HashMap::new();
        args.insert("domain".to_string(), "evil.com".to_string());
        let text = tool.invoke(&args).await.unwrap();
        assert!(text.contains("evil.com"));
    }

    #[tokio::test]
    async fn test_report_tool_missing_argument() {
        let tool = file_report_tool(Arc::new(FixtureIntel));
        let result = tool.invoke(&HashMap::new()).await;
        assert!(matches!(result, Err(ToolError::MissingArgument(_))));
    }

    #[tokio::test]
    async fn test_report_tool_propagates_upstream_message() {
        let tool = ip_report_tool(Arc::new(FixtureIntel));
        let mut args = HashMap::new();
        args.insert("ip_address".to_string(), "down".to_string());
        let err = tool.invoke(&args).await.unwrap_err();
        assert_eq!(err.to_string(), "timeout");
    }

    #[tokio::test]
    async fn test_relationships_tool_serializes_entities() {
        let tool = domain_relationships_tool(Arc::new(FixtureIntel));
        let mut args = HashMap::new();
        args.insert("domain".to_string(), "evil.com".to_string());
        args.insert("relationship".to_string(), "resolutions".to_string());
        let text = tool.invoke(&args).await.unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[0]["id"], "1.2.3.4");
        assert_eq!(parsed[0]["type"], "ip_address");
    }
}
