// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Threat-Intel REST Client
//
// Adapter for a GTI-style v3 intel surface (files/, domains/, ip_addresses/,
// urls/ object endpoints plus per-relationship pivot endpoints). Verdicts
// derive from the feed's own assessment when present, falling back to
// last_analysis_stats vote counts.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::domain::entity::{EntityType, Verdict};
use crate::domain::intel::{IntelReport, IntelSource, RelatedEntity};
use crate::domain::tool::ToolError;

/// Relationship objects fetched per pivot; bounds token and memory use.
const RELATIONSHIP_FETCH_LIMIT: u32 = 10;

pub struct IntelClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl IntelClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Object path for an indicator. URL ids travel base64url-encoded
    /// without padding.
    fn object_path(entity_type: EntityType, id: &str) -> String {
        match entity_type {
            EntityType::File => format!("files/{}", id),
            EntityType::IpAddress => format!("ip_addresses/{}", id),
            EntityType::Domain => format!("domains/{}", id),
            EntityType::Url => format!("urls/{}", URL_SAFE_NO_PAD.encode(id)),
        }
    }

    async fn get_json(&self, path: &str) -> Result<Value, ToolError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header("x-apikey", &self.api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ToolError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%url, %status, "intel api error");
            return Err(ToolError::Upstream(format!("intel api error: HTTP {}", status)));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ToolError::Decode(e.to_string()))
    }
}

/// Strip fields too heavy to carry through conversations and the graph.
fn scrub_heavy_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("last_analysis_results");
            for (_, v) in map.iter_mut() {
                scrub_heavy_fields(v);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                scrub_heavy_fields(item);
            }
        }
        _ => {}
    }
}

/// Derive verdict and score from a raw object payload.
fn parse_assessment(payload: &Value) -> (Verdict, Option<u8>) {
    let data = payload.get("data").unwrap_or(payload);
    let attrs = data.get("attributes").cloned().unwrap_or(Value::Null);

    let stats = attrs.get("last_analysis_stats");
    let malicious = stats
        .and_then(|s| s.get("malicious"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let suspicious = stats
        .and_then(|s| s.get("suspicious"))
        .and_then(Value::as_u64)
        .unwrap_or(0);

    // The feed's own assessment wins when present.
    let assessment = attrs.get("gti_assessment");
    let assessed_verdict = assessment
        .and_then(|a| a.get("verdict"))
        .and_then(|v| v.get("value"))
        .and_then(Value::as_str)
        .map(|label| Verdict::from_label(label.trim_start_matches("VERDICT_")));
    let assessed_score = assessment
        .and_then(|a| a.get("threat_score"))
        .and_then(|s| s.get("value"))
        .and_then(Value::as_u64)
        .filter(|score| *score > 0)
        .map(|score| score.min(100) as u8);

    let verdict = match assessed_verdict {
        Some(v) if v != Verdict::Unknown => v,
        _ => {
            if malicious > 0 {
                Verdict::Malicious
            } else if suspicious > 0 {
                Verdict::Suspicious
            } else if stats.is_some() {
                Verdict::Benign
            } else {
                Verdict::Unknown
            }
        }
    };

    let score = assessed_score.or_else(|| {
        stats.map(|_| {
            if malicious > 5 {
                90
            } else if malicious > 0 {
                70
            } else if suspicious > 0 {
                40
            } else {
                0
            }
        })
    });

    (verdict, score)
}

fn attributes_map(payload: &Value) -> HashMap<String, Value> {
    payload
        .get("data")
        .unwrap_or(payload)
        .get("attributes")
        .and_then(Value::as_object)
        .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

#[async_trait]
impl IntelSource for IntelClient {
    async fn report(&self, entity_type: EntityType, id: &str) -> Result<IntelReport, ToolError> {
        let path = Self::object_path(entity_type, id);
        let mut payload = self.get_json(&path).await?;
        scrub_heavy_fields(&mut payload);

        let (verdict, score) = parse_assessment(&payload);
        debug!(indicator = %id, %verdict, ?score, "intel report fetched");

        Ok(IntelReport {
            verdict,
            score,
            attributes: attributes_map(&payload),
            raw: payload,
        })
    }

    async fn related(
        &self,
        entity_type: EntityType,
        id: &str,
        relationship: &str,
    ) -> Result<Vec<RelatedEntity>, ToolError> {
        let path = format!(
            "{}/{}?limit={}",
            Self::object_path(entity_type, id),
            relationship,
            RELATIONSHIP_FETCH_LIMIT
        );
        let mut payload = self.get_json(&path).await?;
        scrub_heavy_fields(&mut payload);

        let entities = payload
            .get("data")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let id = item.get("id")?.as_str()?.to_string();
                        let entity_type = item
                            .get("type")
                            .and_then(Value::as_str)
                            .and_then(EntityType::from_wire)?;
                        let attributes = item
                            .get("attributes")
                            .and_then(Value::as_object)
                            .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                            .unwrap_or_default();
                        Some(RelatedEntity {
                            id,
                            entity_type,
                            relationship: relationship.to_string(),
                            attributes,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_report_parses_stats_verdict() {
        let mut server = mockito::Server::new_async().await;
        let body = json!({
            "data": {
                "id": "evil.com",
                "type": "domain",
                "attributes": {
                    "last_analysis_stats": { "malicious": 12, "suspicious": 1, "harmless": 60 },
                    "last_analysis_results": { "scanner": { "verdict": "bad" } },
                    "registrar": "NameCheap"
                }
            }
        });
        let mock = server
            .mock("GET", "/domains/evil.com")
            .match_header("x-apikey", "test-key")
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let client = IntelClient::new(server.url(), "test-key");
        let report = client.report(EntityType::Domain, "evil.com").await.unwrap();

        mock.assert_async().await;
        assert_eq!(report.verdict, Verdict::Malicious);
        assert_eq!(report.score, Some(90));
        assert_eq!(report.attributes["registrar"], "NameCheap");
        // Heavy fields are scrubbed before anything downstream sees them.
        assert!(report.raw["data"]["attributes"].get("last_analysis_results").is_none());
    }

    #[tokio::test]
    async fn test_report_error_status_is_tool_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/files/abc")
            .with_status(404)
            .create_async()
            .await;

        let client = IntelClient::new(server.url(), "test-key");
        let result = client.report(EntityType::File, "abc").await;
        assert!(matches!(result, Err(ToolError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_related_maps_entities() {
        let mut server = mockito::Server::new_async().await;
        let body = json!({
            "data": [
                { "id": "1.2.3.4", "type": "ip_address", "attributes": { "asn": 12345 } },
                { "id": "unknown-kind", "type": "graph", "attributes": {} }
            ]
        });
        let _mock = server
            .mock("GET", "/domains/evil.com/resolutions?limit=10")
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let client = IntelClient::new(server.url(), "test-key");
        let entities = client
            .related(EntityType::Domain, "evil.com", "resolutions")
            .await
            .unwrap();

        // Unrecognized entity kinds are skipped, not fatal.
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].id, "1.2.3.4");
        assert_eq!(entities[0].entity_type, EntityType::IpAddress);
        assert_eq!(entities[0].relationship, "resolutions");
    }

    #[test]
    fn test_assessment_verdict_wins_over_stats() {
        let payload = json!({
            "data": {
                "attributes": {
                    "last_analysis_stats": { "malicious": 0, "suspicious": 0, "harmless": 70 },
                    "gti_assessment": {
                        "verdict": { "value": "VERDICT_MALICIOUS" },
                        "threat_score": { "value": 95 }
                    }
                }
            }
        });
        let (verdict, score) = parse_assessment(&payload);
        assert_eq!(verdict, Verdict::Malicious);
        assert_eq!(score, Some(95));
    }

    #[test]
    fn test_no_stats_is_unknown() {
        let payload = json!({ "data": { "attributes": {} } });
        let (verdict, score) = parse_assessment(&payload);
        assert_eq!(verdict, Verdict::Unknown);
        assert_eq!(score, None);
    }

    #[test]
    fn test_url_ids_are_encoded() {
        let path = IntelClient::object_path(EntityType::Url, "https://evil.com/x");
        assert!(path.starts_with("urls/"));
        assert!(!path.contains("https://"));
        assert!(!path.contains('='));
    }
}
