// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Indicator entities and relationships for the investigation graph.
//!
//! An entity is one indicator of compromise (file hash, IP address, domain,
//! URL) keyed by its literal value. Classification is pattern based; the
//! extraction helpers recover indicators from free-form task text when a
//! planner forgot to attach an explicit entity id.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Kind of indicator under investigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    File,
    IpAddress,
    Domain,
    Url,
}

static MD5_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-fA-F0-9]{32}$").unwrap());
static SHA1_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-fA-F0-9]{40}$").unwrap());
static SHA256_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-fA-F0-9]{64}$").unwrap());
static IPV4_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$").unwrap());

static HASH_IN_TEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[a-fA-F0-9]{64}\b|\b[a-fA-F0-9]{40}\b|\b[a-fA-F0-9]{32}\b").unwrap());
static IPV4_IN_TEXT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").unwrap());
static URL_IN_TEXT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s]+").unwrap());
static DOMAIN_IN_TEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+)\b").unwrap());

impl EntityType {
    /// Classify a raw indicator string by pattern.
    ///
    /// MD5/SHA-1/SHA-256 hex strings are files, dotted quads are IP
    /// addresses, `http(s)://` prefixes are URLs, everything else is treated
    /// as a domain.
    pub fn classify(raw: &str) -> EntityType {
        let raw = raw.trim();
        if MD5_RE.is_match(raw) || SHA1_RE.is_match(raw) || SHA256_RE.is_match(raw) {
            return EntityType::File;
        }
        if IPV4_RE.is_match(raw) {
            return EntityType::IpAddress;
        }
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return EntityType::Url;
        }
        EntityType::Domain
    }

    /// Parse the wire-format type name used by intel feeds ("file",
    /// "ip_address", "domain", "url").
    pub fn from_wire(name: &str) -> Option<EntityType> {
        match name {
            "file" => Some(EntityType::File),
            "ip_address" | "ip" => Some(EntityType::IpAddress),
            "domain" => Some(EntityType::Domain),
            "url" => Some(EntityType::Url),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::File => "file",
            EntityType::IpAddress => "ip_address",
            EntityType::Domain => "domain",
            EntityType::Url => "url",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Assessment attached to an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Malicious,
    Suspicious,
    Benign,
    #[default]
    Unknown,
    Error,
}

impl Verdict {
    /// Severity rank used to prioritize the uninvestigated frontier.
    pub fn severity(&self) -> u8 {
        match self {
            Verdict::Malicious => 4,
            Verdict::Suspicious => 3,
            Verdict::Unknown => 2,
            Verdict::Error => 1,
            Verdict::Benign => 0,
        }
    }

    /// Lenient parse of the verdict labels specialists emit
    /// ("Malicious|Suspicious|Benign", any casing).
    pub fn from_label(label: &str) -> Verdict {
        let label = label.trim().to_ascii_lowercase();
        match label.as_str() {
            "malicious" => Verdict::Malicious,
            "suspicious" => Verdict::Suspicious,
            "benign" | "harmless" | "clean" => Verdict::Benign,
            "error" | "system error" => Verdict::Error,
            _ => Verdict::Unknown,
        }
    }

    pub fn is_actionable(&self) -> bool {
        matches!(self, Verdict::Malicious | Verdict::Suspicious)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Malicious => "malicious",
            Verdict::Suspicious => "suspicious",
            Verdict::Benign => "benign",
            Verdict::Unknown => "unknown",
            Verdict::Error => "error",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One indicator node in the investigation graph.
///
/// The id is the natural key (hash value, IP literal, domain name, URL) and
/// is unique within an investigation. `analyzed` flips exactly when a
/// specialist has fully processed the entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityNode {
    pub id: String,
    pub entity_type: EntityType,
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    pub analyzed: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, Value>,
    pub first_seen: DateTime<Utc>,
}

impl EntityNode {
    pub fn new(id: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            id: id.into(),
            entity_type,
            verdict: Verdict::Unknown,
            score: None,
            analyzed: false,
            attributes: HashMap::new(),
            first_seen: Utc::now(),
        }
    }

    /// Merge attribute keys that are not already present. Existing values
    /// win so a later discovery never clobbers the authoritative fetch.
    pub fn merge_attributes(&mut self, attributes: HashMap<String, Value>) {
        for (key, value) in attributes {
            self.attributes.entry(key).or_insert(value);
        }
    }
}

/// Directed, labeled relationship between two entity ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Recover the first plausible indicator from free-form task text.
///
/// Used when a work item arrives without an explicit entity id: hashes are
/// tried first, then IPs, URLs and finally bare domains (skipping the
/// abbreviation false-positives planners like to emit).
pub fn extract_indicator(text: &str) -> Option<(String, EntityType)> {
    if let Some(m) = HASH_IN_TEXT_RE.find(text) {
        return Some((m.as_str().to_string(), EntityType::File));
    }
    if let Some(m) = IPV4_IN_TEXT_RE.find(text) {
        return Some((m.as_str().to_string(), EntityType::IpAddress));
    }
    if let Some(m) = URL_IN_TEXT_RE.find(text) {
        return Some((m.as_str().trim_end_matches([',', '.', ')']).to_string(), EntityType::Url));
    }
    for cap in DOMAIN_IN_TEXT_RE.captures_iter(text) {
        let candidate = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
        if candidate != "e.g" && candidate != "i.e" && !candidate.ends_with('.') {
            return Some((candidate.to_string(), EntityType::Domain));
        }
    }
    None
}

/// Parse a labeled indicator of the form `"IP: 1.2.3.4"` / `"Domain: evil.com"`.
pub fn parse_labeled_indicator(label: &str) -> Option<(EntityType, String)> {
    let (kind, value) = label.split_once(':')?;
    let kind = kind.trim().to_ascii_lowercase();
    let value = value.trim().to_string();
    if value.is_empty() {
        return None;
    }
    let entity_type = if kind.contains("ip") {
        EntityType::IpAddress
    } else if kind.contains("domain") {
        EntityType::Domain
    } else if kind.contains("url") {
        EntityType::Url
    } else if kind.contains("file") || kind.contains("hash") {
        EntityType::File
    } else {
        return None;
    };
    Some((entity_type, value))
}

/// Relationship label for a discovery, derived from endpoint types.
pub fn relationship_kind(source: EntityType, target: EntityType) -> &'static str {
    match (source, target) {
        (EntityType::File, EntityType::File) => "dropped",
        (EntityType::File, _) => "communicates-with",
        (EntityType::Domain, EntityType::IpAddress) => "resolves-to",
        (EntityType::IpAddress, EntityType::Domain) => "resolves-to",
        (_, EntityType::File) => "hosts",
        _ => "related-to",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_hashes() {
        assert_eq!(EntityType::classify(&"a".repeat(32)), EntityType::File);
        assert_eq!(EntityType::classify(&"b".repeat(40)), EntityType::File);
        assert_eq!(EntityType::classify(&"0".repeat(64)), EntityType::File);
    }

    #[test]
    fn test_classify_network_indicators() {
        assert_eq!(EntityType::classify("1.2.3.4"), EntityType::IpAddress);
        assert_eq!(EntityType::classify("https://evil.com/payload"), EntityType::Url);
        assert_eq!(EntityType::classify("evil.com"), EntityType::Domain);
        assert_eq!(EntityType::classify("evil.exe"), EntityType::Domain);
    }

    #[test]
    fn test_verdict_labels_and_severity() {
        assert_eq!(Verdict::from_label("Malicious"), Verdict::Malicious);
        assert_eq!(Verdict::from_label("BENIGN"), Verdict::Benign);
        assert_eq!(Verdict::from_label("whatever"), Verdict::Unknown);
        assert!(Verdict::Malicious.severity() > Verdict::Suspicious.severity());
        assert!(Verdict::Suspicious.severity() > Verdict::Unknown.severity());
        assert!(Verdict::Unknown.severity() > Verdict::Benign.severity());
    }

    #[test]
    fn test_merge_attributes_keeps_existing() {
        let mut node = EntityNode::new("evil.com", EntityType::Domain);
        node.attributes.insert("registrar".into(), Value::String("NameCheap".into()));

        let mut incoming = HashMap::new();
        incoming.insert("registrar".into(), Value::String("Other".into()));
        incoming.insert("asn".into(), Value::String("AS12345".into()));
        node.merge_attributes(incoming);

        assert_eq!(node.attributes["registrar"], Value::String("NameCheap".into()));
        assert_eq!(node.attributes["asn"], Value::String("AS12345".into()));
    }

    #[test]
    fn test_extract_indicator_priorities() {
        let (value, kind) = extract_indicator("investigate hash 0123456789abcdef0123456789abcdef").unwrap();
        assert_eq!(kind, EntityType::File);
        assert_eq!(value.len(), 32);

        let (value, kind) = extract_indicator("C2 server at 10.0.0.5 needs review").unwrap();
        assert_eq!((value.as_str(), kind), ("10.0.0.5", EntityType::IpAddress));

        let (value, kind) = extract_indicator("payload served from https://bad.example/x,").unwrap();
        assert_eq!(kind, EntityType::Url);
        assert_eq!(value, "https://bad.example/x");

        let (value, kind) = extract_indicator("pivot on evil-domain.com next").unwrap();
        assert_eq!((value.as_str(), kind), ("evil-domain.com", EntityType::Domain));
    }

    #[test]
    fn test_extract_indicator_skips_abbreviations() {
        assert_eq!(extract_indicator("no indicators here, e.g. nothing"), None);
    }

    #[test]
    fn test_parse_labeled_indicator() {
        assert_eq!(
            parse_labeled_indicator("IP: 1.2.3.4"),
            Some((EntityType::IpAddress, "1.2.3.4".to_string()))
        );
        assert_eq!(
            parse_labeled_indicator("File: 9f8a"),
            Some((EntityType::File, "9f8a".to_string()))
        );
        assert_eq!(parse_labeled_indicator("no separator"), None);
        assert_eq!(parse_labeled_indicator("Registry: HKLM\\x"), None);
    }

    #[test]
    fn test_relationship_kinds() {
        assert_eq!(relationship_kind(EntityType::File, EntityType::IpAddress), "communicates-with");
        assert_eq!(relationship_kind(EntityType::File, EntityType::File), "dropped");
        assert_eq!(relationship_kind(EntityType::Domain, EntityType::IpAddress), "resolves-to");
        assert_eq!(relationship_kind(EntityType::IpAddress, EntityType::File), "hosts");
        assert_eq!(relationship_kind(EntityType::Domain, EntityType::Domain), "related-to");
    }
}
