// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Hunt Configuration Types
//
// Defines the configuration schema for Kestrel investigation nodes:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Reasoning engine provider selection (BYOLLM support)
// - Threat-intel feed endpoint and credentials
// - Budget ceilings and hunt tuning knobs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::budget::BudgetLimits;

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const KIND: &str = "HuntConfig";

/// Top-level Kubernetes-style configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HuntConfigManifest {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "HuntConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: HuntSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable node name (unique identifier)
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HuntSpec {
    /// Reasoning engine provider
    pub llm: EngineProviderConfig,

    /// Threat-intel feed
    pub intel: IntelConfig,

    /// Resource ceilings per investigation
    #[serde(default)]
    pub budget: BudgetLimits,

    /// Hunt tuning knobs
    #[serde(default)]
    pub hunt: HuntTuning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineProviderConfig {
    /// Provider type ("anthropic")
    pub provider_type: String,

    /// Optional endpoint override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// API key, or "env:VAR_NAME" indirection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelConfig {
    /// Base URL of the threat-intel REST surface
    pub endpoint: String,

    /// API key, or "env:VAR_NAME" indirection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HuntTuning {
    /// Reasoning rounds per specialist invocation
    #[serde(default = "default_worker_rounds")]
    pub worker_rounds: usize,

    /// Work items the lead reviewer may plan per round
    #[serde(default = "default_max_leads_per_round")]
    pub max_leads_per_round: usize,

    /// Distinct targets one specialist processes per round
    #[serde(default = "default_max_targets_per_worker")]
    pub max_targets_per_worker: usize,
}

fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.0
}
fn default_worker_rounds() -> usize {
    7
}
fn default_max_leads_per_round() -> usize {
    5
}
fn default_max_targets_per_worker() -> usize {
    3
}

impl Default for HuntTuning {
    fn default() -> Self {
        Self {
            worker_rounds: default_worker_rounds(),
            max_leads_per_round: default_max_leads_per_round(),
            max_targets_per_worker: default_max_targets_per_worker(),
        }
    }
}

impl HuntConfigManifest {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Validate the manifest structure and constraints
    pub fn validate(&self) -> Result<(), String> {
        if self.api_version != API_VERSION {
            return Err(format!(
                "Invalid apiVersion: expected '{}', got '{}'",
                API_VERSION, self.api_version
            ));
        }
        if self.kind != KIND {
            return Err(format!("Invalid kind: expected '{}', got '{}'", KIND, self.kind));
        }
        if self.metadata.name.is_empty() {
            return Err("metadata.name cannot be empty".to_string());
        }
        for ch in self.metadata.name.chars() {
            if !ch.is_ascii_lowercase() && !ch.is_ascii_digit() && ch != '-' {
                return Err(format!(
                    "Invalid metadata.name: '{}' must be lowercase alphanumeric with hyphens",
                    self.metadata.name
                ));
            }
        }
        if self.spec.hunt.worker_rounds == 0 {
            return Err("hunt.worker_rounds must be at least 1".to_string());
        }
        if self.spec.budget.max_iterations == 0 {
            return Err("budget.max_iterations must be at least 1".to_string());
        }
        Ok(())
    }
}
