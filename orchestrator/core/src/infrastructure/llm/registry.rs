// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Reasoning Engine Registry - Provider Construction
//
// Builds the configured reasoning engine behind the domain interface.
// Deliberately carries no retry or fallback machinery: a failed engine call
// is evidence the worker loop degrades around, and re-targeting an entity is
// the next round's decision.

use std::sync::Arc;

use tracing::info;

use crate::domain::config::EngineProviderConfig;
use crate::domain::llm::ReasoningEngine;

use super::anthropic::AnthropicEngine;

/// Create an engine instance from configuration
pub fn build_engine(config: &EngineProviderConfig) -> anyhow::Result<Arc<dyn ReasoningEngine>> {
    let api_key = resolve_api_key(&config.api_key)?;

    info!(provider = %config.provider_type, model = %config.model, "initializing reasoning engine");

    let engine: Arc<dyn ReasoningEngine> = match config.provider_type.as_str() {
        "anthropic" => match &config.endpoint {
            Some(endpoint) => Arc::new(AnthropicEngine::with_endpoint(
                endpoint.clone(),
                api_key,
                config.model.clone(),
                config.max_tokens,
                config.temperature,
            )),
            None => Arc::new(AnthropicEngine::new(
                api_key,
                config.model.clone(),
                config.max_tokens,
                config.temperature,
            )),
        },
        _ => anyhow::bail!("Unsupported provider type: {}", config.provider_type),
    };

    Ok(engine)
}

/// Resolve API key from config (supports "env:VAR_NAME" syntax)
pub fn resolve_api_key(key: &Option<String>) -> anyhow::Result<String> {
    match key {
        Some(k) if k.starts_with("env:") => {
            let var_name = k.strip_prefix("env:").unwrap();
            std::env::var(var_name)
                .map_err(|_| anyhow::anyhow!("Environment variable not set: {}", var_name))
        }
        Some(k) => Ok(k.clone()),
        None => Ok(String::new()), // For local providers without auth
    }
}
