// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Reasoning engine domain interface (Anti-Corruption Layer).
//!
//! Isolates the investigation core from vendor LLM APIs: given a
//! conversation and a set of callable tools, an engine yields either tool
//! invocation requests or final free-form text. The core assumes nothing
//! about determinism or latency beyond "eventually returns one of the two".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::tool::ToolSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One requested tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Correlation id the engine expects back on the tool result.
    pub id: String,
    pub name: String,
    pub arguments: HashMap<String, String>,
}

/// One turn of a worker conversation. Each worker owns its buffer as a
/// value; only extracted results cross into shared state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Tool invocations attached to an assistant turn, empty otherwise.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_requests: Vec<ToolRequest>,
    /// Correlation id for a tool-result turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_requests: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_requests: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_requests: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant_with_requests(content: impl Into<String>, requests: Vec<ToolRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_requests: requests,
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_requests: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// What the engine produced for one reasoning step.
#[derive(Debug, Clone)]
pub enum EngineTurn {
    /// The engine wants tools executed; `thought` carries any interleaved
    /// reasoning text.
    Act {
        thought: Option<String>,
        requests: Vec<ToolRequest>,
    },
    /// Final free-form answer, no further tool requests.
    FinalText(String),
}

/// Domain interface for reasoning engines.
/// Implementations in infrastructure/llm/ directory.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn converse(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
    ) -> Result<EngineTurn, EngineError>;
}

/// Errors that can occur during engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
