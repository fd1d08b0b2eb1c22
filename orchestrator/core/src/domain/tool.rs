// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Callable tool boundary.
//!
//! A tool takes string arguments and returns text (structured payloads are
//! serialized JSON). Both success and failure results are appended to the
//! worker conversation as evidence, so failures carry a message rather than
//! aborting the loop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One declared tool parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParam {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

/// Schema handed to the reasoning engine for binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub params: Vec<ToolParam>,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: &str, description: &str, required: bool) -> Self {
        self.params.push(ToolParam {
            name: name.to_string(),
            description: description.to_string(),
            required,
        });
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("missing argument: {0}")]
    MissingArgument(String),

    /// Upstream lookup failure; the message is the evidence the engine sees.
    #[error("{0}")]
    Upstream(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Domain interface for callable tools bound to a worker loop.
#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;

    async fn invoke(&self, args: &HashMap<String, String>) -> Result<String, ToolError>;
}

/// Fetch a required argument or fail with the argument's name.
pub fn required_arg<'a>(
    args: &'a HashMap<String, String>,
    name: &str,
) -> Result<&'a str, ToolError> {
    args.get(name)
        .map(String::as_str)
        .ok_or_else(|| ToolError::MissingArgument(name.to_string()))
}
