//! Bounded Tool-Calling Loop
//!
//! The generic execution pattern every specialist worker runs: a capped
//! conversation loop against the reasoning engine with a fixed tool set,
//! producing a best-effort result even when the engine misbehaves.
//!
//! # State machine
//!
//! ```text
//! INIT -> REASONING -> (TOOL_EXECUTION -> REASONING)* -> DONE
//!                                                      | EXHAUSTED (recovered)
//!                                                      | ERROR (nothing usable)
//! ```
//!
//! Tool failures are appended to the conversation as the tool's result; they
//! are evidence the engine can reason about, not loop aborts. When the round
//! cap is reached without final text, the conversation is scanned backward
//! for the latest assistant message carrying no tool requests and its text is
//! recovered as the result.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::budget::BudgetTracker;
use crate::domain::llm::{ChatMessage, EngineTurn, ReasoningEngine, Role};
use crate::domain::tool::{Tool, ToolSchema};

/// Degraded-path outcomes of a worker loop. Neither is fatal to the
/// investigation; both become explicit "analysis failed" findings upstream.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("no usable output produced")]
    EmptyOutput,

    #[error("no structured payload found in worker output: {0}")]
    Format(String),
}

/// Instruction appended ahead of the last permitted reasoning round.
const FINAL_ROUND_NUDGE: &str = "This is the FINAL round. You MUST stop using tools now. \
Based on all the information you've gathered, provide your complete analysis in valid JSON \
format as specified in the system prompt. Do NOT make any more tool calls. If you don't have \
enough information, provide your best analysis based on what you've gathered so far.";

/// A capped conversation loop bound to a fixed tool set.
pub struct ToolLoop {
    engine: Arc<dyn ReasoningEngine>,
    tools: Vec<Arc<dyn Tool>>,
    max_rounds: usize,
}

/// Successful (possibly recovered) loop output.
#[derive(Debug)]
pub struct LoopOutput {
    pub text: String,
    /// True when the text came from the backward recovery scan rather than a
    /// clean final answer.
    pub exhausted: bool,
    /// Full conversation, for degraded-finding context and observability.
    pub transcript: Vec<ChatMessage>,
}

impl ToolLoop {
    pub fn new(engine: Arc<dyn ReasoningEngine>, tools: Vec<Arc<dyn Tool>>, max_rounds: usize) -> Self {
        Self {
            engine,
            tools,
            max_rounds,
        }
    }

    fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.schema()).collect()
    }

    fn find_tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.schema().name == name)
    }

    /// Run the loop to DONE, EXHAUSTED or ERROR.
    ///
    /// The budget is consulted before every reasoning round; once it fails,
    /// no new round starts and the loop falls through to recovery with
    /// whatever the conversation already holds.
    pub async fn run(
        &self,
        worker: &str,
        system_prompt: &str,
        user_prompt: &str,
        budget: &BudgetTracker,
    ) -> Result<LoopOutput, WorkerError> {
        let schemas = self.schemas();
        let mut conversation = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_prompt),
        ];
        let mut final_text: Option<String> = None;

        for round in 0..self.max_rounds {
            if let Err(reason) = budget.can_continue() {
                warn!(worker, round, %reason, "budget exhausted, stopping reasoning loop");
                break;
            }

            if round + 1 == self.max_rounds {
                debug!(worker, round, "final round, requesting structured answer");
                conversation.push(ChatMessage::user(FINAL_ROUND_NUDGE));
            }

            let turn = match self.engine.converse(&conversation, &schemas).await {
                Ok(turn) => {
                    budget.record_call();
                    turn
                }
                Err(e) => {
                    warn!(worker, round, error = %e, "reasoning engine error, attempting recovery");
                    break;
                }
            };

            match turn {
                EngineTurn::FinalText(text) => {
                    conversation.push(ChatMessage::assistant(text.clone()));
                    if !text.trim().is_empty() {
                        final_text = Some(text);
                        break;
                    }
                    // Empty answer: keep looping, the nudge or recovery will
                    // deal with it.
                }
                EngineTurn::Act { thought, requests } => {
                    debug!(worker, round, num_tools = requests.len(), "executing tool requests");
                    conversation.push(ChatMessage::assistant_with_requests(
                        thought.unwrap_or_default(),
                        requests.clone(),
                    ));
                    for request in requests {
                        let result_text = match self.find_tool(&request.name) {
                            Some(tool) => match tool.invoke(&request.arguments).await {
                                Ok(text) => {
                                    budget.record_call();
                                    text
                                }
                                Err(e) => {
                                    warn!(worker, tool = %request.name, error = %e, "tool call failed");
                                    e.to_string()
                                }
                            },
                            None => {
                                warn!(worker, tool = %request.name, "unknown tool requested");
                                format!("Error: tool {} not found", request.name)
                            }
                        };
                        conversation.push(ChatMessage::tool_result(request.id, result_text));
                    }
                }
            }
        }

        if let Some(text) = final_text {
            return Ok(LoopOutput {
                text,
                exhausted: false,
                transcript: conversation,
            });
        }

        warn!(worker, total_messages = conversation.len(), "no final content, using fallback");
        match recover_last_text(&conversation) {
            Some(text) => Ok(LoopOutput {
                text,
                exhausted: true,
                transcript: conversation,
            }),
            None => Err(WorkerError::EmptyOutput),
        }
    }
}

/// Backward scan for the most recent assistant message that has content and
/// no pending tool requests attached.
fn recover_last_text(conversation: &[ChatMessage]) -> Option<String> {
    conversation
        .iter()
        .rev()
        .find(|msg| {
            msg.role == Role::Assistant && !msg.content.trim().is_empty() && msg.tool_requests.is_empty()
        })
        .map(|msg| msg.content.clone())
}

/// Extract the structured payload embedded in free-form worker output.
///
/// The payload may arrive fenced, as a bare object, or as a bare array.
/// Whichever bracket appears first selects the mode; in array mode only the
/// first element is kept (a worker emitting several records loses all but
/// the first; longstanding observed behavior).
pub fn extract_payload(raw: &str) -> Result<Value, WorkerError> {
    let content = strip_fences(raw);

    let array_start = content.find('[');
    let object_start = content.find('{');

    match (array_start, object_start) {
        (Some(a), o) if o.map_or(true, |o| a < o) => {
            let end = content
                .rfind(']')
                .ok_or_else(|| WorkerError::Format("no closing bracket for JSON array".to_string()))?;
            let parsed: Value = serde_json::from_str(&content[a..=end])
                .map_err(|e| WorkerError::Format(e.to_string()))?;
            match parsed {
                Value::Array(items) => items
                    .into_iter()
                    .next()
                    .ok_or_else(|| WorkerError::Format("JSON array is empty".to_string())),
                _ => Err(WorkerError::Format("expected a JSON array".to_string())),
            }
        }
        (_, Some(o)) => {
            let end = content
                .rfind('}')
                .ok_or_else(|| WorkerError::Format("no closing brace for JSON object".to_string()))?;
            serde_json::from_str(&content[o..=end]).map_err(|e| WorkerError::Format(e.to_string()))
        }
        (None, None) => Err(WorkerError::Format(format!(
            "no JSON structure found, content starts with: {}",
            content.chars().take(100).collect::<String>()
        ))),
        // (Some(a), None) always satisfies the first arm's guard
        // (o.map_or(true, ..) is true when there is no object), so this
        // case is unreachable; present only to satisfy exhaustiveness.
        (Some(_), None) => unreachable!("array-present/object-absent is handled by the first arm"),
    }
}

/// Strip markdown code fences the way workers tend to emit them: a
/// ```json fence wins, otherwise the first complete bare fence pair.
fn strip_fences(raw: &str) -> String {
    let raw = raw.trim();
    if let Some(idx) = raw.rfind("```json") {
        let after = &raw[idx + "```json".len()..];
        return after.split("```").next().unwrap_or(after).trim().to_string();
    }
    if raw.matches("```").count() >= 2 {
        if let Some(inner) = raw.split("```").nth(1) {
            return inner.trim().to_string();
        }
    }
    raw.to_string()
}
