// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Lead reviewer: the iteration controller.
//!
//! After every round the reviewer plans the next one from the graph's
//! uninvestigated frontier, then decides CONTINUE or END in a fixed order:
//! hard iteration cap first (independent of findings), empty plan second.
//! Items planned in the round that hits the cap stay pending in the final
//! state, visible as undispatched work.
//!
//! Synthesis of the final narrative is a formatting concern: one engine
//! call, degrading to a deterministic markdown assembly when the engine
//! fails or the budget is spent.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::budget::BudgetTracker;
use crate::domain::graph::GraphCache;
use crate::domain::investigation::Finding;
use crate::domain::llm::{ChatMessage, EngineTurn, ReasoningEngine};
use crate::domain::work_item::{SpecialistKind, WorkItem};

/// Why the investigation loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    IterationCap { iteration: u32, max: u32 },
    NoLeads,
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndReason::IterationCap { iteration, max } => {
                write!(f, "iteration cap reached ({}/{})", iteration, max)
            }
            EndReason::NoLeads => write!(f, "no leads remaining"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Continue,
    End(EndReason),
}

const SYNTHESIS_PROMPT: &str = r#"You are the Lead Threat Intelligence Analyst.

Your team of specialist agents (Malware Specialist and Infrastructure
Specialist) has completed their analysis rounds. Your job is to read their
findings and write a **Threat Intelligence Synthesis** that maps out the
threat infrastructure and malware capabilities.

## Tone and Audience
- **Primary Audience**: Threat intelligence analysts and threat hunters
- **Tone**: Analytical and investigative. Use technical precision.
- **Focus**: "What does this tell us about the threat actor and their infrastructure?"

## Output Structure (Markdown)

## Lead Threat Hunter - Investigation Synthesis

### 1. Executive Summary (2-3 sentences)
### 2. Attack Narrative (3-5 sentences connecting malware behavior to infrastructure)
### 3. Threat Profiling (threat level, confidence, attribution, sophistication)
### 4. Infrastructure Mapping (shared hosting, DNS patterns, certificate reuse)
### 5. Malware Intelligence (capabilities, IOC expansion)
### 6. Intelligence Gaps and Research Pivots

## Instructions
- Be analytical and evidence-based. Quote specialist findings when relevant.
- If specialist reports are incomplete or degraded, note the gaps clearly.
- Never claim a verdict the evidence does not support.
- Clearly label speculation (use "likely", "possibly", "suspected").
- List entities that were discovered but not analyzed as open leads.
"#;

/// The iteration controller. Reviews each round's outcome against the graph
/// frontier and emits the next round's work items.
pub struct LeadReviewer {
    max_iterations: u32,
    max_leads_per_round: usize,
}

impl LeadReviewer {
    pub fn new(max_iterations: u32, max_leads_per_round: usize) -> Self {
        Self {
            max_iterations,
            max_leads_per_round,
        }
    }

    /// Plan the next round from the uninvestigated frontier: most severe
    /// verdicts first, bounded to a fixed count, files to the malware
    /// specialist and network entities to the infrastructure specialist.
    pub fn plan_next_round(&self, cache: &GraphCache, root: &str) -> Vec<WorkItem> {
        cache
            .get_uninvestigated()
            .into_iter()
            .filter(|node| node.id != root)
            .take(self.max_leads_per_round)
            .map(|node| {
                let kind = SpecialistKind::for_entity(node.entity_type);
                let task = match kind {
                    SpecialistKind::Malware => {
                        format!("Analyze file {} behavior and capabilities", node.id)
                    }
                    SpecialistKind::Infrastructure => {
                        format!("Investigate {} {}", node.entity_type, node.id)
                    }
                };
                let context = cache
                    .edges_into(&node.id)
                    .first()
                    .map(|edge| format!("Discovered via {} from {}", edge.kind, edge.source));
                WorkItem::new(kind, Some(node.id.clone()), task, context)
            })
            .collect()
    }

    /// Review one completed round. The plan is queued before the decision so
    /// a capped investigation still exposes its undispatched items.
    pub fn review(
        &self,
        iteration: u32,
        queue: &mut Vec<WorkItem>,
        cache: &GraphCache,
        root: &str,
    ) -> Decision {
        let plan = self.plan_next_round(cache, root);
        let planned = plan.len();
        info!(iteration, planned, frontier = cache.get_uninvestigated().len(), "lead review");
        queue.extend(plan);

        if iteration >= self.max_iterations {
            return Decision::End(EndReason::IterationCap {
                iteration,
                max: self.max_iterations,
            });
        }
        if planned == 0 {
            return Decision::End(EndReason::NoLeads);
        }
        Decision::Continue
    }

    /// Produce the final narrative. One engine call; any failure falls back
    /// to the deterministic assembly so the investigation still completes.
    pub async fn synthesize(
        &self,
        engine: &Arc<dyn ReasoningEngine>,
        budget: &BudgetTracker,
        root: &str,
        findings: &BTreeMap<String, Vec<Finding>>,
        unanalyzed: &[String],
    ) -> String {
        if budget.can_continue().is_err() {
            info!("budget spent, using deterministic synthesis");
            return fallback_report(root, findings, unanalyzed);
        }

        let context = synthesis_context(root, findings, unanalyzed);
        let messages = vec![ChatMessage::system(SYNTHESIS_PROMPT), ChatMessage::user(context)];

        match engine.converse(&messages, &[]).await {
            Ok(turn) => {
                budget.record_call();
                if let EngineTurn::FinalText(text) = turn {
                    if !text.trim().is_empty() {
                        return text;
                    }
                }
                warn!("synthesis returned no text, using deterministic report");
                fallback_report(root, findings, unanalyzed)
            }
            Err(e) => {
                warn!(error = %e, "synthesis failed, using deterministic report");
                fallback_report(root, findings, unanalyzed)
            }
        }
    }
}

fn synthesis_context(
    root: &str,
    findings: &BTreeMap<String, Vec<Finding>>,
    unanalyzed: &[String],
) -> String {
    let mut context = format!("# Investigation Data\n\nRoot indicator: `{}`\n", root);

    for (agent, agent_findings) in findings {
        context.push_str(&format!("\n## {} specialist findings\n", agent));
        for finding in agent_findings {
            context.push_str(&format!(
                "- Verdict: {} (score: {})\n- Summary: {}\n",
                finding.verdict,
                finding
                    .threat_score
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "N/A".to_string()),
                finding.summary
            ));
            for pivot in &finding.pivot_findings {
                context.push_str(&format!("  - Pivot: {}\n", pivot));
            }
            if finding.degraded {
                context.push_str("  - NOTE: this round's analysis was degraded (no structured result).\n");
            }
        }
    }

    context.push_str("\n## Discovered but not analyzed\n");
    if unanalyzed.is_empty() {
        context.push_str("(none; all discovered entities were analyzed)\n");
    } else {
        for entity in unanalyzed {
            context.push_str(&format!("- {}\n", entity));
        }
    }
    context
}

/// Deterministic markdown assembly of the findings. The report always
/// separates analyzed results from budget-capped open leads.
pub fn fallback_report(
    root: &str,
    findings: &BTreeMap<String, Vec<Finding>>,
    unanalyzed: &[String],
) -> String {
    let mut md = String::from("## Lead Threat Hunter - Investigation Synthesis\n\n");
    md.push_str("### Executive Summary\n");
    md.push_str(&format!(
        "Investigation of `{}` converged with findings from {} specialist track(s).\n\n",
        root,
        findings.len()
    ));

    for (agent, agent_findings) in findings {
        md.push_str(&format!("### {} Specialist Analysis\n", capitalize(agent)));
        for finding in agent_findings {
            if finding.degraded {
                md.push_str(&format!("*Analysis degraded:* {}\n\n", finding.summary));
                continue;
            }
            md.push_str(&format!(
                "**Verdict:** {} (score: {})\n\n{}\n\n",
                finding.verdict,
                finding
                    .threat_score
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "N/A".to_string()),
                finding.summary
            ));
            if !finding.pivot_findings.is_empty() {
                md.push_str("**Pivot Findings**\n");
                for pivot in &finding.pivot_findings {
                    md.push_str(&format!("*   {}\n", pivot));
                }
                md.push('\n');
            }
            if !finding.related_indicators.is_empty() {
                md.push_str("**Related Indicators**\n");
                for indicator in &finding.related_indicators {
                    md.push_str(&format!("*   `{}`\n", indicator));
                }
                md.push('\n');
            }
        }
    }

    md.push_str("### Intelligence Gaps\n");
    if unanalyzed.is_empty() {
        md.push_str("All discovered entities were analyzed.\n");
    } else {
        md.push_str("Discovered but **not analyzed** (open leads):\n");
        for entity in unanalyzed {
            md.push_str(&format!("*   `{}`\n", entity));
        }
    }
    md
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
