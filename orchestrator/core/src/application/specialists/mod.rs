// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Specialist workers.
//!
//! Each specialist is the bounded tool-calling loop specialized with a role
//! instruction and a tool set scoped to its entity types. Post-processing
//! follows a hard ordering: every newly discovered entity is written into
//! the graph cache *before* the minimal summary finding is produced, so no
//! discovery is lost even if summarization fails.

pub mod infrastructure;
pub mod malware;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::application::agent_loop::{extract_payload, ToolLoop};
use crate::domain::budget::BudgetTracker;
use crate::domain::config::HuntTuning;
use crate::domain::entity::{
    extract_indicator, parse_labeled_indicator, relationship_kind, EntityType, Verdict,
};
use crate::domain::events::InvestigationEvent;
use crate::domain::graph::GraphCache;
use crate::domain::intel::{pivot_relationships, IntelSource};
use crate::domain::investigation::{Finding, InvestigationId};
use crate::domain::llm::ReasoningEngine;
use crate::domain::tool::Tool;
use crate::domain::work_item::{SpecialistKind, WorkItem};
use crate::infrastructure::event_bus::EventBus;

/// Everything a specialist needs for one round. The cache and budget are the
/// only shared mutable state; both are internally serialized.
pub struct RoundContext {
    pub investigation_id: InvestigationId,
    pub root: String,
    pub root_type: EntityType,
    pub triage_summary: String,
    pub cache: Arc<Mutex<GraphCache>>,
    pub budget: Arc<BudgetTracker>,
    pub intel: Arc<dyn IntelSource>,
    pub events: EventBus,
    pub tuning: HuntTuning,
}

/// A worker that consumes its assigned work items and returns one finding.
/// Failures degrade into explicit error findings; they never escape.
#[async_trait]
pub trait Specialist: Send + Sync {
    fn kind(&self) -> SpecialistKind;

    async fn execute(&self, ctx: &RoundContext, items: &[WorkItem]) -> Finding;
}

/// Structured report a specialist emits. Extraction is deliberately lenient;
/// workers are unreliable and a partially filled report beats none.
#[derive(Debug, Clone, Default)]
pub struct SpecialistReport {
    pub verdict: String,
    pub threat_score: Option<u8>,
    pub categories: Vec<String>,
    pub pivot_findings: Vec<String>,
    pub related_indicators: Vec<String>,
    pub summary: String,
}

impl SpecialistReport {
    pub fn from_value(value: &Value) -> SpecialistReport {
        fn string_list(value: Option<&Value>) -> Vec<String> {
            value
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| item.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()
        }

        let threat_score = value
            .get("threat_score")
            .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .map(|score| score.clamp(0.0, 100.0) as u8);

        SpecialistReport {
            verdict: value
                .get("verdict")
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string(),
            threat_score,
            categories: string_list(value.get("categories")),
            pivot_findings: string_list(value.get("pivot_findings")),
            related_indicators: string_list(value.get("related_indicators")),
            summary: value
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or("No summary provided.")
                .to_string(),
        }
    }
}

/// One concrete analysis target for a round.
#[derive(Debug, Clone, Serialize)]
struct Target {
    value: String,
    entity_type: EntityType,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<String>,
}

/// Generic specialist: the loop plus a role prompt, an entity-type filter
/// and a scoped tool set.
pub struct SpecialistAgent {
    kind: SpecialistKind,
    role_prompt: &'static str,
    accepts: fn(EntityType) -> bool,
    engine: Arc<dyn ReasoningEngine>,
    tools: Vec<Arc<dyn Tool>>,
}

impl SpecialistAgent {
    pub(crate) fn new(
        kind: SpecialistKind,
        role_prompt: &'static str,
        accepts: fn(EntityType) -> bool,
        engine: Arc<dyn ReasoningEngine>,
        tools: Vec<Arc<dyn Tool>>,
    ) -> Self {
        Self {
            kind,
            role_prompt,
            accepts,
            engine,
            tools,
        }
    }

    /// Root indicator (when type-appropriate and not yet analyzed) plus the
    /// assigned work items, with heuristic recovery for items that arrived
    /// without an entity id. Deduplicated and capped.
    fn identify_targets(&self, ctx: &RoundContext, items: &[WorkItem]) -> Vec<Target> {
        let mut targets: Vec<Target> = Vec::new();

        if (self.accepts)(ctx.root_type) {
            let root_analyzed = ctx
                .cache
                .lock()
                .node(&ctx.root)
                .map(|n| n.analyzed)
                .unwrap_or(false);
            if !root_analyzed {
                targets.push(Target {
                    value: ctx.root.clone(),
                    entity_type: ctx.root_type,
                    context: None,
                });
            }
        }

        for item in items {
            let resolved = match &item.entity_id {
                Some(id) => {
                    // Trust the graph's typing over the raw string; a file
                    // named like a domain would misclassify otherwise.
                    let entity_type = ctx
                        .cache
                        .lock()
                        .node(id)
                        .map(|n| n.entity_type)
                        .unwrap_or_else(|| EntityType::classify(id));
                    Some((id.clone(), entity_type))
                }
                None => {
                    // Planner forgot the id: pattern-match one out of the
                    // task text instead of dropping the subtask.
                    let recovered = extract_indicator(&item.task);
                    if recovered.is_none() {
                        warn!(worker = %self.kind, task = %item.task, "could not recover a target from work item");
                    }
                    recovered
                }
            };
            if let Some((value, entity_type)) = resolved {
                if !(self.accepts)(entity_type) {
                    warn!(worker = %self.kind, target = %value, "work item targets a foreign entity type");
                    continue;
                }
                targets.push(Target {
                    value,
                    entity_type,
                    context: item.context.clone(),
                });
            }
        }

        let mut seen = std::collections::HashSet::new();
        targets.retain(|t| seen.insert(t.value.clone()));
        targets.truncate(ctx.tuning.max_targets_per_worker);
        targets
    }

    fn build_user_prompt(&self, ctx: &RoundContext, targets: &[Target], items: &[WorkItem]) -> String {
        let targets_json = serde_json::to_string_pretty(targets).unwrap_or_default();

        let mut instructions = String::new();
        for item in items {
            instructions.push_str(&format!("- Task: {}\n", item.task));
            if let Some(context) = &item.context {
                instructions.push_str(&format!("  Context: {}\n", context));
            }
        }
        if instructions.is_empty() {
            instructions.push_str("Perform comprehensive analysis.\n");
        }

        format!(
            "**TRIAGE SUMMARY:**\n{}\n\n**YOUR ASSIGNMENT:**\nAnalyze the following indicators \
             based on the triage context above:\n{}\n\n**SPECIFIC INSTRUCTIONS:**\n{}",
            ctx.triage_summary, targets_json, instructions
        )
    }

    /// Fold the worker's related indicators into the graph. Runs under one
    /// cache lock; must complete before the finding is assembled.
    fn write_discoveries(&self, ctx: &RoundContext, primary: &Target, report: &SpecialistReport) {
        let mut cache = ctx.cache.lock();

        for indicator in &report.related_indicators {
            let Some((entity_type, value)) = parse_labeled_indicator(indicator) else {
                debug!(worker = %self.kind, indicator = %indicator, "unparseable related indicator");
                continue;
            };
            if value == primary.value {
                continue;
            }

            let mut attributes = HashMap::new();
            attributes.insert("context".to_string(), Value::from("related_indicator"));
            if cache.upsert_node(&value, entity_type, attributes).created {
                ctx.budget.record_node();
            }

            let kind_label = relationship_kind(primary.entity_type, entity_type);
            let description = format!("reported by {} specialist", self.kind);
            if !cache.add_edge(&primary.value, &value, kind_label, Some(description)) {
                warn!(worker = %self.kind, source = %primary.value, target = %value, "edge rejected");
                ctx.events.publish(InvestigationEvent::EdgeRejected {
                    investigation_id: ctx.investigation_id,
                    source: primary.value.clone(),
                    target: value.clone(),
                    kind: kind_label.to_string(),
                });
            }
        }

        let verdict = Verdict::from_label(&report.verdict);
        if verdict != Verdict::Unknown {
            if let Err(e) = cache.apply_assessment(&primary.value, verdict, report.threat_score) {
                warn!(worker = %self.kind, error = %e, "could not record assessment");
            }
        }
    }

    /// Fetch relationship pivots for every analyzed target and fold the
    /// returned entities into the graph. Budget is consulted before each
    /// fetch; exhaustion stops expansion, never the whole round.
    async fn expand_relationships(&self, ctx: &RoundContext, targets: &[Target]) {
        for target in targets {
            for relationship in pivot_relationships(target.entity_type) {
                if let Err(reason) = ctx.budget.can_continue() {
                    warn!(worker = %self.kind, %reason, "stopping relationship expansion");
                    return;
                }

                match ctx.intel.related(target.entity_type, &target.value, relationship).await {
                    Ok(entities) => {
                        ctx.budget.record_call();
                        let mut new_entities = 0usize;
                        let mut cache = ctx.cache.lock();
                        for entity in entities {
                            if ctx.budget.can_continue().is_err() {
                                break;
                            }
                            if cache
                                .upsert_node(&entity.id, entity.entity_type, entity.attributes)
                                .created
                            {
                                ctx.budget.record_node();
                                new_entities += 1;
                            }
                            if !cache.add_edge(&target.value, &entity.id, &entity.relationship, None) {
                                warn!(worker = %self.kind, source = %target.value, target = %entity.id, "edge rejected");
                                ctx.events.publish(InvestigationEvent::EdgeRejected {
                                    investigation_id: ctx.investigation_id,
                                    source: target.value.clone(),
                                    target: entity.id.clone(),
                                    kind: entity.relationship.clone(),
                                });
                            }
                        }
                        debug!(
                            worker = %self.kind,
                            target = %target.value,
                            relationship,
                            new_entities,
                            "graph expanded"
                        );
                    }
                    Err(e) => {
                        debug!(worker = %self.kind, target = %target.value, relationship, error = %e, "relationship fetch failed");
                    }
                }
            }
        }
    }

    fn degraded_finding(&self, ctx: &RoundContext, summary: String, raw: Option<String>) -> Finding {
        ctx.events.publish(InvestigationEvent::SpecialistCompleted {
            investigation_id: ctx.investigation_id,
            kind: self.kind,
            degraded: true,
        });
        Finding::degraded(self.kind, summary, raw)
    }
}

#[async_trait]
impl Specialist for SpecialistAgent {
    fn kind(&self) -> SpecialistKind {
        self.kind
    }

    async fn execute(&self, ctx: &RoundContext, items: &[WorkItem]) -> Finding {
        let targets = self.identify_targets(ctx, items);
        if targets.is_empty() {
            warn!(worker = %self.kind, "no analyzable targets this round");
            return self.degraded_finding(ctx, "No analyzable targets this round.".to_string(), None);
        }

        info!(worker = %self.kind, targets = targets.len(), "specialist starting");
        ctx.events.publish(InvestigationEvent::SpecialistStarted {
            investigation_id: ctx.investigation_id,
            kind: self.kind,
            targets: targets.len(),
        });

        // Targets become graph nodes up front so heuristically recovered
        // indicators are never lost, whatever happens below.
        {
            let mut cache = ctx.cache.lock();
            for target in &targets {
                if cache
                    .upsert_node(&target.value, target.entity_type, HashMap::new())
                    .created
                {
                    ctx.budget.record_node();
                }
            }
        }

        let user_prompt = self.build_user_prompt(ctx, &targets, items);
        let tool_loop = ToolLoop::new(self.engine.clone(), self.tools.clone(), ctx.tuning.worker_rounds);

        let output = match tool_loop
            .run(self.kind.as_str(), self.role_prompt, &user_prompt, &ctx.budget)
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!(worker = %self.kind, error = %e, "worker loop produced nothing usable");
                return self.degraded_finding(ctx, format!("Analysis failed: {}", e), None);
            }
        };

        let payload = match extract_payload(&output.text) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(worker = %self.kind, error = %e, "failed to parse analysis results");
                return self.degraded_finding(
                    ctx,
                    format!("Failed to parse analysis results: {}", e),
                    Some(output.text),
                );
            }
        };
        let report = SpecialistReport::from_value(&payload);

        // Graph first, finding second.
        let primary = &targets[0];
        self.write_discoveries(ctx, primary, &report);
        self.expand_relationships(ctx, &targets).await;

        {
            let mut cache = ctx.cache.lock();
            for target in &targets {
                let detail = json!({ "agent": self.kind.as_str(), "summary": report.summary });
                if let Err(e) = cache.mark_analyzed(&target.value, Some(detail)) {
                    warn!(worker = %self.kind, error = %e, "mark analyzed failed");
                }
            }
        }

        info!(worker = %self.kind, verdict = %report.verdict, "specialist finished");
        ctx.events.publish(InvestigationEvent::SpecialistCompleted {
            investigation_id: ctx.investigation_id,
            kind: self.kind,
            degraded: false,
        });

        Finding {
            agent: self.kind,
            verdict: Verdict::from_label(&report.verdict),
            threat_score: report.threat_score,
            categories: report.categories,
            pivot_findings: report.pivot_findings,
            related_indicators: report.related_indicators,
            summary: report.summary,
            degraded: false,
            raw_output: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::budget::BudgetLimits;
    use crate::domain::intel::{IntelReport, RelatedEntity};
    use crate::domain::llm::{ChatMessage, EngineError, EngineTurn};
    use crate::domain::tool::{ToolError, ToolSchema};

    struct OneShotEngine {
        answer: String,
    }

    #[async_trait]
    impl ReasoningEngine for OneShotEngine {
        async fn converse(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolSchema],
        ) -> Result<EngineTurn, EngineError> {
            Ok(EngineTurn::FinalText(self.answer.clone()))
        }
    }

    struct NullIntel;

    #[async_trait]
    impl IntelSource for NullIntel {
        async fn report(&self, _entity_type: EntityType, _id: &str) -> Result<IntelReport, ToolError> {
            Err(ToolError::Upstream("not wired".to_string()))
        }

        async fn related(
            &self,
            _entity_type: EntityType,
            _id: &str,
            _relationship: &str,
        ) -> Result<Vec<RelatedEntity>, ToolError> {
            Ok(vec![])
        }
    }

    fn context(root: &str, root_type: EntityType) -> RoundContext {
        let mut cache = GraphCache::new();
        cache.upsert_node(root, root_type, HashMap::new());
        RoundContext {
            investigation_id: InvestigationId::new(),
            root: root.to_string(),
            root_type,
            triage_summary: "root flagged by triage".to_string(),
            cache: Arc::new(Mutex::new(cache)),
            budget: Arc::new(BudgetTracker::new(BudgetLimits::default())),
            intel: Arc::new(NullIntel),
            events: EventBus::with_default_capacity(),
            tuning: HuntTuning::default(),
        }
    }

    fn agent(answer: &str) -> SpecialistAgent {
        SpecialistAgent::new(
            SpecialistKind::Malware,
            "role",
            |t| matches!(t, EntityType::File),
            Arc::new(OneShotEngine {
                answer: answer.to_string(),
            }),
            vec![],
        )
    }

    #[test]
    fn test_report_from_lenient_value() {
        let value = json!({
            "verdict": "Malicious",
            "threat_score": "85",
            "categories": ["Botnet"],
            "related_indicators": ["IP: 1.2.3.4", 42],
            "summary": "bad"
        });
        let report = SpecialistReport::from_value(&value);
        assert_eq!(report.verdict, "Malicious");
        assert_eq!(report.threat_score, Some(85));
        assert_eq!(report.related_indicators, vec!["IP: 1.2.3.4"]);
        assert_eq!(report.summary, "bad");

        let empty = SpecialistReport::from_value(&json!({}));
        assert_eq!(empty.verdict, "Unknown");
        assert_eq!(empty.summary, "No summary provided.");
    }

    #[tokio::test]
    async fn test_execute_writes_graph_before_finding() {
        let hash = "a".repeat(64);
        let ctx = context(&hash, EntityType::File);
        let answer = json!({
            "verdict": "Malicious",
            "threat_score": 90,
            "pivot_findings": ["communicates with 1.2.3.4"],
            "related_indicators": ["IP: 1.2.3.4"],
            "summary": "beacons to hardcoded C2"
        })
        .to_string();

        let finding = agent(&answer).execute(&ctx, &[]).await;

        assert!(!finding.degraded);
        assert_eq!(finding.verdict, Verdict::Malicious);

        let cache = ctx.cache.lock();
        assert_eq!(cache.node_count(), 2);
        assert_eq!(cache.edge_count(), 1);
        assert!(cache.node(&hash).unwrap().analyzed);
        let discovered = cache.node("1.2.3.4").unwrap();
        assert!(!discovered.analyzed);
        let edges = cache.export_edges();
        assert_eq!(edges[0].kind, "communicates-with");
        assert_eq!(edges[0].source, hash);
        assert_eq!(edges[0].target, "1.2.3.4");
    }

    #[tokio::test]
    async fn test_execute_degrades_on_unparseable_output() {
        let hash = "b".repeat(64);
        let ctx = context(&hash, EntityType::File);
        let finding = agent("I could not produce JSON, sorry").execute(&ctx, &[]).await;

        assert!(finding.degraded);
        assert_eq!(finding.verdict, Verdict::Error);
        assert!(finding.raw_output.as_deref().unwrap().contains("sorry"));
        // Target stays unanalyzed so a later round may re-plan it.
        assert!(!ctx.cache.lock().node(&hash).unwrap().analyzed);
    }

    #[tokio::test]
    async fn test_heuristic_target_recovery_from_task_text() {
        let ctx = context("root.com", EntityType::Domain);
        let agent = SpecialistAgent::new(
            SpecialistKind::Infrastructure,
            "role",
            |t| !matches!(t, EntityType::File),
            Arc::new(OneShotEngine {
                answer: json!({"verdict": "Suspicious", "summary": "s"}).to_string(),
            }),
            vec![],
        );
        let items = vec![WorkItem::new(
            SpecialistKind::Infrastructure,
            None,
            "Investigate the C2 at 9.8.7.6 seen in beacon traffic",
            None,
        )];

        let finding = agent.execute(&ctx, &items).await;
        assert!(!finding.degraded);
        // Both the root and the recovered IP were processed.
        let cache = ctx.cache.lock();
        assert!(cache.contains("9.8.7.6"));
        assert!(cache.node("9.8.7.6").unwrap().analyzed);
    }

    #[tokio::test]
    async fn test_no_targets_degrades() {
        // Root is a domain; the malware specialist accepts only files and
        // gets no work items.
        let ctx = context("root.com", EntityType::Domain);
        let finding = agent("{}").execute(&ctx, &[]).await;
        assert!(finding.degraded);
        assert!(finding.summary.contains("No analyzable targets"));
    }
}
