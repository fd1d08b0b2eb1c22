//! Investigation Service
//!
//! Drives one investigation from entry to terminal state.
//!
//! # Control flow
//!
//! ```text
//! triage (classify + root report)
//!   -> loop {
//!        budget gate
//!        route pending work items        (empty -> terminal fast path)
//!        dispatch specialists concurrently
//!        converge findings, complete items
//!        lead review -> CONTINUE | END
//!      }
//!   -> synthesis -> snapshot
//! ```
//!
//! Rounds are strictly sequential; within a round the selected specialists
//! run concurrently against the shared cache and budget. Nothing below the
//! lead review is fatal: failures degrade into partial, explicitly flagged
//! results. `Failed` status is reserved for internal corruption.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::application::lead::{fallback_report, Decision, EndReason, LeadReviewer};
use crate::application::router::{items_for, route};
use crate::application::specialists::infrastructure::infrastructure_specialist;
use crate::application::specialists::malware::malware_specialist;
use crate::application::specialists::{RoundContext, Specialist};
use crate::domain::budget::{BudgetLimits, BudgetTracker};
use crate::domain::config::HuntTuning;
use crate::domain::entity::{EntityType, Verdict};
use crate::domain::events::InvestigationEvent;
use crate::domain::graph::GraphCache;
use crate::domain::intel::IntelSource;
use crate::domain::investigation::{
    Finding, InvestigationId, InvestigationSnapshot, InvestigationStatus,
};
use crate::domain::llm::ReasoningEngine;
use crate::domain::work_item::{SpecialistKind, WorkItem};
use crate::infrastructure::event_bus::EventBus;

/// Application service owning the investigation loop. One instance serves
/// many investigations; each run is an independent unit of work.
pub struct InvestigationService {
    engine: Arc<dyn ReasoningEngine>,
    intel: Arc<dyn IntelSource>,
    specialists: Vec<Arc<dyn Specialist>>,
    event_bus: EventBus,
    limits: BudgetLimits,
    tuning: HuntTuning,
}

impl InvestigationService {
    pub fn new(
        engine: Arc<dyn ReasoningEngine>,
        intel: Arc<dyn IntelSource>,
        event_bus: EventBus,
        limits: BudgetLimits,
        tuning: HuntTuning,
    ) -> Self {
        let specialists: Vec<Arc<dyn Specialist>> = vec![
            Arc::new(malware_specialist(engine.clone(), intel.clone())),
            Arc::new(infrastructure_specialist(engine.clone(), intel.clone())),
        ];
        Self {
            engine,
            intel,
            specialists,
            event_bus,
            limits,
            tuning,
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Run one investigation to completion, classifying the indicator by
    /// pattern. Synchronous from the caller's point of view regardless of
    /// internal concurrency.
    pub async fn run_investigation(&self, ioc: &str) -> Result<InvestigationSnapshot> {
        let root_type = EntityType::classify(ioc.trim());
        self.run_investigation_as(ioc, root_type).await
    }

    /// Run one investigation with an explicitly typed root indicator.
    pub async fn run_investigation_as(
        &self,
        ioc: &str,
        root_type: EntityType,
    ) -> Result<InvestigationSnapshot> {
        let id = InvestigationId::new();
        let started_at = Utc::now();
        let root = ioc.trim().to_string();

        info!(investigation_id = %id, ioc = %root, entity_type = %root_type, "investigation started");
        self.event_bus.publish(InvestigationEvent::InvestigationStarted {
            investigation_id: id,
            root: root.clone(),
            entity_type: root_type,
            started_at,
        });

        let budget = Arc::new(BudgetTracker::new(self.limits.clone()));
        let cache = Arc::new(Mutex::new(GraphCache::new()));
        let mut work_items: Vec<WorkItem> = Vec::new();
        let mut findings: BTreeMap<String, Vec<Finding>> = BTreeMap::new();

        // Triage: classify, fetch the root report, seed graph and queue.
        let triage_summary = match self.intel.report(root_type, &root).await {
            Ok(report) => {
                budget.record_call();
                {
                    let mut graph = cache.lock();
                    if graph.upsert_node(&root, root_type, report.attributes.clone()).created {
                        budget.record_node();
                    }
                    if let Err(e) = graph.apply_assessment(&root, report.verdict, report.score) {
                        warn!(error = %e, "could not record triage assessment");
                    }
                }

                if report.verdict.is_actionable() {
                    let kind = SpecialistKind::for_entity(root_type);
                    work_items.push(WorkItem::new(
                        kind,
                        Some(root.clone()),
                        format!("Perform initial {} analysis of {}", kind, root),
                        Some("Root indicator flagged by triage".to_string()),
                    ));
                }

                info!(verdict = %report.verdict, score = ?report.score, "triage verdict");
                self.event_bus.publish(InvestigationEvent::TriageCompleted {
                    investigation_id: id,
                    verdict: report.verdict,
                    score: report.score,
                    work_items: work_items.len(),
                });

                format!(
                    "Root indicator `{}` ({}) triaged as {} (score: {}).",
                    root,
                    root_type,
                    report.verdict,
                    report
                        .score
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "N/A".to_string())
                )
            }
            Err(e) => {
                // Lookup failure is not a crash: record an error root node
                // and converge immediately, completed with gaps.
                warn!(investigation_id = %id, error = %e, "triage lookup failed");
                {
                    let mut graph = cache.lock();
                    if graph.upsert_node(&root, root_type, HashMap::new()).created {
                        budget.record_node();
                    }
                    let _ = graph.apply_assessment(&root, Verdict::Error, None);
                }
                let stop_reason = format!("triage lookup failed: {}", e);
                let report = fallback_report(&root, &findings, &[root.clone()]);
                let ended_at = Utc::now();
                self.event_bus.publish(InvestigationEvent::InvestigationCompleted {
                    investigation_id: id,
                    iterations: 0,
                    completed_at: ended_at,
                });
                let graph = cache.lock();
                return Ok(InvestigationSnapshot {
                    id,
                    root,
                    root_type,
                    status: InvestigationStatus::Completed,
                    iteration: 0,
                    nodes: graph.export_nodes(),
                    edges: graph.export_edges(),
                    findings,
                    work_items,
                    budget: budget.snapshot(),
                    stop_reason: Some(stop_reason),
                    report: Some(report),
                    started_at,
                    ended_at: Some(ended_at),
                });
            }
        };

        let lead = LeadReviewer::new(self.limits.max_iterations, self.tuning.max_leads_per_round);
        let mut iteration: u32 = 0;
        let mut stop_reason: Option<String> = None;

        loop {
            // Budget gate: in-flight work has converged by now; once a
            // ceiling is hit nothing new starts.
            if let Err(reason) = budget.can_continue() {
                warn!(investigation_id = %id, %reason, "budget exhausted, converging");
                self.event_bus.publish(InvestigationEvent::BudgetStop {
                    investigation_id: id,
                    reason: reason.to_string(),
                    budget: budget.snapshot(),
                });
                stop_reason = Some(reason.to_string());
                break;
            }

            let kinds = route(&work_items);
            if kinds.is_empty() {
                // Terminal fast path: nothing to dispatch.
                break;
            }

            iteration += 1;
            let pending = work_items.iter().filter(|i| i.is_pending()).count();
            info!(investigation_id = %id, iteration, pending, specialists = kinds.len(), "round started");
            self.event_bus.publish(InvestigationEvent::RoundStarted {
                investigation_id: id,
                iteration,
                pending_items: pending,
            });

            let ctx = RoundContext {
                investigation_id: id,
                root: root.clone(),
                root_type,
                triage_summary: triage_summary.clone(),
                cache: cache.clone(),
                budget: budget.clone(),
                intel: self.intel.clone(),
                events: self.event_bus.clone(),
                tuning: self.tuning.clone(),
            };

            let selected: Vec<Arc<dyn Specialist>> = self
                .specialists
                .iter()
                .filter(|s| kinds.contains(&s.kind()))
                .cloned()
                .collect();

            let mut round_futures = Vec::with_capacity(selected.len());
            for specialist in &selected {
                let items = items_for(&work_items, specialist.kind());
                let ctx_ref = &ctx;
                round_futures.push(async move {
                    (specialist.kind(), specialist.execute(ctx_ref, &items).await)
                });
            }
            let results = join_all(round_futures).await;

            for (kind, finding) in results {
                for item in work_items
                    .iter_mut()
                    .filter(|i| i.is_pending() && i.assignee == kind)
                {
                    item.complete(Some(finding.summary.clone()));
                }
                findings
                    .entry(kind.as_str().to_string())
                    .or_default()
                    .push(finding);
            }

            let decision = {
                let graph = cache.lock();
                lead.review(iteration, &mut work_items, &graph, &root)
            };
            match decision {
                Decision::Continue => {}
                Decision::End(reason) => {
                    info!(investigation_id = %id, %reason, "lead review ended investigation");
                    if matches!(reason, EndReason::IterationCap { .. }) {
                        stop_reason = Some(reason.to_string());
                    }
                    break;
                }
            }
        }

        let unanalyzed: Vec<String> = {
            let graph = cache.lock();
            graph
                .export_nodes()
                .iter()
                .filter(|n| !n.analyzed)
                .map(|n| n.id.clone())
                .collect()
        };
        let report = lead
            .synthesize(&self.engine, &budget, &root, &findings, &unanalyzed)
            .await;

        let ended_at = Utc::now();
        self.event_bus.publish(InvestigationEvent::InvestigationCompleted {
            investigation_id: id,
            iterations: iteration,
            completed_at: ended_at,
        });

        let (nodes, edges, stats) = {
            let graph = cache.lock();
            (graph.export_nodes(), graph.export_edges(), graph.stats())
        };
        info!(
            investigation_id = %id,
            iterations = iteration,
            entities = stats.total_entities,
            relationships = stats.total_relationships,
            unanalyzed = unanalyzed.len(),
            "investigation completed"
        );

        Ok(InvestigationSnapshot {
            id,
            root,
            root_type,
            status: InvestigationStatus::Completed,
            iteration,
            nodes,
            edges,
            findings,
            work_items,
            budget: budget.snapshot(),
            stop_reason,
            report: Some(report),
            started_at,
            ended_at: Some(ended_at),
        })
    }
}
