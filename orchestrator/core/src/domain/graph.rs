// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory entity/relationship cache for one investigation.
//!
//! The cache stores full entity context so specialists never re-fetch what a
//! previous round already discovered. Nodes are keyed by their natural id
//! and deduplicated on insert; edges form a labeled multigraph with an
//! explicit reachability check that refuses any insertion closing a directed
//! cycle. The graph only grows for the lifetime of the investigation.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::domain::entity::{EntityNode, EntityType, Relationship, Verdict};

/// Errors from non-creating cache operations. Callers treat these as
/// non-fatal: log and continue.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("unknown entity: {0}")]
    NotFound(String),
}

/// Result of an upsert: whether a new node was created (the caller charges
/// the node budget exactly when it was).
#[derive(Debug, Clone, Copy)]
pub struct Upsert {
    pub created: bool,
}

/// Aggregate counts for logging and the state snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    pub total_entities: usize,
    pub total_relationships: usize,
    pub entity_types: BTreeMap<&'static str, usize>,
}

#[derive(Debug, Default)]
pub struct GraphCache {
    nodes: HashMap<String, EntityNode>,
    // Arrival order, for stable frontier tie-breaking.
    order: Vec<String>,
    edges: Vec<Relationship>,
    out_edges: HashMap<String, Vec<String>>,
}

impl GraphCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or merge an entity.
    ///
    /// A repeated id is a no-op on identity fields; only attribute keys not
    /// already present are merged in. Never yields two distinct nodes for
    /// one id.
    pub fn upsert_node(
        &mut self,
        id: &str,
        entity_type: EntityType,
        attributes: HashMap<String, Value>,
    ) -> Upsert {
        if let Some(existing) = self.nodes.get_mut(id) {
            existing.merge_attributes(attributes);
            return Upsert { created: false };
        }

        let mut node = EntityNode::new(id, entity_type);
        node.attributes = attributes;
        self.nodes.insert(id.to_string(), node);
        self.order.push(id.to_string());
        Upsert { created: true }
    }

    /// Record a verdict and score on an existing entity.
    pub fn apply_assessment(
        &mut self,
        id: &str,
        verdict: Verdict,
        score: Option<u8>,
    ) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::NotFound(id.to_string()))?;
        node.verdict = verdict;
        if score.is_some() {
            node.score = score;
        }
        Ok(())
    }

    /// Add a directed labeled edge.
    ///
    /// Returns `false` without inserting when the edge would close a cycle
    /// (the target already reaches the source), when either endpoint is
    /// unknown, or on a self-loop. An identical existing edge is an
    /// idempotent no-op. Multiple kinds between the same pair are allowed.
    pub fn add_edge(
        &mut self,
        source: &str,
        target: &str,
        kind: &str,
        description: Option<String>,
    ) -> bool {
        if source == target {
            return false;
        }
        if !self.nodes.contains_key(source) || !self.nodes.contains_key(target) {
            return false;
        }
        if self
            .edges
            .iter()
            .any(|e| e.source == source && e.target == target && e.kind == kind)
        {
            return true;
        }
        if self.reachable(target, source) {
            return false;
        }

        self.edges.push(Relationship {
            source: source.to_string(),
            target: target.to_string(),
            kind: kind.to_string(),
            description,
        });
        self.out_edges
            .entry(source.to_string())
            .or_default()
            .push(target.to_string());
        true
    }

    /// Breadth-first reachability over directed edges.
    fn reachable(&self, from: &str, to: &str) -> bool {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(from);
        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(next) = self.out_edges.get(current) {
                queue.extend(next.iter().map(String::as_str));
            }
        }
        false
    }

    /// The uninvestigated frontier: every node not yet analyzed, most severe
    /// verdict first, arrival order breaking ties.
    pub fn get_uninvestigated(&self) -> Vec<&EntityNode> {
        let mut frontier: Vec<&EntityNode> = self
            .order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(|node| !node.analyzed)
            .collect();
        // Stable sort keeps arrival order within a severity class.
        frontier.sort_by(|a, b| b.verdict.severity().cmp(&a.verdict.severity()));
        frontier
    }

    /// Flip the analyzed flag and attach the analysis payload. Idempotent.
    pub fn mark_analyzed(&mut self, id: &str, detail: Option<Value>) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::NotFound(id.to_string()))?;
        node.analyzed = true;
        if let Some(detail) = detail {
            node.attributes.insert("analysis".to_string(), detail);
        }
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&EntityNode> {
        self.nodes.get(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Nodes in arrival order, cloned for snapshot export.
    pub fn export_nodes(&self) -> Vec<EntityNode> {
        self.order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .cloned()
            .collect()
    }

    pub fn export_edges(&self) -> Vec<Relationship> {
        self.edges.clone()
    }

    /// Inbound edges of a node, newest last. Used by the planner to explain
    /// why a frontier entity matters.
    pub fn edges_into(&self, id: &str) -> Vec<&Relationship> {
        self.edges.iter().filter(|e| e.target == id).collect()
    }

    pub fn stats(&self) -> GraphStats {
        let mut entity_types: BTreeMap<&'static str, usize> = BTreeMap::new();
        for node in self.nodes.values() {
            *entity_types.entry(node.entity_type.as_str()).or_default() += 1;
        }
        GraphStats {
            total_entities: self.nodes.len(),
            total_relationships: self.edges.len(),
            entity_types,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with(ids: &[(&str, EntityType)]) -> GraphCache {
        let mut cache = GraphCache::new();
        for (id, entity_type) in ids {
            cache.upsert_node(id, *entity_type, HashMap::new());
        }
        cache
    }

    #[test]
    fn test_upsert_deduplicates() {
        let mut cache = GraphCache::new();
        assert!(cache.upsert_node("evil.exe", EntityType::File, HashMap::new()).created);
        assert!(!cache.upsert_node("evil.exe", EntityType::File, HashMap::new()).created);
        assert_eq!(cache.node_count(), 1);
    }

    #[test]
    fn test_upsert_merges_new_attributes_only() {
        let mut cache = GraphCache::new();
        let mut first = HashMap::new();
        first.insert("size".to_string(), Value::from(1024));
        cache.upsert_node("evil.exe", EntityType::File, first);

        let mut second = HashMap::new();
        second.insert("size".to_string(), Value::from(9999));
        second.insert("magic".to_string(), Value::from("PE32"));
        cache.upsert_node("evil.exe", EntityType::File, second);

        let node = cache.node("evil.exe").unwrap();
        assert_eq!(node.attributes["size"], Value::from(1024));
        assert_eq!(node.attributes["magic"], Value::from("PE32"));
    }

    #[test]
    fn test_add_edge_rejects_cycle() {
        let mut cache = cache_with(&[
            ("a", EntityType::File),
            ("b", EntityType::IpAddress),
            ("c", EntityType::Domain),
        ]);
        assert!(cache.add_edge("a", "b", "communicates-with", None));
        assert!(cache.add_edge("b", "c", "resolves-to", None));
        // c -> a would close a cycle through a -> b -> c.
        assert!(!cache.add_edge("c", "a", "hosts", None));
        assert_eq!(cache.edge_count(), 2);
    }

    #[test]
    fn test_add_edge_rejects_self_loop_and_unknown_endpoints() {
        let mut cache = cache_with(&[("a", EntityType::File)]);
        assert!(!cache.add_edge("a", "a", "dropped", None));
        assert!(!cache.add_edge("a", "ghost", "dropped", None));
        assert_eq!(cache.edge_count(), 0);
    }

    #[test]
    fn test_multigraph_kinds_and_idempotent_duplicates() {
        let mut cache = cache_with(&[("a", EntityType::File), ("b", EntityType::IpAddress)]);
        assert!(cache.add_edge("a", "b", "communicates-with", None));
        assert!(cache.add_edge("a", "b", "communicates-with", None));
        assert_eq!(cache.edge_count(), 1);
        assert!(cache.add_edge("a", "b", "downloaded-from", None));
        assert_eq!(cache.edge_count(), 2);
    }

    #[test]
    fn test_frontier_ordering() {
        let mut cache = cache_with(&[
            ("benign.com", EntityType::Domain),
            ("first-unknown", EntityType::Domain),
            ("bad.com", EntityType::Domain),
            ("second-unknown", EntityType::Domain),
        ]);
        cache.apply_assessment("benign.com", Verdict::Benign, None).unwrap();
        cache.apply_assessment("bad.com", Verdict::Malicious, Some(90)).unwrap();

        let frontier = cache.get_uninvestigated();
        let ids: Vec<&str> = frontier.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["bad.com", "first-unknown", "second-unknown", "benign.com"]);
    }

    #[test]
    fn test_frontier_excludes_analyzed() {
        let mut cache = cache_with(&[("a", EntityType::File), ("b", EntityType::Domain)]);
        cache.mark_analyzed("a", None).unwrap();
        let frontier = cache.get_uninvestigated();
        assert_eq!(frontier.len(), 1);
        assert_eq!(frontier[0].id, "b");
    }

    #[test]
    fn test_mark_analyzed_idempotent_and_not_found() {
        let mut cache = cache_with(&[("a", EntityType::File)]);
        cache.mark_analyzed("a", Some(Value::from("round 1"))).unwrap();
        cache.mark_analyzed("a", None).unwrap();
        assert!(cache.node("a").unwrap().analyzed);

        assert!(matches!(
            cache.mark_analyzed("ghost", None),
            Err(GraphError::NotFound(_))
        ));
    }

    #[test]
    fn test_stats_counts_by_type() {
        let mut cache = cache_with(&[
            ("a", EntityType::File),
            ("b", EntityType::IpAddress),
            ("c", EntityType::IpAddress),
        ]);
        cache.add_edge("a", "b", "communicates-with", None);
        let stats = cache.stats();
        assert_eq!(stats.total_entities, 3);
        assert_eq!(stats.total_relationships, 1);
        assert_eq!(stats.entity_types["ip_address"], 2);
    }
}
