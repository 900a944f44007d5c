use std::collections::HashSet;
use std::sync::Arc;

use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

use crate::scan::{AttackGraph, GraphNode};
use crate::util::first_line;

use super::{GraphView, SearchMatchCache};

fn fuzzy_match_score(matcher: &SkimMatcherV2, text: &str, query: &str) -> Option<i64> {
    matcher
        .fuzzy_match(text, query)
        .or_else(|| matcher.fuzzy_match(&text.to_ascii_lowercase(), &query.to_ascii_lowercase()))
}

/// Indices of nodes whose service, label or port fuzzy-match `query`.
pub(super) fn matching_nodes(nodes: &[GraphNode], query: &str) -> HashSet<usize> {
    let matcher = SkimMatcherV2::default();
    nodes
        .iter()
        .enumerate()
        .filter_map(|(index, node)| {
            let port = node.port.map(|port| port.to_string());
            let hit = fuzzy_match_score(&matcher, &node.service, query).is_some()
                || fuzzy_match_score(&matcher, first_line(&node.label), query).is_some()
                || port.is_some_and(|port| port == query);
            hit.then_some(index)
        })
        .collect()
}

impl GraphView {
    /// Feeds a new snapshot to the layout when the store's revision moved.
    pub(in crate::app) fn sync(&mut self, graph: &AttackGraph, revision: u64) {
        if self.synced_revision == Some(revision) {
            return;
        }

        self.layout.load(graph);
        self.sizes = graph.nodes.iter().map(|node| node.size).collect();
        self.synced_revision = Some(revision);
        self.hovered = None;
        self.dragging = None;
        self.search_cache = None;

        if let Some(selected) = &self.selected
            && graph.node(selected).is_none()
        {
            tracing::debug!(id = %selected, "selected node left the graph");
            self.selected = None;
        }
    }

    pub(super) fn cached_search_matches(&mut self, graph: &AttackGraph) -> Option<Arc<HashSet<usize>>> {
        let query = self.search.trim();
        if query.is_empty() {
            return None;
        }

        let revision = self.synced_revision?;
        if let Some(cached) = &self.search_cache
            && cached.revision == revision
            && cached.query == query
        {
            return Some(Arc::clone(&cached.matches));
        }

        let matches = Arc::new(matching_nodes(&graph.nodes, query));
        self.search_cache = Some(SearchMatchCache {
            query: query.to_owned(),
            revision,
            matches: Arc::clone(&matches),
        });
        Some(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::{EdgeKind, GraphEdge, RiskLevel};

    fn node(id: &str, service: &str, port: Option<u16>) -> GraphNode {
        GraphNode {
            id: id.to_owned(),
            label: match port {
                Some(port) => format!("{service}\n({port})"),
                None => id.to_owned(),
            },
            risk: RiskLevel::High,
            size: 12.0,
            port,
            service: service.to_owned(),
            vulnerabilities: Vec::new(),
        }
    }

    fn sample() -> AttackGraph {
        AttackGraph::from_parts(
            vec![
                node("target", "", None),
                node("port_22", "ssh", Some(22)),
                node("port_3306", "MySQL", Some(3306)),
            ],
            vec![GraphEdge {
                id: "edge_0".into(),
                from: "port_22".into(),
                to: "port_3306".into(),
                kind: EdgeKind::LateralMovement,
                critical: true,
                risk_score: 9.5,
                label: "Remote Access to Database".into(),
            }],
        )
    }

    #[test]
    fn search_matches_service_case_insensitively() {
        let graph = sample();
        let matches = matching_nodes(&graph.nodes, "mysql");
        assert_eq!(matches, HashSet::from([2]));

        let by_port = matching_nodes(&graph.nodes, "22");
        assert!(by_port.contains(&1));
    }

    #[test]
    fn sync_only_reloads_on_new_revision() {
        let graph = sample();
        let mut view = GraphView::default();

        view.sync(&graph, 1);
        assert_eq!(view.layout.len(), 3);
        assert_eq!(view.sizes, vec![12.0; 3]);

        view.layout.cancel();
        view.sync(&graph, 1);
        assert!(!view.layout.is_running());

        view.sync(&graph, 2);
        assert!(view.layout.is_running());
    }

    #[test]
    fn selection_dropped_when_node_disappears() {
        let mut view = GraphView::default();
        view.sync(&sample(), 1);
        view.selected = Some("port_3306".into());

        let smaller = AttackGraph::from_parts(vec![node("target", "", None)], Vec::new());
        view.sync(&smaller, 2);

        assert_eq!(view.selected(), None);
    }

    #[test]
    fn search_results_are_cached_per_query() {
        let graph = sample();
        let mut view = GraphView::default();
        view.sync(&graph, 1);
        view.search = "ssh".into();

        let first = view.cached_search_matches(&graph).unwrap();
        let second = view.cached_search_matches(&graph).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        view.search = "  ".into();
        assert!(view.cached_search_matches(&graph).is_none());
    }
}
