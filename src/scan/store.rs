use std::collections::{BTreeMap, HashMap, HashSet};

use super::model::{
    AnalysisReport, AttackChains, EdgeKind, ExposureSummary, GraphEdge, GraphNode,
    GraphStatistics, PortRecord, PortState, PortSummary, RiskLevel, ScanSession, ScanStatus,
};
use super::wire::CompletePayload;

/// In-memory state of the current scan session.
///
/// Every mutation is idempotent: port updates overwrite, graph snapshots and
/// completions replace wholesale, so replayed messages never duplicate data.
#[derive(Debug, Default)]
pub struct ScanStore {
    session: Option<ScanSession>,
    ports: BTreeMap<u16, PortRecord>,
    summary: PortSummary,
    analysis: Option<AnalysisReport>,
    graph: AttackGraph,
    exposure: Option<ExposureSummary>,
    attack_chains: AttackChains,
    graph_revision: u64,
    completed: bool,
    last_error: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct AttackGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub statistics: GraphStatistics,
    index_by_id: HashMap<String, usize>,
}

impl AttackGraph {
    pub fn from_parts(nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> Self {
        let mut index_by_id = HashMap::with_capacity(nodes.len());
        let mut kept_nodes = Vec::with_capacity(nodes.len());
        for node in nodes {
            if index_by_id.contains_key(&node.id) {
                tracing::debug!(id = %node.id, "dropping duplicate graph node");
                continue;
            }
            index_by_id.insert(node.id.clone(), kept_nodes.len());
            kept_nodes.push(node);
        }

        let mut edge_ids = HashSet::with_capacity(edges.len());
        let mut kept_edges = Vec::with_capacity(edges.len());
        for edge in edges {
            if !index_by_id.contains_key(&edge.from) || !index_by_id.contains_key(&edge.to) {
                tracing::debug!(
                    id = %edge.id,
                    from = %edge.from,
                    to = %edge.to,
                    "dropping edge with unknown endpoint"
                );
                continue;
            }
            if !edge_ids.insert(edge.id.clone()) {
                tracing::debug!(id = %edge.id, "dropping duplicate graph edge");
                continue;
            }
            kept_edges.push(edge);
        }

        let statistics = compute_statistics(&kept_nodes, &kept_edges);
        Self {
            nodes: kept_nodes,
            edges: kept_edges,
            statistics,
            index_by_id,
        }
    }

    pub fn node_index(&self, id: &str) -> Option<usize> {
        self.index_by_id.get(id).copied()
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.node_index(id).and_then(|index| self.nodes.get(index))
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn compute_statistics(nodes: &[GraphNode], edges: &[GraphEdge]) -> GraphStatistics {
    let mut stats = GraphStatistics {
        total_nodes: nodes.len(),
        total_edges: edges.len(),
        ..GraphStatistics::default()
    };

    for node in nodes {
        match node.risk {
            RiskLevel::Critical => stats.critical_services += 1,
            RiskLevel::High => stats.high_risk_services += 1,
            RiskLevel::Medium => stats.medium_services += 1,
            RiskLevel::Low => stats.low_services += 1,
        }
        stats.total_vulnerabilities += node.vulnerabilities.len();
    }

    for edge in edges {
        match edge.kind {
            EdgeKind::LateralMovement => stats.lateral_movement_paths += 1,
            EdgeKind::HorizontalMovement => stats.horizontal_movement_paths += 1,
            EdgeKind::Other(_) => {}
        }
    }

    stats
}

impl ScanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears every record and scopes the store to `session`.
    pub fn reset(&mut self, session: ScanSession) {
        let graph_revision = self.graph_revision.wrapping_add(1);
        *self = Self {
            session: Some(session),
            graph_revision,
            ..Self::default()
        };
    }

    pub fn session(&self) -> Option<&ScanSession> {
        self.session.as_ref()
    }

    pub fn target(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.target.as_str())
    }

    pub fn set_status(&mut self, status: ScanStatus) {
        if let Some(session) = self.session.as_mut() {
            session.status = status;
        }
    }

    pub fn status(&self) -> ScanStatus {
        self.session
            .as_ref()
            .map_or(ScanStatus::Idle, |session| session.status)
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.set_status(ScanStatus::Failed);
        self.last_error = Some(message.into());
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Inserts or overwrites the record for `port`. Returns `false` when the
    /// update was ignored because the session already completed.
    pub fn apply_port_update(
        &mut self,
        port: u16,
        service: &str,
        vulnerabilities: &[String],
    ) -> bool {
        if self.completed {
            tracing::debug!(port, "ignoring port delta after completion");
            return false;
        }

        self.ports.insert(
            port,
            PortRecord {
                port,
                service: service.to_owned(),
                state: PortState::Open,
                vulnerabilities: vulnerabilities.to_vec(),
            },
        );
        self.recount();
        true
    }

    pub fn apply_analysis(&mut self, report: AnalysisReport) {
        self.analysis = Some(report);
    }

    pub fn apply_graph_snapshot(
        &mut self,
        nodes: Vec<GraphNode>,
        edges: Vec<GraphEdge>,
        exposure: Option<ExposureSummary>,
        attack_chains: AttackChains,
    ) {
        self.graph = AttackGraph::from_parts(nodes, edges);
        self.exposure = exposure;
        self.attack_chains = attack_chains;
        self.graph_revision = self.graph_revision.wrapping_add(1);
    }

    /// Replaces the port view with the authoritative final sets.
    pub fn apply_completion(&mut self, payload: &CompletePayload) {
        let mut ports = BTreeMap::new();

        for (port, _) in payload.filtered_ports.iter() {
            ports.insert(port, bare_record(port, PortState::Filtered));
        }
        for (port, _) in payload.closed_ports.iter() {
            ports.insert(port, bare_record(port, PortState::Closed));
        }
        for (port, detail) in payload.open_ports.iter() {
            let prior = self.ports.get(&port);
            let service = detail
                .service
                .clone()
                .or_else(|| prior.map(|record| record.service.clone()))
                .unwrap_or_else(|| "Unknown Service".to_owned());
            let vulnerabilities = detail
                .vulnerabilities
                .clone()
                .or_else(|| prior.map(|record| record.vulnerabilities.clone()))
                .unwrap_or_default();
            ports.insert(
                port,
                PortRecord {
                    port,
                    service,
                    state: PortState::Open,
                    vulnerabilities,
                },
            );
        }

        self.ports = ports;
        let open = payload.open_ports.len();
        let closed = self.count_state(PortState::Closed);
        let filtered = self.count_state(PortState::Filtered);
        let total = payload
            .all_ports
            .as_ref()
            .map(|all| all.len())
            .filter(|len| *len > 0)
            .or_else(|| {
                payload
                    .scan_summary
                    .as_ref()
                    .and_then(|summary| summary.total_ports_scanned)
                    .map(|total| total as usize)
                    .filter(|total| *total > 0)
            })
            .or_else(|| self.session.as_ref().map(ScanSession::port_count))
            .unwrap_or(open + closed + filtered)
            .max(self.ports.len());

        self.summary = PortSummary {
            open,
            closed,
            filtered,
            total,
        };
        self.completed = true;
        self.set_status(ScanStatus::Complete);
    }

    fn count_state(&self, state: PortState) -> usize {
        self.ports
            .values()
            .filter(|record| record.state == state)
            .count()
    }

    fn recount(&mut self) {
        self.summary.open = self.count_state(PortState::Open);
        self.summary.total = self
            .session
            .as_ref()
            .map_or(self.ports.len(), ScanSession::port_count);
    }

    pub fn summary(&self) -> PortSummary {
        self.summary
    }

    pub fn ports(&self) -> impl Iterator<Item = &PortRecord> {
        self.ports.values()
    }

    pub fn open_ports(&self) -> impl Iterator<Item = &PortRecord> {
        self.ports
            .values()
            .filter(|record| record.state == PortState::Open)
    }

    pub fn port(&self, port: u16) -> Option<&PortRecord> {
        self.ports.get(&port)
    }

    pub fn analysis(&self) -> Option<&AnalysisReport> {
        self.analysis.as_ref()
    }

    pub fn risk_for_port(&self, port: u16) -> Option<RiskLevel> {
        self.analysis
            .as_ref()?
            .services
            .iter()
            .find(|service| service.port == port)
            .map(|service| service.risk)
    }

    pub fn graph(&self) -> &AttackGraph {
        &self.graph
    }

    pub fn graph_revision(&self) -> u64 {
        self.graph_revision
    }

    pub fn exposure(&self) -> Option<ExposureSummary> {
        self.exposure
    }

    pub fn attack_chains(&self) -> &AttackChains {
        &self.attack_chains
    }

    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&serde_json::json!({
            "session": self.session,
            "summary": self.summary,
            "ports": self.ports.values().collect::<Vec<_>>(),
            "analysis": self.analysis,
            "graph": {
                "nodes": self.graph.nodes,
                "edges": self.graph.edges,
                "statistics": self.graph.statistics,
            },
            "exposure": self.exposure,
            "attack_chains": self.attack_chains,
        }))
    }
}

fn bare_record(port: u16, state: PortState) -> PortRecord {
    PortRecord {
        port,
        service: String::new(),
        state,
        vulnerabilities: Vec::new(),
    }
}
