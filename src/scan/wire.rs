//! JSON shapes exchanged with the scan backend.
//!
//! Decoding is lenient where the backend is loose (ports as strings or
//! integers, port sets as maps or lists) and strict where a message would be
//! meaningless without a field.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::model::{
    AnalysisReport, AttackChain, AttackChains, CRITICAL_EDGE_RISK, EdgeKind, ExposureSummary,
    GraphEdge, GraphNode, RiskLevel, ScanSession, ServiceAssessment,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StartScanRequest {
    pub target: String,
    pub start: u16,
    pub end: u16,
    pub threads: u32,
}

impl From<&ScanSession> for StartScanRequest {
    fn from(session: &ScanSession) -> Self {
        Self {
            target: session.target.clone(),
            start: session.start_port,
            end: session.end_port,
            threads: session.thread_hint,
        }
    }
}

/// Body of a `POST /api/start-scan` response. Only the error envelope is
/// interpreted; anything else counts as an acknowledgement.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StartAck {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StartAck {
    pub fn backend_error(&self) -> Option<String> {
        if let Some(error) = &self.error {
            return Some(error.clone());
        }
        if self.status.as_deref() == Some("error") {
            return Some(
                self.message
                    .clone()
                    .unwrap_or_else(|| "backend reported an unspecified error".to_owned()),
            );
        }
        None
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub running: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    Port(PortMessage),
    Analysis { analysis: AnalysisPayload },
    Graph(GraphMessage),
    Complete(CompletePayload),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, thiserror::Error)]
#[error("malformed stream payload: {source}")]
pub struct MalformedMessage {
    #[from]
    source: serde_json::Error,
}

pub fn parse_stream_message(payload: &str) -> Result<StreamMessage, MalformedMessage> {
    Ok(serde_json::from_str(payload)?)
}

#[derive(Clone, Debug, Deserialize)]
pub struct PortMessage {
    #[serde(deserialize_with = "de_port")]
    pub port: u16,
    #[serde(default = "unknown_service")]
    pub service: String,
    #[serde(default, deserialize_with = "de_string_list")]
    pub vulnerabilities: Vec<String>,
}

fn unknown_service() -> String {
    "Unknown Service".to_owned()
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AnalysisPayload {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub total_ports_scanned: Option<u32>,
    #[serde(default)]
    pub analysis: Vec<AssessmentPayload>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AssessmentPayload {
    #[serde(deserialize_with = "de_port")]
    pub port: u16,
    #[serde(default = "unknown_service")]
    pub service: String,
    #[serde(default)]
    pub risk_level: String,
    #[serde(default, deserialize_with = "de_string_list")]
    pub vulnerabilities: Vec<String>,
}

impl AnalysisPayload {
    pub fn into_report(self) -> AnalysisReport {
        AnalysisReport {
            target: self.target,
            total_ports_scanned: self.total_ports_scanned,
            services: self
                .analysis
                .into_iter()
                .map(|entry| ServiceAssessment {
                    port: entry.port,
                    service: entry.service,
                    risk: RiskLevel::parse(&entry.risk_level).unwrap_or_default(),
                    vulnerabilities: entry.vulnerabilities,
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct GraphMessage {
    pub graph: GraphPayload,
    #[serde(default)]
    pub exposure_score: Option<ExposurePayload>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub attack_chains: Option<AttackChainsPayload>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct GraphPayload {
    #[serde(default)]
    pub nodes: Vec<NodePayload>,
    #[serde(default)]
    pub edges: Vec<EdgePayload>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NodePayload {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, alias = "risk_level")]
    pub risk: Option<String>,
    #[serde(default)]
    pub size: Option<f32>,
    #[serde(default, deserialize_with = "de_optional_port")]
    pub port: Option<u16>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default, deserialize_with = "de_string_list")]
    pub vulnerabilities: Vec<String>,
}

impl NodePayload {
    pub fn into_node(self) -> GraphNode {
        let risk = self
            .risk
            .as_deref()
            .and_then(RiskLevel::parse)
            .unwrap_or_default();
        let size = self
            .size
            .filter(|size| size.is_finite() && *size > 0.0)
            .unwrap_or_else(|| risk.default_size());
        let service = self.service.unwrap_or_default();
        let label = self.label.unwrap_or_else(|| match self.port {
            Some(port) => format!("{service}\n({port})"),
            None => self.id.clone(),
        });

        GraphNode {
            id: self.id,
            label,
            risk,
            size,
            port: self.port,
            service,
            vulnerabilities: self.vulnerabilities,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct EdgePayload {
    #[serde(default)]
    pub id: Option<String>,
    pub from: String,
    pub to: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub risk_score: f32,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub critical: Option<bool>,
}

impl EdgePayload {
    pub fn into_edge(self, index: usize) -> GraphEdge {
        GraphEdge {
            id: self.id.unwrap_or_else(|| format!("edge_{index}")),
            critical: self
                .critical
                .unwrap_or(self.risk_score >= CRITICAL_EDGE_RISK),
            kind: EdgeKind::parse(&self.kind),
            from: self.from,
            to: self.to,
            risk_score: self.risk_score,
            label: self.label,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ExposurePayload {
    Score(f32),
    Detailed {
        exposure_score: f32,
        #[serde(default)]
        severity: Option<String>,
    },
}

impl GraphMessage {
    pub fn exposure(&self) -> Option<ExposureSummary> {
        let (score, severity) = match self.exposure_score.as_ref()? {
            ExposurePayload::Score(score) => (*score, self.severity.as_deref()),
            ExposurePayload::Detailed {
                exposure_score,
                severity,
            } => (
                *exposure_score,
                severity.as_deref().or(self.severity.as_deref()),
            ),
        };

        let mut summary = ExposureSummary::from_score(score);
        if let Some(level) = severity.and_then(RiskLevel::parse) {
            summary.severity = level;
        }
        Some(summary)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AttackChainsPayload {
    #[serde(default)]
    pub total_chains: Option<usize>,
    #[serde(default)]
    pub chains: Vec<ChainPayload>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChainPayload {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub risk_score: f32,
    #[serde(default)]
    pub description: String,
}

impl AttackChainsPayload {
    pub fn into_chains(self) -> AttackChains {
        let total = self.total_chains.unwrap_or(self.chains.len());
        AttackChains {
            total,
            chains: self
                .chains
                .into_iter()
                .map(|chain| AttackChain {
                    kind: EdgeKind::parse(&chain.kind),
                    from: chain.from,
                    to: chain.to,
                    risk_score: chain.risk_score,
                    description: chain.description,
                })
                .collect(),
        }
    }
}

/// Terminal result sets, from a `complete` event or the saved-results read path.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct CompletePayload {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub open_ports: PortSet,
    #[serde(default)]
    pub closed_ports: PortSet,
    #[serde(default)]
    pub filtered_ports: PortSet,
    #[serde(default)]
    pub all_ports: Option<PortSet>,
    #[serde(default)]
    pub scan_summary: Option<ScanSummaryPayload>,
}

impl CompletePayload {
    /// True when no result set names a single port, as with an empty `{}` body.
    pub fn has_no_ports(&self) -> bool {
        self.open_ports.is_empty()
            && self.closed_ports.is_empty()
            && self.filtered_ports.is_empty()
            && self.all_ports.as_ref().is_none_or(PortSet::is_empty)
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct ScanSummaryPayload {
    #[serde(default)]
    pub total_ports_scanned: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PortDetail {
    pub service: Option<String>,
    pub vulnerabilities: Option<Vec<String>>,
}

/// Ports keyed by number. Entries outside 1..=65535 are skipped.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(from = "RawPortSet")]
pub struct PortSet(pub BTreeMap<u16, PortDetail>);

impl PortSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, port: u16) -> bool {
        self.0.contains_key(&port)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &PortDetail)> {
        self.0.iter().map(|(port, detail)| (*port, detail))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPortSet {
    List(Vec<RawPortKey>),
    Map(BTreeMap<String, RawPortDetail>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPortKey {
    Number(u64),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPortDetail {
    Service(String),
    Detailed {
        #[serde(default)]
        service: Option<String>,
        #[serde(default, deserialize_with = "de_optional_string_list")]
        vulnerabilities: Option<Vec<String>>,
    },
    Other(Value),
}

impl From<RawPortSet> for PortSet {
    fn from(raw: RawPortSet) -> Self {
        let mut ports = BTreeMap::new();
        match raw {
            RawPortSet::List(keys) => {
                for key in keys {
                    let parsed = match key {
                        RawPortKey::Number(value) => port_from_u64(value),
                        RawPortKey::Text(text) => port_from_str(&text),
                    };
                    if let Some(port) = parsed {
                        ports.insert(port, PortDetail::default());
                    }
                }
            }
            RawPortSet::Map(entries) => {
                for (key, detail) in entries {
                    let Some(port) = port_from_str(&key) else {
                        tracing::debug!(key = %key, "skipping non-numeric port key");
                        continue;
                    };
                    let detail = match detail {
                        RawPortDetail::Service(service) => PortDetail {
                            service: Some(service),
                            vulnerabilities: None,
                        },
                        RawPortDetail::Detailed {
                            service,
                            vulnerabilities,
                        } => PortDetail {
                            service,
                            vulnerabilities,
                        },
                        RawPortDetail::Other(_) => PortDetail::default(),
                    };
                    ports.insert(port, detail);
                }
            }
        }
        PortSet(ports)
    }
}

fn port_from_u64(value: u64) -> Option<u16> {
    u16::try_from(value).ok().filter(|port| *port != 0)
}

fn port_from_str(text: &str) -> Option<u16> {
    text.trim().parse::<u64>().ok().and_then(port_from_u64)
}

fn de_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = RawPortKey::deserialize(deserializer)?;
    let port = match &raw {
        RawPortKey::Number(value) => port_from_u64(*value),
        RawPortKey::Text(text) => port_from_str(text),
    };
    port.ok_or_else(|| serde::de::Error::custom("port must be within 1..=65535"))
}

fn de_optional_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawPortKey>::deserialize(deserializer)?;
    Ok(raw.and_then(|raw| match raw {
        RawPortKey::Number(value) => port_from_u64(value),
        RawPortKey::Text(text) => port_from_str(&text),
    }))
}

fn de_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(de_optional_string_list(deserializer)?.unwrap_or_default())
}

fn de_optional_string_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?;
    Ok(raw.map(|values| {
        values
            .into_iter()
            .map(|value| match value {
                Value::String(text) => text,
                other => other.to_string(),
            })
            .collect()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_port_message_with_string_port() {
        let message =
            parse_stream_message(r#"{"type":"port","port":"22","service":"ssh"}"#).unwrap();
        match message {
            StreamMessage::Port(port) => {
                assert_eq!(port.port, 22);
                assert_eq!(port.service, "ssh");
                assert!(port.vulnerabilities.is_empty());
            }
            other => panic!("expected port message, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let message = parse_stream_message(r#"{"type":"heartbeat","at":12}"#).unwrap();
        assert!(matches!(message, StreamMessage::Unknown));
    }

    #[test]
    fn port_message_without_port_is_malformed() {
        assert!(parse_stream_message(r#"{"type":"port","service":"ssh"}"#).is_err());
        assert!(parse_stream_message(r#"{"type":"port","port":0}"#).is_err());
        assert!(parse_stream_message("not json").is_err());
    }

    #[test]
    fn complete_accepts_maps_and_lists() {
        let raw = r#"{
            "type": "complete",
            "target": "10.0.0.5",
            "open_ports": {"22": {"service": "ssh", "vulnerabilities": ["weak kex"]}, "80": "http"},
            "closed_ports": [1, "2", 3],
            "filtered_ports": {},
            "all_ports": [1, 2, 3, 22, 80],
            "scan_summary": {"total_ports_scanned": 5}
        }"#;
        let StreamMessage::Complete(payload) = parse_stream_message(raw).unwrap() else {
            panic!("expected complete message");
        };

        assert_eq!(payload.target.as_deref(), Some("10.0.0.5"));
        assert_eq!(payload.open_ports.len(), 2);
        assert_eq!(
            payload.open_ports.0.get(&22),
            Some(&PortDetail {
                service: Some("ssh".into()),
                vulnerabilities: Some(vec!["weak kex".into()]),
            })
        );
        assert_eq!(
            payload.open_ports.0.get(&80).and_then(|d| d.service.as_deref()),
            Some("http")
        );
        assert_eq!(payload.closed_ports.len(), 3);
        assert!(payload.filtered_ports.is_empty());
        assert_eq!(payload.all_ports.as_ref().map(PortSet::len), Some(5));
    }

    #[test]
    fn empty_body_has_no_ports() {
        let empty: CompletePayload = serde_json::from_str("{}").unwrap();
        assert!(empty.has_no_ports());

        let listed: CompletePayload =
            serde_json::from_str(r#"{"target":"10.0.0.5","all_ports":[],"closed_ports":[7]}"#).unwrap();
        assert!(!listed.has_no_ports());
    }

    #[test]
    fn graph_message_derives_defaults() {
        let raw = r#"{
            "type": "graph",
            "graph": {
                "nodes": [
                    {"id": "port_22", "port": "22", "service": "SSH", "risk": "High"},
                    {"id": "port_80", "port": 80, "service": "HTTP", "risk": "bogus", "label": "web"}
                ],
                "edges": [
                    {"from": "port_80", "to": "port_22", "type": "lateral_movement", "risk_score": 9.5},
                    {"id": "e9", "from": "port_22", "to": "port_80", "type": "horizontal_movement", "risk_score": 7.0}
                ]
            },
            "exposure_score": {"exposure_score": 45, "severity": "HIGH"},
            "attack_chains": {"total_chains": 12, "chains": [{"type": "lateral_movement", "from": "Port 80 (HTTP)", "to": "Port 22 (SSH)", "risk_score": 9.5}]}
        }"#;
        let StreamMessage::Graph(graph) = parse_stream_message(raw).unwrap() else {
            panic!("expected graph message");
        };

        let exposure = graph.exposure().unwrap();
        assert_eq!(exposure.score, 45.0);
        assert_eq!(exposure.severity, RiskLevel::High);

        let nodes: Vec<_> = graph
            .graph
            .nodes
            .iter()
            .cloned()
            .map(NodePayload::into_node)
            .collect();
        assert_eq!(nodes[0].label, "SSH\n(22)");
        assert_eq!(nodes[0].size, 12.0);
        assert_eq!(nodes[1].risk, RiskLevel::Medium);
        assert_eq!(nodes[1].label, "web");

        let edges: Vec<_> = graph
            .graph
            .edges
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, edge)| edge.into_edge(index))
            .collect();
        assert_eq!(edges[0].id, "edge_0");
        assert!(edges[0].critical);
        assert_eq!(edges[1].kind, EdgeKind::HorizontalMovement);
        assert!(!edges[1].critical);

        let chains = graph.attack_chains.unwrap().into_chains();
        assert_eq!(chains.total, 12);
        assert_eq!(chains.chains.len(), 1);
    }

    #[test]
    fn bare_exposure_score_derives_severity() {
        let raw = r#"{"type":"graph","graph":{"nodes":[],"edges":[]},"exposure_score":85}"#;
        let StreamMessage::Graph(graph) = parse_stream_message(raw).unwrap() else {
            panic!("expected graph message");
        };
        assert_eq!(graph.exposure().unwrap().severity, RiskLevel::Critical);
    }

    #[test]
    fn start_ack_reports_backend_errors() {
        let ack: StartAck =
            serde_json::from_str(r#"{"status":"error","message":"Missing 'target'"}"#).unwrap();
        assert_eq!(ack.backend_error().as_deref(), Some("Missing 'target'"));

        let ack: StartAck = serde_json::from_str(r#"{"target":"10.0.0.5","open_ports":{}}"#).unwrap();
        assert_eq!(ack.backend_error(), None);
    }
}
