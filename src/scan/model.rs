use std::fmt;

use serde::Serialize;

pub const MAX_THREAD_HINT: u32 = 1000;
pub const CRITICAL_EDGE_RISK: f32 = 9.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ScanStatus {
    Idle,
    Running,
    Complete,
    Failed,
}

impl ScanStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidScan {
    #[error("target must not be empty")]
    EmptyTarget,

    #[error("port {0} is outside 1..=65535")]
    PortOutOfRange(u32),

    #[error("start port {start} is greater than end port {end}")]
    InvertedRange { start: u16, end: u16 },

    #[error("thread hint {0} is outside 1..=1000")]
    ThreadHintOutOfRange(u32),
}

/// One run of the scanner against a single target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScanSession {
    pub target: String,
    pub start_port: u16,
    pub end_port: u16,
    pub thread_hint: u32,
    pub status: ScanStatus,
}

impl ScanSession {
    pub fn new(
        target: &str,
        start_port: u32,
        end_port: u32,
        thread_hint: u32,
    ) -> Result<Self, InvalidScan> {
        let target = target.trim();
        if target.is_empty() {
            return Err(InvalidScan::EmptyTarget);
        }

        let start = checked_port(start_port)?;
        let end = checked_port(end_port)?;
        if start > end {
            return Err(InvalidScan::InvertedRange { start, end });
        }
        if thread_hint == 0 || thread_hint > MAX_THREAD_HINT {
            return Err(InvalidScan::ThreadHintOutOfRange(thread_hint));
        }

        Ok(Self {
            target: target.to_owned(),
            start_port: start,
            end_port: end,
            thread_hint,
            status: ScanStatus::Idle,
        })
    }

    pub fn port_count(&self) -> usize {
        usize::from(self.end_port) - usize::from(self.start_port) + 1
    }
}

fn checked_port(value: u32) -> Result<u16, InvalidScan> {
    match u16::try_from(value) {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(InvalidScan::PortOutOfRange(value)),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PortState {
    Open,
    Closed,
    Filtered,
}

impl PortState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Filtered => "filtered",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PortRecord {
    pub port: u16,
    pub service: String,
    pub state: PortState,
    pub vulnerabilities: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }

    pub fn default_size(self) -> f32 {
        match self {
            Self::Low => 8.0,
            Self::Medium => 10.0,
            Self::High => 12.0,
            Self::Critical => 15.0,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A discovered service. Positions are owned by the layout engine.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub risk: RiskLevel,
    pub size: f32,
    pub port: Option<u16>,
    pub service: String,
    pub vulnerabilities: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum EdgeKind {
    LateralMovement,
    HorizontalMovement,
    Other(String),
}

impl EdgeKind {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "lateral_movement" | "" => Self::LateralMovement,
            "horizontal_movement" => Self::HorizontalMovement,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::LateralMovement => "lateral movement",
            Self::HorizontalMovement => "horizontal movement",
            Self::Other(kind) => kind.as_str(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GraphEdge {
    pub id: String,
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
    pub critical: bool,
    pub risk_score: f32,
    pub label: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ExposureSummary {
    pub score: f32,
    pub severity: RiskLevel,
}

impl ExposureSummary {
    pub fn from_score(score: f32) -> Self {
        let severity = if score >= 80.0 {
            RiskLevel::Critical
        } else if score >= 60.0 {
            RiskLevel::High
        } else if score >= 40.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };
        Self { score, severity }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AttackChain {
    pub kind: EdgeKind,
    pub from: String,
    pub to: String,
    pub risk_score: f32,
    pub description: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AttackChains {
    pub total: usize,
    pub chains: Vec<AttackChain>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServiceAssessment {
    pub port: u16,
    pub service: String,
    pub risk: RiskLevel,
    pub vulnerabilities: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisReport {
    pub target: Option<String>,
    pub total_ports_scanned: Option<u32>,
    pub services: Vec<ServiceAssessment>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GraphStatistics {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub critical_services: usize,
    pub high_risk_services: usize,
    pub medium_services: usize,
    pub low_services: usize,
    pub lateral_movement_paths: usize,
    pub horizontal_movement_paths: usize,
    pub total_vulnerabilities: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PortSummary {
    pub open: usize,
    pub closed: usize,
    pub filtered: usize,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_rejects_bad_ranges() {
        assert_eq!(
            ScanSession::new("  ", 1, 10, 10),
            Err(InvalidScan::EmptyTarget)
        );
        assert_eq!(
            ScanSession::new("10.0.0.5", 0, 10, 10),
            Err(InvalidScan::PortOutOfRange(0))
        );
        assert_eq!(
            ScanSession::new("10.0.0.5", 1, 70_000, 10),
            Err(InvalidScan::PortOutOfRange(70_000))
        );
        assert_eq!(
            ScanSession::new("10.0.0.5", 90, 10, 10),
            Err(InvalidScan::InvertedRange { start: 90, end: 10 })
        );
        assert_eq!(
            ScanSession::new("10.0.0.5", 1, 10, 0),
            Err(InvalidScan::ThreadHintOutOfRange(0))
        );
    }

    #[test]
    fn session_trims_target_and_counts_ports() {
        let session = ScanSession::new(" 10.0.0.5 ", 1, 100, 50).unwrap();
        assert_eq!(session.target, "10.0.0.5");
        assert_eq!(session.port_count(), 100);
        assert_eq!(session.status, ScanStatus::Idle);
    }

    #[test]
    fn risk_labels_are_case_insensitive() {
        assert_eq!(RiskLevel::parse("CRITICAL"), Some(RiskLevel::Critical));
        assert_eq!(RiskLevel::parse(" high "), Some(RiskLevel::High));
        assert_eq!(RiskLevel::parse("UNKNOWN"), None);
    }

    #[test]
    fn exposure_severity_thresholds() {
        assert_eq!(ExposureSummary::from_score(85.0).severity, RiskLevel::Critical);
        assert_eq!(ExposureSummary::from_score(60.0).severity, RiskLevel::High);
        assert_eq!(ExposureSummary::from_score(40.0).severity, RiskLevel::Medium);
        assert_eq!(ExposureSummary::from_score(10.0).severity, RiskLevel::Low);
    }
}
