mod api;
mod model;
mod sse;
mod store;
mod wire;

pub use api::{
    ApiError, DEFAULT_BACKEND_URL, EventStream, START_SCAN_TIMEOUT, STREAM_READ_TICK, ScanApi,
};
pub use model::{
    AnalysisReport, AttackChain, AttackChains, CRITICAL_EDGE_RISK, EdgeKind, ExposureSummary,
    GraphEdge, GraphNode, GraphStatistics, InvalidScan, MAX_THREAD_HINT, PortRecord, PortState,
    PortSummary, RiskLevel, ScanSession, ScanStatus, ServiceAssessment,
};
pub use sse::{SseError, SseFrame, SseReader};
pub use store::{AttackGraph, ScanStore};
pub use wire::{
    CompletePayload, GraphMessage, MalformedMessage, PortDetail, PortMessage, PortSet,
    StartAck, StartScanRequest, StatusResponse, StreamMessage, parse_stream_message,
};
