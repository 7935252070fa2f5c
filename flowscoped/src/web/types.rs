use chrono::{DateTime, Utc};
use flowscope_types::Flow;
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_flows: u64,
    pub total_bytes: u64,
    pub total_packets: u64,
    pub flows_per_second: f64,
    pub bytes_per_second: f64,
    pub v5_flows: u64,
    pub v9_flows: u64,
    pub ipfix_flows: u64,
    pub unique_exporters: usize,
    pub current_flows: usize,
    pub max_flows: usize,
    pub generated: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowResponse {
    pub src_addr: String,
    pub dst_addr: String,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: String,
    pub bytes: u64,
    pub packets: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub service: String,
    pub received_at: DateTime<Utc>,
    pub version: String,
}

impl FlowResponse {
    pub fn from_flow(flow: &Flow) -> Self {
        let service = flowscope_resolver::service_name(flow.dst_port, flow.protocol)
            .or_else(|| flowscope_resolver::service_name(flow.src_port, flow.protocol))
            .unwrap_or_default();
        Self {
            src_addr: flow.src_addr.to_string(),
            dst_addr: flow.dst_addr.to_string(),
            src_port: flow.src_port,
            dst_port: flow.dst_port,
            protocol: flow.protocol_name(),
            bytes: flow.bytes,
            packets: flow.packets,
            service: service.to_string(),
            received_at: flow.received_at,
            version: flow.version.as_str().to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct FlowsResponse {
    pub flows: Vec<FlowResponse>,
    pub total: usize,
    pub filtered: usize,
    pub generated: DateTime<Utc>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub filter: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub details: String,
}
