use super::types::{FlowResponse, FlowsResponse, StatsResponse};
use super::{ApiError, AppState};
use crate::sankey::{self, FirewallParams, InterfacesResponse, SankeyData};
use crate::store::SortField;
use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use flowscope_filter::{parse_filter, Filter};
use serde::Deserialize;
use std::sync::Arc;

pub(super) async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let stats = state.store.stats();
    Json(StatsResponse {
        total_flows: stats.total_flows,
        total_bytes: stats.total_bytes,
        total_packets: stats.total_packets,
        flows_per_second: stats.flows_per_second,
        bytes_per_second: stats.bytes_per_second,
        v5_flows: stats.v5_flows,
        v9_flows: stats.v9_flows,
        ipfix_flows: stats.ipfix_flows,
        unique_exporters: stats.unique_exporters,
        current_flows: state.store.flow_count(),
        max_flows: state.store.max_flows(),
        generated: Utc::now(),
    })
}

#[derive(Deserialize)]
pub(super) struct FlowsParams {
    #[serde(default)]
    filter: String,
    #[serde(default)]
    sort: String,
    #[serde(default)]
    asc: String,
    limit: Option<usize>,
}

pub(super) async fn flows(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FlowsParams>,
) -> Result<Json<FlowsResponse>, ApiError> {
    let filter = parse_query_filter(&params.filter)?;
    let sort_by = match params.sort.as_str() {
        "bytes" => SortField::Bytes,
        "packets" => SortField::Packets,
        "src" => SortField::SrcIp,
        "dst" => SortField::DstIp,
        "proto" => SortField::Protocol,
        _ => SortField::Time,
    };
    let ascending = params.asc == "true";
    let limit = params.limit.unwrap_or(100);

    let flows = state
        .store
        .query(filter.as_ref(), sort_by, ascending, limit);
    let total = state.store.flow_count();
    let filtered = state.store.filtered_count(filter.as_ref());

    Ok(Json(FlowsResponse {
        flows: flows.iter().map(FlowResponse::from_flow).collect(),
        total,
        filtered,
        generated: Utc::now(),
        filter: params.filter,
    }))
}

#[derive(Deserialize)]
pub(super) struct SankeyParams {
    #[serde(default)]
    mode: String,
    #[serde(default, rename = "topN")]
    top_n: Option<usize>,
    #[serde(default)]
    filter: String,
    #[serde(default, rename = "ipVersion")]
    ip_version: String,
    #[serde(default, rename = "timeRange")]
    time_range: String,
    #[serde(default, rename = "leftIF")]
    left_if: Option<u16>,
    #[serde(default, rename = "rightIF")]
    right_if: Option<u16>,
    #[serde(default, rename = "leftExporter")]
    left_exporter: String,
    #[serde(default, rename = "rightExporter")]
    right_exporter: String,
}

pub(super) async fn sankey(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SankeyParams>,
) -> Result<Json<SankeyData>, ApiError> {
    let mode = if params.mode.is_empty() {
        "ip-to-ip".to_string()
    } else {
        params.mode.clone()
    };
    let top_n = params.top_n.filter(|n| *n > 0).unwrap_or(50);

    // The address-family selector rides along as a filter condition.
    let combined = match params.ip_version.as_str() {
        "v4" if params.filter.is_empty() => "version=4".to_string(),
        "v4" => format!("({}) && version=4", params.filter),
        "v6" if params.filter.is_empty() => "version=6".to_string(),
        "v6" => format!("({}) && version=6", params.filter),
        _ => params.filter.clone(),
    };
    let filter = parse_query_filter(&combined)?;

    let cutoff = parse_time_range(&params.time_range).map(|range| Utc::now() - range);

    let mut data = match mode.as_str() {
        "ip-to-ip" => sankey::ip_to_ip(&state.store, filter.as_ref(), top_n, cutoff),
        "ip-to-service" => sankey::ip_to_service(&state.store, filter.as_ref(), top_n, cutoff),
        "firewall" => {
            let firewall_params = FirewallParams {
                left_if: params.left_if.unwrap_or(0),
                right_if: params.right_if.unwrap_or(0),
                left_exporter: params.left_exporter.clone(),
                right_exporter: params.right_exporter.clone(),
            };
            sankey::firewall(&state.store, filter.as_ref(), top_n, cutoff, &firewall_params)
        }
        _ => {
            return Err(ApiError::bad_request(
                "Invalid mode",
                "Supported modes: ip-to-ip, ip-to-service, firewall",
            ))
        }
    };

    data.mode = mode;
    data.generated = Utc::now();
    data.filter = params.filter;
    Ok(Json(data))
}

pub(super) async fn interfaces(State(state): State<Arc<AppState>>) -> Json<InterfacesResponse> {
    Json(sankey::interfaces_summary(&state.store, state.v6_prefix_len))
}

fn parse_query_filter(text: &str) -> Result<Option<Filter>, ApiError> {
    if text.is_empty() {
        return Ok(None);
    }
    let filter = parse_filter(text);
    if let Some(error) = filter.error() {
        return Err(ApiError::bad_request("Invalid filter", error));
    }
    Ok(Some(filter))
}

/// `5m`, `1h`, `30s`… per humantime; empty, `all`, or unparseable means no
/// cutoff.
fn parse_time_range(text: &str) -> Option<chrono::Duration> {
    if text.is_empty() || text == "all" {
        return None;
    }
    let duration = humantime::parse_duration(text).ok()?;
    chrono::Duration::from_std(duration).ok()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_time_range() {
        assert_eq!(parse_time_range(""), None);
        assert_eq!(parse_time_range("all"), None);
        assert_eq!(parse_time_range("junk"), None);
        assert_eq!(parse_time_range("5m"), Some(chrono::Duration::minutes(5)));
        assert_eq!(parse_time_range("1h"), Some(chrono::Duration::hours(1)));
    }

    #[test]
    fn test_parse_query_filter() {
        assert!(parse_query_filter("").unwrap().is_none());
        assert!(parse_query_filter("proto=tcp").unwrap().is_some());
        assert!(parse_query_filter("src=").is_err());
    }
}
