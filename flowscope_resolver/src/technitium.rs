//! Poller for a Technitium DNS server's query-log app. Forward-lookup
//! answers (A/AAAA) observed by the DNS server are injected into the
//! hostname cache, which gives far better names than reverse DNS on
//! networks where PTR records are sparse.

use crate::insert_hostname;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct TechnitiumConfig {
    /// Base URL of the server, e.g. `http://192.168.1.1:5380`.
    pub server_url: String,
    /// API token.
    pub token: String,
    /// DNS App name holding the query logs.
    pub app_name: String,
    /// DNS App class path.
    pub class_path: String,
    pub poll_interval: Duration,
}

impl TechnitiumConfig {
    pub fn new(server_url: String, token: String) -> Self {
        Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            token,
            app_name: "Query Logs (Sqlite)".to_string(),
            class_path: "QueryLogsSqlite.App".to_string(),
            poll_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Error, Debug)]
pub enum TechnitiumError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {0}")]
    Api(String),
}

#[derive(Deserialize)]
struct QueryLogResponse {
    status: String,
    #[serde(default)]
    response: QueryLogPage,
    #[serde(rename = "errorMessage", default)]
    error_message: String,
}

#[derive(Deserialize, Default)]
struct QueryLogPage {
    #[serde(default)]
    entries: Vec<QueryLogEntry>,
}

#[derive(Deserialize)]
struct QueryLogEntry {
    #[serde(rename = "qname", default)]
    qname: String,
    #[serde(rename = "qtype", default)]
    qtype: String,
    #[serde(default)]
    answer: String,
}

/// Polls the query-log API until the task is dropped, injecting every
/// observed A/AAAA answer into the hostname cache.
pub async fn poll_query_logs(config: TechnitiumConfig) {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            warn!("Could not build DNS log HTTP client: {e}");
            return;
        }
    };

    info!(
        "Polling DNS query logs from {} every {:?}",
        config.server_url, config.poll_interval
    );

    let mut ticker = tokio::time::interval(config.poll_interval);
    loop {
        ticker.tick().await;
        match fetch_query_logs(&client, &config).await {
            Ok(entries) => {
                let mut injected = 0usize;
                let total = entries.len();
                for entry in entries {
                    if process_entry(&entry) {
                        injected += 1;
                    }
                }
                debug!("DNS log poll: {injected}/{total} entries injected");
            }
            Err(e) => warn!("DNS log poll failed: {e}"),
        }
    }
}

async fn fetch_query_logs(
    client: &reqwest::Client,
    config: &TechnitiumConfig,
) -> Result<Vec<QueryLogEntry>, TechnitiumError> {
    let url = format!("{}/api/logs/query", config.server_url);
    let response: QueryLogResponse = client
        .get(&url)
        .query(&[
            ("token", config.token.as_str()),
            ("name", config.app_name.as_str()),
            ("classPath", config.class_path.as_str()),
            ("entriesPerPage", "1000"),
            ("descendingOrder", "true"),
            ("rcode", "NoError"),
        ])
        .send()
        .await?
        .json()
        .await?;

    if response.status != "ok" {
        return Err(TechnitiumError::Api(response.error_message));
    }
    Ok(response.response.entries)
}

fn process_entry(entry: &QueryLogEntry) -> bool {
    if entry.qtype != "A" && entry.qtype != "AAAA" {
        return false;
    }
    if entry.answer.is_empty() {
        return false;
    }

    let hostname = entry.qname.trim_end_matches('.').to_string();
    let mut injected = false;
    for ip in parse_answer(&entry.answer) {
        insert_hostname(ip, hostname.clone());
        injected = true;
    }
    injected
}

/// Extracts addresses from an answer string such as
/// `"A 17.253.15.153, A 17.253.15.133"` or `"AAAA 2a01:..."`. CNAME and
/// other record types in the chain are skipped.
fn parse_answer(answer: &str) -> Vec<IpAddr> {
    let mut ips = Vec::new();
    for part in answer.split(',') {
        let part = part.trim();
        let candidate = part
            .strip_prefix("A ")
            .or_else(|| part.strip_prefix("AAAA "))
            .map(str::trim);
        if let Some(candidate) = candidate {
            if let Ok(ip) = candidate.parse::<IpAddr>() {
                ips.push(ip);
            }
        }
    }
    // Some configurations log the bare address.
    if ips.is_empty() {
        if let Ok(ip) = answer.trim().parse::<IpAddr>() {
            ips.push(ip);
        }
    }
    ips
}
