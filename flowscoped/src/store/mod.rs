//! The bounded in-memory flow store. Holds up to `max_flows` records,
//! answers filtered/sorted/aggregated queries against a snapshot, keeps
//! roll-up statistics, and enforces the hybrid eviction policy.

mod eviction;

pub use eviction::{EvictionConfig, EvictionStats};

use chrono::{DateTime, Utc};
use flowscope_filter::Filter;
use flowscope_types::{Conversation, Flow, FlowVersion};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::net::IpAddr;

pub const DEFAULT_MAX_FLOWS: usize = 100_000;

/// The field a query's results are ordered by.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Time,
    Bytes,
    Packets,
    SrcIp,
    DstIp,
    Protocol,
}

impl Display for SortField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SortField::Time => "Time",
            SortField::Bytes => "Bytes",
            SortField::Packets => "Packets",
            SortField::SrcIp => "Src IP",
            SortField::DstIp => "Dst IP",
            SortField::Protocol => "Protocol",
        };
        write!(f, "{name}")
    }
}

/// Roll-up statistics over everything the store has ever ingested.
#[derive(Clone, Debug, Default)]
pub struct Stats {
    pub total_flows: u64,
    pub total_bytes: u64,
    pub total_packets: u64,
    pub flows_per_second: f64,
    pub bytes_per_second: f64,
    pub v5_flows: u64,
    pub v9_flows: u64,
    pub ipfix_flows: u64,
    pub unique_exporters: usize,
}

/// Count/bytes/packets for a filtered subset, without materializing it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FilteredStats {
    pub count: usize,
    pub bytes: u64,
    pub packets: u64,
}

struct StoreInner {
    flows: Vec<Flow>,
    stats: Stats,
    exporters: HashSet<IpAddr>,
    last_stats_update: DateTime<Utc>,
    flows_in_window: u64,
    bytes_in_window: u64,
    eviction_config: EvictionConfig,
    eviction_stats: EvictionStats,
}

/// Thread-safe store. One RW lock covers the whole state: `add`,
/// `mark_accessed`, `clear`, and `set_eviction_config` write, everything
/// else reads and computes on a materialized snapshot.
pub struct FlowStore {
    max_flows: usize,
    inner: RwLock<StoreInner>,
}

impl FlowStore {
    pub fn new(max_flows: usize) -> Self {
        Self::with_config(max_flows, EvictionConfig::default())
    }

    pub fn with_config(max_flows: usize, eviction_config: EvictionConfig) -> Self {
        let max_flows = if max_flows == 0 {
            DEFAULT_MAX_FLOWS
        } else {
            max_flows
        };
        Self {
            max_flows,
            inner: RwLock::new(StoreInner {
                flows: Vec::with_capacity(max_flows.min(65_536)),
                stats: Stats::default(),
                exporters: HashSet::new(),
                last_stats_update: Utc::now(),
                flows_in_window: 0,
                bytes_in_window: 0,
                eviction_config,
                eviction_stats: EvictionStats::default(),
            }),
        }
    }

    /// Appends flows in arrival order, updating totals and the one-second
    /// rate window, and evicting when the cap is exceeded.
    pub fn add(&self, flows: Vec<Flow>) {
        if flows.is_empty() {
            return;
        }

        let mut inner = self.inner.write();

        for flow in flows {
            inner.stats.total_flows += 1;
            inner.stats.total_bytes += flow.bytes;
            inner.stats.total_packets += flow.packets;
            inner.flows_in_window += 1;
            inner.bytes_in_window += flow.bytes;

            match flow.version {
                FlowVersion::V5 => inner.stats.v5_flows += 1,
                FlowVersion::V9 => inner.stats.v9_flows += 1,
                FlowVersion::Ipfix => inner.stats.ipfix_flows += 1,
            }

            inner.exporters.insert(flow.exporter_ip);
            inner.flows.push(flow);
        }

        if inner.flows.len() > self.max_flows {
            eviction::evict_flows(&mut inner, self.max_flows);
        }

        let now = Utc::now();
        let elapsed = (now - inner.last_stats_update).num_milliseconds() as f64 / 1000.0;
        if elapsed >= 1.0 {
            inner.stats.flows_per_second = inner.flows_in_window as f64 / elapsed;
            inner.stats.bytes_per_second = inner.bytes_in_window as f64 / elapsed;
            inner.stats.unique_exporters = inner.exporters.len();
            inner.flows_in_window = 0;
            inner.bytes_in_window = 0;
            inner.last_stats_update = now;
        }
    }

    /// Returns a sorted, materialized copy of the flows matching the
    /// filter. `limit == 0` means unlimited.
    pub fn query(
        &self,
        filter: Option<&Filter>,
        sort_by: SortField,
        ascending: bool,
        limit: usize,
    ) -> Vec<Flow> {
        let mut filtered = {
            let inner = self.inner.read();
            match filter {
                None => inner.flows.clone(),
                Some(f) if f.is_empty() => inner.flows.clone(),
                Some(f) => inner.flows.iter().filter(|flow| f.matches(flow)).cloned().collect(),
            }
        };

        sort_flows(&mut filtered, sort_by, ascending);
        truncate(&mut filtered, limit);
        filtered
    }

    /// Like `query`, but collapses records sharing a 5-tuple into one:
    /// summed counters, widest time span, freshest arrival and access.
    pub fn query_aggregated(
        &self,
        filter: Option<&Filter>,
        sort_by: SortField,
        ascending: bool,
        limit: usize,
    ) -> Vec<Flow> {
        let mut merged: HashMap<String, Flow> = HashMap::new();
        {
            let inner = self.inner.read();
            for flow in &inner.flows {
                if let Some(f) = filter {
                    if !f.is_empty() && !f.matches(flow) {
                        continue;
                    }
                }

                match merged.entry(flow.flow_key()) {
                    std::collections::hash_map::Entry::Occupied(mut entry) => {
                        let existing = entry.get_mut();
                        existing.bytes += flow.bytes;
                        existing.packets += flow.packets;
                        existing.start_time = existing.start_time.min(flow.start_time);
                        existing.end_time = existing.end_time.max(flow.end_time);
                        existing.received_at = existing.received_at.max(flow.received_at);
                        if flow.last_accessed > existing.last_accessed {
                            existing.last_accessed = flow.last_accessed;
                        }
                    }
                    std::collections::hash_map::Entry::Vacant(entry) => {
                        entry.insert(flow.clone());
                    }
                }
            }
        }

        let mut flows: Vec<Flow> = merged.into_values().collect();
        sort_flows(&mut flows, sort_by, ascending);
        truncate(&mut flows, limit);
        flows
    }

    /// Folds flows into bidirectional conversations keyed independently of
    /// direction.
    pub fn query_conversations(
        &self,
        filter: Option<&Filter>,
        sort_by: SortField,
        ascending: bool,
        limit: usize,
    ) -> Vec<Conversation> {
        let mut merged: HashMap<String, Conversation> = HashMap::new();
        {
            let inner = self.inner.read();
            for flow in &inner.flows {
                if let Some(f) = filter {
                    if !f.is_empty() && !f.matches(flow) {
                        continue;
                    }
                }

                let conv = merged.entry(flow.conversation_key()).or_insert_with(|| {
                    let src = format!("{}:{}", flow.src_addr, flow.src_port);
                    let dst = format!("{}:{}", flow.dst_addr, flow.dst_port);
                    let (addr_a, port_a, addr_b, port_b) = if src < dst {
                        (flow.src_addr, flow.src_port, flow.dst_addr, flow.dst_port)
                    } else {
                        (flow.dst_addr, flow.dst_port, flow.src_addr, flow.src_port)
                    };
                    Conversation {
                        addr_a,
                        port_a,
                        addr_b,
                        port_b,
                        protocol: flow.protocol,
                        first_seen: flow.received_at,
                        last_seen: flow.received_at,
                        input_if: flow.input_if,
                        output_if: flow.output_if,
                        exporter_ip: flow.exporter_ip,
                        ..Default::default()
                    }
                });

                let forward = flow.src_addr == conv.addr_a && flow.src_port == conv.port_a;
                if forward {
                    conv.bytes_a_to_b += flow.bytes;
                    conv.packets_a_to_b += flow.packets;
                    conv.flows_a_to_b += 1;
                } else {
                    conv.bytes_b_to_a += flow.bytes;
                    conv.packets_b_to_a += flow.packets;
                    conv.flows_b_to_a += 1;
                }

                conv.first_seen = conv.first_seen.min(flow.received_at);
                conv.last_seen = conv.last_seen.max(flow.received_at);
            }
        }

        let mut conversations: Vec<Conversation> = merged.into_values().collect();
        conversations.sort_by(|a, b| {
            let ordering = match sort_by {
                SortField::Time => a.last_seen.cmp(&b.last_seen),
                SortField::Bytes => a.total_bytes().cmp(&b.total_bytes()),
                SortField::Packets => a.total_packets().cmp(&b.total_packets()),
                SortField::SrcIp => compare_ips(a.addr_a, b.addr_a),
                SortField::DstIp => compare_ips(a.addr_b, b.addr_b),
                SortField::Protocol => a.protocol.cmp(&b.protocol),
            };
            if ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
        truncate(&mut conversations, limit);
        conversations
    }

    /// Count/bytes/packets of the matching subset, without copying flows.
    pub fn filtered_stats(&self, filter: Option<&Filter>) -> FilteredStats {
        let inner = self.inner.read();
        let mut stats = FilteredStats::default();
        for flow in &inner.flows {
            let matches = match filter {
                None => true,
                Some(f) => f.is_empty() || f.matches(flow),
            };
            if matches {
                stats.count += 1;
                stats.bytes += flow.bytes;
                stats.packets += flow.packets;
            }
        }
        stats
    }

    pub fn filtered_count(&self, filter: Option<&Filter>) -> usize {
        match filter {
            None => self.flow_count(),
            Some(f) if f.is_empty() => self.flow_count(),
            Some(f) => {
                let inner = self.inner.read();
                inner.flows.iter().filter(|flow| f.matches(flow)).count()
            }
        }
    }

    /// Stats for flows whose source and destination are the same host.
    pub fn self_traffic_stats(&self) -> FilteredStats {
        let inner = self.inner.read();
        let mut stats = FilteredStats::default();
        for flow in &inner.flows {
            if flow.src_addr == flow.dst_addr {
                stats.count += 1;
                stats.bytes += flow.bytes;
                stats.packets += flow.packets;
            }
        }
        stats
    }

    /// The LRU hook: stamps `last_accessed` on every stored flow whose
    /// 5-tuple key is listed. Viewers call this for the flows they render.
    pub fn mark_accessed(&self, flow_keys: &[String]) {
        if flow_keys.is_empty() {
            return;
        }

        let keys: HashSet<&str> = flow_keys.iter().map(String::as_str).collect();
        let now = Utc::now();

        // The same 5-tuple can be stored many times (one per export), so
        // every match gets stamped, not just the first.
        let mut inner = self.inner.write();
        for flow in inner.flows.iter_mut() {
            if keys.contains(flow.flow_key().as_str()) {
                flow.last_accessed = Some(now);
            }
        }
    }

    pub fn stats(&self) -> Stats {
        let inner = self.inner.read();
        let mut stats = inner.stats.clone();
        stats.unique_exporters = inner.exporters.len();
        stats
    }

    pub fn flow_count(&self) -> usize {
        self.inner.read().flows.len()
    }

    pub fn max_flows(&self) -> usize {
        self.max_flows
    }

    pub fn clear(&self) {
        self.inner.write().flows.clear();
    }

    pub fn eviction_stats(&self) -> EvictionStats {
        self.inner.read().eviction_stats
    }

    pub fn eviction_config(&self) -> EvictionConfig {
        self.inner.read().eviction_config
    }

    pub fn set_eviction_config(&self, config: EvictionConfig) {
        self.inner.write().eviction_config = config;
    }
}

fn truncate<T>(items: &mut Vec<T>, limit: usize) {
    if limit > 0 && items.len() > limit {
        items.truncate(limit);
    }
}

fn sort_flows(flows: &mut [Flow], sort_by: SortField, ascending: bool) {
    flows.sort_by(|a, b| {
        let ordering = match sort_by {
            SortField::Time => a.received_at.cmp(&b.received_at),
            SortField::Bytes => a.bytes.cmp(&b.bytes),
            SortField::Packets => a.packets.cmp(&b.packets),
            SortField::SrcIp => compare_ips(a.src_addr, b.src_addr),
            SortField::DstIp => compare_ips(a.dst_addr, b.dst_addr),
            SortField::Protocol => a.protocol.cmp(&b.protocol),
        };
        if ascending {
            ordering
        } else {
            ordering.reverse()
        }
    });
}

/// IPs sort by their canonical textual form, so `10.0.0.10` comes before
/// `10.0.0.2`. Keeps ordering consistent with the filter language's
/// substring matching, which works on the same form.
fn compare_ips(a: IpAddr, b: IpAddr) -> Ordering {
    a.to_string().cmp(&b.to_string())
}

#[cfg(test)]
mod test {
    use super::*;
    use flowscope_filter::parse_filter;

    fn flow(src: &str, dst: &str, bytes: u64, version: FlowVersion) -> Flow {
        Flow {
            version,
            src_addr: src.parse().unwrap(),
            dst_addr: dst.parse().unwrap(),
            src_port: 40000,
            dst_port: 443,
            protocol: 6,
            bytes,
            packets: 1,
            exporter_ip: "192.0.2.1".parse().unwrap(),
            received_at: Utc::now(),
            ..Default::default()
        }
    }

    #[test]
    fn test_add_updates_stats() {
        let store = FlowStore::new(100);
        store.add(vec![
            flow("10.0.0.1", "1.1.1.1", 100, FlowVersion::V5),
            flow("10.0.0.2", "1.1.1.1", 200, FlowVersion::V9),
            flow("10.0.0.3", "1.1.1.1", 300, FlowVersion::Ipfix),
        ]);

        let stats = store.stats();
        assert_eq!(stats.total_flows, 3);
        assert_eq!(stats.total_bytes, 600);
        assert_eq!(stats.v5_flows, 1);
        assert_eq!(stats.v9_flows, 1);
        assert_eq!(stats.ipfix_flows, 1);
        assert_eq!(stats.unique_exporters, 1);
        assert_eq!(store.flow_count(), 3);
    }

    #[test]
    fn test_query_sort_and_limit() {
        let store = FlowStore::new(100);
        store.add(vec![
            flow("10.0.0.1", "1.1.1.1", 300, FlowVersion::V5),
            flow("10.0.0.2", "1.1.1.1", 100, FlowVersion::V5),
            flow("10.0.0.3", "1.1.1.1", 200, FlowVersion::V5),
        ]);

        let by_bytes = store.query(None, SortField::Bytes, false, 0);
        let bytes: Vec<u64> = by_bytes.iter().map(|f| f.bytes).collect();
        assert_eq!(bytes, vec![300, 200, 100]);

        let limited = store.query(None, SortField::Bytes, true, 2);
        let bytes: Vec<u64> = limited.iter().map(|f| f.bytes).collect();
        assert_eq!(bytes, vec![100, 200]);
    }

    #[test]
    fn test_ip_sort_is_string_order() {
        let store = FlowStore::new(100);
        store.add(vec![
            flow("10.0.0.2", "1.1.1.1", 1, FlowVersion::V5),
            flow("10.0.0.10", "1.1.1.1", 1, FlowVersion::V5),
        ]);

        let flows = store.query(None, SortField::SrcIp, true, 0);
        assert_eq!(flows[0].src_addr.to_string(), "10.0.0.10");
        assert_eq!(flows[1].src_addr.to_string(), "10.0.0.2");
    }

    #[test]
    fn test_query_with_filter() {
        let store = FlowStore::new(100);
        store.add(vec![
            flow("10.0.0.5", "1.1.1.1", 1, FlowVersion::V5),
            flow("192.168.0.5", "1.1.1.1", 1, FlowVersion::V5),
        ]);

        let f = parse_filter("src=10.0.0.0/8");
        let flows = store.query(Some(&f), SortField::Time, false, 0);
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].src_addr.to_string(), "10.0.0.5");

        let f = parse_filter("ip=1.1.1.1");
        assert_eq!(store.filtered_count(Some(&f)), 2);
    }

    #[test]
    fn test_aggregated_preserves_byte_sum() {
        let store = FlowStore::new(100);
        let mut flows = Vec::new();
        for i in 0..10u64 {
            // Two distinct 5-tuples, five exports each.
            let src = if i % 2 == 0 { "10.0.0.1" } else { "10.0.0.2" };
            flows.push(flow(src, "1.1.1.1", 100 + i, FlowVersion::V5));
        }
        store.add(flows);

        let plain: u64 = store
            .query(None, SortField::Bytes, false, 0)
            .iter()
            .map(|f| f.bytes)
            .sum();
        let aggregated = store.query_aggregated(None, SortField::Bytes, false, 0);
        let agg_sum: u64 = aggregated.iter().map(|f| f.bytes).sum();
        assert_eq!(plain, agg_sum);
        assert_eq!(aggregated.len(), 2);
    }

    #[test]
    fn test_conversations_fold_both_directions() {
        let store = FlowStore::new(100);
        let mut a_to_b = flow("10.0.0.1", "1.1.1.1", 500, FlowVersion::V5);
        a_to_b.src_port = 50000;
        a_to_b.dst_port = 443;
        let mut b_to_a = flow("1.1.1.1", "10.0.0.1", 2500, FlowVersion::V5);
        b_to_a.src_port = 443;
        b_to_a.dst_port = 50000;
        store.add(vec![a_to_b, b_to_a]);

        let conversations = store.query_conversations(None, SortField::Bytes, false, 0);
        assert_eq!(conversations.len(), 1);
        let c = &conversations[0];
        assert!(c.is_bidirectional());
        assert_eq!(c.total_bytes(), 3000);
        assert_eq!(c.flows_a_to_b + c.flows_b_to_a, 2);
    }

    #[test]
    fn test_filtered_stats_matches_query() {
        let store = FlowStore::new(100);
        store.add(vec![
            flow("10.0.0.1", "1.1.1.1", 100, FlowVersion::V5),
            flow("172.16.0.1", "1.1.1.1", 900, FlowVersion::V5),
        ]);

        let f = parse_filter("src=172.16");
        let stats = store.filtered_stats(Some(&f));
        assert_eq!(stats.count, 1);
        assert_eq!(stats.bytes, 900);

        let all = store.filtered_stats(None);
        assert_eq!(all.count, 2);
        assert_eq!(all.bytes, 1000);
    }

    #[test]
    fn test_self_traffic_stats() {
        let store = FlowStore::new(100);
        store.add(vec![
            flow("10.0.0.1", "10.0.0.1", 70, FlowVersion::V5),
            flow("10.0.0.1", "10.0.0.2", 30, FlowVersion::V5),
        ]);
        let stats = store.self_traffic_stats();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.bytes, 70);
    }

    #[test]
    fn test_mark_accessed() {
        let store = FlowStore::new(100);
        let f = flow("10.0.0.1", "1.1.1.1", 1, FlowVersion::V5);
        let key = f.flow_key();
        store.add(vec![f, flow("10.0.0.2", "1.1.1.1", 1, FlowVersion::V5)]);

        store.mark_accessed(&[key.clone()]);
        let flows = store.query(None, SortField::SrcIp, true, 0);
        assert_eq!(flows[0].flow_key(), key);
        let marked: Vec<bool> = flows.iter().map(|f| f.last_accessed.is_some()).collect();
        assert_eq!(marked, vec![true, false]);
    }

    #[test]
    fn test_clear_keeps_totals() {
        let store = FlowStore::new(100);
        store.add(vec![flow("10.0.0.1", "1.1.1.1", 1, FlowVersion::V5)]);
        store.clear();
        assert_eq!(store.flow_count(), 0);
        assert_eq!(store.stats().total_flows, 1);
    }
}
