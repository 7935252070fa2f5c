//! Non-interactive display for `--simple`: a periodic stats line plus the
//! current top talkers, suitable for logs and dumb terminals.

use crate::store::{FlowStore, SortField};
use flowscope_utils::scale::{format_count, format_decimal, scale_byte_rate, scale_bytes};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TOP_TALKERS: usize = 5;

/// Prints until `running` goes false. The refresh interval is clamped so
/// a tight `--refresh` doesn't flood the terminal.
pub fn run_simple(store: Arc<FlowStore>, refresh: Duration, running: Arc<AtomicBool>) {
    let interval = refresh.max(Duration::from_secs(1));

    while running.load(Ordering::Relaxed) {
        std::thread::sleep(interval);
        if !running.load(Ordering::Relaxed) {
            break;
        }

        let stats = store.stats();
        println!(
            "flows={} ({}/{} in memory)  rate={}/s  throughput={}  v5={} v9={} ipfix={}  exporters={}",
            format_count(stats.total_flows),
            format_count(store.flow_count() as u64),
            format_count(store.max_flows() as u64),
            format_decimal(stats.flows_per_second, 1),
            scale_byte_rate(stats.bytes_per_second as u64),
            stats.v5_flows,
            stats.v9_flows,
            stats.ipfix_flows,
            stats.unique_exporters,
        );

        for flow in store.query(None, SortField::Bytes, false, TOP_TALKERS) {
            println!(
                "  {:>21} -> {:<21} {:>6} {:>10}",
                format!("{}:{}", flow.src_addr, flow.src_port),
                format!("{}:{}", flow.dst_addr, flow.dst_port),
                flow.protocol_name(),
                scale_bytes(flow.bytes),
            );
        }
    }
}

/// Shutdown summary printed after either display mode exits.
pub fn print_final_stats(store: &FlowStore) {
    let stats = store.stats();
    let eviction = store.eviction_stats();

    println!("\nFinal Statistics:");
    println!("  Total Flows: {}", stats.total_flows);
    println!("  Total Bytes: {}", stats.total_bytes);
    println!("  Total Packets: {}", stats.total_packets);
    println!("  NetFlow v5: {}", stats.v5_flows);
    println!("  NetFlow v9: {}", stats.v9_flows);
    println!("  IPFIX: {}", stats.ipfix_flows);
    if eviction.total_evicted > 0 {
        println!("\nEviction Statistics:");
        println!("  Total Evicted: {}", eviction.total_evicted);
        println!("  TopK Protected: {}", eviction.top_k_protected);
        println!("  LRU Protected: {}", eviction.lru_protected);
    }
}
