//! Hybrid eviction: elephant flows (Top-K by bytes) and recently viewed
//! flows (LRU window) are protected; everything else leaves FIFO. When
//! FIFO alone cannot meet the budget, LRU protection is relaxed oldest
//! access first. Top-K protection is never relaxed in a pass, so the
//! store may transiently exceed its cap until the next add.

use super::StoreInner;
use chrono::{Duration, Utc};
use std::collections::HashSet;

/// Tuning for the hybrid eviction strategy.
#[derive(Clone, Copy, Debug)]
pub struct EvictionConfig {
    /// Percent of max-flows protected as elephant flows (1.0 = 1%).
    pub top_k_percent: f64,
    /// Flows accessed within this window survive the pass.
    pub lru_window: Duration,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            top_k_percent: 1.0,
            lru_window: Duration::minutes(5),
        }
    }
}

impl EvictionConfig {
    /// The flow count shielded by Top-K protection at a given cap.
    pub fn top_k_count(&self, max_flows: usize) -> usize {
        let count = max_flows as f64 * self.top_k_percent / 100.0;
        if count <= 0.0 {
            0
        } else {
            count as usize
        }
    }
}

/// Counters exposed alongside store statistics.
#[derive(Clone, Copy, Debug, Default)]
pub struct EvictionStats {
    pub total_evicted: u64,
    /// Size of the Top-K protected set in the most recent pass.
    pub top_k_protected: usize,
    /// Size of the LRU protected set remaining after the most recent pass.
    pub lru_protected: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Protection {
    None,
    TopK,
    Lru,
}

pub(super) fn evict_flows(inner: &mut StoreInner, max_flows: usize) {
    let to_evict = inner.flows.len().saturating_sub(max_flows);
    if to_evict == 0 {
        return;
    }

    let now = Utc::now();
    let top_k_count = inner.eviction_config.top_k_count(max_flows);

    // The byte threshold a flow must reach for Top-K protection: the
    // K-th largest byte count currently stored.
    let mut top_k_threshold = 0u64;
    if top_k_count > 0 && top_k_count < inner.flows.len() {
        let mut byte_counts: Vec<u64> = inner.flows.iter().map(|f| f.bytes).collect();
        byte_counts.sort_unstable_by(|a, b| b.cmp(a));
        top_k_threshold = byte_counts[top_k_count - 1];
    }

    let mut classification = vec![Protection::None; inner.flows.len()];
    let mut top_k_protected = 0usize;
    let mut lru_count = 0usize;

    for (i, flow) in inner.flows.iter().enumerate() {
        if top_k_threshold > 0 && flow.bytes >= top_k_threshold && top_k_protected < top_k_count {
            classification[i] = Protection::TopK;
            top_k_protected += 1;
            continue;
        }
        if let Some(last_accessed) = flow.last_accessed {
            if now - last_accessed < inner.eviction_config.lru_window {
                classification[i] = Protection::Lru;
                lru_count += 1;
            }
        }
    }

    // FIFO over the unprotected flows: insertion order, oldest first.
    let mut to_remove: HashSet<usize> = HashSet::with_capacity(to_evict);
    for (i, protection) in classification.iter().enumerate() {
        if to_remove.len() >= to_evict {
            break;
        }
        if *protection == Protection::None {
            to_remove.insert(i);
        }
    }

    // Still short: relax LRU protection, oldest access first.
    if to_remove.len() < to_evict {
        let mut lru_flows: Vec<usize> = classification
            .iter()
            .enumerate()
            .filter(|(_, p)| **p == Protection::Lru)
            .map(|(i, _)| i)
            .collect();
        lru_flows.sort_by_key(|i| inner.flows[*i].last_accessed);
        for i in lru_flows {
            if to_remove.len() >= to_evict {
                break;
            }
            to_remove.insert(i);
            lru_count -= 1;
        }
    }

    let removed = to_remove.len();
    let mut index = 0;
    inner.flows.retain(|_| {
        let keep = !to_remove.contains(&index);
        index += 1;
        keep
    });

    inner.eviction_stats.total_evicted += removed as u64;
    inner.eviction_stats.top_k_protected = top_k_protected;
    inner.eviction_stats.lru_protected = lru_count;
}

#[cfg(test)]
mod test {
    use super::super::{FlowStore, SortField};
    use super::*;
    use flowscope_types::{Flow, FlowVersion};

    fn flow(last_octet: u8, bytes: u64) -> Flow {
        Flow {
            version: FlowVersion::V5,
            src_addr: format!("10.0.0.{last_octet}").parse().unwrap(),
            dst_addr: "1.1.1.1".parse().unwrap(),
            src_port: 1000 + last_octet as u16,
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
    fn test_elephant_flow_survives_eviction() {
        // top_k_percent=1 over 100 flows protects exactly one flow.
        let store = FlowStore::new(100);
        for i in 0..100u8 {
            store.add(vec![flow(i.wrapping_add(1), 1024)]);
        }
        store.add(vec![flow(200, 1 << 30)]);
        store.add(vec![flow(201, 1024)]);

        assert!(store.flow_count() <= 100 + 1);
        let flows = store.query(None, SortField::Bytes, false, 1);
        assert_eq!(flows[0].bytes, 1 << 30);

        let stats = store.eviction_stats();
        assert!(stats.total_evicted >= 2);
        assert_eq!(stats.top_k_protected, 1);
    }

    #[test]
    fn test_cap_invariant_under_churn() {
        let config = EvictionConfig {
            top_k_percent: 10.0,
            lru_window: Duration::minutes(5),
        };
        let store = FlowStore::with_config(50, config);
        let top_k_count = config.top_k_count(50);

        for round in 0..20u64 {
            let batch: Vec<Flow> = (0..25u8).map(|i| flow(i, round * 10 + i as u64)).collect();
            store.add(batch);
            assert!(
                store.flow_count() <= 50 + top_k_count,
                "count {} exceeded cap tolerance",
                store.flow_count()
            );
        }
    }

    #[test]
    fn test_lru_protection_survives_one_pass() {
        let store = FlowStore::new(10);
        let protected = flow(1, 10);
        let protected_key = protected.flow_key();
        store.add(vec![protected]);
        for i in 2..=10u8 {
            store.add(vec![flow(i, 10)]);
        }
        // Mark the oldest flow accessed, then overflow: FIFO would take it
        // first, LRU protection must not.
        store.mark_accessed(&[protected_key.clone()]);
        store.add(vec![flow(11, 10), flow(12, 10)]);

        let keys: Vec<String> = store
            .query(None, SortField::Time, true, 0)
            .iter()
            .map(|f| f.flow_key())
            .collect();
        assert!(keys.contains(&protected_key));
        assert!(store.eviction_stats().lru_protected >= 1);
    }

    #[test]
    fn test_lru_relaxed_when_everything_is_protected() {
        let config = EvictionConfig {
            top_k_percent: 0.0,
            lru_window: Duration::minutes(5),
        };
        let store = FlowStore::with_config(10, config);
        for i in 0..10u8 {
            store.add(vec![flow(i, 10)]);
        }
        let keys: Vec<String> = store
            .query(None, SortField::Time, true, 0)
            .iter()
            .map(|f| f.flow_key())
            .collect();
        store.mark_accessed(&keys);

        // Everything is LRU-protected; the pass must still shrink the
        // store by relaxing the oldest accesses.
        store.add(vec![flow(50, 10), flow(51, 10)]);
        assert_eq!(store.flow_count(), 10);
    }

    #[test]
    fn test_zero_top_k_percent_disables_elephants() {
        let config = EvictionConfig {
            top_k_percent: 0.0,
            lru_window: Duration::minutes(5),
        };
        let store = FlowStore::with_config(5, config);
        store.add(vec![flow(1, 1 << 30)]);
        for i in 2..=7u8 {
            store.add(vec![flow(i, 10)]);
        }
        // Without Top-K protection the giant flow leaves FIFO like any
        // other.
        let flows = store.query(None, SortField::Bytes, false, 1);
        assert!(flows[0].bytes < 1 << 30);
        assert_eq!(store.eviction_stats().top_k_protected, 0);
    }
}
