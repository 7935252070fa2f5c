//! Process-wide reverse-DNS cache. Lookups happen on a throwaway worker
//! thread so callers on the render or request path never block; until the
//! answer lands in the cache, consumers fall back to the IP string.

use dashmap::DashMap;
use dns_lookup::lookup_addr;
use flowscope_utils::unix_time::unix_now;
use once_cell::sync::Lazy;
use std::net::IpAddr;
use tracing::debug;

const CACHE_SIZE: usize = 4096;

struct DnsEntry {
    hostname: Option<String>,
    last_accessed: u64,
    pending: bool,
}

static DNS_CACHE: Lazy<DashMap<IpAddr, DnsEntry>> =
    Lazy::new(|| DashMap::with_capacity(CACHE_SIZE));

/// Cache-only read. `None` until a lookup (or an injected answer) has
/// populated the entry.
pub fn cached_hostname(ip: IpAddr) -> Option<String> {
    let mut entry = DNS_CACHE.get_mut(&ip)?;
    entry.last_accessed = unix_now().unwrap_or(0);
    entry.hostname.clone()
}

/// Injects a known IP-to-hostname mapping, e.g. from a DNS server's query
/// logs. Overwrites any previous answer.
pub fn insert_hostname(ip: IpAddr, hostname: String) {
    evict_if_full();
    DNS_CACHE.insert(
        ip,
        DnsEntry {
            hostname: Some(hostname),
            last_accessed: unix_now().unwrap_or(0),
            pending: false,
        },
    );
}

/// Returns the hostname if cached, otherwise kicks off a background
/// reverse lookup and returns the IP's string form for now.
pub fn resolve_hostname(ip: IpAddr) -> String {
    if let Some(mut entry) = DNS_CACHE.get_mut(&ip) {
        entry.last_accessed = unix_now().unwrap_or(0);
        if let Some(hostname) = &entry.hostname {
            return hostname.clone();
        }
        if entry.pending {
            return ip.to_string();
        }
        entry.pending = true;
    } else {
        evict_if_full();
        DNS_CACHE.insert(
            ip,
            DnsEntry {
                hostname: None,
                last_accessed: unix_now().unwrap_or(0),
                pending: true,
            },
        );
    }

    std::thread::spawn(move || {
        let hostname = lookup_addr(&ip).unwrap_or_else(|_| ip.to_string());
        debug!("Reverse lookup for {ip} -> {hostname}");
        if let Some(mut entry) = DNS_CACHE.get_mut(&ip) {
            entry.hostname = Some(hostname);
            entry.pending = false;
        }
    });

    ip.to_string()
}

fn evict_if_full() {
    if DNS_CACHE.len() < CACHE_SIZE {
        return;
    }
    let mut entries: Vec<(IpAddr, u64)> = DNS_CACHE
        .iter()
        .map(|v| (*v.key(), v.last_accessed))
        .collect();
    entries.sort_by(|a, b| a.1.cmp(&b.1));
    if let Some((oldest, _)) = entries.first() {
        DNS_CACHE.remove(oldest);
    }
}
