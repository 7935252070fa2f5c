use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr};

/// The export protocol that produced a flow record.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowVersion {
    V5,
    V9,
    Ipfix,
}

impl FlowVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowVersion::V5 => "NetFlow v5",
            FlowVersion::V9 => "NetFlow v9",
            FlowVersion::Ipfix => "IPFIX",
        }
    }
}

impl Display for FlowVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single network flow record, as decoded from one exported data record.
#[derive(Clone, Debug)]
pub struct Flow {
    pub version: FlowVersion,
    pub src_addr: IpAddr,
    pub dst_addr: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
    pub bytes: u64,
    pub packets: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub tcp_flags: u8,
    pub src_as: u32,
    pub dst_as: u32,
    pub input_if: u16,
    pub output_if: u16,
    pub exporter_ip: IpAddr,
    pub received_at: DateTime<Utc>,
    /// Set when a viewer displayed this flow. Drives recency protection
    /// during eviction.
    pub last_accessed: Option<DateTime<Utc>>,
}

impl Default for Flow {
    fn default() -> Self {
        Self {
            version: FlowVersion::V5,
            src_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            dst_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            src_port: 0,
            dst_port: 0,
            protocol: 0,
            bytes: 0,
            packets: 0,
            start_time: DateTime::<Utc>::UNIX_EPOCH,
            end_time: DateTime::<Utc>::UNIX_EPOCH,
            tcp_flags: 0,
            src_as: 0,
            dst_as: 0,
            input_if: 0,
            output_if: 0,
            exporter_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            received_at: DateTime::<Utc>::UNIX_EPOCH,
            last_accessed: None,
        }
    }
}

impl Flow {
    pub fn protocol_name(&self) -> String {
        crate::protocol_name(self.protocol)
    }

    /// TCP flags in the usual one-letter-per-bit notation, `.` when no
    /// bits are set. Only meaningful for TCP; everything else is `-`.
    pub fn tcp_flags_string(&self) -> String {
        if self.protocol != 6 {
            return "-".to_string();
        }
        let mut flags = String::new();
        if self.tcp_flags & 0x01 != 0 {
            flags.push('F');
        }
        if self.tcp_flags & 0x02 != 0 {
            flags.push('S');
        }
        if self.tcp_flags & 0x04 != 0 {
            flags.push('R');
        }
        if self.tcp_flags & 0x08 != 0 {
            flags.push('P');
        }
        if self.tcp_flags & 0x10 != 0 {
            flags.push('A');
        }
        if self.tcp_flags & 0x20 != 0 {
            flags.push('U');
        }
        if flags.is_empty() {
            flags.push('.');
        }
        flags
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }

    pub fn bytes_per_second(&self) -> f64 {
        let seconds = self.duration().num_milliseconds() as f64 / 1000.0;
        if seconds <= 0.0 {
            return 0.0;
        }
        self.bytes as f64 / seconds
    }

    /// Direction-preserving 5-tuple key used for flow aggregation.
    pub fn flow_key(&self) -> String {
        format!(
            "{}:{}-{}:{}-{}",
            self.src_addr, self.src_port, self.dst_addr, self.dst_port, self.protocol
        )
    }

    /// Order-independent key: the lexicographically smaller `ip:port`
    /// endpoint goes first, so both directions of a conversation collide.
    pub fn conversation_key(&self) -> String {
        let src = format!("{}:{}", self.src_addr, self.src_port);
        let dst = format!("{}:{}", self.dst_addr, self.dst_port);
        if src < dst {
            format!("{}-{}-{}", src, dst, self.protocol)
        } else {
            format!("{}-{}-{}", dst, src, self.protocol)
        }
    }
}
