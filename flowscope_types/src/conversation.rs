use chrono::{DateTime, Utc};
use std::net::{IpAddr, Ipv4Addr};

/// A bidirectional aggregate of all flows sharing a pair of endpoints and a
/// protocol. Endpoint A is the lexicographically smaller `ip:port`.
#[derive(Clone, Debug)]
pub struct Conversation {
    pub addr_a: IpAddr,
    pub port_a: u16,
    pub addr_b: IpAddr,
    pub port_b: u16,
    pub protocol: u8,

    // Forward direction (A -> B)
    pub bytes_a_to_b: u64,
    pub packets_a_to_b: u64,
    pub flows_a_to_b: u64,

    // Reverse direction (B -> A)
    pub bytes_b_to_a: u64,
    pub packets_b_to_a: u64,
    pub flows_b_to_a: u64,

    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,

    // Carried over from the first contributing flow, for display.
    pub input_if: u16,
    pub output_if: u16,
    pub exporter_ip: IpAddr,
}

impl Default for Conversation {
    fn default() -> Self {
        Self {
            addr_a: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port_a: 0,
            addr_b: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port_b: 0,
            protocol: 0,
            bytes_a_to_b: 0,
            packets_a_to_b: 0,
            flows_a_to_b: 0,
            bytes_b_to_a: 0,
            packets_b_to_a: 0,
            flows_b_to_a: 0,
            first_seen: DateTime::<Utc>::UNIX_EPOCH,
            last_seen: DateTime::<Utc>::UNIX_EPOCH,
            input_if: 0,
            output_if: 0,
            exporter_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}

impl Conversation {
    pub fn total_bytes(&self) -> u64 {
        self.bytes_a_to_b + self.bytes_b_to_a
    }

    pub fn total_packets(&self) -> u64 {
        self.packets_a_to_b + self.packets_b_to_a
    }

    /// True when traffic was seen in both directions.
    pub fn is_bidirectional(&self) -> bool {
        self.flows_a_to_b > 0 && self.flows_b_to_a > 0
    }

    pub fn protocol_name(&self) -> String {
        crate::protocol_name(self.protocol)
    }

    pub fn key(&self) -> String {
        format!(
            "{}:{}-{}:{}-{}",
            self.addr_a, self.port_a, self.addr_b, self.port_b, self.protocol
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bidirectional() {
        let mut c = Conversation {
            flows_a_to_b: 2,
            ..Default::default()
        };
        assert!(!c.is_bidirectional());
        c.flows_b_to_a = 1;
        assert!(c.is_bidirectional());
    }

    #[test]
    fn test_totals() {
        let c = Conversation {
            bytes_a_to_b: 100,
            bytes_b_to_a: 50,
            packets_a_to_b: 3,
            packets_b_to_a: 2,
            ..Default::default()
        };
        assert_eq!(c.total_bytes(), 150);
        assert_eq!(c.total_packets(), 5);
    }
}
