//! Core data types for FlowScope: the flow record produced by the wire
//! parsers, its derived keys, and the bidirectional conversation view.

mod conversation;
mod flow;

pub use conversation::Conversation;
pub use flow::{Flow, FlowVersion};

/// Maps an IANA protocol number to its common name. Anything outside the
/// small set the collector cares about renders as the decimal number.
pub fn protocol_name(protocol: u8) -> String {
    match protocol {
        1 => "ICMP".to_string(),
        6 => "TCP".to_string(),
        17 => "UDP".to_string(),
        47 => "GRE".to_string(),
        50 => "ESP".to_string(),
        51 => "AH".to_string(),
        58 => "ICMPv6".to_string(),
        89 => "OSPF".to_string(),
        132 => "SCTP".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::protocol_name;

    #[test]
    fn test_protocol_name() {
        assert_eq!(protocol_name(6), "TCP");
        assert_eq!(protocol_name(17), "UDP");
        assert_eq!(protocol_name(132), "SCTP");
        assert_eq!(protocol_name(200), "200");
    }
}
