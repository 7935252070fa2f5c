use flowscope_types::Flow;
use ip_network::IpNetwork;
use std::net::IpAddr;

/// A canonical flow field a condition can test. Aliases are resolved
/// during parsing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Field {
    /// `src`, `sip`, `srcip`
    Src,
    /// `dst`, `dip`, `dstip`
    Dst,
    /// `ip`, `host`: either endpoint
    Ip,
    /// `sport`, `srcport`
    SrcPort,
    /// `dport`, `dstport`
    DstPort,
    /// `port`: either port
    Port,
    /// `proto`, `protocol`
    Proto,
    /// `service`, `svc`
    Service,
    /// `if`: either interface
    If,
    /// `inif`
    InIf,
    /// `outif`
    OutIf,
    /// `self`, `local`: source equals destination
    SelfTraffic,
    /// `version`, `ipversion`: address family
    Version,
}

impl Field {
    /// Resolves a (case-folded) field name or alias.
    pub fn from_name(name: &str) -> Option<Field> {
        match name {
            "src" | "sip" | "srcip" => Some(Field::Src),
            "dst" | "dip" | "dstip" => Some(Field::Dst),
            "ip" | "host" => Some(Field::Ip),
            "sport" | "srcport" => Some(Field::SrcPort),
            "dport" | "dstport" => Some(Field::DstPort),
            "port" => Some(Field::Port),
            "proto" | "protocol" => Some(Field::Proto),
            "service" | "svc" => Some(Field::Service),
            "if" => Some(Field::If),
            "inif" => Some(Field::InIf),
            "outif" => Some(Field::OutIf),
            "self" | "local" => Some(Field::SelfTraffic),
            "version" | "ipversion" => Some(Field::Version),
            _ => None,
        }
    }

    pub fn is_ip_field(&self) -> bool {
        matches!(self, Field::Src | Field::Dst | Field::Ip)
    }

    pub fn is_port_field(&self) -> bool {
        matches!(self, Field::SrcPort | Field::DstPort | Field::Port)
    }

    pub fn is_interface_field(&self) -> bool {
        matches!(self, Field::If | Field::InIf | Field::OutIf)
    }
}

/// A single leaf condition.
#[derive(Clone, Debug)]
pub struct ConditionNode {
    pub field: Field,
    pub value: String,
    /// Parsed port for port fields.
    pub port: u16,
    /// Parsed interface id for interface fields.
    pub interface: u16,
    /// Parsed network for CIDR values on IP fields.
    pub network: Option<IpNetwork>,
    /// Set by the `!=` operator.
    pub negated: bool,
}

impl ConditionNode {
    pub fn evaluate(&self, flow: &Flow) -> bool {
        let result = match self.field {
            Field::Src => self.match_ip(flow.src_addr),
            Field::Dst => self.match_ip(flow.dst_addr),
            Field::Ip => self.match_ip(flow.src_addr) || self.match_ip(flow.dst_addr),
            Field::SrcPort => flow.src_port == self.port,
            Field::DstPort => flow.dst_port == self.port,
            Field::Port => flow.src_port == self.port || flow.dst_port == self.port,
            Field::Proto => flow.protocol_name().eq_ignore_ascii_case(&self.value),
            Field::Service => {
                let src_svc = flowscope_resolver::service_name(flow.src_port, flow.protocol);
                let dst_svc = flowscope_resolver::service_name(flow.dst_port, flow.protocol);
                match (src_svc, dst_svc) {
                    // No service on either port, e.g. ICMP: fall back to
                    // the protocol name.
                    (None, None) => flow.protocol_name().eq_ignore_ascii_case(&self.value),
                    _ => {
                        src_svc.is_some_and(|s| s.eq_ignore_ascii_case(&self.value))
                            || dst_svc.is_some_and(|s| s.eq_ignore_ascii_case(&self.value))
                    }
                }
            }
            Field::If => flow.input_if == self.interface || flow.output_if == self.interface,
            Field::InIf => flow.input_if == self.interface,
            Field::OutIf => flow.output_if == self.interface,
            Field::SelfTraffic => flow.src_addr == flow.dst_addr,
            Field::Version => {
                let is_v4 = matches!(flow.src_addr, IpAddr::V4(_));
                match self.value.as_str() {
                    "4" | "v4" | "ipv4" => is_v4,
                    "6" | "v6" | "ipv6" => !is_v4,
                    // Unknown version value matches all.
                    _ => true,
                }
            }
        };
        if self.negated {
            !result
        } else {
            result
        }
    }

    /// CIDR membership when a network was given, otherwise a literal
    /// substring match on the canonical text form, so `src=192.168`
    /// matches the whole 192.168/16 space.
    fn match_ip(&self, addr: IpAddr) -> bool {
        match &self.network {
            Some(network) => cidr_contains(network, addr),
            None => addr.to_string().contains(&self.value),
        }
    }
}

fn cidr_contains(network: &IpNetwork, addr: IpAddr) -> bool {
    match (network, addr) {
        (IpNetwork::V4(net), IpAddr::V4(ip)) => net.contains(ip),
        (IpNetwork::V6(net), IpAddr::V6(ip)) => net.contains(ip),
        _ => false,
    }
}

/// A node in the filter expression tree.
#[derive(Clone, Debug)]
pub enum ExprNode {
    Condition(ConditionNode),
    And(Vec<ExprNode>),
    Or(Vec<ExprNode>),
    Not(Box<ExprNode>),
}

impl ExprNode {
    pub fn evaluate(&self, flow: &Flow) -> bool {
        match self {
            ExprNode::Condition(cond) => cond.evaluate(flow),
            ExprNode::And(children) => children.iter().all(|c| c.evaluate(flow)),
            ExprNode::Or(children) => children.iter().any(|c| c.evaluate(flow)),
            ExprNode::Not(child) => !child.evaluate(flow),
        }
    }
}
