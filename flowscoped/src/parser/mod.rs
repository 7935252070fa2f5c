//! Wire parsers for the supported export protocols. One UDP payload in,
//! zero or more flow records out; the template caches for the
//! template-driven protocols live here and survive for the process
//! lifetime.

mod field_types;
mod ipfix;
mod netflow5;
mod netflow9;

use flowscope_types::Flow;
use std::collections::HashMap;
use std::net::IpAddr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The payload is shorter than a declared or minimum length.
    #[error("truncated packet: expected {expected} bytes, got {actual}")]
    TruncatedPacket { expected: usize, actual: usize },
    /// The version word is not NetFlow v5, v9, or IPFIX.
    #[error("unsupported NetFlow version: {0}")]
    UnsupportedVersion(u16),
}

/// One field of a template: the information element id and its on-wire
/// length. Enterprise-specific IPFIX fields are carried for alignment but
/// never interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldDef {
    pub field_type: u16,
    pub length: u16,
    pub enterprise: bool,
}

/// A NetFlow v9 / IPFIX template: the decode recipe for data records from
/// one exporter stream.
#[derive(Clone, Debug)]
pub struct Template {
    pub id: u16,
    pub fields: Vec<FieldDef>,
    /// Total record length in bytes.
    pub length: usize,
}

/// Parses NetFlow v5/v9 and IPFIX datagrams. Owns the template caches,
/// keyed by the v9 source id or the IPFIX observation domain id, then by
/// template id. Confine one instance to the ingest task; it needs no lock.
pub struct FlowParser {
    v9_templates: HashMap<u32, HashMap<u16, Template>>,
    ipfix_templates: HashMap<u32, HashMap<u16, Template>>,
}

impl FlowParser {
    pub fn new() -> Self {
        Self {
            v9_templates: HashMap::new(),
            ipfix_templates: HashMap::new(),
        }
    }

    /// Parses one datagram. Failures are all-or-nothing: an error returns
    /// no flows, and a data set without a cached template silently yields
    /// none.
    pub fn parse(&mut self, data: &[u8], exporter: IpAddr) -> Result<Vec<Flow>, ParseError> {
        if data.len() < 2 {
            return Err(ParseError::TruncatedPacket {
                expected: 2,
                actual: data.len(),
            });
        }

        let version = u16::from_be_bytes([data[0], data[1]]);
        match version {
            5 => netflow5::parse(data, exporter),
            9 => netflow9::parse(self, data, exporter),
            10 => ipfix::parse(self, data, exporter),
            other => Err(ParseError::UnsupportedVersion(other)),
        }
    }

    fn v9_templates_mut(&mut self, source_id: u32) -> &mut HashMap<u16, Template> {
        self.v9_templates.entry(source_id).or_default()
    }

    fn ipfix_templates_mut(&mut self, domain_id: u32) -> &mut HashMap<u16, Template> {
        self.ipfix_templates.entry(domain_id).or_default()
    }
}

impl Default for FlowParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a counter of whatever width the template declared, zero-extended
/// to 64 bits. Unfamiliar widths decode to 0 so the rest of the record
/// still aligns.
pub(crate) fn read_uint(data: &[u8]) -> u64 {
    match data.len() {
        1 => data[0] as u64,
        2 => u16::from_be_bytes([data[0], data[1]]) as u64,
        4 => u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as u64,
        8 => u64::from_be_bytes([
            data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
        ]),
        _ => 0,
    }
}

pub(crate) fn be_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

pub(crate) fn be_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_dispatch_rejects_unknown_version() {
        let mut parser = FlowParser::new();
        let err = parser
            .parse(&[0x00, 0x08, 0, 0], "10.0.0.1".parse().unwrap())
            .unwrap_err();
        assert_eq!(err, ParseError::UnsupportedVersion(8));
    }

    #[test]
    fn test_dispatch_rejects_tiny_packet() {
        let mut parser = FlowParser::new();
        let err = parser.parse(&[5], "10.0.0.1".parse().unwrap()).unwrap_err();
        assert_eq!(
            err,
            ParseError::TruncatedPacket {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_read_uint_widths() {
        assert_eq!(read_uint(&[0x7f]), 0x7f);
        assert_eq!(read_uint(&[0x01, 0x02]), 0x0102);
        assert_eq!(read_uint(&[0x01, 0x02, 0x03, 0x04]), 0x01020304);
        assert_eq!(read_uint(&[0, 0, 0, 0, 0x01, 0x02, 0x03, 0x04]), 0x01020304);
        // Odd widths zero out instead of erroring.
        assert_eq!(read_uint(&[1, 2, 3]), 0);
        assert_eq!(read_uint(&[]), 0);
    }
}
