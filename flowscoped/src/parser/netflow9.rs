//! NetFlow v9 decoding (RFC 3954). Templates arrive in-band; data
//! flowsets seen before their template are dropped until the exporter
//! re-announces it.

use super::field_types::*;
use super::{be_u16, be_u32, read_uint, FieldDef, FlowParser, ParseError, Template};
use chrono::{DateTime, Duration, Utc};
use flowscope_types::{Flow, FlowVersion};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::trace;

const HEADER_SIZE: usize = 20;
const FLOWSET_HEADER_SIZE: usize = 4;

// Header: version(2) count(2) sys_uptime(4) unix_secs(4) sequence(4)
// source_id(4)

pub(super) fn parse(
    parser: &mut FlowParser,
    data: &[u8],
    exporter: IpAddr,
) -> Result<Vec<Flow>, ParseError> {
    if data.len() < HEADER_SIZE {
        return Err(ParseError::TruncatedPacket {
            expected: HEADER_SIZE,
            actual: data.len(),
        });
    }

    let count = be_u16(data, 2) as usize;
    let sys_uptime = be_u32(data, 4);
    let unix_secs = be_u32(data, 8);
    let source_id = be_u32(data, 16);

    let base_time =
        DateTime::from_timestamp(unix_secs as i64, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let boot_time = base_time - Duration::milliseconds(sys_uptime as i64);

    let mut flows = Vec::new();
    let mut offset = HEADER_SIZE;

    for _ in 0..count {
        if offset + FLOWSET_HEADER_SIZE > data.len() {
            break;
        }
        let flowset_id = be_u16(data, offset);
        let flowset_len = be_u16(data, offset + 2) as usize;

        if flowset_len < FLOWSET_HEADER_SIZE || offset + flowset_len > data.len() {
            break;
        }
        let flowset = &data[offset + FLOWSET_HEADER_SIZE..offset + flowset_len];

        match flowset_id {
            0 => parse_templates(parser, flowset, source_id),
            1 => {} // Options Template Flowset: parsed past, not interpreted
            id if id >= 256 => {
                if let Some(template) = parser
                    .v9_templates
                    .get(&source_id)
                    .and_then(|templates| templates.get(&id))
                {
                    parse_data_flowset(flowset, template, exporter, boot_time, &mut flows);
                } else {
                    trace!("No template {id} for source {source_id} yet, dropping data flowset");
                }
            }
            _ => {}
        }

        offset += flowset_len;
    }

    Ok(flows)
}

fn parse_templates(parser: &mut FlowParser, data: &[u8], source_id: u32) {
    let mut offset = 0;

    while offset + 4 <= data.len() {
        let template_id = be_u16(data, offset);
        let field_count = be_u16(data, offset + 2) as usize;
        offset += 4;

        if offset + field_count * 4 > data.len() {
            break;
        }

        let mut template = Template {
            id: template_id,
            fields: Vec::with_capacity(field_count),
            length: 0,
        };

        for _ in 0..field_count {
            let field_type = be_u16(data, offset);
            let length = be_u16(data, offset + 2);
            template.fields.push(FieldDef {
                field_type,
                length,
                enterprise: false,
            });
            template.length += length as usize;
            offset += 4;
        }

        trace!(
            "Installed v9 template {template_id} for source {source_id} ({} bytes/record)",
            template.length
        );
        parser
            .v9_templates_mut(source_id)
            .insert(template_id, template);
    }
}

fn parse_data_flowset(
    data: &[u8],
    template: &Template,
    exporter: IpAddr,
    boot_time: DateTime<Utc>,
    flows: &mut Vec<Flow>,
) {
    let record_len = template.length;
    if record_len == 0 {
        return;
    }

    // Trailing bytes shorter than one record are padding.
    let mut offset = 0;
    while offset + record_len <= data.len() {
        if let Some(flow) = parse_record(&data[offset..offset + record_len], template, exporter, boot_time)
        {
            flows.push(flow);
        }
        offset += record_len;
    }
}

fn parse_record(
    record: &[u8],
    template: &Template,
    exporter: IpAddr,
    boot_time: DateTime<Utc>,
) -> Option<Flow> {
    let mut flow = Flow {
        version: FlowVersion::V9,
        exporter_ip: exporter,
        received_at: Utc::now(),
        ..Default::default()
    };

    let mut offset = 0;
    for field in &template.fields {
        let len = field.length as usize;
        if offset + len > record.len() {
            return None;
        }
        let field_data = &record[offset..offset + len];
        decode_field(field, field_data, &mut flow, boot_time);
        offset += len;
    }

    Some(flow)
}

/// Applies one template field to the flow under construction. Shared with
/// the IPFIX decoder, which uses the same standard id space.
pub(super) fn decode_field(
    field: &FieldDef,
    field_data: &[u8],
    flow: &mut Flow,
    boot_time: DateTime<Utc>,
) {
    if field.enterprise {
        return;
    }
    match field.field_type {
        IPV4_SRC_ADDR => {
            if let Ok(octets) = <[u8; 4]>::try_from(field_data) {
                flow.src_addr = IpAddr::V4(Ipv4Addr::from(octets));
            }
        }
        IPV4_DST_ADDR => {
            if let Ok(octets) = <[u8; 4]>::try_from(field_data) {
                flow.dst_addr = IpAddr::V4(Ipv4Addr::from(octets));
            }
        }
        IPV6_SRC_ADDR => {
            if let Ok(octets) = <[u8; 16]>::try_from(field_data) {
                flow.src_addr = IpAddr::V6(Ipv6Addr::from(octets));
            }
        }
        IPV6_DST_ADDR => {
            if let Ok(octets) = <[u8; 16]>::try_from(field_data) {
                flow.dst_addr = IpAddr::V6(Ipv6Addr::from(octets));
            }
        }
        L4_SRC_PORT => flow.src_port = read_uint(field_data) as u16,
        L4_DST_PORT => flow.dst_port = read_uint(field_data) as u16,
        PROTOCOL => {
            if let Some(b) = field_data.first() {
                flow.protocol = *b;
            }
        }
        IN_BYTES => flow.bytes = read_uint(field_data),
        IN_PKTS => flow.packets = read_uint(field_data),
        TCP_FLAGS => {
            // 1 or 2 bytes on the wire; the flags ride in the low byte.
            if let Some(b) = field_data.last() {
                flow.tcp_flags = *b;
            }
        }
        SRC_AS => flow.src_as = read_uint(field_data) as u32,
        DST_AS => flow.dst_as = read_uint(field_data) as u32,
        INPUT_SNMP => flow.input_if = read_uint(field_data) as u16,
        OUTPUT_SNMP => flow.output_if = read_uint(field_data) as u16,
        FIRST_SWITCHED => {
            if field_data.len() == 4 {
                let uptime = be_u32(field_data, 0);
                flow.start_time = boot_time + Duration::milliseconds(uptime as i64);
            }
        }
        LAST_SWITCHED => {
            if field_data.len() == 4 {
                let uptime = be_u32(field_data, 0);
                flow.end_time = boot_time + Duration::milliseconds(uptime as i64);
            }
        }
        FLOW_START_MILLISECONDS => {
            if field_data.len() == 8 {
                flow.start_time = DateTime::from_timestamp_millis(read_uint(field_data) as i64)
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
            }
        }
        FLOW_END_MILLISECONDS => {
            if field_data.len() == 8 {
                flow.end_time = DateTime::from_timestamp_millis(read_uint(field_data) as i64)
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// Header + one template flowset announcing template 256 with
    /// {IPV4_SRC_ADDR:4, IPV4_DST_ADDR:4, PROTOCOL:1, IN_BYTES:4}.
    pub(crate) fn template_datagram() -> Vec<u8> {
        let mut data = header(1);
        data.extend_from_slice(&0u16.to_be_bytes()); // flowset id 0
        data.extend_from_slice(&24u16.to_be_bytes()); // flowset length
        data.extend_from_slice(&256u16.to_be_bytes()); // template id
        data.extend_from_slice(&4u16.to_be_bytes()); // field count
        for (ty, len) in [
            (IPV4_SRC_ADDR, 4u16),
            (IPV4_DST_ADDR, 4),
            (PROTOCOL, 1),
            (IN_BYTES, 4),
        ] {
            data.extend_from_slice(&ty.to_be_bytes());
            data.extend_from_slice(&len.to_be_bytes());
        }
        data
    }

    /// Header + one data flowset for template 256 with two records.
    pub(crate) fn data_datagram() -> Vec<u8> {
        let mut data = header(1);
        data.extend_from_slice(&256u16.to_be_bytes());
        data.extend_from_slice(&30u16.to_be_bytes()); // 4 + 2*13
        for (last_octet, bytes) in [(1u8, 1000u32), (2, 2000)] {
            data.extend_from_slice(&[10, 0, 0, last_octet]);
            data.extend_from_slice(&[1, 1, 1, 1]);
            data.push(6);
            data.extend_from_slice(&bytes.to_be_bytes());
        }
        data
    }

    fn header(count: u16) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&9u16.to_be_bytes());
        data.extend_from_slice(&count.to_be_bytes());
        data.extend_from_slice(&60_000u32.to_be_bytes()); // sys uptime
        data.extend_from_slice(&1_700_000_000u32.to_be_bytes()); // unix secs
        data.extend_from_slice(&7u32.to_be_bytes()); // sequence
        data.extend_from_slice(&99u32.to_be_bytes()); // source id
        data
    }

    #[test]
    fn test_template_then_data() {
        let exporter: IpAddr = "192.0.2.9".parse().unwrap();
        let mut parser = FlowParser::new();

        // Template-only datagram produces no flows.
        let flows = parser.parse(&template_datagram(), exporter).unwrap();
        assert!(flows.is_empty());

        // Matching data flowset decodes both records.
        let flows = parser.parse(&data_datagram(), exporter).unwrap();
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0].version, FlowVersion::V9);
        assert_eq!(flows[0].src_addr, "10.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(flows[0].dst_addr, "1.1.1.1".parse::<IpAddr>().unwrap());
        assert_eq!(flows[0].protocol, 6);
        assert_eq!(flows[0].bytes, 1000);
        assert_eq!(flows[1].bytes, 2000);

        // The template stays cached for later datagrams.
        let flows = parser.parse(&data_datagram(), exporter).unwrap();
        assert_eq!(flows.len(), 2);
    }

    #[test]
    fn test_data_before_template_is_silent() {
        let mut parser = FlowParser::new();
        let flows = parser
            .parse(&data_datagram(), "192.0.2.9".parse().unwrap())
            .unwrap();
        assert!(flows.is_empty());
    }

    #[test]
    fn test_template_cache_is_per_source_id() {
        let exporter: IpAddr = "192.0.2.9".parse().unwrap();
        let mut parser = FlowParser::new();
        parser.parse(&template_datagram(), exporter).unwrap();

        // Same template id under a different source id is unknown.
        let mut other_source = data_datagram();
        other_source[16..20].copy_from_slice(&100u32.to_be_bytes());
        let flows = parser.parse(&other_source, exporter).unwrap();
        assert!(flows.is_empty());
    }

    #[test]
    fn test_padding_after_records_is_ignored() {
        let exporter: IpAddr = "192.0.2.9".parse().unwrap();
        let mut parser = FlowParser::new();
        parser.parse(&template_datagram(), exporter).unwrap();

        let mut data = data_datagram();
        // Grow the flowset by two padding bytes.
        data.extend_from_slice(&[0, 0]);
        let len = (data.len() - 20) as u16;
        data[22..24].copy_from_slice(&len.to_be_bytes());
        let flows = parser.parse(&data, exporter).unwrap();
        assert_eq!(flows.len(), 2);
    }

    #[test]
    fn test_uptime_relative_timestamps() {
        let exporter: IpAddr = "192.0.2.9".parse().unwrap();
        let mut parser = FlowParser::new();

        // Template with FIRST_SWITCHED/LAST_SWITCHED.
        let mut data = header(1);
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&16u16.to_be_bytes());
        data.extend_from_slice(&257u16.to_be_bytes());
        data.extend_from_slice(&2u16.to_be_bytes());
        for (ty, len) in [(FIRST_SWITCHED, 4u16), (LAST_SWITCHED, 4)] {
            data.extend_from_slice(&ty.to_be_bytes());
            data.extend_from_slice(&len.to_be_bytes());
        }
        parser.parse(&data, exporter).unwrap();

        let mut data = header(1);
        data.extend_from_slice(&257u16.to_be_bytes());
        data.extend_from_slice(&12u16.to_be_bytes());
        data.extend_from_slice(&30_000u32.to_be_bytes());
        data.extend_from_slice(&45_000u32.to_be_bytes());
        let flows = parser.parse(&data, exporter).unwrap();
        assert_eq!(flows.len(), 1);

        // boot = 1_700_000_000 - 60s; first at +30s, last at +45s.
        assert_eq!(flows[0].start_time.timestamp(), 1_700_000_000 - 30);
        assert_eq!(flows[0].end_time.timestamp(), 1_700_000_000 - 15);
    }
}
