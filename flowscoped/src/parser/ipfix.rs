//! IPFIX (v10, RFC 7011) decoding. Shares the standard information
//! element space with NetFlow v9; adds the enterprise bit on template
//! fields and absolute millisecond timestamps.

use super::field_types::*;
use super::{be_u16, be_u32, netflow9, FieldDef, FlowParser, ParseError, Template};
use chrono::{DateTime, Duration, Utc};
use flowscope_types::{Flow, FlowVersion};
use std::net::IpAddr;
use tracing::trace;

const HEADER_SIZE: usize = 16;
const SET_HEADER_SIZE: usize = 4;

// Header: version(2) length(2) export_time(4) sequence(4)
// observation_domain_id(4)

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

    let length = be_u16(data, 2) as usize;
    let export_time = be_u32(data, 4);
    let domain_id = be_u32(data, 12);

    if length > data.len() {
        return Err(ParseError::TruncatedPacket {
            expected: length,
            actual: data.len(),
        });
    }

    let base_time =
        DateTime::from_timestamp(export_time as i64, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let mut flows = Vec::new();
    let mut offset = HEADER_SIZE;

    while offset + SET_HEADER_SIZE <= length {
        let set_id = be_u16(data, offset);
        let set_len = be_u16(data, offset + 2) as usize;

        if set_len < SET_HEADER_SIZE || offset + set_len > length {
            break;
        }
        let set = &data[offset + SET_HEADER_SIZE..offset + set_len];

        match set_id {
            2 => parse_templates(parser, set, domain_id),
            3 => {} // Options Template Set: parsed past, not interpreted
            id if id >= 256 => {
                if let Some(template) = parser
                    .ipfix_templates
                    .get(&domain_id)
                    .and_then(|templates| templates.get(&id))
                {
                    parse_data_set(set, template, exporter, base_time, &mut flows);
                } else {
                    trace!("No template {id} for domain {domain_id} yet, dropping data set");
                }
            }
            _ => {}
        }

        offset += set_len;
    }

    Ok(flows)
}

fn parse_templates(parser: &mut FlowParser, data: &[u8], domain_id: u32) {
    let mut offset = 0;

    while offset + 4 <= data.len() {
        let template_id = be_u16(data, offset);
        let field_count = be_u16(data, offset + 2) as usize;
        offset += 4;

        let mut template = Template {
            id: template_id,
            fields: Vec::with_capacity(field_count),
            length: 0,
        };

        for _ in 0..field_count {
            if offset + 4 > data.len() {
                break;
            }
            let raw_type = be_u16(data, offset);
            let length = be_u16(data, offset + 2);
            offset += 4;

            // High bit marks an enterprise-specific element: a 4-byte
            // enterprise number follows, and the field's value is skipped
            // over rather than interpreted.
            let enterprise = raw_type & 0x8000 != 0;
            if enterprise {
                if offset + 4 > data.len() {
                    break;
                }
                offset += 4;
            }

            template.fields.push(FieldDef {
                field_type: raw_type & 0x7fff,
                length,
                enterprise,
            });
            template.length += length as usize;
        }

        trace!(
            "Installed IPFIX template {template_id} for domain {domain_id} ({} bytes/record)",
            template.length
        );
        parser
            .ipfix_templates_mut(domain_id)
            .insert(template_id, template);
    }
}

fn parse_data_set(
    data: &[u8],
    template: &Template,
    exporter: IpAddr,
    base_time: DateTime<Utc>,
    flows: &mut Vec<Flow>,
) {
    let record_len = template.length;
    if record_len == 0 {
        return;
    }

    let mut offset = 0;
    while offset + record_len <= data.len() {
        if let Some(flow) =
            parse_record(&data[offset..offset + record_len], template, exporter, base_time)
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
    base_time: DateTime<Utc>,
) -> Option<Flow> {
    let mut flow = Flow {
        version: FlowVersion::Ipfix,
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

        // 21/22 are sysUptime deltas relative to the export time here,
        // unlike v9 where they are absolute offsets from boot.
        match field.field_type {
            FIRST_SWITCHED if !field.enterprise && len == 4 => {
                let uptime = be_u32(field_data, 0);
                flow.start_time = base_time - Duration::milliseconds(uptime as i64);
            }
            LAST_SWITCHED if !field.enterprise && len == 4 => {
                let uptime = be_u32(field_data, 0);
                flow.end_time = base_time - Duration::milliseconds(uptime as i64);
            }
            _ => netflow9::decode_field(field, field_data, &mut flow, base_time),
        }

        offset += len;
    }

    Some(flow)
}
