//! NetFlow v5 decoding. The layout is fixed: a 24-byte header followed by
//! `count` records of 48 bytes each.
//! Reference: https://netflow.caligare.com/netflow_v5.htm

use super::{be_u16, be_u32, ParseError};
use chrono::{DateTime, Duration, Utc};
use flowscope_types::{Flow, FlowVersion};
use std::net::{IpAddr, Ipv4Addr};

const HEADER_SIZE: usize = 24;
const RECORD_SIZE: usize = 48;

// Record layout:
//   0-3  src addr          24-27 first (uptime ms)
//   4-7  dst addr          28-31 last (uptime ms)
//   8-11 next hop          32-33 src port
//  12-13 input if          34-35 dst port
//  14-15 output if         36    pad, 37 tcp flags, 38 proto, 39 tos
//  16-19 packets           40-41 src as, 42-43 dst as
//  20-23 octets            44 src mask, 45 dst mask, 46-47 pad

pub(super) fn parse(data: &[u8], exporter: IpAddr) -> Result<Vec<Flow>, ParseError> {
    if data.len() < HEADER_SIZE {
        return Err(ParseError::TruncatedPacket {
            expected: HEADER_SIZE,
            actual: data.len(),
        });
    }

    let count = be_u16(data, 2) as usize;
    let sys_uptime = be_u32(data, 4);
    let unix_secs = be_u32(data, 8);
    let unix_nsecs = be_u32(data, 12);

    let base_time = DateTime::from_timestamp(unix_secs as i64, unix_nsecs)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let boot_time = base_time - Duration::milliseconds(sys_uptime as i64);

    let expected = HEADER_SIZE + count * RECORD_SIZE;
    if data.len() < expected {
        return Err(ParseError::TruncatedPacket {
            expected,
            actual: data.len(),
        });
    }

    let now = Utc::now();
    let mut flows = Vec::with_capacity(count);

    for i in 0..count {
        let record = &data[HEADER_SIZE + i * RECORD_SIZE..HEADER_SIZE + (i + 1) * RECORD_SIZE];

        let first_uptime = be_u32(record, 24);
        let last_uptime = be_u32(record, 28);

        flows.push(Flow {
            version: FlowVersion::V5,
            src_addr: IpAddr::V4(Ipv4Addr::new(record[0], record[1], record[2], record[3])),
            dst_addr: IpAddr::V4(Ipv4Addr::new(record[4], record[5], record[6], record[7])),
            src_port: be_u16(record, 32),
            dst_port: be_u16(record, 34),
            protocol: record[38],
            packets: be_u32(record, 16) as u64,
            bytes: be_u32(record, 20) as u64,
            start_time: boot_time + Duration::milliseconds(first_uptime as i64),
            end_time: boot_time + Duration::milliseconds(last_uptime as i64),
            tcp_flags: record[37],
            // 16-bit on the wire, widened for consistency with v9/IPFIX.
            src_as: be_u16(record, 40) as u32,
            dst_as: be_u16(record, 42) as u32,
            input_if: be_u16(record, 12),
            output_if: be_u16(record, 14),
            exporter_ip: exporter,
            received_at: now,
            last_accessed: None,
        });
    }

    Ok(flows)
}
