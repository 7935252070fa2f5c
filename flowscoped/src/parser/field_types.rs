//! NetFlow v9 / IPFIX information element ids. The two protocols share the
//! standard id space for the fields this collector decodes.

pub(crate) const IN_BYTES: u16 = 1;
pub(crate) const IN_PKTS: u16 = 2;
pub(crate) const PROTOCOL: u16 = 4;
pub(crate) const TCP_FLAGS: u16 = 6;
pub(crate) const L4_SRC_PORT: u16 = 7;
pub(crate) const IPV4_SRC_ADDR: u16 = 8;
pub(crate) const INPUT_SNMP: u16 = 10;
pub(crate) const L4_DST_PORT: u16 = 11;
pub(crate) const IPV4_DST_ADDR: u16 = 12;
pub(crate) const OUTPUT_SNMP: u16 = 14;
pub(crate) const SRC_AS: u16 = 16;
pub(crate) const DST_AS: u16 = 17;
pub(crate) const LAST_SWITCHED: u16 = 21;
pub(crate) const FIRST_SWITCHED: u16 = 22;
pub(crate) const IPV6_SRC_ADDR: u16 = 27;
pub(crate) const IPV6_DST_ADDR: u16 = 28;
pub(crate) const FLOW_START_MILLISECONDS: u16 = 152;
pub(crate) const FLOW_END_MILLISECONDS: u16 = 153;
