//! The ingest task: single consumer of the datagram channel, sole owner
//! of the parser and its template caches.

use crate::listener::Datagram;
use crate::parser::FlowParser;
use crate::store::FlowStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Parses datagrams into flows and feeds the store until the channel
/// closes. A malformed datagram is logged and dropped; it never affects
/// its neighbors or the store.
pub async fn run_ingest(
    mut rx: mpsc::Receiver<Datagram>,
    store: Arc<FlowStore>,
    debug_flows: bool,
) {
    let mut parser = FlowParser::new();

    while let Some(datagram) = rx.recv().await {
        match parser.parse(&datagram.data, datagram.source.ip()) {
            Ok(flows) => {
                if flows.is_empty() {
                    continue;
                }
                if debug_flows {
                    for flow in &flows {
                        info!(
                            "{} {}:{} -> {}:{} {} {}B/{}p",
                            flow.version,
                            flow.src_addr,
                            flow.src_port,
                            flow.dst_addr,
                            flow.dst_port,
                            flow.protocol_name(),
                            flow.bytes,
                            flow.packets
                        );
                    }
                }
                store.add(flows);
            }
            Err(e) => {
                debug!("Dropping datagram from {}: {e}", datagram.source);
            }
        }
    }

    info!("Ingest channel closed, parser task exiting");
}
