//! UDP ingress. A receive task reads datagrams off the socket and pushes
//! them over a bounded channel to the ingest task. When the channel is
//! full the datagram is dropped, never blocking the socket loop.

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const DEFAULT_PORT: u16 = 2055;
pub const MAX_PACKET_SIZE: usize = 65535;
const RECV_BUFFER_SIZE: usize = 1024 * 1024;
const CHANNEL_CAPACITY: usize = 1000;

/// One received export datagram with its source.
pub struct Datagram {
    pub data: Vec<u8>,
    pub source: SocketAddr,
}

/// Binds the collector socket and spawns the receive loop. Returns the
/// channel the ingest task reads from.
pub async fn spawn_listener(port: u16) -> Result<mpsc::Receiver<Datagram>> {
    let port = if port == 0 { DEFAULT_PORT } else { port };
    let socket = bind_socket(port)?;
    info!("Listening for NetFlow/IPFIX on UDP port {port}");

    let (tx, rx) = mpsc::channel::<Datagram>(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        let mut dropped: u64 = 0;

        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, source)) => {
                    if len == 0 {
                        continue;
                    }
                    let datagram = Datagram {
                        data: buf[..len].to_vec(),
                        source,
                    };
                    match tx.try_send(datagram) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            dropped += 1;
                            if dropped.is_power_of_two() {
                                debug!("Ingest channel full, dropped {dropped} datagrams so far");
                            }
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            info!("Ingest channel closed, stopping receive loop");
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!("UDP receive error: {e}");
                }
            }
        }
    });

    Ok(rx)
}

/// Binds with a bumped receive buffer. The kernel may clamp the size; a
/// refusal is logged and ignored.
fn bind_socket(port: u16) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .context("creating UDP socket")?;
    if let Err(e) = socket.set_recv_buffer_size(RECV_BUFFER_SIZE) {
        warn!("Could not set UDP receive buffer to {RECV_BUFFER_SIZE} bytes: {e}");
    }
    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    socket
        .bind(&addr.into())
        .with_context(|| format!("binding UDP port {port}"))?;
    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket.into()).context("registering UDP socket with the runtime")
}
