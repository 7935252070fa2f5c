//! The DNS oracle: best-effort IP-to-hostname resolution with a bounded
//! cache, well-known service-name tables, and an optional poller that
//! back-fills hostnames from a Technitium DNS server's query logs.

mod dns;
mod services;
pub mod technitium;

pub use dns::{cached_hostname, insert_hostname, resolve_hostname};
pub use services::{is_known_service, service_by_port, service_name};
