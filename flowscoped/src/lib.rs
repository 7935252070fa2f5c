//! The FlowScope collector daemon: NetFlow v5/v9 and IPFIX ingestion, a
//! bounded in-memory flow store with hybrid eviction, a Sankey
//! aggregation engine, an HTTP API, and a terminal UI.

pub mod display;
pub mod ingest;
pub mod listener;
pub mod parser;
pub mod sankey;
pub mod store;
pub mod tui;
pub mod web;
