use anyhow::Result;
use clap::Parser;
use flowscope_resolver::technitium::TechnitiumConfig;
use flowscoped::store::{EvictionConfig, FlowStore};
use flowscoped::{display, ingest, listener, tui, web};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "flowscoped",
    version,
    about = "NetFlow v5/v9/IPFIX collector with a terminal UI and a Sankey visualizer API"
)]
struct Args {
    /// UDP port to listen on
    #[arg(long, default_value_t = listener::DEFAULT_PORT)]
    port: u16,

    /// Maximum flows to keep in memory
    #[arg(long = "max-flows", default_value_t = 100_000)]
    max_flows: usize,

    /// Display refresh rate
    #[arg(long, default_value = "500ms", value_parser = humantime::parse_duration)]
    refresh: Duration,

    /// Use the simple line-oriented display instead of the interactive TUI
    #[arg(long)]
    simple: bool,

    /// Percent of max-flows to protect as elephant flows (1.0 = 1%)
    #[arg(long = "topk-percent", default_value_t = 1.0)]
    topk_percent: f64,

    /// Protect recently viewed flows for this duration
    #[arg(long = "lru-window", default_value = "5m", value_parser = humantime::parse_duration)]
    lru_window: Duration,

    /// IPv6 prefix length used when grouping addresses into subnets
    #[arg(long = "prefix-len", default_value_t = 56, value_parser = parse_prefix_len)]
    prefix_len: u8,

    /// HTTP API port (0 disables the API)
    #[arg(long = "api-port", default_value_t = 0)]
    api_port: u16,

    /// Log every parsed flow
    #[arg(long = "debug-flows")]
    debug_flows: bool,

    /// Technitium DNS server URL for hostname back-fill, e.g. http://192.168.1.1:5380
    #[arg(long = "dns-server")]
    dns_server: Option<String>,

    /// Technitium API token
    #[arg(long = "dns-token")]
    dns_token: Option<String>,

    /// Technitium query-log app name
    #[arg(long = "dns-app")]
    dns_app: Option<String>,

    /// DNS query-log poll interval
    #[arg(long = "dns-poll", default_value = "5s", value_parser = humantime::parse_duration)]
    dns_poll: Duration,
}

fn parse_prefix_len(text: &str) -> Result<u8, String> {
    let value: u8 = text.parse().map_err(|_| "not a number".to_string())?;
    if [48, 56, 60, 64].contains(&value) {
        Ok(value)
    } else {
        Err("prefix length must be one of 48, 56, 60, 64".to_string())
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.simple { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let eviction_config = EvictionConfig {
        top_k_percent: args.topk_percent,
        lru_window: chrono::Duration::from_std(args.lru_window)?,
    };
    let store = Arc::new(FlowStore::with_config(args.max_flows, eviction_config));

    // Back-end tasks live on this runtime; the UI owns the main thread.
    let runtime = tokio::runtime::Runtime::new()?;

    // Bind before the UI starts so a taken port fails the process.
    let datagrams = runtime.block_on(listener::spawn_listener(args.port))?;
    runtime.spawn(ingest::run_ingest(
        datagrams,
        store.clone(),
        args.debug_flows,
    ));

    if args.api_port > 0 {
        let api_store = store.clone();
        let api_port = args.api_port;
        let prefix_len = args.prefix_len;
        runtime.spawn(async move {
            if let Err(e) = web::serve(api_store, api_port, prefix_len).await {
                error!("API server failed: {e:#}");
            }
        });
    }

    if let (Some(server), Some(token)) = (args.dns_server.clone(), args.dns_token.clone()) {
        let mut config = TechnitiumConfig::new(server, token);
        if let Some(app) = args.dns_app.clone() {
            config.app_name = app;
        }
        config.poll_interval = args.dns_poll;
        runtime.spawn(flowscope_resolver::technitium::poll_query_logs(config));
    }

    info!(
        "Collector started on UDP port {} (max {} flows)",
        args.port, args.max_flows
    );

    if args.simple {
        println!(
            "NetFlow/IPFIX collector started on UDP port {} (simple mode)",
            args.port
        );
        println!("Supported versions: NetFlow v5, v9, IPFIX (v10)");
        println!("Press Ctrl+C to exit");

        let running = Arc::new(AtomicBool::new(true));
        let ctrlc_running = running.clone();
        ctrlc::set_handler(move || {
            ctrlc_running.store(false, Ordering::Relaxed);
        })?;
        display::run_simple(store.clone(), args.refresh, running);
    } else {
        tui::run(store.clone(), args.refresh)?;
    }

    display::print_final_stats(&store);
    drop(runtime);
    Ok(())
}
