use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;

use netscan_view::app::{AppSettings, ScanDashboardApp, ScanForm};
use netscan_view::scan::DEFAULT_BACKEND_URL;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Base URL of the scan backend
    #[arg(long, default_value = DEFAULT_BACKEND_URL)]
    backend: String,

    /// Host to pre-fill in the scan form
    #[arg(long, default_value = "")]
    target: String,

    #[arg(long, default_value_t = 1)]
    start: u32,

    #[arg(long, default_value_t = 1024)]
    end: u32,

    /// Thread hint forwarded to the backend
    #[arg(long, default_value_t = 100)]
    threads: u32,

    /// Launch the scan as soon as the window opens
    #[arg(long)]
    autostart: bool,

    /// Seconds of stream silence before the connection is considered dead
    #[arg(long, default_value_t = 45)]
    stream_idle_timeout_secs: u64,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let settings = AppSettings {
        backend_url: args.backend,
        stream_idle_timeout: Duration::from_secs(args.stream_idle_timeout_secs.max(1)),
        form: ScanForm {
            target: args.target,
            start_port: args.start,
            end_port: args.end,
            threads: args.threads,
        },
        autostart: args.autostart,
    };
    tracing::info!(backend = %settings.backend_url, "starting dashboard");

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default().with_inner_size([1440.0, 920.0]),
        ..Default::default()
    };

    eframe::run_native(
        "netscan-view",
        options,
        Box::new(move |cc| Ok(Box::new(ScanDashboardApp::new(cc, settings)))),
    )
    .map_err(|error| anyhow::anyhow!("{error}"))
    .context("dashboard window failed")
}
