use clap::Parser;

use mpvrc_proto::config::Config;
use mpvrc_tui::app::App;

/// Terminal remote control for an mpv served by mpvrc-daemon.
#[derive(Debug, Parser)]
#[command(name = "mpvrc", version)]
struct Args {
    /// Backend origin, e.g. http://192.168.1.20:8080 (overrides config).
    #[arg(long)]
    backend: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let data_dir = mpvrc_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("tui.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // Allow RUST_LOG override; keep HTTP client internals quiet by default.
    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "debug,hyper_util=warn,reqwest=warn,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    eprintln!("mpvrc log: {}", log_path.display());
    tracing::info!("mpvrc starting");

    let config = Config::load().unwrap_or_default();
    let backend_url = args.backend.unwrap_or(config.client.backend_url);
    tracing::info!("backend: {}", backend_url);

    App::new(&backend_url).run().await
}
