mod core;
mod fs;
mod globals;
mod http;
mod mpv;

use std::path::PathBuf;

use clap::Parser;
use mpvrc_proto::config::Config;
use mpvrc_proto::protocol::CommandForm;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Serve a running mpv over HTTP: `/events`, `/command` and `/file-system`.
#[derive(Debug, Parser)]
#[command(name = "mpvrc-daemon", version)]
struct Args {
    /// File or URL for mpv to open on startup.
    file: Option<String>,
    /// Listen port (overrides config).
    #[arg(long)]
    port: Option<u16>,
    /// Listen address (overrides config).
    #[arg(long)]
    bind: Option<String>,
    /// Path to the mpv binary (overrides config).
    #[arg(long)]
    mpv: Option<PathBuf>,
}

fn init_logging() -> anyhow::Result<PathBuf> {
    let data_dir = mpvrc_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,mpvrc_daemon=debug")),
        )
        .init();

    Ok(log_path)
}

/// Make a local file argument absolute so another process can open it.
fn absolute_target(file: &str) -> String {
    if file.contains("://") {
        return file.to_string();
    }
    match std::path::absolute(file) {
        Ok(path) => path.display().to_string(),
        Err(_) => file.to_string(),
    }
}

/// Hand the file argument to the daemon already listening on `port`.
async fn redirect_to_running_instance(port: u16, file: Option<&str>) -> anyhow::Result<()> {
    let Some(file) = file else {
        info!("another instance already serves port {}, nothing to forward", port);
        return Ok(());
    };
    let target = absolute_target(file);
    info!("forwarding {} to the running instance on port {}", target, port);

    let form = CommandForm::encode(&[json!("loadfile"), json!(target)])?;
    let response = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/command", port))
        .form(&form)
        .send()
        .await?;
    if !response.status().is_success() {
        anyhow::bail!(
            "running instance rejected loadfile: {}",
            response.text().await.unwrap_or_default()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let log_path = init_logging()?;
    info!("Log file: {:?}", log_path);

    let mut config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());
    if let Some(port) = args.port {
        config.http.port = port;
    }
    if let Some(bind) = args.bind {
        config.http.bind_address = bind;
    }
    if let Some(mpv) = args.mpv {
        config.mpv.binary = Some(mpv);
    }

    let addr = format!("{}:{}", config.http.bind_address, config.http.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            return redirect_to_running_instance(config.http.port, args.file.as_deref()).await;
        }
        Err(e) => return Err(anyhow::anyhow!("failed to bind {}: {}", addr, e)),
    };

    let (event_tx, event_rx) = tokio::sync::mpsc::channel::<core::DaemonEvent>(256);
    let mut daemon_core = core::DaemonCore::new(&config, event_tx.clone());
    daemon_core.start_mpv(args.file.as_deref()).await?;

    let shutdown = CancellationToken::new();
    let http_handle = http::start_server(
        listener,
        http::HttpState {
            event_tx: event_tx.clone(),
            show_hidden: config.file_system.show_hidden,
        },
        shutdown.clone(),
    );

    let signal_tx = event_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received");
                let _ = signal_tx.send(core::DaemonEvent::Shutdown).await;
            }
            Err(e) => warn!("failed to listen for ctrl-c: {}", e),
        }
    });

    info!("Daemon initialised, running event loop");
    // Dropping the core closes every /events stream, letting the server drain.
    let result = daemon_core.run(event_rx).await;
    shutdown.cancel();
    if tokio::time::timeout(tokio::time::Duration::from_secs(1), http_handle)
        .await
        .is_err()
    {
        warn!("HTTP server did not stop in time");
    }
    if let Err(e) = &result {
        error!("daemon stopped with error: {}", e);
    }
    result
}
