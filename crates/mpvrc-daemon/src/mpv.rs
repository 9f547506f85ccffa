//! mpv JSON IPC driver with separated reader/writer tasks.
//!
//! ```text
//!   MpvDriver::spawn() → Child            (watched by the caller)
//!   MpvDriver::connect() / try_reconnect()
//!         │
//!         ├── writer_task   ← receives PendingRequest via mpsc, writes → socket
//!         └── reader_task   ← reads JSON lines from socket
//!                                ├── reply (has request_id) → matched oneshot::Sender
//!                                └── anything else          → MpvEvent::Notification
//! ```
//!
//! When the socket closes the reader fails every pending request and emits
//! `MpvEvent::Closed` as its last message.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use mpvrc_proto::config::MpvConfig;
use mpvrc_proto::platform;
use mpvrc_proto::protocol::PropertyName;

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

const IPC_TIMEOUT: tokio::time::Duration = tokio::time::Duration::from_secs(5);

type Reply = oneshot::Sender<anyhow::Result<Value>>;

#[derive(Default)]
struct PendingMap {
    replies: HashMap<u64, Reply>,
    /// Set by the reader on exit; nothing registered afterwards could be answered.
    closed: Option<String>,
}

type Pending = Arc<Mutex<PendingMap>>;

struct PendingRequest {
    req_id: u64,
    payload: String,
    reply: Reply,
}

/// Unsolicited traffic from one IPC connection.
#[derive(Debug, Clone, PartialEq)]
pub enum MpvEvent {
    Notification(Value),
    Closed,
}

impl MpvEvent {
    /// `Some((name, data))` for a `property-change` notification.
    pub fn as_property_change(&self) -> Option<(&str, &Value)> {
        let MpvEvent::Notification(raw) = self else {
            return None;
        };
        if raw.get("event")?.as_str()? != "property-change" {
            return None;
        }
        let name = raw.get("name")?.as_str()?;
        Some((name, raw.get("data").unwrap_or(&Value::Null)))
    }

    pub fn event_name(&self) -> Option<&str> {
        match self {
            MpvEvent::Notification(raw) => raw.get("event")?.as_str(),
            MpvEvent::Closed => None,
        }
    }
}

// ── handle ────────────────────────────────────────────────────────────────────

/// Cloneable handle to the writer task of one IPC connection.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    /// Send a raw command array and await mpv's reply.  Resolves to the reply's
    /// `data` field (`null` when mpv sends none).
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(IPC_TIMEOUT, reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    /// Register `observe_property` for every published player property.
    /// Must follow each fresh connection.
    pub async fn observe_properties(&self) {
        for (id, name) in PropertyName::observed().iter().enumerate() {
            match self
                .send(json!(["observe_property", id + 1, name.as_str()]))
                .await
            {
                Ok(_) => debug!("mpv: observe_property id={} name={}", id + 1, name),
                Err(e) => warn!("mpv: observe_property {} failed: {}", name, e),
            }
        }
    }
}

/// Start reader and writer tasks over any duplex byte stream.
pub fn attach<S>(stream: S, event_tx: mpsc::Sender<MpvEvent>) -> MpvHandle
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let pending: Pending = Arc::new(Mutex::new(PendingMap::default()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(write_half, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(BufReader::new(read_half), pending, event_tx));

    MpvHandle { tx: cmd_tx }
}

// ── driver ────────────────────────────────────────────────────────────────────

/// Knows how to start mpv and where its IPC socket lives.
pub struct MpvDriver {
    socket_name: String,
    config: MpvConfig,
}

impl MpvDriver {
    pub fn new(config: MpvConfig) -> Self {
        Self {
            socket_name: platform::mpv_socket_name(),
            config,
        }
    }

    /// Command-line arguments for a fresh mpv process.
    pub fn args(&self, file: Option<&str>) -> Vec<String> {
        let mut args = Vec::new();
        if self.config.force_window {
            args.push("--force-window".to_string());
        }
        args.push("--idle".to_string());
        args.push(platform::mpv_socket_arg(&self.socket_name));
        args.extend(self.config.extra_args.iter().cloned());
        if let Some(file) = file {
            args.push(file.to_string());
        }
        args
    }

    pub fn spawn(&self, file: Option<&str>) -> anyhow::Result<tokio::process::Child> {
        #[cfg(unix)]
        {
            let _ = std::fs::remove_file(&self.socket_name);
        }

        let mpv_binary = platform::find_mpv_binary(self.config.binary.as_deref())
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;
        info!("mpv: spawning {}", mpv_binary.display());

        let child = tokio::process::Command::new(mpv_binary)
            .args(self.args(file))
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        Ok(child)
    }

    /// Connect to a freshly spawned mpv, waiting for its socket to appear.
    #[cfg(unix)]
    pub async fn connect(&self, event_tx: mpsc::Sender<MpvEvent>) -> anyhow::Result<MpvHandle> {
        let socket_path = PathBuf::from(&self.socket_name);
        for _ in 0..50 {
            if socket_path.exists() {
                if let Ok(stream) = UnixStream::connect(&socket_path).await {
                    info!("mpv: connected to IPC socket");
                    return Ok(attach(stream, event_tx));
                }
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        }
        anyhow::bail!("mpv IPC socket {} did not appear", socket_path.display())
    }

    /// One connection attempt to an already-running mpv; never spawns.
    #[cfg(unix)]
    pub async fn try_reconnect(&self, event_tx: mpsc::Sender<MpvEvent>) -> Option<MpvHandle> {
        let socket_path = PathBuf::from(&self.socket_name);
        if !socket_path.exists() {
            return None;
        }
        match UnixStream::connect(&socket_path).await {
            Ok(stream) => {
                info!("mpv: reconnected to existing IPC socket");
                Some(attach(stream, event_tx))
            }
            Err(e) => {
                warn!("mpv: failed to reconnect: {}", e);
                None
            }
        }
    }

    #[cfg(windows)]
    fn pipe_path(&self) -> String {
        format!(r"\\.\pipe\{}", self.socket_name)
    }

    #[cfg(windows)]
    pub async fn connect(&self, event_tx: mpsc::Sender<MpvEvent>) -> anyhow::Result<MpvHandle> {
        let pipe_path = self.pipe_path();
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if let Ok(client) = ClientOptions::new().open(&pipe_path) {
                info!("mpv: connected to named pipe");
                return Ok(attach(client, event_tx));
            }
        }
        anyhow::bail!("mpv named pipe {} did not appear", pipe_path)
    }

    #[cfg(windows)]
    pub async fn try_reconnect(&self, event_tx: mpsc::Sender<MpvEvent>) -> Option<MpvHandle> {
        match ClientOptions::new().open(self.pipe_path()) {
            Ok(client) => {
                info!("mpv: reconnected to named pipe");
                Some(attach(client, event_tx))
            }
            Err(e) => {
                warn!("mpv: failed to reconnect to named pipe: {}", e);
                None
            }
        }
    }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn fail_pending(pending: &Pending, reason: &str) {
    let mut map = pending.lock().await;
    map.closed = Some(reason.to_string());
    for (_, tx) in map.replies.drain() {
        let _ = tx.send(Err(anyhow::anyhow!("{}", reason)));
    }
}

async fn reader_task<R>(mut reader: BufReader<R>, pending: Pending, event_tx: mpsc::Sender<MpvEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_pending(&pending, "mpv IPC connection closed").await;
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(Value::as_u64) {
                    let mut map = pending.lock().await;
                    let Some(tx) = map.replies.remove(&req_id) else {
                        debug!("mpv reader: response for unknown req={}", req_id);
                        continue;
                    };
                    let result = match val.get("error").and_then(Value::as_str) {
                        Some("success") => Ok(val.get("data").cloned().unwrap_or(Value::Null)),
                        other => {
                            let err = other.unwrap_or("unknown error");
                            debug!("mpv reader: response req={} err={}", req_id, err);
                            Err(anyhow::anyhow!("mpv error: {}", err))
                        }
                    };
                    let _ = tx.send(result);
                } else {
                    debug!("mpv reader: event {}", trimmed);
                    let _ = event_tx.send(MpvEvent::Notification(val)).await;
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_pending(&pending, &format!("mpv IPC read error: {}", e)).await;
                break;
            }
        }
    }
    let _ = event_tx.send(MpvEvent::Closed).await;
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: Pending)
where
    W: AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register before writing so the reader can always match the reply
        {
            let mut map = pending.lock().await;
            if let Some(reason) = &map.closed {
                let _ = req.reply.send(Err(anyhow::anyhow!("{}", reason)));
                break;
            }
            map.replies.insert(req.req_id, req.reply);
        }

        debug!("mpv writer: send req={} payload={}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.replies.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}
