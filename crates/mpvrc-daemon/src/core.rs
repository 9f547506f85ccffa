//! DaemonCore: single-owner event loop for the mpv connection and the
//! published property table.
//!
//! HTTP handlers, the mpv reader and the process watcher all talk to it by
//! sending `DaemonEvent`s.  Property changes go out on a broadcast channel;
//! `/events` subscribers get the startup snapshot and their receiver in the
//! same loop turn, so nothing is lost or duplicated in between.

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use mpvrc_proto::config::Config;
use mpvrc_proto::protocol::{BackendEvent, PropertyName};

use crate::globals::Globals;
use crate::mpv::{MpvDriver, MpvEvent, MpvHandle};

// ── DaemonEvent ───────────────────────────────────────────────────────────────

pub type CommandReply = oneshot::Sender<anyhow::Result<Value>>;

/// What a new `/events` subscriber starts from.
pub struct Subscription {
    pub startup: Vec<BackendEvent>,
    pub updates: broadcast::Receiver<BackendEvent>,
}

#[derive(Debug)]
pub enum DaemonEvent {
    /// Raw mpv command from `/command`.
    Command { args: Vec<Value>, reply: CommandReply },
    /// A new `/events` stream is opening.
    Subscribe { reply: oneshot::Sender<Subscription> },
    /// Traffic from IPC connection number `connection`.
    Mpv { connection: u64, event: MpvEvent },
    /// The spawned mpv process exited.
    MpvExited,
    Shutdown,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("startup", &self.startup.len())
            .finish()
    }
}

// ── DaemonCore ────────────────────────────────────────────────────────────────

pub struct DaemonCore {
    driver: MpvDriver,
    mpv_handle: Option<MpvHandle>,
    /// Bumped per IPC connection so a late `Closed` from an old one is ignored.
    connection: u64,
    /// Kills the spawned mpv when fired.
    kill_switch: Option<oneshot::Sender<()>>,
    globals: Globals,
    event_tx: mpsc::Sender<DaemonEvent>,
    broadcast_tx: broadcast::Sender<BackendEvent>,
}

impl DaemonCore {
    pub fn new(config: &Config, event_tx: mpsc::Sender<DaemonEvent>) -> Self {
        let (broadcast_tx, _) = broadcast::channel(256);
        Self {
            driver: MpvDriver::new(config.mpv.clone()),
            mpv_handle: None,
            connection: 0,
            kill_switch: None,
            globals: Globals::new(),
            event_tx,
            broadcast_tx,
        }
    }

    /// Spawn mpv (optionally with a file) and connect to it.
    pub async fn start_mpv(&mut self, file: Option<&str>) -> anyhow::Result<()> {
        let mut child = self.driver.spawn(file)?;
        debug!("mpv: pid {:?}", child.id());

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let exit_tx = self.event_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(s) => info!("mpv: process exited ({})", s),
                    Err(e) => warn!("mpv: failed to wait for process: {}", e),
                },
                _ = kill_rx => {
                    let _ = child.kill().await;
                    info!("mpv: process killed");
                }
            }
            let _ = exit_tx.send(DaemonEvent::MpvExited).await;
        });
        self.kill_switch = Some(kill_tx);

        let events = self.forward_mpv_events();
        let handle = self.driver.connect(events).await?;
        self.attach(handle);
        Ok(())
    }

    /// A fresh channel whose events come back into this loop tagged with the
    /// next connection number.
    fn forward_mpv_events(&mut self) -> mpsc::Sender<MpvEvent> {
        self.connection += 1;
        let connection = self.connection;
        let (tx, mut rx) = mpsc::channel::<MpvEvent>(256);
        let core_tx = self.event_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if core_tx
                    .send(DaemonEvent::Mpv { connection, event })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });
        tx
    }

    /// Adopt a live IPC connection and start observing properties.
    pub fn attach(&mut self, handle: MpvHandle) {
        let observer = handle.clone();
        tokio::spawn(async move { observer.observe_properties().await });
        self.mpv_handle = Some(handle);
        self.publish(BackendEvent::set(PropertyName::Connected, Value::Bool(true)));
    }

    /// Adopt a connection made by the caller (tests, embedders).  Events for
    /// it must be sent through the returned channel.
    pub fn attach_with_events(&mut self, connect: impl FnOnce(mpsc::Sender<MpvEvent>) -> MpvHandle) {
        let events = self.forward_mpv_events();
        let handle = connect(events);
        self.attach(handle);
    }

    pub fn is_connected(&self) -> bool {
        self.mpv_handle.is_some()
    }

    fn publish(&self, event: BackendEvent) {
        debug!("publish: {:?}", event);
        // No receivers is fine.
        let _ = self.broadcast_tx.send(event);
    }

    /// Run until shutdown or until the mpv process exits.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<DaemonEvent>) -> anyhow::Result<()> {
        info!("DaemonCore: starting event loop");

        loop {
            match event_rx.recv().await {
                None => {
                    info!("DaemonCore: event channel closed, shutting down");
                    break;
                }
                Some(DaemonEvent::Shutdown) => {
                    info!("DaemonCore: shutdown requested");
                    break;
                }
                Some(DaemonEvent::MpvExited) => {
                    info!("DaemonCore: mpv exited, shutting down");
                    self.kill_switch = None;
                    break;
                }
                Some(event) => self.handle(event).await,
            }
        }

        if let Some(kill) = self.kill_switch.take() {
            let _ = kill.send(());
        }
        Ok(())
    }

    pub async fn handle(&mut self, event: DaemonEvent) {
        match event {
            DaemonEvent::Command { args, reply } => self.handle_command(args, reply),
            DaemonEvent::Subscribe { reply } => {
                let subscription = self.subscribe().await;
                let _ = reply.send(subscription);
            }
            DaemonEvent::Mpv { connection, event } => self.handle_mpv_event(connection, event),
            DaemonEvent::MpvExited | DaemonEvent::Shutdown => {}
        }
    }

    fn handle_command(&self, args: Vec<Value>, reply: CommandReply) {
        let shown = Value::Array(args.clone());
        info!("DaemonCore: command {}", shown);
        let Some(handle) = self.mpv_handle.clone() else {
            let _ = reply.send(Err(anyhow::anyhow!("not connected to mpv")));
            return;
        };
        // Replies arrive through the reader task, never through this loop.
        tokio::spawn(async move {
            let result = handle.send(Value::Array(args)).await;
            if let Err(e) = &result {
                warn!("DaemonCore: command failed: {}", e);
            }
            let _ = reply.send(result);
        });
    }

    async fn subscribe(&mut self) -> Subscription {
        if self.mpv_handle.is_none() {
            let events = self.forward_mpv_events();
            if let Some(handle) = self.driver.try_reconnect(events).await {
                self.attach(handle);
            }
        }
        Subscription {
            startup: self.globals.startup_events(self.is_connected()),
            updates: self.broadcast_tx.subscribe(),
        }
    }

    fn handle_mpv_event(&mut self, connection: u64, event: MpvEvent) {
        if connection != self.connection {
            debug!("mpv event from stale connection {}", connection);
            return;
        }
        if event == MpvEvent::Closed {
            warn!("DaemonCore: mpv IPC connection lost");
            self.mpv_handle = None;
            self.publish(BackendEvent::set(PropertyName::Connected, Value::Bool(false)));
            return;
        }

        let Some((name, data)) = event.as_property_change() else {
            debug!("DaemonCore: ignoring mpv event {:?}", event.event_name());
            return;
        };
        let name = match name.parse::<PropertyName>() {
            Ok(name) if PropertyName::observed().contains(&name) => name,
            _ => {
                error!("DaemonCore: unknown property name {:?}", name);
                return;
            }
        };
        if let Some(update) = self.globals.set(name, data.clone()) {
            self.publish(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpv::tests::fake_mpv;
    use serde_json::json;

    fn core() -> (DaemonCore, mpsc::Receiver<DaemonEvent>) {
        let (tx, rx) = mpsc::channel(64);
        (DaemonCore::new(&Config::default(), tx), rx)
    }

    async fn subscribe(core: &mut DaemonCore) -> Subscription {
        let (tx, rx) = oneshot::channel();
        core.handle(DaemonEvent::Subscribe { reply: tx }).await;
        rx.await.unwrap()
    }

    fn property_change(name: &str, data: Value) -> MpvEvent {
        MpvEvent::Notification(json!({"event": "property-change", "id": 1, "name": name, "data": data}))
    }

    #[tokio::test]
    async fn command_without_mpv_fails() {
        let (mut core, _rx) = core();
        let (tx, rx) = oneshot::channel();
        core.handle(DaemonEvent::Command { args: vec![json!("stop")], reply: tx })
            .await;
        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "not connected to mpv");
    }

    #[tokio::test]
    async fn command_is_forwarded_and_answered() {
        let (mut core, _rx) = core();
        let (handle, _events, mut seen) = fake_mpv(|cmd| match cmd[0].as_str() {
            Some("get_property") => Ok(json!(12.5)),
            _ => Ok(Value::Null),
        });
        core.attach_with_events(|_| handle);

        let (tx, rx) = oneshot::channel();
        core.handle(DaemonEvent::Command {
            args: vec![json!("get_property"), json!("playback-time")],
            reply: tx,
        })
        .await;
        assert_eq!(rx.await.unwrap().unwrap(), json!(12.5));

        let mut commands = Vec::new();
        while let Ok(cmd) = seen.try_recv() {
            commands.push(cmd);
        }
        assert!(commands.contains(&json!(["get_property", "playback-time"])));
    }

    #[tokio::test]
    async fn changed_properties_are_broadcast_once() {
        let (mut core, _rx) = core();
        let (handle, _events, _seen) = fake_mpv(|_| Ok(Value::Null));
        core.attach_with_events(|_| handle);
        let mut sub = subscribe(&mut core).await;
        let connection = core.connection;

        for v in [50, 50, 80] {
            core.handle(DaemonEvent::Mpv { connection, event: property_change("volume", json!(v)) })
                .await;
        }
        assert_eq!(
            sub.updates.recv().await.unwrap(),
            BackendEvent::set(PropertyName::Volume, json!(50))
        );
        assert_eq!(
            sub.updates.recv().await.unwrap(),
            BackendEvent::set(PropertyName::Volume, json!(80))
        );
        assert!(sub.updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_and_stale_events_are_dropped() {
        let (mut core, _rx) = core();
        let (handle, _events, _seen) = fake_mpv(|_| Ok(Value::Null));
        core.attach_with_events(|_| handle);
        let mut sub = subscribe(&mut core).await;
        let connection = core.connection;

        core.handle(DaemonEvent::Mpv { connection, event: property_change("chapter", json!(2)) })
            .await;
        core.handle(DaemonEvent::Mpv {
            connection: connection - 1,
            event: MpvEvent::Closed,
        })
        .await;
        assert!(core.is_connected());
        assert!(sub.updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn startup_snapshot_reflects_state() {
        let (mut core, _rx) = core();
        let sub = subscribe(&mut core).await;
        assert_eq!(
            sub.startup.first(),
            Some(&BackendEvent::set(PropertyName::Connected, json!(false)))
        );
        assert_eq!(
            sub.startup.last(),
            Some(&BackendEvent::set(PropertyName::Ready, json!(true)))
        );
    }

    #[tokio::test]
    async fn connection_loss_publishes_disconnected() {
        let (mut core, _rx) = core();
        let (handle, _events, _seen) = fake_mpv(|_| Ok(Value::Null));
        core.attach_with_events(|_| handle);
        let mut sub = subscribe(&mut core).await;
        let connection = core.connection;

        core.handle(DaemonEvent::Mpv { connection, event: MpvEvent::Closed })
            .await;
        assert!(!core.is_connected());
        assert_eq!(
            sub.updates.recv().await.unwrap(),
            BackendEvent::set(PropertyName::Connected, json!(false))
        );
    }
}
