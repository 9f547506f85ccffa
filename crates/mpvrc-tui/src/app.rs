//! App: the TUI event loop.
//!
//! Architecture:
//! - `App` owns the Property Store; only `/events` messages write it.
//! - Terminal input arrives as `AppMessage::Event` from a blocking reader.
//! - Key presses map to `Action`s.  Playback actions run as spawned tasks
//!   (one sequential command chain each) and report back as `AppMessage`s.
//! - The event loop redraws only after something changed.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ratatui::crossterm::event::{self, Event, KeyEventKind};
use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::Style,
    widgets::Block,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use mpvrc_proto::format::{speed_text, volume_text};
use mpvrc_proto::protocol::PropertyName;
use mpvrc_proto::state::PropertyStore;

use crate::{
    action::{map_key, Action, KeyContext},
    client::{ClientError, CommandClient, EventStream, StreamMessage},
    controller::Controller,
    file_picker::{FilePicker, Navigation, Outcome},
    lifecycle::{Listener, Subscriptions, TerminalGuard},
    theme::C_BG,
    view::{self, Screen, StreamStatus, ViewModel},
    widgets::status_bar::{self, Notice},
};

const INPUT_POLL: Duration = Duration::from_millis(100);

// ── Internal event bus ────────────────────────────────────────────────────────

enum AppMessage {
    Event(Event),
    /// A playback action finished.
    Done(Result<Done, String>),
    /// A picker navigation finished.
    Picker { seq: u64, result: Result<Outcome, String> },
}

enum Done {
    /// The action ended with an on-screen announcement in mpv.
    Announced(String),
    Fullscreen(bool),
    Quiet,
}

pub struct App {
    controller: Controller,
    backend_url: String,
    store: PropertyStore,
    view: ViewModel,
    picker: FilePicker,
    stream: StreamStatus,
    subscriptions: Subscriptions,
    tx: mpsc::Sender<AppMessage>,
    rx: Option<mpsc::Receiver<AppMessage>>,
    notice: Option<Notice>,
    fullscreen: bool,
    show_help: bool,
    reconnect: bool,
    should_quit: bool,
}

impl App {
    pub fn new(backend_url: &str) -> Self {
        let (tx, rx) = mpsc::channel(1024);
        let client = CommandClient::new(backend_url);
        Self {
            backend_url: client.base_url().to_string(),
            controller: Controller::new(client),
            store: PropertyStore::new(),
            view: ViewModel::new(),
            picker: FilePicker::new(),
            stream: StreamStatus::Connecting,
            subscriptions: Subscriptions::new(),
            tx,
            rx: Some(rx),
            notice: None,
            fullscreen: false,
            show_help: false,
            reconnect: false,
            should_quit: false,
        }
    }

    fn screen(&self) -> Screen {
        Screen::select(&self.store, &self.stream)
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut rx = self
            .rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("app is already running"))?;
        let mut guard = TerminalGuard::enter()?;

        let connection_log = self
            .store
            .subscribe(&[PropertyName::Connected], |_, snapshot| {
                info!("mpv {}", if snapshot.connected { "connected" } else { "disconnected" });
            });

        // ── Mount: event stream + terminal input ──────────────────────────────
        let mut stream_rx = self.connect_stream();
        self.spawn_input();

        let mut notice_tick = tokio::time::interval(Duration::from_millis(250));
        notice_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // ── Main loop ─────────────────────────────────────────────────────────
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                guard.terminal.draw(|f| self.draw(f))?;
            }
            needs_redraw = false;

            if self.should_quit {
                break;
            }

            tokio::select! {
                Some(msg) = rx.recv() => {
                    needs_redraw = self.handle_message(msg);
                    while let Ok(next) = rx.try_recv() {
                        needs_redraw |= self.handle_message(next);
                    }
                    if std::mem::take(&mut self.reconnect) {
                        stream_rx = self.connect_stream();
                        needs_redraw = true;
                    }
                }

                Some(msg) = stream_rx.recv() => {
                    self.on_stream(msg);
                    // Drain the startup snapshot in one frame.
                    while let Ok(next) = stream_rx.try_recv() {
                        self.on_stream(next);
                    }
                    needs_redraw = true;
                }

                _ = notice_tick.tick() => {
                    let now = Instant::now();
                    if self.notice.as_ref().is_some_and(|n| n.is_expired(now)) {
                        self.notice = None;
                        needs_redraw = true;
                    }
                }
            }
        }

        // ── Teardown ──────────────────────────────────────────────────────────
        self.store.unsubscribe(connection_log);
        drop(std::mem::take(&mut self.subscriptions));
        drop(guard);
        info!("mpvrc stopped");
        Ok(())
    }

    /// (Re)open `/events`.  Any previous stream is released first.
    fn connect_stream(&mut self) -> mpsc::Receiver<StreamMessage> {
        let (stream_tx, stream_rx) = mpsc::channel(256);
        let task = EventStream::spawn(self.controller.client().clone(), stream_tx);
        self.subscriptions.replace("events", Listener::task(task));
        self.stream = StreamStatus::Connecting;
        stream_rx
    }

    fn spawn_input(&mut self) {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let input_tx = self.tx.clone();
        let task = tokio::task::spawn_blocking(move || {
            while !flag.load(Ordering::Relaxed) {
                match event::poll(INPUT_POLL) {
                    Ok(true) => match event::read() {
                        Ok(ev) => {
                            if input_tx.blocking_send(AppMessage::Event(ev)).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("input: read failed: {}", e);
                            break;
                        }
                    },
                    Ok(false) => {}
                    Err(e) => {
                        warn!("input: poll failed: {}", e);
                        break;
                    }
                }
            }
        });
        self.subscriptions.add("input", Listener::blocking(task, stop));
    }

    fn on_stream(&mut self, msg: StreamMessage) {
        match msg {
            StreamMessage::Opened => self.stream = StreamStatus::Open,
            StreamMessage::Event(event) => {
                if let Some(name) = self.store.dispatch(&event) {
                    self.stream.observe(name, &self.store);
                }
            }
            StreamMessage::Closed(reason) => {
                if let Some(reason) = &reason {
                    self.notice = Some(Notice::error(format!("event stream: {}", reason)));
                }
                self.stream = StreamStatus::Closed(reason);
            }
        }
    }

    /// Returns whether a redraw is needed.
    fn handle_message(&mut self, msg: AppMessage) -> bool {
        match msg {
            AppMessage::Event(ev) => match ev {
                Event::Key(key) => {
                    if key.kind == KeyEventKind::Release {
                        return false;
                    }
                    let ctx = KeyContext {
                        screen: self.screen(),
                        picker_open: self.picker.is_open(),
                        help_open: self.show_help,
                    };
                    for action in map_key(key, ctx) {
                        self.dispatch(action);
                    }
                }
                Event::Resize(..) => {}
                _ => return false,
            },

            AppMessage::Done(Ok(done)) => match done {
                Done::Announced(text) => self.notice = Some(Notice::info(text)),
                Done::Fullscreen(on) => self.fullscreen = on,
                Done::Quiet => return false,
            },

            AppMessage::Done(Err(e)) | AppMessage::Picker { result: Err(e), .. } => {
                self.notice = Some(Notice::error(e));
            }

            AppMessage::Picker {
                seq,
                result: Ok(outcome),
            } => {
                return self.picker.apply(seq, outcome);
            }
        }
        true
    }

    fn dispatch(&mut self, action: Action) {
        debug!("action: {:?}", action);
        let c = self.controller.clone();
        match action {
            Action::Seek(change) => {
                self.spawn_action("seek", async move { c.seek(change).await.map(Done::Announced) });
            }
            Action::Volume(change) => {
                let current = self.store.snapshot().volume;
                self.spawn_action("volume", async move {
                    let volume = c.change_volume(current, change).await?;
                    Ok(Done::Announced(volume_text(volume)))
                });
            }
            Action::Speed(change) => {
                let current = self.store.snapshot().speed;
                self.spawn_action("speed", async move {
                    let speed = c.change_speed(current, change).await?;
                    Ok(Done::Announced(speed_text(speed)))
                });
            }
            Action::TogglePause => {
                let paused = self.store.snapshot().pause;
                self.spawn_action("pause", async move { c.toggle_pause(paused).await.map(|_| Done::Quiet) });
            }
            Action::CycleTrack(kind) => {
                self.spawn_action(kind.as_str(), async move {
                    c.cycle_track(kind).await.map(Done::Announced)
                });
            }
            Action::ToggleFullscreen => {
                self.spawn_action("fullscreen", async move {
                    c.toggle_fullscreen().await.map(Done::Fullscreen)
                });
            }

            Action::OpenPicker => {
                let current = self.store.snapshot().path.clone();
                let (seq, nav) = self.picker.open(current.as_deref());
                self.spawn_navigation(seq, nav);
            }
            Action::PickerSelect => {
                if let Some((seq, nav)) = self.picker.select() {
                    self.spawn_navigation(seq, nav);
                }
            }
            Action::PickerUp => self.picker.up(),
            Action::PickerDown => self.picker.down(),
            Action::PickerFirst => self.picker.first(),
            Action::PickerLast => self.picker.last(),
            Action::ClosePicker => self.picker.close(),

            Action::Reconnect => {
                info!("reconnecting to {}", self.backend_url);
                self.reconnect = true;
            }
            Action::ToggleHelp => self.show_help = !self.show_help,
            Action::Quit => self.should_quit = true,
        }
    }

    /// Run one command chain in the background.  Failures are logged and
    /// surfaced in the status bar; nothing is retried.
    fn spawn_action<F>(&self, name: &'static str, chain: F)
    where
        F: Future<Output = Result<Done, ClientError>> + Send + 'static,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = chain.await.map_err(|e| {
                warn!("{} failed: {}", name, e);
                format!("{} failed: {}", name, e)
            });
            let _ = tx.send(AppMessage::Done(result)).await;
        });
    }

    fn spawn_navigation(&self, seq: u64, nav: Navigation) {
        let controller = self.controller.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = nav.run(&controller).await.map_err(|e| {
                warn!("picker: {}", e);
                format!("open failed: {}", e)
            });
            let _ = tx.send(AppMessage::Picker { seq, result }).await;
        });
    }

    fn draw(&mut self, frame: &mut ratatui::Frame) {
        let area = frame.area();
        frame.render_widget(Block::default().style(Style::default().bg(C_BG)), area);

        let outer = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(0),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(area);

        let screen = self.screen();
        match screen {
            Screen::Waiting => view::draw_waiting(frame, outer[0], &self.backend_url),
            Screen::NotConnected => {
                let reason = match &self.stream {
                    StreamStatus::Closed(reason) => {
                        Some(reason.as_deref().unwrap_or("event stream closed"))
                    }
                    _ => None,
                };
                view::draw_not_connected(frame, outer[0], reason);
            }
            Screen::Player => {
                view::draw_player(frame, outer[0], &mut self.view, &self.store, self.fullscreen)
            }
        }

        status_bar::draw_separator(frame, outer[1]);
        status_bar::draw_log_bar(
            frame,
            outer[2],
            self.notice.as_ref(),
            self.stream == StreamStatus::Live && self.store.snapshot().connected,
        );
        status_bar::draw_keys_bar(frame, outer[3], screen, self.picker.is_open());

        if self.picker.is_open() {
            view::draw_picker(frame, outer[0], &self.picker);
        }
        if self.show_help {
            view::draw_help(frame, area);
        }
    }
}
