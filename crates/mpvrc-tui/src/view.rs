//! View layer: screen selection, derived labels, and rendering.
//!
//! Every label is a [`Derived`] projection of the Property Store, so a frame
//! only reformats what changed since the last one.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use unicode_width::UnicodeWidthChar;

use mpvrc_proto::format::{format_duration, format_track};
use mpvrc_proto::protocol::{selected_track, PropertyName, TrackKind};
use mpvrc_proto::state::{Derived, PropertyStore};

use crate::file_picker::FilePicker;
use crate::theme::{
    style_default, style_focused_border, style_muted, style_pause_state, style_secondary,
    style_selected_focused, style_title, style_unfocused_border, C_DIRECTORY, C_OVERLAY_BG,
    C_PRIMARY,
};

/// Shown in place of numbers the backend has not reported yet.
const PLACEHOLDER: &str = "--";

/// State of the `/events` connection, tracked outside the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamStatus {
    Connecting,
    Open,
    /// `ready` arrived on this connection; the store reflects it.
    Live,
    Closed(Option<String>),
}

impl StreamStatus {
    /// Go live once this connection has delivered `ready: true`.  A store
    /// left ready by an earlier connection does not count.
    pub fn observe(&mut self, updated: PropertyName, store: &PropertyStore) {
        if *self == StreamStatus::Open && updated == PropertyName::Ready && store.is_ready() {
            *self = StreamStatus::Live;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// Stream open, startup snapshot not complete.
    Waiting,
    NotConnected,
    Player,
}

impl Screen {
    pub fn select(store: &PropertyStore, stream: &StreamStatus) -> Self {
        match stream {
            StreamStatus::Closed(_) => Screen::NotConnected,
            StreamStatus::Connecting | StreamStatus::Open => Screen::Waiting,
            StreamStatus::Live if !store.is_ready() => Screen::Waiting,
            StreamStatus::Live if !store.snapshot().connected => Screen::NotConnected,
            StreamStatus::Live => Screen::Player,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Screen::Waiting => "WAIT",
            Screen::NotConnected => "OFFLINE",
            Screen::Player => "PLAYER",
        }
    }
}

// ── Derived labels ────────────────────────────────────────────────────────────

fn playback_label(store: &PropertyStore) -> String {
    let s = store.snapshot();
    format!(
        "Current playback time: {} / {}",
        format_duration(s.playback_time),
        format_duration(s.duration)
    )
}

fn volume_speed_label(store: &PropertyStore) -> String {
    let s = store.snapshot();
    let volume = if store.is_known(PropertyName::Volume) {
        format!("{}%", s.volume)
    } else {
        PLACEHOLDER.to_string()
    };
    let speed = if store.is_known(PropertyName::Speed) {
        s.speed.to_string()
    } else {
        PLACEHOLDER.to_string()
    };
    format!("Volume: {} | Speed: {}", volume, speed)
}

fn path_label(store: &PropertyStore) -> String {
    store
        .snapshot()
        .path
        .clone()
        .unwrap_or_else(|| "No file selected".to_string())
}

fn track_label(store: &PropertyStore, kind: TrackKind) -> String {
    let tracks = store.snapshot().track_list.as_deref();
    format!("{}: {}", kind.label(), format_track(selected_track(tracks, kind)))
}

pub struct ViewModel {
    playback: Derived<String>,
    volume_speed: Derived<String>,
    path: Derived<String>,
    subtitles: Derived<String>,
    audio: Derived<String>,
}

impl Default for ViewModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewModel {
    pub fn new() -> Self {
        Self {
            playback: Derived::new(&[PropertyName::PlaybackTime, PropertyName::Duration], playback_label),
            volume_speed: Derived::new(&[PropertyName::Volume, PropertyName::Speed], volume_speed_label),
            path: Derived::new(&[PropertyName::Path], path_label),
            subtitles: Derived::new(&[PropertyName::TrackList], |s: &PropertyStore| track_label(s, TrackKind::Sub)),
            audio: Derived::new(&[PropertyName::TrackList], |s: &PropertyStore| track_label(s, TrackKind::Audio)),
        }
    }

    pub fn playback(&mut self, store: &PropertyStore) -> &str {
        self.playback.get(store)
    }

    pub fn volume_speed(&mut self, store: &PropertyStore) -> &str {
        self.volume_speed.get(store)
    }

    pub fn path(&mut self, store: &PropertyStore) -> &str {
        self.path.get(store)
    }

    pub fn track(&mut self, store: &PropertyStore, kind: TrackKind) -> &str {
        match kind {
            TrackKind::Sub => self.subtitles.get(store),
            TrackKind::Audio => self.audio.get(store),
        }
    }
}

pub fn pause_label(paused: bool) -> &'static str {
    if paused {
        "Resume"
    } else {
        "Pause"
    }
}

pub fn fullscreen_label(fullscreen: bool) -> &'static str {
    if fullscreen {
        "Exit FS"
    } else {
        "Enter FS"
    }
}

// ── Screens ───────────────────────────────────────────────────────────────────

fn panel(title: &str, focused: bool) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(if focused {
            style_focused_border()
        } else {
            style_unfocused_border()
        })
        .title(Span::styled(format!(" {} ", title), style_title()))
}

pub fn draw_waiting(frame: &mut Frame, area: Rect, backend_url: &str) {
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            format!(" waiting for {} ...", backend_url),
            style_muted(),
        )),
    ];
    frame.render_widget(Paragraph::new(lines).block(panel("mpvrc", false)), area);
}

pub fn draw_not_connected(frame: &mut Frame, area: Rect, reason: Option<&str>) {
    let mut lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            " mpv is not connected",
            Style::default().fg(C_PRIMARY).add_modifier(Modifier::BOLD),
        )),
    ];
    if let Some(reason) = reason {
        lines.push(Line::from(Span::styled(format!(" {}", reason), style_secondary())));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled(" c ", style_title()),
        Span::styled("Connect", style_secondary()),
    ]));
    frame.render_widget(
        Paragraph::new(lines)
            .block(panel("mpvrc", false))
            .wrap(Wrap { trim: false }),
        area,
    );
}

pub fn draw_player(
    frame: &mut Frame,
    area: Rect,
    view: &mut ViewModel,
    store: &PropertyStore,
    fullscreen: bool,
) {
    let paused = store.snapshot().pause;
    let loaded = store.snapshot().path.is_some();
    let mut lines = vec![Line::from(vec![
        Span::styled(" Path: ", style_secondary()),
        Span::styled(view.path(store).to_string(), style_default()),
    ])];
    if loaded {
        lines.push(Line::from(Span::styled(
            format!(" {}", view.playback(store)),
            style_default(),
        )));
    }
    lines.push(Line::from(Span::styled(
        format!(" {}", view.volume_speed(store)),
        style_default(),
    )));
    if loaded {
        lines.push(Line::from(vec![
            Span::raw(" "),
            Span::styled(if paused { "paused" } else { "playing" }, style_pause_state(paused)),
        ]));
    }
    lines.push(Line::from(""));
    for kind in [TrackKind::Sub, TrackKind::Audio] {
        lines.push(Line::from(Span::styled(
            format!(" {}", view.track(store, kind)),
            style_secondary(),
        )));
    }
    lines.push(Line::from(""));
    lines.push(controls_line(paused, fullscreen));

    frame.render_widget(
        Paragraph::new(lines)
            .block(panel("mpv", true))
            .wrap(Wrap { trim: false }),
        area,
    );
}

fn controls_line(paused: bool, fullscreen: bool) -> Line<'static> {
    let control = |key: &'static str, label: &'static str| {
        [
            Span::styled(format!(" {} ", key), style_title()),
            Span::styled(format!("{} ", label), style_secondary()),
        ]
    };
    let mut spans = Vec::new();
    spans.extend(control("←", "-10s"));
    spans.extend(control("→", "+10s"));
    spans.extend(control("-", "-6v"));
    spans.extend(control("+", "+6v"));
    spans.extend(control("space", pause_label(paused)));
    spans.extend(control("[", "-0.1s"));
    spans.extend(control("]", "+0.1s"));
    spans.extend(control("f", fullscreen_label(fullscreen)));
    Line::from(spans)
}

// ── Overlays ──────────────────────────────────────────────────────────────────

pub fn draw_picker(frame: &mut Frame, area: Rect, picker: &FilePicker) {
    let height = area.height.saturating_sub(4).max(6);
    let popup = centered_rect(70, height, area);

    let items: Vec<ListItem> = picker
        .entries()
        .iter()
        .map(|entry| {
            let style = if entry.is_dir {
                Style::default().fg(C_DIRECTORY)
            } else {
                style_default()
            };
            ListItem::new(Line::from(Span::styled(format!(" {}", entry.name), style)))
        })
        .collect();

    // The listing of filesystem roots has an empty path.
    let title = if picker.path().is_empty() {
        "/".to_string()
    } else {
        fit_left(picker.path(), popup.width.saturating_sub(6) as usize)
    };
    let list = List::new(items)
        .block(panel(&title, true).style(Style::default().bg(C_OVERLAY_BG)))
        .highlight_style(style_selected_focused());
    let mut state = ListState::default();
    state.select(Some(picker.cursor()));

    frame.render_widget(Clear, popup);
    frame.render_stateful_widget(list, popup, &mut state);
}

pub fn draw_help(frame: &mut Frame, area: Rect) {
    let popup = centered_rect(60, 20, area);
    let lines = vec![
        Line::from(Span::styled(" keyboard shortcuts", style_title())),
        Line::from(""),
        help_row("← / →  or  h / l", "seek -10s / +10s"),
        help_row("- / +  or  ↓ / ↑", "volume -6 / +6"),
        help_row("[ / ]", "speed -0.1 / +0.1"),
        help_row("space  or  p", "pause / resume"),
        help_row("s / a", "cycle subtitles / audio"),
        help_row("f", "toggle player fullscreen"),
        help_row("o  or  enter", "open a file"),
        help_row("c", "reconnect to the backend"),
        help_row("?", "toggle this help"),
        help_row("q / Ctrl+C", "quit"),
        Line::from(""),
        Line::from(Span::styled(" file picker", style_muted())),
        help_row("↑ / ↓  or  k / j", "move"),
        help_row("enter", "open directory / load file"),
        help_row("esc", "cancel"),
        Line::from(""),
        Line::from(Span::styled(" press any key to close", style_muted())),
    ];
    frame.render_widget(Clear, popup);
    frame.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(style_unfocused_border())
                .style(Style::default().bg(C_OVERLAY_BG)),
        ),
        popup,
    );
}

/// Keep the end of `text` within `width` columns, marking the cut with `…`.
pub fn fit_left(text: &str, width: usize) -> String {
    let total: usize = text.chars().map(|c| c.width().unwrap_or(0)).sum();
    if total <= width {
        return text.to_string();
    }
    let mut kept = Vec::new();
    let mut used = 1;
    for c in text.chars().rev() {
        let w = c.width().unwrap_or(0);
        if used + w > width {
            break;
        }
        used += w;
        kept.push(c);
    }
    kept.push('…');
    kept.iter().rev().collect()
}

fn help_row<'a>(key: &'a str, desc: &'a str) -> Line<'a> {
    Line::from(vec![
        Span::raw(" "),
        Span::styled(format!("{:<20}", key), style_title()),
        Span::styled(desc, style_secondary()),
    ])
}

fn centered_rect(percent_x: u16, height: u16, r: Rect) -> Rect {
    let vert = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(height),
            Constraint::Min(0),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vert[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{backend::TestBackend, Terminal};
    use serde_json::json;

    fn ready_store() -> PropertyStore {
        let mut store = PropertyStore::new();
        store.set_property("connected", &json!(true)).unwrap();
        store.set_property("ready", &json!(true)).unwrap();
        store
    }

    fn rendered(store: &PropertyStore) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 14)).unwrap();
        let mut view = ViewModel::new();
        terminal
            .draw(|f| draw_player(f, f.area(), &mut view, store, false))
            .unwrap();
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    #[test]
    fn screen_follows_ready_then_connected() {
        let mut store = PropertyStore::new();
        let mut stream = StreamStatus::Open;
        assert_eq!(Screen::select(&store, &stream), Screen::Waiting);

        store.set_property("connected", &json!(false)).unwrap();
        let name = store.set_property("ready", &json!(true)).unwrap();
        stream.observe(name, &store);
        assert_eq!(stream, StreamStatus::Live);
        assert_eq!(Screen::select(&store, &stream), Screen::NotConnected);

        store.set_property("connected", &json!(true)).unwrap();
        assert_eq!(Screen::select(&store, &stream), Screen::Player);
        assert_eq!(
            Screen::select(&store, &StreamStatus::Closed(None)),
            Screen::NotConnected
        );
    }

    #[test]
    fn reconnect_waits_for_a_fresh_snapshot() {
        let mut store = ready_store();
        store.set_property("volume", &json!(42)).unwrap();
        assert_eq!(Screen::select(&store, &StreamStatus::Connecting), Screen::Waiting);

        let mut stream = StreamStatus::Open;
        let name = store.set_property("volume", &json!(50)).unwrap();
        stream.observe(name, &store);
        assert_eq!(Screen::select(&store, &stream), Screen::Waiting);

        let name = store.set_property("ready", &json!(true)).unwrap();
        stream.observe(name, &store);
        assert_eq!(Screen::select(&store, &stream), Screen::Player);
    }

    #[test]
    fn ready_before_open_does_not_go_live() {
        let store = ready_store();
        let mut stream = StreamStatus::Connecting;
        stream.observe(PropertyName::Ready, &store);
        assert_eq!(stream, StreamStatus::Connecting);
    }

    #[test]
    fn play_state_hidden_without_a_file() {
        let store = ready_store();
        let screen = rendered(&store);
        assert!(!screen.contains("playing"));
        assert!(!screen.contains("paused"));

        let mut store = ready_store();
        store.set_property("path", &json!("/media/a.mkv")).unwrap();
        assert!(rendered(&store).contains("playing"));
    }

    #[test]
    fn labels_use_placeholders_until_known() {
        let mut store = ready_store();
        let mut view = ViewModel::new();
        assert_eq!(view.volume_speed(&store), "Volume: -- | Speed: --");
        assert_eq!(view.path(&store), "No file selected");

        store.set_property("volume", &json!(80)).unwrap();
        store.set_property("speed", &json!(1.5)).unwrap();
        assert_eq!(view.volume_speed(&store), "Volume: 80% | Speed: 1.5");
    }

    #[test]
    fn track_labels_follow_the_track_list() {
        let mut store = ready_store();
        let mut view = ViewModel::new();
        assert_eq!(view.track(&store, TrackKind::Sub), "Subtitles: no");

        store
            .set_property(
                "track-list",
                &json!([
                    {"type": "sub", "id": 1, "title": "Signs", "lang": "en", "codec": "ass",
                     "selected": true, "default": true},
                    {"type": "audio", "id": 2, "title": "Japanese FLAC 2.0", "lang": "ja",
                     "codec": "flac", "audio-channels": 2, "demux-samplerate": 48000,
                     "selected": true}
                ]),
            )
            .unwrap();
        assert_eq!(
            view.track(&store, TrackKind::Sub),
            "Subtitles: (1) 'Signs' (en ass) [default]"
        );
        assert_eq!(
            view.track(&store, TrackKind::Audio),
            "Audio: (2) 'Japanese FLAC 2.0' (ja flac 2ch 48000 Hz)"
        );
    }

    #[test]
    fn playback_time_only_shown_with_a_path() {
        let mut store = ready_store();
        store.set_property("playback-time", &json!(61.5)).unwrap();
        store.set_property("duration", &json!(3723.7)).unwrap();
        assert!(!rendered(&store).contains("Current playback time"));

        store.set_property("path", &json!("/media/a.mkv")).unwrap();
        let screen = rendered(&store);
        assert!(screen.contains("Current playback time: 00:01:01 / 01:02:03"));
        assert!(screen.contains("/media/a.mkv"));
        assert!(screen.contains("Pause"));
        assert!(screen.contains("Enter FS"));
    }

    #[test]
    fn long_paths_keep_their_tail() {
        assert_eq!(fit_left("/media", 10), "/media");
        assert_eq!(fit_left("/media/shows/season1", 10), "…s/season1");
        assert_eq!(fit_left("/アニメ/第一話", 7), "…第一話");
    }

    #[test]
    fn toggle_labels() {
        assert_eq!(pause_label(true), "Resume");
        assert_eq!(pause_label(false), "Pause");
        assert_eq!(fullscreen_label(true), "Exit FS");
        assert_eq!(fullscreen_label(false), "Enter FS");
    }
}
