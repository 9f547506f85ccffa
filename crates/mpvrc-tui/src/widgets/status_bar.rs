//! Status bar: connection dot, last notice and keybindings.

use std::time::{Duration, Instant};

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::theme::{C_ACCENT, C_ERROR, C_INFO, C_MUTED, C_PLAYING, C_SECONDARY, C_SEPARATOR};
use crate::view::Screen;

const INFO_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Severity {
    Info,
    Error,
}

/// The one-line message shown beside the connection dot.
///
/// Announcements fade after a few seconds; failures stay until something
/// replaces them.
#[derive(Debug, Clone)]
pub struct Notice {
    pub text: String,
    pub severity: Severity,
    at: Instant,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            severity: Severity::Info,
            at: Instant::now(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            severity: Severity::Error,
            at: Instant::now(),
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.severity == Severity::Info && now.duration_since(self.at) >= INFO_TTL
    }
}

/// Draw the log bar: connection state plus the current notice.
pub fn draw_log_bar(frame: &mut Frame, area: Rect, notice: Option<&Notice>, connected: bool) {
    let conn_span = if connected {
        Span::styled("●", Style::default().fg(C_PLAYING))
    } else {
        Span::styled("○", Style::default().fg(C_ACCENT))
    };

    let mut spans = vec![Span::raw(" "), conn_span, Span::raw(" ")];
    if let Some(notice) = notice {
        let color = match notice.severity {
            Severity::Info => C_INFO,
            Severity::Error => C_ERROR,
        };
        spans.push(Span::styled(notice.text.as_str(), Style::default().fg(color)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Draw a horizontal separator line.
pub fn draw_separator(frame: &mut Frame, area: Rect) {
    let line = Line::from(Span::styled(
        "─".repeat(area.width as usize),
        Style::default().fg(C_SEPARATOR),
    ));
    frame.render_widget(Paragraph::new(line), area);
}

pub fn keys_hint(screen: Screen, picker_open: bool) -> &'static str {
    if picker_open {
        return " ↑↓/jk move  g/G first/last  Enter open  Esc cancel";
    }
    match screen {
        Screen::Player => {
            " ←→ seek  -/+ vol  Space pause  [/] speed  s/a sub/audio  f fs  o open  ? help  q quit"
        }
        Screen::Waiting | Screen::NotConnected => " c connect  ? help  q quit",
    }
}

/// Draw the keybindings footer bar (one row).
pub fn draw_keys_bar(frame: &mut Frame, area: Rect, screen: Screen, picker_open: bool) {
    let label = if picker_open { "OPEN" } else { screen.label() };
    let line = Line::from(vec![
        Span::styled(
            format!(" {} ", label),
            Style::default().fg(C_SECONDARY).add_modifier(Modifier::BOLD),
        ),
        Span::styled(keys_hint(screen, picker_open), Style::default().fg(C_MUTED)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}
