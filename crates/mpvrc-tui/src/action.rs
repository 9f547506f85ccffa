//! Action enum: user intents and the key bindings that produce them.

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use mpvrc_proto::protocol::TrackKind;

use crate::controller::{SEEK_STEP, SPEED_STEP, VOLUME_STEP};
use crate::view::Screen;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    // ── Playback ─────────────────────────────────────────────────────────────
    Seek(f64),
    Volume(f64),
    Speed(f64),
    TogglePause,
    CycleTrack(TrackKind),
    ToggleFullscreen,

    // ── File picker ──────────────────────────────────────────────────────────
    OpenPicker,
    PickerUp,
    PickerDown,
    PickerFirst,
    PickerLast,
    PickerSelect,
    ClosePicker,

    // ── System ───────────────────────────────────────────────────────────────
    Reconnect,
    ToggleHelp,
    Quit,
}

/// What currently owns the keyboard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyContext {
    pub screen: Screen,
    pub picker_open: bool,
    pub help_open: bool,
}

pub fn map_key(key: KeyEvent, ctx: KeyContext) -> Vec<Action> {
    // Global keys
    match key.code {
        KeyCode::Char('c') if key.modifiers == KeyModifiers::CONTROL => {
            return vec![Action::Quit];
        }
        KeyCode::Char('?') => return vec![Action::ToggleHelp],
        _ => {}
    }

    // Help overlay: any other key closes it.
    if ctx.help_open {
        return vec![Action::ToggleHelp];
    }

    if ctx.picker_open {
        return match key.code {
            KeyCode::Up | KeyCode::Char('k') => vec![Action::PickerUp],
            KeyCode::Down | KeyCode::Char('j') => vec![Action::PickerDown],
            KeyCode::Home | KeyCode::Char('g') => vec![Action::PickerFirst],
            KeyCode::End | KeyCode::Char('G') => vec![Action::PickerLast],
            KeyCode::Enter | KeyCode::Char('l') => vec![Action::PickerSelect],
            KeyCode::Esc | KeyCode::Char('q') => vec![Action::ClosePicker],
            _ => vec![],
        };
    }

    match key.code {
        KeyCode::Char('q') => return vec![Action::Quit],
        KeyCode::Char('c') => return vec![Action::Reconnect],
        _ => {}
    }

    if ctx.screen != Screen::Player {
        return vec![];
    }

    match key.code {
        KeyCode::Left | KeyCode::Char('h') => vec![Action::Seek(-SEEK_STEP)],
        KeyCode::Right | KeyCode::Char('l') => vec![Action::Seek(SEEK_STEP)],
        KeyCode::Char('-') | KeyCode::Down => vec![Action::Volume(-VOLUME_STEP)],
        KeyCode::Char('+') | KeyCode::Char('=') | KeyCode::Up => vec![Action::Volume(VOLUME_STEP)],
        KeyCode::Char('[') => vec![Action::Speed(-SPEED_STEP)],
        KeyCode::Char(']') => vec![Action::Speed(SPEED_STEP)],
        KeyCode::Char(' ') | KeyCode::Char('p') => vec![Action::TogglePause],
        KeyCode::Char('s') => vec![Action::CycleTrack(TrackKind::Sub)],
        KeyCode::Char('a') => vec![Action::CycleTrack(TrackKind::Audio)],
        KeyCode::Char('f') => vec![Action::ToggleFullscreen],
        KeyCode::Char('o') | KeyCode::Enter => vec![Action::OpenPicker],
        _ => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn player() -> KeyContext {
        KeyContext {
            screen: Screen::Player,
            picker_open: false,
            help_open: false,
        }
    }

    #[test]
    fn player_keys() {
        assert_eq!(map_key(key(KeyCode::Right), player()), vec![Action::Seek(10.0)]);
        assert_eq!(map_key(key(KeyCode::Char('-')), player()), vec![Action::Volume(-6.0)]);
        assert_eq!(map_key(key(KeyCode::Char(']')), player()), vec![Action::Speed(0.1)]);
        assert_eq!(
            map_key(key(KeyCode::Char('s')), player()),
            vec![Action::CycleTrack(TrackKind::Sub)]
        );
    }

    #[test]
    fn playback_keys_need_the_player_screen() {
        let ctx = KeyContext {
            screen: Screen::NotConnected,
            ..player()
        };
        assert!(map_key(key(KeyCode::Right), ctx).is_empty());
        assert_eq!(map_key(key(KeyCode::Char('c')), ctx), vec![Action::Reconnect]);
        assert_eq!(map_key(key(KeyCode::Char('q')), ctx), vec![Action::Quit]);
    }

    #[test]
    fn picker_captures_keys() {
        let ctx = KeyContext {
            picker_open: true,
            ..player()
        };
        assert_eq!(map_key(key(KeyCode::Char('q')), ctx), vec![Action::ClosePicker]);
        assert_eq!(map_key(key(KeyCode::Enter), ctx), vec![Action::PickerSelect]);
        assert!(map_key(key(KeyCode::Char(' ')), ctx).is_empty());
    }

    #[test]
    fn help_closes_on_any_key_but_ctrl_c_quits() {
        let ctx = KeyContext {
            help_open: true,
            ..player()
        };
        assert_eq!(map_key(key(KeyCode::Char('x')), ctx), vec![Action::ToggleHelp]);
        assert_eq!(
            map_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL), ctx),
            vec![Action::Quit]
        );
    }
}
