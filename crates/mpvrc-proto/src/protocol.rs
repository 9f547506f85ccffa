use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::state::PropertyError;

/// Tag of the only event the backend pushes over `/events`.
pub const SET_GLOBAL_PROPERTY: &str = "set-global-property";

/// The closed set of global properties the backend publishes.
///
/// `connected` and `ready` are owned by the backend itself; every other name
/// is an mpv property the backend observes and forwards verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PropertyName {
    Connected,
    Ready,
    PlaybackTime,
    Duration,
    Pause,
    Volume,
    Path,
    Speed,
    TrackList,
}

impl PropertyName {
    pub const ALL: [PropertyName; 9] = [
        PropertyName::Connected,
        PropertyName::Ready,
        PropertyName::PlaybackTime,
        PropertyName::Duration,
        PropertyName::Pause,
        PropertyName::Volume,
        PropertyName::Path,
        PropertyName::Speed,
        PropertyName::TrackList,
    ];

    const OBSERVED: [PropertyName; 7] = [
        PropertyName::PlaybackTime,
        PropertyName::Duration,
        PropertyName::Pause,
        PropertyName::Volume,
        PropertyName::Path,
        PropertyName::Speed,
        PropertyName::TrackList,
    ];

    /// Properties the backend asks mpv to `observe_property`.
    pub fn observed() -> &'static [PropertyName] {
        &Self::OBSERVED
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PropertyName::Connected => "connected",
            PropertyName::Ready => "ready",
            PropertyName::PlaybackTime => "playback-time",
            PropertyName::Duration => "duration",
            PropertyName::Pause => "pause",
            PropertyName::Volume => "volume",
            PropertyName::Path => "path",
            PropertyName::Speed => "speed",
            PropertyName::TrackList => "track-list",
        }
    }

    /// Dense index, used for per-field bookkeeping arrays.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyName {
    type Err = PropertyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PropertyName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| PropertyError::UnknownProperty(s.to_string()))
    }
}

// ── Backend events ────────────────────────────────────────────────────────────

/// A single server-push message from `/events`.
///
/// `property_name` stays a plain string on the wire type: an unknown name is
/// a dispatch-time diagnostic, not a decoding failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum BackendEvent {
    #[serde(rename = "set-global-property", rename_all = "camelCase")]
    SetGlobalProperty {
        property_name: String,
        #[serde(default)]
        value: Value,
    },
}

impl BackendEvent {
    pub fn set(name: PropertyName, value: Value) -> Self {
        BackendEvent::SetGlobalProperty {
            property_name: name.as_str().to_string(),
            value,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("event payload has no \"event\" tag")]
    MissingTag,
    #[error("unknown event type {0:?}")]
    UnknownEvent(String),
}

/// Decode one `/events` message body.
///
/// Unknown tags are reported separately from malformed JSON so callers can
/// log them as distinct diagnostics.
pub fn decode_event(raw: &str) -> Result<BackendEvent, EventError> {
    let value: Value = serde_json::from_str(raw)?;
    let tag = value
        .get("event")
        .and_then(Value::as_str)
        .ok_or(EventError::MissingTag)?;
    match tag {
        SET_GLOBAL_PROPERTY => Ok(serde_json::from_value(value)?),
        other => Err(EventError::UnknownEvent(other.to_string())),
    }
}

// ── Tracks ────────────────────────────────────────────────────────────────────

/// Fields shared by every entry of mpv's `track-list`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackInfo {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub lang: String,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub forced: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubtitleTrack {
    #[serde(flatten)]
    pub info: TrackInfo,
    #[serde(default)]
    pub codec: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioTrack {
    #[serde(flatten)]
    pub info: TrackInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(rename = "audio-channels", default)]
    pub audio_channels: u32,
    #[serde(rename = "demux-samplerate", default)]
    pub demux_samplerate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Sub,
    Audio,
}

impl TrackKind {
    /// mpv property name cycled to switch tracks of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            TrackKind::Sub => "sub",
            TrackKind::Audio => "audio",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TrackKind::Sub => "Subtitles",
            TrackKind::Audio => "Audio",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Track {
    #[serde(rename = "sub")]
    Sub(SubtitleTrack),
    #[serde(rename = "audio")]
    Audio(AudioTrack),
}

impl Track {
    pub fn info(&self) -> &TrackInfo {
        match self {
            Track::Sub(t) => &t.info,
            Track::Audio(t) => &t.info,
        }
    }

    pub fn kind(&self) -> TrackKind {
        match self {
            Track::Sub(_) => TrackKind::Sub,
            Track::Audio(_) => TrackKind::Audio,
        }
    }

    pub fn is_selected(&self) -> bool {
        self.info().selected
    }
}

/// Decode mpv's `track-list` value.  `null` means "no file loaded".
///
/// Entries other than audio and subtitle tracks (video, album art) are
/// skipped; they have no place in this UI.
pub fn decode_track_list(value: &Value) -> serde_json::Result<Option<Vec<Track>>> {
    if value.is_null() {
        return Ok(None);
    }
    let raw: Vec<Value> = serde_json::from_value(value.clone())?;
    let mut tracks = Vec::with_capacity(raw.len());
    for entry in raw {
        match entry.get("type").and_then(Value::as_str) {
            Some("sub") | Some("audio") => tracks.push(serde_json::from_value(entry)?),
            _ => continue,
        }
    }
    Ok(Some(tracks))
}

/// The currently selected track of `kind`, if any.
pub fn selected_track(tracks: Option<&[Track]>, kind: TrackKind) -> Option<&Track> {
    tracks?
        .iter()
        .find(|t| t.kind() == kind && t.is_selected())
}

// ── File system ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSystemEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "isDir")]
    pub is_dir: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileSystemListing {
    pub path: String,
    pub entries: Vec<FileSystemEntry>,
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// The form body of `POST /command`: one field holding a JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandForm {
    pub command: String,
}

impl CommandForm {
    pub fn encode(args: &[Value]) -> serde_json::Result<Self> {
        Ok(Self {
            command: serde_json::to_string(args)?,
        })
    }

    pub fn decode(&self) -> serde_json::Result<Vec<Value>> {
        serde_json::from_str(&self.command)
    }
}

/// A JSON number for a command argument.  Whole values are sent as integers
/// so `100.0 + 6.0` goes out as `106`, not `106.0`.
pub fn json_number(value: f64) -> Value {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if value.is_finite() && value.fract() == 0.0 && value.abs() < MAX_EXACT {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}
