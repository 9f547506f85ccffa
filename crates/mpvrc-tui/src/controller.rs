//! Compound user actions built from sequential `/command` requests.
//!
//! Each step is awaited before the next one is sent.  Nothing here writes the
//! Property Store: confirmed state only ever arrives through `/events`, and
//! query results feed nothing but the on-screen text sent back to mpv.

use serde_json::{json, Value};
use tracing::debug;

use mpvrc_proto::format::{format_duration, format_track, round_speed, speed_text, volume_text};
use mpvrc_proto::protocol::{decode_track_list, json_number, selected_track, TrackKind};

use crate::client::{ClientError, CommandClient};

pub const SEEK_STEP: f64 = 10.0;
pub const VOLUME_STEP: f64 = 6.0;
pub const SPEED_STEP: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct Controller {
    client: CommandClient,
}

impl Controller {
    pub fn new(client: CommandClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &CommandClient {
        &self.client
    }

    async fn show_text(&self, text: &str) -> Result<(), ClientError> {
        self.client.send(&[json!("show-text"), json!(text)]).await?;
        Ok(())
    }

    /// Seek by `change` seconds, then announce the new position.  Returns the
    /// announced text.
    pub async fn seek(&self, change: f64) -> Result<String, ClientError> {
        self.client
            .send(&[json!("seek"), json_number(change), json!("relative+exact")])
            .await?;
        let time = self
            .client
            .query(&[json!("get_property"), json!("playback-time")])
            .await?;
        let text = format_duration(time.as_f64());
        self.show_text(&text).await?;
        Ok(text)
    }

    /// Set volume to `current + change`.  `current` is the store's last-known
    /// value; the backend confirms the change through `/events`.
    pub async fn change_volume(&self, current: f64, change: f64) -> Result<f64, ClientError> {
        let volume = current + change;
        debug!("volume {} -> {}", current, volume);
        self.client
            .send(&[json!("set_property"), json!("volume"), json_number(volume)])
            .await?;
        self.show_text(&volume_text(volume)).await?;
        Ok(volume)
    }

    pub async fn change_speed(&self, current: f64, change: f64) -> Result<f64, ClientError> {
        let speed = round_speed(current + change);
        self.client
            .send(&[json!("set_property"), json!("speed"), json_number(speed)])
            .await?;
        self.show_text(&speed_text(speed)).await?;
        Ok(speed)
    }

    pub async fn toggle_pause(&self, paused: bool) -> Result<(), ClientError> {
        self.client
            .send(&[json!("set_property"), json!("pause"), json!(!paused)])
            .await?;
        Ok(())
    }

    /// Cycle the subtitle or audio track and announce the one now selected.
    pub async fn cycle_track(&self, kind: TrackKind) -> Result<String, ClientError> {
        self.client.send(&[json!("cycle"), json!(kind.as_str())]).await?;
        let raw = self
            .client
            .query(&[json!("get_property"), json!("track-list")])
            .await?;
        let tracks = decode_track_list(&raw).map_err(ClientError::Json)?;
        let text = format!(
            "{}: {}",
            kind.label(),
            format_track(selected_track(tracks.as_deref(), kind))
        );
        self.show_text(&text).await?;
        Ok(text)
    }

    /// Toggle the player window's fullscreen state.  The returned flag is
    /// only a display hint for the local label.
    pub async fn toggle_fullscreen(&self) -> Result<bool, ClientError> {
        self.client.send(&[json!("cycle"), json!("fullscreen")]).await?;
        let state = self
            .client
            .query(&[json!("get_property"), json!("fullscreen")])
            .await?;
        Ok(state.as_bool().unwrap_or(false))
    }

    pub async fn load_file(&self, path: &str) -> Result<(), ClientError> {
        self.client.send(&[json!("loadfile"), Value::from(path)]).await?;
        Ok(())
    }
}
