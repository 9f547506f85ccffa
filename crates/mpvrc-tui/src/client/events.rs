//! Event Stream Client: one persistent `GET /events` connection.
//!
//! Frames are decoded in arrival order and forwarded over a single mpsc
//! channel, so the Property Store sees events exactly as the backend sent
//! them.  Unknown or malformed events are logged and dropped here; they
//! never end the stream.

use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use mpvrc_proto::protocol::{decode_event, BackendEvent, EventError};

use super::command::{ensure_success, ClientError, CommandClient};

#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// The backend accepted the connection.
    Opened,
    Event(BackendEvent),
    /// The connection ended.  Carries the reason when it ended on an error.
    Closed(Option<String>),
}

// ── SSE framing ───────────────────────────────────────────────────────────────

/// Incremental `text/event-stream` decoder.
///
/// Feed raw body chunks; get back the `data` payload of every completed
/// message.  Chunks may split lines (or UTF-8 sequences) anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut messages = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(message) = self.line(&line) {
                messages.push(message);
            }
        }
        messages
    }

    fn line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            if self.data.is_empty() {
                return None;
            }
            let message = self.data.join("\n");
            self.data.clear();
            return Some(message);
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        // `event`, `id` and `retry` carry nothing the client uses.
        if field == "data" {
            self.data.push(value.to_string());
        }
        None
    }
}

// ── Stream task ───────────────────────────────────────────────────────────────

pub struct EventStream;

impl EventStream {
    /// Open `/events` and forward every decoded event into `tx` until the
    /// connection ends or the receiver is dropped.
    pub fn spawn(client: CommandClient, tx: mpsc::Sender<StreamMessage>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let reason = match Self::pump(&client, &tx).await {
                Ok(()) => None,
                Err(e) => {
                    warn!("events: {}", e);
                    Some(e.to_string())
                }
            };
            info!("events: stream closed");
            let _ = tx.send(StreamMessage::Closed(reason)).await;
        })
    }

    async fn pump(client: &CommandClient, tx: &mpsc::Sender<StreamMessage>) -> Result<(), ClientError> {
        let url = client.url("/events");
        let response = client
            .http()
            .get(&url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = ensure_success(response).await?;
        info!("events: connected to {}", url);
        if tx.send(StreamMessage::Opened).await.is_err() {
            return Ok(());
        }

        let mut decoder = SseDecoder::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            for raw in decoder.feed(&chunk?) {
                let Some(event) = decode(&raw) else {
                    continue;
                };
                if tx.send(StreamMessage::Event(event)).await.is_err() {
                    debug!("events: receiver gone, closing");
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

fn decode(raw: &str) -> Option<BackendEvent> {
    match decode_event(raw) {
        Ok(event) => Some(event),
        Err(EventError::UnknownEvent(tag)) => {
            warn!("events: dropping unknown event {:?}", tag);
            None
        }
        Err(e) => {
            warn!("events: dropping message: {} ({:?})", e, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_data_lines() {
        let mut d = SseDecoder::new();
        let out = d.feed(b"data: {\"a\":1}\n\ndata: two\n\n");
        assert_eq!(out, vec!["{\"a\":1}".to_string(), "two".to_string()]);
    }

    #[test]
    fn chunks_may_split_anywhere() {
        let mut d = SseDecoder::new();
        assert!(d.feed(b"da").is_empty());
        assert!(d.feed(b"ta: hel").is_empty());
        assert!(d.feed(b"lo\r").is_empty());
        assert_eq!(d.feed(b"\n\r\n"), vec!["hello".to_string()]);
    }

    #[test]
    fn comments_and_other_fields_are_ignored() {
        let mut d = SseDecoder::new();
        let out = d.feed(b": keep-alive\n\nevent: message\nid: 7\ndata:x\ndata: y\n\n");
        assert_eq!(out, vec!["x\ny".to_string()]);
    }

    #[test]
    fn split_utf8_is_reassembled() {
        let mut d = SseDecoder::new();
        let bytes = "data: Größe\n\n".as_bytes();
        let (a, b) = bytes.split_at(9);
        assert!(d.feed(a).is_empty());
        assert_eq!(d.feed(b), vec!["Größe".to_string()]);
    }

    #[test]
    fn unknown_and_malformed_are_dropped() {
        assert!(decode(r#"{"event":"something-else"}"#).is_none());
        assert!(decode("{not json").is_none());
        assert!(decode(r#"{"propertyName":"volume"}"#).is_none());

        let event = decode(r#"{"event":"set-global-property","propertyName":"volume","value":80}"#);
        assert_eq!(
            event,
            Some(BackendEvent::SetGlobalProperty {
                property_name: "volume".into(),
                value: json!(80)
            })
        );
    }
}
