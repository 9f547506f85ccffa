//! HTTP side of the backend: commands out, events in.

pub mod command;
pub mod events;

pub use command::{ClientError, CommandClient};
pub use events::{EventStream, SseDecoder, StreamMessage};
