//! The daemon's copy of every observed player property.
//!
//! Values are kept as mpv sent them.  Only a real change produces an event,
//! so subscribers never see duplicates.

use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::debug;

use mpvrc_proto::protocol::{BackendEvent, PropertyName};

/// Value used when mpv reports `null` for a property that is not nullable
/// on the wire.
fn fallback(name: PropertyName) -> Value {
    match name {
        PropertyName::Pause => json!(false),
        PropertyName::Volume => json!(100),
        PropertyName::Speed => json!(1),
        _ => Value::Null,
    }
}

pub struct Globals {
    values: HashMap<PropertyName, Value>,
}

impl Default for Globals {
    fn default() -> Self {
        Self::new()
    }
}

impl Globals {
    pub fn new() -> Self {
        let values = PropertyName::observed()
            .iter()
            .map(|name| (*name, fallback(*name)))
            .collect();
        Self { values }
    }

    pub fn get(&self, name: PropertyName) -> &Value {
        self.values.get(&name).unwrap_or(&Value::Null)
    }

    /// Record a new value.  Returns the event to publish when it differs from
    /// the stored one.
    pub fn set(&mut self, name: PropertyName, value: Value) -> Option<BackendEvent> {
        let value = if value.is_null() {
            debug!("globals: null {}, using default", name);
            fallback(name)
        } else {
            value
        };
        if self.values.get(&name) == Some(&value) {
            return None;
        }
        self.values.insert(name, value.clone());
        Some(BackendEvent::set(name, value))
    }

    /// Snapshot a new subscriber receives first: `connected`, every observed
    /// property, then `ready`.
    pub fn startup_events(&self, connected: bool) -> Vec<BackendEvent> {
        let mut events = Vec::with_capacity(PropertyName::observed().len() + 2);
        events.push(BackendEvent::set(PropertyName::Connected, json!(connected)));
        for name in PropertyName::observed() {
            events.push(BackendEvent::set(*name, self.get(*name).clone()));
        }
        events.push(BackendEvent::set(PropertyName::Ready, json!(true)));
        events
    }
}
