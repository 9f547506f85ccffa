//! Property Store: the client's single owner of player state.
//!
//! The store is written only by inbound `/events` messages.  Every recognized
//! property maps to one typed field of [`PropertySnapshot`]; each write bumps
//! that field's revision so dependent projections ([`Derived`]) and observers
//! recompute.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::protocol::{decode_track_list, BackendEvent, PropertyName, Track};

#[derive(Debug, Error, PartialEq)]
pub enum PropertyError {
    #[error("unknown global property {0:?}")]
    UnknownProperty(String),
    #[error("invalid value for {name}: expected {expected}, got {value}")]
    InvalidValue {
        name: PropertyName,
        expected: &'static str,
        value: Value,
    },
}

/// Last-known player state as seen by this client.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySnapshot {
    pub connected: bool,
    pub ready: bool,
    pub playback_time: Option<f64>,
    pub duration: Option<f64>,
    pub pause: bool,
    /// Percent.
    pub volume: f64,
    pub path: Option<String>,
    pub speed: f64,
    pub track_list: Option<Vec<Track>>,
}

impl Default for PropertySnapshot {
    fn default() -> Self {
        Self {
            connected: false,
            ready: false,
            playback_time: None,
            duration: None,
            pause: false,
            volume: 100.0,
            path: None,
            speed: 1.0,
            track_list: None,
        }
    }
}

/// A decoded, typed value for exactly one property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Connected(bool),
    Ready(bool),
    PlaybackTime(Option<f64>),
    Duration(Option<f64>),
    Pause(bool),
    Volume(f64),
    Path(Option<String>),
    Speed(f64),
    TrackList(Option<Vec<Track>>),
}

impl PropertyValue {
    pub fn name(&self) -> PropertyName {
        match self {
            PropertyValue::Connected(_) => PropertyName::Connected,
            PropertyValue::Ready(_) => PropertyName::Ready,
            PropertyValue::PlaybackTime(_) => PropertyName::PlaybackTime,
            PropertyValue::Duration(_) => PropertyName::Duration,
            PropertyValue::Pause(_) => PropertyName::Pause,
            PropertyValue::Volume(_) => PropertyName::Volume,
            PropertyValue::Path(_) => PropertyName::Path,
            PropertyValue::Speed(_) => PropertyName::Speed,
            PropertyValue::TrackList(_) => PropertyName::TrackList,
        }
    }

    /// Decode a raw JSON value for `name`.
    pub fn decode(name: PropertyName, value: &Value) -> Result<Self, PropertyError> {
        let invalid = |expected: &'static str| PropertyError::InvalidValue {
            name,
            expected,
            value: value.clone(),
        };
        let boolean = || value.as_bool().ok_or_else(|| invalid("bool"));
        let number = || value.as_f64().ok_or_else(|| invalid("number"));
        // Negative times are clamped, never stored.
        let seconds = || -> Result<Option<f64>, PropertyError> {
            if value.is_null() {
                return Ok(None);
            }
            value
                .as_f64()
                .map(|s| Some(s.max(0.0)))
                .ok_or_else(|| invalid("number or null"))
        };

        Ok(match name {
            PropertyName::Connected => PropertyValue::Connected(boolean()?),
            PropertyName::Ready => PropertyValue::Ready(boolean()?),
            PropertyName::PlaybackTime => PropertyValue::PlaybackTime(seconds()?),
            PropertyName::Duration => PropertyValue::Duration(seconds()?),
            PropertyName::Pause => PropertyValue::Pause(boolean()?),
            PropertyName::Volume => PropertyValue::Volume(number()?),
            PropertyName::Speed => PropertyValue::Speed(number()?),
            PropertyName::Path => match value {
                Value::Null => PropertyValue::Path(None),
                Value::String(s) if s.is_empty() => PropertyValue::Path(None),
                Value::String(s) => PropertyValue::Path(Some(s.clone())),
                _ => return Err(invalid("string or null")),
            },
            PropertyName::TrackList => PropertyValue::TrackList(
                decode_track_list(value).map_err(|_| invalid("track list or null"))?,
            ),
        })
    }
}

/// Handle returned by [`PropertyStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type ObserverFn = Box<dyn FnMut(PropertyName, &PropertySnapshot) + Send>;

struct Observer {
    id: SubscriptionId,
    names: Vec<PropertyName>,
    callback: ObserverFn,
}

pub struct PropertyStore {
    snapshot: PropertySnapshot,
    /// Per-field revision; 0 means no event has arrived for that field yet.
    revisions: [u64; PropertyName::ALL.len()],
    clock: u64,
    observers: Vec<Observer>,
    next_subscription: u64,
}

impl Default for PropertyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyStore {
    pub fn new() -> Self {
        Self {
            snapshot: PropertySnapshot::default(),
            revisions: [0; PropertyName::ALL.len()],
            clock: 0,
            observers: Vec::new(),
            next_subscription: 1,
        }
    }

    pub fn snapshot(&self) -> &PropertySnapshot {
        &self.snapshot
    }

    /// True once the backend has sent its startup snapshot.
    pub fn is_ready(&self) -> bool {
        self.snapshot.ready
    }

    pub fn revision(&self, name: PropertyName) -> u64 {
        self.revisions[name.index()]
    }

    /// Whether at least one event has set `name`.  Defaults (volume 100,
    /// speed 1) are placeholders until this turns true.
    pub fn is_known(&self, name: PropertyName) -> bool {
        self.revision(name) > 0
    }

    /// Latest revision among `deps`.  Changes whenever any of them is set.
    pub fn stamp(&self, deps: &[PropertyName]) -> u64 {
        deps.iter().map(|n| self.revision(*n)).max().unwrap_or(0)
    }

    /// Set a property by wire name.  Unknown names and ill-typed values are
    /// rejected without touching any field.
    pub fn set_property(&mut self, name: &str, value: &Value) -> Result<PropertyName, PropertyError> {
        let name: PropertyName = name.parse()?;
        let typed = PropertyValue::decode(name, value)?;
        self.set(typed);
        Ok(name)
    }

    /// Replace one field and notify everything that depends on it.
    pub fn set(&mut self, value: PropertyValue) {
        let name = value.name();
        let s = &mut self.snapshot;
        match value {
            PropertyValue::Connected(v) => s.connected = v,
            PropertyValue::Ready(v) => s.ready = v,
            PropertyValue::PlaybackTime(v) => s.playback_time = v,
            PropertyValue::Duration(v) => s.duration = v,
            PropertyValue::Pause(v) => s.pause = v,
            PropertyValue::Volume(v) => s.volume = v,
            PropertyValue::Path(v) => s.path = v,
            PropertyValue::Speed(v) => s.speed = v,
            PropertyValue::TrackList(v) => s.track_list = v,
        }
        self.clock += 1;
        self.revisions[name.index()] = self.clock;

        for observer in self.observers.iter_mut() {
            if observer.names.contains(&name) {
                (observer.callback)(name, &self.snapshot);
            }
        }
    }

    pub fn apply_event(&mut self, event: &BackendEvent) -> Result<PropertyName, PropertyError> {
        match event {
            BackendEvent::SetGlobalProperty {
                property_name,
                value,
            } => self.set_property(property_name, value),
        }
    }

    /// Apply an event, logging and dropping anything the store rejects.
    /// Returns the updated property on success.
    pub fn dispatch(&mut self, event: &BackendEvent) -> Option<PropertyName> {
        match self.apply_event(event) {
            Ok(name) => {
                debug!("store: {} updated", name);
                Some(name)
            }
            Err(e) => {
                warn!("store: dropped event: {}", e);
                None
            }
        }
    }

    /// Register `callback` to run synchronously after any of `names` is set.
    pub fn subscribe(
        &mut self,
        names: &[PropertyName],
        callback: impl FnMut(PropertyName, &PropertySnapshot) + Send + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push(Observer {
            id,
            names: names.to_vec(),
            callback: Box::new(callback),
        });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|o| o.id != id);
        self.observers.len() != before
    }
}

/// A memoised projection of the store.
///
/// Recomputes only when one of `deps` has been set since the last read.
/// `compute` sees the whole store so it can tell real values from defaults
/// with [`PropertyStore::is_known`].
pub struct Derived<T> {
    deps: &'static [PropertyName],
    compute: fn(&PropertyStore) -> T,
    value: Option<T>,
    stamp: Option<u64>,
    recomputes: u64,
}

impl<T> Derived<T> {
    pub fn new(deps: &'static [PropertyName], compute: fn(&PropertyStore) -> T) -> Self {
        Self {
            deps,
            compute,
            value: None,
            stamp: None,
            recomputes: 0,
        }
    }

    pub fn get(&mut self, store: &PropertyStore) -> &T {
        let stamp = store.stamp(self.deps);
        if self.stamp != Some(stamp) {
            self.value = None;
            self.stamp = Some(stamp);
        }
        let compute = self.compute;
        let recomputes = &mut self.recomputes;
        self.value.get_or_insert_with(|| {
            *recomputes += 1;
            compute(store)
        })
    }

    /// Last computed value without refreshing.
    pub fn peek(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn recomputes(&self) -> u64 {
        self.recomputes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn starts_unready_with_placeholders() {
        let store = PropertyStore::new();
        assert!(!store.is_ready());
        assert!(!store.snapshot().connected);
        assert_eq!(store.snapshot().volume, 100.0);
        assert_eq!(store.snapshot().speed, 1.0);
        assert!(!store.is_known(PropertyName::Volume));
    }

    #[test]
    fn unknown_name_changes_nothing() {
        let mut store = PropertyStore::new();
        store.set_property("volume", &json!(42)).unwrap();
        let before = store.snapshot().clone();
        let rev = store.revision(PropertyName::Volume);

        let err = store.set_property("playbackTime", &json!(12)).unwrap_err();
        assert_eq!(err, PropertyError::UnknownProperty("playbackTime".into()));
        assert_eq!(store.snapshot(), &before);
        assert_eq!(store.revision(PropertyName::Volume), rev);

        let event = BackendEvent::SetGlobalProperty {
            property_name: "bogus".into(),
            value: json!(true),
        };
        assert_eq!(store.dispatch(&event), None);
        assert_eq!(store.snapshot(), &before);
    }

    #[test]
    fn ill_typed_value_changes_nothing() {
        let mut store = PropertyStore::new();
        let err = store.set_property("pause", &json!("yes")).unwrap_err();
        assert!(matches!(
            err,
            PropertyError::InvalidValue { name: PropertyName::Pause, .. }
        ));
        assert!(!store.is_known(PropertyName::Pause));
        assert!(store.set_property("volume", &Value::Null).is_err());
        assert_eq!(store.snapshot().volume, 100.0);
    }

    #[test]
    fn events_apply_in_delivery_order() {
        let mut store = PropertyStore::new();
        for v in [50, 80] {
            store
                .dispatch(&BackendEvent::set(PropertyName::Volume, json!(v)))
                .unwrap();
        }
        assert_eq!(store.snapshot().volume, 80.0);
    }

    #[test]
    fn ready_gate_opens_on_ready_event() {
        let mut store = PropertyStore::new();
        store.set_property("connected", &json!(true)).unwrap();
        assert!(!store.is_ready());
        store.set_property("ready", &json!(true)).unwrap();
        assert!(store.is_ready());
    }

    #[test]
    fn times_accept_null_and_clamp_negatives() {
        let mut store = PropertyStore::new();
        store.set_property("playback-time", &json!(-3.5)).unwrap();
        assert_eq!(store.snapshot().playback_time, Some(0.0));
        store.set_property("playback-time", &Value::Null).unwrap();
        assert_eq!(store.snapshot().playback_time, None);
        store.set_property("duration", &json!(1385.27)).unwrap();
        assert_eq!(store.snapshot().duration, Some(1385.27));
    }

    #[test]
    fn empty_path_means_no_file() {
        let mut store = PropertyStore::new();
        store.set_property("path", &json!("/media/a.mkv")).unwrap();
        assert_eq!(store.snapshot().path.as_deref(), Some("/media/a.mkv"));
        store.set_property("path", &json!("")).unwrap();
        assert_eq!(store.snapshot().path, None);
    }

    #[test]
    fn track_list_is_replaced_wholesale() {
        let mut store = PropertyStore::new();
        store
            .set_property(
                "track-list",
                &json!([{"id": 1, "type": "sub"}, {"id": 2, "type": "sub"}]),
            )
            .unwrap();
        assert_eq!(store.snapshot().track_list.as_ref().map(Vec::len), Some(2));
        store
            .set_property("track-list", &json!([{"id": 7, "type": "audio"}]))
            .unwrap();
        let tracks = store.snapshot().track_list.as_ref().unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].info().id, 7);
    }

    #[test]
    fn observers_fire_only_for_their_names() {
        let mut store = PropertyStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = store.subscribe(&[PropertyName::Pause], move |name, snap| {
            sink.lock().unwrap().push((name, snap.pause));
        });

        store.set_property("volume", &json!(10)).unwrap();
        store.set_property("pause", &json!(true)).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(PropertyName::Pause, true)]);

        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.set_property("pause", &json!(false)).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn derived_recomputes_only_when_a_dependency_changes() {
        static DEPS: [PropertyName; 1] = [PropertyName::Volume];
        let mut store = PropertyStore::new();
        let mut label = Derived::new(&DEPS, |s| {
            if s.is_known(PropertyName::Volume) {
                format!("{}%", s.snapshot().volume)
            } else {
                "--".to_string()
            }
        });

        assert_eq!(label.get(&store), "--");
        assert_eq!(label.get(&store), "--");
        assert_eq!(label.recomputes(), 1);

        store.set_property("speed", &json!(2)).unwrap();
        label.get(&store);
        assert_eq!(label.recomputes(), 1);

        store.set_property("volume", &json!(55)).unwrap();
        assert_eq!(label.get(&store), "55%");
        assert_eq!(label.recomputes(), 2);
        assert_eq!(label.peek().map(String::as_str), Some("55%"));
    }
}
