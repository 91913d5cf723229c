//! Event normalization for the SecuritySpy update feed.
//!
//! The server delivers loosely-schemaed update records; this module maps a
//! raw record to an optional `(Classification, MotionEdge)` pair scoped to
//! one camera channel and filters out everything else. Normalization is a
//! pure function of the record and the configured channel.
//!
//! Classification policy: the object tag is read from `event_object` only,
//! `Animal` maps to the dedicated [`Classification::Animal`] variant, and an
//! empty tag normalizes to [`Classification::Unspecified`] (a motion edge
//! carrying no object type). Unknown tags are rejected outright rather than
//! treated as untyped motion.
//!
//! Channel filtering relies on the `live_stream` attribute. Some upstream
//! schema versions omit it entirely; records without it pass unfiltered, so
//! such deployments are only safe with a single camera per bridge process.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;

/// The `event_type` value that marks a motion record.
const MOTION_EVENT_TYPE: &str = "motion";

/// Opaque identifier of the camera channel this bridge is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub struct CameraChannel(pub u32);

impl fmt::Display for CameraChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalized object classification attached to a motion start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Person,
    Vehicle,
    Animal,
    /// Motion with no vendor-supplied object type.
    Unspecified,
}

impl Classification {
    /// The label the host platform receives, if any.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            Classification::Person => Some("person"),
            Classification::Vehicle => Some("vehicle"),
            Classification::Animal => Some("animal"),
            Classification::Unspecified => None,
        }
    }
}

/// A boolean transition signal marking the start or end of detected motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionEdge {
    On,
    Off,
}

/// A raw update record as delivered by the event stream.
///
/// Records are schemaless key/value maps; attributes of interest are
/// `event_object`, `event_type`, `event_on` and `live_stream`. A record
/// lacking any required attribute is irrelevant, not malformed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawUpdate(pub Map<String, Value>);

impl RawUpdate {
    /// Parse a record from one line of the event stream.
    pub fn from_json_line(line: &str) -> Option<Self> {
        serde_json::from_str(line).ok()
    }

    fn str_attr(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    fn bool_attr(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    /// Object tag of the event, e.g. `"Human"`.
    pub fn event_object(&self) -> Option<&str> {
        self.str_attr("event_object")
    }

    /// Event kind tag, e.g. `"motion"`.
    pub fn event_type(&self) -> Option<&str> {
        self.str_attr("event_type")
    }

    /// Edge signal: `true` on motion start, `false` on motion end.
    pub fn event_on(&self) -> Option<bool> {
        self.bool_attr("event_on")
    }

    /// Originating stream descriptor, containing the channel number.
    pub fn live_stream(&self) -> Option<&str> {
        self.str_attr("live_stream")
    }
}

/// Maps raw update records to classified motion edges for one channel.
#[derive(Debug, Clone)]
pub struct EventNormalizer {
    channel: CameraChannel,
}

impl EventNormalizer {
    pub fn new(channel: CameraChannel) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> CameraChannel {
        self.channel
    }

    /// Normalize one record; `None` means the record is irrelevant to this
    /// channel and carries no transition.
    pub fn normalize(&self, update: &RawUpdate) -> Option<(Classification, MotionEdge)> {
        let object = update.event_object()?;
        let event_type = update.event_type()?;
        let on = update.event_on()?;

        // Channel scoping; absent in some schema versions (see module docs).
        if let Some(stream) = update.live_stream() {
            if !stream_matches_channel(stream, self.channel) {
                return None;
            }
        }

        if event_type != MOTION_EVENT_TYPE {
            return None;
        }

        let classification = match object {
            "Human" => Classification::Person,
            "Vehicle" => Classification::Vehicle,
            "Animal" => Classification::Animal,
            "" => Classification::Unspecified,
            _ => return None,
        };

        let edge = if on { MotionEdge::On } else { MotionEdge::Off };
        Some((classification, edge))
    }
}

/// True when the stream descriptor references the channel as a whole token,
/// so channel 1 does not match a descriptor for channel 12.
fn stream_matches_channel(stream: &str, channel: CameraChannel) -> bool {
    let number = channel.0.to_string();
    stream
        .split(|c: char| !c.is_ascii_digit())
        .any(|token| token == number)
}
