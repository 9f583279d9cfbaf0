//! Coordinator protocol events.
//!
//! An [`Event`] is the unit exchanged with the coordinator session. Its
//! payload is a flat sequence of signed 32-bit values whose meaning depends on
//! the identifier:
//! - `TelemetryPush`: fixed 8-slot layout of key/value pairs (see [`Telemetry`])
//! - `RemoteValueResult`: a single value in slot 0
//! - `RemoteValueQuery`, `GenericAcknowledge`: no payload required
//!
//! Physical quantities travel as fixed-point integers scaled by ten.

use std::fmt;

use crate::sensors::SensorReading;

/// Number of payload slots in a telemetry event.
pub const TELEMETRY_SLOTS: usize = 8;

/// Scale applied to physical values before they go on the wire.
pub const FIXED_POINT_SCALE: f32 = 10.0;

/// Enumerated event kind.
///
/// Unknown numeric codes are preserved in [`EventId::Unrecognized`] so that
/// coordinator-side additions reach the dispatcher instead of being rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventId {
    TelemetryPush,
    RemoteValueQuery,
    RemoteValueResult,
    GenericAcknowledge,
    Unrecognized(i32),
}

impl EventId {
    pub fn code(self) -> i32 {
        match self {
            EventId::TelemetryPush => 1,
            EventId::RemoteValueQuery => 2,
            EventId::RemoteValueResult => 3,
            EventId::GenericAcknowledge => 4,
            EventId::Unrecognized(code) => code,
        }
    }
}

impl From<i32> for EventId {
    fn from(code: i32) -> Self {
        match code {
            1 => EventId::TelemetryPush,
            2 => EventId::RemoteValueQuery,
            3 => EventId::RemoteValueResult,
            4 => EventId::GenericAcknowledge,
            other => EventId::Unrecognized(other),
        }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventId::TelemetryPush => write!(f, "telemetry-push"),
            EventId::RemoteValueQuery => write!(f, "remote-value-query"),
            EventId::RemoteValueResult => write!(f, "remote-value-result"),
            EventId::GenericAcknowledge => write!(f, "generic-acknowledge"),
            EventId::Unrecognized(code) => write!(f, "unrecognized({})", code),
        }
    }
}

/// Logical recipient role of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Coordinator,
    Node,
    /// Peripheral hanging off the coordinator (e.g. the outdoor sensor board).
    Peripheral,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    pub target: Target,
    /// Sender holds a correlation slot open until a reply arrives.
    pub expects_reply: bool,
    pub payload: Vec<i32>,
}

impl Event {
    pub fn new(id: EventId, target: Target) -> Self {
        Self {
            id,
            target,
            expects_reply: false,
            payload: Vec::new(),
        }
    }

    pub fn with_payload(mut self, payload: Vec<i32>) -> Self {
        self.payload = payload;
        self
    }

    pub fn expecting_reply(mut self) -> Self {
        self.expects_reply = true;
        self
    }

    /// Query for the remote value held by the peripheral behind the coordinator.
    pub fn remote_value_query() -> Self {
        Event::new(EventId::RemoteValueQuery, Target::Peripheral).expecting_reply()
    }

    pub fn remote_value_result(value: Option<i32>, target: Target) -> Self {
        Event::new(EventId::RemoteValueResult, target).with_payload(value.into_iter().collect())
    }

    pub fn acknowledge(request: EventId, target: Target) -> Self {
        Event::new(EventId::GenericAcknowledge, target).with_payload(vec![request.code()])
    }
}

/// Semantic key tagging a telemetry value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryKey {
    /// Remote (outdoor) temperature obtained through a correlated query.
    OutdoorTemperature,
    /// Local board temperature.
    IndoorTemperature,
    Pressure,
    Humidity,
}

impl TelemetryKey {
    pub fn code(self) -> i32 {
        match self {
            TelemetryKey::OutdoorTemperature => 1,
            TelemetryKey::IndoorTemperature => 2,
            TelemetryKey::Pressure => 3,
            TelemetryKey::Humidity => 4,
        }
    }

    fn slot(self) -> usize {
        match self {
            TelemetryKey::OutdoorTemperature => 0,
            TelemetryKey::IndoorTemperature => 2,
            TelemetryKey::Pressure => 4,
            TelemetryKey::Humidity => 6,
        }
    }
}

/// Converts a physical value to the ×10 fixed-point wire representation.
pub fn to_fixed_point(value: f32) -> i32 {
    (value * FIXED_POINT_SCALE).round() as i32
}

/// Builder for the fixed 8-slot telemetry payload.
///
/// Absent quantities leave their key/value pair zeroed, so an empty
/// `Telemetry` still produces a full-length heartbeat payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Telemetry {
    slots: [i32; TELEMETRY_SLOTS],
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: TelemetryKey, value: i32) {
        let slot = key.slot();
        self.slots[slot] = key.code();
        self.slots[slot + 1] = value;
    }

    pub fn with_remote_value(mut self, value: Option<i32>) -> Self {
        if let Some(value) = value {
            self.set(TelemetryKey::OutdoorTemperature, value);
        }
        self
    }

    pub fn with_reading(mut self, reading: Option<&SensorReading>) -> Self {
        if let Some(reading) = reading {
            self.set(TelemetryKey::IndoorTemperature, to_fixed_point(reading.temperature));
            self.set(TelemetryKey::Pressure, to_fixed_point(reading.pressure));
            self.set(TelemetryKey::Humidity, to_fixed_point(reading.humidity));
        }
        self
    }

    /// Reads a tagged value back out of a telemetry payload.
    pub fn value(payload: &[i32], key: TelemetryKey) -> Option<i32> {
        let slot = key.slot();
        match payload.get(slot..slot + 2) {
            Some([tag, value]) if *tag == key.code() => Some(*value),
            _ => None,
        }
    }

    pub fn into_event(self) -> Event {
        Event::new(EventId::TelemetryPush, Target::Coordinator).with_payload(self.slots.to_vec())
    }
}
