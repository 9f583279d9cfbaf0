//! Test doubles for the session and sensor seams.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::PollerConfig;
use crate::error::{SensorError, SessionError};
use crate::event::{Event, EventId};
use crate::node::NodeContext;
use crate::sensors::{SensorDriver, SensorReading};
use crate::session::Session;

pub const READING: SensorReading = SensorReading {
    temperature: 20.5,
    pressure: 1000.0,
    humidity: 50.0,
};

/// Shared view of everything a [`RecordingSession`] was asked to send.
#[derive(Clone, Default)]
pub struct SentLog {
    events: Arc<Mutex<Vec<Event>>>,
    closed: Arc<AtomicBool>,
    failing: Arc<AtomicBool>,
}

impl SentLog {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn of(&self, id: EventId) -> Vec<Event> {
        self.events().into_iter().filter(|e| e.id == id).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn fail_sends(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

pub struct RecordingSession {
    log: SentLog,
}

impl Session for RecordingSession {
    fn send(&mut self, event: Event) -> Result<(), SessionError> {
        if self.log.failing.load(Ordering::SeqCst) {
            return Err(SessionError::QueueFull(event.id.to_string()));
        }
        self.log.events.lock().unwrap().push(event);
        Ok(())
    }

    fn shutdown(&mut self) {
        self.log.closed.store(true, Ordering::SeqCst);
    }
}

/// Switches and counters shared with a [`ScriptedSensors`].
#[derive(Clone)]
pub struct SensorControl {
    init_ok: Arc<AtomicBool>,
    grab_ok: Arc<AtomicBool>,
    inits: Arc<AtomicUsize>,
    grabs: Arc<AtomicUsize>,
}

impl SensorControl {
    pub fn set_available(&self, available: bool) {
        self.init_ok.store(available, Ordering::SeqCst);
    }

    pub fn set_grab_ok(&self, ok: bool) {
        self.grab_ok.store(ok, Ordering::SeqCst);
    }

    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn grabs(&self) -> usize {
        self.grabs.load(Ordering::SeqCst)
    }
}

pub struct ScriptedSensors {
    control: SensorControl,
    initialized: bool,
}

impl SensorDriver for ScriptedSensors {
    fn init(&mut self) -> Result<(), SensorError> {
        self.control.inits.fetch_add(1, Ordering::SeqCst);
        self.initialized = self.control.init_ok.load(Ordering::SeqCst);
        if self.initialized { Ok(()) } else { Err(SensorError::NotFound("/scripted".into())) }
    }

    fn grab(&mut self, samples: u8, _sample_interval: Duration) -> Result<SensorReading, SensorError> {
        self.control.grabs.fetch_add(1, Ordering::SeqCst);
        if !self.initialized {
            return Err(SensorError::NotInitialized);
        }
        if !self.control.grab_ok.load(Ordering::SeqCst) {
            return Err(SensorError::Burst {
                taken: 0,
                requested: samples,
                reason: "scripted failure".to_string(),
            });
        }
        Ok(READING)
    }
}

pub fn recording_session() -> (Box<dyn Session>, SentLog) {
    let log = SentLog::default();
    (Box::new(RecordingSession { log: log.clone() }), log)
}

pub fn scripted_sensors(available: bool) -> (Box<dyn SensorDriver>, SensorControl) {
    let control = SensorControl {
        init_ok: Arc::new(AtomicBool::new(available)),
        grab_ok: Arc::new(AtomicBool::new(true)),
        inits: Arc::new(AtomicUsize::new(0)),
        grabs: Arc::new(AtomicUsize::new(0)),
    };
    let sensors = ScriptedSensors {
        control: control.clone(),
        initialized: false,
    };
    (Box::new(sensors), control)
}

/// Node wired to test doubles with the reference poller settings.
pub fn node(sensors_available: bool, max_staleness: u32) -> (NodeContext, SentLog, SensorControl) {
    let (session, log) = recording_session();
    let (sensors, control) = scripted_sensors(sensors_available);
    let poller = PollerConfig {
        sample_interval_ms: 0,
        max_staleness,
        ..PollerConfig::default()
    };
    (NodeContext::new(session, sensors, poller), log, control)
}
