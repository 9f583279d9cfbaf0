//! Process-wide node state and the callbacks the reactor drives.
//!
//! [`NodeContext`] is constructed once in `main`, moved into the reactor task
//! and handed back for teardown. All callbacks run on the reactor thread, so
//! nothing here is synchronized.
//!
//! - `poller`: the recurring telemetry cycle
//! - `dispatcher`: inbound events and replies
//! - `correlation`: the remote-value cache shared by both

pub mod correlation;
mod dispatcher;
mod poller;

use crate::config::PollerConfig;
use crate::error::SessionError;
use crate::event::Event;
use crate::sensors::SensorDriver;
use crate::session::Session;

pub use correlation::CorrelationState;

pub struct NodeContext {
    session: Box<dyn Session>,
    sensors: Box<dyn SensorDriver>,
    sensors_enabled: bool,
    correlation: CorrelationState,
    poller: PollerConfig,
}

impl NodeContext {
    /// Takes ownership of an opened session and brings the sensors up.
    ///
    /// A sensor init failure is not fatal; the poller retries on every cycle.
    pub fn new(session: Box<dyn Session>, mut sensors: Box<dyn SensorDriver>, poller: PollerConfig) -> Self {
        let sensors_enabled = match sensors.init() {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Sensors unavailable at startup: {}", e);
                false
            }
        };

        Self {
            session,
            sensors,
            sensors_enabled,
            correlation: CorrelationState::new(poller.max_staleness),
            poller,
        }
    }

    #[cfg(test)]
    pub fn correlation(&self) -> &CorrelationState {
        &self.correlation
    }

    #[cfg(test)]
    pub fn sensors_enabled(&self) -> bool {
        self.sensors_enabled
    }

    /// Sends a remote-value query with `expects_reply` set.
    ///
    /// Only the send outcome is returned. The value shows up in
    /// [`NodeContext::correlation`] once the result event has been dispatched
    /// on a later reactor iteration.
    pub fn request_remote_value(&mut self) -> Result<(), SessionError> {
        self.session.send(Event::remote_value_query())
    }

    fn send(&mut self, event: Event, what: &str) {
        let id = event.id;
        if let Err(e) = self.session.send(event) {
            log::warn!("Failed to send {} ({}): {}", what, id, e);
        }
    }

    /// Tears the session down. Ends the node's life.
    pub fn shutdown(mut self) {
        log::info!("Shutting down coordinator session");
        self.session.shutdown();
    }
}
