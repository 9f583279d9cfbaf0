//! Recurring telemetry cycle.
//!
//! Each tick: heal the sensors if needed, grab a burst, pick up the cached
//! remote value if it is still fresh, push one telemetry event, then ask for
//! the next remote value. The event goes out even when nothing is available,
//! so the coordinator sees a steady heartbeat.

use super::NodeContext;
use crate::event::{Event, Telemetry};
use crate::sensors::SensorReading;

impl NodeContext {
    /// Runs one poll cycle and returns the telemetry event handed to the session.
    pub fn poll_cycle(&mut self) -> Event {
        let reading = self.sample_sensors();

        let remote = self.correlation.take_for_publish();
        if let Some(value) = remote {
            log::debug!("Publishing remote value {} (staleness {})", value, self.correlation.staleness());
        } else if self.correlation.is_valid() {
            log::debug!("Remote value {} too stale to publish", self.correlation.last_known_value());
        }

        let event = Telemetry::new().with_remote_value(remote).with_reading(reading.as_ref()).into_event();
        self.send(event.clone(), "telemetry");

        if let Err(e) = self.request_remote_value() {
            log::warn!("Failed to query remote value: {}", e);
        }

        event
    }

    fn sample_sensors(&mut self) -> Option<SensorReading> {
        if !self.sensors_enabled {
            match self.sensors.init() {
                Ok(()) => {
                    log::info!("Sensors became available");
                    self.sensors_enabled = true;
                }
                Err(e) => {
                    log::debug!("Sensors still unavailable: {}", e);
                    return None;
                }
            }
        }

        match self.sensors.grab(self.poller.burst_samples, self.poller.sample_interval()) {
            Ok(reading) => Some(reading),
            Err(e) => {
                log::error!("Failed to grab sensor data: {}", e);
                // Re-initialize on the next cycle, not this one.
                self.sensors_enabled = false;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::event::{Event, EventId, TELEMETRY_SLOTS, Target, Telemetry, TelemetryKey, to_fixed_point};
    use crate::session::Inbound;
    use crate::testing::{self, READING};

    fn result(value: i32) -> Inbound {
        Inbound::Event(Event::remote_value_result(Some(value), Target::Node))
    }

    #[test]
    fn telemetry_carries_sensor_reading() {
        let (mut node, log, _) = testing::node(true, 3);

        let event = node.poll_cycle();

        assert_eq!(event.id, EventId::TelemetryPush);
        assert_eq!(event.target, Target::Coordinator);
        assert!(!event.expects_reply);
        assert_eq!(Telemetry::value(&event.payload, TelemetryKey::IndoorTemperature), Some(to_fixed_point(READING.temperature)));
        assert_eq!(Telemetry::value(&event.payload, TelemetryKey::Pressure), Some(10000));
        assert_eq!(Telemetry::value(&event.payload, TelemetryKey::Humidity), Some(500));
        assert_eq!(Telemetry::value(&event.payload, TelemetryKey::OutdoorTemperature), None);
        assert_eq!(log.of(EventId::TelemetryPush), vec![event]);
    }

    #[test]
    fn heartbeat_is_sent_without_any_data() {
        let (mut node, log, _) = testing::node(false, 3);

        let event = node.poll_cycle();

        assert_eq!(event.payload, vec![0; TELEMETRY_SLOTS]);
        assert_eq!(log.of(EventId::TelemetryPush).len(), 1);
    }

    #[test]
    fn every_cycle_issues_a_query_expecting_reply() {
        let (mut node, log, _) = testing::node(true, 3);

        node.poll_cycle();
        node.poll_cycle();

        let queries = log.of(EventId::RemoteValueQuery);
        assert_eq!(queries.len(), 2);
        assert!(queries.iter().all(|q| q.expects_reply));
        let order: Vec<EventId> = log.events().iter().map(|e| e.id).collect();
        assert_eq!(order[0], EventId::TelemetryPush);
        assert_eq!(order[1], EventId::RemoteValueQuery);
    }

    #[test]
    fn burst_failure_keeps_remote_value_and_sends_event() {
        let (mut node, log, control) = testing::node(true, 3);
        node.handle_inbound(result(-42));
        control.set_grab_ok(false);

        let event = node.poll_cycle();

        assert_eq!(Telemetry::value(&event.payload, TelemetryKey::OutdoorTemperature), Some(-42));
        assert_eq!(Telemetry::value(&event.payload, TelemetryKey::IndoorTemperature), None);
        assert_eq!(Telemetry::value(&event.payload, TelemetryKey::Pressure), None);
        assert_eq!(log.of(EventId::TelemetryPush).len(), 1);
        assert!(!node.sensors_enabled());
    }

    #[test]
    fn burst_is_not_retried_within_a_cycle() {
        let (mut node, _, control) = testing::node(true, 3);
        control.set_grab_ok(false);

        node.poll_cycle();

        assert_eq!(control.grabs(), 1);
        assert_eq!(control.inits(), 1);
    }

    #[test]
    fn sensors_heal_without_restart() {
        let (mut node, _, control) = testing::node(false, 3);
        assert!(!node.sensors_enabled());

        let event = node.poll_cycle();
        assert_eq!(Telemetry::value(&event.payload, TelemetryKey::Humidity), None);
        assert_eq!(control.grabs(), 0, "no grab while init keeps failing");

        control.set_available(true);
        let event = node.poll_cycle();
        assert!(node.sensors_enabled());
        assert_eq!(Telemetry::value(&event.payload, TelemetryKey::Humidity), Some(500));
    }

    #[test]
    fn failed_burst_reinitializes_on_next_cycle() {
        let (mut node, _, control) = testing::node(true, 3);
        control.set_grab_ok(false);
        node.poll_cycle();

        control.set_grab_ok(true);
        let event = node.poll_cycle();

        assert_eq!(control.inits(), 2);
        assert_eq!(Telemetry::value(&event.payload, TelemetryKey::Pressure), Some(10000));
    }

    #[test]
    fn send_failure_does_not_abort_the_cycle() {
        let (mut node, log, _) = testing::node(true, 3);
        log.fail_sends(true);

        let event = node.poll_cycle();

        assert_eq!(event.id, EventId::TelemetryPush);
        log.fail_sends(false);
        node.poll_cycle();
        assert_eq!(log.of(EventId::TelemetryPush).len(), 1);
    }

    /// 10 s interval, max staleness 3: a result received before the first
    /// tick is published at 10, 20 and 30 s and dropped from 40 s on.
    #[test]
    fn remote_value_ages_out_after_max_staleness() {
        let (mut node, _, _) = testing::node(true, 3);

        // t=0: query goes out; the result arrives on a later dispatch.
        node.request_remote_value().unwrap();
        assert_eq!(node.correlation().fresh_value(), None);
        node.handle_inbound(result(55));

        let mut published = Vec::new();
        for _tick in [10, 20, 30, 40, 50] {
            let event = node.poll_cycle();
            published.push((
                Telemetry::value(&event.payload, TelemetryKey::OutdoorTemperature),
                node.correlation().staleness(),
            ));
        }

        assert_eq!(published[0], (Some(55), 1));
        assert_eq!(published[1], (Some(55), 2));
        assert_eq!(published[2], (Some(55), 3));
        assert_eq!(published[3].0, None);
        assert_eq!(published[4].0, None);
        assert!(node.correlation().is_valid());
    }

    #[test]
    fn refresh_between_cycles_restarts_publication() {
        let (mut node, _, _) = testing::node(true, 2);
        node.handle_inbound(result(10));
        node.poll_cycle();
        node.poll_cycle();
        let stale = node.poll_cycle();
        assert_eq!(Telemetry::value(&stale.payload, TelemetryKey::OutdoorTemperature), None);

        node.handle_inbound(result(11));
        let fresh = node.poll_cycle();
        assert_eq!(Telemetry::value(&fresh.payload, TelemetryKey::OutdoorTemperature), Some(11));
    }
}
