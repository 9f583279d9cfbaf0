//! In-process coordinator for bench runs.
//!
//! The simulated coordinator runs on its own thread, the way a real transport
//! runs its socket I/O and reconnection off the reactor:
//! - telemetry pushes are decoded and logged
//! - remote-value queries are answered after a latency, or lost and reported
//!   as a transport error with the configured probability
//! - every `node-query-secs` it asks the node for its cached value, with
//!   `expects_reply` set
//!
//! Everything it delivers goes through the inbound queue.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::collections::VecDeque;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{Inbound, InboundQueueSender, Role, Session};
use crate::config::SimulationConfig;
use crate::error::SessionError;
use crate::event::{Event, EventId, Target, Telemetry, TelemetryKey, to_fixed_point};

/// Error code reported when a simulated peripheral query is lost.
const TIMED_OUT: i32 = libc::ETIMEDOUT;

/// Upper bound on one wait so a quiet coordinator still notices disconnects.
const MAX_WAIT_SLICE: Duration = Duration::from_secs(1);

/// Events the node may have in flight towards the coordinator thread.
const OUTBOUND_QUEUE_SIZE: usize = 32;

pub struct SimulatedCoordinator {
    outbound: Option<mpsc::SyncSender<Event>>,
    worker: Option<JoinHandle<()>>,
}

impl SimulatedCoordinator {
    /// Starts the coordinator thread and returns the node-side session.
    ///
    /// # Parameters
    ///
    /// * `role` - Role announced for this process
    /// * `host`, `port` - Coordinator address, used for logging only
    /// * `inbound` - Sender into the reactor's inbound queue; replies and
    ///   transport errors are delivered through it
    /// * `config` - Latency, loss and outdoor temperature model
    ///
    /// # Returns
    ///
    /// The open session, or `SessionError::Open` if the thread could not be spawned.
    pub fn open(role: Role, host: &str, port: u16, inbound: InboundQueueSender, config: SimulationConfig) -> Result<Self, SessionError> {
        let address = format!("{host}:{port}");
        log::info!("Opening simulated coordinator session at {} as {:?}", address, role);

        let (outbound, outbound_rx) = mpsc::sync_channel(OUTBOUND_QUEUE_SIZE);
        let worker = thread::Builder::new()
            .name("coordinator-sim".to_string())
            .spawn(move || CoordinatorState::new(config, inbound).run(outbound_rx))
            .map_err(|e| SessionError::Open {
                address,
                reason: e.to_string(),
            })?;

        Ok(Self {
            outbound: Some(outbound),
            worker: Some(worker),
        })
    }
}

impl Session for SimulatedCoordinator {
    fn send(&mut self, event: Event) -> Result<(), SessionError> {
        let outbound = self.outbound.as_ref().ok_or(SessionError::Closed)?;
        outbound.try_send(event).map_err(send_error)
    }

    fn shutdown(&mut self) {
        // Closing the channel lets the worker drain what is queued and exit.
        self.outbound.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Coordinator simulation thread panicked");
            }
            log::info!("Simulated coordinator session closed");
        }
    }
}

fn send_error(e: mpsc::TrySendError<Event>) -> SessionError {
    match e {
        mpsc::TrySendError::Full(event) => SessionError::QueueFull(event.id.to_string()),
        mpsc::TrySendError::Disconnected(_) => SessionError::Closed,
    }
}

impl Drop for SimulatedCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct CoordinatorState {
    config: SimulationConfig,
    inbound: InboundQueueSender,
    rng: StdRng,
    pending: VecDeque<(Instant, Inbound)>,
    next_node_query: Option<Instant>,
}

impl CoordinatorState {
    fn new(config: SimulationConfig, inbound: InboundQueueSender) -> Self {
        let next_node_query = (config.node_query_secs > 0).then(|| Instant::now() + Duration::from_secs(config.node_query_secs));
        Self {
            config,
            inbound,
            rng: StdRng::from_entropy(),
            pending: VecDeque::new(),
            next_node_query,
        }
    }

    fn run(mut self, outbound_rx: mpsc::Receiver<Event>) {
        loop {
            let now = Instant::now();
            let wake_at = [self.pending.front().map(|(due, _)| *due), self.next_node_query]
                .into_iter()
                .flatten()
                .min()
                .unwrap_or(now + MAX_WAIT_SLICE);
            let wait = wake_at.saturating_duration_since(now).min(MAX_WAIT_SLICE);

            match outbound_rx.recv_timeout(wait) {
                Ok(event) => self.handle_outbound(event),
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }

            self.deliver_due(Instant::now());
        }
        log::debug!("Coordinator simulation stopped with {} undelivered items", self.pending.len());
    }

    fn handle_outbound(&mut self, event: Event) {
        match event.id {
            EventId::TelemetryPush => {
                let field = |key| Telemetry::value(&event.payload, key).map(|v| format!("{:.1}", v as f32 / 10.0));
                log::info!(
                    "Coordinator received telemetry: outdoor={:?} indoor={:?} pressure={:?} humidity={:?}",
                    field(TelemetryKey::OutdoorTemperature),
                    field(TelemetryKey::IndoorTemperature),
                    field(TelemetryKey::Pressure),
                    field(TelemetryKey::Humidity),
                );
            }
            EventId::RemoteValueQuery => {
                let due = Instant::now() + Duration::from_millis(self.config.reply_latency_ms);
                let reply = if self.rng.gen_bool(self.config.drop_probability) {
                    Inbound::TransportError {
                        code: TIMED_OUT,
                        message: "peripheral did not answer remote value query".to_string(),
                    }
                } else {
                    let jitter: f32 = self.rng.sample(StandardNormal);
                    let value = self.config.outdoor_temperature + jitter * self.config.outdoor_temperature_jitter;
                    Inbound::Event(Event::remote_value_result(Some(to_fixed_point(value)), Target::Node))
                };
                self.pending.push_back((due, reply));
            }
            EventId::RemoteValueResult => {
                log::info!("Coordinator received node value: {:?}", event.payload.first());
            }
            other => {
                log::debug!("Coordinator ignoring {} from node", other);
            }
        }
    }

    fn deliver_due(&mut self, now: Instant) {
        while self.pending.front().is_some_and(|(due, _)| *due <= now) {
            if let Some((_, item)) = self.pending.pop_front() {
                self.deliver(item);
            }
        }

        if let Some(at) = self.next_node_query {
            if at <= now {
                self.deliver(Inbound::Event(Event::new(EventId::RemoteValueQuery, Target::Node).expecting_reply()));
                self.next_node_query = Some(now + Duration::from_secs(self.config.node_query_secs));
            }
        }
    }

    fn deliver(&self, item: Inbound) {
        if self.inbound.try_send(item).is_err() {
            log::warn!("Inbound queue full, simulated delivery dropped");
        }
    }
}
