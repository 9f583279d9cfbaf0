//! Single-threaded cooperative reactor driving the node.
//!
//! One embassy executor runs on a dedicated thread with one task, the node
//! loop. Each iteration `select3` waits for, in priority order:
//! 1) the shutdown wakeup
//! 2) the next poll tick
//! 3) the next inbound item from the session
//!
//! and runs the matching callback to completion before waiting again. No two
//! callbacks ever overlap, so the node state needs no locking. A shutdown
//! wakeup is noticed at the next wait, after the running callback returns.

use embassy_executor::{Executor, Spawner};
use embassy_futures::select::{Either3, select3};
use embassy_time::{Duration, Ticker};
use std::sync::mpsc;
use std::thread;

use crate::error::ReactorError;
use crate::node::NodeContext;
use crate::session::InboundQueueReceiver;
use crate::shutdown::ShutdownSignal;

type ExitSender = mpsc::Sender<Result<NodeContext, ReactorError>>;

pub struct Reactor {
    poll_interval: Duration,
    shutdown: &'static ShutdownSignal,
    inbound: InboundQueueReceiver,
}

impl Reactor {
    pub fn new(poll_interval: std::time::Duration, shutdown: &'static ShutdownSignal, inbound: InboundQueueReceiver) -> Self {
        Self {
            poll_interval: Duration::from_micros(poll_interval.as_micros() as u64),
            shutdown,
            inbound,
        }
    }

    /// Drives `node` until the shutdown wakeup fires, then hands it back for teardown.
    ///
    /// Blocks the calling thread for the lifetime of the node. The executor
    /// runs on a dedicated `node-reactor` thread and is leaked; it is never
    /// reused after the node task returns.
    ///
    /// # Parameters
    ///
    /// * `node` - Fully constructed node state, moved onto the reactor thread
    ///
    /// # Returns
    ///
    /// The same `NodeContext` once the loop has stopped, or a `ReactorError`
    /// if the thread or the task could not be started.
    pub fn run(self, node: NodeContext) -> Result<NodeContext, ReactorError> {
        let (exit_tx, exit_rx) = mpsc::channel();

        thread::Builder::new()
            .name("node-reactor".to_string())
            .spawn(move || {
                // INTENTIONAL LEAK: the executor must be 'static and lives until process exit.
                let executor: &'static mut Executor = Box::leak(Box::new(Executor::new()));
                executor.run(move |spawner| self.start(spawner, node, exit_tx));
            })
            .map_err(ReactorError::Thread)?;

        exit_rx.recv().unwrap_or(Err(ReactorError::Lost))
    }

    fn start(self, spawner: Spawner, node: NodeContext, exit_tx: ExitSender) {
        let token = node_task(node, self.poll_interval, self.shutdown, self.inbound, exit_tx.clone());
        if let Err(e) = spawner.spawn(token) {
            log::error!("Could not register poll task: {:?}", e);
            let _ = exit_tx.send(Err(ReactorError::Spawn(format!("{:?}", e))));
        }
    }
}

#[embassy_executor::task]
async fn node_task(
    mut node: NodeContext,
    poll_interval: Duration,
    shutdown: &'static ShutdownSignal,
    inbound: InboundQueueReceiver,
    exit_tx: ExitSender,
) {
    run_node(&mut node, poll_interval, shutdown, &inbound).await;
    // Main is blocked in `Reactor::run`; if it is gone there is nobody left to tear down.
    let _ = exit_tx.send(Ok(node));
}

/// The reactor loop proper. Returns once the shutdown wakeup has fired.
///
/// Sends the startup remote-value query, then waits on the shutdown wakeup,
/// the poll ticker and the inbound queue in that priority order. Each
/// callback runs to completion before the next wait.
///
/// # Parameters
///
/// * `node` - Node state mutated by every callback
/// * `poll_interval` - Period of the telemetry ticker
/// * `shutdown` - Wakeup activated by the shutdown bridge
/// * `inbound` - Receiver for events and transport errors from the session
pub async fn run_node(node: &mut NodeContext, poll_interval: Duration, shutdown: &ShutdownSignal, inbound: &InboundQueueReceiver) {
    log::info!("Reactor running, polling every {} ms", poll_interval.as_millis());

    // First remote value request goes out at t=0 so the first telemetry can carry it.
    if let Err(e) = node.request_remote_value() {
        log::warn!("Failed to query remote value: {}", e);
    }

    let mut ticker = Ticker::every(poll_interval);
    loop {
        match select3(shutdown.wait(), ticker.next(), inbound.receive()).await {
            Either3::First(()) => {
                log::info!("Shutdown wakeup received, leaving reactor loop");
                break;
            }
            Either3::Second(()) => {
                node.poll_cycle();
            }
            Either3::Third(item) => {
                node.handle_inbound(item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, EventId, Target};
    use crate::session::{Inbound, InboundQueue};
    use crate::testing;
    use embassy_futures::block_on;
    use embassy_sync::signal::Signal;

    fn leak<T>(value: T) -> &'static T {
        Box::leak(Box::new(value))
    }

    fn signal_after(shutdown: &'static ShutdownSignal, delay: std::time::Duration) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            thread::sleep(delay);
            shutdown.signal(());
        })
    }

    #[test]
    fn pending_shutdown_stops_the_loop_immediately() {
        let (mut node, log, _) = testing::node(true, 3);
        let shutdown: &'static ShutdownSignal = leak(Signal::new());
        let queue: &'static InboundQueue = leak(InboundQueue::new());
        shutdown.signal(());

        block_on(run_node(&mut node, Duration::from_secs(3600), shutdown, &queue.receiver()));

        assert!(log.of(EventId::TelemetryPush).is_empty());
        assert_eq!(log.of(EventId::RemoteValueQuery).len(), 1, "startup query is sent before waiting");
    }

    #[test]
    fn shutdown_takes_priority_over_pending_work() {
        let (mut node, _, _) = testing::node(true, 3);
        let shutdown: &'static ShutdownSignal = leak(Signal::new());
        let queue: &'static InboundQueue = leak(InboundQueue::new());
        queue.try_send(Inbound::Event(Event::remote_value_result(Some(9), Target::Node))).unwrap();
        shutdown.signal(());

        block_on(run_node(&mut node, Duration::from_secs(3600), shutdown, &queue.receiver()));

        assert!(!node.correlation().is_valid());
    }

    #[test]
    fn inbound_events_are_dispatched_in_order() {
        let (mut node, log, _) = testing::node(true, 3);
        let shutdown: &'static ShutdownSignal = leak(Signal::new());
        let queue: &'static InboundQueue = leak(InboundQueue::new());
        queue.try_send(Inbound::Event(Event::remote_value_result(Some(1), Target::Node))).unwrap();
        queue
            .try_send(Inbound::TransportError {
                code: 111,
                message: "connection refused".to_string(),
            })
            .unwrap();
        queue.try_send(Inbound::Event(Event::remote_value_result(Some(2), Target::Node))).unwrap();
        queue.try_send(Inbound::Event(Event::new(EventId::Unrecognized(50), Target::Node).expecting_reply())).unwrap();
        let stopper = signal_after(shutdown, std::time::Duration::from_millis(200));

        block_on(run_node(&mut node, Duration::from_secs(3600), shutdown, &queue.receiver()));
        stopper.join().unwrap();

        assert_eq!(node.correlation().fresh_value(), Some(2));
        let acks = log.of(EventId::GenericAcknowledge);
        assert_eq!(acks, vec![Event::acknowledge(EventId::Unrecognized(50), Target::Coordinator)]);
    }

    #[test]
    fn ticker_drives_poll_cycles() {
        let (mut node, log, _) = testing::node(true, 3);
        let shutdown: &'static ShutdownSignal = leak(Signal::new());
        let queue: &'static InboundQueue = leak(InboundQueue::new());
        let stopper = signal_after(shutdown, std::time::Duration::from_millis(300));

        block_on(run_node(&mut node, Duration::from_millis(50), shutdown, &queue.receiver()));
        stopper.join().unwrap();

        let telemetry = log.of(EventId::TelemetryPush).len();
        assert!(telemetry >= 2, "expected several poll cycles, got {telemetry}");
        assert_eq!(log.of(EventId::RemoteValueQuery).len(), telemetry + 1);
    }

    #[test]
    fn run_returns_the_node_for_teardown() {
        let (node, log, _) = testing::node(true, 3);
        let shutdown: &'static ShutdownSignal = leak(Signal::new());
        let queue: &'static InboundQueue = leak(InboundQueue::new());
        let stopper = signal_after(shutdown, std::time::Duration::from_millis(100));

        let node = Reactor::new(std::time::Duration::from_secs(3600), shutdown, queue.receiver()).run(node).unwrap();
        stopper.join().unwrap();

        assert!(!log.is_closed());
        node.shutdown();
        assert!(log.is_closed());
    }
}
