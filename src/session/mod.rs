//! Coordinator session seam.
//!
//! The session collaborator owns the connection to the coordinator: opening,
//! framing, reconnecting. The node consumes it through two halves:
//! - [`Session`] for outbound, non-blocking sends and teardown
//! - the inbound queue, into which the session pushes [`Inbound`] items from
//!   whatever thread its I/O runs on
//!
//! The inbound queue is the only way session threads reach reactor-owned
//! state; `try_send` on an embassy channel is safe from any thread and wakes
//! the reactor.

pub mod simulated;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::error::SessionError;
use crate::event::Event;

pub use simulated::SimulatedCoordinator;

/// Depth of the inbound queue (session → reactor).
pub const INBOUND_QUEUE_SIZE: usize = 16;
/// Bounded channel carrying inbound events to the reactor.
pub type InboundQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, Inbound, INBOUND_QUEUE_SIZE>;
/// Receiver side of the inbound queue, owned by the reactor.
pub type InboundQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, Inbound, INBOUND_QUEUE_SIZE>;
/// Sender side of the inbound queue, handed to the session on open.
pub type InboundQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, Inbound, INBOUND_QUEUE_SIZE>;

/// Role this process announces when opening the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Node,
}

/// One delivery from the session to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Event(Event),
    /// The transport failed instead of delivering an event.
    TransportError { code: i32, message: String },
}

pub trait Session: Send {
    /// Queues `event` for transmission. Never blocks on the network.
    fn send(&mut self, event: Event) -> Result<(), SessionError>;

    /// Drains pending sends and closes the connection.
    fn shutdown(&mut self);
}
