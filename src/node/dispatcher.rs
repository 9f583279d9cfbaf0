//! Inbound event dispatch.
//!
//! Called once per item the session delivers. A transport error carries no
//! event and only gets logged. Events are classified by identifier; anything
//! unrecognized is logged at debug and ignored so coordinator-side additions
//! never break the node. When the sender expects a reply, one is always built.

use super::NodeContext;
use crate::event::{Event, EventId, Target};
use crate::session::Inbound;

impl NodeContext {
    /// Dispatches one inbound item and returns the reply to send, if the sender asked for one.
    pub fn dispatch(&mut self, inbound: &Inbound) -> Option<Event> {
        let event = match inbound {
            Inbound::Event(event) => event,
            Inbound::TransportError { code, message } => {
                log::error!("Session transport error ({}): {}", code, message);
                return None;
            }
        };

        match event.id {
            EventId::RemoteValueResult => match event.payload.first() {
                Some(&value) => {
                    self.correlation.refresh(value);
                    log::debug!("Remote value refreshed: {}", value);
                }
                None => log::debug!("Empty remote value result ignored"),
            },
            EventId::RemoteValueQuery => {
                log::debug!("Coordinator asked for cached remote value");
            }
            EventId::GenericAcknowledge => {
                log::debug!("Acknowledged: {:?}", event.payload.first().map(|code| EventId::from(*code)));
            }
            EventId::TelemetryPush => {
                log::debug!("Telemetry push addressed to node ignored");
            }
            EventId::Unrecognized(code) => {
                log::debug!("eventid: {}", code);
            }
        }

        event.expects_reply.then(|| self.reply_for(event))
    }

    /// Dispatches `inbound` and sends the reply, if any.
    pub fn handle_inbound(&mut self, inbound: Inbound) {
        if let Some(reply) = self.dispatch(&inbound) {
            self.send(reply, "reply");
        }
    }

    fn reply_for(&self, request: &Event) -> Event {
        match request.id {
            EventId::RemoteValueQuery => Event::remote_value_result(self.correlation.fresh_value(), Target::Coordinator),
            other => Event::acknowledge(other, Target::Coordinator),
        }
    }
}
