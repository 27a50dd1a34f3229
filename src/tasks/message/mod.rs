use flume::Sender;

mod core;
mod udp_rx;
mod udp_tx;
mod ws;

pub(crate) use self::core::*;
pub(crate) use self::udp_rx::*;
pub(crate) use self::udp_tx::*;
pub(crate) use self::ws::*;

use crate::events::{EventMessage, SupervisorEvent};

/// Shared handles through which every background task reaches the supervisor
/// core and the event dispatcher.
#[derive(Clone)]
pub(crate) struct Interconnect {
    pub core: Sender<CoreMessage>,
    pub events: Sender<EventMessage>,
}

impl Interconnect {
    pub fn fire(&self, event: SupervisorEvent) {
        let _ = self.events.send(EventMessage::Fire(event));
    }

    pub fn poison_events(&self) {
        let _ = self.events.send(EventMessage::Poison);
    }
}
