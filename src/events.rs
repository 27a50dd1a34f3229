//! Observer surface of a voice connection supervisor.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use flume::Receiver;
use tracing::{info, trace};

use crate::crypto::CryptoMode;
use crate::error::ErrorKind;
use crate::supervisor::SupervisorState;

/// Trait to handle supervisor events.
///
/// Observers are registered on a supervisor and receive every event it
/// emits. Handlers must not block; the event task is shared with all other
/// observers of the same supervisor.
#[async_trait]
pub trait VoiceObserver: Send + Sync {
    /// Respond to one received event.
    async fn on_event(&self, event: &SupervisorEvent);
}

/// Lifecycle and traffic notifications emitted by a supervisor.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum SupervisorEvent {
    /// The supervisor's state machine moved.
    StateChange {
        old: SupervisorState,
        new: SupervisorState,
    },
    /// A session finished its handshake and can carry audio.
    Ready {
        /// RTP synchronisation source assigned by the server.
        ssrc: u32,
        /// Externally visible address discovered over UDP.
        external_ip: IpAddr,
        /// Externally visible port discovered over UDP.
        external_port: u16,
        /// Negotiated encryption mode.
        mode: CryptoMode,
    },
    /// Something went wrong; `kind` classifies how badly.
    Error { kind: ErrorKind, detail: String },
    /// The session ended and no reconnection is in progress.
    Disconnected { reason: String },
    /// A reconnection attempt is beginning.
    Reconnecting { attempt: u8 },
    /// Human-readable trace output for diagnosis.
    Debug(String),
    /// An inbound RTP packet was parsed and decrypted.
    Packet {
        ssrc: u32,
        sequence: u16,
        timestamp: u32,
        payload_len: usize,
    },
}

pub(crate) enum EventMessage {
    AddObserver(Arc<dyn VoiceObserver>),
    Fire(SupervisorEvent),
    Poison,
}

pub(crate) async fn runner(evt_rx: Receiver<EventMessage>) {
    info!("Event processor started.");

    let mut observers: Vec<Arc<dyn VoiceObserver>> = Vec::new();

    while let Ok(msg) = evt_rx.recv_async().await {
        match msg {
            EventMessage::AddObserver(observer) => observers.push(observer),
            EventMessage::Fire(event) => {
                trace!("Firing event {:?}.", event);
                for observer in &observers {
                    observer.on_event(&event).await;
                }
            },
            EventMessage::Poison => break,
        }
    }

    info!("Event processor finished.");
}
