use std::sync::Arc;
use std::time::Duration;

use flume::Sender;

use crate::adapter::{VoiceServerUpdate, VoiceStateUpdate};
use crate::error::Result;
use crate::events::VoiceObserver;
use crate::supervisor::SupervisorState;

/// Mail processed by the supervisor core task.
pub(crate) enum CoreMessage {
    /// Caller wants a connection; answer on the enclosed channel.
    Connect(Sender<Result<()>>),
    /// Caller wants out of the channel.
    Disconnect,
    /// Caller is done with this supervisor forever.
    Destroy,
    /// One pre-encoded Opus frame to place on the wire.
    SendAudio(Vec<u8>),
    /// Caller toggled the speaking indicator.
    SetSpeaking(bool),
    /// Register an observer with the event dispatcher.
    AddObserver(Arc<dyn VoiceObserver>),
    /// Main gateway announced a voice server for our guild.
    ServerUpdate(VoiceServerUpdate),
    /// Main gateway announced our own voice state.
    StateUpdate(VoiceStateUpdate),
    /// The in-flight handshake moved to a later phase.
    Phase(SupervisorState),
    /// The websocket task gave up on heartbeat ACKs.
    GatewayStale,
    /// The UDP task gave up on keepalive replies.
    TransportStale,
    /// The websocket closed, with a close code if the peer sent one.
    WsClosed(Option<u16>),
    /// Round-trip estimate from the keepalive exchange.
    Ping(Duration),
    Poison,
}
