//! The narrow seam between a voice supervisor and whatever main-gateway
//! implementation hosts it.

use async_trait::async_trait;
use flume::Receiver;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::model::id::{ChannelId, GuildId, UserId};

/// `VOICE_SERVER_UPDATE`, as observed on the main gateway.
#[derive(Clone, Debug, Deserialize)]
pub struct VoiceServerUpdate {
    /// Ephemeral token authenticating against the named voice server.
    pub token: String,
    /// Guild whose voice server moved or was assigned.
    pub guild_id: GuildId,
    /// Host of the allocated voice gateway, or `None` while Discord has no
    /// server available.
    pub endpoint: Option<String>,
}

/// The voice-relevant slice of `VOICE_STATE_UPDATE`, as observed on the main
/// gateway.
#[derive(Clone, Debug, Deserialize)]
pub struct VoiceStateUpdate {
    /// Guild scoping this update; absent for direct-message calls, which this
    /// library cannot join.
    pub guild_id: Option<GuildId>,
    /// User whose voice state changed.
    pub user_id: UserId,
    /// Session handle to present to the voice gateway during IDENTIFY.
    pub session_id: String,
    /// Channel the user now occupies, or `None` upon leaving.
    pub channel_id: Option<ChannelId>,
}

/// Capability set a main-gateway integration must provide.
///
/// Implementations deliver op 4 payloads upstream and fan matching dispatch
/// events back down. They do **not** pair the two update halves (the
/// supervisor owns that), and they do not manage the main gateway's
/// lifecycle.
#[async_trait]
pub trait GatewayAdapter: Send + Sync {
    /// Delivers one raw payload to the main gateway.
    ///
    /// Returns whether delivery was accepted. A `false` here is surfaced to
    /// the caller as a failed join rather than retried.
    async fn send_payload(&self, payload: Value) -> bool;

    /// Stream of `VOICE_SERVER_UPDATE` events for the guilds this adapter
    /// serves.
    fn server_updates(&self) -> Receiver<VoiceServerUpdate>;

    /// Stream of `VOICE_STATE_UPDATE` events for the guilds this adapter
    /// serves.
    fn state_updates(&self) -> Receiver<VoiceStateUpdate>;

    /// Releases any resources held on behalf of the supervisor.
    fn destroy(&self) {}
}

/// Builds the op 4 voice state update announcing a join, move, mute change,
/// or departure (`channel_id: None`).
pub(crate) fn voice_state_payload(
    guild_id: GuildId,
    channel_id: Option<ChannelId>,
    self_mute: bool,
    self_deaf: bool,
) -> Value {
    json!({
        "op": 4,
        "d": {
            "guild_id": guild_id.to_string(),
            "channel_id": channel_id.map(|c| c.to_string()),
            "self_mute": self_mute,
            "self_deaf": self_deaf,
        }
    })
}
