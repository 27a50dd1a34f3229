use serde::{Deserialize, Serialize};

/// Periodic message used to keep the websocket connection alive.
///
/// Carries the last dispatch sequence observed by the client, serialized as
/// a bare JSON number.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Heartbeat {
    pub nonce: u64,
}
