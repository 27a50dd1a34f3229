use serde::{Deserialize, Serialize};

/// Acknowledgement from the server for a prior voice heartbeat.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct HeartbeatAck {
    pub nonce: u64,
}
