use serde::{Deserialize, Serialize};

use crate::model::id::UserId;

/// Status update in the current channel, indicating that a user has
/// disconnected.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ClientDisconnect {
    /// ID of the disconnected user.
    pub user_id: UserId,
}
