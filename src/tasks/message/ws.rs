use flume::Sender;

/// Mail processed by the voice gateway websocket task.
pub(crate) enum WsMessage {
    /// Set the speaking flag, confirming on `done` once the gateway message
    /// has gone out (or been skipped as a no-op).
    Speaking {
        active: bool,
        done: Option<Sender<()>>,
    },
    Poison,
}
