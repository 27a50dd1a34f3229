use tokio::time::Instant;

/// Mail processed by the UDP receive task.
pub(crate) enum UdpRxMessage {
    /// The transmit task fired a keepalive; watch for its echo.
    KeepaliveSent { counter: u32, at: Instant },
    Poison,
}
