/// Mail processed by the UDP transmit task.
pub(crate) enum UdpTxMessage {
    /// A fully sealed RTP packet, ready for the wire.
    Packet(Vec<u8>),
    Poison,
}
