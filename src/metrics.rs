//! Per-supervisor packet accounting.
//!
//! Packet-level failures are dropped rather than surfaced; these counters are
//! where they land.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters for one supervisor's send/receive paths.
#[derive(Debug, Default)]
pub struct Metrics {
    pub(crate) packets_sent: AtomicU64,
    pub(crate) packets_received: AtomicU64,
    pub(crate) frames_dropped: AtomicU64,
    pub(crate) encrypt_failures: AtomicU64,
    pub(crate) decrypt_failures: AtomicU64,
    pub(crate) udp_send_errors: AtomicU64,
    pub(crate) keepalives_missed: AtomicU64,
}

impl Metrics {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a consistent-enough copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            encrypt_failures: self.encrypt_failures.load(Ordering::Relaxed),
            decrypt_failures: self.decrypt_failures.load(Ordering::Relaxed),
            udp_send_errors: self.udp_send_errors.load(Ordering::Relaxed),
            keepalives_missed: self.keepalives_missed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a supervisor's [`Metrics`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MetricsSnapshot {
    /// Encrypted RTP packets handed to the UDP transport.
    pub packets_sent: u64,
    /// Inbound RTP packets parsed and decrypted.
    pub packets_received: u64,
    /// Audio frames discarded because the connection was not ready, or the
    /// frame was oversized.
    pub frames_dropped: u64,
    /// Outbound packets lost to AEAD failures.
    pub encrypt_failures: u64,
    /// Inbound packets rejected by the AEAD or too mangled to parse.
    pub decrypt_failures: u64,
    /// UDP sends which returned an error.
    pub udp_send_errors: u64,
    /// Keepalive probes which went unanswered.
    pub keepalives_missed: u64,
}
