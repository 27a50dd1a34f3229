use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use flume::Receiver;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{info, instrument, trace, warn};
use xsalsa20poly1305::XSalsa20Poly1305 as Cipher;

use super::message::{CoreMessage, Interconnect, UdpRxMessage};
use crate::constants::*;
use crate::crypto::CryptoMode;
use crate::events::SupervisorEvent;
use crate::metrics::Metrics;
use crate::rtp::RtpHeader;

struct UdpRx {
    cipher: Cipher,
    mode: CryptoMode,
    packet_buffer: [u8; VOICE_PACKET_MAX],
    rx: Receiver<UdpRxMessage>,
    udp: Arc<UdpSocket>,
    metrics: Arc<Metrics>,

    outstanding_keepalive: Option<(u32, Instant)>,
    missed_keepalives: u8,
    stale_reported: bool,
}

impl UdpRx {
    #[instrument(skip(self, interconnect))]
    async fn run(&mut self, interconnect: &Interconnect) {
        loop {
            tokio::select! {
                received = self.udp.recv(&mut self.packet_buffer[..]) => {
                    match received {
                        Ok(len) => self.process_udp_message(interconnect, len),
                        Err(e) => {
                            warn!("UDP receive error: {:?}.", e);
                        },
                    }
                }
                msg = self.rx.recv_async() => {
                    use UdpRxMessage::*;
                    match msg {
                        Ok(KeepaliveSent { counter, at }) =>
                            self.note_keepalive(interconnect, counter, at),
                        Ok(Poison) | Err(_) => break,
                    }
                }
            }
        }
    }

    fn note_keepalive(&mut self, interconnect: &Interconnect, counter: u32, at: Instant) {
        if self.outstanding_keepalive.is_some() {
            self.missed_keepalives = self.missed_keepalives.saturating_add(1);
            Metrics::incr(&self.metrics.keepalives_missed);

            if self.missed_keepalives >= UDP_KEEPALIVE_MISS_LIMIT && !self.stale_reported {
                warn!(
                    "{} consecutive keepalives unanswered; transport is stale.",
                    self.missed_keepalives
                );
                self.stale_reported = true;
                let _ = interconnect.core.send(CoreMessage::TransportStale);
            }
        }

        self.outstanding_keepalive = Some((counter, at));
    }

    fn process_udp_message(&mut self, interconnect: &Interconnect, len: usize) {
        // NOTE: errors here (and in general for UDP) are not fatal to the
        // connection. Packets are adversarial until authenticated, so parse
        // failures are counted and dropped without panicking.
        let packet = &self.packet_buffer[..len];

        if len == UDP_KEEPALIVE_LEN {
            let counter = LittleEndian::read_u32(&packet[..4]);

            if let Some((sent, at)) = self.outstanding_keepalive {
                if sent == counter {
                    self.outstanding_keepalive = None;
                    self.missed_keepalives = 0;
                    let _ = interconnect.core.send(CoreMessage::Ping(at.elapsed()));
                }
            }

            return;
        }

        let header = match RtpHeader::parse(packet) {
            Some(header) if header.is_voice() => header,
            Some(_) => {
                trace!("Ignoring non-voice UDP traffic.");
                return;
            },
            None => {
                trace!("Ignoring undersized UDP datagram ({} bytes).", len);
                return;
            },
        };

        match self.mode.open(&self.cipher, packet, header.payload_offset) {
            Ok(payload) => {
                Metrics::incr(&self.metrics.packets_received);
                interconnect.fire(SupervisorEvent::Packet {
                    ssrc: header.ssrc,
                    sequence: header.sequence,
                    timestamp: header.timestamp,
                    payload_len: payload.len(),
                });
            },
            Err(e) => {
                warn!("Inbound RTP rejected: {:?}.", e);
                Metrics::incr(&self.metrics.decrypt_failures);
            },
        }
    }
}

#[instrument(skip(interconnect, rx, cipher, udp, metrics))]
pub(crate) async fn runner(
    interconnect: Interconnect,
    rx: Receiver<UdpRxMessage>,
    cipher: Cipher,
    mode: CryptoMode,
    udp: Arc<UdpSocket>,
    metrics: Arc<Metrics>,
) {
    info!("UDP receive handle started.");

    let mut state = UdpRx {
        cipher,
        mode,
        packet_buffer: [0u8; VOICE_PACKET_MAX],
        rx,
        udp,
        metrics,
        outstanding_keepalive: None,
        missed_keepalives: 0,
        stale_reported: false,
    };

    state.run(&interconnect).await;

    info!("UDP receive handle stopped.");
}
