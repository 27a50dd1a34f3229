use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use flume::{Receiver, Sender};
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{info, instrument, trace, warn};

use super::message::{UdpRxMessage, UdpTxMessage};
use crate::constants::*;
use crate::metrics::Metrics;

/// Pushes sealed packets onto the wire and fires a keepalive probe every
/// five seconds of queue silence.
///
/// Send failures are transient: counted, logged, and never fatal to the
/// session. Staleness is judged by the receive task from missing echoes.
#[instrument(skip(udp_msg_rx, udp, keepalive_mail, metrics))]
pub(crate) async fn runner(
    udp_msg_rx: Receiver<UdpTxMessage>,
    udp: Arc<UdpSocket>,
    keepalive_mail: Sender<UdpRxMessage>,
    metrics: Arc<Metrics>,
) {
    info!("UDP transmit handle started.");

    let mut counter: u32 = 0;
    let mut ka_time = Instant::now() + UDP_KEEPALIVE_GAP;

    loop {
        use UdpTxMessage::*;
        match timeout_at(ka_time, udp_msg_rx.recv_async()).await {
            Err(_) => {
                trace!("Sending UDP keepalive {}.", counter);

                let mut bytes = [0u8; UDP_KEEPALIVE_LEN];
                LittleEndian::write_u32(&mut bytes[..4], counter);

                let at = Instant::now();
                match udp.send(&bytes).await {
                    Ok(_) => {
                        let _ = keepalive_mail.send(UdpRxMessage::KeepaliveSent { counter, at });
                    },
                    Err(e) => {
                        warn!("UDP keepalive send error: {:?}.", e);
                        Metrics::incr(&metrics.udp_send_errors);
                    },
                }

                counter = counter.wrapping_add(1);
                ka_time += UDP_KEEPALIVE_GAP;
            },
            Ok(Ok(Packet(p))) =>
                if let Err(e) = udp.send(&p[..]).await {
                    warn!("UDP packet send error: {:?}.", e);
                    Metrics::incr(&metrics.udp_send_errors);
                },
            Ok(Err(_)) | Ok(Ok(Poison)) => {
                break;
            },
        }
    }

    info!("UDP transmit handle stopped.");
}
