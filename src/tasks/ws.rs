use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use async_tungstenite::tungstenite::protocol::CloseFrame;
use flume::Receiver;
use tokio::time::{self, Instant};
use tracing::{error, info, instrument, trace, warn};

use super::message::{CoreMessage, Interconnect, WsMessage};
use crate::events::SupervisorEvent;
use crate::model::payload::{Heartbeat, Speaking};
use crate::model::{CloseCode as VoiceCloseCode, Event as GatewayEvent, SpeakingState};
use crate::ws::{Error as WsError, ReceiverExt, SenderExt, WsStream};

struct AuxNetwork {
    rx: Receiver<WsMessage>,
    ws_client: WsStream,

    ssrc: u32,
    heartbeat_interval: Duration,
    heartbeat_grace: u8,
    pending_acks: u8,

    speaking: SpeakingState,
    last_seq: Arc<AtomicU64>,
}

impl AuxNetwork {
    fn new(
        evt_rx: Receiver<WsMessage>,
        ws_client: WsStream,
        ssrc: u32,
        heartbeat_interval: f64,
        heartbeat_grace: u8,
        last_seq: Arc<AtomicU64>,
    ) -> Self {
        Self {
            rx: evt_rx,
            ws_client,
            ssrc,
            heartbeat_interval: Duration::from_secs_f64(heartbeat_interval / 1000.0),
            heartbeat_grace,
            pending_acks: 0,
            speaking: SpeakingState::empty(),
            last_seq,
        }
    }

    #[instrument(skip(self, interconnect))]
    async fn run(&mut self, interconnect: &Interconnect) {
        let mut next_heartbeat = Instant::now() + self.heartbeat_interval;

        loop {
            tokio::select! {
                _ = time::sleep_until(next_heartbeat) => {
                    if self.pending_acks > self.heartbeat_grace {
                        warn!(
                            "{} heartbeats unacknowledged; closing voice gateway.",
                            self.pending_acks
                        );

                        let _ = self.ws_client.close(Some(CloseFrame {
                            code: CloseCode::from(VoiceCloseCode::SessionTimeout as u16),
                            reason: "Session timeout.".into(),
                        })).await;
                        let _ = interconnect.core.send(CoreMessage::GatewayStale);

                        break;
                    }

                    if let Err(e) = self.send_heartbeat().await {
                        error!("Heartbeat send failure {:?}.", e);
                        let _ = interconnect.core.send(CoreMessage::GatewayStale);
                        break;
                    }

                    next_heartbeat = Instant::now() + self.heartbeat_interval;
                }
                ws_msg = self.ws_client.recv_json() => {
                    match ws_msg {
                        Ok(Some(msg)) => {
                            self.last_seq.fetch_add(1, Ordering::Relaxed);
                            self.process_ws(interconnect, msg);
                        },
                        Ok(None) => {},
                        Err(WsError::Json(e)) => {
                            warn!("Unexpected JSON {:?}.", e);
                        },
                        Err(WsError::Closed(code)) => {
                            info!("Voice gateway closed by peer: {:?}.", code);
                            let _ = interconnect.core.send(CoreMessage::WsClosed(code));
                            break;
                        },
                        Err(e) => {
                            error!("Error processing ws {:?}.", e);
                            let _ = interconnect.core.send(CoreMessage::GatewayStale);
                            break;
                        },
                    }
                }
                inner_msg = self.rx.recv_async() => {
                    match inner_msg {
                        Ok(WsMessage::Speaking { active, done }) => {
                            let failed = self.set_speaking(active).await;

                            if let Some(done) = done {
                                let _ = done.send(());
                            }

                            if failed {
                                let _ = interconnect.core.send(CoreMessage::GatewayStale);
                                break;
                            }
                        },
                        Err(_) | Ok(WsMessage::Poison) => {
                            break;
                        },
                    }
                }
            }
        }
    }

    async fn send_heartbeat(&mut self) -> crate::ws::Result<()> {
        let nonce = self.last_seq.load(Ordering::Relaxed);

        trace!("Sending heartbeat, seq {}.", nonce);

        self.ws_client
            .send_json(&GatewayEvent::from(Heartbeat { nonce }))
            .await?;

        self.pending_acks = self.pending_acks.saturating_add(1);

        Ok(())
    }

    async fn set_speaking(&mut self, active: bool) -> bool {
        if self.speaking.contains(SpeakingState::MICROPHONE) == active {
            return false;
        }

        self.speaking.set(SpeakingState::MICROPHONE, active);
        info!("Changing to {:?}", self.speaking);

        let status = self
            .ws_client
            .send_json(&GatewayEvent::from(Speaking {
                delay: Some(0),
                speaking: self.speaking,
                ssrc: self.ssrc,
                user_id: None,
            }))
            .await;

        match status {
            Ok(()) => false,
            Err(e) => {
                error!("Issue sending speaking update {:?}.", e);
                true
            },
        }
    }

    fn process_ws(&mut self, interconnect: &Interconnect, value: GatewayEvent) {
        match value {
            GatewayEvent::HeartbeatAck(_) => {
                self.pending_acks = 0;
                trace!("Heartbeat ACK received.");
            },
            GatewayEvent::Speaking(ev) => {
                interconnect.fire(SupervisorEvent::Debug(format!(
                    "Speaking update: ssrc {}, flags {:?}.",
                    ev.ssrc, ev.speaking
                )));
            },
            GatewayEvent::ClientDisconnect(ev) => {
                interconnect.fire(SupervisorEvent::Debug(format!(
                    "Client disconnected: {}.",
                    ev.user_id
                )));
            },
            other => {
                trace!("Received other websocket data: {:?}", other);
            },
        }
    }
}

#[instrument(skip(interconnect, evt_rx, ws_client, last_seq))]
pub(crate) async fn runner(
    interconnect: Interconnect,
    evt_rx: Receiver<WsMessage>,
    ws_client: WsStream,
    ssrc: u32,
    heartbeat_interval: f64,
    heartbeat_grace: u8,
    last_seq: Arc<AtomicU64>,
) {
    info!("WS handle started.");

    let mut aux = AuxNetwork::new(
        evt_rx,
        ws_client,
        ssrc,
        heartbeat_interval,
        heartbeat_grace,
        last_seq,
    );

    aux.run(&interconnect).await;

    info!("WS handle finished.");
}
