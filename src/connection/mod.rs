//! Session establishment against an announced voice server: the websocket
//! handshake, transport negotiation, and the resume path.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use flume::Sender;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info, instrument};
use url::Url;
use xsalsa20poly1305::XSalsa20Poly1305 as Cipher;

use crate::config::Config;
use crate::constants::*;
use crate::crypto::CryptoMode;
use crate::discovery;
use crate::error::{Error, Result, TimeoutStage};
use crate::events::SupervisorEvent;
use crate::info::ConnectionInfo;
use crate::metrics::Metrics;
use crate::model::payload::{Identify, Resume, SelectProtocol};
use crate::model::{Event as GatewayEvent, ProtocolData};
use crate::rtp::RtpCursor;
use crate::supervisor::SupervisorState;
use crate::tasks::message::*;
use crate::tasks::{udp_rx, udp_tx, ws as ws_task};
use crate::ws::{self, ReceiverExt, SenderExt, WsStream};

/// A live voice session: spawned websocket + UDP tasks, plus everything the
/// supervisor needs to seal packets onto it.
pub(crate) struct Connection {
    pub(crate) info: ConnectionInfo,
    pub(crate) ssrc: u32,
    pub(crate) mode: CryptoMode,
    pub(crate) cipher: Cipher,
    pub(crate) cursor: RtpCursor,
    pub(crate) external: (IpAddr, u16),
    pub(crate) server_addr: SocketAddr,
    pub(crate) last_seq: Arc<AtomicU64>,
    pub(crate) ws: Sender<WsMessage>,
    pub(crate) udp_tx: Sender<UdpTxMessage>,
    pub(crate) udp_rx: Sender<UdpRxMessage>,
}

/// Everything worth carrying over from a torn-down session when attempting a
/// resume: credentials, negotiated crypto, and the RTP cursor.
pub(crate) struct ResumeState {
    pub info: ConnectionInfo,
    pub ssrc: u32,
    pub mode: CryptoMode,
    pub cipher: Cipher,
    pub cursor: RtpCursor,
    pub external: (IpAddr, u16),
    pub server_addr: SocketAddr,
    pub last_seq: Arc<AtomicU64>,
}

impl Connection {
    /// Performs the full dial sequence against an announced voice server.
    ///
    /// HELLO gates IDENTIFY; READY gates transport selection; a session
    /// description completes the handshake. The supervisor learns of the
    /// transport phase through a [`CoreMessage::Phase`] message so audio
    /// gating stays accurate mid-handshake.
    #[instrument(skip(info, config, interconnect, metrics), fields(endpoint = %info.endpoint))]
    pub(crate) async fn connect(
        mut info: ConnectionInfo,
        config: Config,
        interconnect: Interconnect,
        metrics: Arc<Metrics>,
    ) -> Result<Connection> {
        let url = generate_url(&mut info.endpoint)?;

        let mut client = ws::create_client(url).await?;

        let (hello, ready) = timeout(READY_DEADLINE, async {
            let hello = loop {
                match client.recv_json().await? {
                    Some(GatewayEvent::Hello(h)) => break h,
                    Some(other) => {
                        debug!("Expected hello; got: {:?}", other);
                        return Err(Error::ExpectedHandshake);
                    },
                    None => continue,
                }
            };

            client
                .send_json(&GatewayEvent::from(Identify {
                    server_id: info.guild_id,
                    session_id: info.session_id.clone(),
                    token: info.token.clone(),
                    user_id: info.user_id,
                }))
                .await?;

            let ready = loop {
                match client.recv_json().await? {
                    Some(GatewayEvent::Ready(r)) => break r,
                    Some(GatewayEvent::Hello(_)) => continue,
                    Some(other) => {
                        debug!("Expected ready; got: {:?}", other);
                        return Err(Error::ExpectedHandshake);
                    },
                    None => continue,
                }
            };

            Ok((hello, ready))
        })
        .await
        .map_err(|_| Error::Timeout(TimeoutStage::Ready))??;

        let mode = CryptoMode::negotiate(&ready.modes, &config.preferred_modes)?;

        let _ = interconnect
            .core
            .send(CoreMessage::Phase(SupervisorState::EstablishingTransport));

        let udp = UdpSocket::bind("0.0.0.0:0").await?;
        udp.connect((ready.ip.as_str(), ready.port)).await?;
        let server_addr = udp.peer_addr()?;

        // NAT hole-punch: learn the address the server sees us at.
        let external = timeout(IP_DISCOVERY_DEADLINE, ip_discover(&udp, ready.ssrc))
            .await
            .map_err(|_| Error::Timeout(TimeoutStage::IpDiscovery))??;

        client
            .send_json(&GatewayEvent::from(SelectProtocol {
                protocol: "udp".into(),
                data: ProtocolData {
                    address: external.0,
                    mode: mode.to_request_str().into(),
                    port: external.1,
                },
            }))
            .await?;

        let cipher = init_cipher(&mut client, mode).await?;

        info!("Connected to: {}", info.endpoint);
        info!("WS heartbeat duration {}ms.", hello.heartbeat_interval);

        interconnect.fire(SupervisorEvent::Debug(format!(
            "Transport established: external {}:{}, mode {}.",
            external.0,
            external.1,
            mode.to_request_str()
        )));

        let last_seq = Arc::new(AtomicU64::new(0));

        Ok(Self::launch_tasks(
            info,
            client,
            ready.ssrc,
            hello.heartbeat_interval,
            mode,
            cipher,
            RtpCursor::new(),
            external,
            server_addr,
            last_seq,
            udp,
            &config,
            &interconnect,
            &metrics,
        ))
    }

    /// Re-enters a lost session without a fresh IDENTIFY.
    ///
    /// Opens a new websocket, RESUMEs with the preserved session id, and
    /// rebinds the UDP flow to the known server address. The cursor, SSRC,
    /// and cipher survive untouched: this is the same session.
    #[instrument(skip(state, config, interconnect, metrics), fields(endpoint = %state.info.endpoint))]
    pub(crate) async fn resume(
        mut state: ResumeState,
        config: Config,
        interconnect: Interconnect,
        metrics: Arc<Metrics>,
    ) -> Result<Connection> {
        let url = generate_url(&mut state.info.endpoint)?;

        let mut client = ws::create_client(url).await?;

        let hello = timeout(RESUME_DEADLINE, async {
            let hello = loop {
                match client.recv_json().await? {
                    Some(GatewayEvent::Hello(h)) => break h,
                    Some(other) => {
                        debug!("Expected hello; got: {:?}", other);
                        return Err(Error::ExpectedHandshake);
                    },
                    None => continue,
                }
            };

            client
                .send_json(&GatewayEvent::from(Resume {
                    server_id: state.info.guild_id,
                    session_id: state.info.session_id.clone(),
                    token: state.info.token.clone(),
                }))
                .await?;

            loop {
                match client.recv_json().await? {
                    Some(GatewayEvent::Resumed) => break,
                    Some(other) => {
                        debug!("Expected resumed; got: {:?}", other);
                        return Err(Error::ExpectedHandshake);
                    },
                    None => continue,
                }
            }

            Ok(hello)
        })
        .await
        .map_err(|_| Error::Timeout(TimeoutStage::Resume))??;

        let udp = UdpSocket::bind("0.0.0.0:0").await?;
        udp.connect(state.server_addr).await?;

        info!("Resumed session on: {}", state.info.endpoint);

        Ok(Self::launch_tasks(
            state.info,
            client,
            state.ssrc,
            hello.heartbeat_interval,
            state.mode,
            state.cipher,
            state.cursor,
            state.external,
            state.server_addr,
            state.last_seq,
            udp,
            &config,
            &interconnect,
            &metrics,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn launch_tasks(
        info: ConnectionInfo,
        client: WsStream,
        ssrc: u32,
        heartbeat_interval: f64,
        mode: CryptoMode,
        cipher: Cipher,
        cursor: RtpCursor,
        external: (IpAddr, u16),
        server_addr: SocketAddr,
        last_seq: Arc<AtomicU64>,
        udp: UdpSocket,
        config: &Config,
        interconnect: &Interconnect,
        metrics: &Arc<Metrics>,
    ) -> Connection {
        let (ws_msg_tx, ws_msg_rx) = flume::unbounded();
        let (udp_tx_tx, udp_tx_rx) = flume::unbounded();
        let (udp_rx_tx, udp_rx_rx) = flume::unbounded();

        let udp = Arc::new(udp);

        tokio::spawn(ws_task::runner(
            interconnect.clone(),
            ws_msg_rx,
            client,
            ssrc,
            heartbeat_interval,
            config.heartbeat_grace,
            last_seq.clone(),
        ));

        tokio::spawn(udp_rx::runner(
            interconnect.clone(),
            udp_rx_rx,
            cipher.clone(),
            mode,
            udp.clone(),
            metrics.clone(),
        ));

        tokio::spawn(udp_tx::runner(
            udp_tx_rx,
            udp,
            udp_rx_tx.clone(),
            metrics.clone(),
        ));

        Connection {
            info,
            ssrc,
            mode,
            cipher,
            cursor,
            external,
            server_addr,
            last_seq,
            ws: ws_msg_tx,
            udp_tx: udp_tx_tx,
            udp_rx: udp_rx_tx,
        }
    }

    /// Snapshot of everything a resume needs, taken just before teardown.
    pub(crate) fn resume_state(&self) -> ResumeState {
        ResumeState {
            info: self.info.clone(),
            ssrc: self.ssrc,
            mode: self.mode,
            cipher: self.cipher.clone(),
            cursor: self.cursor,
            external: self.external,
            server_addr: self.server_addr,
            last_seq: self.last_seq.clone(),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.ws.send(WsMessage::Poison);
        let _ = self.udp_tx.send(UdpTxMessage::Poison);
        let _ = self.udp_rx.send(UdpRxMessage::Poison);

        info!("Voice session torn down.");
    }
}

async fn ip_discover(udp: &UdpSocket, ssrc: u32) -> Result<(IpAddr, u16)> {
    let request = discovery::request(ssrc);
    udp.send(&request).await?;

    let mut bytes = [0u8; discovery::DISCOVERY_LEN];
    loop {
        let len = udp.recv(&mut bytes).await?;

        // Unrelated traffic (stray keepalive echoes) may race the reply.
        if len != discovery::DISCOVERY_LEN {
            continue;
        }

        return discovery::parse_reply(&bytes[..len]);
    }
}

fn generate_url(endpoint: &mut String) -> Result<Url> {
    if endpoint.ends_with(":80") {
        let len = endpoint.len();

        endpoint.truncate(len - 3);
    }

    // A bare host gets the secure scheme; an explicit scheme is honored so
    // local test servers can speak plain ws.
    let raw = if endpoint.contains("://") {
        format!("{}/?v={}", endpoint, VOICE_GATEWAY_VERSION)
    } else {
        format!("wss://{}/?v={}", endpoint, VOICE_GATEWAY_VERSION)
    };

    Url::parse(&raw).or(Err(Error::EndpointUrl))
}

async fn init_cipher(client: &mut WsStream, mode: CryptoMode) -> Result<Cipher> {
    loop {
        let value = match client.recv_json().await? {
            Some(value) => value,
            None => continue,
        };

        match value {
            GatewayEvent::SessionDescription(mut desc) => {
                if desc.mode != mode.to_request_str() {
                    return Err(Error::CryptoModeInvalid);
                }

                return CryptoMode::cipher_from_key(&mut desc.secret_key);
            },
            other => {
                debug!(
                    "Expected session description; got: op{}/v{:?}",
                    other.kind() as u8,
                    other
                );
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::generate_url;

    #[test]
    fn url_gains_secure_scheme_and_version() {
        let mut endpoint = String::from("us-west42.discord.media");
        let url = generate_url(&mut endpoint).unwrap();

        assert_eq!(url.as_str(), "wss://us-west42.discord.media/?v=4");
    }

    #[test]
    fn legacy_port_suffix_is_stripped() {
        let mut endpoint = String::from("us-west42.discord.media:80");
        let url = generate_url(&mut endpoint).unwrap();

        assert_eq!(endpoint, "us-west42.discord.media");
        assert_eq!(url.as_str(), "wss://us-west42.discord.media/?v=4");
    }

    #[test]
    fn explicit_scheme_is_honored() {
        let mut endpoint = String::from("ws://127.0.0.1:9542");
        let url = generate_url(&mut endpoint).unwrap();

        assert_eq!(url.as_str(), "ws://127.0.0.1:9542/?v=4");
    }
}
