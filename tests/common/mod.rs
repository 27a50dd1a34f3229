//! In-process doubles for the two remote parties of a voice connection: the
//! main gateway (adapter) and a Discord voice server (websocket + UDP).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use async_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use async_tungstenite::tungstenite::protocol::CloseFrame;
use async_tungstenite::tungstenite::Message;
use flume::{Receiver, Sender};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::{TcpListener, UdpSocket};

use lyrebird::model::id::GuildId;
use lyrebird::{discovery, GatewayAdapter, VoiceServerUpdate, VoiceStateUpdate};

// ---------------------------------------------------------------------------
// Mock main-gateway adapter
// ---------------------------------------------------------------------------

/// Join coordinates the adapter answers op 4 joins with.
#[derive(Clone)]
pub struct AutoJoin {
    pub endpoint: String,
    pub token: String,
    pub session_id: String,
    pub guild_id: u64,
    pub channel_id: u64,
    pub user_id: u64,
}

pub struct MockAdapter {
    server_tx: Sender<VoiceServerUpdate>,
    server_rx: Receiver<VoiceServerUpdate>,
    state_tx: Sender<VoiceStateUpdate>,
    state_rx: Receiver<VoiceStateUpdate>,
    payload_tx: Sender<Value>,
    auto_join: Mutex<Option<AutoJoin>>,
}

impl MockAdapter {
    /// Returns the adapter plus a stream of every payload the supervisor
    /// sends through it.
    pub fn new() -> (Arc<Self>, Receiver<Value>) {
        let (server_tx, server_rx) = flume::unbounded();
        let (state_tx, state_rx) = flume::unbounded();
        let (payload_tx, payload_rx) = flume::unbounded();

        let adapter = Arc::new(Self {
            server_tx,
            server_rx,
            state_tx,
            state_rx,
            payload_tx,
            auto_join: Mutex::new(None),
        });

        (adapter, payload_rx)
    }

    /// Makes the adapter answer every join-shaped op 4 with the given voice
    /// server coordinates, like a live gateway would.
    pub fn set_auto_join(&self, join: AutoJoin) {
        *self.auto_join.lock() = Some(join);
    }

    pub fn push_server_update(&self, update: VoiceServerUpdate) {
        let _ = self.server_tx.send(update);
    }

    pub fn push_state_update(&self, update: VoiceStateUpdate) {
        let _ = self.state_tx.send(update);
    }
}

#[async_trait]
impl GatewayAdapter for MockAdapter {
    async fn send_payload(&self, payload: Value) -> bool {
        let is_join =
            payload["op"] == 4 && !payload["d"]["channel_id"].is_null();

        let _ = self.payload_tx.send(payload);

        if is_join {
            if let Some(join) = self.auto_join.lock().clone() {
                let _ = self.server_tx.send(VoiceServerUpdate {
                    token: join.token.clone(),
                    guild_id: GuildId(join.guild_id),
                    endpoint: Some(join.endpoint.clone()),
                });
                let _ = self.state_tx.send(VoiceStateUpdate {
                    guild_id: Some(GuildId(join.guild_id)),
                    user_id: lyrebird::model::id::UserId(join.user_id),
                    session_id: join.session_id.clone(),
                    channel_id: Some(lyrebird::model::id::ChannelId(join.channel_id)),
                });
            }
        }

        true
    }

    fn server_updates(&self) -> Receiver<VoiceServerUpdate> {
        self.server_rx.clone()
    }

    fn state_updates(&self) -> Receiver<VoiceStateUpdate> {
        self.state_rx.clone()
    }
}

// ---------------------------------------------------------------------------
// Mock voice server
// ---------------------------------------------------------------------------

/// What the mock voice server observed from the client, in arrival order.
#[derive(Clone, Debug)]
pub enum ServerEvent {
    Connected,
    Identify(Value),
    SelectProtocol(Value),
    Heartbeat(Value),
    Speaking(Value),
    Resume(Value),
    Closed(Option<u16>),
}

pub enum ServerCommand {
    /// Close the current websocket with the given close code.
    Close(u16),
}

#[derive(Clone)]
pub struct VoiceServerConfig {
    pub ssrc: u32,
    pub heartbeat_interval: f64,
    pub modes: Vec<String>,
    pub secret_key: [u8; 32],
    pub external_ip: String,
    pub external_port: u16,
    pub answer_discovery: bool,
    pub accept_resume: bool,
}

impl Default for VoiceServerConfig {
    fn default() -> Self {
        Self {
            ssrc: 12345,
            heartbeat_interval: 41_250.0,
            modes: vec![
                "xsalsa20_poly1305_lite".into(),
                "xsalsa20_poly1305".into(),
            ],
            secret_key: [0xAB; 32],
            external_ip: "198.51.100.2".into(),
            external_port: 49_152,
            answer_discovery: true,
            accept_resume: true,
        }
    }
}

pub struct MockVoiceServer {
    /// Endpoint for `AutoJoin`/server updates; plain `ws` scheme.
    pub endpoint: String,
    pub udp_port: u16,
    pub events: Receiver<ServerEvent>,
    /// Non-discovery, non-keepalive datagrams (i.e. RTP) the server saw.
    pub rtp: Receiver<Vec<u8>>,
    commands: Sender<ServerCommand>,
    ack_heartbeats: Arc<AtomicBool>,
}

impl MockVoiceServer {
    pub async fn spawn(config: VoiceServerConfig) -> Self {
        let tcp = TcpListener::bind("127.0.0.1:0").await.expect("tcp bind");
        let ws_addr = tcp.local_addr().expect("tcp addr");

        let udp = UdpSocket::bind("127.0.0.1:0").await.expect("udp bind");
        let udp_port = udp.local_addr().expect("udp addr").port();

        let (event_tx, event_rx) = flume::unbounded();
        let (rtp_tx, rtp_rx) = flume::unbounded();
        let (cmd_tx, cmd_rx) = flume::unbounded::<ServerCommand>();

        let ack_heartbeats = Arc::new(AtomicBool::new(true));

        // UDP side: answer discovery, echo keepalives, forward the rest.
        {
            let config = config.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 2048];
                loop {
                    let Ok((len, src)) = udp.recv_from(&mut buf).await else {
                        break;
                    };

                    if len == discovery::DISCOVERY_LEN {
                        if let Some(ssrc) = discovery::parse_request(&buf[..len]) {
                            if config.answer_discovery {
                                let reply = discovery::reply(
                                    ssrc,
                                    &config.external_ip,
                                    config.external_port,
                                );
                                let _ = udp.send_to(&reply, src).await;
                            }
                            continue;
                        }
                    }

                    if len == 8 {
                        let _ = udp.send_to(&buf[..len], src).await;
                        continue;
                    }

                    let _ = rtp_tx.send(buf[..len].to_vec());
                }
            });
        }

        // Websocket side: scripted handshake, one connection at a time.
        {
            let acks = ack_heartbeats.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = tcp.accept().await else {
                        break;
                    };

                    let Ok(mut ws) = async_tungstenite::tokio::accept_async(stream).await else {
                        continue;
                    };

                    let _ = event_tx.send(ServerEvent::Connected);

                    let hello = json!({
                        "op": 8,
                        "d": { "heartbeat_interval": config.heartbeat_interval }
                    });
                    if ws.send(Message::Text(hello.to_string())).await.is_err() {
                        continue;
                    }

                    loop {
                        tokio::select! {
                            msg = ws.next() => {
                                let Some(Ok(msg)) = msg else {
                                    let _ = event_tx.send(ServerEvent::Closed(None));
                                    break;
                                };

                                match msg {
                                    Message::Text(text) => {
                                        let Ok(value) = serde_json::from_str::<Value>(&text) else {
                                            continue;
                                        };

                                        let done = handle_client_message(
                                            &mut ws,
                                            &value,
                                            &config,
                                            &event_tx,
                                            acks.load(Ordering::SeqCst),
                                            udp_port,
                                        )
                                        .await;

                                        if done {
                                            break;
                                        }
                                    },
                                    Message::Close(frame) => {
                                        let code = frame.map(|f| f.code.into());
                                        let _ = event_tx.send(ServerEvent::Closed(code));
                                        break;
                                    },
                                    _ => {},
                                }
                            }
                            cmd = cmd_rx.recv_async() => {
                                match cmd {
                                    Ok(ServerCommand::Close(code)) => {
                                        let _ = ws.close(Some(CloseFrame {
                                            code: CloseCode::from(code),
                                            reason: "scripted".into(),
                                        })).await;
                                        break;
                                    },
                                    Err(_) => break,
                                }
                            }
                        }
                    }
                }
            });
        }

        Self {
            endpoint: format!("ws://{}", ws_addr),
            udp_port,
            events: event_rx,
            rtp: rtp_rx,
            commands: cmd_tx,
            ack_heartbeats,
        }
    }

    pub fn set_ack_heartbeats(&self, ack: bool) {
        self.ack_heartbeats.store(ack, Ordering::SeqCst);
    }

    pub fn close_connection(&self, code: u16) {
        let _ = self.commands.send(ServerCommand::Close(code));
    }
}

async fn handle_client_message(
    ws: &mut async_tungstenite::WebSocketStream<
        async_tungstenite::tokio::TokioAdapter<tokio::net::TcpStream>,
    >,
    value: &Value,
    config: &VoiceServerConfig,
    event_tx: &Sender<ServerEvent>,
    ack_heartbeats: bool,
    udp_port: u16,
) -> bool {
    match value["op"].as_u64() {
        Some(0) => {
            let _ = event_tx.send(ServerEvent::Identify(value["d"].clone()));

            let ready = json!({
                "op": 2,
                "d": {
                    "ssrc": config.ssrc,
                    "ip": "127.0.0.1",
                    "port": udp_port,
                    "modes": config.modes,
                }
            });
            let _ = ws.send(Message::Text(ready.to_string())).await;
        },
        Some(1) => {
            let _ = event_tx.send(ServerEvent::SelectProtocol(value["d"].clone()));

            let description = json!({
                "op": 4,
                "d": {
                    "mode": value["d"]["data"]["mode"],
                    "secret_key": config.secret_key.to_vec(),
                }
            });
            let _ = ws.send(Message::Text(description.to_string())).await;
        },
        Some(3) => {
            let _ = event_tx.send(ServerEvent::Heartbeat(value["d"].clone()));

            if ack_heartbeats {
                let ack = json!({ "op": 7, "d": value["d"] });
                let _ = ws.send(Message::Text(ack.to_string())).await;
            }
        },
        Some(5) => {
            let _ = event_tx.send(ServerEvent::Speaking(value["d"].clone()));
        },
        Some(6) => {
            let _ = event_tx.send(ServerEvent::Resume(value["d"].clone()));

            if config.accept_resume {
                let resumed = json!({ "op": 9, "d": null });
                let _ = ws.send(Message::Text(resumed.to_string())).await;
            } else {
                let _ = ws
                    .close(Some(CloseFrame {
                        code: CloseCode::from(4006_u16),
                        reason: "unknown session".into(),
                    }))
                    .await;
                let _ = event_tx.send(ServerEvent::Closed(Some(4006)));
                return true;
            }
        },
        _ => {},
    }

    false
}
