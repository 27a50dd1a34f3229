//! End-to-end scenarios against an in-process voice server and gateway
//! adapter: the full handshake, failure recovery, and the audio send path.

mod common;

use std::time::Duration;

use serde_json::Value;
use tokio::time::{sleep, timeout, Instant};
use xsalsa20poly1305::aead::KeyInit;
use xsalsa20poly1305::{Key, XSalsa20Poly1305};

use common::*;
use lyrebird::model::id::{ChannelId, GuildId, UserId};
use lyrebird::{
    ChannelCoordinates, Config, CryptoMode, Error, Supervisor, SupervisorState, TimeoutStage,
};

const GUILD: u64 = 41;
const CHANNEL: u64 = 42;
const USER: u64 = 77;

fn coords() -> ChannelCoordinates {
    ChannelCoordinates::new(GuildId(GUILD), ChannelId(CHANNEL), UserId(USER))
}

fn auto_join(server: &MockVoiceServer) -> AutoJoin {
    AutoJoin {
        endpoint: server.endpoint.clone(),
        token: "tok-1".into(),
        session_id: "sess-1".into(),
        guild_id: GUILD,
        channel_id: CHANNEL,
        user_id: USER,
    }
}

async fn next_event(server: &MockVoiceServer) -> ServerEvent {
    timeout(Duration::from_secs(10), server.events.recv_async())
        .await
        .expect("timed out waiting for a server event")
        .expect("server task gone")
}

/// Skips over unrelated events until `pred` matches.
async fn wait_event(server: &MockVoiceServer, pred: impl Fn(&ServerEvent) -> bool) -> ServerEvent {
    loop {
        let event = next_event(server).await;
        if pred(&event) {
            return event;
        }
    }
}

async fn wait_for_state(supervisor: &Supervisor, want: SupervisorState, within: Duration) {
    let deadline = Instant::now() + within;

    while supervisor.state() != want {
        if Instant::now() > deadline {
            panic!(
                "state {:?} not reached within {:?} (currently {:?})",
                want,
                within,
                supervisor.state()
            );
        }
        sleep(Duration::from_millis(20)).await;
    }
}

async fn next_rtp(server: &MockVoiceServer) -> Vec<u8> {
    timeout(Duration::from_secs(5), server.rtp.recv_async())
        .await
        .expect("timed out waiting for an RTP packet")
        .expect("server UDP task gone")
}

fn test_cipher(key: &[u8; 32]) -> XSalsa20Poly1305 {
    XSalsa20Poly1305::new(Key::from_slice(key))
}

fn count_joins(payloads: &flume::Receiver<Value>) -> (usize, usize) {
    let mut joins = 0;
    let mut leaves = 0;

    while let Ok(payload) = payloads.try_recv() {
        assert_eq!(payload["op"], 4);
        if payload["d"]["channel_id"].is_null() {
            leaves += 1;
        } else {
            joins += 1;
        }
    }

    (joins, leaves)
}

#[tokio::test]
async fn happy_path_reaches_ready_with_bit_exact_first_packet() {
    let server = MockVoiceServer::spawn(VoiceServerConfig::default()).await;
    let (adapter, payloads) = MockAdapter::new();
    adapter.set_auto_join(auto_join(&server));

    let supervisor = Supervisor::new(coords(), adapter, Config::default());
    supervisor.connect().await.expect("handshake");

    assert_eq!(supervisor.state(), SupervisorState::Ready);

    let identify = wait_event(&server, |e| matches!(e, ServerEvent::Identify(_))).await;
    if let ServerEvent::Identify(d) = identify {
        assert_eq!(d["server_id"], "41");
        assert_eq!(d["user_id"], "77");
        assert_eq!(d["session_id"], "sess-1");
        assert_eq!(d["token"], "tok-1");
    }

    let select = wait_event(&server, |e| matches!(e, ServerEvent::SelectProtocol(_))).await;
    if let ServerEvent::SelectProtocol(d) = select {
        assert_eq!(d["protocol"], "udp");
        assert_eq!(d["data"]["address"], "198.51.100.2");
        assert_eq!(d["data"]["port"], 49_152);
        assert_eq!(d["data"]["mode"], "xsalsa20_poly1305_lite");
    }

    supervisor
        .send_audio(vec![0xF8, 0xFF, 0xFE])
        .expect("send accepted");

    let packet = next_rtp(&server).await;

    // 12B header + 16B tag + 3B payload + 4B lite trailer.
    assert_eq!(packet.len(), 35);
    assert_eq!(packet[0], 0x80);
    assert_eq!(packet[1], 120);
    assert_eq!(&packet[2..4], &[0, 0], "first sequence must be zero");
    assert_eq!(&packet[4..8], &[0, 0, 0, 0], "first timestamp must be zero");
    assert_eq!(&packet[8..12], &12345u32.to_be_bytes());
    assert_eq!(&packet[31..], &[0, 0, 0, 0], "first lite counter must be zero");

    let cipher = test_cipher(&[0xAB; 32]);
    let payload = CryptoMode::Lite
        .open(&cipher, &packet, 12)
        .expect("decrypts under the session key");
    assert_eq!(payload, vec![0xF8, 0xFF, 0xFE]);

    let (joins, leaves) = count_joins(&payloads);
    assert_eq!((joins, leaves), (1, 0));
}

#[tokio::test]
async fn heartbeat_loss_closes_with_4009_then_resumes() {
    let server = MockVoiceServer::spawn(VoiceServerConfig {
        heartbeat_interval: 150.0,
        ..VoiceServerConfig::default()
    })
    .await;
    let (adapter, payloads) = MockAdapter::new();
    adapter.set_auto_join(auto_join(&server));

    let supervisor = Supervisor::new(coords(), adapter, Config::default());
    supervisor.connect().await.expect("handshake");

    // Stop acknowledging: the third consecutive miss must close the gateway.
    server.set_ack_heartbeats(false);

    let closed = wait_event(&server, |e| matches!(e, ServerEvent::Closed(_))).await;
    assert!(matches!(closed, ServerEvent::Closed(Some(4009))));

    // Let the resume attempt succeed.
    server.set_ack_heartbeats(true);

    let resume = wait_event(&server, |e| matches!(e, ServerEvent::Resume(_))).await;
    if let ServerEvent::Resume(d) = resume {
        assert_eq!(d["session_id"], "sess-1");
        assert_eq!(d["token"], "tok-1");
        assert_eq!(d["server_id"], "41");
    }

    wait_for_state(&supervisor, SupervisorState::Ready, Duration::from_secs(10)).await;

    // The resume path never re-issues op 4.
    let (joins, leaves) = count_joins(&payloads);
    assert_eq!((joins, leaves), (1, 0));
}

#[tokio::test]
async fn invalidated_session_rejoins_from_op4() {
    let server = MockVoiceServer::spawn(VoiceServerConfig::default()).await;
    let (adapter, payloads) = MockAdapter::new();
    adapter.set_auto_join(auto_join(&server));

    let supervisor = Supervisor::new(coords(), adapter, Config::default());
    supervisor.connect().await.expect("handshake");

    // First join observed.
    wait_event(&server, |e| matches!(e, ServerEvent::Identify(_))).await;

    server.close_connection(4006);

    // A fresh handshake means a second IDENTIFY on a new connection.
    wait_event(&server, |e| matches!(e, ServerEvent::Identify(_))).await;
    wait_for_state(&supervisor, SupervisorState::Ready, Duration::from_secs(10)).await;

    let (joins, leaves) = count_joins(&payloads);
    assert_eq!((joins, leaves), (2, 0));
}

#[tokio::test]
async fn server_migration_rebuilds_against_new_endpoint() {
    let first = MockVoiceServer::spawn(VoiceServerConfig::default()).await;
    let second = MockVoiceServer::spawn(VoiceServerConfig::default()).await;
    let (adapter, payloads) = MockAdapter::new();
    adapter.set_auto_join(auto_join(&first));

    let supervisor = Supervisor::new(coords(), adapter.clone(), Config::default());
    supervisor.connect().await.expect("handshake");

    wait_event(&first, |e| matches!(e, ServerEvent::Identify(_))).await;

    // The guild's call moves: same session, new endpoint and token.
    adapter.push_server_update(lyrebird::VoiceServerUpdate {
        token: "tok-2".into(),
        guild_id: GuildId(GUILD),
        endpoint: Some(second.endpoint.clone()),
    });

    let identify = wait_event(&second, |e| matches!(e, ServerEvent::Identify(_))).await;
    if let ServerEvent::Identify(d) = identify {
        assert_eq!(d["session_id"], "sess-1");
        assert_eq!(d["token"], "tok-2");
    }

    wait_event(&second, |e| matches!(e, ServerEvent::SelectProtocol(_))).await;
    wait_for_state(&supervisor, SupervisorState::Ready, Duration::from_secs(10)).await;

    // Migration reuses the known session: no further op 4 traffic.
    let (joins, leaves) = count_joins(&payloads);
    assert_eq!((joins, leaves), (1, 0));
}

#[tokio::test]
async fn discovery_timeout_surfaces_then_exhausts_into_destroyed() {
    let server = MockVoiceServer::spawn(VoiceServerConfig {
        answer_discovery: false,
        ..VoiceServerConfig::default()
    })
    .await;
    let (adapter, _payloads) = MockAdapter::new();
    adapter.set_auto_join(auto_join(&server));

    let supervisor = Supervisor::new(
        coords(),
        adapter,
        Config::default().with_max_reconnect_attempts(0),
    );

    let err = supervisor.connect().await.expect_err("discovery must fail");
    assert!(matches!(
        err,
        Error::Timeout(TimeoutStage::IpDiscovery)
    ));

    // Zero permitted attempts: the failure exhausts straight into Destroyed.
    wait_for_state(&supervisor, SupervisorState::Destroyed, Duration::from_secs(5)).await;

    assert!(matches!(
        supervisor.connect().await,
        Err(Error::Destroyed)
    ));
}

#[tokio::test]
async fn speaking_tail_emits_exactly_five_silence_frames() {
    let server = MockVoiceServer::spawn(VoiceServerConfig::default()).await;
    let (adapter, _payloads) = MockAdapter::new();
    adapter.set_auto_join(auto_join(&server));

    let supervisor = Supervisor::new(coords(), adapter, Config::default());
    supervisor.connect().await.expect("handshake");

    supervisor.set_speaking(true).expect("speaking on");
    for _ in 0..10 {
        supervisor.send_audio(vec![0x01, 0x02, 0x03]).expect("send");
    }
    supervisor.set_speaking(false).expect("speaking off");

    // SPEAKING(1) precedes the audio; SPEAKING(0) precedes the tail.
    let on = wait_event(&server, |e| matches!(e, ServerEvent::Speaking(_))).await;
    if let ServerEvent::Speaking(d) = on {
        assert_eq!(d["speaking"], 1);
    }
    let off = wait_event(&server, |e| matches!(e, ServerEvent::Speaking(_))).await;
    if let ServerEvent::Speaking(d) = off {
        assert_eq!(d["speaking"], 0);
    }

    let cipher = test_cipher(&[0xAB; 32]);
    let mut payloads = Vec::new();

    for i in 0..15 {
        let packet = next_rtp(&server).await;

        // Strictly increasing sequence/timestamp across audio and tail.
        assert_eq!(&packet[2..4], &(i as u16).to_be_bytes());
        assert_eq!(&packet[4..8], &(i as u32 * 960).to_be_bytes());

        payloads.push(
            CryptoMode::Lite
                .open(&cipher, &packet, 12)
                .expect("session key decrypts"),
        );
    }

    for payload in &payloads[..10] {
        assert_eq!(payload, &vec![0x01, 0x02, 0x03]);
    }
    for payload in &payloads[10..] {
        assert_eq!(payload, &vec![0xF8, 0xFF, 0xFE]);
    }

    // Quiescence after the tail: nothing else goes out.
    assert!(
        timeout(Duration::from_millis(300), server.rtp.recv_async())
            .await
            .is_err(),
        "no packets may follow the silence tail"
    );
}

#[tokio::test]
async fn disconnect_announces_departure_and_goes_quiet() {
    let server = MockVoiceServer::spawn(VoiceServerConfig::default()).await;
    let (adapter, payloads) = MockAdapter::new();
    adapter.set_auto_join(auto_join(&server));

    let supervisor = Supervisor::new(coords(), adapter, Config::default());
    supervisor.connect().await.expect("handshake");

    supervisor.disconnect().expect("disconnect accepted");
    wait_for_state(
        &supervisor,
        SupervisorState::Disconnected,
        Duration::from_secs(5),
    )
    .await;

    let (joins, leaves) = count_joins(&payloads);
    assert_eq!((joins, leaves), (1, 1));

    // Frames offered while disconnected are silently dropped.
    supervisor.send_audio(vec![0xF8, 0xFF, 0xFE]).expect("accepted");
    sleep(Duration::from_millis(100)).await;
    assert!(server.rtp.try_recv().is_err());
    assert!(supervisor.metrics().frames_dropped > 0);

    // Leaving cleared the channel coordinate: a rejoin needs fresh ones.
    assert!(matches!(
        supervisor.connect().await,
        Err(Error::MissingChannel)
    ));
}
