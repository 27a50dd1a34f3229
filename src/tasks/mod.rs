//! Long-lived tasks backing one voice connection supervisor.
//!
//! The core task owns the state machine and every socket; the websocket and
//! UDP tasks only schedule work back against its mailbox. All teardown is
//! driven by dropping [`Connection`], which poisons the subordinate tasks.

pub(crate) mod message;
pub(crate) mod udp_rx;
pub(crate) mod udp_tx;
pub(crate) mod ws;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use flume::{Receiver, Sender};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::adapter::{voice_state_payload, GatewayAdapter, VoiceServerUpdate, VoiceStateUpdate};
use crate::config::Config;
use crate::connection::Connection;
use crate::constants::*;
use crate::error::{Error, Result, TimeoutStage};
use crate::events::SupervisorEvent;
use crate::info::ConnectionProgress;
use crate::metrics::Metrics;
use crate::model::CloseCode;
use crate::rtp::RtpHeader;
use crate::supervisor::{ChannelCoordinates, Shared, SupervisorState};
use message::*;

type HandshakeFuture = Pin<Box<dyn Future<Output = Result<Connection>> + Send>>;

/// Which recovery flavour an in-flight handshake belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PendingKind {
    /// Fresh session establishment (initial join, rejoin, or migration).
    Session,
    /// RESUME against a preserved session.
    Resume,
}

struct Pending {
    kind: PendingKind,
    fut: HandshakeFuture,
}

pub(crate) struct Core {
    config: Config,
    coords: ChannelCoordinates,
    adapter: Arc<dyn GatewayAdapter>,
    interconnect: Interconnect,
    shared: Arc<Shared>,
    metrics: Arc<Metrics>,

    state: SupervisorState,
    progress: Option<ConnectionProgress>,
    conn: Option<Connection>,

    speaking: bool,
    silence_remaining: u8,
    next_silence: Instant,

    info_deadline: Option<Instant>,
    info_retried: bool,
    rejoin_at: Option<Instant>,

    connect_notify: Option<Sender<Result<()>>>,
    reconnect_attempts: u8,
    destroyed: bool,
}

pub(crate) fn start(
    config: Config,
    coords: ChannelCoordinates,
    adapter: Arc<dyn GatewayAdapter>,
    interconnect: Interconnect,
    shared: Arc<Shared>,
    metrics: Arc<Metrics>,
    rx: Receiver<CoreMessage>,
) {
    let core = Core {
        config,
        coords,
        adapter,
        interconnect,
        shared,
        metrics,
        state: SupervisorState::Disconnected,
        progress: None,
        conn: None,
        speaking: false,
        silence_remaining: 0,
        next_silence: Instant::now(),
        info_deadline: None,
        info_retried: false,
        rejoin_at: None,
        connect_notify: None,
        reconnect_attempts: 0,
        destroyed: false,
    };

    tokio::spawn(async move {
        info!("Supervisor core started.");
        runner(core, rx).await;
        info!("Supervisor core finished.");
    });
}

#[instrument(skip(core, rx))]
async fn runner(mut core: Core, rx: Receiver<CoreMessage>) {
    let mut pending: Option<Pending> = None;

    loop {
        let has_pending = pending.is_some();
        let silence_due = core.silence_remaining > 0;
        let info_due = core.info_deadline.is_some();
        let rejoin_due = core.rejoin_at.is_some() && !has_pending;
        let far_off = Instant::now() + Duration::from_secs(3600);

        let finished = tokio::select! {
            msg = rx.recv_async() => {
                match msg {
                    Ok(msg) => core.handle(msg, &mut pending).await,
                    Err(_) => true,
                }
            },
            res = async { (&mut pending.as_mut().expect("guarded by has_pending").fut).await },
                    if has_pending => {
                let kind = pending.take().expect("guarded by has_pending").kind;
                core.on_handshake_done(kind, res, &mut pending)
            },
            _ = time::sleep_until(core.next_silence), if silence_due => {
                core.silence_tick();
                false
            },
            _ = time::sleep_until(core.info_deadline.unwrap_or(far_off)), if info_due => {
                core.on_info_deadline(&mut pending).await
            },
            _ = time::sleep_until(core.rejoin_at.unwrap_or(far_off)), if rejoin_due => {
                core.rejoin_at = None;
                match core.begin_join().await {
                    Ok(()) => false,
                    Err(e) => core.recover_or_fail(e, &mut pending),
                }
            },
        };

        if finished {
            break;
        }
    }

    core.shutdown();
}

impl Core {
    /// Processes one mailbox message. Returns `true` once the core should
    /// exit.
    async fn handle(&mut self, msg: CoreMessage, pending: &mut Option<Pending>) -> bool {
        use CoreMessage::*;

        match msg {
            Connect(notify) => {
                if self.destroyed {
                    let _ = notify.send(Err(Error::Destroyed));
                } else if self.state != SupervisorState::Disconnected {
                    let _ = notify.send(Err(Error::AlreadyConnected));
                } else if self.coords.channel_id.is_none() {
                    let _ = notify.send(Err(Error::MissingChannel));
                } else {
                    self.connect_notify = Some(notify);
                    self.reconnect_attempts = 0;
                    self.rejoin_at = None;

                    if let Err(e) = self.begin_join().await {
                        self.fail_join(e);
                    }
                }

                false
            },
            Disconnect => {
                self.do_disconnect(pending, "requested by caller", true).await;
                false
            },
            Destroy => self.do_destroy(pending).await,
            SendAudio(frame) => {
                if self.state == SupervisorState::Ready && self.conn.is_some() {
                    self.send_frame(frame, true).await;
                } else {
                    Metrics::incr(&self.metrics.frames_dropped);
                }

                false
            },
            SetSpeaking(active) => {
                if self.state == SupervisorState::Ready {
                    self.set_speaking(active).await;
                }

                false
            },
            AddObserver(observer) => {
                let _ = self
                    .interconnect
                    .events
                    .send(crate::events::EventMessage::AddObserver(observer));
                false
            },
            ServerUpdate(update) => {
                self.on_server_update(update, pending);
                false
            },
            StateUpdate(update) => {
                self.on_state_update(update, pending).await;
                false
            },
            Phase(state) => {
                // Only meaningful while its handshake is still in flight.
                if pending.is_some() {
                    self.set_state(state);
                }
                false
            },
            GatewayStale => {
                if self.conn.is_some() {
                    self.fire_error(&Error::GatewayStale);
                    return self.begin_recovery(pending);
                }
                false
            },
            TransportStale => {
                if self.conn.is_some() {
                    self.fire_error(&Error::TransportStale);
                    return self.begin_recovery(pending);
                }
                false
            },
            WsClosed(code) => self.on_ws_closed(code, pending),
            Ping(latency) => {
                *self.shared.ping.lock() = Some(latency);
                false
            },
            Poison => true,
        }
    }

    // ---- join path -------------------------------------------------------

    /// Issues op 4 and starts the wait for the paired voice server/state
    /// updates.
    async fn begin_join(&mut self) -> Result<()> {
        let channel_id = self.coords.channel_id.ok_or(Error::MissingChannel)?;

        self.set_state(SupervisorState::Connecting);

        let payload = voice_state_payload(
            self.coords.guild_id,
            Some(channel_id),
            self.coords.self_mute,
            self.coords.self_deaf,
        );

        if !self.adapter.send_payload(payload).await {
            return Err(Error::AdapterUnavailable);
        }

        self.progress = Some(ConnectionProgress::new(
            self.coords.guild_id,
            self.coords.user_id,
        ));
        self.info_deadline = Some(Instant::now() + VOICE_INFO_DEADLINE);
        self.info_retried = false;
        self.set_state(SupervisorState::AwaitingVoiceInfo);

        Ok(())
    }

    /// One op 4 retry is allowed before a voice-info timeout surfaces.
    async fn on_info_deadline(&mut self, pending: &mut Option<Pending>) -> bool {
        if self.state != SupervisorState::AwaitingVoiceInfo {
            self.info_deadline = None;
            return false;
        }

        if !self.info_retried {
            warn!("Voice info pairing deadline expired; re-issuing voice state update.");
            self.info_retried = true;
            self.info_deadline = Some(Instant::now() + VOICE_INFO_DEADLINE);

            if let Some(channel_id) = self.coords.channel_id {
                let payload = voice_state_payload(
                    self.coords.guild_id,
                    Some(channel_id),
                    self.coords.self_mute,
                    self.coords.self_deaf,
                );
                let _ = self.adapter.send_payload(payload).await;
            }

            return false;
        }

        self.info_deadline = None;
        let e = Error::Timeout(TimeoutStage::VoiceInfo);

        if self.connect_notify.is_some() {
            // Caller-driven join: surface and stop.
            self.fail_join(e);
            false
        } else {
            // Autonomous rejoin: bounded by the usual attempt budget.
            self.recover_or_fail(e, pending)
        }
    }

    /// Terminal failure of a caller-driven join.
    fn fail_join(&mut self, e: Error) {
        self.info_deadline = None;
        self.rejoin_at = None;
        self.progress = None;
        self.fire_error(&e);
        self.set_state(SupervisorState::Disconnected);

        if let Some(tx) = self.connect_notify.take() {
            let _ = tx.send(Err(e));
        }
    }

    // ---- voice info pairing ----------------------------------------------

    fn on_server_update(&mut self, update: VoiceServerUpdate, pending: &mut Option<Pending>) {
        let Some(endpoint) = update.endpoint else {
            self.interconnect.fire(SupervisorEvent::Debug(
                "Voice server pending allocation (null endpoint).".into(),
            ));
            return;
        };

        let Some(progress) = self.progress.as_mut() else {
            debug!("Unsolicited voice server update ignored.");
            return;
        };

        if progress.apply_server_update(endpoint, update.token) {
            self.on_voice_info_progress(pending);
        }
    }

    async fn on_state_update(&mut self, update: VoiceStateUpdate, pending: &mut Option<Pending>) {
        let Some(channel_id) = update.channel_id else {
            // Kicked, or the channel went away. The op 4 echo of our own
            // disconnect lands in `Disconnected` state and is ignored here.
            if !matches!(
                self.state,
                SupervisorState::Disconnected | SupervisorState::Destroyed
            ) {
                info!("Removed from voice channel by the server.");
                self.do_disconnect(pending, "removed from voice channel", false)
                    .await;
            }
            return;
        };

        // Channel moves keep the coordinates honest for later rejoins.
        if self.coords.channel_id != Some(channel_id) {
            self.coords.channel_id = Some(channel_id);
        }

        let Some(progress) = self.progress.as_mut() else {
            return;
        };

        if progress.apply_state_update(update.session_id) {
            self.on_voice_info_progress(pending);
        }
    }

    /// The progress tracker reported something significant: either the pair
    /// just completed, or a live session's server/session changed under us.
    fn on_voice_info_progress(&mut self, pending: &mut Option<Pending>) {
        let Some(info) = self.progress.as_ref().and_then(|p| p.info()) else {
            return;
        };

        match self.state {
            SupervisorState::AwaitingVoiceInfo => {
                self.info_deadline = None;
                self.set_state(SupervisorState::Authenticating);
                self.begin_session(info, None, pending);
            },
            SupervisorState::Ready
            | SupervisorState::Authenticating
            | SupervisorState::EstablishingTransport
            | SupervisorState::Reconnecting => {
                // Server migration (or session replacement): the old
                // credentials are dead wholesale. Tear down before rebuild.
                info!("Voice server migration; rebuilding session.");
                self.conn = None;
                *pending = None;
                self.set_state(SupervisorState::Reconnecting);
                self.begin_session(info, None, pending);
            },
            _ => {},
        }
    }

    // ---- handshake lifecycle ---------------------------------------------

    fn begin_session(
        &mut self,
        info: crate::info::ConnectionInfo,
        delay: Option<Duration>,
        pending: &mut Option<Pending>,
    ) {
        // At most one websocket and one UDP socket may exist: the old
        // session is gone before the new dial starts.
        self.conn = None;
        self.speaking = false;
        self.silence_remaining = 0;

        let config = self.config.clone();
        let interconnect = self.interconnect.clone();
        let metrics = self.metrics.clone();

        *pending = Some(Pending {
            kind: PendingKind::Session,
            fut: Box::pin(async move {
                if let Some(delay) = delay {
                    time::sleep(delay).await;
                }
                Connection::connect(info, config, interconnect, metrics).await
            }),
        });
    }

    fn begin_resume_attempt(
        &mut self,
        state: crate::connection::ResumeState,
        delay: Duration,
        pending: &mut Option<Pending>,
    ) {
        self.speaking = false;
        self.silence_remaining = 0;

        let config = self.config.clone();
        let interconnect = self.interconnect.clone();
        let metrics = self.metrics.clone();

        *pending = Some(Pending {
            kind: PendingKind::Resume,
            fut: Box::pin(async move {
                time::sleep(delay).await;
                Connection::resume(state, config, interconnect, metrics).await
            }),
        });
    }

    fn on_handshake_done(
        &mut self,
        kind: PendingKind,
        res: Result<Connection>,
        pending: &mut Option<Pending>,
    ) -> bool {
        match res {
            Ok(conn) => {
                let ssrc = conn.ssrc;
                let (external_ip, external_port) = conn.external;
                let mode = conn.mode;

                self.conn = Some(conn);
                self.reconnect_attempts = 0;
                self.rejoin_at = None;

                // State must read `Ready` before any waiting `connect`
                // caller resumes.
                self.set_state(SupervisorState::Ready);
                self.interconnect.fire(SupervisorEvent::Ready {
                    ssrc,
                    external_ip,
                    external_port,
                    mode,
                });

                if let Some(tx) = self.connect_notify.take() {
                    let _ = tx.send(Ok(()));
                }

                false
            },
            Err(e) => {
                warn!("Voice handshake failed ({:?}): {}", kind, e);

                if kind == PendingKind::Resume {
                    // Resume window missed: restart the entire handshake.
                    self.interconnect.fire(SupervisorEvent::Debug(
                        "Resume rejected or timed out; falling back to a full handshake.".into(),
                    ));
                }

                self.recover_or_fail(e, pending)
            },
        }
    }

    // ---- recovery policy -------------------------------------------------

    /// Decides what a failure costs: retry under the attempt budget, give up
    /// into `Disconnected`, or exhaust into `Destroyed`.
    ///
    /// Returns `true` when the core should exit.
    fn recover_or_fail(&mut self, e: Error, pending: &mut Option<Pending>) -> bool {
        let retriable = matches!(
            e,
            Error::Timeout(_)
                | Error::Io(_)
                | Error::Ws(_)
                | Error::GatewayStale
                | Error::TransportStale
                | Error::InterconnectFailure(_)
        );

        self.fire_error(&e);

        if let Some(tx) = self.connect_notify.take() {
            let _ = tx.send(Err(e));
        }

        if !retriable || !self.config.auto_reconnect {
            self.conn = None;
            self.progress = None;
            self.info_deadline = None;
            self.set_state(SupervisorState::Disconnected);
            self.interconnect.fire(SupervisorEvent::Disconnected {
                reason: "unrecoverable failure".into(),
            });
            return false;
        }

        let Some(attempt) = self.next_attempt() else {
            return self.exhaust();
        };

        self.set_state(SupervisorState::Reconnecting);
        self.interconnect
            .fire(SupervisorEvent::Reconnecting { attempt });

        if let Some(info) = self.progress.as_ref().and_then(|p| p.info()) {
            self.begin_session(info, Some(backoff(attempt)), pending);
        } else {
            // No complete voice info to reuse: go back through op 4.
            self.rejoin_at = Some(Instant::now() + backoff(attempt));
        }

        false
    }

    /// Tears down a live-but-stale session and tries a RESUME.
    fn begin_recovery(&mut self, pending: &mut Option<Pending>) -> bool {
        if !self.config.auto_reconnect {
            self.conn = None;
            self.progress = None;
            self.set_state(SupervisorState::Disconnected);
            self.interconnect.fire(SupervisorEvent::Disconnected {
                reason: "session stale".into(),
            });
            return false;
        }

        let Some(conn) = self.conn.take() else {
            return false;
        };

        let resume = conn.resume_state();
        drop(conn);

        let Some(attempt) = self.next_attempt() else {
            return self.exhaust();
        };

        self.set_state(SupervisorState::Reconnecting);
        self.interconnect
            .fire(SupervisorEvent::Reconnecting { attempt });
        self.begin_resume_attempt(resume, backoff(attempt), pending);

        false
    }

    fn on_ws_closed(&mut self, code: Option<u16>, pending: &mut Option<Pending>) -> bool {
        if self.conn.is_none() {
            return false;
        }

        match code.and_then(CloseCode::from_u16) {
            Some(CloseCode::SessionInvalid) => {
                // Session invalidated: the old session id is worthless, so a
                // resume is off the table. Rejoin from op 4.
                warn!("Voice session invalidated; performing a fresh handshake.");
                self.fire_error(&Error::GatewayFatal(CloseCode::SessionInvalid as u16));
                self.conn = None;
                self.progress = None;
                self.speaking = false;
                self.silence_remaining = 0;
                self.set_state(SupervisorState::Disconnected);
                self.interconnect.fire(SupervisorEvent::Disconnected {
                    reason: "voice session invalidated".into(),
                });

                if self.config.auto_reconnect && self.coords.channel_id.is_some() {
                    let Some(attempt) = self.next_attempt() else {
                        return self.exhaust();
                    };
                    self.interconnect
                        .fire(SupervisorEvent::Reconnecting { attempt });
                    self.rejoin_at = Some(Instant::now() + backoff(attempt));
                }

                false
            },
            Some(close) if close.is_fatal() => {
                // Authentication, kick, or crypto mismatch: final.
                let raw = close as u16;
                error!("Voice gateway closed fatally with code {}.", raw);
                self.fire_error(&Error::GatewayFatal(raw));
                self.conn = None;
                self.progress = None;
                self.speaking = false;
                self.silence_remaining = 0;
                self.set_state(SupervisorState::Disconnected);
                self.interconnect.fire(SupervisorEvent::Disconnected {
                    reason: format!("voice gateway closed ({})", raw),
                });

                false
            },
            known => {
                // Known-resumable codes and anything unclassified both get a
                // resume attempt first.
                let verdict = if known.map_or(false, |c| c.should_resume()) {
                    "resumable"
                } else {
                    "unclassified"
                };
                self.interconnect.fire(SupervisorEvent::Debug(format!(
                    "Voice gateway closed ({:?}, {}); attempting resume.",
                    code, verdict
                )));
                self.begin_recovery(pending)
            },
        }
    }

    fn next_attempt(&mut self) -> Option<u8> {
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);

        if self.reconnect_attempts > self.config.max_reconnect_attempts.min(32) {
            None
        } else {
            Some(self.reconnect_attempts)
        }
    }

    /// The attempt budget ran dry: the supervisor takes itself out of
    /// service entirely.
    fn exhaust(&mut self) -> bool {
        error!("Reconnection attempts exhausted; destroying supervisor.");

        self.conn = None;
        self.progress = None;
        self.fire_error(&Error::AttemptsExhausted);
        self.interconnect.fire(SupervisorEvent::Disconnected {
            reason: "reconnection attempts exhausted".into(),
        });

        self.destroyed = true;
        self.shared.destroyed.store(true, Ordering::SeqCst);
        self.adapter.destroy();
        self.set_state(SupervisorState::Destroyed);

        true
    }

    // ---- teardown --------------------------------------------------------

    async fn do_disconnect(
        &mut self,
        pending: &mut Option<Pending>,
        reason: &str,
        announce: bool,
    ) {
        self.info_deadline = None;
        self.rejoin_at = None;
        *pending = None;

        if let Some(tx) = self.connect_notify.take() {
            let _ = tx.send(Err(Error::Cancelled));
        }

        // The op 4 departure always precedes socket teardown.
        if announce {
            let payload = voice_state_payload(
                self.coords.guild_id,
                None,
                self.coords.self_mute,
                self.coords.self_deaf,
            );
            let _ = self.adapter.send_payload(payload).await;
        }

        // The membership is gone with the session: a later `connect` must
        // not quietly rejoin the channel the caller just left.
        self.coords.channel_id = None;

        self.conn = None;
        self.progress = None;
        self.speaking = false;
        self.silence_remaining = 0;
        self.reconnect_attempts = 0;

        if self.state != SupervisorState::Disconnected {
            self.set_state(SupervisorState::Disconnected);
            self.interconnect.fire(SupervisorEvent::Disconnected {
                reason: reason.into(),
            });
        }
    }

    async fn do_destroy(&mut self, pending: &mut Option<Pending>) -> bool {
        if self.destroyed && self.state == SupervisorState::Destroyed {
            return true;
        }

        let announce = self.conn.is_some() || self.progress.is_some() || pending.is_some();
        self.do_disconnect(pending, "destroyed", announce).await;

        self.destroyed = true;
        self.shared.destroyed.store(true, Ordering::SeqCst);
        self.adapter.destroy();
        self.set_state(SupervisorState::Destroyed);

        true
    }

    fn shutdown(&mut self) {
        self.conn = None;
        self.interconnect.poison_events();
    }

    // ---- audio path ------------------------------------------------------

    async fn send_frame(&mut self, frame: Vec<u8>, raise_speaking: bool) {
        if raise_speaking && !self.speaking {
            self.set_speaking(true).await;
        }

        self.seal_and_send(&frame);
    }

    /// Seals one frame against the live session and hands it to the UDP
    /// transmit task. The cursor only marches once a packet actually leaves.
    fn seal_and_send(&mut self, frame: &[u8]) {
        let Some(conn) = self.conn.as_mut() else {
            Metrics::incr(&self.metrics.frames_dropped);
            return;
        };

        if frame.len() > conn.mode.payload_budget() {
            warn!("Oversized Opus frame ({} bytes) dropped.", frame.len());
            Metrics::incr(&self.metrics.frames_dropped);
            return;
        }

        let header = RtpHeader::new(conn.cursor.sequence, conn.cursor.timestamp, conn.ssrc);

        match conn.mode.seal(
            &conn.cipher,
            &header.to_bytes(),
            frame,
            conn.cursor.nonce_counter,
        ) {
            Ok(packet) => {
                if conn.udp_tx.send(UdpTxMessage::Packet(packet)).is_ok() {
                    Metrics::incr(&self.metrics.packets_sent);
                    conn.cursor.advance(conn.mode);
                } else {
                    Metrics::incr(&self.metrics.udp_send_errors);
                }
            },
            Err(e) => {
                warn!("Failed to seal outbound packet: {:?}.", e);
                Metrics::incr(&self.metrics.encrypt_failures);
            },
        }
    }

    async fn set_speaking(&mut self, active: bool) {
        if self.speaking == active {
            return;
        }

        self.speaking = active;

        if let Some(conn) = &self.conn {
            let (done_tx, done_rx) = flume::bounded(1);

            // SPEAKING observably precedes the next audio packet: wait for
            // the websocket task to finish the send before returning to the
            // audio path.
            if conn
                .ws
                .send(WsMessage::Speaking {
                    active,
                    done: Some(done_tx),
                })
                .is_ok()
            {
                let _ = time::timeout(Duration::from_secs(1), done_rx.recv_async()).await;
            }
        }

        if active {
            self.silence_remaining = 0;
        } else {
            self.silence_remaining = SILENT_FRAME_COUNT;
            self.next_silence = Instant::now();
        }
    }

    fn silence_tick(&mut self) {
        if self.state != SupervisorState::Ready || self.conn.is_none() {
            self.silence_remaining = 0;
            return;
        }

        self.silence_remaining -= 1;
        self.next_silence += TIMESTEP_LENGTH;

        // Tail frames ride the normal send path (and march the cursor), but
        // must not flip the speaking flag back on.
        self.seal_and_send(&SILENT_FRAME);
    }

    // ---- misc ------------------------------------------------------------

    fn set_state(&mut self, new: SupervisorState) {
        if self.state == new {
            return;
        }

        let old = std::mem::replace(&mut self.state, new);
        *self.shared.state.lock() = new;

        debug!("Supervisor state {:?} -> {:?}.", old, new);
        self.interconnect
            .fire(SupervisorEvent::StateChange { old, new });
    }

    fn fire_error(&self, e: &Error) {
        self.interconnect.fire(SupervisorEvent::Error {
            kind: e.kind(),
            detail: e.to_string(),
        });
    }
}

fn backoff(attempt: u8) -> Duration {
    (RECONNECT_BACKOFF_STEP * u32::from(attempt)).min(RECONNECT_BACKOFF_CAP)
}

/// Forwards adapter events into the core mailbox, scoped to this
/// supervisor's guild (and, for state updates, its user).
pub(crate) fn start_adapter_forwarder(
    adapter: &Arc<dyn GatewayAdapter>,
    coords: &ChannelCoordinates,
    core: Sender<CoreMessage>,
) {
    let server_rx = adapter.server_updates();
    let state_rx = adapter.state_updates();
    let guild_id = coords.guild_id;
    let user_id = coords.user_id;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                update = server_rx.recv_async() => {
                    match update {
                        Ok(update) if update.guild_id == guild_id => {
                            if core.send(CoreMessage::ServerUpdate(update)).is_err() {
                                break;
                            }
                        },
                        Ok(_) => {},
                        Err(_) => break,
                    }
                }
                update = state_rx.recv_async() => {
                    match update {
                        Ok(update)
                            if update.guild_id == Some(guild_id)
                                && update.user_id == user_id =>
                        {
                            if core.send(CoreMessage::StateUpdate(update)).is_err() {
                                break;
                            }
                        },
                        Ok(_) => {},
                        Err(_) => break,
                    }
                }
            }
        }
    });
}
