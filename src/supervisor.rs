//! The public control object for one voice connection.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flume::Sender;
use parking_lot::Mutex;
use tracing::instrument;

use crate::adapter::GatewayAdapter;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{self, VoiceObserver};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::model::id::{ChannelId, GuildId, UserId};
use crate::tasks::message::{CoreMessage, Interconnect};
use crate::tasks::{start, start_adapter_forwarder};

static NEXT_SUPERVISOR_ID: AtomicU64 = AtomicU64::new(0);

/// Where the supervisor's state machine currently sits.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SupervisorState {
    /// No session, none being built.
    Disconnected,
    /// A join was requested; op 4 is going out.
    Connecting,
    /// Waiting on the paired voice server/state updates from the main
    /// gateway.
    AwaitingVoiceInfo,
    /// Voice gateway websocket open; IDENTIFY/READY in flight.
    Authenticating,
    /// UDP negotiation: IP discovery through session description.
    EstablishingTransport,
    /// Fully connected; audio may flow.
    Ready,
    /// A lost session is being resumed or rebuilt.
    Reconnecting,
    /// Permanently out of service.
    Destroyed,
}

/// Identifies the membership a supervisor maintains in the Discord voice
/// graph.
#[derive(Clone, Debug)]
pub struct ChannelCoordinates {
    /// Guild owning the target channel.
    pub guild_id: GuildId,
    /// Target voice channel. Channel moves are tracked internally;
    /// disconnecting clears it.
    pub channel_id: Option<ChannelId>,
    /// The connecting user (bot) ID.
    pub user_id: UserId,
    /// Whether to join muted.
    pub self_mute: bool,
    /// Whether to join deafened.
    pub self_deaf: bool,
}

impl ChannelCoordinates {
    pub fn new(guild_id: GuildId, channel_id: ChannelId, user_id: UserId) -> Self {
        Self {
            guild_id,
            channel_id: Some(channel_id),
            user_id,
            self_mute: false,
            self_deaf: false,
        }
    }

    pub fn with_self_mute(mut self, self_mute: bool) -> Self {
        self.self_mute = self_mute;
        self
    }

    pub fn with_self_deaf(mut self, self_deaf: bool) -> Self {
        self.self_deaf = self_deaf;
        self
    }
}

/// State mirrored out of the core task for cheap, lock-only reads.
pub(crate) struct Shared {
    pub state: Mutex<SupervisorState>,
    pub ping: Mutex<Option<Duration>>,
    pub destroyed: AtomicBool,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            state: Mutex::new(SupervisorState::Disconnected),
            ping: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        }
    }
}

/// Control handle for one supervised voice connection.
///
/// Cheap to clone; every clone drives the same background core task. Must be
/// created from within a Tokio runtime.
#[derive(Clone)]
pub struct Supervisor {
    id: u64,
    tx: Sender<CoreMessage>,
    shared: Arc<Shared>,
    metrics: Arc<Metrics>,
}

impl Supervisor {
    /// Creates a supervisor for the given channel coordinates, wired to a
    /// main-gateway adapter.
    ///
    /// This spawns the background tasks immediately; no traffic occurs until
    /// [`connect`] is called.
    ///
    /// [`connect`]: Supervisor::connect
    pub fn new(
        coords: ChannelCoordinates,
        adapter: Arc<dyn GatewayAdapter>,
        config: Config,
    ) -> Self {
        let (core_tx, core_rx) = flume::unbounded();
        let (evt_tx, evt_rx) = flume::unbounded();

        tokio::spawn(events::runner(evt_rx));

        let interconnect = Interconnect {
            core: core_tx.clone(),
            events: evt_tx,
        };

        let shared = Arc::new(Shared::default());
        let metrics = Arc::new(Metrics::default());

        start_adapter_forwarder(&adapter, &coords, core_tx.clone());
        start(
            config,
            coords,
            adapter,
            interconnect,
            shared.clone(),
            metrics.clone(),
            core_rx,
        );

        Self {
            id: NEXT_SUPERVISOR_ID.fetch_add(1, Ordering::Relaxed),
            tx: core_tx,
            shared,
            metrics,
        }
    }

    /// Joins the configured voice channel, driving the handshake through to
    /// [`SupervisorState::Ready`].
    ///
    /// Resolves once audio may flow, or with the first failure. Later
    /// recoveries run in the background and are reported through observers.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::Destroyed);
        }

        let (tx, rx) = flume::bounded(1);
        self.send(CoreMessage::Connect(tx))?;

        rx.recv_async().await.map_err(|_| Error::Cancelled)?
    }

    /// Queues one pre-encoded Opus frame for transmission.
    ///
    /// Silently dropped (and counted) while the supervisor is not `Ready`.
    /// Never blocks beyond the mailbox send.
    pub fn send_audio(&self, frame: Vec<u8>) -> Result<()> {
        self.send(CoreMessage::SendAudio(frame))
    }

    /// Raises or lowers the speaking indicator.
    ///
    /// Lowering it emits the standard five-frame silence tail before the
    /// stream goes quiet.
    pub fn set_speaking(&self, active: bool) -> Result<()> {
        self.send(CoreMessage::SetSpeaking(active))
    }

    /// Leaves the voice channel: announces the departure on the main gateway
    /// (op 4 with a null channel), then tears down both sockets.
    ///
    /// The channel coordinate is cleared with the session; a later
    /// [`connect`] fails with [`Error::MissingChannel`] rather than quietly
    /// rejoining.
    ///
    /// [`connect`]: Supervisor::connect
    pub fn disconnect(&self) -> Result<()> {
        self.send(CoreMessage::Disconnect)
    }

    /// Disconnects and permanently retires this supervisor.
    ///
    /// Idempotent; all subsequent operations fail with [`Error::Destroyed`].
    pub fn destroy(&self) {
        let _ = self.tx.send(CoreMessage::Destroy);
    }

    /// Registers an observer for this supervisor's events.
    pub fn add_observer(&self, observer: Arc<dyn VoiceObserver>) -> Result<()> {
        self.send(CoreMessage::AddObserver(observer))
    }

    /// Current position of the supervisor state machine.
    pub fn state(&self) -> SupervisorState {
        *self.shared.state.lock()
    }

    /// Most recent UDP round-trip estimate, from the keepalive exchange.
    pub fn ping(&self) -> Option<Duration> {
        *self.shared.ping.lock()
    }

    /// Counters for this supervisor's send/receive paths.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stable identifier, unique per supervisor within this process.
    pub fn id(&self) -> u64 {
        self.id
    }

    fn is_destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::SeqCst)
    }

    fn send(&self, msg: CoreMessage) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::Destroyed);
        }

        self.tx.send(msg).map_err(|_| Error::Destroyed)
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
