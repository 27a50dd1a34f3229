//! # Lyrebird
//!
//! An async client library for Discord's voice API.
//!
//! Lyrebird joins a guild voice channel, negotiates the encrypted RTP
//! transport with Discord's voice servers, and streams caller-supplied Opus
//! frames in real time. It composes:
//!
//!  * a narrow adapter onto whatever main-gateway implementation hosts it
//!    (op 4 out, `VOICE_SERVER_UPDATE`/`VOICE_STATE_UPDATE` in),
//!  * a voice gateway websocket client (IDENTIFY, heartbeating, RESUME),
//!  * a UDP transport with IP discovery, keepalives, and AEAD-sealed RTP,
//!  * a supervisor which owns the above, recovers from partial failures,
//!    and exposes `connect`/`send_audio`/`set_speaking`/`disconnect`,
//!  * a cooperative 20 ms scheduler pacing frames over one or more
//!    supervisors.
//!
//! Opus encoding, decoding, and mixing are deliberately out of scope: the
//! caller owns the codec and hands over ready-made frames.

#![deny(rustdoc::broken_intra_doc_links)]

mod adapter;
mod config;
pub mod constants;
mod connection;
pub mod crypto;
pub mod discovery;
mod error;
mod events;
mod info;
mod metrics;
pub mod model;
pub mod rtp;
mod scheduler;
mod supervisor;
mod tasks;
pub mod ws;

pub use crate::adapter::{GatewayAdapter, VoiceServerUpdate, VoiceStateUpdate};
pub use crate::config::{Config, EmptyBehavior};
pub use crate::crypto::CryptoMode;
pub use crate::error::{Error, ErrorKind, Result, TimeoutStage};
pub use crate::events::{SupervisorEvent, VoiceObserver};
pub use crate::info::ConnectionInfo;
pub use crate::metrics::{Metrics, MetricsSnapshot};
pub use crate::scheduler::{FrameSource, Scheduler, SchedulerState};
pub use crate::supervisor::{ChannelCoordinates, Supervisor, SupervisorState};
