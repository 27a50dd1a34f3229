//! Constants affecting voice connection function and API handling.

use std::time::Duration;

/// The voice gateway version spoken by this library.
pub const VOICE_GATEWAY_VERSION: u8 = 4;

/// Sample rate of audio sent to Discord.
pub const SAMPLE_RATE_RAW: usize = 48_000;

/// Number of audio frames/packets to be sent per second.
pub const AUDIO_FRAME_RATE: usize = 50;

/// Length of time between any two audio frames.
pub const TIMESTEP_LENGTH: Duration = Duration::from_millis(1000 / AUDIO_FRAME_RATE as u64);

/// Number of samples in one complete frame of audio per channel.
///
/// This is equally the RTP timestamp advance between consecutive packets.
pub const MONO_FRAME_SIZE: usize = SAMPLE_RATE_RAW / AUDIO_FRAME_RATE;

/// Maximum packet size for a voice packet.
///
/// Set a safe amount below the Ethernet MTU to avoid fragmentation/rejection.
pub const VOICE_PACKET_MAX: usize = 1460;

/// Delay between sends of UDP keepalive frames.
///
/// Passive monitoring of Discord itself shows that these fire every 5 seconds
/// irrespective of outgoing UDP traffic.
pub const UDP_KEEPALIVE_GAP_MS: u64 = 5_000;

/// Type-converted delay between sends of UDP keepalive frames.
pub const UDP_KEEPALIVE_GAP: Duration = Duration::from_millis(UDP_KEEPALIVE_GAP_MS);

/// Size of a UDP keepalive frame and of the server's reply to one.
pub const UDP_KEEPALIVE_LEN: usize = 8;

/// Number of consecutive unanswered keepalives after which the UDP transport
/// is considered stale.
pub const UDP_KEEPALIVE_MISS_LIMIT: u8 = 5;

/// Opus silent frame, used to signal speech start and end (and prevent audio glitching).
pub const SILENT_FRAME: [u8; 3] = [0xf8, 0xff, 0xfe];

/// Number of silent frames sent after speech ends.
pub const SILENT_FRAME_COUNT: u8 = 5;

/// The one (and only) RTP version.
pub const RTP_VERSION: u8 = 2;

/// Dynamic RTP payload type used by Discord's Opus audio traffic.
pub const RTP_PROFILE_TYPE: u8 = 120;

/// Maximum time allowed for the voice server to answer an IP discovery probe.
pub const IP_DISCOVERY_DEADLINE: Duration = Duration::from_secs(5);

/// Maximum time between issuing a voice state update on the main gateway and
/// observing both halves of the voice server handshake.
pub const VOICE_INFO_DEADLINE: Duration = Duration::from_secs(10);

/// Maximum time between opening the voice gateway websocket and receiving READY.
pub const READY_DEADLINE: Duration = Duration::from_secs(30);

/// Maximum time allowed for a RESUMED reply when re-establishing a session.
pub const RESUME_DEADLINE: Duration = Duration::from_secs(10);

/// Longest pause between successive reconnection attempts.
pub const RECONNECT_BACKOFF_CAP: Duration = Duration::from_secs(5);

/// Backoff step multiplied by the attempt number, up to [`RECONNECT_BACKOFF_CAP`].
pub const RECONNECT_BACKOFF_STEP: Duration = Duration::from_secs(1);

/// Number of pacing ticks the scheduler may spend buffering before it is
/// forced into playback.
pub const SCHEDULER_BUFFER_TICKS: u8 = 5;
