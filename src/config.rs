use crate::crypto::CryptoMode;

/// What the audio scheduler does when its subscriber set becomes empty.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum EmptyBehavior {
    /// Suspend pacing until a subscriber returns.
    #[default]
    Pause,
    /// Keep pulling frames from the producer, discarding them.
    ///
    /// Useful for multi-consumer mixers that must keep their clock running.
    Play,
    /// Return to idle, with the usual silence tail.
    Stop,
}

/// Configuration for a voice connection supervisor and its audio scheduler.
#[derive(Clone, Debug)]
pub struct Config {
    /// Whether lost sessions are re-established automatically.
    ///
    /// Defaults to `true`.
    pub auto_reconnect: bool,
    /// Ceiling on consecutive reconnection attempts before the supervisor
    /// destroys itself. Clamped to `0..=32`.
    ///
    /// Defaults to `5`.
    pub max_reconnect_attempts: u8,
    /// Encryption modes in descending order of preference.
    ///
    /// Defaults to `lite > suffix > xsalsa20_poly1305`.
    pub preferred_modes: Vec<CryptoMode>,
    /// Missed heartbeat ACKs tolerated before the gateway is declared stale.
    ///
    /// Defaults to `2`: the third consecutive miss is fatal.
    pub heartbeat_grace: u8,
    /// Consecutive empty producer pulls tolerated by the scheduler before it
    /// pauses playback.
    ///
    /// Defaults to `5`.
    pub max_missed_frames: u8,
    /// Scheduler behaviour when no connection is subscribed.
    pub behavior_on_empty: EmptyBehavior,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            max_reconnect_attempts: 5,
            preferred_modes: vec![CryptoMode::Lite, CryptoMode::Suffix, CryptoMode::Normal],
            heartbeat_grace: 2,
            max_missed_frames: 5,
            behavior_on_empty: EmptyBehavior::default(),
        }
    }
}

impl Config {
    pub fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u8) -> Self {
        self.max_reconnect_attempts = attempts.min(32);
        self
    }

    pub fn with_preferred_modes(mut self, modes: Vec<CryptoMode>) -> Self {
        self.preferred_modes = modes;
        self
    }

    pub fn with_heartbeat_grace(mut self, grace: u8) -> Self {
        self.heartbeat_grace = grace;
        self
    }

    pub fn with_max_missed_frames(mut self, frames: u8) -> Self {
        self.max_missed_frames = frames;
        self
    }

    pub fn with_behavior_on_empty(mut self, behavior: EmptyBehavior) -> Self {
        self.behavior_on_empty = behavior;
        self
    }
}
