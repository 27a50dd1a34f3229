//! Connection and supervision errors, and their mapping onto the coarse
//! taxonomy surfaced to observers.

use std::error::Error as StdError;
use std::fmt;
use std::io::Error as IoError;

use serde_json::Error as JsonError;

use crate::ws;

/// Phase of connection establishment in which a hard deadline expired.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum TimeoutStage {
    /// The paired voice server/state updates never arrived on the main gateway.
    VoiceInfo,
    /// The voice server did not answer the IP discovery probe.
    IpDiscovery,
    /// The voice gateway did not produce READY after the websocket opened.
    Ready,
    /// The voice gateway did not confirm a session resume.
    Resume,
}

/// Coarse classification of failures, as exposed through
/// [`SupervisorEvent::Error`].
///
/// [`SupervisorEvent::Error`]: crate::events::SupervisorEvent::Error
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A bounded wait on part of the handshake expired.
    HandshakeTimeout(TimeoutStage),
    /// The voice gateway closed with a non-resumable code.
    GatewayFatal(u16),
    /// Heartbeats on the voice gateway stopped being acknowledged.
    GatewayStale,
    /// UDP keepalives stopped being answered.
    TransportStale,
    /// Missing or rejected AEAD material.
    CryptoFailure,
    /// The remote sent a frame this library cannot accept.
    ProtocolViolation,
    /// The caller used the API out of order, or after destruction.
    CallerMisuse,
    /// A recoverable send/transport hiccup; logged and counted, never fatal.
    Transient,
}

/// Errors encountered while joining, driving, or supervising a voice
/// connection.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Server did not confirm the crypto mode selected during negotiation.
    CryptoModeInvalid,
    /// No offered crypto mode was usable.
    CryptoModeUnavailable,
    /// Session description carried a secret key of the wrong length.
    KeyLength(usize),
    /// An indicator that an endpoint URL was invalid.
    EndpointUrl,
    /// The voice gateway handshake protocol was violated.
    ExpectedHandshake,
    /// Discord failed to correctly respond to IP discovery.
    IllegalDiscoveryResponse,
    /// Could not parse Discord's view of our IP.
    IllegalIp,
    /// Miscellaneous I/O error.
    Io(IoError),
    /// JSON (de)serialization error.
    Json(JsonError),
    /// Error communicating with the voice gateway over WebSocket.
    Ws(ws::Error),
    /// The voice gateway closed with a non-resumable code.
    GatewayFatal(u16),
    /// Heartbeats on the voice gateway went unacknowledged.
    GatewayStale,
    /// UDP keepalives went unanswered.
    TransportStale,
    /// A hard deadline on part of the handshake expired.
    Timeout(TimeoutStage),
    /// Failed to message another background task.
    InterconnectFailure(Recipient),
    /// The main-gateway adapter refused to deliver a payload.
    AdapterUnavailable,
    /// Operation issued against a destroyed supervisor.
    Destroyed,
    /// `connect` issued while not in the `Disconnected` state.
    AlreadyConnected,
    /// `connect` issued without a target channel.
    MissingChannel,
    /// An in-flight operation was cancelled by `disconnect` or `destroy`.
    Cancelled,
    /// Reconnection attempts were exhausted.
    AttemptsExhausted,
}

/// Background task which could not be reached over its mailbox.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Recipient {
    AuxNetwork,
    Event,
    UdpRx,
    UdpTx,
}

impl Error {
    /// Maps this error onto the coarse taxonomy used for observer events.
    pub fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            CryptoModeInvalid | CryptoModeUnavailable | KeyLength(_) => ErrorKind::CryptoFailure,
            EndpointUrl | ExpectedHandshake | IllegalDiscoveryResponse | IllegalIp | Json(_) =>
                ErrorKind::ProtocolViolation,
            GatewayFatal(code) => ErrorKind::GatewayFatal(*code),
            GatewayStale => ErrorKind::GatewayStale,
            TransportStale => ErrorKind::TransportStale,
            Timeout(stage) => ErrorKind::HandshakeTimeout(*stage),
            Destroyed | AlreadyConnected | MissingChannel | Cancelled => ErrorKind::CallerMisuse,
            Io(_) | Ws(_) | InterconnectFailure(_) | AdapterUnavailable | AttemptsExhausted =>
                ErrorKind::Transient,
        }
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Error {
        Error::Io(e)
    }
}

impl From<JsonError> for Error {
    fn from(e: JsonError) -> Error {
        Error::Json(e)
    }
}

impl From<ws::Error> for Error {
    fn from(e: ws::Error) -> Error {
        Error::Ws(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to connect to Discord RTP server: ")?;
        use Error::*;
        match self {
            CryptoModeInvalid => write!(f, "server changed negotiated encryption mode."),
            CryptoModeUnavailable => write!(f, "server did not offer a usable encryption mode."),
            KeyLength(n) => write!(f, "server sent a secret key of {} bytes.", n),
            EndpointUrl => write!(f, "endpoint URL received from gateway was invalid."),
            ExpectedHandshake => write!(f, "voice initialisation protocol was violated."),
            IllegalDiscoveryResponse =>
                write!(f, "IP discovery/NAT punching response was invalid."),
            IllegalIp => write!(f, "IP discovery/NAT punching response had bad IP value."),
            Io(i) => write!(f, "I/O failure ({}).", i),
            Json(j) => write!(f, "JSON (de)serialization issue ({}).", j),
            Ws(w) => write!(f, "websocket issue ({:?}).", w),
            GatewayFatal(code) => write!(f, "voice gateway closed with fatal code {}.", code),
            GatewayStale => write!(f, "voice gateway heartbeats went unacknowledged."),
            TransportStale => write!(f, "UDP keepalives went unanswered."),
            Timeout(stage) => write!(f, "handshake deadline expired during {:?}.", stage),
            InterconnectFailure(r) => write!(f, "failed to contact other task ({:?}).", r),
            AdapterUnavailable => write!(f, "main gateway adapter refused delivery."),
            Destroyed => write!(f, "supervisor has been destroyed."),
            AlreadyConnected => write!(f, "connect issued while already connected."),
            MissingChannel => write!(f, "connect issued without a target channel."),
            Cancelled => write!(f, "operation cancelled by disconnect."),
            AttemptsExhausted => write!(f, "reconnection attempts exhausted."),
        }
    }
}

impl StdError for Error {}

/// Convenience type for voice connection error handling.
pub type Result<T> = std::result::Result<T, Error>;
