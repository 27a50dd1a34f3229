/// Discord Voice Gateway Websocket close codes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum CloseCode {
    /// Invalid Voice OP Code.
    UnknownOpcode = 4001,

    /// Invalid identification payload sent.
    InvalidPayload = 4002,

    /// A payload was sent prior to identifying.
    NotAuthenticated = 4003,

    /// The account token sent with the identify payload was incorrect.
    AuthenticationFailed = 4004,

    /// More than one identify payload was sent.
    AlreadyAuthenticated = 4005,

    /// The session is no longer valid.
    SessionInvalid = 4006,

    /// A session timed out.
    SessionTimeout = 4009,

    /// The server for the last connection attempt could not be found.
    ServerNotFound = 4011,

    /// Discord did not recognise the voice protocol chosen.
    UnknownProtocol = 4012,

    /// Disconnected, either due to channel closure/removal
    /// or kicking.
    ///
    /// Should not reconnect.
    Disconnected = 4014,

    /// Connected voice server crashed.
    ///
    /// Should resume.
    VoiceServerCrash = 4015,

    /// Discord didn't recognise the encryption scheme.
    UnknownEncryptionMode = 4016,
}

impl CloseCode {
    /// Converts a raw websocket close code into a known voice close code.
    pub fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            4001 => CloseCode::UnknownOpcode,
            4002 => CloseCode::InvalidPayload,
            4003 => CloseCode::NotAuthenticated,
            4004 => CloseCode::AuthenticationFailed,
            4005 => CloseCode::AlreadyAuthenticated,
            4006 => CloseCode::SessionInvalid,
            4009 => CloseCode::SessionTimeout,
            4011 => CloseCode::ServerNotFound,
            4012 => CloseCode::UnknownProtocol,
            4014 => CloseCode::Disconnected,
            4015 => CloseCode::VoiceServerCrash,
            4016 => CloseCode::UnknownEncryptionMode,
            _ => return None,
        })
    }

    /// Indicates whether a voice client should attempt to resume in response
    /// to this close code.
    pub fn should_resume(&self) -> bool {
        matches!(self, CloseCode::VoiceServerCrash | CloseCode::SessionTimeout)
    }

    /// Indicates whether this close code ends the session beyond recovery.
    ///
    /// Authentication failures, invalidated sessions, kicks, and encryption
    /// mismatches all require a fresh handshake (or none at all) rather than
    /// a resume.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CloseCode::AuthenticationFailed
                | CloseCode::SessionInvalid
                | CloseCode::Disconnected
                | CloseCode::UnknownEncryptionMode
        )
    }
}
