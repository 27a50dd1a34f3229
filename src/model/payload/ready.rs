use serde::{Deserialize, Serialize};

/// RTP server's connection offer and supported encryption modes.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Ready {
    /// Address of the call's allocated RTP server.
    ///
    /// Usually an IP literal, but hostnames are tolerated and resolved at
    /// socket setup.
    pub ip: String,
    /// Set of voice encryption modes offered by the server.
    pub modes: Vec<String>,
    /// Destination port on the call's allocated RTP server.
    pub port: u16,
    /// RTP synchronisation source assigned by the server to the client.
    pub ssrc: u32,
}
