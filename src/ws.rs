//! Thin typed layer over the voice gateway websocket.

use async_trait::async_trait;
use async_tungstenite::tokio::{connect_async, ConnectStream};
use async_tungstenite::tungstenite::Error as TungsteniteError;
use async_tungstenite::tungstenite::Message;
use async_tungstenite::WebSocketStream;
use futures::{SinkExt, StreamExt};
use serde_json::Error as JsonError;
use tracing::warn;
use url::Url;

use crate::model::Event;

pub(crate) type WsStream = WebSocketStream<ConnectStream>;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the websocket transport layer.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// An event failed to (de)serialize.
    Json(JsonError),
    /// Transport-level websocket failure.
    Ws(TungsteniteError),
    /// The peer closed the stream, with the given close code if any.
    Closed(Option<u16>),
}

impl From<JsonError> for Error {
    fn from(e: JsonError) -> Error {
        Error::Json(e)
    }
}

impl From<TungsteniteError> for Error {
    fn from(e: TungsteniteError) -> Error {
        Error::Ws(e)
    }
}

#[async_trait]
pub(crate) trait ReceiverExt {
    async fn recv_json(&mut self) -> Result<Option<Event>>;
}

#[async_trait]
pub(crate) trait SenderExt {
    async fn send_json(&mut self, value: &Event) -> Result<()>;
}

#[async_trait]
impl ReceiverExt for WsStream {
    async fn recv_json(&mut self) -> Result<Option<Event>> {
        let message = match self.next().await {
            Some(Ok(m)) => m,
            Some(Err(e)) => return Err(e.into()),
            None => return Err(Error::Closed(None)),
        };

        convert_ws_message(message)
    }
}

#[async_trait]
impl SenderExt for WsStream {
    async fn send_json(&mut self, value: &Event) -> Result<()> {
        let body = serde_json::to_string(value)?;
        self.send(Message::Text(body)).await?;

        Ok(())
    }
}

#[inline]
pub(crate) fn convert_ws_message(message: Message) -> Result<Option<Event>> {
    Ok(match message {
        Message::Text(payload) => serde_json::from_str(&payload).map(Some).map_err(|why| {
            warn!("Err deserializing text: {:?}; text: {}", why, payload);

            why
        })?,
        Message::Close(frame) => {
            return Err(Error::Closed(frame.map(|f| f.code.into())));
        },
        // Ping/Pong message behaviour is internally handled by tungstenite.
        _ => None,
    })
}

pub(crate) async fn create_client(url: Url) -> Result<WsStream> {
    let (stream, _) = connect_async(url.as_str()).await?;

    Ok(stream)
}
