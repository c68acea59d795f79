use std::future::Future;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::auth::AuthError;
use super::client::Generation;
use super::codec::ProtocolError;

#[derive(Debug, thiserror::Error)]
pub enum FieldControlError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Stream error: {0}")]
    Transport(String),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("{operation} is not supported by the {generation} protocol")]
    Unsupported {
        operation: &'static str,
        generation: Generation,
    },
    #[error("Connection closed")]
    Closed,
    #[error("Engine stopped")]
    EngineStopped,
}

/// A payload frame on the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// Lifecycle of the stream owned by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Authenticating,
    Connecting,
    Open,
}

/// A bidirectional frame stream to the server.
pub trait Transport: Send {
    fn send(&mut self, frame: Frame) -> impl Future<Output = Result<(), FieldControlError>> + Send;

    /// Next payload frame. `None` once the server has closed the stream.
    fn recv(&mut self) -> impl Future<Output = Option<Result<Frame, FieldControlError>>> + Send;

    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Websocket connection to the server.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTransport {
    /// Open a websocket at `url` with extra request headers.
    pub async fn connect(
        url: &str,
        headers: &[(&'static str, String)],
    ) -> Result<Self, FieldControlError> {
        tracing::info!("Connecting to {}", url);
        let mut request = url
            .into_client_request()
            .map_err(|e| FieldControlError::Connect(e.to_string()))?;
        for (name, value) in headers {
            let value = HeaderValue::from_str(value)
                .map_err(|e| FieldControlError::Connect(format!("bad {} header: {}", name, e)))?;
            request.headers_mut().insert(*name, value);
        }

        let (stream, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| FieldControlError::Connect(e.to_string()))?;
        tracing::debug!("Websocket upgrade status {}", response.status());
        Ok(Self { stream })
    }
}

impl Transport for WsTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), FieldControlError> {
        let msg = match frame {
            Frame::Text(text) => {
                tracing::debug!("→ {}", text);
                Message::Text(text)
            }
            Frame::Binary(bytes) => {
                tracing::debug!("→ {} bytes", bytes.len());
                Message::Binary(bytes)
            }
        };
        self.stream
            .send(msg)
            .await
            .map_err(|e| FieldControlError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<Frame, FieldControlError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text))),
                Ok(Message::Binary(bytes)) => return Some(Ok(Frame::Binary(bytes))),
                Ok(Message::Close(reason)) => {
                    tracing::info!("Server closed stream: {:?}", reason);
                    return None;
                }
                // Ping replies are queued by tungstenite itself.
                Ok(_) => continue,
                Err(e) => return Some(Err(FieldControlError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!("Close handshake failed: {}", e);
        }
    }
}

/// Opens transports; swapped out for in-memory streams in tests.
pub trait Dialer: Send {
    type Transport: Transport + 'static;

    fn dial(
        &mut self,
        url: &str,
        headers: &[(&'static str, String)],
    ) -> impl Future<Output = Result<Self::Transport, FieldControlError>> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WsDialer;

impl Dialer for WsDialer {
    type Transport = WsTransport;

    async fn dial(
        &mut self,
        url: &str,
        headers: &[(&'static str, String)],
    ) -> Result<WsTransport, FieldControlError> {
        WsTransport::connect(url, headers).await
    }
}
