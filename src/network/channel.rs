//! Length-prefixed framing over a `tokio::net::TcpStream` for
//! [`WireMessage`] frames (spec §4.5).

use super::wire::WireMessage;
use crate::error::{EngineError, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// One established connection, either accepted by a [`super::source::NetworkSource`]
/// listener or opened by a [`super::sink::NetworkSink`] connector.
pub struct Channel {
    stream: TcpStream,
}

impl Channel {
    pub fn new(stream: TcpStream) -> Self {
        let _ = stream.set_nodelay(true);
        Self { stream }
    }

    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::new(stream))
    }

    pub async fn send(&mut self, message: &WireMessage) -> Result<()> {
        let body = message.encode();
        let len = u32::try_from(body.len()).map_err(|_| EngineError::Serialization("frame too large".to_string()))?;
        self.stream.write_all(&len.to_le_bytes()).await?;
        self.stream.write_all(&body).await?;
        Ok(())
    }

    pub async fn recv(&mut self) -> Result<WireMessage> {
        let mut len_bytes = [0u8; 4];
        self.stream.read_exact(&mut len_bytes).await?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        let mut body = vec![0u8; len];
        self.stream.read_exact(&mut body).await?;
        WireMessage::decode(&body)
    }
}
