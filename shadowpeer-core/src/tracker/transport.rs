//! Raw TCP transport for announce requests
//!
//! One connection per announce: connect, write a hand-built HTTP/1.1 GET,
//! read until the tracker closes the socket, drop the socket.

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout, timeout_at};

use super::AnnounceError;
use crate::config::NetworkConfig;

const READ_CHUNK_SIZE: usize = 4096;

/// Sends an announce request target to a tracker and returns the raw reply.
#[async_trait]
pub trait AnnounceTransport: Send + Sync {
    /// Performs one request/response exchange.
    ///
    /// # Errors
    ///
    /// - `AnnounceError::ConnectTimeout` / `AnnounceError::Connect` - Tracker unreachable
    /// - `AnnounceError::ReadTimeout` - Nothing received before the read deadline
    /// - `AnnounceError::ResponseTooLarge` - Reply exceeds the configured cap
    /// - `AnnounceError::Io` - Socket failure mid-exchange
    async fn send_announce(
        &self,
        host: &str,
        port: u16,
        request_target: &str,
        user_agent: &str,
    ) -> Result<Vec<u8>, AnnounceError>;
}

/// Plain-text HTTP/1.1 over a fresh TCP connection per announce.
#[derive(Debug, Clone)]
pub struct TcpAnnounceTransport {
    connect_timeout: Duration,
    read_timeout: Duration,
    max_response_bytes: usize,
}

impl TcpAnnounceTransport {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
            max_response_bytes: config.max_response_bytes,
        }
    }
}

#[async_trait]
impl AnnounceTransport for TcpAnnounceTransport {
    async fn send_announce(
        &self,
        host: &str,
        port: u16,
        request_target: &str,
        user_agent: &str,
    ) -> Result<Vec<u8>, AnnounceError> {
        let address = format!("{host}:{port}");
        tracing::debug!("Connecting to tracker {}", address);

        // The connect future owns the socket, so expiry drops it
        let mut stream = match timeout(self.connect_timeout, TcpStream::connect((host, port))).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(AnnounceError::Connect { address, source }),
            Err(_) => {
                return Err(AnnounceError::ConnectTimeout {
                    address,
                    timeout: self.connect_timeout,
                });
            }
        };

        let request = format_http_request(host, request_target, user_agent);
        tracing::trace!("Announce request:\n{}", request);

        exchange(
            &mut stream,
            request.as_bytes(),
            &address,
            self.read_timeout,
            self.max_response_bytes,
        )
        .await
    }
}

/// Renders the GET request sent to the tracker.
pub fn format_http_request(host: &str, request_target: &str, user_agent: &str) -> String {
    format!(
        "GET {request_target} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Connection: close\r\n\
         User-Agent: {user_agent}\r\n\
         Accept: */*\r\n\
         \r\n"
    )
}

/// Writes `request` and reads the reply until EOF, the read deadline or the size cap.
///
/// Bytes received before the deadline are returned as a partial reply.
async fn exchange<S>(
    stream: &mut S,
    request: &[u8],
    address: &str,
    read_timeout: Duration,
    max_response_bytes: usize,
) -> Result<Vec<u8>, AnnounceError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(request).await?;
    stream.flush().await?;

    let deadline = Instant::now() + read_timeout;
    let mut buffer = BytesMut::with_capacity(READ_CHUNK_SIZE);

    loop {
        if buffer.len() > max_response_bytes {
            return Err(AnnounceError::ResponseTooLarge {
                limit: max_response_bytes,
            });
        }
        buffer.reserve(READ_CHUNK_SIZE);

        match timeout_at(deadline, stream.read_buf(&mut buffer)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(_)) => continue,
            Ok(Err(e)) => return Err(AnnounceError::Io(e)),
            Err(_) if buffer.is_empty() => {
                return Err(AnnounceError::ReadTimeout {
                    address: address.to_string(),
                    timeout: read_timeout,
                });
            }
            Err(_) => {
                tracing::warn!(
                    "Read from {} timed out after {} bytes, using partial response",
                    address,
                    buffer.len()
                );
                break;
            }
        }
    }

    tracing::debug!("Received {} bytes from {}", buffer.len(), address);
    Ok(buffer.to_vec())
}
