//! Registration channel.
//!
//! Registrars publish one ZeroMQ message per registration. The station binds
//! a SUB socket, subscribes to every topic and exposes the messages as a
//! stream of byte buffers for the ingest loop.

use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zeromq::{Socket, SocketRecv, SubSocket};

use crate::error::{constants, Result, StationError};

/// Bound, subscribed SUB socket
pub struct RegistrationSubscriber {
    socket: SubSocket,
    endpoint: String,
}

impl RegistrationSubscriber {
    /// Bind to `endpoint` and subscribe to all topics.
    ///
    /// # Errors
    /// `PubSub` if the endpoint cannot be bound or the subscription fails.
    /// Either is fatal at startup.
    pub async fn bind(endpoint: &str) -> Result<Self> {
        let mut socket = SubSocket::new();
        let bound = socket.bind(endpoint).await.map_err(|e| {
            StationError::PubSub(format!("{} {endpoint}: {e}", constants::ERR_PUBSUB_BIND))
        })?;
        socket
            .subscribe("")
            .await
            .map_err(|e| StationError::PubSub(format!("{}: {e}", constants::ERR_PUBSUB_SUBSCRIBE)))?;

        info!(endpoint = %bound, "Listening for registrations");
        Ok(Self {
            socket,
            endpoint: bound.to_string(),
        })
    }

    /// Endpoint actually bound, with any wildcard port resolved
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Spawn the socket reader and return the receiving side as a stream.
    ///
    /// The reader stops when `cancel` fires or the stream is dropped.
    pub fn into_stream(self, capacity: usize, cancel: CancellationToken) -> ReceiverStream<Bytes> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(read_loop(self.socket, tx, cancel));
        ReceiverStream::new(rx)
    }
}

async fn read_loop(mut socket: SubSocket, tx: mpsc::Sender<Bytes>, cancel: CancellationToken) {
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = socket.recv() => received,
        };

        match received {
            Ok(msg) => {
                let buf = join_frames(msg.into_vec());
                if tx.send(buf).await.is_err() {
                    debug!("Registration stream dropped, stopping reader");
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "Error reading from registration socket");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
    debug!("Registration socket reader stopped");
}

/// Concatenate the frames of one multipart message.
pub fn join_frames(frames: Vec<Bytes>) -> Bytes {
    match frames.len() {
        0 => Bytes::new(),
        1 => frames.into_iter().next().unwrap_or_default(),
        _ => {
            let total = frames.iter().map(Bytes::len).sum();
            let mut buf = BytesMut::with_capacity(total);
            for frame in frames {
                buf.extend_from_slice(&frame);
            }
            buf.freeze()
        }
    }
}
