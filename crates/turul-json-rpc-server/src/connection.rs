//! One accepted client socket and its framing state.

use std::io;
use std::net::SocketAddr;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::buffer::ReceiveBuffer;
use crate::diagnostics::ErrorRecord;
use crate::dispatch::Dispatcher;
use crate::error::JsonRpcError;
use crate::framing::{Frame, next_frame};
use crate::response::JsonRpcMessage;

/// Whether the connection survives a readiness event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closed,
}

/// Per-connection resource bounds, taken from the server configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    pub initial_buffer_capacity: usize,
    pub max_buffer_capacity: usize,
    pub max_nesting_depth: usize,
}

pub struct Connection {
    id: u64,
    peer: SocketAddr,
    stream: TcpStream,
    buffer: ReceiveBuffer,
    limits: ConnectionLimits,
}

impl Connection {
    pub fn new(id: u64, stream: TcpStream, peer: SocketAddr, limits: ConnectionLimits) -> Self {
        Self {
            id,
            peer,
            stream,
            buffer: ReceiveBuffer::with_capacity(limits.initial_buffer_capacity),
            limits,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Wait until the socket may have bytes to read
    pub async fn readable(&self) -> io::Result<()> {
        self.stream.readable().await
    }

    /// Read what the socket has, then frame and answer every complete
    /// request now buffered.
    pub async fn on_readable(&mut self, dispatcher: &Dispatcher) -> ConnectionState {
        if self.buffer.is_full() {
            if let Err(record) = self.grow_buffer() {
                warn!("Connection {} ({}): {}", self.id, self.peer, record.message);
                dispatcher.server().record_error(record);
                return ConnectionState::Closed;
            }
        }

        match self.stream.try_read(self.buffer.spare_mut()) {
            Ok(0) => {
                debug!("Connection {} ({}) reached EOF", self.id, self.peer);
                return ConnectionState::Closed;
            }
            Ok(n) => self.buffer.advance(n),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                return ConnectionState::Open;
            }
            Err(err) => {
                warn!("Read error on connection {} ({}): {}", self.id, self.peer, err);
                dispatcher.server().record_error(ErrorRecord::from_io(
                    "read",
                    &err,
                ));
                return ConnectionState::Closed;
            }
        }

        self.process_buffered(dispatcher).await
    }

    async fn process_buffered(&mut self, dispatcher: &Dispatcher) -> ConnectionState {
        loop {
            match next_frame(self.buffer.filled(), self.limits.max_nesting_depth) {
                Frame::Message { value, consumed } => {
                    let response = dispatcher.handle_value(value).await;
                    self.buffer.consume_prefix(consumed);
                    if let Some(response) = response {
                        if let Err(err) = self.send(&response).await {
                            warn!("Write error on connection {} ({}): {}", self.id, self.peer, err);
                            dispatcher
                                .server()
                                .record_error(ErrorRecord::from_io("write", &err));
                            return ConnectionState::Closed;
                        }
                    }
                }
                Frame::Blank { consumed } => {
                    self.buffer.consume_prefix(consumed);
                    return ConnectionState::Open;
                }
                Frame::Incomplete => return ConnectionState::Open,
                Frame::Malformed(err) => {
                    debug!("Connection {} sent malformed JSON: {}", self.id, err);
                    dispatcher
                        .server()
                        .record_error(ErrorRecord::new(-1, "parse", err.to_string()));
                    let response = JsonRpcMessage::error(JsonRpcError::parse_error());
                    if let Err(err) = self.send(&response).await {
                        debug!("Could not deliver parse error to {}: {}", self.peer, err);
                    }
                    return ConnectionState::Closed;
                }
            }
        }
    }

    fn grow_buffer(&mut self) -> Result<(), ErrorRecord> {
        let target = self.buffer.capacity().saturating_mul(2);
        if target > self.limits.max_buffer_capacity {
            return Err(ErrorRecord::new(
                -1,
                "realloc",
                format!(
                    "message exceeds the maximum buffer capacity of {} bytes",
                    self.limits.max_buffer_capacity
                ),
            ));
        }
        self.buffer
            .grow()
            .map_err(|err| ErrorRecord::new(-1, "realloc", format!("Memory error: {}", err)))
    }

    async fn send(&mut self, message: &JsonRpcMessage) -> io::Result<()> {
        let line = message.to_line();
        self.stream.write_all(&line).await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("buffered", &self.buffer.len())
            .field("capacity", &self.buffer.capacity())
            .finish()
    }
}
