//! Single-task event loop over the listening socket and every connection.
//!
//! Each watched handle is armed as a future that owns the handle and
//! resolves once the handle is ready. The server takes the handle back
//! with the [`Readiness`] event, handles it inline, and re-arms it if it
//! is still live. Nothing is spawned, so handlers never run concurrently.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::net::{TcpListener, TcpStream};

use crate::connection::Connection;

/// A pollable handle, tagged with what to do when it becomes ready
pub enum Watcher {
    /// Accept new clients
    Listener(TcpListener),
    /// Accept new clients once the delay has passed
    DelayedListener(TcpListener, Duration),
    /// Read and frame requests from one client
    Connection(Connection),
}

/// A handle that became ready, returned to the loop with its outcome
pub enum Readiness {
    Accept {
        listener: TcpListener,
        result: io::Result<(TcpStream, SocketAddr)>,
    },
    Readable {
        connection: Connection,
        result: io::Result<()>,
    },
}

impl Watcher {
    fn arm(self) -> BoxFuture<'static, Readiness> {
        match self {
            Watcher::Listener(listener) => async move {
                let result = listener.accept().await;
                Readiness::Accept { listener, result }
            }
            .boxed(),
            Watcher::DelayedListener(listener, delay) => async move {
                tokio::time::sleep(delay).await;
                let result = listener.accept().await;
                Readiness::Accept { listener, result }
            }
            .boxed(),
            Watcher::Connection(connection) => async move {
                let result = connection.readable().await;
                Readiness::Readable { connection, result }
            }
            .boxed(),
        }
    }
}

#[derive(Default)]
pub struct Reactor {
    armed: FuturesUnordered<BoxFuture<'static, Readiness>>,
}

impl Reactor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch(&mut self, watcher: Watcher) {
        self.armed.push(watcher.arm());
    }

    /// Wait for the next ready handle; `None` once nothing is watched
    pub async fn next(&mut self) -> Option<Readiness> {
        self.armed.next().await
    }

    /// Number of watched handles, the listener included
    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionLimits;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_listener_and_connection_readiness() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut reactor = Reactor::new();
        reactor.watch(Watcher::Listener(listener));
        assert_eq!(reactor.len(), 1);

        let mut client = TcpStream::connect(addr).await.unwrap();
        let (listener, stream, peer) = match reactor.next().await {
            Some(Readiness::Accept { listener, result }) => {
                let (stream, peer) = result.unwrap();
                (listener, stream, peer)
            }
            _ => panic!("expected an accept event"),
        };
        assert!(reactor.is_empty());

        reactor.watch(Watcher::Listener(listener));
        let limits = ConnectionLimits {
            initial_buffer_capacity: 64,
            max_buffer_capacity: 1024,
            max_nesting_depth: 32,
        };
        reactor.watch(Watcher::Connection(Connection::new(1, stream, peer, limits)));
        client.write_all(b"{}").await.unwrap();

        match reactor.next().await {
            Some(Readiness::Readable { connection, result }) => {
                result.unwrap();
                assert_eq!(connection.id(), 1);
            }
            _ => panic!("expected a readable event"),
        }
        assert_eq!(reactor.len(), 1);
    }

    #[tokio::test]
    async fn test_delayed_listener_waits_before_accepting() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let delay = Duration::from_millis(100);
        let mut reactor = Reactor::new();

        let started = std::time::Instant::now();
        reactor.watch(Watcher::DelayedListener(listener, delay));
        let _client = TcpStream::connect(addr).await.unwrap();

        match reactor.next().await {
            Some(Readiness::Accept { result, .. }) => {
                result.unwrap();
            }
            _ => panic!("expected an accept event"),
        }
        assert!(started.elapsed() >= delay);
    }
}
