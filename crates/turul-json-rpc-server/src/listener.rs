//! Listening socket bootstrap.

use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpSocket, lookup_host};
use tracing::{debug, info};

use crate::error::ServerError;

/// Resolve `host:port` and listen on the first address that binds.
///
/// Socket creation and option failures abort immediately; bind failures
/// move on to the next resolved address.
pub async fn bind_listener(host: &str, port: u16, backlog: u32) -> Result<TcpListener, ServerError> {
    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|source| ServerError::Resolve {
            host: host.to_string(),
            port,
            source,
        })?
        .collect();
    if addrs.is_empty() {
        return Err(ServerError::ResolveEmpty {
            host: host.to_string(),
            port,
        });
    }

    let mut last_error = None;
    for addr in addrs {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(|source| ServerError::Socket { addr, source })?;
        socket
            .set_reuseaddr(true)
            .map_err(|source| ServerError::SocketOption { addr, source })?;

        if let Err(err) = socket.bind(addr) {
            debug!("Could not bind {}: {}", addr, err);
            last_error = Some(err);
            continue;
        }

        let listener = socket
            .listen(backlog)
            .map_err(|source| ServerError::Listen { addr, source })?;
        info!("JSON-RPC server listening on {}", addr);
        return Ok(listener);
    }

    Err(ServerError::Bind {
        host: host.to_string(),
        port,
        source: last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "no address could be bound")
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let listener = bind_listener("127.0.0.1", 0, 5).await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_port_in_use_is_a_bind_error() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let err = bind_listener("127.0.0.1", port, 5).await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }), "got {err:?}");
        assert_eq!(err.cause(), "bind");
    }

    #[tokio::test]
    async fn test_unresolvable_host() {
        let err = bind_listener("host.invalid", 1234, 5).await.unwrap_err();
        assert!(
            matches!(err, ServerError::Resolve { .. } | ServerError::ResolveEmpty { .. }),
            "got {err:?}"
        );
        assert_eq!(err.cause(), "getaddrinfo");
    }
}
