//! Server lifecycle: bind, run, stop, destroy.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Runtime;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionLimits, ConnectionState};
use crate::diagnostics::{ErrorRecord, ErrorSlot};
use crate::dispatch::Dispatcher;
use crate::error::{RegistryError, ServerError};
use crate::framing::DEFAULT_MAX_NESTING_DEPTH;
use crate::listener::bind_listener;
use crate::procedure::{
    FunctionProcedure, Procedure, ProcedureData, ProcedureRegistry, ProcedureResult,
};
use crate::reactor::{Reactor, Readiness, Watcher};
use crate::request::RequestParams;
use crate::{InvocationContext, Result};

/// Pause before accepting again after a failed accept
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// What to do with a framed top-level value that is not a JSON object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NonObjectPolicy {
    /// Drop it without answering
    #[default]
    Ignore,
    /// Answer with an Invalid Request error carrying a null id
    Reject,
}

/// Configuration for the JSON-RPC server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host name or address to resolve and bind
    pub hostname: String,
    pub port: u16,
    /// Pending-connection queue length passed to `listen`
    pub listen_backlog: u32,
    /// Receive buffer size for a new connection, in bytes
    pub initial_buffer_capacity: usize,
    /// Largest a receive buffer may grow; bigger messages close the connection
    pub max_buffer_capacity: usize,
    /// Deepest array/object nesting accepted in a message. Values are parsed
    /// recursively, so lower this when serving from a thread with a small stack.
    pub max_nesting_depth: usize,
    pub non_object_messages: NonObjectPolicy,
}

impl ServerConfig {
    pub fn connection_limits(&self) -> ConnectionLimits {
        ConnectionLimits {
            initial_buffer_capacity: self.initial_buffer_capacity,
            max_buffer_capacity: self.max_buffer_capacity,
            max_nesting_depth: self.max_nesting_depth,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".to_string(),
            port: 1234,
            listen_backlog: 5,
            initial_buffer_capacity: 1500,
            max_buffer_capacity: 16 * 1024 * 1024, // 16MB
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            non_object_messages: NonObjectPolicy::Ignore,
        }
    }
}

/// Lifecycle phase of a bound server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Bound,
    Running,
    Stopped,
}

/// Cloneable capability to control a server from procedures or other threads
#[derive(Clone)]
pub struct ServerHandle {
    registry: Arc<RwLock<ProcedureRegistry>>,
    stop_tx: Arc<watch::Sender<bool>>,
    state: Arc<Mutex<ServerState>>,
    errors: ErrorSlot,
    local_addr: Option<SocketAddr>,
}

impl ServerHandle {
    fn new(local_addr: Option<SocketAddr>) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            registry: Arc::new(RwLock::new(ProcedureRegistry::new())),
            stop_tx: Arc::new(stop_tx),
            state: Arc::new(Mutex::new(ServerState::Bound)),
            errors: ErrorSlot::default(),
            local_addr,
        }
    }

    /// A handle not attached to any socket
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self::new(None)
    }

    /// Ask the event loop to return after the current event.
    ///
    /// Safe to call from inside a procedure and idempotent. A stop requested
    /// while the server is not running ends its next run immediately.
    pub fn stop(&self) {
        if !self.stop_tx.send_replace(true) {
            debug!("Stop requested");
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        *self.stop_tx.borrow()
    }

    pub fn register<P>(
        &self,
        name: impl Into<String>,
        procedure: P,
        data: Option<ProcedureData>,
    ) -> std::result::Result<(), RegistryError>
    where
        P: Procedure + 'static,
    {
        self.registry.write().register(name, procedure, data)
    }

    /// Register a plain closure as a procedure
    pub fn register_fn<F>(
        &self,
        name: impl Into<String>,
        handler_fn: F,
    ) -> std::result::Result<(), RegistryError>
    where
        F: Fn(&InvocationContext, RequestParams) -> ProcedureResult + Send + Sync + 'static,
    {
        self.register(name, FunctionProcedure::new(handler_fn), None)
    }

    pub fn deregister(&self, name: &str) -> std::result::Result<(), RegistryError> {
        let outcome = self.registry.write().deregister(name);
        if let Err(err) = &outcome {
            self.record_error(ErrorRecord::new(-1, "deregister", err.to_string()));
        }
        outcome
    }

    /// Registered procedure names in registration order
    pub fn procedure_names(&self) -> Vec<String> {
        self.registry.read().names()
    }

    pub fn state(&self) -> ServerState {
        *self.state.lock()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// The most recent internal failure, if any
    pub fn last_error(&self) -> Option<ErrorRecord> {
        self.errors.get()
    }

    pub fn clear_error(&self) {
        self.errors.clear();
    }

    pub(crate) fn record_error(&self, record: ErrorRecord) {
        self.errors.set(record);
    }

    pub(crate) fn registry(&self) -> &Arc<RwLock<ProcedureRegistry>> {
        &self.registry
    }

    fn set_state(&self, state: ServerState) {
        *self.state.lock() = state;
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("local_addr", &self.local_addr)
            .field("state", &self.state())
            .field("stop_requested", &self.is_stop_requested())
            .finish()
    }
}

/// Builder for [`JsonRpcServer`]
#[derive(Debug, Clone, Default)]
pub struct ServerBuilder {
    config: ServerConfig,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.config.hostname = hostname.into();
        self
    }

    /// Set the port; 0 picks an ephemeral port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn listen_backlog(mut self, backlog: u32) -> Self {
        self.config.listen_backlog = backlog;
        self
    }

    pub fn initial_buffer_capacity(mut self, bytes: usize) -> Self {
        self.config.initial_buffer_capacity = bytes;
        self
    }

    pub fn max_buffer_capacity(mut self, bytes: usize) -> Self {
        self.config.max_buffer_capacity = bytes;
        self
    }

    pub fn max_nesting_depth(mut self, depth: usize) -> Self {
        self.config.max_nesting_depth = depth;
        self
    }

    pub fn non_object_messages(mut self, policy: NonObjectPolicy) -> Self {
        self.config.non_object_messages = policy;
        self
    }

    /// Create the event loop and bind the listening socket
    pub fn build(self) -> Result<JsonRpcServer> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ServerError::Runtime)?;
        let listener = runtime.block_on(bind_listener(
            &self.config.hostname,
            self.config.port,
            self.config.listen_backlog,
        ))?;
        let mut server = JsonRpcServer::from_listener(self.config, listener);
        server.runtime = Some(runtime);
        Ok(server)
    }

    /// Bind inside the caller's tokio runtime; drive the result with
    /// [`JsonRpcServer::serve`]
    pub async fn build_async(self) -> Result<JsonRpcServer> {
        let listener = bind_listener(
            &self.config.hostname,
            self.config.port,
            self.config.listen_backlog,
        )
        .await?;
        Ok(JsonRpcServer::from_listener(self.config, listener))
    }
}

/// A JSON-RPC 2.0 server over raw TCP
pub struct JsonRpcServer {
    // Declared before the runtime so sockets are released first on drop
    reactor: Reactor,
    config: ServerConfig,
    handle: ServerHandle,
    dispatcher: Dispatcher,
    next_connection_id: u64,
    runtime: Option<Runtime>,
}

impl JsonRpcServer {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    fn from_listener(config: ServerConfig, listener: tokio::net::TcpListener) -> Self {
        let handle = ServerHandle::new(listener.local_addr().ok());
        let dispatcher = Dispatcher::new(handle.clone(), config.non_object_messages);
        let mut reactor = Reactor::new();
        reactor.watch(Watcher::Listener(listener));
        Self {
            reactor,
            config,
            handle,
            dispatcher,
            next_connection_id: 0,
            runtime: None,
        }
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.handle.local_addr()
    }

    pub fn state(&self) -> ServerState {
        self.handle.state()
    }

    pub fn register<P>(
        &self,
        name: impl Into<String>,
        procedure: P,
        data: Option<ProcedureData>,
    ) -> std::result::Result<(), RegistryError>
    where
        P: Procedure + 'static,
    {
        self.handle.register(name, procedure, data)
    }

    pub fn register_fn<F>(
        &self,
        name: impl Into<String>,
        handler_fn: F,
    ) -> std::result::Result<(), RegistryError>
    where
        F: Fn(&InvocationContext, RequestParams) -> ProcedureResult + Send + Sync + 'static,
    {
        self.handle.register_fn(name, handler_fn)
    }

    pub fn deregister(&self, name: &str) -> std::result::Result<(), RegistryError> {
        self.handle.deregister(name)
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    pub fn last_error(&self) -> Option<ErrorRecord> {
        self.handle.last_error()
    }

    /// Block the calling thread on the server's own event loop until
    /// [`stop`](Self::stop) is requested
    pub fn run(&mut self) -> Result<()> {
        let runtime = self.runtime.take().ok_or(ServerError::RuntimeNotOwned)?;
        runtime.block_on(self.serve());
        self.runtime = Some(runtime);
        Ok(())
    }

    /// Drive the event loop on the current task until stop is requested.
    ///
    /// The listener and open connections are kept when this returns, so the
    /// server can be run again.
    pub async fn serve(&mut self) {
        let mut stop_rx = self.handle.stop_tx.subscribe();
        self.handle.set_state(ServerState::Running);
        debug!("Event loop started with {} watched handles", self.reactor.len());

        loop {
            tokio::select! {
                biased;
                _ = stop_rx.wait_for(|stop| *stop) => break,
                ready = self.reactor.next() => match ready {
                    Some(ready) => self.on_ready(ready).await,
                    None => {
                        warn!("Nothing left to watch; leaving event loop");
                        break;
                    }
                },
            }
        }

        self.handle.stop_tx.send_replace(false);
        self.handle.set_state(ServerState::Stopped);
        debug!("Event loop stopped");
    }

    async fn on_ready(&mut self, ready: Readiness) {
        match ready {
            Readiness::Accept { listener, result } => {
                match result {
                    Ok((stream, peer)) => {
                        self.next_connection_id += 1;
                        let id = self.next_connection_id;
                        debug!("New connection {} from {}", id, peer);
                        self.reactor.watch(Watcher::Connection(Connection::new(
                            id,
                            stream,
                            peer,
                            self.config.connection_limits(),
                        )));
                    }
                    Err(err) => {
                        // EMFILE and friends persist until a descriptor is freed
                        warn!("Accept failed: {}; retrying in {:?}", err, ACCEPT_BACKOFF);
                        self.handle.record_error(ErrorRecord::from_io("accept", &err));
                        self.reactor
                            .watch(Watcher::DelayedListener(listener, ACCEPT_BACKOFF));
                        return;
                    }
                }
                self.reactor.watch(Watcher::Listener(listener));
            }
            Readiness::Readable {
                mut connection,
                result,
            } => {
                let state = match result {
                    Ok(()) => connection.on_readable(&self.dispatcher).await,
                    Err(err) => {
                        warn!("Readiness error on connection {}: {}", connection.id(), err);
                        self.handle.record_error(ErrorRecord::from_io("read", &err));
                        ConnectionState::Closed
                    }
                };
                match state {
                    ConnectionState::Open => self.reactor.watch(Watcher::Connection(connection)),
                    ConnectionState::Closed => {
                        debug!(
                            "Closing connection {} from {}",
                            connection.id(),
                            connection.peer_addr()
                        );
                    }
                }
            }
        }
    }

    /// Release every procedure and the server itself
    pub fn destroy(self) {
        self.handle.registry.write().clear();
        info!("JSON-RPC server destroyed");
    }
}

impl std::fmt::Debug for JsonRpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcServer")
            .field("config", &self.config)
            .field("handle", &self.handle)
            .field("watched", &self.reactor.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.hostname, "127.0.0.1");
        assert_eq!(config.port, 1234);
        assert_eq!(config.listen_backlog, 5);
        assert_eq!(config.initial_buffer_capacity, 1500);
        assert_eq!(config.max_nesting_depth, 2048);
        assert_eq!(config.non_object_messages, NonObjectPolicy::Ignore);
    }

    #[test]
    fn test_builder_sets_fields() {
        let builder = ServerBuilder::new()
            .hostname("localhost")
            .port(0)
            .listen_backlog(16)
            .initial_buffer_capacity(64)
            .max_buffer_capacity(4096)
            .max_nesting_depth(64)
            .non_object_messages(NonObjectPolicy::Reject);
        assert_eq!(builder.config.hostname, "localhost");
        assert_eq!(builder.config.port, 0);
        assert_eq!(builder.config.listen_backlog, 16);
        assert_eq!(builder.config.initial_buffer_capacity, 64);
        assert_eq!(builder.config.max_buffer_capacity, 4096);
        assert_eq!(
            builder.config.connection_limits(),
            ConnectionLimits {
                initial_buffer_capacity: 64,
                max_buffer_capacity: 4096,
                max_nesting_depth: 64,
            }
        );
        assert_eq!(builder.config.non_object_messages, NonObjectPolicy::Reject);
    }

    #[test]
    fn test_stop_before_run_ends_run_immediately() {
        let mut server = JsonRpcServer::builder().port(0).build().unwrap();
        assert_eq!(server.state(), ServerState::Bound);
        assert!(server.local_addr().is_some());

        server.stop();
        server.stop();
        server.run().unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(!server.handle().is_stop_requested());
    }

    #[test]
    fn test_deregister_unknown_records_error() {
        let server = JsonRpcServer::builder().port(0).build().unwrap();
        server
            .register_fn("ping", |_, _| Ok(json!("pong")))
            .unwrap();

        assert!(server.deregister("missing").is_err());
        assert_eq!(server.handle().procedure_names(), vec!["ping"]);
        assert_eq!(server.last_error().unwrap().cause, "deregister");

        server.deregister("ping").unwrap();
        assert!(server.handle().procedure_names().is_empty());
        server.destroy();
    }

    #[tokio::test]
    async fn test_run_requires_owned_runtime() {
        let mut server = JsonRpcServer::builder().port(0).build_async().await.unwrap();
        assert!(matches!(server.run(), Err(ServerError::RuntimeNotOwned)));
    }

    #[tokio::test]
    async fn test_serve_returns_after_stop() {
        let mut server = JsonRpcServer::builder().port(0).build_async().await.unwrap();
        let handle = server.handle();
        handle.stop();
        server.serve().await;
        assert_eq!(handle.state(), ServerState::Stopped);
    }
}
