//! Shared helpers: a server running on its own thread and a line-oriented
//! TCP client.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use turul_json_rpc_server::prelude::*;

/// How long a client waits for a line that should arrive
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a client waits to confirm that nothing arrives
pub const SILENCE_TIMEOUT: Duration = Duration::from_millis(200);

pub fn say_hello(_ctx: &InvocationContext, params: RequestParams) -> ProcedureResult {
    match params.get_index(0).and_then(Value::as_str) {
        Some(name) => Ok(json!(format!("Hello {}!\n", name))),
        None => Err(ProcedureError::new(-1, "Missing name parameter!")),
    }
}

pub fn exit(ctx: &InvocationContext, _params: RequestParams) -> ProcedureResult {
    ctx.server().stop();
    Ok(json!("Bye!"))
}

pub fn echo(_ctx: &InvocationContext, params: RequestParams) -> ProcedureResult {
    Ok(params.to_value())
}

/// Outcome of a server thread once `run` has returned
#[derive(Debug)]
pub struct ServerExit {
    pub state: ServerState,
    pub last_error: Option<ErrorRecord>,
}

/// A server bound to an ephemeral loopback port, running on a dedicated
/// thread until stopped
pub struct TestServer {
    pub addr: SocketAddr,
    pub handle: ServerHandle,
    thread: Option<JoinHandle<ServerExit>>,
}

impl TestServer {
    /// Start with `sayHello`, `exit` and `echo` registered
    pub fn start() -> Self {
        Self::start_with(ServerBuilder::new(), |_| {})
    }

    /// Start from `builder` (the address is overridden) after letting
    /// `setup` register extra procedures
    pub fn start_with<F>(builder: ServerBuilder, setup: F) -> Self
    where
        F: FnOnce(&JsonRpcServer) + Send + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::channel();
        let thread = std::thread::spawn(move || {
            let mut server = builder
                .hostname("127.0.0.1")
                .port(0)
                .build()
                .expect("server should bind an ephemeral port");
            server.register_fn("sayHello", say_hello).unwrap();
            server.register_fn("exit", exit).unwrap();
            server.register_fn("echo", echo).unwrap();
            setup(&server);

            let addr = server.local_addr().expect("bound server has an address");
            ready_tx.send((addr, server.handle())).unwrap();

            server.run().expect("server owns its runtime");
            let exit = ServerExit {
                state: server.state(),
                last_error: server.last_error(),
            };
            server.destroy();
            exit
        });

        let (addr, handle) = ready_rx
            .recv_timeout(RESPONSE_TIMEOUT)
            .expect("server thread should report its address");
        Self {
            addr,
            handle,
            thread: Some(thread),
        }
    }

    pub async fn connect(&self) -> RpcClient {
        RpcClient::connect(self.addr).await
    }

    /// Wait for the server thread to return from `run` on its own
    pub fn join(mut self) -> ServerExit {
        self.thread
            .take()
            .expect("server thread is joined once")
            .join()
            .expect("server thread should not panic")
    }

    /// Wait for the server thread without blocking the test's runtime
    pub async fn join_async(self) -> ServerExit {
        tokio::task::spawn_blocking(move || self.join())
            .await
            .expect("join task should not panic")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.handle.stop();
            let _ = thread.join();
        }
    }
}

/// A raw TCP client reading newline-terminated responses
pub struct RpcClient {
    lines: tokio::io::Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl RpcClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr)
            .await
            .expect("client should connect");
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write should succeed");
        self.writer.flush().await.expect("flush should succeed");
    }

    pub async fn send(&mut self, request: &Value) {
        self.send_raw(request.to_string().as_bytes()).await;
    }

    /// The next response line exactly as the server wrote it
    pub async fn read_line(&mut self) -> String {
        tokio::time::timeout(RESPONSE_TIMEOUT, self.lines.next_line())
            .await
            .expect("response should arrive in time")
            .expect("read should succeed")
            .expect("connection should still be open")
    }

    pub async fn read_response(&mut self) -> Value {
        let line = self.read_line().await;
        serde_json::from_str(&line).expect("response should be valid JSON")
    }

    pub async fn call(&mut self, request: Value) -> Value {
        self.send(&request).await;
        self.read_response().await
    }

    /// Assert that no response arrives for a short while
    pub async fn expect_silence(&mut self) {
        if let Ok(line) = tokio::time::timeout(SILENCE_TIMEOUT, self.lines.next_line()).await {
            panic!("expected no response, got {line:?}");
        }
    }

    /// Assert that the server closes the connection
    pub async fn expect_closed(self) {
        let mut reader = self.lines.into_inner();
        let mut rest = Vec::new();
        let read = tokio::time::timeout(RESPONSE_TIMEOUT, reader.read_to_end(&mut rest))
            .await
            .expect("server should close the connection");
        match read {
            Ok(0) => {}
            Ok(n) => panic!("unexpected {n} trailing bytes: {:?}", String::from_utf8_lossy(&rest)),
            // A reset also means the peer is gone
            Err(_) => {}
        }
    }
}

pub fn request(method: &str, params: Value, id: Value) -> Value {
    json!({"jsonrpc": "2.0", "method": method, "params": params, "id": id})
}
