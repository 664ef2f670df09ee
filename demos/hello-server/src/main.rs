//! # Hello JSON-RPC Server
//!
//! Minimal server with two procedures:
//! - `sayHello` answers `"Hello <name>!\n"` for `params: ["<name>"]`
//! - `exit` stops the event loop and answers `"Bye!"`
//!
//! ## Usage
//! ```bash
//! cargo run -p hello-server -- --port 1234
//! echo '{"jsonrpc":"2.0","method":"sayHello","params":["World"],"id":1}' | nc 127.0.0.1 1234
//! ```

use anyhow::Result;
use clap::Parser;
use serde_json::{Value, json};
use tracing::{info, warn};
use turul_json_rpc_server::prelude::*;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host name or address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "1234")]
    port: u16,
}

fn say_hello(_ctx: &InvocationContext, params: RequestParams) -> ProcedureResult {
    match params.get_index(0).and_then(Value::as_str) {
        Some(name) => Ok(json!(format!("Hello {}!\n", name))),
        None => Err(ProcedureError::new(-1, "Missing name parameter!")),
    }
}

fn exit(ctx: &InvocationContext, _params: RequestParams) -> ProcedureResult {
    info!("Exit requested by client");
    ctx.server().stop();
    Ok(json!("Bye!"))
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut server = JsonRpcServer::builder()
        .hostname(args.host)
        .port(args.port)
        .build()?;
    server.register_fn("sayHello", say_hello)?;
    server.register_fn("exit", exit)?;

    if let Some(addr) = server.local_addr() {
        info!("Listening on {}", addr);
    }
    server.run()?;

    if let Some(record) = server.last_error() {
        warn!("Last error: {}", record);
    }
    server.destroy();
    Ok(())
}
