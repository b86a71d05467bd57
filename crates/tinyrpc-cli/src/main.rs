//! # tinyrpc CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Start a registry
//! tinyrpc registry -b 127.0.0.1:9999
//!
//! # Start two demo servers that announce themselves to it
//! tinyrpc server -b 127.0.0.1:9001 --registry http://127.0.0.1:9999/_tinyrpc_/registry
//! tinyrpc server -b 127.0.0.1:9002 --http --registry http://127.0.0.1:9999/_tinyrpc_/registry
//!
//! # Call one of them, or all of them (outputs raw JSON)
//! tinyrpc call Foo.Sum -a '{"num1": 3, "num2": 4}' --registry http://127.0.0.1:9999/_tinyrpc_/registry
//! tinyrpc broadcast Foo.Sum -a '{"num1": 3, "num2": 4}' -s tcp@127.0.0.1:9001 -s http@127.0.0.1:9002
//! ```

use anyhow::Result;
use argh::FromArgs;
use std::sync::Arc;
use std::time::Duration;
use tinyrpc_common::{Context, Options, DEFAULT_REGISTRY_PATH};
use tinyrpc_registry::{heartbeat, Registry, RegistryServer};
use tinyrpc_server::Server;
use tinyrpc_xclient::{Discovery, MultiServersDiscovery, RegistryDiscovery, SelectMode, XClient};
use tokio::net::TcpListener;

#[derive(FromArgs)]
/// tinyrpc - RPC framework with service discovery
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Registry(RegistryArgs),
    Server(ServerArgs),
    Call(CallArgs),
    Broadcast(BroadcastArgs),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "registry")]
/// start a registry
struct RegistryArgs {
    /// address to bind the registry's HTTP server to
    #[argh(option, short = 'b', default = "\"127.0.0.1:9999\".into()")]
    bind: String,

    /// milliseconds after its last heartbeat that a server expires (0 = never)
    #[argh(option, long = "timeout-ms", default = "5000")]
    timeout_ms: u64,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "server")]
/// start a server for the demo Foo service
struct ServerArgs {
    /// address to bind the server to
    ///
    /// Defaults to "127.0.0.1:0" which assigns a random available port.
    /// The actual bound address is logged at startup.
    #[argh(option, short = 'b', default = "\"127.0.0.1:0\".into()")]
    bind: String,

    /// serve behind HTTP (clients dial with http@) instead of plain TCP
    #[argh(switch)]
    http: bool,

    /// registry URL to send heartbeats to
    #[argh(option, long = "registry")]
    registry: Option<String>,

    /// milliseconds between heartbeats (0 = registry timeout minus one second)
    #[argh(option, long = "heartbeat-ms", default = "0")]
    heartbeat_ms: u64,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// call one server and print the JSON reply
struct CallArgs {
    /// method in Service.Method form
    #[argh(positional)]
    method: String,

    /// JSON arguments
    #[argh(option, short = 'a', long = "args", default = "\"null\".into()")]
    args: String,

    #[argh(option, short = 's', long = "server")]
    /// server address as protocol@host:port (repeatable)
    servers: Vec<String>,

    /// registry URL to discover servers from
    #[argh(option, long = "registry")]
    registry: Option<String>,

    /// selection mode: random or round-robin
    #[argh(option, long = "mode", default = "\"random\".into()")]
    mode: String,

    /// overall call timeout in milliseconds (0 = none)
    #[argh(option, long = "timeout-ms", default = "0")]
    timeout_ms: u64,

    /// server-side handle timeout in milliseconds (0 = none)
    #[argh(option, long = "handle-timeout-ms", default = "0")]
    handle_timeout_ms: u64,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "broadcast")]
/// call every server and print the first JSON reply
struct BroadcastArgs {
    /// method in Service.Method form
    #[argh(positional)]
    method: String,

    /// JSON arguments
    #[argh(option, short = 'a', long = "args", default = "\"null\".into()")]
    args: String,

    #[argh(option, short = 's', long = "server")]
    /// server address as protocol@host:port (repeatable)
    servers: Vec<String>,

    /// registry URL to discover servers from
    #[argh(option, long = "registry")]
    registry: Option<String>,

    /// overall timeout in milliseconds (0 = none)
    #[argh(option, long = "timeout-ms", default = "0")]
    timeout_ms: u64,
}

fn parse_mode(mode: &str) -> Result<SelectMode> {
    match mode {
        "random" => Ok(SelectMode::Random),
        "round-robin" | "roundrobin" => Ok(SelectMode::RoundRobin),
        other => Err(anyhow::anyhow!(
            "Invalid mode '{}': expected random or round-robin",
            other
        )),
    }
}

fn context(timeout_ms: u64) -> Context {
    if timeout_ms == 0 {
        Context::background()
    } else {
        Context::with_timeout(Duration::from_millis(timeout_ms))
    }
}

/// Where the client side finds its servers.
enum Target {
    Servers(Vec<String>),
    Registry(String),
}

impl Target {
    fn from_args(servers: Vec<String>, registry: Option<String>) -> Result<Self> {
        match (servers.is_empty(), registry) {
            (false, None) => Ok(Target::Servers(servers)),
            (true, Some(registry)) => Ok(Target::Registry(registry)),
            (false, Some(_)) => Err(anyhow::anyhow!("Use either --server or --registry, not both")),
            (true, None) => Err(anyhow::anyhow!("No servers: use --server <protocol@addr> or --registry <url>")),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Keep call/broadcast output clean for piping; servers log
    if matches!(cli.command, Commands::Registry(_) | Commands::Server(_)) {
        // Set default log level to INFO, but allow RUST_LOG env var to override
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Registry(args) => run_registry(args).await,
        Commands::Server(args) => run_server(args).await,
        Commands::Call(args) => run_call(args).await,
        Commands::Broadcast(args) => run_broadcast(args).await,
    }
}

async fn run_registry(args: RegistryArgs) -> Result<()> {
    let listener = TcpListener::bind(&args.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", args.bind, e))?;

    let registry = Arc::new(Registry::new(Duration::from_millis(args.timeout_ms)));
    RegistryServer::new(registry).run(listener).await?;
    Ok(())
}

async fn run_server(args: ServerArgs) -> Result<()> {
    let listener = TcpListener::bind(&args.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", args.bind, e))?;
    let local_addr = listener.local_addr()?;

    let mut server = Server::new();
    server.register(tinyrpc_cli::demo::foo_service())?;
    let server = Arc::new(server);

    let protocol = if args.http { "http" } else { "tcp" };
    let rpc_addr = format!("{}@{}", protocol, local_addr);
    tracing::info!("Serving Foo at {}", rpc_addr);

    let _heartbeat = match &args.registry {
        Some(registry) => {
            let registry = if registry.ends_with(DEFAULT_REGISTRY_PATH) {
                registry.clone()
            } else {
                format!("{}{}", registry.trim_end_matches('/'), DEFAULT_REGISTRY_PATH)
            };
            let interval = Duration::from_millis(args.heartbeat_ms);
            Some(heartbeat(&registry, &rpc_addr, interval).await?)
        }
        None => None,
    };

    if args.http {
        server.serve_http(listener).await?;
    } else {
        server.accept(listener).await?;
    }
    Ok(())
}

async fn run_call(args: CallArgs) -> Result<()> {
    let mode = parse_mode(&args.mode)?;
    let call_args: serde_json::Value = serde_json::from_str(&args.args)
        .map_err(|e| anyhow::anyhow!("Invalid JSON in args: {}", e))?;
    let options = Options::default().with_handle_timeout(Duration::from_millis(args.handle_timeout_ms));
    let ctx = context(args.timeout_ms);

    let reply = match Target::from_args(args.servers, args.registry)? {
        Target::Servers(servers) => {
            call(XClient::new(MultiServersDiscovery::new(servers), mode, Some(options)), &ctx, &args.method, &call_args).await?
        }
        Target::Registry(registry) => {
            call(XClient::new(RegistryDiscovery::new(registry), mode, Some(options)), &ctx, &args.method, &call_args).await?
        }
    };

    // Output raw JSON to stdout
    println!("{}", serde_json::to_string(&reply)?);
    Ok(())
}

async fn call<D: Discovery>(
    xclient: XClient<D>,
    ctx: &Context,
    method: &str,
    args: &serde_json::Value,
) -> Result<serde_json::Value> {
    let result = xclient.call(ctx, method, args).await;
    xclient.close().await;
    Ok(result?)
}

async fn run_broadcast(args: BroadcastArgs) -> Result<()> {
    let call_args: serde_json::Value = serde_json::from_str(&args.args)
        .map_err(|e| anyhow::anyhow!("Invalid JSON in args: {}", e))?;
    let ctx = context(args.timeout_ms);

    let reply = match Target::from_args(args.servers, args.registry)? {
        Target::Servers(servers) => {
            broadcast(XClient::new(MultiServersDiscovery::new(servers), SelectMode::Random, None), &ctx, &args.method, &call_args).await?
        }
        Target::Registry(registry) => {
            broadcast(XClient::new(RegistryDiscovery::new(registry), SelectMode::Random, None), &ctx, &args.method, &call_args).await?
        }
    };

    println!("{}", serde_json::to_string(&reply)?);
    Ok(())
}

async fn broadcast<D: Discovery>(
    xclient: XClient<D>,
    ctx: &Context,
    method: &str,
    args: &serde_json::Value,
) -> Result<serde_json::Value> {
    let mut reply = serde_json::Value::Null;
    let result = xclient.broadcast(ctx, method, args, Some(&mut reply)).await;
    xclient.close().await;
    result?;
    Ok(reply)
}
