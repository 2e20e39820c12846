//! Wirecall demo - serve a couple of arithmetic methods or call a server.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use wirecall_core::Args;
use wirecall_rpc::config::DEFAULT_PORT;
use wirecall_rpc::{Client, ClientConfig, Listener, MethodRegistry, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "wirecall")]
#[command(about = "Minimal JSON-over-TCP remote procedure calls")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve `add` and `sub` until interrupted
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on (0 = auto-assign)
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Largest request or response payload in bytes
        #[arg(long, default_value_t = wirecall_fabric::DEFAULT_MAX_FRAME_SIZE)]
        max_frame_size: usize,

        /// Connections served at once
        #[arg(long, default_value_t = 256)]
        max_connections: usize,
    },
    /// Call a method once and print the result as JSON
    Call {
        #[arg(long, default_value = "localhost")]
        host: String,

        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Method name
        method: String,

        /// Positional arguments, each parsed as JSON (bare words become strings)
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,

        /// Keyword argument as name=json, may be repeated
        #[arg(short = 'k', long = "kwarg", value_parser = parse_kwarg)]
        kwargs: Vec<(String, Value)>,
    },
}

fn parse_json_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_kwarg(raw: &str) -> std::result::Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {raw:?}"))?;
    Ok((name.to_string(), parse_json_arg(value)))
}

/// Integer arithmetic when both operands are integers, floating point otherwise
fn arithmetic(
    args: &Args,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> wirecall_core::Result<Value> {
    args.at_most(2)?.only_keywords(&["a", "b"])?;
    if let (Ok(a), Ok(b)) = (args.get::<i64>(0, "a"), args.get::<i64>(1, "b")) {
        return int_op(a, b)
            .map(Value::from)
            .ok_or_else(|| wirecall_core::Error::dispatch("integer overflow"));
    }
    let a: f64 = args.get(0, "a")?;
    let b: f64 = args.get(1, "b")?;
    Ok(Value::from(float_op(a, b)))
}

fn demo_registry() -> Result<MethodRegistry> {
    let mut registry = MethodRegistry::new();
    registry.register("add", |args: Args| {
        arithmetic(&args, i64::checked_add, |a, b| a + b)
    })?;
    registry.register("sub", |args: Args| {
        arithmetic(&args, i64::checked_sub, |a, b| a - b)
    })?;
    Ok(registry)
}

async fn serve(config: ServerConfig) -> Result<()> {
    let registry = demo_registry()?;
    info!("Registered methods: {}", registry.method_names().join(", "));

    let listener = Listener::bind(registry, config)
        .await
        .context("failed to bind listener")?;
    let shutdown = listener.shutdown_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            shutdown.shutdown();
        }
    });

    listener.accept_loop().await?;
    Ok(())
}

async fn call(
    config: ClientConfig,
    method: String,
    args: Vec<Value>,
    kwargs: Map<String, Value>,
) -> Result<()> {
    let target = config.target();
    let mut client = Client::connect_with(config)
        .await
        .with_context(|| format!("could not connect to {target}"))?;

    let result = client.call(&method, args, kwargs).await;
    client.disconnect().await;

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    match cli.command {
        Command::Serve {
            host,
            port,
            max_frame_size,
            max_connections,
        } => {
            let config = ServerConfig::default()
                .with_host(host)
                .with_port(port)
                .with_max_frame_size(max_frame_size)
                .with_max_connections(max_connections);
            serve(config).await
        }
        Command::Call {
            host,
            port,
            method,
            args,
            kwargs,
        } => {
            let config = ClientConfig::default().with_host(host).with_port(port);
            let args = args.iter().map(|raw| parse_json_arg(raw)).collect();
            let kwargs = kwargs.into_iter().collect();
            call(config, method, args, kwargs).await
        }
    }
}
