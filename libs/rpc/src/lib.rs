//! Wirecall RPC - call functions on a remote server by name
//!
//! A [`Listener`] serves a [`MethodRegistry`] over TCP, one task per
//! connection. A [`Client`] holds one connection and performs one call at a
//! time, with arguments and results carried as JSON.
//!
//! # Example
//!
//! ```no_run
//! use wirecall_core::Args;
//! use wirecall_rpc::{Client, Listener, MethodRegistry, ServerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = MethodRegistry::new();
//! registry.register("add", |args: Args| {
//!     Ok::<_, wirecall_core::Error>(args.get::<i64>(0, "a")? + args.get::<i64>(1, "b")?)
//! })?;
//!
//! let listener = Listener::bind(registry, ServerConfig::default().with_port(0)).await?;
//! let addr = listener.local_addr()?;
//! tokio::spawn(listener.accept_loop());
//!
//! let mut client = Client::connect(addr).await?;
//! let sum: i64 = client.call_as("add", (2, 3)).await?;
//! assert_eq!(sum, 5);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod proxy;
pub mod registry;
pub mod server;

// Re-exports for convenience
pub use client::{call_once, Client};
pub use config::{ClientConfig, ServerConfig};
pub use error::{Error, Result};
pub use proxy::MethodCall;
pub use registry::{function, MethodRegistry, RpcMethod, RpcService, ServiceMethods};
pub use server::{Listener, ShutdownHandle};
