//! # Tether
//!
//! Client connections that negotiate a transport with the server and fall
//! back through WebSockets, Server-Sent Events and long polling until one
//! works.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐     ┌─────────────────────┐     ┌──────────────────────┐
//! │ HttpConnection │────▶│ TransportNegotiator │────▶│ WebSockets           │
//! │  (lifecycle)   │     │  (ordered fallback) │────▶│ ServerSentEvents     │
//! └────────────────┘     └─────────────────────┘────▶│ LongPolling          │
//!                                                    └──────────────────────┘
//! ```
//!
//! - **Core**: lifecycle state machine, negotiation, duplex channels
//! - **Transport**: concrete transports and the negotiate client
//! - **Runtime**: configuration, logging and connection assembly
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tether::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let connection = ConnectionBuilder::new("http://localhost:5000/chat")
//!         .connect()
//!         .await?;
//!
//!     let mut channel = connection.channel().expect("connected");
//!     channel.send("hello")?;
//!     if let Some(reply) = channel.receive().await? {
//!         println!("{}", String::from_utf8_lossy(&reply));
//!     }
//!
//!     connection.dispose().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` (default), `yaml-config`: configuration file formats
//! - `json-log`: JSON log lines
//! - `websockets`, `server-sent-events`, `long-polling`: individual transports
//! - `full-transport` (default): all transports

pub use tether_core as core;
pub use tether_runtime as runtime;
pub use tether_transport as transport;

/// Prelude module for convenient imports.
pub mod prelude {
    // Connection lifecycle
    pub use tether_core::{ConnectionState, HttpConnection, HttpConnectionOptions};

    // Channel and transport selection
    pub use tether_core::{
        DuplexChannel, FallbackPolicy, TransferFormat, TransportKind, TransportSelection,
    };

    // Errors
    pub use tether_core::{ConnectionError, ConnectionResult, TransportError, TransportResult};

    // Assembly, config and logging
    pub use tether_runtime::{
        ConfigLoader, ConnectionBuilder, RuntimeError, RuntimeResult,
        TetherConfig, connect,
    };

    pub use tether_transport::HttpOptions;
}
