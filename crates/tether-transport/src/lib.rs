//! # Tether Transport
//!
//! Concrete transports and server negotiation for `tether-core`.
//!
//! ## Features
//!
//! - `websockets`: WebSocket transport (tokio-tungstenite)
//! - `server-sent-events`: Server-Sent Events receive, HTTP POST send
//! - `long-polling`: long-poll receive, HTTP POST send
//! - `full`: all of the above
//!
//! Negotiation ([`HttpNegotiator`]) is always available.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  HttpConnection     │  (tether-core)
//! ├─────────────────────┤
//! │  HttpNegotiator     │  POST {url}/negotiate
//! │  TransportFactory   │  <- This crate (implementations)
//! ├─────────────────────┤
//! │  Network (TCP/HTTP) │
//! └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tether_core::{HttpConnection, HttpConnectionOptions, TransferFormat};
//! use tether_transport::{DefaultTransportFactory, HttpNegotiator, HttpOptions};
//!
//! let http = HttpOptions::default().with_access_token("secret");
//! let options = HttpConnectionOptions::new("http://localhost:5000/chat");
//!
//! let negotiator = HttpNegotiator::new(&options.url, http.clone())?;
//! let factory = DefaultTransportFactory::new(http)?;
//! let connection = HttpConnection::new(&options, Arc::new(negotiator), Arc::new(factory));
//!
//! connection.start(TransferFormat::Text).await?;
//! ```

pub mod factory;
pub mod http;
pub mod negotiate;

#[cfg(feature = "websockets")]
pub mod websocket;

#[cfg(feature = "server-sent-events")]
pub mod sse;

#[cfg(feature = "long-polling")]
pub mod long_polling;

pub use factory::DefaultTransportFactory;
pub use http::HttpOptions;
pub use negotiate::{HttpNegotiator, NegotiateResponse};

#[cfg(feature = "websockets")]
pub use websocket::WebSocketTransport;

#[cfg(feature = "server-sent-events")]
pub use sse::ServerSentEventsTransport;

#[cfg(feature = "long-polling")]
pub use long_polling::LongPollingTransport;
