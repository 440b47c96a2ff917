//! # mailbolt-imap
//!
//! An IMAP4rev1 (RFC 3501) client connection engine.
//!
//! This crate implements the stateful core a mail client builds on: it
//! opens a transport, negotiates optional transport security (implicit
//! TLS or STARTTLS per RFC 2595) and authentication (SASL per RFC 4422
//! with LOGIN fallback), tags and serializes commands, and demultiplexes
//! tagged/untagged server responses with exact literal framing.
//!
//! Mailbox-level operations (SELECT, FETCH, STORE, SEARCH) are out of
//! scope; higher layers drive them through [`Connection::send`] and
//! [`Connection::read_response`].
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use mailbolt_imap::{Config, PasswordAuthenticator, Security, Store};
//!
//! #[tokio::main]
//! async fn main() -> mailbolt_imap::Result<()> {
//!     let config = Config::builder("imap.example.com")
//!         .security(Security::StartTls)
//!         .tls_required(true)
//!         .build();
//!
//!     let store = Store::new(config);
//!     let auth = Arc::new(PasswordAuthenticator::new("alice", "s3cret"));
//!     let mut conn = store.connection(auth);
//!
//!     conn.connect().await?;
//!     assert!(conn.is_connected());
//!     println!("separator: {:?}", conn.hierarchy_separator());
//!
//!     conn.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`connection`]: the connection engine and its state machine
//! - [`parser`]: streaming response parser with literal framing
//! - [`capability`]: capability atoms and the connection's cache
//! - [`transport`]: plaintext/TLS byte streams
//! - [`store`]: shared per-account state and the socket factory seam
//! - [`auth`]: credential suppliers

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod capability;
pub mod config;
pub mod connection;
mod error;
pub mod parser;
pub mod state;
pub mod store;
pub mod tag;
pub mod transport;

pub use auth::{Authenticator, PasswordAuthenticator};
pub use capability::{Capability, CapabilityCache};
pub use config::{Config, ConfigBuilder, Security};
pub use connection::Connection;
pub use error::{Error, Result};
pub use parser::{
    FetchItem, Greeting, GreetingKind, ListData, LiteralHandler, Response, ResponseCode,
    ResponseData, ResponseItem, ResponseParser, ResponseText, ServerStatusKind, Status,
    TaggedDone,
};
pub use state::State;
pub use store::{ConnectionInfo, SocketFactory, Store};
pub use tag::TagGenerator;
pub use transport::{Transport, TransportStream};

/// IMAP protocol version implemented by this crate.
pub const IMAP_VERSION: &str = "IMAP4rev1";
