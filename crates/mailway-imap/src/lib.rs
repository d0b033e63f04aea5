//! # mailway-imap
//!
//! A pipelined IMAP client library implementing RFC 3501 (`IMAP4rev1`)
//! with the UIDPLUS, NAMESPACE, QUOTA and ACL extensions and
//! IMAPS/STARTTLS transport security.
//!
//! ## Features
//!
//! - **Pipelined command execution**: many commands in flight at once,
//!   each dispatched to its reply by tag
//! - **Four-layer wire stack**: framed transport, reply-assembling
//!   protocol, command factory/engine, and command builder objects
//! - **Literal handshake**: `{n}` payloads gated on the server's `+`
//!   continuation, with untagged traffic rerouted instead of dropped
//! - **TLS via rustls**: implicit IMAPS or STARTTLS upgrade, with a
//!   best-effort mode that logs certificate findings
//! - **Modified UTF-7** mailbox names (RFC 3501 section 5.1.3)
//! - **Callback surface**: monitor, progress, EXISTS, request/result
//!   and error hooks on every connection
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailway_imap::{Config, Connection, TlsMode};
//!
//! #[tokio::main]
//! async fn main() -> mailway_imap::Result<()> {
//!     let config = Config::builder("imap.example.com")
//!         .service("imaps")?
//!         .build();
//!     let mut conn = Connection::open(config).await?;
//!
//!     let login = conn.login("user@example.com", "password").await?;
//!     assert!(conn.command(login)?.succeeded());
//!
//!     // Pipeline five header fetches; replies dispatch by tag.
//!     let mut ids = Vec::new();
//!     for n in 1..=5u32 {
//!         let id = conn.create("FETCH")?;
//!         let cmd = conn.command_mut(id)?;
//!         cmd.add_sequence(&[n])?;
//!         cmd.add_raw("BODY.PEEK[HEADER]")?;
//!         conn.queue(id)?;
//!         ids.push(id);
//!     }
//!     conn.execute_all(true).await?;
//!     for id in ids {
//!         let reply = conn.command(id)?.reply();
//!         // ...
//!     }
//!
//!     conn.logout().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Layers
//!
//! ```text
//! ┌──────────────────────┐
//! │      Connection      │  facade: config, callbacks, progress
//! ├──────────┬───────────┤
//! │  Engine  │  Command  │  tags, queue, dispatch; builders
//! ├──────────┴───────────┤
//! │       Protocol       │  greeting, STARTTLS, reply assembly
//! ├──────────────────────┤
//! │      Transport       │  framed lines + literal blobs
//! └──────────────────────┘
//! ```
//!
//! A server `NO`/`BAD` is never an `Err`: it lands on the reply record
//! and is inspected through [`protocol::Reply::succeeded`]. Errors are
//! reserved for transport failures and API misuse.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod callback;
pub mod command;
pub mod connection;
pub mod engine;
mod error;
pub mod parser;
pub mod protocol;
pub mod transport;
pub mod types;

pub use callback::{
    Callback, CallbackEvent, CollectingCallback, Hooks, LoggingCallback, MonitorLevel,
    NoopCallback,
};
pub use command::{
    Command, CommandId, CommandKind, CommandState, FetchAttribute, FetchItems, SearchCriteria,
    StatusAttribute, StoreAction,
};
pub use connection::{Config, ConfigBuilder, Connection, ProgressStack, TlsMode, resolve_port};
pub use engine::{BulkRing, Engine};
pub use error::{Error, ErrorKind, Result};
pub use parser::Token;
pub use protocol::{InfoLine, Protocol, ReceiveState, Reply, ReplyStatus, SendFragment};
pub use transport::{Fragment, ImapStream, LiteralBlob, TlsUpgrade, Transport};
pub use types::{Tag, TagAllocator};

/// IMAP protocol version supported.
pub const IMAP_VERSION: &str = "IMAP4rev1";
