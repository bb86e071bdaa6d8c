//! Socket Bridge - raw TCP/UDP exchanges with hex-encoded payloads.
//!
//! Lets a caller on one side of a trust boundary talk raw bytes to a remote
//! host. Requests and responses cross the API as hex strings; results come
//! back either as the return value of a call or as push notifications to a
//! registered listener.
//!
//! # Architecture
//!
//! ```text
//! caller ─► BridgeService ─► hex::decode ─► socket write ─► bounded read ─► hex::encode
//!               │                                              │
//!               ├─ TimedExecutor (deadline per operation)      ├─► return value
//!               └─ ConnectionRegistry (named connections)      └─► BridgeListener
//! ```
//!
//! # Modules
//!
//! - [`bridge`] - The public operation set (`get`, `put`, `put_answer`, ...)
//! - [`connection`] - Transport endpoints and routable handles
//! - [`registry`] - Name → connection mapping
//! - [`executor`] - Deadline-bounded operation tasks
//! - [`hex`] - Payload codec
//! - [`listener`] - Callback surface to the host
//! - [`config`] - Configuration loading/saving
//! - [`commands`] - CLI subcommands

// Library modules
pub mod bridge;
pub mod commands;
pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod executor;
pub mod hex;
pub mod listener;
pub mod registry;

// Re-export commonly used types
pub use bridge::{AnswerResponse, BridgeService, GetResponse, PutResponse};
pub use config::Config;
pub use connection::{Connection, ConnectionHandle, ConnectionState, Endpoint, Protocol};
pub use error::{BridgeError, BridgeResult};
pub use listener::{BridgeEvent, BridgeListener, ChannelListener, LogListener};
pub use registry::ConnectionRegistry;
