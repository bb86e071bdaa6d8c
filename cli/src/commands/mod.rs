//! CLI subcommand implementations for socket-bridge.
//!
//! Commands are organized into submodules by how they drive the bridge:
//!
//! - [`request`] - One-shot `get`, `udp`, and `publish` invocations
//! - [`serve`] - Line-oriented JSON host over stdin/stdout
//!
//! # Usage
//!
//! Commands are invoked from the main CLI dispatcher:
//!
//! ```ignore
//! use socket_bridge::{commands, Config};
//!
//! let config = Config::load()?;
//! commands::request::get(config, "localhost", 9695, "01d2f2fa", None)?;
//! commands::serve::run(Config::load()?)?;
//! ```

pub mod request;
pub mod serve;

/// Build the multi-threaded runtime a command runs on.
fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(anyhow::Error::from)
}
