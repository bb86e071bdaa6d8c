//! Application-wide constants for the socket bridge.
//!
//! Centralizes default timeouts, buffer sizes, and the sentinel strings the
//! public operations return to their callers.
//!
//! # Categories
//!
//! - **Timeouts**: connect, exchange, and receive deadlines
//! - **Buffers**: the bounded single-read size
//! - **Sentinels**: literal results of the public operation surface

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// Upper bound on establishing a TCP connection or resolving a UDP peer.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline for `get` when the caller does not provide one.
pub const DEFAULT_GET_TIMEOUT: Duration = Duration::from_millis(1000);

/// Deadline for `put`'s initial exchange and the reply read of `putAnswer`.
pub const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long `connectAndStart` waits for a reply datagram.
pub const UDP_RECEIVE_TIMEOUT: Duration = Duration::from_millis(2000);

// ============================================================================
// Buffers
// ============================================================================

/// Maximum number of bytes taken by a single response read.
pub const READ_BUFFER_SIZE: usize = 2000;

// ============================================================================
// Sentinels
// ============================================================================

/// Returned by `get` when the deadline elapses.
pub const TIMEOUT_EXPIRED: &str = "TIMEOUT EXPIRED";

/// Returned by `get` on any non-timeout failure.
pub const ERROR: &str = "ERROR";

/// Returned by `put` once the persistent loop is running.
pub const STARTED_PUBLISHING: &str = "STARTED PUBLISHING";

/// Returned by `put` and `putAnswer` on failure.
pub const FAILURE: &str = "FAILURE";

/// Returned by `putAnswer` on success.
pub const SUCCESS: &str = "SUCCESS";

/// Prefix applied to every message delivered through `on_error`.
pub const ERROR_PREFIX: &str = "Socket bridge error: ";
