//! Error taxonomy for bridge operations.
//!
//! Every failure a bridge operation can hit maps onto one [`BridgeError`]
//! variant. Errors never cross the public operation boundary: the service
//! reports them to the listener and hands the caller a sentinel instead.

/// Errors that can occur while bridging socket traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Remote host refused, was unreachable, or the connect timed out.
    Connect(String),
    /// Deadline elapsed before the I/O completed.
    Timeout,
    /// Payload was not a valid hex string.
    MalformedInput(String),
    /// No connection is registered under the given name.
    UnknownConnection(String),
    /// Read or write failed on an established connection.
    Io(String),
    /// Operation was stopped by an explicit close or service shutdown.
    Cancelled,
    /// `query` was called before a default route was configured.
    NoRoute,
    /// The unit of work running the operation panicked.
    TaskFailed(String),
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect(msg) => write!(f, "Connect failed: {msg}"),
            Self::Timeout => write!(f, "Operation timed out"),
            Self::MalformedInput(msg) => write!(f, "Malformed input: {msg}"),
            Self::UnknownConnection(name) => write!(f, "Unknown connection: {name}"),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Cancelled => write!(f, "Operation cancelled"),
            Self::NoRoute => write!(f, "No default route configured"),
            Self::TaskFailed(msg) => write!(f, "Task failed: {msg}"),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result alias used throughout the bridge.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_detail() {
        let err = BridgeError::UnknownConnection("alice".to_string());
        assert_eq!(err.to_string(), "Unknown connection: alice");

        let err = BridgeError::Connect("127.0.0.1:1: connection refused".to_string());
        assert!(err.to_string().starts_with("Connect failed:"));
    }

    #[test]
    fn test_io_error_converts_to_io_variant() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: BridgeError = io.into();
        assert_eq!(err, BridgeError::Io("pipe closed".to_string()));
    }
}
