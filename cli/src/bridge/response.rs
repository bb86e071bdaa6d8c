//! Sentinel results of the public bridge operations.
//!
//! Each operation returns a small enum instead of a `Result`; its
//! `Display` form is the literal string hosts expect.

use crate::constants::{ERROR, FAILURE, STARTED_PUBLISHING, SUCCESS, TIMEOUT_EXPIRED};

/// Result of `get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetResponse {
    /// Hex-encoded response bytes.
    Data(String),
    /// The deadline elapsed (`"TIMEOUT EXPIRED"`).
    TimeoutExpired,
    /// Any other failure (`"ERROR"`).
    Error,
}

impl GetResponse {
    /// Sentinel string for this result.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Data(hex) => hex,
            Self::TimeoutExpired => TIMEOUT_EXPIRED,
            Self::Error => ERROR,
        }
    }
}

/// Result of `put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutResponse {
    /// Persistent loop is running (`"STARTED PUBLISHING"`).
    StartedPublishing,
    /// `"FAILURE"`.
    Failure,
}

impl PutResponse {
    /// Sentinel string for this result.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartedPublishing => STARTED_PUBLISHING,
            Self::Failure => FAILURE,
        }
    }
}

/// Result of `putAnswer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerResponse {
    /// `"SUCCESS"`.
    Success,
    /// `"FAILURE"`.
    Failure,
}

impl AnswerResponse {
    /// Sentinel string for this result.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => SUCCESS,
            Self::Failure => FAILURE,
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(
            impl std::fmt::Display for $ty {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )*
    };
}

display_as_str!(GetResponse, PutResponse, AnswerResponse);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels() {
        assert_eq!(GetResponse::TimeoutExpired.to_string(), "TIMEOUT EXPIRED");
        assert_eq!(GetResponse::Error.to_string(), "ERROR");
        assert_eq!(GetResponse::Data("00ff".to_string()).to_string(), "00ff");
        assert_eq!(PutResponse::StartedPublishing.to_string(), "STARTED PUBLISHING");
        assert_eq!(PutResponse::Failure.to_string(), "FAILURE");
        assert_eq!(AnswerResponse::Success.to_string(), "SUCCESS");
        assert_eq!(AnswerResponse::Failure.to_string(), "FAILURE");
    }
}
