//! Error types for the transfer engine

use crate::types::AccountId;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Business-rule failures detected by the account handler.
///
/// Every variant is an "invalid argument" from the caller's point of view:
/// it is reported through the request's error callback and never affects
/// the consumer thread.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Create or transfer with an amount below zero
    #[error("amount should not be less than 0, got {0}")]
    NegativeAmount(i64),

    /// Info on an unknown account
    #[error("account {0} not present")]
    AccountNotFound(AccountId),

    /// Transfer source is unknown
    #[error("from account {0} not present")]
    FromAccountNotFound(AccountId),

    /// Transfer destination is unknown
    #[error("to account {0} not present")]
    ToAccountNotFound(AccountId),

    /// Source balance does not cover the transfer
    #[error("not enough money for transfer: balance {balance}, requested {requested}")]
    InsufficientFunds {
        /// Balance of the source account
        balance: i64,
        /// Requested transfer amount
        requested: i64,
    },

    /// Request did not name a required account
    #[error("{0} account not specified")]
    MissingAccount(&'static str),

    /// Slot carried no recognised operation kind
    #[error("operation not supported")]
    UnsupportedOperation,
}

/// Engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Request rejected by a business rule
    #[error("Invalid argument: {0}")]
    InvalidArgument(#[from] Rejection),

    /// Unexpected failure inside a handler
    #[error("Internal error: {0}")]
    Internal(String),

    /// Engine is stopped and accepts no more requests
    #[error("Engine is shut down")]
    Shutdown,

    /// Reply channel closed before a result arrived
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for every business-rule rejection.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }

    /// The underlying rejection, if this is one.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Error::InvalidArgument(rejection) => Some(rejection),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_is_invalid_argument() {
        let err: Error = Rejection::NegativeAmount(-5).into();
        assert!(err.is_invalid_argument());
        assert_eq!(err.rejection(), Some(&Rejection::NegativeAmount(-5)));
        assert_eq!(
            err.to_string(),
            "Invalid argument: amount should not be less than 0, got -5"
        );
    }

    #[test]
    fn test_internal_is_not_invalid_argument() {
        let err = Error::Internal("boom".to_string());
        assert!(!err.is_invalid_argument());
        assert!(err.rejection().is_none());
    }
}
