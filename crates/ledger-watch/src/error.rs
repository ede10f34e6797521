use thiserror::Error;

/// Errors raised while watching the ledger.
///
/// Only [`WatchError::Configuration`] ever reaches a poll caller; the other
/// variants are absorbed by the poll loop and logged.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Transport or RPC failure: timeout, HTTP error, rate limiting,
    /// malformed or non-validated response.
    #[error("ledger node unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The watched address has no ledger history (yet).
    #[error("account {0} not found on ledger")]
    AccountNotFound(String),

    /// A single transaction could not be evaluated.
    #[error("malformed transaction {hash}: {reason}")]
    MalformedTransaction { hash: String, reason: String },

    /// Invalid poll parameters; raised before polling starts.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for WatchError {
    fn from(err: reqwest::Error) -> Self {
        WatchError::UpstreamUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for WatchError {
    fn from(err: serde_json::Error) -> Self {
        WatchError::UpstreamUnavailable(format!("malformed response: {err}"))
    }
}

pub type WatchResult<T> = Result<T, WatchError>;
