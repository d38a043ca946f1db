//! Error types for weighted-dns.

use thiserror::Error;

/// Errors that can occur in the DNS server and its administrative interface.
#[derive(Debug, Error)]
pub enum DnsError {
    /// Sampler requested over zero candidates or a zero total weight.
    #[error("invalid distribution: no candidates or zero total weight")]
    InvalidDistribution,

    /// Weight is not a positive integer.
    #[error("invalid weight: weights must be positive integers")]
    InvalidWeight,

    /// A candidate could not be rendered into a DNS record.
    #[error("record synthesis failed: {0}")]
    RecordSynthesis(String),

    /// No upstream could be chosen, or the exchange with it failed.
    #[error("forward unavailable: {0}")]
    ForwardUnavailable(String),

    /// Administrative request is missing fields or carries garbage.
    #[error("malformed admin input: {0}")]
    MalformedAdminInput(String),

    /// Incoming message has no question to answer.
    #[error("query message has no question")]
    MissingQuestion,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// DNS protocol error
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),

    /// Snapshot could not be encoded or decoded.
    #[error("snapshot encoding error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

impl DnsError {
    /// True for errors caused by bad administrative input, as opposed to
    /// server-side failures.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            DnsError::InvalidDistribution
                | DnsError::InvalidWeight
                | DnsError::MalformedAdminInput(_)
                | DnsError::Snapshot(_)
        )
    }
}
