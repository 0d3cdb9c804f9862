//! Error types for MPC wallet operations
//!
//! Every failure in the engine is classified into one of six kinds
//! (transport, session, protocol, storage, concurrency, domain). The
//! session manager and round engines never swallow errors; the facade
//! returns them to the caller unchanged.

use thiserror::Error;

/// Result type alias for MPC wallet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of an error, used by callers to decide whether to
/// retry, surface, or escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network-level failure; retryable with a fresh session
    Transport,
    /// Session lifecycle failure; retryable with a fresh session
    Session,
    /// Protocol-level failure (tampering or version skew); not retryable
    Protocol,
    /// Secure storage failure; requires user intervention
    Storage,
    /// Another operation holds the profile lock
    Concurrency,
    /// Caller logic error, detected before any network I/O
    Domain,
}

/// Errors that can occur during MPC wallet operations
#[derive(Debug, Error)]
pub enum Error {
    // ============ Transport Errors ============
    /// Network unreachable or request failed in flight
    #[error("Network error: {0}")]
    Network(String),

    /// A single HTTP request exceeded its timeout
    #[error("Request timed out: {0}")]
    RequestTimeout(String),

    // ============ Session Errors ============
    /// The co-signer refused to create a session
    #[error("Session creation failed: {0}")]
    SessionCreateFailed(String),

    /// The co-signer reported the session as failed
    #[error("Session failed: {0}")]
    SessionFailed(String),

    /// The overall polling deadline elapsed before the protocol converged
    #[error("Session timed out: {0}")]
    TimedOut(String),

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    // ============ Protocol Errors ============
    /// Inbound message could not be decoded
    #[error("Invalid protocol message: {0}")]
    InvalidMessage(String),

    /// Inbound message decoded but violates the round contract
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Client and co-signer run incompatible protocol versions
    #[error("Protocol version mismatch: local {local}, remote {remote}")]
    VersionMismatch { local: u32, remote: u32 },

    /// Curve arithmetic or signature verification failed
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    // ============ Storage Errors ============
    /// Underlying store unavailable
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Platform denied access to the secure store
    #[error("Storage access denied: {0}")]
    AccessDenied(String),

    /// Stored record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Encryption or decryption of a stored record failed
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============ Concurrency Errors ============
    /// Another MPC operation is already running for this profile
    #[error("Operation already in progress for profile {0}")]
    OperationInProgress(String),

    // ============ Domain Errors ============
    /// No wallet has been generated for this profile
    #[error("No wallet exists for profile {0}")]
    NoWallet(String),

    /// A wallet already exists for this profile
    #[error("Wallet already exists for profile {0}")]
    AlreadyExists(String),

    /// The profile identifier is unknown or malformed
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    /// The MPC wallet service is disabled by configuration
    #[error("MPC wallet service is disabled")]
    ServiceDisabled,
}

impl Error {
    /// Classify this error into the taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network(_) | Error::RequestTimeout(_) => ErrorKind::Transport,
            Error::SessionCreateFailed(_)
            | Error::SessionFailed(_)
            | Error::TimedOut(_)
            | Error::Cancelled => ErrorKind::Session,
            Error::InvalidMessage(_)
            | Error::ProtocolViolation(_)
            | Error::VersionMismatch { .. }
            | Error::Crypto(_) => ErrorKind::Protocol,
            Error::StorageUnavailable(_)
            | Error::AccessDenied(_)
            | Error::Serialization(_)
            | Error::Encryption(_)
            | Error::Io(_) => ErrorKind::Storage,
            Error::OperationInProgress(_) => ErrorKind::Concurrency,
            Error::NoWallet(_)
            | Error::AlreadyExists(_)
            | Error::ProfileNotFound(_)
            | Error::ServiceDisabled => ErrorKind::Domain,
        }
    }

    /// Whether the caller may retry by starting a fresh session
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::Session)
            && !matches!(self, Error::Cancelled)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::Serialization(e.to_string())
    }
}
