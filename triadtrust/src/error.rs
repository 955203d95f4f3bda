// TriadTrust error types

use thiserror::Error;
use triadstream::TriadStreamError;

/// Top-level error type for the TriadTrust crate.
///
/// Every handshake failure inside a role is one of these. None of them ever
/// crosses a role boundary: workers answer with the opaque `Reply::Error`.
#[derive(Debug, Error)]
pub enum TriadTrustError {
    // ── Validation errors ───────────────────────────────────────────────
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("identity mismatch: expected {expected}, got {actual}")]
    IdentityMismatch { expected: String, actual: String },

    #[error("unknown principal: {0}")]
    UnknownPrincipal(String),

    #[error("echoed nonce does not match the generated one")]
    NonceMismatch,

    #[error("echoed challenge does not match the generated one")]
    ChallengeMismatch,

    #[error("fragments disagree on {0}")]
    Inconsistent(&'static str),

    #[error("peer answered with ERROR")]
    Rejected,

    // ── Codec errors ────────────────────────────────────────────────────
    #[error("fragment decryption failed: {0}")]
    Decryption(String),

    #[error("fragment encryption failed: {0}")]
    Encryption(String),

    #[error("invalid principal id {0:?}")]
    InvalidPrincipal(String),

    // ── State machine errors ────────────────────────────────────────────
    #[error("invalid handshake state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    // ── Transport / admission ───────────────────────────────────────────
    #[error("listener refused connection: maximum connections reached")]
    CapacityExceeded,

    #[error("transport error: {0}")]
    Transport(#[from] TriadStreamError),

    // ── Configuration ───────────────────────────────────────────────────
    #[error("configuration error: {0}")]
    Config(String),
}

impl TriadTrustError {
    /// Short stable label of the error kind, used in log events.
    pub fn kind(&self) -> &'static str {
        match self {
            TriadTrustError::Malformed(_) => "malformed",
            TriadTrustError::IdentityMismatch { .. } => "identity_mismatch",
            TriadTrustError::UnknownPrincipal(_) => "unknown_principal",
            TriadTrustError::NonceMismatch => "nonce_mismatch",
            TriadTrustError::ChallengeMismatch => "challenge_mismatch",
            TriadTrustError::Inconsistent(_) => "inconsistent",
            TriadTrustError::Rejected => "rejected",
            TriadTrustError::Decryption(_) => "decryption",
            TriadTrustError::Encryption(_) => "encryption",
            TriadTrustError::InvalidPrincipal(_) => "invalid_principal",
            TriadTrustError::InvalidStateTransition { .. } => "invalid_state_transition",
            TriadTrustError::CapacityExceeded => "capacity_exceeded",
            TriadTrustError::Transport(_) => "transport",
            TriadTrustError::Config(_) => "config",
        }
    }
}

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, TriadTrustError>;
