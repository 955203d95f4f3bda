// Handshake state machines of the two principals.

use crate::values::{Challenge, Nonce, SessionKey};

/// The current state of a Client handshake.
#[derive(Debug)]
pub enum ClientState {
    /// No hello sent yet.
    Idle,

    /// Hello sent, waiting for the server's reply.
    Requesting {
        /// Challenge bound into this attempt.
        challenge: Challenge,
        /// The client's own nonce, expected back inside its key grant.
        nonce: Nonce,
    },

    /// Reply validated; the session key is adopted.
    Done { session_key: SessionKey },

    /// Validation failed. Terminal: there is no retry.
    Failed,
}

impl ClientState {
    /// Human-readable label for the current state (used in error messages).
    pub fn label(&self) -> &'static str {
        match self {
            ClientState::Idle => "Idle",
            ClientState::Requesting { .. } => "Requesting",
            ClientState::Done { .. } => "Done",
            ClientState::Failed => "Failed",
        }
    }
}

/// The current state of one Server worker.
#[derive(Debug)]
pub enum ServerState {
    /// Waiting for the client's hello.
    AwaitingHello,

    /// Relay request sent to the Trusted Authority.
    AwaitingTrusted {
        /// Challenge from the client's hello.
        challenge: Challenge,
        /// The server's own nonce, expected back inside its key grant.
        nonce: Nonce,
    },

    /// Trusted reply validated; the session key is adopted.
    Done { session_key: SessionKey },

    /// Validation failed.
    Failed,
}

impl ServerState {
    pub fn label(&self) -> &'static str {
        match self {
            ServerState::AwaitingHello => "AwaitingHello",
            ServerState::AwaitingTrusted { .. } => "AwaitingTrusted",
            ServerState::Done { .. } => "Done",
            ServerState::Failed => "Failed",
        }
    }
}
