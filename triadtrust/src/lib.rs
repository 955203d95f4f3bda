// TriadTrust: three-party symmetric-key mutual authentication
//
// Crate root: module declarations and public re-exports.

pub mod codec;
pub mod config;
pub mod error;
pub mod handshake;
pub mod logging;
pub mod registry;
pub mod values;

// Re-export key types at crate root for convenience.
pub use codec::{Fragment, Protection};
pub use config::TriadConfig;
pub use error::{Result, TriadTrustError};
pub use handshake::client::{Client, HandshakeOutcome, ServerHandle};
pub use handshake::messages::Reply;
pub use handshake::server::{EstablishedSession, ServerFactory, ServerSession, TrustedHandle};
pub use handshake::trusted::{TrustedFactory, TrustedWorker};
pub use registry::KeyRegistry;
pub use values::{Challenge, Nonce, PrincipalId, SessionKey, SharedKey};
