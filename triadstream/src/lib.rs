//! TriadStream -- in-process transport for the Triad handshake roles.
//!
//! Provides the two collaborators every role talks through:
//! - **Connection**: a pair of unbounded point-to-point channels, one per
//!   direction, with an optional reply deadline
//! - **Listener**: an admission actor that creates one worker per accepted
//!   connection and refuses new ones beyond `max_connections`

pub mod channel;
pub mod error;
pub mod listener;

// Re-export key public types at crate root.
pub use channel::Connection;
pub use error::{Result, TriadStreamError};
pub use listener::{
    Admission, Listener, ListenerConfig, ListenerHandle, ListenerRequest, Worker, WorkerFactory,
};
