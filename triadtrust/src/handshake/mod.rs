//! The three roles of the handshake and the messages they exchange.

pub mod client;
pub mod messages;
pub mod server;
pub mod state;
pub mod trusted;
