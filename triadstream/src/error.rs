use std::time::Duration;

use thiserror::Error;

/// All errors produced by the TriadStream transport layer.
#[derive(Debug, Error)]
pub enum TriadStreamError {
    #[error("channel is closed")]
    ChannelClosed,

    #[error("listener is closed")]
    ListenerClosed,

    #[error("no response within {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, TriadStreamError>;
