//! Point-to-point channel pairs.
//!
//! A connection is two unbounded, unidirectional tokio channels: one for each
//! direction. `pair()` returns both ends; the caller keeps one and hands the
//! other to the worker. `send` never waits for the peer, `recv` waits until a
//! message arrives or the peer end is dropped.

use std::time::Duration;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::error::{Result, TriadStreamError};

/// One end of a bidirectional connection: sends `Out`, receives `In`.
#[derive(Debug)]
pub struct Connection<Out, In> {
    tx: UnboundedSender<Out>,
    rx: UnboundedReceiver<In>,
    /// Upper bound on how long `request` waits for the reply.
    deadline: Option<Duration>,
}

/// Create both ends of a fresh connection.
pub fn pair<A, B>() -> (Connection<A, B>, Connection<B, A>) {
    let (a_tx, a_rx) = unbounded_channel();
    let (b_tx, b_rx) = unbounded_channel();
    (
        Connection {
            tx: a_tx,
            rx: b_rx,
            deadline: None,
        },
        Connection {
            tx: b_tx,
            rx: a_rx,
            deadline: None,
        },
    )
}

impl<Out, In> Connection<Out, In> {
    /// Bound every subsequent `request` by `deadline`.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Queue a message for the peer.
    pub fn send(&self, msg: Out) -> Result<()> {
        self.tx.send(msg).map_err(|_| TriadStreamError::ChannelClosed)
    }

    /// Wait for the next message from the peer.
    pub async fn recv(&mut self) -> Result<In> {
        self.rx.recv().await.ok_or(TriadStreamError::ChannelClosed)
    }

    /// Send `msg` and wait for the single reply.
    ///
    /// Without a deadline this waits for as long as the peer keeps its end
    /// open.
    pub async fn request(&mut self, msg: Out) -> Result<In> {
        self.send(msg)?;
        match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.recv())
                .await
                .map_err(|_| TriadStreamError::Timeout(deadline))?,
            None => self.recv().await,
        }
    }

    /// Whether the peer has dropped its receiving end.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
