//! Connection admission.
//!
//! A `Listener` is an actor task that hands out connections to freshly
//! created workers. At most `max_connections` workers may hold a slot at the
//! same time; further connection requests are answered with
//! `Admission::CapacityExceeded` instead of being queued. A started worker
//! gives its slot back when its `serve` future completes.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use crate::channel::{self, Connection};
use crate::error::{Result, TriadStreamError};

/// A per-connection worker.
pub trait Worker: Send + 'static {
    /// Message type the caller sends to the worker.
    type Request: Send + 'static;
    /// Message type the worker sends back.
    type Response: Send + 'static;

    /// Serve one connection to completion.
    fn serve(
        self,
        conn: Connection<Self::Response, Self::Request>,
    ) -> impl Future<Output = ()> + Send;
}

/// Creates one worker per admitted connection.
pub trait WorkerFactory: Send + 'static {
    type Worker: Worker;

    fn new_worker(&mut self) -> Self::Worker;
}

/// Caller-side request type of the workers produced by `F`.
pub type RequestOf<F> = <<F as WorkerFactory>::Worker as Worker>::Request;
/// Caller-side response type of the workers produced by `F`.
pub type ResponseOf<F> = <<F as WorkerFactory>::Worker as Worker>::Response;

/// Answer to a connection request.
#[derive(Debug)]
pub enum Admission<Req, Resp> {
    /// A worker was created; this is the caller's end of its connection.
    Accepted(Connection<Req, Resp>),
    /// All slots are taken.
    CapacityExceeded,
}

/// Messages accepted on a listener's input channel.
#[derive(Debug)]
pub enum ListenerRequest<Req, Resp> {
    /// Connection-request token, answered on the enclosed reply slot.
    Connect(oneshot::Sender<Admission<Req, Resp>>),
    /// Stop admitting and drain.
    Finish,
}

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Name used in log events.
    pub name: String,
    /// Maximum number of workers holding a slot at once.
    pub max_connections: usize,
    /// Spawn workers on admission. When false the worker is created and
    /// parked (keeping its slot) but never runs.
    pub start_workers: bool,
}

impl ListenerConfig {
    pub fn new(name: impl Into<String>, max_connections: usize) -> Self {
        Self {
            name: name.into(),
            max_connections,
            start_workers: true,
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self::new("listener", 10)
    }
}

/// Cloneable handle used to reach a running listener.
#[derive(Debug)]
pub struct ListenerHandle<Req, Resp> {
    tx: UnboundedSender<ListenerRequest<Req, Resp>>,
    slots: Arc<Semaphore>,
    max_connections: usize,
}

impl<Req, Resp> Clone for ListenerHandle<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            slots: Arc::clone(&self.slots),
            max_connections: self.max_connections,
        }
    }
}

impl<Req, Resp> ListenerHandle<Req, Resp> {
    /// Ask the listener for a new connection.
    ///
    /// Capacity exhaustion is reported as `Admission::CapacityExceeded`, not
    /// as an error. `Err(ListenerClosed)` means the listener has finished.
    pub async fn connect(&self) -> Result<Admission<Req, Resp>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ListenerRequest::Connect(reply_tx))
            .map_err(|_| TriadStreamError::ListenerClosed)?;
        reply_rx.await.map_err(|_| TriadStreamError::ListenerClosed)
    }

    /// Send the FINISH signal. Already-admitted workers keep running.
    pub fn finish(&self) -> Result<()> {
        self.tx
            .send(ListenerRequest::Finish)
            .map_err(|_| TriadStreamError::ListenerClosed)
    }

    /// Number of slots currently held by workers.
    pub fn active_workers(&self) -> usize {
        self.max_connections
            .saturating_sub(self.slots.available_permits())
    }
}

/// A worker that was admitted but not started.
struct ParkedWorker<W: Worker> {
    _worker: W,
    _conn: Connection<W::Response, W::Request>,
    _slot: OwnedSemaphorePermit,
}

/// The admission actor.
pub struct Listener<F: WorkerFactory> {
    factory: F,
    config: ListenerConfig,
    slots: Arc<Semaphore>,
    rx: UnboundedReceiver<ListenerRequest<RequestOf<F>, ResponseOf<F>>>,
    workers: JoinSet<()>,
    parked: Vec<ParkedWorker<F::Worker>>,
}

impl<F: WorkerFactory> Listener<F> {
    /// Start a listener task for `factory`.
    ///
    /// The returned `JoinHandle` completes after FINISH (or after every
    /// handle is dropped) once all in-flight workers have finished.
    pub fn spawn(
        factory: F,
        config: ListenerConfig,
    ) -> (ListenerHandle<RequestOf<F>, ResponseOf<F>>, JoinHandle<()>) {
        let (tx, rx) = unbounded_channel();
        let slots = Arc::new(Semaphore::new(config.max_connections));
        let handle = ListenerHandle {
            tx,
            slots: Arc::clone(&slots),
            max_connections: config.max_connections,
        };
        let listener = Self {
            factory,
            config,
            slots,
            rx,
            workers: JoinSet::new(),
            parked: Vec::new(),
        };
        (handle, tokio::spawn(listener.run()))
    }

    async fn run(mut self) {
        tracing::debug!(
            listener = %self.config.name,
            max_connections = self.config.max_connections,
            "listener started"
        );
        while let Some(request) = self.rx.recv().await {
            match request {
                ListenerRequest::Connect(reply) => {
                    let admission = self.admit();
                    if reply.send(admission).is_err() {
                        tracing::debug!(
                            listener = %self.config.name,
                            "caller left before admission reply"
                        );
                    }
                }
                ListenerRequest::Finish => break,
            }
            self.reap();
        }

        tracing::debug!(
            listener = %self.config.name,
            in_flight = self.workers.len(),
            "listener finishing, draining workers"
        );
        self.rx.close();
        // Fail connection requests queued behind FINISH now, not after the drain.
        while let Ok(request) = self.rx.try_recv() {
            drop(request);
        }
        self.parked.clear();
        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(listener = %self.config.name, error = %e, "worker aborted");
            }
        }
        tracing::debug!(listener = %self.config.name, "listener stopped");
    }

    fn admit(&mut self) -> Admission<RequestOf<F>, ResponseOf<F>> {
        let slot = match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(slot) => slot,
            Err(_) => {
                tracing::warn!(
                    listener = %self.config.name,
                    max_connections = self.config.max_connections,
                    "connection refused: maximum connections reached"
                );
                return Admission::CapacityExceeded;
            }
        };

        let worker = self.factory.new_worker();
        let (caller, endpoint) = channel::pair();
        if self.config.start_workers {
            self.workers.spawn(async move {
                worker.serve(endpoint).await;
                drop(slot);
            });
        } else {
            self.parked.push(ParkedWorker {
                _worker: worker,
                _conn: endpoint,
                _slot: slot,
            });
        }
        tracing::trace!(listener = %self.config.name, "connection admitted");
        Admission::Accepted(caller)
    }

    /// Collect finished worker tasks so the join set does not grow.
    fn reap(&mut self) {
        while let Some(joined) = self.workers.try_join_next() {
            if let Err(e) = joined {
                tracing::warn!(listener = %self.config.name, error = %e, "worker aborted");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Echoes one request back, doubled.
    struct Doubler;

    impl Worker for Doubler {
        type Request = u32;
        type Response = u32;

        async fn serve(self, mut conn: Connection<u32, u32>) {
            if let Ok(n) = conn.recv().await {
                let _ = conn.send(n * 2);
            }
        }
    }

    struct DoublerFactory;

    impl WorkerFactory for DoublerFactory {
        type Worker = Doubler;

        fn new_worker(&mut self) -> Doubler {
            Doubler
        }
    }

    #[tokio::test]
    async fn admitted_connection_reaches_worker() {
        let (handle, task) = Listener::spawn(DoublerFactory, ListenerConfig::new("test", 2));
        let Admission::Accepted(mut conn) = handle.connect().await.unwrap() else {
            panic!("expected admission");
        };
        assert_eq!(conn.request(21).await.unwrap(), 42);
        handle.finish().unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn zero_capacity_rejects_everything() {
        let (handle, _task) = Listener::spawn(DoublerFactory, ListenerConfig::new("test", 0));
        assert!(matches!(
            handle.connect().await.unwrap(),
            Admission::CapacityExceeded
        ));
    }

    #[tokio::test]
    async fn connect_after_finish_fails() {
        let (handle, task) = Listener::spawn(DoublerFactory, ListenerConfig::default());
        handle.finish().unwrap();
        task.await.unwrap();
        assert!(matches!(
            handle.connect().await,
            Err(TriadStreamError::ListenerClosed)
        ));
    }
}
