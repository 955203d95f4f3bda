// Server side of the Triad handshake.
//
// One `ServerWorker` per accepted client connection. It authenticates the
// client's hello, relays it (augmented with its own sealed claim) to the
// Trusted Authority, checks its own key grant and forwards the client's
// grant. `ServerSession` holds the per-connection state machine without any
// I/O; `ServerWorker` drives it over the two connections.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use triadstream::{Admission, Connection, ListenerHandle, Worker, WorkerFactory};

use crate::codec::Protection;
use crate::error::{Result, TriadTrustError};
use crate::handshake::messages::{
    Claim, ClientHello, FieldRecord, KeyGrant, RelayRequest, Reply, ServerReply, TrustedReply,
};
use crate::handshake::state::ServerState;
use crate::values::{Challenge, Nonce, PrincipalId, SessionKey, SharedKey};

/// Handle on a Trusted Authority listener, as seen by a server.
pub type TrustedHandle = ListenerHandle<RelayRequest, Reply<TrustedReply>>;

/// A session key the server adopted, reported to the server's owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstablishedSession {
    pub client_id: PrincipalId,
    pub session_key: SessionKey,
}

/// Per-connection server state machine.
pub struct ServerSession {
    id: PrincipalId,
    key: SharedKey,
    protection: Protection,
    client_id: Option<PrincipalId>,
    state: ServerState,
}

impl ServerSession {
    pub fn new(id: PrincipalId, key: SharedKey, protection: Protection) -> Self {
        Self {
            id,
            key,
            protection,
            client_id: None,
            state: ServerState::AwaitingHello,
        }
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Identity the client claimed in its hello.
    pub fn client_id(&self) -> Option<&PrincipalId> {
        self.client_id.as_ref()
    }

    pub fn session_key(&self) -> Option<&SessionKey> {
        match &self.state {
            ServerState::Done { session_key } => Some(session_key),
            _ => None,
        }
    }

    /// Validate the client's hello and build the request for the Trusted
    /// Authority.
    pub fn handle_hello(&mut self, hello: ClientHello) -> Result<RelayRequest> {
        if !matches!(self.state, ServerState::AwaitingHello) {
            return Err(TriadTrustError::InvalidStateTransition {
                from: self.state.label().into(),
                to: "AwaitingTrusted".into(),
            });
        }
        let result = self.relay_request(hello);
        if result.is_err() {
            self.state = ServerState::Failed;
        }
        result
    }

    fn relay_request(&mut self, hello: ClientHello) -> Result<RelayRequest> {
        hello.validate()?;
        if hello.server_id != self.id {
            return Err(TriadTrustError::IdentityMismatch {
                expected: self.id.to_string(),
                actual: hello.server_id.to_string(),
            });
        }

        let nonce = Nonce::generate();
        let claim = Claim {
            nonce,
            challenge: hello.challenge,
            client_id: hello.client_id.clone(),
            server_id: hello.server_id.clone(),
        };
        let server_fragment = claim.seal(self.protection, &self.key)?;

        self.client_id = Some(hello.client_id.clone());
        self.state = ServerState::AwaitingTrusted {
            challenge: hello.challenge,
            nonce,
        };
        Ok(RelayRequest::from_hello(hello, server_fragment))
    }

    /// Validate the Trusted Authority's reply and trim it for the client.
    pub fn handle_trusted(&mut self, reply: Reply<TrustedReply>) -> Result<ServerReply> {
        let (challenge, nonce) = match &self.state {
            ServerState::AwaitingTrusted { challenge, nonce } => (*challenge, *nonce),
            _ => {
                return Err(TriadTrustError::InvalidStateTransition {
                    from: self.state.label().into(),
                    to: "Done".into(),
                });
            }
        };

        match self.check_grant(challenge, nonce, reply) {
            Ok((session_key, forward)) => {
                self.state = ServerState::Done { session_key };
                Ok(forward)
            }
            Err(e) => {
                self.state = ServerState::Failed;
                Err(e)
            }
        }
    }

    fn check_grant(
        &self,
        challenge: Challenge,
        nonce: Nonce,
        reply: Reply<TrustedReply>,
    ) -> Result<(SessionKey, ServerReply)> {
        let reply = reply.into_message()?;
        reply.validate()?;

        let grant = KeyGrant::open(&reply.server_reply, self.protection, &self.key)?;
        if grant.nonce != nonce {
            return Err(TriadTrustError::NonceMismatch);
        }
        if reply.challenge != challenge {
            return Err(TriadTrustError::ChallengeMismatch);
        }
        Ok((grant.session_key, reply.into_server_reply()))
    }

    fn fail(&mut self) {
        self.state = ServerState::Failed;
    }
}

/// Worker serving one client connection.
pub struct ServerWorker {
    session: ServerSession,
    trusted: TrustedHandle,
    deadline: Option<Duration>,
    established: Option<UnboundedSender<EstablishedSession>>,
}

impl ServerWorker {
    async fn relay(&mut self, hello: ClientHello) -> Result<ServerReply> {
        let request = self.session.handle_hello(hello)?;

        let mut conn = match self.trusted.connect().await? {
            Admission::Accepted(conn) => conn,
            Admission::CapacityExceeded => return Err(TriadTrustError::CapacityExceeded),
        };
        if let Some(deadline) = self.deadline {
            conn = conn.with_deadline(deadline);
        }

        tracing::debug!(
            server = %self.session.id,
            client = %request.client_id,
            challenge = %request.challenge,
            "relaying to trusted authority"
        );
        let reply = conn.request(request).await?;
        self.session.handle_trusted(reply)
    }

    fn report_established(&self) {
        let (Some(sink), Some(client_id), Some(session_key)) = (
            &self.established,
            self.session.client_id(),
            self.session.session_key(),
        ) else {
            return;
        };
        let session = EstablishedSession {
            client_id: client_id.clone(),
            session_key: session_key.clone(),
        };
        if sink.send(session).is_err() {
            tracing::debug!(server = %self.session.id, "session sink closed");
        }
    }
}

impl Worker for ServerWorker {
    type Request = ClientHello;
    type Response = Reply<ServerReply>;

    async fn serve(mut self, mut conn: Connection<Reply<ServerReply>, ClientHello>) {
        let hello = match conn.recv().await {
            Ok(hello) => hello,
            Err(e) => {
                tracing::debug!(server = %self.session.id, error = %e, "client left before hello");
                return;
            }
        };

        let reply = match self.relay(hello).await {
            Ok(forward) => {
                tracing::info!(
                    server = %self.session.id,
                    client = ?self.session.client_id().map(PrincipalId::as_str),
                    "session key adopted"
                );
                self.report_established();
                Reply::Message(forward)
            }
            Err(e) => {
                tracing::warn!(
                    server = %self.session.id,
                    kind = e.kind(),
                    error = %e,
                    "rejecting client"
                );
                self.session.fail();
                Reply::Error
            }
        };

        if conn.send(reply).is_err() {
            tracing::debug!(server = %self.session.id, "client left before reply");
        }
    }
}

/// Builds a `ServerWorker` for every connection the listener admits.
pub struct ServerFactory {
    id: PrincipalId,
    key: SharedKey,
    protection: Protection,
    trusted: TrustedHandle,
    deadline: Option<Duration>,
    established: Option<UnboundedSender<EstablishedSession>>,
}

impl ServerFactory {
    pub fn new(id: PrincipalId, key: SharedKey, trusted: TrustedHandle) -> Self {
        Self {
            id,
            key,
            protection: Protection::default(),
            trusted,
            deadline: None,
            established: None,
        }
    }

    pub fn with_protection(mut self, protection: Protection) -> Self {
        self.protection = protection;
        self
    }

    /// Bound the wait for the Trusted Authority's reply.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Report every adopted session key on `sink`.
    pub fn with_session_sink(mut self, sink: UnboundedSender<EstablishedSession>) -> Self {
        self.established = Some(sink);
        self
    }
}

impl WorkerFactory for ServerFactory {
    type Worker = ServerWorker;

    fn new_worker(&mut self) -> ServerWorker {
        ServerWorker {
            session: ServerSession::new(self.id.clone(), self.key.clone(), self.protection),
            trusted: self.trusted.clone(),
            deadline: self.deadline,
            established: self.established.clone(),
        }
    }
}
