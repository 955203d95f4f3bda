// Client side of the Triad handshake.
//
//   Idle --create_hello--> Requesting --process_reply--> Done | Failed
//
// One request/response round, no retry. `handshake` drives both steps over a
// connection obtained from the Server's listener.

use std::fmt;
use std::time::Duration;

use triadstream::{Admission, ListenerHandle};

use crate::codec::Protection;
use crate::error::{Result, TriadTrustError};
use crate::handshake::messages::{Claim, ClientHello, FieldRecord, KeyGrant, Reply, ServerReply};
use crate::handshake::state::ClientState;
use crate::values::{Challenge, Nonce, PrincipalId, SessionKey, SharedKey};

/// Handle on a Server listener, as seen by a client.
pub type ServerHandle = ListenerHandle<ClientHello, Reply<ServerReply>>;

/// Result reported by a client to its own caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// Handshake succeeded; the adopted session key.
    Ok(SessionKey),
    Error,
}

impl HandshakeOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, HandshakeOutcome::Ok(_))
    }

    pub fn session_key(&self) -> Option<&SessionKey> {
        match self {
            HandshakeOutcome::Ok(key) => Some(key),
            HandshakeOutcome::Error => None,
        }
    }
}

impl fmt::Display for HandshakeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeOutcome::Ok(_) => f.write_str("OK"),
            HandshakeOutcome::Error => f.write_str("ERROR"),
        }
    }
}

/// Initiator of the handshake.
pub struct Client {
    id: PrincipalId,
    key: SharedKey,
    server_id: PrincipalId,
    protection: Protection,
    deadline: Option<Duration>,
    state: ClientState,
}

impl Client {
    /// Create a client that will authenticate towards `server_id`.
    pub fn new(id: PrincipalId, key: SharedKey, server_id: PrincipalId) -> Self {
        Self {
            id,
            key,
            server_id,
            protection: Protection::default(),
            deadline: None,
            state: ClientState::Idle,
        }
    }

    pub fn with_protection(mut self, protection: Protection) -> Self {
        self.protection = protection;
        self
    }

    /// Bound the wait for the server's reply.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn id(&self) -> &PrincipalId {
        &self.id
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    /// The adopted session key, once the handshake is done.
    pub fn session_key(&self) -> Option<&SessionKey> {
        match &self.state {
            ClientState::Done { session_key } => Some(session_key),
            _ => None,
        }
    }

    /// Step 1: generate challenge and nonce and build the hello.
    pub fn create_hello(&mut self) -> Result<ClientHello> {
        if !matches!(self.state, ClientState::Idle) {
            return Err(TriadTrustError::InvalidStateTransition {
                from: self.state.label().into(),
                to: "Requesting".into(),
            });
        }

        let challenge = Challenge::generate();
        let nonce = Nonce::generate();
        let claim = Claim {
            nonce,
            challenge,
            client_id: self.id.clone(),
            server_id: self.server_id.clone(),
        };
        let client_fragment = claim.seal(self.protection, &self.key)?;

        self.state = ClientState::Requesting { challenge, nonce };

        Ok(ClientHello {
            challenge,
            client_id: self.id.clone(),
            server_id: self.server_id.clone(),
            client_fragment,
        })
    }

    /// Step 2: validate the server's reply and adopt the session key.
    ///
    /// Any failure moves the client to `Failed`.
    pub fn process_reply(&mut self, reply: Reply<ServerReply>) -> Result<SessionKey> {
        let (challenge, nonce) = match &self.state {
            ClientState::Requesting { challenge, nonce } => (*challenge, *nonce),
            _ => {
                return Err(TriadTrustError::InvalidStateTransition {
                    from: self.state.label().into(),
                    to: "Done".into(),
                });
            }
        };

        match self.validate_reply(challenge, nonce, reply) {
            Ok(session_key) => {
                self.state = ClientState::Done {
                    session_key: session_key.clone(),
                };
                Ok(session_key)
            }
            Err(e) => {
                self.state = ClientState::Failed;
                Err(e)
            }
        }
    }

    fn validate_reply(
        &self,
        challenge: Challenge,
        nonce: Nonce,
        reply: Reply<ServerReply>,
    ) -> Result<SessionKey> {
        let reply = reply.into_message()?;
        reply.validate()?;

        let grant = KeyGrant::open(&reply.client_reply, self.protection, &self.key)?;
        if grant.nonce != nonce {
            return Err(TriadTrustError::NonceMismatch);
        }
        if reply.challenge != challenge {
            return Err(TriadTrustError::ChallengeMismatch);
        }
        Ok(grant.session_key)
    }

    /// Run the whole handshake against a Server listener.
    ///
    /// Protocol, transport and admission failures all end as
    /// `HandshakeOutcome::Error`.
    pub async fn handshake(&mut self, server: &ServerHandle) -> HandshakeOutcome {
        match self.exchange(server).await {
            Ok(session_key) => {
                tracing::info!(client = %self.id, server = %self.server_id, "handshake complete");
                HandshakeOutcome::Ok(session_key)
            }
            Err(e) => {
                tracing::warn!(
                    client = %self.id,
                    server = %self.server_id,
                    kind = e.kind(),
                    error = %e,
                    "handshake failed"
                );
                // Done and Failed are terminal: a refused second attempt
                // leaves them untouched.
                if matches!(self.state, ClientState::Requesting { .. }) {
                    self.state = ClientState::Failed;
                }
                HandshakeOutcome::Error
            }
        }
    }

    async fn exchange(&mut self, server: &ServerHandle) -> Result<SessionKey> {
        let hello = self.create_hello()?;
        let mut conn = match server.connect().await? {
            Admission::Accepted(conn) => conn,
            Admission::CapacityExceeded => return Err(TriadTrustError::CapacityExceeded),
        };
        if let Some(deadline) = self.deadline {
            conn = conn.with_deadline(deadline);
        }

        tracing::debug!(
            client = %self.id,
            server = %self.server_id,
            challenge = %hello.challenge,
            "sending client hello"
        );
        let reply = conn.request(hello).await?;
        self.process_reply(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn client() -> Client {
        Client::new(
            PrincipalId::new("A").unwrap(),
            SharedKey::new(1231241),
            PrincipalId::new("B").unwrap(),
        )
    }

    /// Build the reply a well-behaved server would forward.
    fn reply_for(hello: &ClientHello, nonce: Nonce, session_key: u64) -> Reply<ServerReply> {
        let grant = KeyGrant {
            nonce,
            session_key: SessionKey::new(session_key),
        };
        Reply::Message(ServerReply {
            challenge: hello.challenge,
            client_reply: grant.seal(Protection::Shift, &SharedKey::new(1231241)).unwrap(),
        })
    }

    fn sent_nonce(hello: &ClientHello) -> Nonce {
        Claim::open(&hello.client_fragment, Protection::Shift, &SharedKey::new(1231241))
            .unwrap()
            .nonce
    }

    #[test]
    fn hello_carries_sealed_claim() {
        let mut c = client();
        let hello = c.create_hello().unwrap();
        assert_eq!(hello.client_id.as_str(), "A");
        assert_eq!(hello.server_id.as_str(), "B");

        let claim =
            Claim::open(&hello.client_fragment, Protection::Shift, &SharedKey::new(1231241))
                .unwrap();
        assert_eq!(claim.challenge, hello.challenge);
        assert_eq!(claim.client_id, hello.client_id);
        assert_eq!(claim.server_id, hello.server_id);
        assert_eq!(c.state().label(), "Requesting");
    }

    #[test]
    fn valid_reply_adopts_session_key() {
        let mut c = client();
        let hello = c.create_hello().unwrap();
        let reply = reply_for(&hello, sent_nonce(&hello), 31337);
        assert_eq!(c.process_reply(reply).unwrap(), SessionKey::new(31337));
        assert_eq!(c.session_key(), Some(&SessionKey::new(31337)));
    }

    #[test]
    fn nonce_mismatch_fails() {
        let mut c = client();
        let hello = c.create_hello().unwrap();
        let wrong = Nonce::new(sent_nonce(&hello).value().wrapping_add(1));
        let err = c.process_reply(reply_for(&hello, wrong, 5)).unwrap_err();
        assert!(matches!(err, TriadTrustError::NonceMismatch));
        assert_eq!(c.state().label(), "Failed");
        assert!(c.session_key().is_none());
    }

    #[test]
    fn challenge_mismatch_fails() {
        let mut c = client();
        let hello = c.create_hello().unwrap();
        let mut reply = reply_for(&hello, sent_nonce(&hello), 5);
        if let Reply::Message(r) = &mut reply {
            r.challenge = Challenge::new(hello.challenge.value().wrapping_add(1));
        }
        let err = c.process_reply(reply).unwrap_err();
        assert!(matches!(err, TriadTrustError::ChallengeMismatch));
    }

    #[test]
    fn short_fragment_is_malformed() {
        let mut c = client();
        let hello = c.create_hello().unwrap();
        let reply = Reply::Message(ServerReply {
            challenge: hello.challenge,
            client_reply: crate::codec::shift::encode(&["only-one"], &SharedKey::new(1231241)),
        });
        assert!(matches!(
            c.process_reply(reply),
            Err(TriadTrustError::Malformed(_))
        ));
    }

    #[test]
    fn empty_fragment_is_malformed() {
        let mut c = client();
        let hello = c.create_hello().unwrap();
        let reply = Reply::Message(ServerReply {
            challenge: hello.challenge,
            client_reply: Bytes::new(),
        });
        assert!(matches!(
            c.process_reply(reply),
            Err(TriadTrustError::Malformed(_))
        ));
    }

    #[test]
    fn error_signal_is_rejected() {
        let mut c = client();
        c.create_hello().unwrap();
        assert!(matches!(
            c.process_reply(Reply::Error),
            Err(TriadTrustError::Rejected)
        ));
    }

    #[test]
    fn create_hello_twice_fails() {
        let mut c = client();
        c.create_hello().unwrap();
        assert!(c.create_hello().is_err());
    }

    #[test]
    fn reply_before_hello_fails() {
        let mut c = client();
        assert!(matches!(
            c.process_reply(Reply::Error),
            Err(TriadTrustError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn outcome_displays_as_signal() {
        assert_eq!(HandshakeOutcome::Ok(SessionKey::new(1)).to_string(), "OK");
        assert_eq!(HandshakeOutcome::Error.to_string(), "ERROR");
    }
}
