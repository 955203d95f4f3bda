// Trusted Authority side of the Triad handshake.
//
// Stateless per request: a `TrustedWorker` checks that the outer request, the
// client's sealed claim and the server's sealed claim agree on both
// identities and the challenge, then mints one session key and seals it
// separately for each principal. Forging the outer envelope does not help an
// attacker who cannot also produce both independently keyed claims.

use std::sync::Arc;

use triadstream::{Connection, Worker, WorkerFactory};

use crate::codec::Protection;
use crate::error::{Result, TriadTrustError};
use crate::handshake::messages::{Claim, FieldRecord, KeyGrant, RelayRequest, Reply, TrustedReply};
use crate::registry::KeyRegistry;
use crate::values::SessionKey;

/// Cross-check the three views of one handshake.
fn check_consistent(request: &RelayRequest, client: &Claim, server: &Claim) -> Result<()> {
    if request.client_id != client.client_id || request.client_id != server.client_id {
        return Err(TriadTrustError::Inconsistent("client id"));
    }
    if request.server_id != client.server_id || request.server_id != server.server_id {
        return Err(TriadTrustError::Inconsistent("server id"));
    }
    if request.challenge != client.challenge || request.challenge != server.challenge {
        return Err(TriadTrustError::Inconsistent("challenge"));
    }
    Ok(())
}

/// Worker answering one relay request.
pub struct TrustedWorker {
    registry: Arc<KeyRegistry>,
    protection: Protection,
}

impl TrustedWorker {
    pub fn new(registry: Arc<KeyRegistry>, protection: Protection) -> Self {
        Self {
            registry,
            protection,
        }
    }

    /// Validate a relay request and issue the session key.
    pub fn authorize(&self, request: &RelayRequest) -> Result<TrustedReply> {
        request.validate()?;

        // Both principals must be known before anything is decoded.
        let client_key = self.registry.key(&request.client_id)?;
        let server_key = self.registry.key(&request.server_id)?;

        let client_claim = Claim::open(&request.client_fragment, self.protection, client_key)?;
        let server_claim = Claim::open(&request.server_fragment, self.protection, server_key)?;
        check_consistent(request, &client_claim, &server_claim)?;

        let session_key = SessionKey::generate();
        let client_reply = KeyGrant {
            nonce: client_claim.nonce,
            session_key: session_key.clone(),
        }
        .seal(self.protection, client_key)?;
        let server_reply = KeyGrant {
            nonce: server_claim.nonce,
            session_key,
        }
        .seal(self.protection, server_key)?;

        Ok(TrustedReply {
            challenge: request.challenge,
            client_reply,
            server_reply,
        })
    }
}

impl Worker for TrustedWorker {
    type Request = RelayRequest;
    type Response = Reply<TrustedReply>;

    async fn serve(self, mut conn: Connection<Reply<TrustedReply>, RelayRequest>) {
        let request = match conn.recv().await {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(error = %e, "server left before relay request");
                return;
            }
        };

        let reply = match self.authorize(&request) {
            Ok(reply) => {
                tracing::info!(
                    client = %request.client_id,
                    server = %request.server_id,
                    "session key issued"
                );
                Reply::Message(reply)
            }
            Err(e) => {
                tracing::warn!(
                    client = %request.client_id,
                    server = %request.server_id,
                    kind = e.kind(),
                    error = %e,
                    "relay request refused"
                );
                Reply::Error
            }
        };

        if conn.send(reply).is_err() {
            tracing::debug!("server left before trusted reply");
        }
    }
}

/// Builds a `TrustedWorker` sharing the registry for every admitted
/// connection.
pub struct TrustedFactory {
    registry: Arc<KeyRegistry>,
    protection: Protection,
}

impl TrustedFactory {
    pub fn new(registry: Arc<KeyRegistry>) -> Self {
        Self {
            registry,
            protection: Protection::default(),
        }
    }

    pub fn with_protection(mut self, protection: Protection) -> Self {
        self.protection = protection;
        self
    }
}

impl WorkerFactory for TrustedFactory {
    type Worker = TrustedWorker;

    fn new_worker(&mut self) -> TrustedWorker {
        TrustedWorker::new(Arc::clone(&self.registry), self.protection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::{Challenge, Nonce, PrincipalId, SharedKey};

    const KC: u64 = 1231241;
    const KS: u64 = 777;

    fn id(s: &str) -> PrincipalId {
        PrincipalId::new(s).unwrap()
    }

    fn worker() -> TrustedWorker {
        let registry = KeyRegistry::builder()
            .register(id("A"), SharedKey::new(KC))
            .unwrap()
            .register(id("B"), SharedKey::new(KS))
            .unwrap()
            .build();
        TrustedWorker::new(Arc::new(registry), Protection::Shift)
    }

    fn claim(nonce: u64, challenge: u64, client: &str, server: &str) -> Claim {
        Claim {
            nonce: Nonce::new(nonce),
            challenge: Challenge::new(challenge),
            client_id: id(client),
            server_id: id(server),
        }
    }

    fn request(client_claim: Claim, server_claim: Claim) -> RelayRequest {
        RelayRequest {
            challenge: Challenge::new(500),
            client_id: id("A"),
            server_id: id("B"),
            client_fragment: client_claim
                .seal(Protection::Shift, &SharedKey::new(KC))
                .unwrap(),
            server_fragment: server_claim
                .seal(Protection::Shift, &SharedKey::new(KS))
                .unwrap(),
        }
    }

    #[test]
    fn consistent_request_gets_one_session_key_for_both() {
        let reply = worker()
            .authorize(&request(claim(1, 500, "A", "B"), claim(2, 500, "A", "B")))
            .unwrap();
        assert_eq!(reply.challenge, Challenge::new(500));

        let for_client =
            KeyGrant::open(&reply.client_reply, Protection::Shift, &SharedKey::new(KC)).unwrap();
        let for_server =
            KeyGrant::open(&reply.server_reply, Protection::Shift, &SharedKey::new(KS)).unwrap();
        assert_eq!(for_client.nonce, Nonce::new(1));
        assert_eq!(for_server.nonce, Nonce::new(2));
        assert_eq!(for_client.session_key, for_server.session_key);
    }

    #[test]
    fn fresh_session_key_per_request() {
        let w = worker();
        let req = request(claim(1, 500, "A", "B"), claim(2, 500, "A", "B"));
        let a = w.authorize(&req).unwrap();
        let b = w.authorize(&req).unwrap();
        let key = |r: &TrustedReply| {
            KeyGrant::open(&r.client_reply, Protection::Shift, &SharedKey::new(KC))
                .unwrap()
                .session_key
        };
        assert_ne!(key(&a), key(&b));
    }

    #[test]
    fn challenge_mismatch_in_client_claim() {
        let err = worker()
            .authorize(&request(claim(1, 501, "A", "B"), claim(2, 500, "A", "B")))
            .unwrap_err();
        assert!(matches!(err, TriadTrustError::Inconsistent("challenge")));
    }

    #[test]
    fn client_id_mismatch_in_server_claim() {
        let err = worker()
            .authorize(&request(claim(1, 500, "A", "B"), claim(2, 500, "X", "B")))
            .unwrap_err();
        assert!(matches!(err, TriadTrustError::Inconsistent("client id")));
    }

    #[test]
    fn server_id_mismatch_in_client_claim() {
        let err = worker()
            .authorize(&request(claim(1, 500, "A", "Z"), claim(2, 500, "A", "B")))
            .unwrap_err();
        assert!(matches!(err, TriadTrustError::Inconsistent("server id")));
    }

    #[test]
    fn unknown_principal_rejected_before_decoding() {
        let mut req = request(claim(1, 500, "A", "B"), claim(2, 500, "A", "B"));
        req.server_id = id("C");
        // Undecodable fragments: only the registry check can fail first.
        req.client_fragment = bytes::Bytes::from_static(b"x");
        req.server_fragment = bytes::Bytes::from_static(b"y");
        assert!(matches!(
            worker().authorize(&req),
            Err(TriadTrustError::UnknownPrincipal(p)) if p == "C"
        ));
    }

    #[test]
    fn fragment_under_wrong_key_is_malformed() {
        let mut req = request(claim(1, 500, "A", "B"), claim(2, 500, "A", "B"));
        req.client_fragment = claim(1, 500, "A", "B")
            .seal(Protection::Shift, &SharedKey::new(KS))
            .unwrap();
        assert!(matches!(
            worker().authorize(&req),
            Err(TriadTrustError::Malformed(_))
        ));
    }
}
