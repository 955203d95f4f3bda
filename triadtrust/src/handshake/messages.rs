// Handshake messages exchanged between Client, Server and Trusted Authority.
//
//   Client                 Server                 Trusted Authority
//     |--- ClientHello ----->|                            |
//     |                      |--- RelayRequest ---------->|
//     |                      |<-- TrustedReply -----------|
//     |<-- ServerReply ------|                            |
//
// Every record also has a positional field form with a fixed arity. Decoded
// fragments (`Claim`, `KeyGrant`) are parsed through the same form, so arity
// and field presence are checked in one place.

use bytes::Bytes;

use crate::codec::{Fragment, Protection};
use crate::error::{Result, TriadTrustError};
use crate::values::{Challenge, Nonce, PrincipalId, SessionKey, SharedKey};

/// Check exact arity and that no field is empty.
fn check_shape(fields: &[Bytes], arity: usize, name: &str) -> Result<()> {
    if fields.len() != arity {
        return Err(TriadTrustError::Malformed(format!(
            "{name}: expected {arity} fields, got {}",
            fields.len()
        )));
    }
    if let Some(i) = fields.iter().position(|f| f.is_empty()) {
        return Err(TriadTrustError::Malformed(format!("{name}: field {i} is empty")));
    }
    Ok(())
}

fn into_array<const N: usize>(fields: Vec<Bytes>, name: &str) -> Result<[Bytes; N]> {
    check_shape(&fields, N, name)?;
    fields
        .try_into()
        .map_err(|_| TriadTrustError::Malformed(format!("{name}: expected {N} fields")))
}

/// A message with a fixed positional field layout.
pub trait FieldRecord: Sized {
    /// Name used in error messages.
    const NAME: &'static str;
    /// Exact number of fields.
    const ARITY: usize;

    fn to_fields(&self) -> Vec<Bytes>;

    fn from_fields(fields: Vec<Bytes>) -> Result<Self>;

    /// Check that every field is present.
    fn validate(&self) -> Result<()> {
        check_shape(&self.to_fields(), Self::ARITY, Self::NAME)
    }

    /// Encode this record as a fragment under `key`.
    fn seal(&self, protection: Protection, key: &SharedKey) -> Result<Fragment> {
        protection.encode(&self.to_fields(), key)
    }

    /// Decode a fragment under `key` and parse it as this record.
    fn open(fragment: &[u8], protection: Protection, key: &SharedKey) -> Result<Self> {
        Self::from_fields(protection.decode(fragment, key)?)
    }
}

/// Answer on a role boundary: either the expected message or the opaque
/// ERROR signal. The reason for an ERROR is never transmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<T> {
    Message(T),
    Error,
}

impl<T> Reply<T> {
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error)
    }

    /// The carried message, or `Rejected` for an ERROR signal.
    pub fn into_message(self) -> Result<T> {
        match self {
            Reply::Message(msg) => Ok(msg),
            Reply::Error => Err(TriadTrustError::Rejected),
        }
    }
}

impl<T> From<Result<T>> for Reply<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(msg) => Reply::Message(msg),
            Err(_) => Reply::Error,
        }
    }
}

// ── Outer messages ───────────────────────────────────────────────────────

/// Message 1: Client -> Server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub challenge: Challenge,
    pub client_id: PrincipalId,
    pub server_id: PrincipalId,
    /// `Claim` sealed under the client's key.
    pub client_fragment: Fragment,
}

impl FieldRecord for ClientHello {
    const NAME: &'static str = "client hello";
    const ARITY: usize = 4;

    fn to_fields(&self) -> Vec<Bytes> {
        vec![
            self.challenge.to_field(),
            self.client_id.to_field(),
            self.server_id.to_field(),
            self.client_fragment.clone(),
        ]
    }

    fn from_fields(fields: Vec<Bytes>) -> Result<Self> {
        let [challenge, client_id, server_id, client_fragment] = into_array(fields, Self::NAME)?;
        Ok(Self {
            challenge: Challenge::from_field(&challenge)?,
            client_id: PrincipalId::from_field(&client_id)?,
            server_id: PrincipalId::from_field(&server_id)?,
            client_fragment,
        })
    }
}

/// Message 2: Server -> Trusted Authority. The client's hello, augmented with
/// the server's own sealed claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRequest {
    pub challenge: Challenge,
    pub client_id: PrincipalId,
    pub server_id: PrincipalId,
    pub client_fragment: Fragment,
    /// `Claim` sealed under the server's key.
    pub server_fragment: Fragment,
}

impl RelayRequest {
    pub fn from_hello(hello: ClientHello, server_fragment: Fragment) -> Self {
        Self {
            challenge: hello.challenge,
            client_id: hello.client_id,
            server_id: hello.server_id,
            client_fragment: hello.client_fragment,
            server_fragment,
        }
    }
}

impl FieldRecord for RelayRequest {
    const NAME: &'static str = "relay request";
    const ARITY: usize = 5;

    fn to_fields(&self) -> Vec<Bytes> {
        vec![
            self.challenge.to_field(),
            self.client_id.to_field(),
            self.server_id.to_field(),
            self.client_fragment.clone(),
            self.server_fragment.clone(),
        ]
    }

    fn from_fields(fields: Vec<Bytes>) -> Result<Self> {
        let [challenge, client_id, server_id, client_fragment, server_fragment] =
            into_array(fields, Self::NAME)?;
        Ok(Self {
            challenge: Challenge::from_field(&challenge)?,
            client_id: PrincipalId::from_field(&client_id)?,
            server_id: PrincipalId::from_field(&server_id)?,
            client_fragment,
            server_fragment,
        })
    }
}

/// Message 3: Trusted Authority -> Server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedReply {
    pub challenge: Challenge,
    /// `KeyGrant` sealed under the client's key.
    pub client_reply: Fragment,
    /// `KeyGrant` sealed under the server's key.
    pub server_reply: Fragment,
}

impl TrustedReply {
    /// Drop the server's own fragment, leaving what the client receives.
    pub fn into_server_reply(self) -> ServerReply {
        ServerReply {
            challenge: self.challenge,
            client_reply: self.client_reply,
        }
    }
}

impl FieldRecord for TrustedReply {
    const NAME: &'static str = "trusted reply";
    const ARITY: usize = 3;

    fn to_fields(&self) -> Vec<Bytes> {
        vec![
            self.challenge.to_field(),
            self.client_reply.clone(),
            self.server_reply.clone(),
        ]
    }

    fn from_fields(fields: Vec<Bytes>) -> Result<Self> {
        let [challenge, client_reply, server_reply] = into_array(fields, Self::NAME)?;
        Ok(Self {
            challenge: Challenge::from_field(&challenge)?,
            client_reply,
            server_reply,
        })
    }
}

/// Message 4: Server -> Client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerReply {
    pub challenge: Challenge,
    pub client_reply: Fragment,
}

impl FieldRecord for ServerReply {
    const NAME: &'static str = "server reply";
    const ARITY: usize = 2;

    fn to_fields(&self) -> Vec<Bytes> {
        vec![self.challenge.to_field(), self.client_reply.clone()]
    }

    fn from_fields(fields: Vec<Bytes>) -> Result<Self> {
        let [challenge, client_reply] = into_array(fields, Self::NAME)?;
        Ok(Self {
            challenge: Challenge::from_field(&challenge)?,
            client_reply,
        })
    }
}

// ── Decoded fragments ────────────────────────────────────────────────────

/// What a principal asserts to the Trusted Authority, sealed under its own
/// key: its nonce plus the challenge and both identities it believes in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub nonce: Nonce,
    pub challenge: Challenge,
    pub client_id: PrincipalId,
    pub server_id: PrincipalId,
}

impl FieldRecord for Claim {
    const NAME: &'static str = "claim";
    const ARITY: usize = 4;

    fn to_fields(&self) -> Vec<Bytes> {
        vec![
            self.nonce.to_field(),
            self.challenge.to_field(),
            self.client_id.to_field(),
            self.server_id.to_field(),
        ]
    }

    fn from_fields(fields: Vec<Bytes>) -> Result<Self> {
        let [nonce, challenge, client_id, server_id] = into_array(fields, Self::NAME)?;
        Ok(Self {
            nonce: Nonce::from_field(&nonce)?,
            challenge: Challenge::from_field(&challenge)?,
            client_id: PrincipalId::from_field(&client_id)?,
            server_id: PrincipalId::from_field(&server_id)?,
        })
    }
}

/// The Trusted Authority's answer to one principal: that principal's nonce
/// echoed back together with the session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyGrant {
    pub nonce: Nonce,
    pub session_key: SessionKey,
}

impl FieldRecord for KeyGrant {
    const NAME: &'static str = "key grant";
    const ARITY: usize = 2;

    fn to_fields(&self) -> Vec<Bytes> {
        vec![self.nonce.to_field(), self.session_key.to_field()]
    }

    fn from_fields(fields: Vec<Bytes>) -> Result<Self> {
        let [nonce, session_key] = into_array(fields, Self::NAME)?;
        Ok(Self {
            nonce: Nonce::from_field(&nonce)?,
            session_key: SessionKey::from_field(&session_key)?,
        })
    }
}
