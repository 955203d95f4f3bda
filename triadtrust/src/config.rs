// Deployment configuration for one Trusted Authority, one Server and its
// Clients, loaded from a JSON file.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use triadstream::ListenerConfig;

use crate::codec::Protection;
use crate::error::{Result, TriadTrustError};
use crate::handshake::client::Client;
use crate::handshake::server::{ServerFactory, TrustedHandle};
use crate::handshake::trusted::TrustedFactory;
use crate::logging::LoggingProperties;
use crate::registry::KeyRegistry;
use crate::values::{PrincipalId, SharedKey};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TriadConfig {
    /// Setting for the Trusted Authority
    pub trusted: TrustedProperties,
    /// Setting for the Server
    pub server: ServerProperties,
    /// Clients to run against the Server, in order
    #[serde(default)]
    pub clients: Vec<ClientProperties>,
    /// Fragment protection shared by every role
    #[serde(default)]
    pub protection: Protection,
    /// Upper bound on each request/response hop, in milliseconds
    #[serde(default)]
    pub deadline_ms: Option<u64>,
    /// Setting for logging
    #[serde(default)]
    pub logging: LoggingProperties,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TrustedProperties {
    /// The maximum number of relay requests served concurrently
    pub max_connections: usize,
    /// Every principal the Trusted Authority shares a key with
    pub principals: BTreeMap<PrincipalId, SharedKey>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerProperties {
    pub id: PrincipalId,
    pub key: SharedKey,
    /// The maximum number of client handshakes served concurrently
    pub max_connections: usize,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClientProperties {
    pub id: PrincipalId,
    pub key: SharedKey,
    /// Server the client authenticates towards
    pub server_id: PrincipalId,
}

impl TriadConfig {
    /// Read, parse and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            TriadTrustError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    /// Parse and validate a configuration document.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| TriadTrustError::Config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.trusted.max_connections == 0 {
            return Err(TriadTrustError::Config(
                "trusted.max-connections must be positive".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(TriadTrustError::Config(
                "server.max-connections must be positive".into(),
            ));
        }
        if self.deadline_ms == Some(0) {
            return Err(TriadTrustError::Config("deadline-ms must be positive".into()));
        }
        if self.trusted.principals.is_empty() {
            return Err(TriadTrustError::Config(
                "trusted.principals must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    pub fn registry(&self) -> Result<KeyRegistry> {
        self.trusted
            .principals
            .iter()
            .try_fold(KeyRegistry::builder(), |builder, (id, key)| {
                builder.register(id.clone(), key.clone())
            })
            .map(|builder| builder.build())
    }

    pub fn trusted_listener(&self) -> ListenerConfig {
        ListenerConfig::new("trusted", self.trusted.max_connections)
    }

    pub fn server_listener(&self) -> ListenerConfig {
        ListenerConfig::new(self.server.id.as_str(), self.server.max_connections)
    }

    pub fn trusted_factory(&self) -> Result<TrustedFactory> {
        Ok(TrustedFactory::new(self.registry()?.into()).with_protection(self.protection))
    }

    /// Server factory relaying to the Trusted Authority behind `trusted`.
    pub fn server_factory(&self, trusted: TrustedHandle) -> ServerFactory {
        let factory = ServerFactory::new(self.server.id.clone(), self.server.key.clone(), trusted)
            .with_protection(self.protection);
        match self.deadline() {
            Some(deadline) => factory.with_deadline(deadline),
            None => factory,
        }
    }

    pub fn clients(&self) -> Vec<Client> {
        self.clients
            .iter()
            .map(|c| {
                let client = Client::new(c.id.clone(), c.key.clone(), c.server_id.clone())
                    .with_protection(self.protection);
                match self.deadline() {
                    Some(deadline) => client.with_deadline(deadline),
                    None => client,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "trusted": {
            "max-connections": 4,
            "principals": { "A": 1231241, "B": 4242 }
        },
        "server": { "id": "B", "key": 4242, "max-connections": 2 },
        "clients": [ { "id": "A", "key": 1231241, "server-id": "B" } ],
        "deadline-ms": 500,
        "logging": { "level": "debug", "format": "json" }
    }"#;

    #[test]
    fn sample_parses() {
        let config = TriadConfig::from_json(SAMPLE).unwrap();
        assert_eq!(config.trusted.max_connections, 4);
        assert_eq!(config.trusted.principals.len(), 2);
        assert_eq!(config.server.id.as_str(), "B");
        assert_eq!(config.clients[0].server_id.as_str(), "B");
        assert_eq!(config.protection, Protection::Shift);
        assert_eq!(config.deadline(), Some(Duration::from_millis(500)));
        assert_eq!(config.logging.format, crate::logging::LogFormat::Json);
        assert_eq!(config.registry().unwrap().len(), 2);
        assert_eq!(config.clients().len(), 1);
        assert_eq!(config.server_listener().max_connections, 2);
    }

    #[test]
    fn protection_is_selectable() {
        let raw = SAMPLE.replace(
            r#""deadline-ms": 500"#,
            r#""deadline-ms": 500, "protection": "chacha20-poly1305""#,
        );
        let config = TriadConfig::from_json(&raw).unwrap();
        assert_eq!(config.protection, Protection::ChaCha20Poly1305);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let raw = SAMPLE.replace(r#""max-connections": 2"#, r#""max-connections": 0"#);
        assert!(matches!(
            TriadConfig::from_json(&raw),
            Err(TriadTrustError::Config(_))
        ));
    }

    #[test]
    fn delimiter_in_principal_id_is_rejected() {
        let raw = SAMPLE.replace(r#""A": 1231241"#, r#""A:1": 1231241"#);
        assert!(matches!(
            TriadConfig::from_json(&raw),
            Err(TriadTrustError::Config(_))
        ));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        assert!(matches!(
            TriadConfig::load("/nonexistent/triad.json"),
            Err(TriadTrustError::Config(_))
        ));
    }
}
