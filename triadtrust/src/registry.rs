// Key registry held by the Trusted Authority: principal id -> shared key.
//
// Built once, then only read. Workers share it through an `Arc`.

use std::collections::HashMap;

use crate::error::{Result, TriadTrustError};
use crate::values::{PrincipalId, SharedKey};

#[derive(Debug, Default)]
pub struct KeyRegistry {
    keys: HashMap<PrincipalId, SharedKey>,
}

impl KeyRegistry {
    pub fn builder() -> KeyRegistryBuilder {
        KeyRegistryBuilder::default()
    }

    /// Key registered for `id`.
    pub fn key(&self, id: &PrincipalId) -> Result<&SharedKey> {
        self.keys
            .get(id)
            .ok_or_else(|| TriadTrustError::UnknownPrincipal(id.to_string()))
    }

    pub fn contains(&self, id: &PrincipalId) -> bool {
        self.keys.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Builder for [`KeyRegistry`]. Rejects duplicate registrations.
#[derive(Debug, Default)]
pub struct KeyRegistryBuilder {
    keys: HashMap<PrincipalId, SharedKey>,
}

impl KeyRegistryBuilder {
    pub fn register(mut self, id: PrincipalId, key: SharedKey) -> Result<Self> {
        if self.keys.contains_key(&id) {
            return Err(TriadTrustError::Config(format!(
                "principal {id} registered twice"
            )));
        }
        self.keys.insert(id, key);
        Ok(self)
    }

    pub fn build(self) -> KeyRegistry {
        KeyRegistry { keys: self.keys }
    }
}
