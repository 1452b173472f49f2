use super::{OutputStore, SecretStore, Store};
use crate::{DepSpecError, Result};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use url::Url;

/// Configuration for the in-memory store. It takes no options.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfig {}

impl TryFrom<&Url> for MemoryConfig {
    type Error = DepSpecError;

    fn try_from(url: &Url) -> std::result::Result<Self, Self::Error> {
        if url.scheme() != "memory" {
            return Err(DepSpecError::StoreFailure(format!(
                "Invalid scheme '{}' for memory store",
                url.scheme()
            )));
        }

        Ok(Self::default())
    }
}

#[derive(Debug, Default)]
struct Contents {
    secrets: BTreeMap<String, String>,
    outputs: BTreeMap<(String, String), serde_json::Value>,
}

/// A process-local store. Contents are lost when it is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    contents: Mutex<Contents>,
}

crate::register_store!(
    MemoryStore(MemoryConfig) as "memory",
    "Process-local, nothing is persisted",
    ["memory://"]
);

impl MemoryStore {
    pub fn new(_config: MemoryConfig) -> Self {
        Self::default()
    }

    fn contents(&self) -> Result<MutexGuard<'_, Contents>> {
        self.contents
            .lock()
            .map_err(|_| DepSpecError::StoreFailure("memory store lock poisoned".to_string()))
    }
}

impl SecretStore for MemoryStore {
    fn put_secret(&self, name: &str, payload: &str) -> Result<()> {
        self.contents()?
            .secrets
            .insert(name.to_string(), payload.to_string());
        Ok(())
    }

    fn get_secret(&self, name: &str) -> Result<Option<String>> {
        Ok(self.contents()?.secrets.get(name).cloned())
    }
}

impl OutputStore for MemoryStore {
    fn put_output(&self, unit: &str, key: &str, value: &serde_json::Value) -> Result<()> {
        self.contents()?
            .outputs
            .insert((unit.to_string(), key.to_string()), value.clone());
        Ok(())
    }

    fn get_output(&self, unit: &str, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self
            .contents()?
            .outputs
            .get(&(unit.to_string(), key.to_string()))
            .cloned())
    }
}

impl Store for MemoryStore {
    fn name(&self) -> &'static str {
        Self::STORE_NAME
    }
}
