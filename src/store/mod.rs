//! # Store backends
//!
//! The publisher hands its payloads to a [`Store`], and the local evaluator
//! reads them back from one. A store combines the two collaborator surfaces a
//! deployment relies on:
//!
//! - a [`SecretStore`], holding one JSON payload per secret name
//! - an [`OutputStore`], holding JSON outputs keyed by unit and output key
//!
//! Production deployments leave both to the infrastructure toolchain; the
//! backends here exist for dry runs, local development and tests.
//!
//! ## URI-Based Configuration
//!
//! ```text
//! memory://
//! file:///var/lib/depspec
//! file:state/dev
//! ```

use crate::{DepSpecError, Result};
use std::convert::TryFrom;
use url::Url;

pub mod file;
pub mod memory;
pub mod macros;

#[cfg(test)]
pub(crate) mod tests;

pub use file::{FileConfig, FileStore};
pub use memory::{MemoryConfig, MemoryStore};

/// Information about a store backend, for listing available backends.
#[derive(Debug, Clone)]
pub struct StoreInfo {
    /// The canonical name of the backend (e.g. "memory", "file").
    pub name: &'static str,
    pub description: &'static str,
    /// Example URIs showing how to configure this backend.
    pub examples: &'static [&'static str],
}

impl StoreInfo {
    /// "name: description (e.g., example1, example2)"
    pub fn display_with_examples(&self) -> String {
        if self.examples.is_empty() {
            format!("{}: {}", self.name, self.description)
        } else {
            format!(
                "{}: {} (e.g., {})",
                self.name,
                self.description,
                self.examples.join(", ")
            )
        }
    }
}

/// Macro support types
pub use macros::{STORE_REGISTRY, StoreRegistration};

/// Returns all registered store backends.
pub fn stores() -> Vec<StoreInfo> {
    STORE_REGISTRY.iter().map(|reg| reg.info.clone()).collect()
}

/// Named secrets holding a serialized payload.
pub trait SecretStore: Send + Sync {
    /// Writes `payload` under `name`, replacing any previous payload.
    fn put_secret(&self, name: &str, payload: &str) -> Result<()>;

    /// Reads the payload stored under `name`, `Ok(None)` if there is none.
    fn get_secret(&self, name: &str) -> Result<Option<String>>;
}

/// Outputs of deployment units, one JSON value per `(unit, key)`.
pub trait OutputStore: Send + Sync {
    fn put_output(&self, unit: &str, key: &str, value: &serde_json::Value) -> Result<()>;

    fn get_output(&self, unit: &str, key: &str) -> Result<Option<serde_json::Value>>;
}

/// A backend providing both surfaces.
pub trait Store: SecretStore + OutputStore {
    /// Returns the name of this backend.
    ///
    /// This should match the name registered with the store macro.
    fn name(&self) -> &'static str;
}

impl TryFrom<String> for Box<dyn Store> {
    type Error = DepSpecError;

    fn try_from(s: String) -> Result<Self> {
        Self::try_from(&s as &str)
    }
}

impl TryFrom<&str> for Box<dyn Store> {
    type Error = DepSpecError;

    /// Creates a store from a URI or a bare backend name.
    ///
    /// Accepts full URIs (`file:///abs/dir`), shorthand paths
    /// (`file:relative/dir`) and bare names (`memory`).
    fn try_from(s: &str) -> Result<Self> {
        Self::try_from(&parse_uri(s)?)
    }
}

/// Normalises a store URI or shorthand into a full URL.
pub(crate) fn parse_uri(s: &str) -> Result<Url> {
    let (scheme, rest) = match s.find(':') {
        Some(pos) => (&s[..pos], &s[pos + 1..]),
        None => (s, ""),
    };

    if !STORE_REGISTRY.iter().any(|reg| reg.info.name == scheme) {
        return Err(DepSpecError::StoreNotFound(scheme.to_string()));
    }

    let invalid = |reason: String| {
        DepSpecError::StoreFailure(format!("Invalid store URI '{}': {}", s, reason))
    };
    let url = match rest {
        "" => Url::parse(&format!("{}://", scheme)),
        r if r.starts_with("//") => Url::parse(&format!("{}:{}", scheme, r)),
        r if r.starts_with('/') => Url::parse(&format!("{}://{}", scheme, r)),
        // A host would swallow (and lowercase) the first directory
        r if scheme == "file" => {
            let dir = std::env::current_dir()?.join(r);
            return Url::from_file_path(&dir)
                .map_err(|()| invalid(format!("{} is not a usable path", dir.display())));
        }
        r => Url::parse(&format!("{}://{}", scheme, r)),
    };
    url.map_err(|e| invalid(e.to_string()))
}

impl TryFrom<&Url> for Box<dyn Store> {
    type Error = DepSpecError;

    fn try_from(url: &Url) -> Result<Self> {
        let scheme = url.scheme();

        let registration = STORE_REGISTRY
            .iter()
            .find(|reg| reg.info.name == scheme)
            .ok_or_else(|| DepSpecError::StoreNotFound(scheme.to_string()))?;

        (registration.open)(url)
    }
}
