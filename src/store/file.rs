use super::{OutputStore, SecretStore, Store};
use crate::{DepSpecError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use url::Url;

/// Configuration for the file store: the directory it writes under.
#[derive(Debug, Clone)]
pub struct FileConfig {
    pub root: PathBuf,
}

impl TryFrom<&Url> for FileConfig {
    type Error = DepSpecError;

    /// Only `file:///abs/dir` is accepted here; relative shorthands are made
    /// absolute before they become a URL.
    fn try_from(url: &Url) -> std::result::Result<Self, Self::Error> {
        if url.scheme() != "file" {
            return Err(DepSpecError::StoreFailure(format!(
                "Invalid scheme '{}' for file store",
                url.scheme()
            )));
        }
        if let Some(host) = url.host_str().filter(|host| !host.is_empty()) {
            return Err(DepSpecError::StoreFailure(format!(
                "file store URI has a host ('{}'); use file:///abs/dir or file:relative/dir",
                host
            )));
        }

        let root = url.to_file_path().map_err(|()| {
            DepSpecError::StoreFailure(format!("'{}' is not a local directory", url))
        })?;
        if root.parent().is_none() {
            return Err(DepSpecError::StoreFailure(
                "file store needs a directory, e.g. file:///var/lib/depspec".to_string(),
            ));
        }

        Ok(Self { root })
    }
}

/// Stores payloads as JSON files.
///
/// Secrets land in `secrets/<name>.json` (names may contain `/`), outputs in
/// `outputs/<unit>.json` as one object keyed by output key.
#[derive(Debug)]
pub struct FileStore {
    config: FileConfig,
}

crate::register_store!(
    FileStore(FileConfig) as "file",
    "JSON files in a local directory",
    ["file:///var/lib/depspec", "file:state/dev"]
);

impl FileStore {
    pub fn new(config: FileConfig) -> Self {
        Self { config }
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    fn secret_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self
            .config
            .root
            .join("secrets")
            .join(format!("{}.json", checked_name(name)?)))
    }

    fn output_path(&self, unit: &str) -> Result<PathBuf> {
        Ok(self
            .config
            .root
            .join("outputs")
            .join(format!("{}.json", checked_name(unit)?)))
    }

    fn read_outputs(&self, unit: &str) -> Result<BTreeMap<String, serde_json::Value>> {
        let path = self.output_path(unit)?;
        match read(&path)? {
            Some(content) => serde_json::from_str(&content).map_err(|e| {
                DepSpecError::StoreFailure(format!("{} is corrupt: {}", path.display(), e))
            }),
            None => Ok(BTreeMap::new()),
        }
    }
}

impl SecretStore for FileStore {
    fn put_secret(&self, name: &str, payload: &str) -> Result<()> {
        let path = self.secret_path(name)?;
        tracing::debug!(path = %path.display(), "writing secret file");
        write(&path, payload)
    }

    fn get_secret(&self, name: &str) -> Result<Option<String>> {
        read(&self.secret_path(name)?)
    }
}

impl OutputStore for FileStore {
    fn put_output(&self, unit: &str, key: &str, value: &serde_json::Value) -> Result<()> {
        let mut outputs = self.read_outputs(unit)?;
        outputs.insert(key.to_string(), value.clone());

        let path = self.output_path(unit)?;
        tracing::debug!(path = %path.display(), key, "writing output file");
        write(&path, &serde_json::to_string_pretty(&outputs)?)
    }

    fn get_output(&self, unit: &str, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.read_outputs(unit)?.remove(key))
    }
}

impl Store for FileStore {
    fn name(&self) -> &'static str {
        Self::STORE_NAME
    }
}

/// Names become relative paths; they must not escape the store directory.
fn checked_name(name: &str) -> Result<&str> {
    let escapes = name
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if escapes || name.contains('\\') {
        return Err(DepSpecError::StoreFailure(format!(
            "'{}' is not a valid store entry name",
            name
        )));
    }
    Ok(name)
}

fn read(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DepSpecError::StoreFailure(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

fn write(path: &Path, content: &str) -> Result<()> {
    let failure = |e: io::Error| {
        DepSpecError::StoreFailure(format!("Failed to write {}: {}", path.display(), e))
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(failure)?;
    }
    fs::write(path, content).map_err(failure)
}
