//! The payloads an owner unit publishes.
//!
//! A [`NamespaceBlob`] partitions dependency data by asset and by dependency kind
//! and is the only thing stored as a secret. A [`SettingsMap`] holds the flat,
//! non-secret settings published through the owner's state outputs. Both use
//! ordered maps so the serialized form is a pure function of the contents.

use crate::{DepSpecError, Result};
use depspec_core::{AttributeShape, AttributeType, PrimitiveType, Schema, SettingType, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Identifies one logical unit being configured, e.g. one application.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AssetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AssetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single attribute value stored under a dependency kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Number(serde_json::Number),
    Boolean(bool),
    Object(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::String(_) => "string",
            AttributeValue::Number(_) => "number",
            AttributeValue::Boolean(_) => "bool",
            AttributeValue::Object(_) => "object",
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        AttributeValue::Number(n.into())
    }
}

/// Attribute values of one dependency kind for one asset.
pub type KindValues = BTreeMap<String, AttributeValue>;

/// Asset id to (partial) mapping of dependency kind to attribute values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceBlob {
    assets: BTreeMap<AssetId, BTreeMap<String, KindValues>>,
}

impl NamespaceBlob {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the values of `kind` for `asset`, replacing any previous values.
    pub fn insert<I, K>(&mut self, asset: impl Into<AssetId>, kind: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = (K, AttributeValue)>,
        K: Into<String>,
    {
        let values = values.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self.assets
            .entry(asset.into())
            .or_default()
            .insert(kind.into(), values);
    }

    pub fn get(&self, asset: &str, kind: &str) -> Option<&KindValues> {
        self.assets.get(&AssetId::from(asset))?.get(kind)
    }

    pub fn assets(&self) -> impl Iterator<Item = &AssetId> {
        self.assets.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Serialize to the compact JSON payload stored in the secret store.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a blob from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_json(&read_payload(path)?)
    }

    /// Check every value against the schema.
    ///
    /// Kinds present for an asset must be declared and carry every attribute of
    /// their shape with the declared type. Assets may omit kinds.
    pub fn validate(&self, schema: &Schema) -> Vec<Violation> {
        let mut violations = Vec::new();

        for (asset, kinds) in &self.assets {
            for (kind, values) in kinds {
                let location = format!("{}.{}", asset, kind);
                match schema.kinds.get(kind) {
                    Some(shape) => check_values(&location, shape, values, &mut violations),
                    None => violations.push(Violation::new(location, "unknown dependency kind")),
                }
            }
        }

        violations
    }
}

/// A single setting value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    String(String),
    List(Vec<String>),
}

impl SettingValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::String(s) => Some(s),
            SettingValue::List(_) => None,
        }
    }
}

impl From<&str> for SettingValue {
    fn from(s: &str) -> Self {
        SettingValue::String(s.to_string())
    }
}

impl From<Vec<String>> for SettingValue {
    fn from(list: Vec<String>) -> Self {
        SettingValue::List(list)
    }
}

/// Setting name to value, published as non-secret state output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsMap {
    settings: BTreeMap<String, SettingValue>,
}

impl SettingsMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<SettingValue>) {
        self.settings.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&SettingValue> {
        self.settings.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SettingValue)> {
        self.settings.iter()
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load settings from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_json(&read_payload(path)?)
    }

    /// Check the settings against the schema: every declared setting present
    /// with its declared type, nothing undeclared.
    pub fn validate(&self, schema: &Schema) -> Vec<Violation> {
        let mut violations = Vec::new();

        for (name, value) in &self.settings {
            let location = format!("settings.{}", name);
            match (schema.settings.get(name), value) {
                (None, _) => violations.push(Violation::new(location, "unknown setting")),
                (Some(SettingType::String), SettingValue::String(_))
                | (Some(SettingType::StringList), SettingValue::List(_)) => {}
                (Some(expected), value) => {
                    let found = match value {
                        SettingValue::String(_) => "string",
                        SettingValue::List(_) => "list(string)",
                    };
                    violations.push(Violation::new(
                        location,
                        format!("expected {}, found {}", ValueType::from(*expected), found),
                    ));
                }
            }
        }

        for name in schema.settings.keys() {
            if !self.settings.contains_key(name) {
                violations.push(Violation::new(
                    format!("settings.{}", name),
                    "missing setting",
                ));
            }
        }

        violations
    }
}

/// One way a payload fails to conform to the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Dotted location, e.g. `svc1.DATABASE.url` or `settings.vpcId`
    pub location: String,
    pub problem: String,
}

impl Violation {
    fn new(location: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            problem: problem.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.problem)
    }
}

/// Turn a list of violations into an error, or `Ok` when there are none.
pub(crate) fn ensure_valid(violations: Vec<Violation>) -> Result<()> {
    if violations.is_empty() {
        return Ok(());
    }

    let lines = violations
        .iter()
        .map(|v| format!("  - {}", v))
        .collect::<Vec<_>>()
        .join("\n");
    Err(DepSpecError::InvalidPayload(lines))
}

fn check_values(
    location: &str,
    shape: &AttributeShape,
    values: &KindValues,
    violations: &mut Vec<Violation>,
) {
    for (name, value) in values {
        let location = format!("{}.{}", location, name);
        match shape.get(name) {
            Some(ty) => check_value(&location, ty, value, violations),
            None => violations.push(Violation::new(location, "unknown attribute")),
        }
    }

    for (name, _) in shape.iter() {
        if !values.contains_key(name) {
            violations.push(Violation::new(
                format!("{}.{}", location, name),
                "missing attribute",
            ));
        }
    }
}

fn check_value(
    location: &str,
    expected: &AttributeType,
    value: &AttributeValue,
    violations: &mut Vec<Violation>,
) {
    match (expected, value) {
        (AttributeType::Primitive(PrimitiveType::String), AttributeValue::String(_))
        | (AttributeType::Primitive(PrimitiveType::Number), AttributeValue::Number(_))
        | (AttributeType::Primitive(PrimitiveType::Boolean), AttributeValue::Boolean(_)) => {}
        (AttributeType::Object(shape), AttributeValue::Object(values)) => {
            check_values(location, shape, values, violations)
        }
        (expected, value) => violations.push(Violation::new(
            location,
            format!(
                "expected {}, found {}",
                ValueType::from(expected),
                value.type_name()
            ),
        )),
    }
}

fn read_payload(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        DepSpecError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read {}: {}", path.display(), e),
        ))
    })
}
