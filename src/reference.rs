//! Deferred references and the handles they point through.
//!
//! A [`DeferredReference`] is the only thing a consumer unit ever holds for a
//! published value. It names a location (a path inside the dependency secret, or
//! a path inside the owner's settings output) and carries the type the schema
//! declares for it, but never the value itself. Its `Display` form is the
//! interpolation expression the external evaluator substitutes at apply time.

use depspec_core::ValueType;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;

/// Data source type holding the decoded dependency secret.
pub const SECRET_DATA_SOURCE: &str = "aws_secretsmanager_secret_version";
/// Label of the dependency secret data source in consumer units.
pub const SECRET_LABEL: &str = "dependency_secret";
/// Data source type exposing another unit's outputs.
pub const REMOTE_STATE_DATA_SOURCE: &str = "terraform_remote_state";
/// Output key the settings map is published under.
pub const SETTINGS_OUTPUT: &str = "SettingsOutput";
/// Output key the dependency secret's name is published under.
pub const SECRET_NAME_OUTPUT: &str = "DependencySecretName";

/// Location of one output of a deployment unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputHandle {
    pub unit: String,
    pub key: String,
}

impl OutputHandle {
    pub fn new(unit: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            key: key.into(),
        }
    }

    /// The settings output of `unit`.
    pub fn settings(unit: impl Into<String>) -> Self {
        Self::new(unit, SETTINGS_OUTPUT)
    }

    /// Label of the remote state data source that reads this unit's outputs.
    pub fn label(&self) -> String {
        label(&self.unit)
    }

    fn expression(&self) -> String {
        format!(
            "data.{}.{}.outputs.{}",
            REMOTE_STATE_DATA_SOURCE,
            self.label(),
            self.key
        )
    }
}

/// How a consumer names the dependency secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SecretName {
    /// A fixed name, `{prefix}/{environment}`.
    Literal { name: String },
    /// The name the owner unit published alongside the secret.
    Published { output: OutputHandle },
}

impl SecretName {
    pub fn literal(prefix: &str, environment: &str) -> Self {
        SecretName::Literal {
            name: format!("{}/{}", prefix, environment),
        }
    }

    /// The `DependencySecretName` output of `owner_unit`.
    pub fn published(owner_unit: impl Into<String>) -> Self {
        SecretName::Published {
            output: OutputHandle::new(owner_unit, SECRET_NAME_OUTPUT),
        }
    }

    /// The name as the evaluator sees it; published names are an interpolation.
    pub fn template(&self) -> String {
        match self {
            SecretName::Literal { name } => name.clone(),
            SecretName::Published { output } => format!("${{{}}}", output.expression()),
        }
    }
}

/// Location of the dependency secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretHandle {
    pub name: SecretName,
}

impl SecretHandle {
    pub fn new(name: SecretName) -> Self {
        Self { name }
    }

    fn expression(&self) -> String {
        format!(
            "jsondecode(data.{}.{}.secret_string)",
            SECRET_DATA_SOURCE, SECRET_LABEL
        )
    }
}

/// Where a deferred reference points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "store", rename_all = "snake_case")]
pub enum ReferenceTarget {
    /// `[asset, kind, attribute...]` inside the dependency secret.
    Secret {
        secret: SecretHandle,
        path: Vec<String>,
    },
    /// `[setting]` inside an output of the owner unit.
    Output {
        output: OutputHandle,
        path: Vec<String>,
    },
}

impl ReferenceTarget {
    pub fn path(&self) -> &[String] {
        match self {
            ReferenceTarget::Secret { path, .. } | ReferenceTarget::Output { path, .. } => path,
        }
    }

    /// The bare expression, without the `${...}` interpolation wrapper.
    pub fn expression(&self) -> String {
        match self {
            ReferenceTarget::Secret { secret, path } => {
                format!("{}{}", secret.expression(), index(path))
            }
            ReferenceTarget::Output { output, path } => {
                format!("{}{}", output.expression(), index(path))
            }
        }
    }
}

impl fmt::Display for ReferenceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{{}}}", self.expression())
    }
}

/// Rust types a reference can resolve to, with their schema type.
pub trait ReferenceType {
    fn value_type() -> ValueType;
}

impl ReferenceType for String {
    fn value_type() -> ValueType {
        ValueType::String
    }
}

impl ReferenceType for f64 {
    fn value_type() -> ValueType {
        ValueType::Number
    }
}

impl ReferenceType for bool {
    fn value_type() -> ValueType {
        ValueType::Boolean
    }
}

impl ReferenceType for Vec<String> {
    fn value_type() -> ValueType {
        ValueType::StringList
    }
}

/// A typed symbolic pointer to a value that only exists at apply time.
///
/// `T` is the Rust type the value deserializes to once evaluated. References
/// are only built by the resolver, from a schema lookup or a generated
/// accessor, so the declared type always matches the schema entry.
pub struct DeferredReference<T> {
    target: ReferenceTarget,
    value_type: ValueType,
    _value: PhantomData<fn() -> T>,
}

/// A reference whose type is only known from the runtime schema.
pub type DynamicReference = DeferredReference<serde_json::Value>;

impl<T: ReferenceType> DeferredReference<T> {
    pub(crate) fn new(target: ReferenceTarget) -> Self {
        Self {
            target,
            value_type: T::value_type(),
            _value: PhantomData,
        }
    }
}

impl DynamicReference {
    pub(crate) fn dynamic(target: ReferenceTarget, value_type: ValueType) -> Self {
        Self {
            target,
            value_type,
            _value: PhantomData,
        }
    }
}

impl<T> DeferredReference<T> {
    pub fn target(&self) -> &ReferenceTarget {
        &self.target
    }

    /// The schema type of the referenced value.
    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    /// The interpolation expression handed to the evaluator.
    pub fn expression(&self) -> String {
        self.target.to_string()
    }

    /// Forget the static type, keeping the declared schema type.
    pub fn into_dynamic(self) -> DynamicReference {
        DeferredReference {
            target: self.target,
            value_type: self.value_type,
            _value: PhantomData,
        }
    }
}

impl<T> Clone for DeferredReference<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            value_type: self.value_type.clone(),
            _value: PhantomData,
        }
    }
}

impl<T> PartialEq for DeferredReference<T> {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target && self.value_type == other.value_type
    }
}

impl<T> fmt::Debug for DeferredReference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredReference")
            .field("target", &self.target)
            .field("value_type", &self.value_type.to_string())
            .finish()
    }
}

impl<T> fmt::Display for DeferredReference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.target, f)
    }
}

impl<T> Serialize for DeferredReference<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DeferredReference", 3)?;
        state.serialize_field("expression", &self.expression())?;
        state.serialize_field("type", &self.value_type.to_string())?;
        state.serialize_field("target", &self.target)?;
        state.end()
    }
}

/// `["a"]["b"]` with each segment JSON-quoted.
///
/// Quoted strings are templates to the evaluator, so `${` and `%{` are
/// doubled to stay literal.
fn index<S: AsRef<str>>(path: &[S]) -> String {
    path.iter()
        .map(|segment| {
            let quoted = serde_json::Value::from(segment.as_ref())
                .to_string()
                .replace("${", "$${")
                .replace("%{", "%%{");
            format!("[{}]", quoted)
        })
        .collect()
}

/// Data source labels allow letters, digits, `_` and `-`, and may not start with a digit.
fn label(unit: &str) -> String {
    let mut label: String = unit
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !label.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        label.insert(0, '_');
    }
    label
}
