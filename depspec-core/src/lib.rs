//! # depspec core
//!
//! This crate provides the schema format shared by the `depspec` runtime and the
//! `declare_schema!` macro.
//!
//! A schema names the closed set of dependency kinds a deployment knows about, the
//! attribute shape of each kind, and the non-secret settings the owner unit
//! publishes next to the dependency blob. Both the publisher (to reject malformed
//! payloads) and the resolver (to reject illegal lookup paths) consult it, so it is
//! the single source of truth for what a reference may point at.
//!
//! ## Schema file
//!
//! ```toml
//! [project]
//! name = "platform"
//! revision = "1.0"
//!
//! [kinds.DATABASE]
//! url = "string"
//! username = "string"
//! password = "string"
//! port = "number"
//!
//! [kinds.DATABASE.replica]
//! host = "string"
//!
//! [kinds.SENTRY]
//! dsn = "string"
//!
//! [settings]
//! vpcId = "string"
//! subnetIds = "string_list"
//! dependencySecretNamePrefix = "string"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

/// The only schema revision this crate understands.
pub const SUPPORTED_REVISION: &str = "1.0";

/// Setting that carries the secret name prefix; the blob lives at `{prefix}/{environment}`.
pub const SECRET_PREFIX_SETTING: &str = "dependencySecretNamePrefix";

/// The root of a `depspec.toml` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Project metadata
    pub project: ProjectInfo,
    /// Dependency kinds keyed by their identifier (e.g. `DATABASE`)
    pub kinds: BTreeMap<String, AttributeShape>,
    /// Settings keyed by name (e.g. `vpcId`)
    #[serde(default)]
    pub settings: BTreeMap<String, SettingType>,
}

impl Schema {
    /// Validate the schema.
    ///
    /// Ensures that:
    /// - Project name is not empty
    /// - At least one dependency kind is defined and none is empty
    /// - Kind, attribute and setting names are valid identifiers
    /// - The secret prefix setting is declared as a string
    ///
    /// # Errors
    ///
    /// Returns a `ParseError::Validation` describing the first problem found.
    pub fn validate(&self) -> Result<(), ParseError> {
        if self.project.name.is_empty() {
            return Err(ParseError::Validation("Project name cannot be empty".into()));
        }

        if self.kinds.is_empty() {
            return Err(ParseError::Validation(
                "At least one dependency kind must be defined".into(),
            ));
        }

        for (kind, shape) in &self.kinds {
            if !is_valid_identifier(kind) {
                return Err(ParseError::Validation(format!(
                    "Invalid kind name '{}': must be a valid identifier (alphanumeric and underscores, not starting with a number)",
                    kind
                )));
            }
            shape
                .validate()
                .map_err(|e| ParseError::Validation(format!("Kind '{}': {}", kind, e)))?;
        }

        for name in self.settings.keys() {
            if !is_valid_identifier(name) {
                return Err(ParseError::Validation(format!(
                    "Invalid setting name '{}': must be a valid identifier",
                    name
                )));
            }
        }

        match self.settings.get(SECRET_PREFIX_SETTING) {
            Some(SettingType::String) => Ok(()),
            Some(other) => Err(ParseError::Validation(format!(
                "Setting '{}' must be declared as \"string\", found \"{}\"",
                SECRET_PREFIX_SETTING, other
            ))),
            None => Err(ParseError::Validation(format!(
                "Setting '{}' must be declared",
                SECRET_PREFIX_SETTING
            ))),
        }
    }

    /// Get the attribute shape of a dependency kind.
    pub fn kind(&self, name: &str) -> Result<&AttributeShape, PathError> {
        self.kinds
            .get(name)
            .ok_or_else(|| PathError::UnknownKind(name.to_string()))
    }

    /// Walk `path` inside `kind` and return the type found there.
    ///
    /// The path must contain at least one segment. Stopping on a structured
    /// attribute is allowed and yields its object type.
    pub fn walk<S: AsRef<str>>(&self, kind: &str, path: &[S]) -> Result<ValueType, PathError> {
        self.kind(kind)?.walk(kind, path)
    }

    /// Get the declared type of a setting.
    pub fn setting_type(&self, name: &str) -> Result<ValueType, PathError> {
        self.settings
            .get(name)
            .map(|t| ValueType::from(*t))
            .ok_or_else(|| PathError::UnknownSetting(name.to_string()))
    }

    // Internal methods

    fn from_str_checked(content: &str) -> Result<Self, ParseError> {
        let schema: Schema = toml::from_str(content)?;

        if schema.project.revision != SUPPORTED_REVISION {
            return Err(ParseError::UnsupportedRevision(schema.project.revision));
        }

        schema.validate()?;
        Ok(schema)
    }
}

impl FromStr for Schema {
    type Err = ParseError;

    /// Parse and validate a schema from a TOML string.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_checked(s)
    }
}

impl TryFrom<&Path> for Schema {
    type Error = ParseError;

    /// Load and validate a schema from a file path.
    fn try_from(path: &Path) -> Result<Self, Self::Error> {
        let content = fs::read_to_string(path).map_err(|e| {
            ParseError::Io(io::Error::new(
                e.kind(),
                format!("Failed to read {}: {}", path.display(), e),
            ))
        })?;
        Self::from_str_checked(&content)
    }
}

/// Project metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    /// The name of the project
    pub name: String,
    /// Schema format revision (currently must be "1.0")
    pub revision: String,
}

/// Primitive attribute types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    String,
    Number,
    Boolean,
}

impl PrimitiveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveType::String => "string",
            PrimitiveType::Number => "number",
            PrimitiveType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The type of a single attribute: a primitive leaf or a nested shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeType {
    Primitive(PrimitiveType),
    Object(AttributeShape),
}

/// Mapping from attribute name to attribute type for one dependency kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeShape {
    attributes: BTreeMap<String, AttributeType>,
}

impl AttributeShape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&AttributeType> {
        self.attributes.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeType)> {
        self.attributes.iter()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Walk `path` segment by segment; `kind` is only used for error context.
    pub fn walk<S: AsRef<str>>(&self, kind: &str, path: &[S]) -> Result<ValueType, PathError> {
        if path.is_empty() {
            return Err(PathError::EmptyPath {
                kind: kind.to_string(),
            });
        }

        let mut current = self;
        for (i, segment) in path.iter().enumerate() {
            let walked = || join_path(&path[..=i]);
            match current.attributes.get(segment.as_ref()) {
                None => {
                    return Err(PathError::UnknownAttribute {
                        kind: kind.to_string(),
                        path: walked(),
                    });
                }
                Some(AttributeType::Primitive(primitive)) => {
                    if i + 1 < path.len() {
                        return Err(PathError::NotAnObject {
                            kind: kind.to_string(),
                            path: walked(),
                        });
                    }
                    return Ok(ValueType::from(*primitive));
                }
                Some(AttributeType::Object(shape)) => current = shape,
            }
        }

        Ok(ValueType::Object(current.clone()))
    }

    /// Whether every path of `self` exists in `other` with the same type.
    pub fn is_subset_of(&self, other: &AttributeShape) -> bool {
        self.attributes.iter().all(|(name, ty)| match (ty, other.get(name)) {
            (AttributeType::Primitive(a), Some(AttributeType::Primitive(b))) => a == b,
            (AttributeType::Object(a), Some(AttributeType::Object(b))) => a.is_subset_of(b),
            _ => false,
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.attributes.is_empty() {
            return Err("must define at least one attribute".into());
        }

        for (name, ty) in &self.attributes {
            if !is_valid_identifier(name) {
                return Err(format!(
                    "Invalid attribute name '{}': must be a valid identifier",
                    name
                ));
            }
            if let AttributeType::Object(shape) = ty {
                shape
                    .validate()
                    .map_err(|e| format!("Attribute '{}': {}", name, e))?;
            }
        }

        Ok(())
    }
}

impl FromIterator<(String, AttributeType)> for AttributeShape {
    fn from_iter<I: IntoIterator<Item = (String, AttributeType)>>(iter: I) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}

/// Declared type of a setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingType {
    String,
    StringList,
}

impl fmt::Display for SettingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingType::String => f.write_str("string"),
            SettingType::StringList => f.write_str("string_list"),
        }
    }
}

/// The semantic type a reference resolves to.
///
/// Rendered in the evaluator's type syntax: `string`, `number`, `bool`,
/// `list(string)` and `object({name=type,...})`.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueType {
    String,
    Number,
    Boolean,
    StringList,
    Object(AttributeShape),
}

impl From<PrimitiveType> for ValueType {
    fn from(p: PrimitiveType) -> Self {
        match p {
            PrimitiveType::String => ValueType::String,
            PrimitiveType::Number => ValueType::Number,
            PrimitiveType::Boolean => ValueType::Boolean,
        }
    }
}

impl From<SettingType> for ValueType {
    fn from(s: SettingType) -> Self {
        match s {
            SettingType::String => ValueType::String,
            SettingType::StringList => ValueType::StringList,
        }
    }
}

impl From<&AttributeType> for ValueType {
    fn from(t: &AttributeType) -> Self {
        match t {
            AttributeType::Primitive(p) => ValueType::from(*p),
            AttributeType::Object(shape) => ValueType::Object(shape.clone()),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::String => f.write_str("string"),
            ValueType::Number => f.write_str("number"),
            ValueType::Boolean => f.write_str("bool"),
            ValueType::StringList => f.write_str("list(string)"),
            ValueType::Object(shape) => {
                f.write_str("object({")?;
                for (i, (name, ty)) in shape.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}={}", name, ValueType::from(ty))?;
                }
                f.write_str("})")
            }
        }
    }
}

/// Errors that can occur when loading a schema file.
#[derive(Debug)]
pub enum ParseError {
    /// I/O error when reading the schema file
    Io(io::Error),
    /// TOML parsing error
    Toml(toml::de::Error),
    /// Unsupported schema revision
    UnsupportedRevision(String),
    /// Validation error
    Validation(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Io(e) => write!(f, "I/O error: {}", e),
            ParseError::Toml(e) => write!(f, "TOML parsing error: {}", e),
            ParseError::UnsupportedRevision(rev) => {
                write!(
                    f,
                    "Unsupported revision '{}'. Only '{}' is supported.",
                    rev, SUPPORTED_REVISION
                )
            }
            ParseError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Io(e) => Some(e),
            ParseError::Toml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ParseError {
    fn from(e: io::Error) -> Self {
        ParseError::Io(e)
    }
}

impl From<toml::de::Error> for ParseError {
    fn from(e: toml::de::Error) -> Self {
        ParseError::Toml(e)
    }
}

/// A lookup path that does not exist in the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    UnknownKind(String),
    EmptyPath { kind: String },
    UnknownAttribute { kind: String, path: String },
    NotAnObject { kind: String, path: String },
    UnknownSetting(String),
    /// Compiled accessors declare a type the runtime schema no longer has.
    Incompatible { name: String, expected: String },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::UnknownKind(kind) => write!(f, "unknown dependency kind '{}'", kind),
            PathError::EmptyPath { kind } => {
                write!(f, "a lookup into '{}' needs at least one attribute", kind)
            }
            PathError::UnknownAttribute { kind, path } => {
                write!(f, "'{}' is not an attribute of '{}'", path, kind)
            }
            PathError::NotAnObject { kind, path } => {
                write!(f, "'{}' in '{}' is a primitive and has no attributes", path, kind)
            }
            PathError::UnknownSetting(name) => write!(f, "unknown setting '{}'", name),
            PathError::Incompatible { name, expected } => write!(
                f,
                "'{}' was compiled as {} but the schema no longer declares that",
                name, expected
            ),
        }
    }
}

impl std::error::Error for PathError {}

fn join_path<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(".")
}

/// Check if a string is a valid identifier.
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
