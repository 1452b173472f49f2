//! The read side: turning lookup paths into deferred references.
//!
//! A [`Resolver`] is built once per run from the validated bootstrap
//! configuration. In a consumer unit it eagerly establishes the two read
//! handles (the dependency secret and the owner's settings output) and from
//! then on only produces [`DeferredReference`]s; it never reads a store and
//! never caches a value. In the owner unit every lookup is refused.
//!
//! Lookups come in two flavours. The typed API ([`Resolver::dependency`],
//! [`Resolver::setting`]) works with the types generated by
//! `declare_schema!`, so an unknown path does not compile. The runtime API
//! ([`Resolver::get_dependency`], [`Resolver::get_setting`]) walks the loaded
//! schema and fails with a schema violation before any reference exists.

use crate::bootstrap::{BootstrapConfig, UnitMode};
use crate::reference::{
    DeferredReference, DynamicReference, OutputHandle, ReferenceTarget, ReferenceType,
    SECRET_DATA_SOURCE, SECRET_LABEL, REMOTE_STATE_DATA_SOURCE, SecretHandle, SecretName,
};
use crate::{DepSpecError, Result};
use depspec_core::{AttributeShape, PathError, Schema, ValueType};
use serde_json::json;

/// A dependency kind with a compile-time accessor, generated by `declare_schema!`.
pub trait DependencyKind {
    /// Name of the kind in the schema, e.g. `DATABASE`.
    const NAME: &'static str;
    type Accessor: Accessor;

    /// The attribute shape the accessor was generated from.
    fn shape() -> AttributeShape;
}

/// A generated accessor positioned at some path inside the dependency secret.
pub trait Accessor: Sized {
    fn from_cursor(cursor: PathCursor) -> Self;
}

/// A setting with a compile-time value type, generated by `declare_schema!`.
pub trait Setting {
    const NAME: &'static str;
    type Value: ReferenceType;
}

/// Position inside the dependency secret that generated accessors build on.
#[derive(Debug, Clone)]
pub struct PathCursor {
    secret: SecretHandle,
    path: Vec<String>,
}

impl PathCursor {
    fn new(secret: SecretHandle, asset: &str, kind: &str) -> Self {
        Self {
            secret,
            path: vec![asset.to_string(), kind.to_string()],
        }
    }

    #[doc(hidden)]
    pub fn child(&self, segment: &str) -> PathCursor {
        let mut path = self.path.clone();
        path.push(segment.to_string());
        PathCursor {
            secret: self.secret.clone(),
            path,
        }
    }

    #[doc(hidden)]
    pub fn leaf<T: ReferenceType>(&self, segment: &str) -> DeferredReference<T> {
        self.child(segment).reference()
    }

    #[doc(hidden)]
    pub fn reference<T: ReferenceType>(&self) -> DeferredReference<T> {
        DeferredReference::new(ReferenceTarget::Secret {
            secret: self.secret.clone(),
            path: self.path.clone(),
        })
    }

    /// `[asset, kind, attribute...]`
    pub fn path(&self) -> &[String] {
        &self.path
    }
}

#[derive(Debug, Clone)]
struct Handles {
    owner_unit: String,
    secret: SecretHandle,
    settings: OutputHandle,
}

/// Resolves lookup paths into deferred references.
#[derive(Debug, Clone)]
pub struct Resolver {
    bootstrap: BootstrapConfig,
    schema: Schema,
    handles: Option<Handles>,
}

impl Resolver {
    pub fn new(bootstrap: &BootstrapConfig, schema: Schema) -> Self {
        let handles = match &bootstrap.mode {
            UnitMode::Owner => None,
            UnitMode::Consumer { owner_unit } => {
                let settings = OutputHandle::settings(owner_unit.as_str());
                let name = match &bootstrap.secret_prefix {
                    Some(prefix) => SecretName::literal(prefix, &bootstrap.environment),
                    None => SecretName::published(owner_unit.as_str()),
                };
                tracing::debug!(
                    owner_unit = %owner_unit,
                    environment = %bootstrap.environment,
                    secret = %name.template(),
                    "established dependency handles"
                );
                Some(Handles {
                    owner_unit: owner_unit.clone(),
                    secret: SecretHandle::new(name),
                    settings,
                })
            }
        };

        Self {
            bootstrap: bootstrap.clone(),
            schema,
            handles,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn bootstrap(&self) -> &BootstrapConfig {
        &self.bootstrap
    }

    /// Typed accessor for `asset`'s dependency of kind `K`.
    ///
    /// Fails if the runtime schema no longer contains every path `K` was
    /// compiled with.
    pub fn dependency<K: DependencyKind>(&self, asset: &str) -> Result<K::Accessor> {
        let handles = self.handles("dependency")?;
        let shape = self.schema.kind(K::NAME)?;
        if !K::shape().is_subset_of(shape) {
            return Err(PathError::Incompatible {
                name: K::NAME.to_string(),
                expected: ValueType::Object(K::shape()).to_string(),
            }
            .into());
        }

        Ok(K::Accessor::from_cursor(PathCursor::new(
            handles.secret.clone(),
            asset,
            K::NAME,
        )))
    }

    /// Typed reference to the setting `S`.
    pub fn setting<S: Setting>(&self) -> Result<DeferredReference<S::Value>> {
        let handles = self.handles("setting")?;
        let declared = self.schema.setting_type(S::NAME)?;
        let expected = S::Value::value_type();
        if declared != expected {
            return Err(PathError::Incompatible {
                name: S::NAME.to_string(),
                expected: expected.to_string(),
            }
            .into());
        }

        Ok(DeferredReference::new(setting_target(handles, S::NAME)))
    }

    /// Runtime accessor for `asset`'s dependency of kind `kind`.
    pub fn get_dependency(&self, asset: &str, kind: &str) -> Result<DependencyAccessor<'_>> {
        let handles = self.handles("get_dependency")?;
        self.schema.kind(kind)?;

        Ok(DependencyAccessor {
            schema: &self.schema,
            kind: kind.to_string(),
            cursor: PathCursor::new(handles.secret.clone(), asset, kind),
        })
    }

    /// Runtime reference to the setting `name`, typed by its declaration.
    pub fn get_setting(&self, name: &str) -> Result<DynamicReference> {
        let handles = self.handles("get_setting")?;
        let value_type = self.schema.setting_type(name)?;
        Ok(DeferredReference::dynamic(
            setting_target(handles, name),
            value_type,
        ))
    }

    /// Data source and provider declarations backing the handles, in the
    /// evaluator's JSON configuration syntax.
    pub fn declarations(&self) -> Result<serde_json::Value> {
        let handles = self.handles("declarations")?;
        let bootstrap = &self.bootstrap;

        Ok(json!({
            "provider": {
                "aws": {
                    "region": bootstrap.region,
                    "allowed_account_ids": [bootstrap.account_id],
                }
            },
            "data": {
                REMOTE_STATE_DATA_SOURCE: {
                    handles.settings.label(): {
                        "backend": "s3",
                        "config": {
                            "bucket": bootstrap.state_bucket,
                            "key": bootstrap.state_key(&handles.owner_unit),
                            "region": bootstrap.region,
                        }
                    }
                },
                SECRET_DATA_SOURCE: {
                    SECRET_LABEL: {
                        "secret_id": handles.secret.name.template(),
                    }
                }
            }
        }))
    }

    fn handles(&self, operation: &'static str) -> Result<&Handles> {
        self.handles
            .as_ref()
            .ok_or(DepSpecError::IllegalModeAccess {
                operation,
                mode: "owner",
            })
    }
}

/// Runtime accessor for one asset's dependency of one kind.
#[derive(Debug, Clone)]
pub struct DependencyAccessor<'a> {
    schema: &'a Schema,
    kind: String,
    cursor: PathCursor,
}

impl DependencyAccessor<'_> {
    /// Reference to the value at `path`, typed by walking the kind's shape.
    ///
    /// A path that stops at a nested object yields the object's type.
    pub fn get<S: AsRef<str>>(&self, path: &[S]) -> Result<DynamicReference> {
        let value_type = self.schema.walk(&self.kind, path)?;

        let mut cursor = self.cursor.clone();
        for segment in path {
            cursor = cursor.child(segment.as_ref());
        }

        Ok(DeferredReference::dynamic(
            ReferenceTarget::Secret {
                secret: cursor.secret,
                path: cursor.path,
            },
            value_type,
        ))
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
}

fn setting_target(handles: &Handles, name: &str) -> ReferenceTarget {
    ReferenceTarget::Output {
        output: handles.settings.clone(),
        path: vec![name.to_string()],
    }
}
