//! # depspec
//!
//! Publish environment dependencies once from an owner unit, and resolve them
//! from every consumer unit as typed deferred references.
//!
//! The owner unit publishes a [`NamespaceBlob`] (asset id to dependency kind to
//! attribute values) as a single secret, and a [`SettingsMap`] as a state
//! output. Consumer units never see those values: a [`Resolver`] turns lookup
//! paths into [`DeferredReference`]s whose type is derived from the schema,
//! and the infrastructure toolchain substitutes them at apply time.
//!
//! ## Typed lookups
//!
//! `declare_schema!` reads the schema at compile time and generates one
//! accessor per dependency kind:
//!
//! ```no_run
//! depspec::declare_schema!(toml = r#"
//! [project]
//! name = "platform"
//! revision = "1.0"
//!
//! [kinds.DATABASE]
//! url = "string"
//! port = "number"
//!
//! [settings]
//! vpcId = "string"
//! dependencySecretNamePrefix = "string"
//! "#);
//!
//! fn main() -> depspec::Result<()> {
//!     let bootstrap = depspec::BootstrapConfig::from_env()?;
//!     let schema = depspec::load_schema("depspec.toml".as_ref())?;
//!     let resolver = depspec::Resolver::new(&bootstrap, schema);
//!
//!     let url: depspec::DeferredReference<String> =
//!         resolver.dependency::<dependencies::Database>("svc1")?.url();
//!     let port: depspec::DeferredReference<f64> =
//!         resolver.dependency::<dependencies::Database>("svc1")?.port();
//!     let vpc: depspec::DeferredReference<String> = resolver.setting::<settings::VpcId>()?;
//!
//!     println!("{url} {port} {vpc}");
//!     Ok(())
//! }
//! ```
//!
//! A path the schema does not declare has no accessor method, so it does not
//! compile:
//!
//! ```compile_fail
//! depspec::declare_schema!(toml = r#"
//! [project]
//! name = "platform"
//! revision = "1.0"
//!
//! [kinds.DATABASE]
//! url = "string"
//!
//! [settings]
//! dependencySecretNamePrefix = "string"
//! "#);
//!
//! fn lookup(resolver: &depspec::Resolver) -> depspec::Result<()> {
//!     let _dsn = resolver.dependency::<dependencies::Database>("svc1")?.dsn();
//!     Ok(())
//! }
//! # fn main() {}
//! ```
//!
//! Neither does a kind the schema does not declare:
//!
//! ```compile_fail
//! depspec::declare_schema!(toml = r#"
//! [project]
//! name = "platform"
//! revision = "1.0"
//!
//! [kinds.DATABASE]
//! url = "string"
//!
//! [settings]
//! dependencySecretNamePrefix = "string"
//! "#);
//!
//! fn lookup(resolver: &depspec::Resolver) -> depspec::Result<()> {
//!     let _dsn = resolver.dependency::<dependencies::Sentry>("svc1")?;
//!     Ok(())
//! }
//! # fn main() {}
//! ```
//!
//! ## Runtime lookups
//!
//! When paths are only known at run time, [`Resolver::get_dependency`] and
//! [`Resolver::get_setting`] walk the loaded schema instead and return a
//! schema violation before any reference is built.

extern crate self as depspec;

use std::path::Path;

pub mod blob;
pub mod bootstrap;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
mod error;
pub mod evaluator;
pub mod publisher;
pub mod reference;
pub mod resolver;
pub mod store;

#[cfg(test)]
mod tests;

pub use blob::{AssetId, AttributeValue, NamespaceBlob, SettingValue, SettingsMap, Violation};
pub use bootstrap::{BootstrapConfig, BootstrapInputs, ModeName, UnitMode};
pub use config::{GlobalConfig, GlobalDefaults};
pub use error::{DepSpecError, Result};
pub use evaluator::LocalEvaluator;
pub use publisher::{Published, Publisher};
pub use reference::{
    DeferredReference, DynamicReference, OutputHandle, ReferenceTarget, ReferenceType,
    SecretHandle, SecretName,
};
pub use resolver::{Accessor, DependencyAccessor, DependencyKind, PathCursor, Resolver, Setting};
pub use store::Store;

pub use depspec_core::{
    AttributeShape, AttributeType, ParseError, PathError, PrimitiveType, SECRET_PREFIX_SETTING,
    Schema, SettingType, ValueType,
};

#[cfg(feature = "macros")]
pub use depspec_derive::declare_schema;

#[doc(hidden)]
pub mod __private {
    pub use serde;
}

/// Loads and validates a schema file.
pub fn load_schema(path: &Path) -> Result<Schema> {
    let schema = Schema::try_from(path)?;
    tracing::debug!(
        path = %path.display(),
        project = %schema.project.name,
        kinds = schema.kinds.len(),
        settings = schema.settings.len(),
        "loaded schema"
    );
    Ok(schema)
}
