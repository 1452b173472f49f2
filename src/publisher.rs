//! The write side, run by the owner unit only.

use crate::blob::{NamespaceBlob, SettingsMap, ensure_valid};
use crate::bootstrap::{BootstrapConfig, UnitMode};
use crate::reference::{OutputHandle, SECRET_NAME_OUTPUT, SecretHandle, SecretName};
use crate::store::Store;
use crate::{DepSpecError, Result};
use depspec_core::{SECRET_PREFIX_SETTING, Schema};
use serde_json::Value;

/// Handles to what a publish run wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub secret: SecretHandle,
    pub settings: OutputHandle,
}

impl Published {
    /// The name the dependency secret was written under.
    pub fn secret_name(&self) -> String {
        self.secret.name.template()
    }
}

/// Publishes the dependency blob and the settings map of one environment.
#[derive(Debug)]
pub struct Publisher<'a> {
    bootstrap: &'a BootstrapConfig,
    schema: &'a Schema,
}

impl<'a> Publisher<'a> {
    pub fn new(bootstrap: &'a BootstrapConfig, schema: &'a Schema) -> Result<Self> {
        if let UnitMode::Consumer { .. } = bootstrap.mode {
            return Err(DepSpecError::IllegalModeAccess {
                operation: "publish",
                mode: "consumer",
            });
        }
        Ok(Self { bootstrap, schema })
    }

    /// Validates both payloads, then writes the secret and the outputs.
    ///
    /// Nothing is written unless both payloads conform to the schema.
    /// Republishing overwrites; identical inputs produce identical payloads.
    pub fn publish(
        &self,
        blob: &NamespaceBlob,
        settings: &SettingsMap,
        store: &dyn Store,
    ) -> Result<Published> {
        let mut violations = blob.validate(self.schema);
        violations.extend(settings.validate(self.schema));
        ensure_valid(violations)?;

        let name = self.secret_name(settings)?;
        let payload = blob.to_json()?;
        let unit = self.bootstrap.unit_id.as_str();

        tracing::info!(
            secret = %name,
            environment = %self.bootstrap.environment,
            store = store.name(),
            assets = blob.assets().count(),
            "publishing dependency secret"
        );
        store.put_secret(&name, &payload)?;

        let settings_handle = OutputHandle::settings(unit);
        tracing::info!(
            unit,
            key = %settings_handle.key,
            settings = settings.iter().count(),
            "publishing settings output"
        );
        store.put_output(unit, &settings_handle.key, &settings.to_value()?)?;
        store.put_output(unit, SECRET_NAME_OUTPUT, &Value::String(name.clone()))?;

        Ok(Published {
            secret: SecretHandle::new(SecretName::Literal { name }),
            settings: settings_handle,
        })
    }

    /// `{prefix}/{environment}`, where the prefix is the literal override if
    /// one was configured and the published prefix setting otherwise.
    fn secret_name(&self, settings: &SettingsMap) -> Result<String> {
        let environment = &self.bootstrap.environment;
        if let Some(prefix) = &self.bootstrap.secret_prefix {
            return Ok(format!("{}/{}", prefix, environment));
        }

        let prefix = settings
            .get(SECRET_PREFIX_SETTING)
            .and_then(|value| value.as_str())
            .filter(|prefix| !prefix.is_empty())
            .ok_or_else(|| {
                DepSpecError::InvalidPayload(format!(
                    "  - settings.{}: a non-empty secret name prefix is required",
                    SECRET_PREFIX_SETTING
                ))
            })?;
        Ok(format!("{}/{}", prefix, environment))
    }
}
