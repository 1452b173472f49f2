//! A local stand-in for the external evaluator.
//!
//! Production references are substituted by the infrastructure toolchain at
//! apply time. [`LocalEvaluator`] does the same against a [`Store`] so dry runs
//! and tests can check what a reference will resolve to.

use crate::reference::{DeferredReference, ReferenceTarget, SecretName};
use crate::store::Store;
use crate::{DepSpecError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

pub struct LocalEvaluator<'a> {
    store: &'a dyn Store,
}

impl<'a> LocalEvaluator<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Substitute `reference` and decode the value into its declared type.
    pub fn evaluate<T: DeserializeOwned>(&self, reference: &DeferredReference<T>) -> Result<T> {
        let value = self.evaluate_value(reference.target())?;
        serde_json::from_value(value).map_err(|e| {
            DepSpecError::UnresolvedReference(format!(
                "{} does not hold a {}: {}",
                reference,
                reference.value_type(),
                e
            ))
        })
    }

    /// Substitute `target` and return the raw JSON value found there.
    pub fn evaluate_value(&self, target: &ReferenceTarget) -> Result<Value> {
        let (document, path) = match target {
            ReferenceTarget::Secret { secret, path } => {
                let name = self.secret_name(&secret.name)?;
                tracing::debug!(secret = %name, "reading dependency secret");
                let payload = self.store.get_secret(&name)?.ok_or_else(|| {
                    DepSpecError::UnresolvedReference(format!("secret '{}' does not exist", name))
                })?;
                (serde_json::from_str(&payload)?, path)
            }
            ReferenceTarget::Output { output, path } => {
                let value = self.output(&output.unit, &output.key)?;
                (value, path)
            }
        };

        descend(document, path).ok_or_else(|| {
            DepSpecError::UnresolvedReference(format!("{} has no value", target))
        })
    }

    fn secret_name(&self, name: &SecretName) -> Result<String> {
        match name {
            SecretName::Literal { name } => Ok(name.clone()),
            SecretName::Published { output } => match self.output(&output.unit, &output.key)? {
                Value::String(name) => Ok(name),
                other => Err(DepSpecError::UnresolvedReference(format!(
                    "output '{}' of unit '{}' is not a secret name: {}",
                    output.key, output.unit, other
                ))),
            },
        }
    }

    fn output(&self, unit: &str, key: &str) -> Result<Value> {
        self.store.get_output(unit, key)?.ok_or_else(|| {
            DepSpecError::UnresolvedReference(format!(
                "unit '{}' has no output '{}'",
                unit, key
            ))
        })
    }
}

fn descend(mut value: Value, path: &[String]) -> Option<Value> {
    for segment in path {
        value = match value {
            Value::Object(mut map) => map.remove(segment)?,
            _ => return None,
        };
    }
    Some(value)
}
