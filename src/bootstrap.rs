//! Startup inputs of a deployment unit.
//!
//! [`BootstrapInputs`] collects what the operator passed (flags or `DEPSPEC_*`
//! environment variables). It is validated once into a [`BootstrapConfig`],
//! which is then passed by reference to the publisher and resolver.

use crate::{DepSpecError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;

/// Role of a deployment unit, fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum UnitMode {
    /// Publishes the dependency blob and the settings map.
    Owner,
    /// Resolves references into what `owner_unit` published.
    Consumer { owner_unit: String },
}

impl UnitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitMode::Owner => "owner",
            UnitMode::Consumer { .. } => "consumer",
        }
    }
}

impl fmt::Display for UnitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The mode name given on the command line, before the owner unit is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum ModeName {
    Owner,
    Consumer,
}

impl FromStr for ModeName {
    type Err = DepSpecError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owner" => Ok(ModeName::Owner),
            "consumer" => Ok(ModeName::Consumer),
            other => Err(DepSpecError::InvalidBootstrapInput(format!(
                "unit mode must be 'owner' or 'consumer', got '{}'",
                other
            ))),
        }
    }
}

/// Raw startup inputs; every field may still be missing.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "cli", derive(clap::Args))]
pub struct BootstrapInputs {
    /// Cloud account the unit deploys into
    #[cfg_attr(feature = "cli", arg(long, env = "DEPSPEC_ACCOUNT_ID"))]
    pub account_id: Option<String>,
    /// Cloud region
    #[cfg_attr(feature = "cli", arg(long, env = "DEPSPEC_REGION"))]
    pub region: Option<String>,
    /// Bucket holding the shared remote state
    #[cfg_attr(feature = "cli", arg(long, env = "DEPSPEC_STATE_BUCKET"))]
    pub state_bucket: Option<String>,
    /// Deployment environment, e.g. dev or prod
    #[cfg_attr(feature = "cli", arg(short, long, env = "DEPSPEC_ENVIRONMENT"))]
    pub environment: Option<String>,
    /// Id of this deployment unit
    #[cfg_attr(feature = "cli", arg(long, env = "DEPSPEC_UNIT"))]
    pub unit: Option<String>,
    /// Whether this unit publishes (owner) or resolves (consumer)
    #[cfg_attr(feature = "cli", arg(long, env = "DEPSPEC_MODE", value_enum, ignore_case = true))]
    pub mode: Option<ModeName>,
    /// Unit that published the dependencies (consumer mode only)
    #[cfg_attr(feature = "cli", arg(long, env = "DEPSPEC_OWNER_UNIT"))]
    pub owner_unit: Option<String>,
    /// Literal secret name prefix, instead of the published prefix setting
    #[cfg_attr(feature = "cli", arg(long, env = "DEPSPEC_SECRET_PREFIX"))]
    pub secret_prefix: Option<String>,
}

impl BootstrapInputs {
    /// Reads the `DEPSPEC_*` process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads inputs through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        Ok(Self {
            account_id: get("DEPSPEC_ACCOUNT_ID"),
            region: get("DEPSPEC_REGION"),
            state_bucket: get("DEPSPEC_STATE_BUCKET"),
            environment: get("DEPSPEC_ENVIRONMENT"),
            unit: get("DEPSPEC_UNIT"),
            mode: get("DEPSPEC_MODE").map(|m| m.parse()).transpose()?,
            owner_unit: get("DEPSPEC_OWNER_UNIT"),
            secret_prefix: get("DEPSPEC_SECRET_PREFIX"),
        })
    }

    /// Validates the inputs. Any absent required input is fatal.
    pub fn into_config(self) -> Result<BootstrapConfig> {
        let account_id = required(self.account_id, "account_id")?;
        let region = required(self.region, "region")?;
        let state_bucket = required(self.state_bucket, "state_bucket")?;
        let environment = required(self.environment, "environment")?;
        let unit_id = required(self.unit, "unit")?;

        let mode = match (self.mode, non_empty(self.owner_unit)) {
            (None, _) => return Err(DepSpecError::MissingBootstrapInput("mode")),
            (Some(ModeName::Owner), None) => UnitMode::Owner,
            (Some(ModeName::Owner), Some(owner)) => {
                return Err(DepSpecError::InvalidBootstrapInput(format!(
                    "an owner unit cannot name an owner unit (got '{}')",
                    owner
                )));
            }
            (Some(ModeName::Consumer), Some(owner_unit)) => UnitMode::Consumer { owner_unit },
            (Some(ModeName::Consumer), None) => {
                return Err(DepSpecError::MissingBootstrapInput("owner_unit"));
            }
        };

        if let UnitMode::Consumer { owner_unit } = &mode {
            if owner_unit == &unit_id {
                return Err(DepSpecError::InvalidBootstrapInput(format!(
                    "consumer unit '{}' cannot consume from itself",
                    unit_id
                )));
            }
        }

        Ok(BootstrapConfig {
            account_id,
            region,
            state_bucket,
            environment,
            unit_id,
            mode,
            secret_prefix: non_empty(self.secret_prefix),
        })
    }
}

/// Validated startup configuration of one deployment unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub account_id: String,
    pub region: String,
    pub state_bucket: String,
    pub environment: String,
    pub unit_id: String,
    pub mode: UnitMode,
    /// Literal secret name prefix. The owner writes under it instead of the
    /// `dependencySecretNamePrefix` setting; a consumer addresses it instead of
    /// the secret name the owner published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_prefix: Option<String>,
}

impl BootstrapConfig {
    /// Reads and validates the `DEPSPEC_*` environment variables.
    pub fn from_env() -> Result<Self> {
        BootstrapInputs::from_env()?.into_config()
    }

    pub fn is_owner(&self) -> bool {
        self.mode == UnitMode::Owner
    }

    /// State key of `unit` in the shared bucket.
    pub fn state_key(&self, unit: &str) -> String {
        format!("{}/{}.tfstate", self.environment, unit)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(value: Option<String>, name: &'static str) -> Result<String> {
    non_empty(value).ok_or(DepSpecError::MissingBootstrapInput(name))
}
