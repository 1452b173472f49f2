use crate::store::{Store, stores};
use crate::{
    BootstrapConfig, BootstrapInputs, DynamicReference, GlobalConfig, GlobalDefaults,
    LocalEvaluator, NamespaceBlob, Publisher, Resolver, Schema, SettingsMap, load_schema,
};
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

/// Main CLI structure for the depspec application.
#[derive(Parser)]
#[command(name = "depspec")]
#[command(about = "Publish environment dependencies once, resolve them everywhere", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an example depspec.toml
    Init {
        /// Overwrite an existing file without asking
        #[arg(short, long)]
        force: bool,
    },
    /// Validate a dependency blob and settings against the schema
    Check {
        #[command(flatten)]
        schema: SchemaArg,
        /// JSON file with the dependency blob
        #[arg(long)]
        blob: PathBuf,
        /// JSON file with the settings map
        #[arg(long)]
        settings: PathBuf,
    },
    /// Publish the dependency blob and settings (owner unit)
    Publish {
        #[command(flatten)]
        schema: SchemaArg,
        #[command(flatten)]
        bootstrap: BootstrapInputs,
        /// JSON file with the dependency blob
        #[arg(long)]
        blob: PathBuf,
        /// JSON file with the settings map
        #[arg(long)]
        settings: PathBuf,
        /// Store backend to publish to
        #[arg(short, long, env = "DEPSPEC_STORE")]
        store: Option<String>,
    },
    /// Print a deferred reference (consumer unit)
    Resolve {
        #[command(subcommand)]
        target: ResolveTarget,
    },
    /// Print the data source declarations backing the references (consumer unit)
    Declarations {
        #[command(flatten)]
        schema: SchemaArg,
        #[command(flatten)]
        bootstrap: BootstrapInputs,
    },
    /// Init or show ~/.config/depspec/config.toml
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ResolveTarget {
    /// Reference into an asset's dependency of one kind
    Dependency {
        /// Asset id, e.g. svc1
        asset: String,
        /// Dependency kind, e.g. DATABASE
        kind: String,
        /// Attribute path, e.g. url or replica host
        #[arg(required = true)]
        path: Vec<String>,
        #[command(flatten)]
        output: ResolveArgs,
    },
    /// Reference into the owner's settings
    Setting {
        /// Setting name, e.g. vpcId
        name: String,
        #[command(flatten)]
        output: ResolveArgs,
    },
}

#[derive(Args)]
struct ResolveArgs {
    #[command(flatten)]
    schema: SchemaArg,
    #[command(flatten)]
    bootstrap: BootstrapInputs,
    /// Print the reference as JSON
    #[arg(long, conflicts_with = "evaluate")]
    json: bool,
    /// Substitute the value from a store instead of printing the expression
    #[arg(long)]
    evaluate: bool,
    /// Store backend to evaluate against
    #[arg(short, long, env = "DEPSPEC_STORE")]
    store: Option<String>,
}

#[derive(Args)]
struct SchemaArg {
    /// Schema file (defaults to the user config, then depspec.toml)
    #[arg(long = "schema", env = "DEPSPEC_SCHEMA")]
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Initialize user configuration
    Init,
    /// Show current configuration
    Show,
}

fn get_example_toml() -> &'static str {
    r#"[project]
name = "platform"
revision = "1.0"

# Every dependency kind lists its attributes and their types
# (string, number or boolean). Tables nest structured attributes.
[kinds.DATABASE]
url = "string"
username = "string"
password = "string"
port = "number"

# [kinds.DATABASE.replica]
# host = "string"

[kinds.SENTRY]
dsn = "string"

# Settings are non-secret values published as state output
# (string or string_list).
[settings]
vpcId = "string"
subnetIds = "string_list"
dependencySecretNamePrefix = "string"
"#
}

/// Main entry point for the depspec CLI application.
pub fn main() -> Result<()> {
    let cli = Cli::parse();
    let global = GlobalConfig::load()
        .wrap_err("Failed to load user configuration")?
        .unwrap_or_default();

    match cli.command {
        Commands::Init { force } => {
            let path = Path::new("depspec.toml");
            if path.exists() && !force {
                use inquire::Confirm;
                let overwrite = Confirm::new("depspec.toml already exists. Overwrite?")
                    .with_default(false)
                    .prompt()?;

                if !overwrite {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            fs::write(path, get_example_toml())?;
            println!("{} Created depspec.toml", "✓".green());
            println!("\nNext steps:");
            println!("  1. depspec config init                       # Set a default store");
            println!("  2. depspec check --blob b.json --settings s.json");
            println!("  3. depspec publish --blob b.json --settings s.json");
            Ok(())
        }
        Commands::Check {
            schema,
            blob,
            settings,
        } => {
            let schema = schema.load(&global)?;
            let (blob, settings) = load_payloads(&blob, &settings)?;

            let mut violations = blob.validate(&schema);
            violations.extend(settings.validate(&schema));

            if violations.is_empty() {
                println!(
                    "{} {} assets and {} settings conform to '{}'",
                    "✓".green(),
                    blob.assets().count(),
                    settings.iter().count(),
                    schema.project.name
                );
                return Ok(());
            }

            for violation in &violations {
                println!(
                    "{} {}: {}",
                    "✗".red(),
                    violation.location.bold(),
                    violation.problem
                );
            }
            Err(eyre!("{} schema violation(s)", violations.len()))
        }
        Commands::Publish {
            schema,
            bootstrap,
            blob,
            settings,
            store,
        } => {
            let schema = schema.load(&global)?;
            let bootstrap = load_bootstrap(bootstrap)?;
            let store = open_store(store, &global.defaults)?;
            let (blob, settings) = load_payloads(&blob, &settings)?;

            let published = Publisher::new(&bootstrap, &schema)?
                .publish(&blob, &settings, store.as_ref())
                .wrap_err("Failed to publish dependencies")?;

            println!(
                "{} Published secret {} to {}",
                "✓".green(),
                published.secret_name().bold(),
                store.name()
            );
            println!(
                "{} Published output {} of unit {}",
                "✓".green(),
                published.settings.key.bold(),
                published.settings.unit
            );
            Ok(())
        }
        Commands::Resolve { target } => match target {
            ResolveTarget::Dependency {
                asset,
                kind,
                path,
                output,
            } => {
                let resolver = output.resolver(&global)?;
                let reference = resolver
                    .get_dependency(&asset, &kind)
                    .and_then(|accessor| accessor.get(path.as_slice()))
                    .wrap_err("Failed to resolve dependency")?;
                output.print(&reference, &global.defaults)
            }
            ResolveTarget::Setting { name, output } => {
                let resolver = output.resolver(&global)?;
                let reference = resolver
                    .get_setting(&name)
                    .wrap_err("Failed to resolve setting")?;
                output.print(&reference, &global.defaults)
            }
        },
        Commands::Declarations { schema, bootstrap } => {
            let resolver = Resolver::new(&load_bootstrap(bootstrap)?, schema.load(&global)?);
            let declarations = resolver
                .declarations()
                .wrap_err("Failed to build declarations")?;
            println!("{}", serde_json::to_string_pretty(&declarations)?);
            Ok(())
        }
        Commands::Config { action } => match action {
            ConfigAction::Init => {
                use inquire::{Select, Text};

                let store_choices: Vec<String> = stores()
                    .into_iter()
                    .map(|info| info.display_with_examples())
                    .collect();
                let selected = Select::new("Select the default store backend:", store_choices)
                    .prompt()?;
                let backend = selected.split(':').next().unwrap_or("memory");

                let store = if backend == "file" {
                    let dir = Text::new("Directory for the file store:")
                        .with_default("/var/lib/depspec")
                        .prompt()?;
                    format!("file://{}", dir)
                } else {
                    format!("{}://", backend)
                };

                let config = GlobalConfig {
                    defaults: GlobalDefaults {
                        store: Some(store),
                        schema: global.defaults.schema.clone(),
                    },
                };
                let path = config.save()?;
                println!("\n{} Configuration saved to {}", "✓".green(), path.display());
                Ok(())
            }
            ConfigAction::Show => {
                match GlobalConfig::load()? {
                    Some(config) => {
                        println!("Configuration file: {}\n", GlobalConfig::path()?.display());
                        match config.defaults.store {
                            Some(store) => println!("Store:  {}", store),
                            None => println!("Store:  (none)"),
                        }
                        match config.defaults.schema {
                            Some(schema) => println!("Schema: {}", schema.display()),
                            None => println!("Schema: depspec.toml"),
                        }
                    }
                    None => {
                        println!("No configuration found. Run 'depspec config init' to create one.");
                    }
                }
                Ok(())
            }
        },
    }
}

impl SchemaArg {
    fn load(&self, global: &GlobalConfig) -> Result<Schema> {
        let path = self
            .path
            .clone()
            .or_else(|| global.defaults.schema.clone())
            .unwrap_or_else(|| PathBuf::from("depspec.toml"));
        load_schema(&path).wrap_err_with(|| format!("Failed to load schema {}", path.display()))
    }
}

impl ResolveArgs {
    fn resolver(&self, global: &GlobalConfig) -> Result<Resolver> {
        let bootstrap = load_bootstrap(self.bootstrap.clone())?;
        Ok(Resolver::new(&bootstrap, self.schema.load(global)?))
    }

    fn print(&self, reference: &DynamicReference, defaults: &GlobalDefaults) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(reference)?);
        } else if self.evaluate {
            let store = open_store(self.store.clone(), defaults)?;
            let value = LocalEvaluator::new(store.as_ref())
                .evaluate(reference)
                .wrap_err("Failed to evaluate reference")?;
            match value {
                serde_json::Value::String(s) => println!("{}", s),
                other => println!("{}", serde_json::to_string_pretty(&other)?),
            }
        } else {
            println!("{}", reference);
        }
        Ok(())
    }
}

fn load_bootstrap(inputs: BootstrapInputs) -> Result<BootstrapConfig> {
    inputs
        .into_config()
        .wrap_err("Invalid bootstrap inputs (see --help for the DEPSPEC_* variables)")
}

fn load_payloads(blob: &Path, settings: &Path) -> Result<(NamespaceBlob, SettingsMap)> {
    let blob = NamespaceBlob::from_path(blob)
        .wrap_err_with(|| format!("Failed to load dependency blob {}", blob.display()))?;
    let settings = SettingsMap::from_path(settings)
        .wrap_err_with(|| format!("Failed to load settings {}", settings.display()))?;
    Ok((blob, settings))
}

fn open_store(store: Option<String>, defaults: &GlobalDefaults) -> Result<Box<dyn Store>> {
    let uri = store.or_else(|| defaults.store.clone()).ok_or_else(|| {
        eyre!(
            "No store configured.\n\nTo fix this, either:\n  1. Run 'depspec config init' to set a default store\n  2. Use --store (e.g. 'depspec publish --store file:///var/lib/depspec')"
        )
    })?;
    Box::<dyn Store>::try_from(uri.as_str()).wrap_err_with(|| format!("Failed to open store '{}'", uri))
}
