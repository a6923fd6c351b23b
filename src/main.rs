//! fwconfig - command-line front end for the configuration store
//!
//! Loads the Unbound model from the configuration document and lets the
//! caller inspect, validate and edit it. Edits follow the same path the web
//! API takes:
//!
//! 1. Load the model from the shared document
//! 2. Apply the submitted values
//! 3. Run `perform_validation` over the changed fields
//! 4. On messages: print them as JSON and exit non-zero, nothing is written
//! 5. Otherwise: serialize the model into the document, save, commit
//!
//! Settings come from `fwconfig.yaml` and `FWCONFIG_*` environment variables
//! (see [`Settings`]); `--config` overrides the document location.

use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use fwconfig::models::HostOverride;
use fwconfig::{APP_NAME, ConfigDocument, FieldPath, Model, Settings, SharedConfig, Unbound, VERSION, ValidationMessages};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "fwconfig")]
#[command(about = "Inspect and edit firewall service configuration", long_about = None)]
struct Cli {
    /// Settings file (defaults to fwconfig.yaml in the working directory)
    #[arg(short, long)]
    settings: Option<Utf8PathBuf>,

    /// Configuration document to operate on
    #[arg(short, long)]
    config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print model values as JSON, optionally only below PATH
    Get { path: Option<String> },
    /// Validate the stored model, or dry-run `PATH=VALUE` assignments
    /// without saving them
    Validate {
        /// Check every field even when assignments are given
        #[arg(long)]
        full: bool,
        #[arg(value_parser = parse_assignment)]
        assignments: Vec<(String, String)>,
    },
    /// Assign values, e.g. `general.port=5353`
    Set {
        #[arg(required = true, value_parser = parse_assignment)]
        assignments: Vec<(String, String)>,
    },
    /// Manage host overrides
    #[command(subcommand)]
    Host(HostCommands),
}

#[derive(Subcommand)]
enum HostCommands {
    /// List host overrides with their row ids
    List,
    /// Add a host override
    Add(HostArgs),
    /// Remove a host override by row id
    Remove { id: String },
}

#[derive(Args)]
struct HostArgs {
    /// Host name, `*` for a wildcard or empty for the domain itself
    #[arg(long, default_value = "")]
    hostname: String,
    #[arg(long)]
    domain: String,
    /// Address the name resolves to
    #[arg(long)]
    server: String,
    #[arg(long, default_value = "")]
    description: String,
}

fn parse_assignment(s: &str) -> Result<(String, String), String> {
    let (path, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected PATH=VALUE, got '{}'", s))?;
    if path.is_empty() {
        return Err(format!("missing path in '{}'", s));
    }
    Ok((path.to_string(), value.to_string()))
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.settings.as_deref()).context("Failed to load settings")?;
    if let Some(config) = cli.config {
        settings.config_path = config;
    }

    // Hold the guard until exit so buffered log lines are flushed
    let _guard = fwconfig::logging::setup_logging(&settings)?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let shared = SharedConfig::open(&settings.config_path)
        .with_context(|| format!("Failed to open {}", settings.config_path))?;
    let mut model = Unbound::new()?;
    shared.read(|doc| model.load(doc))?;

    match cli.command {
        Commands::Get { path } => {
            let values = model.root().flatten();
            let values: serde_json::Map<_, _> = match path {
                Some(prefix) => {
                    let prefix = FieldPath::parse(&prefix).to_string();
                    if prefix.is_empty() || values.contains_key(&prefix) {
                        filter_values(values, |key| prefix.is_empty() || key == prefix)
                    } else {
                        let nested = format!("{}.", prefix);
                        let filtered = filter_values(values, |key| key.starts_with(&nested));
                        if filtered.is_empty() {
                            bail!("Field not found: {}", prefix);
                        }
                        filtered
                    }
                }
                None => filter_values(values, |_| true),
            };
            println!("{}", serde_json::to_string_pretty(&values)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Validate { full, assignments } => {
            let messages = shared.read(|doc| dry_run(doc, &mut model, &assignments, full))?;
            report(&messages)
        }
        Commands::Set { assignments } => {
            model
                .root_mut()
                .set_values(assignments.iter().map(|(p, v)| (p.as_str(), v.as_str())))?;
            report(&apply(&shared, &mut model)?)
        }
        Commands::Host(HostCommands::List) => {
            let hosts: Vec<_> = model
                .hosts()
                .map(|hosts| {
                    hosts
                        .rows()
                        .map(|(id, row)| {
                            let mut entry = serde_json::Map::new();
                            entry.insert("id".to_string(), id.to_string().into());
                            for (name, value) in row.flatten() {
                                entry.insert(name, value.into());
                            }
                            serde_json::Value::Object(entry)
                        })
                        .collect()
                })
                .unwrap_or_default();
            println!("{}", serde_json::to_string_pretty(&hosts)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Host(HostCommands::Add(args)) => {
            let id = model.add_host(&HostOverride {
                hostname: args.hostname,
                domain: args.domain,
                server: args.server,
                description: args.description,
            })?;
            let messages = apply(&shared, &mut model)?;
            if messages.is_empty() {
                println!("{}", id);
            }
            report(&messages)
        }
        Commands::Host(HostCommands::Remove { id }) => {
            if !model.remove_host(&id) {
                bail!("No host override with id {}", id);
            }
            report(&apply(&shared, &mut model)?)
        }
    }
}

fn filter_values<F>(values: indexmap::IndexMap<String, String>, keep: F) -> serde_json::Map<String, serde_json::Value>
where
    F: Fn(&str) -> bool,
{
    values
        .into_iter()
        .filter(|(key, _)| keep(key))
        .map(|(key, value)| (key, serde_json::Value::String(value)))
        .collect()
}

/// Apply `assignments` to the loaded model and validate without saving.
///
/// With no assignments nothing differs from the stored document, so the
/// whole model is checked; otherwise only the assigned fields are, unless
/// `full` is set.
fn dry_run(
    config: &ConfigDocument,
    model: &mut Unbound,
    assignments: &[(String, String)],
    full: bool,
) -> Result<ValidationMessages> {
    model
        .root_mut()
        .set_values(assignments.iter().map(|(p, v)| (p.as_str(), v.as_str())))?;
    let full_model = full || assignments.is_empty();
    Ok(model.perform_validation(config, full_model)?)
}

/// Print messages as JSON; non-empty output means failure.
fn report(messages: &ValidationMessages) -> Result<ExitCode> {
    if messages.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }
    println!("{}", serde_json::to_string_pretty(messages)?);
    Ok(ExitCode::FAILURE)
}

/// Validate the edited model and persist it when no message was raised.
///
/// Returns the messages that blocked the save, empty when it was written.
fn apply(shared: &SharedConfig, model: &mut Unbound) -> Result<ValidationMessages> {
    let messages = shared.read(|doc| model.perform_validation(doc, false))?;
    if !messages.is_empty() {
        tracing::info!("Rejected change with {} validation message(s)", messages.len());
        return Ok(messages);
    }

    shared.try_update(|doc| model.serialize_to_config(doc))?;
    shared
        .save()
        .with_context(|| format!("Failed to save {}", shared.path()))?;
    model.commit();
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORED: &str = "OPNsense:\n  unboundplus:\n    general:\n      port: '99999'\n";

    fn loaded() -> (ConfigDocument, Unbound) {
        let doc = ConfigDocument::from_yaml_str(STORED).unwrap();
        let mut model = Unbound::new().unwrap();
        model.load(&doc).unwrap();
        (doc, model)
    }

    fn assign(path: &str, value: &str) -> (String, String) {
        (path.to_string(), value.to_string())
    }

    #[test]
    fn test_validate_without_assignments_checks_stored_values() {
        let (doc, mut model) = loaded();
        let messages = dry_run(&doc, &mut model, &[], false).unwrap();
        let fields: Vec<_> = messages.iter().map(|m| m.field.as_str()).collect();
        assert_eq!(fields, vec!["general.port"]);
    }

    #[test]
    fn test_dry_run_checks_only_assigned_fields() {
        let (doc, mut model) = loaded();
        let messages = dry_run(&doc, &mut model, &[assign("general.cache_size", "-1")], false).unwrap();
        let fields: Vec<_> = messages.iter().map(|m| m.field.as_str()).collect();
        assert_eq!(fields, vec!["general.cache_size"]);

        let (doc, mut model) = loaded();
        let messages = dry_run(&doc, &mut model, &[assign("general.cache_size", "-1")], true).unwrap();
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn test_dry_run_unknown_path_is_error() {
        let (doc, mut model) = loaded();
        assert!(dry_run(&doc, &mut model, &[assign("general.missing", "1")], false).is_err());
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("general.port=5353").unwrap(),
            assign("general.port", "5353")
        );
        assert_eq!(parse_assignment("general.port=").unwrap(), assign("general.port", ""));
        assert!(parse_assignment("general.port").is_err());
        assert!(parse_assignment("=1").is_err());
    }
}
