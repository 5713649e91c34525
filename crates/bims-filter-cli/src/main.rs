//! bims-filter - inspect spatial filter catalogs and saved selections

use anyhow::{bail, Context, Result};
use bims_filter_core::{
    catalog, tree, DropReason, FilterBuilder, FilterConfig, RestoreOutcome, RestoreReport, ScaleNode,
    SerializedGroup, ValueMode,
};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "bims-filter")]
#[command(author = "BIMS Developers")]
#[command(version)]
#[command(about = "Inspect spatial filter catalogs and saved selections", long_about = None)]
struct Cli {
    /// Log restore and catalog details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the filterable fields of a catalog in definition order
    Fields {
        /// Catalog file, or an http(s) URL of the catalog endpoint
        #[arg(short, long)]
        catalog: String,

        /// Print the field definitions as JSON
        #[arg(long)]
        json: bool,

        /// Print the whole catalog hierarchy, keys included
        #[arg(long, conflicts_with = "json")]
        tree: bool,
    },

    /// Render a saved selection as the search expression and its summary
    Render {
        /// Catalog file, or an http(s) URL of the catalog endpoint
        #[arg(short, long)]
        catalog: String,

        /// Saved selection file ("-" reads stdin)
        #[arg(short, long)]
        selection: String,

        /// Print the full selected filter as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the map layers a saved selection highlights
    Layers {
        /// Catalog file, or an http(s) URL of the catalog endpoint
        #[arg(short, long)]
        catalog: String,

        /// Saved selection file ("-" reads stdin)
        #[arg(short, long)]
        selection: String,
    },

    /// Check that a saved selection restores without dropping anything
    Validate {
        /// Catalog file, or an http(s) URL of the catalog endpoint
        #[arg(short, long)]
        catalog: String,

        /// Saved selection file ("-" reads stdin)
        #[arg(short, long)]
        selection: String,
    },
}

/// Saved selections are stored either bare or wrapped in `{"groups": ...}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum SavedSelection {
    Bare(Vec<SerializedGroup>),
    Wrapped { groups: Vec<SerializedGroup> },
}

impl SavedSelection {
    fn into_groups(self) -> Vec<SerializedGroup> {
        match self {
            SavedSelection::Bare(groups) | SavedSelection::Wrapped { groups } => groups,
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Fields {
            catalog,
            json,
            tree,
        } => {
            let payload = load_catalog(&catalog)?;
            if tree {
                print!("{}", outline(&payload));
            } else {
                print!("{}", list_fields(&payload, json)?);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Render {
            catalog,
            selection,
            json,
        } => {
            let (builder, _) = restore(&load_catalog(&catalog)?, read_selection(&selection)?)?;
            print!("{}", render(&builder, json)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Layers { catalog, selection } => {
            let (builder, _) = restore(&load_catalog(&catalog)?, read_selection(&selection)?)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&builder.get_selected_layers())?
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Validate { catalog, selection } => {
            let (_, report) = restore(&load_catalog(&catalog)?, read_selection(&selection)?)?;
            print!("{}", describe_report(&report));
            Ok(if report.is_lossless() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn load_catalog(source: &str) -> Result<Vec<ScaleNode>> {
    if source.starts_with("http://") || source.starts_with("https://") {
        info!("Fetching catalog from {}", source);
        let body = reqwest::blocking::get(source)
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .with_context(|| format!("Failed to fetch catalog from {}", source))?;
        return catalog::parse_payload(&body).context("Catalog response is not a valid payload");
    }
    catalog::read_payload(Path::new(source))
        .with_context(|| format!("Failed to load catalog {}", source))
}

fn read_selection(source: &str) -> Result<Vec<SerializedGroup>> {
    let text = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read selection from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read selection {}", source))?
    };
    parse_selection(&text)
}

fn parse_selection(text: &str) -> Result<Vec<SerializedGroup>> {
    let saved: SavedSelection =
        serde_json::from_str(text).context("Selection must be a list of groups")?;
    Ok(saved.into_groups())
}

fn restore(
    payload: &[ScaleNode],
    groups: Vec<SerializedGroup>,
) -> Result<(FilterBuilder, RestoreReport)> {
    let mut builder = FilterBuilder::with_catalog(FilterConfig::default(), payload)?;
    debug!("Restoring {} groups", groups.len());
    match builder.restore_groups(groups) {
        RestoreOutcome::Restored(report) => Ok((builder, report)),
        RestoreOutcome::Deferred => bail!("Catalog did not load"),
    }
}

fn list_fields(payload: &[ScaleNode], json: bool) -> Result<String> {
    let catalog = bims_filter_core::FilterFieldCatalog::from_payload(payload)?;
    if json {
        return Ok(format!(
            "{}\n",
            serde_json::to_string_pretty(catalog.fields())?
        ));
    }

    let mut out = String::new();
    for field in catalog.fields() {
        let mode = match &field.value_mode {
            ValueMode::Autocomplete => "autocomplete".to_string(),
            ValueMode::StaticList { values } => format!("{} values", values.len()),
        };
        out.push_str(&format!("{}\t{}\t{}\n", field.name, field.key, mode));
    }
    Ok(out)
}

fn outline(payload: &[ScaleNode]) -> String {
    let mut out = String::new();
    tree::walk(payload, |node, depth| {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&node.name);
        if let Some(key) = node.key() {
            out.push_str(&format!(" [{}]", key));
        }
        if node.autocomplete {
            out.push_str(" (autocomplete)");
        }
        out.push('\n');
    });
    out
}

fn render(builder: &FilterBuilder, json: bool) -> Result<String> {
    if json {
        return Ok(format!(
            "{}\n",
            serde_json::to_string_pretty(&builder.get_selected())?
        ));
    }
    Ok(format!("{}\n{}\n", builder.to_human(), builder.to_expr()))
}

fn describe_report(report: &RestoreReport) -> String {
    let mut out = format!(
        "Restored {} groups, {} clauses\n",
        report.groups_restored, report.clauses_restored
    );
    for dropped in &report.dropped_clauses {
        let why = match &dropped.reason {
            DropReason::Unresolvable { field, key } => format!(
                "unknown field {:?} / key {:?}",
                field.as_deref().unwrap_or(""),
                key.as_deref().unwrap_or("")
            ),
            DropReason::DuplicateField(field) => format!("field {:?} already used", field),
        };
        out.push_str(&format!(
            "Dropped group {} clause {}: {}\n",
            dropped.group_index, dropped.clause_index, why
        ));
    }
    if report.groups_dropped > 0 {
        out.push_str(&format!("Dropped {} empty groups\n", report.groups_dropped));
    }
    if report.seeded_default {
        out.push_str("Nothing restored, seeded a default group\n");
    }
    out
}
