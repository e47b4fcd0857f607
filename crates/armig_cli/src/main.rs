use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use armig_core::error::MigrateError;
use armig_core::{db, rename, repo};

/// Operator entry point for the alert-rule name migration. The cluster-bound
/// phases (export, purge, resync) run inside the owning service, which
/// supplies the cluster clients; this binary drives the file/store phases.
#[derive(Parser)]
#[command(name = "armig", version, about = "Alert rule migration helper")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create (or migrate) the alert-rule store schema.
    InitDb {
        /// Path to the SQLite database file.
        #[arg(long)]
        db: PathBuf,
    },
    /// Phase A: scan for non-canonical rule names and merge them into the
    /// override file for the operator to fill in.
    DiscoverNames {
        #[arg(long)]
        db: PathBuf,
        /// Operator-editable old-name -> new-name YAML file.
        #[arg(long, default_value = "alertname-map.yaml")]
        name_map: PathBuf,
    },
    /// Phase B: apply overrides (or kebab-case slugs), rename rules in the
    /// store and rewrite the audit CSV.
    ApplyRenames {
        #[arg(long)]
        db: PathBuf,
        #[arg(long, default_value = "alertname-map.yaml")]
        name_map: PathBuf,
        /// CSV audit export of every old -> new name mapping.
        #[arg(long, default_value = "alertname-changes.csv")]
        audit_file: PathBuf,
        /// Pause after a successful apply so watchers observe the change.
        #[arg(long, default_value_t = 5)]
        settle_secs: u64,
    },
}

fn run(cli: Cli) -> Result<(), MigrateError> {
    match cli.command {
        Command::InitDb { db } => {
            let mut conn = db::open(&db)?;
            db::migrate(&mut conn)?;
            let rules = repo::count_alert_rules(&conn)?;
            info!(db = %db.display(), rules, "store schema is up to date");
        }
        Command::DiscoverNames { db, name_map } => {
            let mut conn = db::open(&db)?;
            db::migrate(&mut conn)?;
            let summary = rename::discover_noncanonical_names(&conn, &name_map)?;
            info!(
                flagged = summary.flagged,
                added = summary.added.len(),
                name_map = %name_map.display(),
                "non-canonical name discovery finished"
            );
        }
        Command::ApplyRenames {
            db,
            name_map,
            audit_file,
            settle_secs,
        } => {
            let mut conn = db::open(&db)?;
            db::migrate(&mut conn)?;
            let summary = rename::apply_renames(
                &mut conn,
                &name_map,
                &audit_file,
                Duration::from_secs(settle_secs),
            )?;
            info!(
                renamed = summary.renamed,
                audited = summary.audited,
                audit_file = %audit_file.display(),
                "rename apply finished"
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.is_fatal {
                eprintln!("fatal: {e}");
            } else {
                eprintln!("error: {e}");
            }
            if let Some(details) = &e.details {
                eprintln!("  {details}");
            }
            ExitCode::FAILURE
        }
    }
}
