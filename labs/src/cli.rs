//! The `labs` command line.
//!
//! ```text
//! labs [--settings FILE] demo <name|all>
//! labs [--settings FILE] demos
//! labs [--settings FILE] dump <model> [--deep] [--one-to-one] [--compact]
//! labs [--settings FILE] changelist <model> [--page N]
//! labs [--settings FILE] check
//! ```
//!
//! Every command runs against a fresh in-memory database seeded with the
//! sample data.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use ormlabs_admin::ChangeListParams;
use ormlabs_core::checks::{has_errors, CheckMessage};
use ormlabs_core::{settings_loader, LabsResult, Settings};
use ormlabs_db::checks::check_all;
use ormlabs_db::serializers::{dump_snapshots, JsonSerializer, PrettyJsonSerializer, Serializer};
use ormlabs_db::{DbExecutor, MemoryDatabase, ModelRegistry, SerializationMixin};

use crate::admin::admin_site;
use crate::fixtures::seed;
use crate::models::registry;
use crate::querysets::{DemoRun, DEMOS};

/// ORM usage labs: serialization, relation traversal and query counts.
#[derive(Debug, Parser)]
#[command(name = "labs", version, about)]
pub struct Cli {
    /// Settings file (`.json` for JSON, TOML otherwise).
    #[arg(long, global = true, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// The subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a query demonstration, or `all` of them.
    Demo {
        /// Demonstration name.
        name: String,
    },
    /// List the demonstrations.
    Demos,
    /// Print every record of a model as JSON snapshots.
    Dump {
        /// Model label (`labs.member`) or name (`member`).
        model: String,
        /// Follow to-one relations.
        #[arg(long)]
        deep: bool,
        /// Also follow reverse one-to-one relations of the records.
        #[arg(long, requires = "deep")]
        one_to_one: bool,
        /// Print on one line.
        #[arg(long)]
        compact: bool,
    },
    /// Print one page of a model's admin change list.
    Changelist {
        /// Model label or name.
        model: String,
        /// Page number, starting at 1.
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Run the model and admin checks.
    Check,
}

/// Loads settings from `path`, or from the environment alone.
pub fn load_settings(path: Option<&Path>) -> LabsResult<Settings> {
    settings_loader::load(path)
}

/// Creates the database the commands run against and seeds it.
///
/// Query recording follows `settings.record_queries`.
pub fn open_database(settings: &Settings) -> LabsResult<MemoryDatabase> {
    let db = MemoryDatabase::from_settings(registry()?, settings)?;
    seed(&db)?;
    db.query_log().clear();
    Ok(db)
}

/// Resolves `member` or `labs.member` to a registered label.
fn model_label(registry: &ModelRegistry, model: &str) -> LabsResult<String> {
    let label = ModelRegistry::resolve_label("labs", model);
    registry.meta(&label)?;
    Ok(label)
}

fn write_run(out: &mut dyn Write, run: &DemoRun) -> std::io::Result<()> {
    for line in &run.lines {
        writeln!(out, "{line}")?;
    }
    writeln!(out, "{}", run.stats.report())
}

fn demo(db: &MemoryDatabase, name: &str, out: &mut dyn Write) -> anyhow::Result<()> {
    if name != "all" {
        let run = crate::querysets::run_demo(db, name)?;
        write_run(out, &run)?;
        return Ok(());
    }
    for demo in DEMOS {
        writeln!(out, "== {} ==", demo.name)?;
        writeln!(out, "{}", demo.summary)?;
        let run = demo
            .run(db)
            .with_context(|| format!("demo {} failed", demo.name))?;
        write_run(out, &run)?;
    }
    Ok(())
}

fn dump(
    db: &MemoryDatabase,
    model: &str,
    deep: bool,
    one_to_one: bool,
    compact: bool,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let label = model_label(db.registry(), model)?;
    let mut snapshots = Vec::new();
    for record in db.all(&label)? {
        if deep {
            snapshots.extend(record.deep_serialize(db, one_to_one)?);
        } else {
            snapshots.extend(record.serialize());
        }
    }
    let serializer: &dyn Serializer = if compact {
        &JsonSerializer
    } else {
        &PrettyJsonSerializer
    };
    writeln!(out, "{}", dump_snapshots(serializer, &snapshots)?)?;
    Ok(())
}

fn changelist(
    db: &MemoryDatabase,
    model: &str,
    page: usize,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let label = model_label(db.registry(), model)?;
    let list = admin_site()?.changelist(db, &label, &ChangeListParams::new().page(page))?;
    writeln!(out, "{}", list.columns.join(" | "))?;
    for row in &list.rows {
        writeln!(out, "{}", row.cells.join(" | "))?;
    }
    writeln!(
        out,
        "{} rows, page {} of {}",
        list.count, list.page, list.total_pages
    )?;
    Ok(())
}

/// Runs the model checks and the admin registration checks.
pub fn run_checks(registry: &ModelRegistry) -> Vec<CheckMessage> {
    let mut messages = check_all(registry);
    if let Err(e) = admin_site() {
        messages.push(CheckMessage::error("admin.E001", e.to_string(), "admin"));
    }
    messages
}

fn check(db: &MemoryDatabase, out: &mut dyn Write) -> anyhow::Result<()> {
    let messages = run_checks(db.registry());
    if messages.is_empty() {
        writeln!(out, "System check identified no issues.")?;
        return Ok(());
    }
    for message in &messages {
        writeln!(out, "{message}")?;
    }
    writeln!(out, "System check identified {} issues.", messages.len())?;
    if has_errors(&messages) {
        bail!("System check found errors");
    }
    Ok(())
}

/// Runs `command` against `db`, writing its output to `out`.
pub fn execute(command: &Command, db: &MemoryDatabase, out: &mut dyn Write) -> anyhow::Result<()> {
    match command {
        Command::Demo { name } => demo(db, name, out),
        Command::Demos => {
            for demo in DEMOS {
                writeln!(out, "{:<38}{}", demo.name, demo.summary)?;
            }
            Ok(())
        }
        Command::Dump {
            model,
            deep,
            one_to_one,
            compact,
        } => dump(db, model, *deep, *one_to_one, *compact, out),
        Command::Changelist { model, page } => changelist(db, model, *page, out),
        Command::Check => check(db, out),
    }
}
