use clap::Parser;
use labs::cli::{execute, load_settings, open_database, Cli};
use ormlabs_core::logging::setup_logging;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.settings.as_deref())?;
    setup_logging(&settings)?;
    tracing::debug!(environment = %settings.environment, "labs starting");

    let db = open_database(&settings)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(&cli.command, &db, &mut out)
}
