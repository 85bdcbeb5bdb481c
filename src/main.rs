//! Expense Ledger: Confidential construction-expense ledger
//!
//! Main entry point for the command-line tool.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use expense_ledger::cli::{self, Cli};
use expense_ledger::config::{LedgerConfig, LogMode};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = LedgerConfig::from_env()?;

    // Initialize logging.
    //
    // stdout carries command output, so logs go to stderr unless a file is
    // requested.
    let (writer, _guard) = match config.log_mode {
        LogMode::File => {
            if let Some(parent) = config.log_file.parent() {
                // Best-effort: don't fail startup just because the directory is missing.
                let _ = std::fs::create_dir_all(parent);
            }

            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.log_file)?;
            tracing_appender::non_blocking(file)
        }
        LogMode::Stderr => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(writer))
        .init();

    tracing::debug!("Database: {:?}", config.db_path);

    let mut stdout = std::io::stdout().lock();
    cli::run(cli, &config, &mut stdout)
}
