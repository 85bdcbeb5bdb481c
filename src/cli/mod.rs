//! Command-line front end.
//!
//! Each invocation takes an exclusive lock next to the provider state file,
//! unseals the provider, opens the ledger in the SQLite store and runs one
//! command. Mutating commands checkpoint the provider state before the store
//! commit. The lock is held until the command returns.

pub mod identity;

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fs4::FileExt;
use zeroize::Zeroizing;

use crate::adapters::elgamal::{ElGamalProvider, InputBuilder};
use crate::adapters::sqlite::SqliteLedgerStore;
use crate::config::{ConfigError, LedgerConfig};
use crate::domain::{CostHandles, DayIndex, Handle, Principal};
use crate::ports::DisclosureRequest;
use crate::ExpenseLedger;

type Ledger = ExpenseLedger<ElGamalProvider, SqliteLedgerStore>;

#[derive(Debug, Parser)]
#[command(name = "expense-ledger")]
#[command(about = "Confidential construction-expense ledger", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate an Ed25519 identity seed
    Keygen {
        /// Output path for the base64 seed
        #[arg(short, long)]
        out: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Create the ledger and a fresh provider key
    Init {
        /// Principal of the project manager (hex)
        #[arg(short, long)]
        manager: Principal,
    },

    /// Encrypt and record one day's costs
    Record {
        /// Submitter identity seed file
        #[arg(short, long)]
        identity: PathBuf,

        /// Day index
        #[arg(short, long)]
        day: DayIndex,

        #[arg(long)]
        material: u32,

        #[arg(long)]
        labor: u32,

        #[arg(long)]
        rental: u32,
    },

    /// Show the handles recorded for a day
    Daily {
        #[arg(short, long)]
        day: DayIndex,
    },

    /// Compute the weekly total starting at a day
    Weekly {
        #[arg(short, long)]
        week_start: DayIndex,
    },

    /// Whether anything was recorded for a day
    Initialized {
        #[arg(short, long)]
        day: DayIndex,
    },

    /// Print the project manager principal
    Manager,

    /// Request disclosure of a handle
    Decrypt {
        /// Requester identity seed file
        #[arg(short, long)]
        identity: PathBuf,

        /// Handle to open (hex)
        #[arg(long)]
        handle: Handle,
    },

    /// List recent notifications
    Events {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

/// Run a parsed command against the configured store and provider state.
///
/// # Errors
/// Returns error if configuration, storage or a ledger operation fails.
pub fn run(cli: Cli, config: &LedgerConfig, out: &mut dyn Write) -> Result<()> {
    execute(cli.command, config, || config.provider_password(), out)
}

fn execute(
    command: Command,
    config: &LedgerConfig,
    password: impl Fn() -> Result<Zeroizing<String>, ConfigError>,
    out: &mut dyn Write,
) -> Result<()> {
    let _lock = match command {
        Command::Keygen { .. } => None,
        _ => Some(lock_state(&config.provider_state_path)?),
    };

    match command {
        Command::Keygen { out: path, force } => {
            let principal = identity::generate(&path, force)?;
            writeln!(out, "Wrote identity seed to {path:?}")?;
            writeln!(out, "principal={principal}")?;
        }

        Command::Init { manager } => {
            if config.provider_state_path.exists() {
                bail!(
                    "Provider state {:?} already exists",
                    config.provider_state_path
                );
            }
            let provider = Arc::new(
                ElGamalProvider::generate().persist_to(&config.provider_state_path, password()?),
            );
            let store = Arc::new(open_store(&config.db_path)?);
            let ledger = ExpenseLedger::create(Arc::clone(&provider), store, manager)?;

            writeln!(out, "ledger={}", ledger.ledger_id())?;
            writeln!(out, "manager={}", ledger.project_manager())?;
            writeln!(out, "encryption_key={}", provider.encryption_key().fingerprint)?;
        }

        Command::Record {
            identity: identity_path,
            day,
            material,
            labor,
            rental,
        } => {
            let (provider, ledger) = open_ledger(config, password()?)?;
            let key = identity::load(&identity_path)?;
            let submitter = Principal::from_verifying_key(&key.verifying_key());

            let input = InputBuilder::new(ledger.ledger_id(), provider.encryption_key())
                .add32(material)
                .add32(labor)
                .add32(rental)
                .encrypt(&key)?;
            let [m, l, r] = input.handles.as_slice() else {
                bail!("Expected three input handles");
            };
            ledger.record_daily_expense(day, m, l, r, &input.proof, &submitter)?;

            writeln!(out, "Recorded day {day} as {submitter}")?;
        }

        Command::Daily { day } => {
            let (_, ledger) = open_ledger(config, password()?)?;
            let expense = ledger.get_daily_expense(day)?;
            writeln!(out, "exists={}", expense.exists)?;
            print_costs(
                out,
                &CostHandles {
                    material: expense.material,
                    labor: expense.labor,
                    rental: expense.rental,
                },
            )?;
        }

        Command::Weekly { week_start } => {
            let (_, ledger) = open_ledger(config, password()?)?;
            let totals = ledger.calculate_weekly_total(week_start)?;
            print_costs(out, &totals)?;
        }

        Command::Initialized { day } => {
            let (_, ledger) = open_ledger(config, password()?)?;
            writeln!(out, "{}", ledger.has_date_initialized(day)?)?;
        }

        Command::Manager => {
            let (_, ledger) = open_ledger(config, password()?)?;
            writeln!(out, "{}", ledger.project_manager())?;
        }

        Command::Decrypt {
            identity: identity_path,
            handle,
        } => {
            let (_, ledger) = open_ledger(config, password()?)?;
            let key = identity::load(&identity_path)?;
            let request = DisclosureRequest::sign(ledger.ledger_id(), handle, &key);
            writeln!(out, "{}", ledger.disclose(&request)?)?;
        }

        Command::Events { limit } => {
            let (_, ledger) = open_ledger(config, password()?)?;
            for event in ledger.events(limit)? {
                writeln!(out, "{event}")?;
            }
        }
    }

    Ok(())
}

fn print_costs(out: &mut dyn Write, costs: &CostHandles) -> Result<()> {
    writeln!(out, "material={}", costs.material)?;
    writeln!(out, "labor={}", costs.labor)?;
    writeln!(out, "rental={}", costs.rental)?;
    Ok(())
}

fn open_store(path: &Path) -> Result<SqliteLedgerStore> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {parent:?}"))?;
    }
    SqliteLedgerStore::new(path).with_context(|| format!("Failed to open database {path:?}"))
}

fn open_ledger(
    config: &LedgerConfig,
    password: Zeroizing<String>,
) -> Result<(Arc<ElGamalProvider>, Ledger)> {
    let provider = Arc::new(
        ElGamalProvider::load(&config.provider_state_path, password).with_context(|| {
            format!(
                "Failed to load provider state {:?}; run `init` first",
                config.provider_state_path
            )
        })?,
    );
    let store = Arc::new(open_store(&config.db_path)?);
    let ledger = ExpenseLedger::open(Arc::clone(&provider), store)?;
    Ok((provider, ledger))
}

/// Take the exclusive lock that serializes commands on one ledger.
///
/// The lock lives on a sibling `.lock` file and is released when the
/// returned handle is dropped.
fn lock_state(state_path: &Path) -> Result<File> {
    if let Some(parent) = state_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {parent:?}"))?;
    }
    let lock_path = state_path.with_extension("lock");
    let file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .with_context(|| format!("Failed to open lock file {lock_path:?}"))?;
    FileExt::try_lock_exclusive(&file)
        .with_context(|| format!("Ledger is busy: another command holds {lock_path:?}"))?;

    tracing::debug!("Locked {lock_path:?}");
    Ok(file)
}
