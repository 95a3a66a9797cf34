//! `flash` — operate an expiring-deposit token ledger kept in a state file.
//!
//! Usage:
//!   flash init [--config ledger.json] [--force]
//!   flash mint --caller <id> --to <id> --amount <tokens>
//!   flash transfer --from <id> --to <id> --amount <tokens>
//!   flash balance <id>
//!   flash supply
//!   flash inspect <id>
//!   flash events
//!   flash verify
//!
//! `--at <unix-secs>` evaluates the command at a chosen instant, which is how
//! days are "spent" when exploring expiry by hand.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flash_ledger::{format_units, parse_units, Amount, LedgerConfig, Timestamp, SECONDS_PER_DAY};
use tracing_subscriber::EnvFilter;

mod state;

use state::CliLedger;

#[derive(Parser)]
#[command(name = "flash")]
#[command(about = "Expiring-deposit token ledger CLI")]
#[command(version)]
struct Cli {
    /// Ledger state file
    #[arg(short, long, default_value = "flash_state.json")]
    state: PathBuf,

    /// Evaluate the command at this unix time instead of the wall clock
    #[arg(long)]
    at: Option<Timestamp>,

    /// Amounts are given and printed in smallest units
    #[arg(long)]
    raw: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new ledger and credit the genesis reserve
    Init {
        /// JSON ledger config; defaults apply to missing fields
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Overwrite an existing state file
        #[arg(long)]
        force: bool,
    },

    /// Issue new supply (issuer only)
    Mint {
        #[arg(long)]
        caller: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: String,
    },

    /// Move live balance between accounts
    Transfer {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: String,
    },

    /// Spendable balance of an account
    Balance { account: String },

    /// Total, decayed and live supply
    Supply,

    /// List an account's batches with their ages
    Inspect { account: String },

    /// Print the event log as JSON lines
    Events,

    /// Check the state file's root and supply accounting
    Verify,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { config, force } => {
            let config = match config {
                Some(path) => LedgerConfig::from_json_file(&path)
                    .with_context(|| format!("load config {}", path.display()))?,
                None => LedgerConfig::default(),
            };
            let ledger = state::create(&cli.state, config, cli.at, force)?;
            let reserve = &ledger.config().reserve_account;
            println!(
                "initialised {} ({}) → {}",
                ledger.token().name,
                ledger.token().symbol,
                cli.state.display()
            );
            println!(
                "reserve {reserve}: {}",
                show(&ledger, ledger.balance_of(reserve), cli.raw)
            );
        }
        Commands::Mint { caller, to, amount } => {
            let ledger = state::open(&cli.state, cli.at)?;
            let amount = amount_arg(&ledger, &amount, cli.raw)?;
            ledger.mint(&caller, &to, amount)?;
            state::save(&cli.state, &ledger)?;
            println!(
                "minted {} to {to}; balance {}",
                show(&ledger, amount, cli.raw),
                show(&ledger, ledger.balance_of(&to), cli.raw)
            );
        }
        Commands::Transfer { from, to, amount } => {
            let ledger = state::open(&cli.state, cli.at)?;
            let amount = amount_arg(&ledger, &amount, cli.raw)?;
            ledger.transfer(&from, &to, amount)?;
            state::save(&cli.state, &ledger)?;
            println!(
                "transferred {} {from} → {to}; {from} {}, {to} {}",
                show(&ledger, amount, cli.raw),
                show(&ledger, ledger.balance_of(&from), cli.raw),
                show(&ledger, ledger.balance_of(&to), cli.raw)
            );
        }
        Commands::Balance { account } => {
            let ledger = state::open(&cli.state, cli.at)?;
            println!("{}", show(&ledger, ledger.balance_of(&account), cli.raw));
        }
        Commands::Supply => {
            let ledger = state::open(&cli.state, cli.at)?;
            let live: Amount = ledger
                .accounts()
                .iter()
                .map(|account| ledger.balance_of(account))
                .sum();
            println!("total   {}", show(&ledger, ledger.total_supply(), cli.raw));
            println!("live    {}", show(&ledger, live, cli.raw));
            println!("decayed {}", show(&ledger, ledger.decayed_supply(), cli.raw));
        }
        Commands::Inspect { account } => {
            let ledger = state::open(&cli.state, cli.at)?;
            inspect(&ledger, &account, cli.raw);
        }
        Commands::Events => {
            let ledger = state::open(&cli.state, cli.at)?;
            for event in ledger.events() {
                println!("{}", serde_json::to_string(&event)?);
            }
        }
        Commands::Verify => {
            // restoring already checks the root and supply accounting
            let ledger = state::open(&cli.state, cli.at)?;
            let snapshot = ledger.snapshot();
            println!("ok: state root {}", hex::encode(snapshot.computed_root()));
            println!(
                "{} accounts, {} events",
                snapshot.accounts.len(),
                snapshot.events.len()
            );
        }
    }
    Ok(())
}

fn inspect(ledger: &CliLedger, account: &String, raw: bool) {
    let now = ledger.now();
    let window = ledger.expiry_window();
    let batches = ledger.batches_of(account);
    if batches.is_empty() {
        println!("{account}: no batches");
        return;
    }
    println!(
        "{account}: live {} of stored {}",
        show(ledger, ledger.balance_of(account), raw),
        show(ledger, ledger.stored_balance_of(account), raw)
    );
    for batch in &batches {
        let age = now.saturating_sub(batch.received_at);
        let status = match window.expires_at(batch) {
            None => "exempt".to_string(),
            Some(at) if window.is_live(batch, now) => format!("expires in {}", days(at - now)),
            Some(_) => "expired".to_string(),
        };
        println!(
            "  {:>28}  received {}  age {}  {status}",
            show(ledger, batch.amount, raw),
            batch.received_at,
            days(age)
        );
    }
    if let Some(at) = ledger.next_expiry(account) {
        println!("next expiry at {at}");
    }
}

fn days(secs: u64) -> String {
    format!("{:.2}d", secs as f64 / SECONDS_PER_DAY as f64)
}

fn amount_arg(ledger: &CliLedger, text: &str, raw: bool) -> Result<Amount> {
    let decimals = if raw { 0 } else { ledger.token().decimals };
    parse_units(text, decimals).with_context(|| format!("parse amount {text:?}"))
}

fn show(ledger: &CliLedger, amount: Amount, raw: bool) -> String {
    if raw {
        amount.to_string()
    } else {
        format!(
            "{} {}",
            format_units(amount, ledger.token().decimals),
            ledger.token().symbol
        )
    }
}
