//! Replays a JSONL scenario against an in-memory ledger on a manual clock.
//!
//! One step per line:
//!   {"op":"config", ...LedgerConfig fields}      (first line only)
//!   {"op":"mint","caller":"deployer","to":"a","amount":"20"}
//!   {"op":"transfer","from":"deployer","to":"a","amount":"10","expect_error":"insufficient_balance"}
//!   {"op":"advance","days":11}
//!   {"op":"expect_balance","account":"a","amount":"0"}
//!   {"op":"expect_supply","total":"50000050","decayed":"20"}
//!
//! Amounts are whole-token decimals. Exits 2 on the first failed
//! expectation.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use flash_ledger::{
    format_units, parse_units, Amount, Ledger, LedgerConfig, ManualClock, MintError,
    SingleIssuer, Timestamp, TransferError,
};
use serde::Deserialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flash-replay")]
#[command(about = "Replay a ledger scenario on a manual clock")]
struct Args {
    /// Scenario file (JSON lines)
    scenario: PathBuf,

    /// Unix time the scenario starts at
    #[arg(long, default_value_t = 1_700_000_000)]
    start: Timestamp,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Step {
    Config(LedgerConfig),
    Mint {
        caller: String,
        to: String,
        amount: String,
        #[serde(default)]
        expect_error: Option<String>,
    },
    Transfer {
        from: String,
        to: String,
        amount: String,
        #[serde(default)]
        expect_error: Option<String>,
    },
    Advance {
        #[serde(default)]
        days: u64,
        #[serde(default)]
        secs: u64,
    },
    ExpectBalance {
        account: String,
        amount: String,
    },
    ExpectSupply {
        #[serde(default)]
        total: Option<String>,
        #[serde(default)]
        decayed: Option<String>,
    },
}

struct Replay {
    ledger: Ledger<ManualClock, SingleIssuer>,
    clock: ManualClock,
    decimals: u8,
}

impl Replay {
    fn new(config: LedgerConfig, start: Timestamp) -> Result<Self> {
        let clock = ManualClock::new(start);
        let decimals = config.token.decimals;
        let authority = SingleIssuer::new(config.issuer.clone());
        let ledger = Ledger::new(config, clock.clone(), authority).context("deploy ledger")?;
        Ok(Self {
            ledger,
            clock,
            decimals,
        })
    }

    fn amount(&self, text: &str) -> Result<Amount> {
        parse_units(text, self.decimals).with_context(|| format!("amount {text:?}"))
    }

    fn show(&self, amount: Amount) -> String {
        format_units(amount, self.decimals)
    }

    /// Runs one step. `Ok(Err(msg))` is a failed expectation.
    fn apply(&self, step: Step) -> Result<Result<String, String>> {
        let outcome = match step {
            Step::Config(_) => bail!("config must be the first step"),
            Step::Mint {
                caller,
                to,
                amount,
                expect_error,
            } => {
                let value = self.amount(&amount)?;
                let result = self.ledger.mint(&caller, &to, value).map_err(mint_kind);
                check_outcome(result, expect_error, || {
                    format!("mint {amount} → {to}")
                })
            }
            Step::Transfer {
                from,
                to,
                amount,
                expect_error,
            } => {
                let value = self.amount(&amount)?;
                let result = self
                    .ledger
                    .transfer(&from, &to, value)
                    .map_err(transfer_kind);
                check_outcome(result, expect_error, || {
                    format!("transfer {amount} {from} → {to}")
                })
            }
            Step::Advance { days, secs } => {
                self.clock.advance_days(days);
                self.clock.advance(secs);
                Ok(format!("advanced to {}", self.ledger.now()))
            }
            Step::ExpectBalance { account, amount } => {
                let expected = self.amount(&amount)?;
                let actual = self.ledger.balance_of(&account);
                if actual == expected {
                    Ok(format!("balance {account} = {}", self.show(actual)))
                } else {
                    Err(format!(
                        "balance {account}: expected {}, got {}",
                        self.show(expected),
                        self.show(actual)
                    ))
                }
            }
            Step::ExpectSupply { total, decayed } => {
                let mut checks = vec![];
                if let Some(total) = total {
                    checks.push(("total", self.amount(&total)?, self.ledger.total_supply()));
                }
                if let Some(decayed) = decayed {
                    checks.push(("decayed", self.amount(&decayed)?, self.ledger.decayed_supply()));
                }
                match checks.iter().find(|(_, expected, actual)| expected != actual) {
                    Some((name, expected, actual)) => Err(format!(
                        "{name} supply: expected {}, got {}",
                        self.show(*expected),
                        self.show(*actual)
                    )),
                    None => Ok("supply matches".to_string()),
                }
            }
        };
        Ok(outcome)
    }
}

fn check_outcome(
    result: Result<(), &'static str>,
    expect_error: Option<String>,
    describe: impl FnOnce() -> String,
) -> Result<String, String> {
    match (result, expect_error) {
        (Ok(()), None) => Ok(describe()),
        (Err(kind), Some(expected)) if kind == expected => {
            Ok(format!("{} refused: {kind}", describe()))
        }
        (Ok(()), Some(expected)) => Err(format!("{}: expected {expected}, succeeded", describe())),
        (Err(kind), expected) => Err(format!(
            "{}: failed with {kind}, expected {}",
            describe(),
            expected.as_deref().unwrap_or("success")
        )),
    }
}

fn mint_kind(err: MintError) -> &'static str {
    match err {
        MintError::Unauthorized { .. } => "unauthorized",
        MintError::InvalidAmount => "invalid_amount",
        MintError::SupplyOverflow { .. } => "supply_overflow",
    }
}

fn transfer_kind(err: TransferError) -> &'static str {
    match err {
        TransferError::InvalidAmount => "invalid_amount",
        TransferError::SameAccount { .. } => "same_account",
        TransferError::InsufficientBalance { .. } => "insufficient_balance",
    }
}

fn run(args: Args) -> Result<bool> {
    let file = File::open(&args.scenario)
        .with_context(|| format!("open scenario {}", args.scenario.display()))?;
    let mut steps = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("read scenario")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        let step: Step = serde_json::from_str(line)
            .with_context(|| format!("line {}: bad step", idx + 1))?;
        steps.push((idx + 1, step));
    }

    let mut steps = steps.into_iter().peekable();
    let config = match steps.next_if(|(_, step)| matches!(step, Step::Config(_))) {
        Some((_, Step::Config(config))) => config,
        _ => LedgerConfig::default(),
    };
    config.validate().context("scenario config")?;
    let replay = Replay::new(config, args.start)?;
    info!(scenario = %args.scenario.display(), "replay started");

    for (line, step) in steps {
        debug!(line, ?step, "step");
        match replay.apply(step).with_context(|| format!("line {line}"))? {
            Ok(message) => println!("[{line:>3}] ok    {message}"),
            Err(message) => {
                println!("[{line:>3}] FAIL  {message}");
                return Ok(false);
            }
        }
    }
    println!(
        "done: total supply {}, decayed {}",
        replay.show(replay.ledger.total_supply()),
        replay.show(replay.ledger.decayed_supply())
    );
    Ok(true)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}
