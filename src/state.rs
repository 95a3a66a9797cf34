use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use flash_ledger::{
    Clock, Ledger, LedgerConfig, LedgerSnapshot, ManualClock, MonotonicClock, SingleIssuer,
    SystemClock, Timestamp,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub type CliLedger = Ledger<Arc<dyn Clock>, SingleIssuer>;

/// On-disk state: the policy the ledger was created with plus its latest
/// snapshot.
#[derive(Serialize, Deserialize)]
pub struct StateFile {
    pub config: LedgerConfig,
    pub snapshot: LedgerSnapshot,
}

/// Picks the clock for this invocation. Readings never go below `floor`,
/// the time the state was last written.
pub fn clock_for(at: Option<Timestamp>, floor: Timestamp) -> Arc<dyn Clock> {
    match at {
        Some(at) => {
            if at < floor {
                warn!(at, floor, "--at is earlier than the saved state, using saved time");
            }
            Arc::new(MonotonicClock::with_floor(ManualClock::new(at), floor))
        }
        None => Arc::new(MonotonicClock::with_floor(SystemClock, floor)),
    }
}

pub fn create(path: &Path, config: LedgerConfig, at: Option<Timestamp>, force: bool) -> Result<CliLedger> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let authority = SingleIssuer::new(config.issuer.clone());
    let ledger = Ledger::new(config, clock_for(at, 0), authority).context("create ledger")?;
    save(path, &ledger)?;
    Ok(ledger)
}

pub fn open(path: &Path, at: Option<Timestamp>) -> Result<CliLedger> {
    let bytes = fs::read(path)
        .with_context(|| format!("read state {} (run `flash init` first)", path.display()))?;
    let state: StateFile =
        serde_json::from_slice(&bytes).with_context(|| format!("decode state {}", path.display()))?;
    let clock = clock_for(at, state.snapshot.meta.taken_at);
    let authority = SingleIssuer::new(state.config.issuer.clone());
    Ledger::restore(state.config, state.snapshot, clock, authority)
        .with_context(|| format!("restore ledger from {}", path.display()))
}

pub fn save(path: &Path, ledger: &CliLedger) -> Result<()> {
    let state = StateFile {
        config: ledger.config().clone(),
        snapshot: ledger.snapshot(),
    };
    let bytes = serde_json::to_vec_pretty(&state).context("encode state")?;
    let tmp = tmp_path(path);
    fs::write(&tmp, bytes).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
