//! Cycle driver.
//!
//! Iterates accounts strictly one at a time, hands each to the session
//! keeper over its own egress, aggregates per-account outcomes, reports, then
//! sleeps and repeats forever. One account's failure never aborts the cycle;
//! only a missing account population is structurally fatal.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;

use crate::egress::{self, EgressPool};
use crate::keeper::{KeeperConfig, SessionKeeper};
use crate::service::{HttpRewardApi, ServiceConfig};
use crate::solvers::SolverChain;
use crate::store::{Account, AccountStore, StoreError};

const DEFAULT_EGRESS: &str = "default";

/// Structural failures that stop the whole process.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("no accounts configured")]
    NoAccounts,
    #[error("account import failed: {0}")]
    Import(#[from] io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One account's outcome for one cycle; transient, reporting only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleResult {
    pub login_name: String,
    pub points: Option<u64>,
    pub kept_alive: bool,
    pub egress: String,
}

/// Result of parsing a bulk import file: the accounts plus each account's
/// pinned egress descriptor.
#[derive(Debug, Default)]
pub struct BulkImport {
    pub accounts: Vec<Account>,
    pub pinned: HashMap<String, String>,
}

/// Parse `identifier----secret----egressDescriptor` lines. Blank lines and
/// `#` comments are skipped; malformed lines are skipped with a warning.
pub fn import_accounts(path: &Path) -> Result<BulkImport, RunnerError> {
    let contents = fs::read_to_string(path)?;
    let mut import = BulkImport::default();

    for (number, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split("----").collect();
        if parts.len() < 3 {
            log::warn!(
                "skipping line {}: expected identifier----secret----egress",
                number + 1
            );
            continue;
        }

        let login_name = parts[0].trim();
        let secret = parts[1].trim();
        let descriptor = parts[2].trim();
        if login_name.is_empty() || secret.is_empty() || descriptor.is_empty() {
            log::warn!("skipping line {}: empty field", number + 1);
            continue;
        }

        import
            .pinned
            .insert(login_name.to_string(), descriptor.to_string());
        import.accounts.push(Account::new(login_name, secret));
        log::debug!("imported account {login_name} with pinned egress");
    }

    Ok(import)
}

/// Assemble the account population: the bulk file when present, otherwise
/// whatever the store already holds. An empty population is fatal.
pub fn load_accounts(path: &Path, store: &AccountStore) -> Result<BulkImport, RunnerError> {
    let mut import = match import_accounts(path) {
        Ok(import) => import,
        Err(RunnerError::Import(err)) if err.kind() == io::ErrorKind::NotFound => {
            log::info!(
                "no bulk file at {}, falling back to the account store",
                path.display()
            );
            BulkImport::default()
        }
        Err(err) => return Err(err),
    };

    if import.accounts.is_empty() {
        import.accounts = store.load()?;
    }
    if import.accounts.is_empty() {
        return Err(RunnerError::NoAccounts);
    }
    Ok(import)
}

/// Driver tuning; the cycle interval default matches the observed 10 minutes.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub cycle_interval: Duration,
    pub keeper: KeeperConfig,
    pub service: ServiceConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(600),
            keeper: KeeperConfig::default(),
            service: ServiceConfig::default(),
        }
    }
}

/// Owns the account population, the shared egress pool, and the solver chain,
/// and drives the infinite keep-alive loop.
pub struct CycleDriver {
    accounts: Vec<Account>,
    pinned: HashMap<String, String>,
    pool: EgressPool,
    store: AccountStore,
    solvers: Arc<SolverChain>,
    config: RunnerConfig,
}

impl CycleDriver {
    pub fn new(
        import: BulkImport,
        pool: EgressPool,
        store: AccountStore,
        solvers: Arc<SolverChain>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            accounts: import.accounts,
            pinned: import.pinned,
            pool,
            store,
            solvers,
            config,
        }
    }

    /// Run cycles until the process is terminated.
    pub async fn run_forever(&mut self) {
        loop {
            log::info!("starting cycle over {} accounts", self.accounts.len());
            let results = self.run_cycle().await;
            report(&results);
            log::info!(
                "cycle complete, sleeping {}s before the next one",
                self.config.cycle_interval.as_secs()
            );
            sleep(self.config.cycle_interval).await;
        }
    }

    /// One full pass over every account, strictly sequential.
    pub async fn run_cycle(&mut self) -> Vec<CycleResult> {
        self.adopt_stored_sessions();

        let total = self.accounts.len();
        let mut results = Vec::with_capacity(total);

        for index in 0..total {
            let login_name = self.accounts[index].login_name.clone();
            log::info!("[{}/{total}] processing {login_name}", index + 1);

            let (egress_label, proxy) = self.select_egress(&login_name).await;
            let keeper = match HttpRewardApi::with_config(proxy, self.config.service.clone()) {
                Ok(api) => SessionKeeper::with_config(
                    Arc::new(api),
                    self.solvers.clone(),
                    self.store.clone(),
                    self.config.keeper.clone(),
                ),
                Err(err) => {
                    log::error!("[{}/{total}] client construction failed: {err}", index + 1);
                    results.push(CycleResult {
                        login_name,
                        points: None,
                        kept_alive: false,
                        egress: egress_label,
                    });
                    continue;
                }
            };

            let account = &mut self.accounts[index];
            match keeper.run_keepalive(account).await {
                Ok(outcome) => results.push(CycleResult {
                    login_name,
                    points: outcome.points,
                    kept_alive: outcome.kept_alive,
                    egress: egress_label,
                }),
                Err(err) => {
                    log::error!("[{}/{total}] {login_name} failed: {err}", index + 1);
                    results.push(CycleResult {
                        login_name,
                        points: None,
                        kept_alive: false,
                        egress: egress_label,
                    });
                }
            }
        }

        results
    }

    /// A pinned descriptor always wins; otherwise draw a validated candidate
    /// from the shared pool. Any failure degrades to the default egress.
    async fn select_egress(&self, login_name: &str) -> (String, Option<reqwest::Proxy>) {
        if let Some(descriptor) = self.pinned.get(login_name) {
            match egress::resolve(descriptor) {
                Ok(proxy) => return (descriptor.clone(), Some(proxy)),
                Err(err) => {
                    log::warn!(
                        "pinned egress for {login_name} unusable ({err}), using default egress"
                    );
                    return (DEFAULT_EGRESS.to_string(), None);
                }
            }
        }

        match self.pool.select().await {
            Some(selected) => (selected.descriptor, Some(selected.proxy)),
            None => (DEFAULT_EGRESS.to_string(), None),
        }
    }

    /// Adopt persisted sessions at cycle start for accounts whose in-memory
    /// pair is incomplete. A complete in-memory pair wins: it may be fresher
    /// than the store when a persist attempt failed mid-cycle.
    fn adopt_stored_sessions(&mut self) {
        let stored = match self.store.load() {
            Ok(stored) => stored,
            Err(err) => {
                log::warn!("could not read the account store: {err}");
                return;
            }
        };

        for account in &mut self.accounts {
            if account.session_state.is_complete() {
                continue;
            }
            if let Some(persisted) = stored
                .iter()
                .find(|candidate| candidate.login_name == account.login_name)
                && persisted.session_state.is_complete()
            {
                account.session_state = persisted.session_state.clone();
            }
        }
    }
}

fn report(results: &[CycleResult]) {
    for result in results {
        let points = result
            .points
            .map_or_else(|| "unknown".to_string(), |points| points.to_string());
        log::info!(
            "account {}: points {}, kept alive {}, egress {}",
            result.login_name,
            points,
            result.kept_alive,
            result.egress
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::store::SessionState;

    fn write_bulk(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join("accounts.txt");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn import_skips_blank_comment_and_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_bulk(
            &dir,
            "# comment\n\
             a@x.com----pw-a----10.0.0.1:8080\n\
             \n\
             broken-line\n\
             b@x.com----pw-b\n\
             c@x.com----pw-c----socks5://10.0.0.2:1080\n",
        );

        let import = import_accounts(&path).unwrap();
        assert_eq!(import.accounts.len(), 2);
        assert_eq!(import.accounts[0].login_name, "a@x.com");
        assert_eq!(import.accounts[1].login_name, "c@x.com");
        assert_eq!(import.pinned["a@x.com"], "10.0.0.1:8080");
        assert_eq!(import.pinned["c@x.com"], "socks5://10.0.0.2:1080");
    }

    #[test]
    fn import_skips_lines_with_empty_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_bulk(&dir, "a@x.com--------10.0.0.1:8080\n");
        let import = import_accounts(&path).unwrap();
        assert!(import.accounts.is_empty());
    }

    #[test]
    fn missing_bulk_file_falls_back_to_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = AccountStore::new(dir.path().join("accounts.json"));
        let mut account = Account::new("a@x.com", "pw");
        account.session_state = SessionState::new("67aa", "T1");
        store.upsert(&account).unwrap();

        let import = load_accounts(&dir.path().join("absent.txt"), &store).unwrap();
        assert_eq!(import.accounts.len(), 1);
        assert!(import.pinned.is_empty());
    }

    #[test]
    fn empty_population_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = AccountStore::new(dir.path().join("accounts.json"));
        let result = load_accounts(&dir.path().join("absent.txt"), &store);
        assert!(matches!(result, Err(RunnerError::NoAccounts)));
    }

    #[test]
    fn adopt_takes_persisted_sessions_for_incomplete_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let store = AccountStore::new(dir.path().join("accounts.json"));

        let mut persisted = Account::new("a@x.com", "pw");
        persisted.session_state = SessionState::new("67stored", "TS");
        store.upsert(&persisted).unwrap();

        let mut fresh_in_memory = Account::new("b@x.com", "pw");
        fresh_in_memory.session_state = SessionState::new("67memory", "TM");
        let mut stale_store_copy = fresh_in_memory.clone();
        stale_store_copy.session_state = SessionState::new("67stale", "TX");
        store.upsert(&stale_store_copy).unwrap();

        let import = BulkImport {
            accounts: vec![Account::new("a@x.com", "pw"), fresh_in_memory],
            pinned: HashMap::new(),
        };
        let solvers = Arc::new(SolverChain::from_settings(
            &crate::config::SolverSettings::default(),
            crate::solvers::SolverConfig::default(),
        ));
        let mut driver = CycleDriver::new(
            import,
            EgressPool::default(),
            store,
            solvers,
            RunnerConfig::default(),
        );

        driver.adopt_stored_sessions();

        assert_eq!(
            driver.accounts[0].session_state,
            SessionState::new("67stored", "TS")
        );
        // The complete in-memory pair was not clobbered by the stale store copy.
        assert_eq!(
            driver.accounts[1].session_state,
            SessionState::new("67memory", "TM")
        );
    }
}
