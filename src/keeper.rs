//! Credential lifecycle orchestration.
//!
//! Wires the reward-service boundary, the solver chain, and the account store
//! into the state machine that keeps each account's (applicationId, token)
//! pair usable: cheap validation of stored pairs, the full
//! challenge-solve-login handshake when no usable pair exists, and bounded
//! recovery when the service signals credential rejection.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::time::sleep;

use crate::service::{LoginSubmission, RewardApi, ServiceError};
use crate::solvers::SolverChain;
use crate::store::{Account, AccountStore, SessionState};

/// Fixed application-id prefix the service expects.
const APP_ID_PREFIX: &str = "67";
const APP_ID_SUFFIX_LEN: usize = 22;
const HEX_ALPHABET: &[u8] = b"0123456789abcdef";

/// Result alias used across the lifecycle layer.
pub type KeeperResult<T> = Result<T, KeeperError>;

/// Failure classes that end an account's processing for the current cycle.
#[derive(Debug, Error)]
pub enum KeeperError {
    #[error("challenge request failed: {0}")]
    ChallengeUnavailable(#[source] ServiceError),
    #[error("challenge image fetch failed: {0}")]
    ChallengeImageUnavailable(#[source] ServiceError),
    #[error("challenge could not be solved")]
    SolveFailed,
    #[error("login failed: {0}")]
    LoginFailed(#[source] ServiceError),
    #[error("credentials rejected again after re-acquisition")]
    CredentialsRejected,
}

/// Lifecycle tuning; defaults match the observed service behavior.
#[derive(Debug, Clone)]
pub struct KeeperConfig {
    /// Probe attempts before a stored pair is discarded.
    pub probe_attempts: u32,
    /// Delay between probe attempts.
    pub probe_delay: Duration,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            probe_attempts: 3,
            probe_delay: Duration::from_secs(5),
        }
    }
}

/// Per-account outcome of one keep-alive pass. `points` is `None` when the
/// service gave no definitive answer this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountOutcome {
    pub points: Option<u64>,
    pub kept_alive: bool,
}

/// Generate a fresh application id: the fixed prefix followed by 22
/// characters drawn uniformly from the lowercase hex alphabet. The service
/// validates the shape, so the format must stay stable.
pub fn generate_application_id() -> String {
    let mut rng = rand::thread_rng();
    let mut id = String::with_capacity(APP_ID_PREFIX.len() + APP_ID_SUFFIX_LEN);
    id.push_str(APP_ID_PREFIX);
    for _ in 0..APP_ID_SUFFIX_LEN {
        let index = rng.gen_range(0..HEX_ALPHABET.len());
        id.push(HEX_ALPHABET[index] as char);
    }
    id
}

/// Drives the credential lifecycle for one account at a time.
pub struct SessionKeeper {
    api: Arc<dyn RewardApi>,
    solvers: Arc<SolverChain>,
    store: AccountStore,
    config: KeeperConfig,
}

impl SessionKeeper {
    pub fn new(api: Arc<dyn RewardApi>, solvers: Arc<SolverChain>, store: AccountStore) -> Self {
        Self::with_config(api, solvers, store, KeeperConfig::default())
    }

    pub fn with_config(
        api: Arc<dyn RewardApi>,
        solvers: Arc<SolverChain>,
        store: AccountStore,
        config: KeeperConfig,
    ) -> Self {
        Self {
            api,
            solvers,
            store,
            config,
        }
    }

    /// Make sure the account carries a usable (applicationId, token) pair.
    ///
    /// A complete stored pair is probed with a cheap points fetch; any probe
    /// success keeps it unchanged. Only when every probe fails (for any
    /// reason) is the pair discarded and a full handshake performed.
    pub async fn ensure_valid_session(&self, account: &mut Account) -> KeeperResult<()> {
        if account.session_state.is_complete() {
            let attempts = self.config.probe_attempts.max(1);
            for attempt in 1..=attempts {
                match self.probe(account).await {
                    Ok(_) => {
                        log::debug!("stored session for {} is still valid", account.login_name);
                        return Ok(());
                    }
                    Err(err) => {
                        log::warn!(
                            "session probe failed ({attempt}/{attempts}) for {}: {err}",
                            account.login_name
                        );
                        if attempt < attempts {
                            sleep(self.config.probe_delay).await;
                        }
                    }
                }
            }
            log::warn!(
                "stored session for {} failed every probe, acquiring a fresh one",
                account.login_name
            );
        } else {
            log::info!("no stored session for {}, acquiring one", account.login_name);
        }

        self.acquire_session(account).await
    }

    /// Fetch the accrued points total. `None` means the answer is unknown
    /// this cycle; a rejection triggers one re-acquisition and one retry.
    pub async fn refresh_points(&self, account: &mut Account) -> KeeperResult<Option<u64>> {
        let mut recovered = false;
        loop {
            match self.probe(account).await {
                Ok(points) => return Ok(Some(points)),
                Err(ServiceError::CredentialsRejected) if !recovered => {
                    log::warn!(
                        "points fetch rejected for {}, re-acquiring session",
                        account.login_name
                    );
                    self.acquire_session(account).await?;
                    recovered = true;
                }
                Err(ServiceError::CredentialsRejected) => {
                    return Err(KeeperError::CredentialsRejected);
                }
                Err(err) => {
                    log::warn!(
                        "points fetch for {} gave no answer: {err}",
                        account.login_name
                    );
                    return Ok(None);
                }
            }
        }
    }

    /// Prove liveness. `false` covers both a declined probe and an unknown
    /// outcome; a rejection triggers one re-acquisition and one retry.
    pub async fn send_liveness(&self, account: &mut Account) -> KeeperResult<bool> {
        let mut recovered = false;
        loop {
            let session = &account.session_state;
            match self
                .api
                .keep_alive(&session.application_id, &session.token, &account.login_name)
                .await
            {
                Ok(alive) => return Ok(alive),
                Err(ServiceError::CredentialsRejected) if !recovered => {
                    log::warn!(
                        "liveness rejected for {}, re-acquiring session",
                        account.login_name
                    );
                    self.acquire_session(account).await?;
                    recovered = true;
                }
                Err(ServiceError::CredentialsRejected) => {
                    return Err(KeeperError::CredentialsRejected);
                }
                Err(err) => {
                    log::warn!("liveness for {} gave no answer: {err}", account.login_name);
                    return Ok(false);
                }
            }
        }
    }

    /// The full per-account pass the cycle driver invokes: session check,
    /// points refresh, liveness proof.
    pub async fn run_keepalive(&self, account: &mut Account) -> KeeperResult<AccountOutcome> {
        self.ensure_valid_session(account).await?;
        let points = self.refresh_points(account).await?;
        let kept_alive = self.send_liveness(account).await?;
        Ok(AccountOutcome { points, kept_alive })
    }

    async fn probe(&self, account: &Account) -> Result<u64, ServiceError> {
        let session = &account.session_state;
        self.api
            .fetch_points(&session.application_id, &session.token)
            .await
    }

    /// Perform the challenge-solve-login handshake and replace the account's
    /// session atomically.
    async fn acquire_session(&self, account: &mut Account) -> KeeperResult<()> {
        // A half-replaced pair must never survive; drop the old one up front.
        account.session_state.clear();

        let app_id = generate_application_id();
        log::info!(
            "starting handshake for {} with application id {app_id}",
            account.login_name
        );

        let challenge_id = self
            .api
            .fetch_challenge(&app_id)
            .await
            .map_err(KeeperError::ChallengeUnavailable)?;
        let image = self
            .api
            .fetch_challenge_image(&challenge_id, &app_id)
            .await
            .map_err(KeeperError::ChallengeImageUnavailable)?;

        let answer = self
            .solvers
            .solve(&image)
            .await
            .ok_or(KeeperError::SolveFailed)?;
        log::debug!("challenge {challenge_id} solved");

        let submission = LoginSubmission {
            login_name: &account.login_name,
            secret: &account.secret,
            challenge_id: &challenge_id,
            answer: &answer,
            app_id: &app_id,
        };
        let token = self
            .api
            .login(&submission)
            .await
            .map_err(KeeperError::LoginFailed)?;

        account.session_state = SessionState::new(app_id, token);
        if let Err(err) = self.store.upsert(account) {
            // In-memory state stays authoritative for the rest of the cycle.
            log::warn!(
                "could not persist session for {}: {err}",
                account.login_name
            );
        }
        log::info!("handshake for {} succeeded", account.login_name);
        Ok(())
    }
}
