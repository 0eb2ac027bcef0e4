//! # sessionkeeper-rs
//!
//! Keep-alive automation for many reward-service accounts. Each account needs
//! a valid (applicationId, token) pair obtained through a challenge-response
//! handshake that includes solving a visual puzzle, and must periodically
//! prove liveness and fetch its accrued points total.
//!
//! The crate covers the credential lifecycle and its resilience protocol:
//! cheap validation of stored pairs, rejection-driven re-acquisition, a
//! solver chain with automated services falling back to human resolution,
//! per-account proxy egress, and a durable JSON account store, all driven
//! sequentially by an infinite cycle loop.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sessionkeeper_rs::{
//!     Account, AccountStore, HttpRewardApi, SessionKeeper, SolverChain, SolverConfig,
//!     SolverSettings,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let api = Arc::new(HttpRewardApi::new(None)?);
//!     let solvers = Arc::new(SolverChain::from_settings(
//!         &SolverSettings::default(),
//!         SolverConfig::default(),
//!     ));
//!     let store = AccountStore::new("accounts.json");
//!
//!     let keeper = SessionKeeper::new(api, solvers, store);
//!     let mut account = Account::new("a@x.com", "hunter2");
//!     let outcome = keeper.run_keepalive(&mut account).await?;
//!     println!("points: {:?}, alive: {}", outcome.points, outcome.kept_alive);
//!     Ok(())
//! }
//! ```

mod keeper;

pub mod config;
pub mod egress;
pub mod runner;
pub mod service;
pub mod solvers;
pub mod store;

pub use crate::keeper::{
    AccountOutcome,
    KeeperConfig,
    KeeperError,
    KeeperResult,
    SessionKeeper,
    generate_application_id,
};

pub use crate::config::{
    AppConfig,
    ConfigError,
    SolverProvider,
    SolverSettings,
    TelegramSettings,
};

pub use crate::egress::{
    EgressError,
    EgressPool,
    SelectedEgress,
};

pub use crate::runner::{
    BulkImport,
    CycleDriver,
    CycleResult,
    RunnerConfig,
    RunnerError,
};

pub use crate::service::{
    ChallengeImage,
    HttpRewardApi,
    LoginSubmission,
    RewardApi,
    ServiceConfig,
    ServiceError,
    ServiceResult,
};

pub use crate::solvers::{
    AntiCaptchaSolver,
    CaptchaSolver,
    ManualSolver,
    SolverChain,
    SolverConfig,
    SolverError,
    SolverResult,
    TwoCaptchaSolver,
};

pub use crate::store::{
    Account,
    AccountStore,
    SessionState,
    StoreError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
