//! Durable account store.
//!
//! A single JSON file maps each account identity to its current
//! (applicationId, token) pair. The file is read at cycle start and rewritten
//! whole on every upsert; access is strictly sequential, so no locking is
//! needed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the account store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] io::Error),
    #[error("store file is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}

/// Server-issued session credentials.
///
/// The token is only meaningful next to the application id that produced it;
/// the two fields are always replaced together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionState {
    pub application_id: String,
    pub token: String,
}

impl SessionState {
    pub fn new(application_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            token: token.into(),
        }
    }

    /// Both halves of the pair are present.
    pub fn is_complete(&self) -> bool {
        !self.application_id.is_empty() && !self.token.is_empty()
    }

    pub fn clear(&mut self) {
        self.application_id.clear();
        self.token.clear();
    }
}

/// One externally-issued identity the system keeps alive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub login_name: String,
    pub secret: String,
    #[serde(default)]
    pub session_state: SessionState,
}

impl Account {
    pub fn new(login_name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            login_name: login_name.into(),
            secret: secret.into(),
            session_state: SessionState::default(),
        }
    }
}

/// File-backed account store.
#[derive(Debug, Clone)]
pub struct AccountStore {
    path: PathBuf,
}

impl AccountStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every persisted account. An absent file is an empty store.
    pub fn load(&self) -> Result<Vec<Account>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(Vec::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    /// Insert or update one account's record, leaving every other record
    /// untouched. Matches by `loginName`; the whole file is rewritten.
    pub fn upsert(&self, account: &Account) -> Result<(), StoreError> {
        let mut accounts = self.load()?;
        match accounts
            .iter_mut()
            .find(|existing| existing.login_name == account.login_name)
        {
            Some(existing) => existing.session_state = account.session_state.clone(),
            None => accounts.push(account.clone()),
        }
        fs::write(&self.path, serde_json::to_string_pretty(&accounts)?)?;
        Ok(())
    }
}
