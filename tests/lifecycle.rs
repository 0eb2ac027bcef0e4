//! End-to-end lifecycle scenarios against a scripted service.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use sessionkeeper_rs::{
    Account, AccountStore, CaptchaSolver, ChallengeImage, KeeperConfig, LoginSubmission,
    RewardApi, ServiceError, ServiceResult, SessionKeeper, SolverChain, SolverResult,
};

/// Service double that hands out one challenge and accepts one login.
#[derive(Default)]
struct ScriptedService {
    seen_app_ids: Mutex<Vec<String>>,
    submitted_answers: Mutex<Vec<String>>,
}

#[async_trait]
impl RewardApi for ScriptedService {
    async fn fetch_challenge(&self, app_id: &str) -> ServiceResult<String> {
        self.seen_app_ids.lock().unwrap().push(app_id.to_string());
        Ok("puzzle-42".to_string())
    }

    async fn fetch_challenge_image(
        &self,
        challenge_id: &str,
        _app_id: &str,
    ) -> ServiceResult<ChallengeImage> {
        assert_eq!(challenge_id, "puzzle-42");
        Ok(ChallengeImage::new("aGVsbG8="))
    }

    async fn login(&self, submission: &LoginSubmission<'_>) -> ServiceResult<String> {
        if submission.answer != "WXYZ" {
            return Err(ServiceError::Refused("wrong answer".into()));
        }
        self.submitted_answers
            .lock()
            .unwrap()
            .push(submission.answer.to_string());
        Ok("T1".to_string())
    }

    async fn fetch_points(&self, app_id: &str, token: &str) -> ServiceResult<u64> {
        if token == "T1" && self.seen_app_ids.lock().unwrap().contains(&app_id.to_string()) {
            Ok(17)
        } else {
            Err(ServiceError::CredentialsRejected)
        }
    }

    async fn keep_alive(
        &self,
        _app_id: &str,
        token: &str,
        _login_name: &str,
    ) -> ServiceResult<bool> {
        if token == "T1" {
            Ok(true)
        } else {
            Err(ServiceError::CredentialsRejected)
        }
    }
}

struct CannedAnswer;

#[async_trait]
impl CaptchaSolver for CannedAnswer {
    fn name(&self) -> &'static str {
        "canned"
    }

    async fn solve(&self, _image: &ChallengeImage) -> SolverResult {
        Ok("WXYZ".to_string())
    }
}

fn keeper(api: Arc<ScriptedService>, store: AccountStore) -> SessionKeeper {
    SessionKeeper::with_config(
        api,
        Arc::new(SolverChain::new(None, Arc::new(CannedAnswer))),
        store,
        KeeperConfig {
            probe_attempts: 3,
            probe_delay: Duration::ZERO,
        },
    )
}

#[tokio::test]
async fn fresh_account_handshakes_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let store = AccountStore::new(dir.path().join("accounts.json"));
    let api = Arc::new(ScriptedService::default());
    let keeper = keeper(api.clone(), store.clone());

    let mut account = Account::new("a@x.com", "hunter2");
    let outcome = keeper.run_keepalive(&mut account).await.unwrap();

    assert_eq!(outcome.points, Some(17));
    assert!(outcome.kept_alive);

    let app_id = &account.session_state.application_id;
    assert_eq!(app_id.len(), 24);
    assert!(app_id.starts_with("67"));
    assert!(
        app_id[2..]
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    );
    assert_eq!(account.session_state.token, "T1");

    let stored = store.load().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].session_state, account.session_state);
}

#[tokio::test]
async fn second_pass_reuses_the_persisted_session() {
    let dir = tempfile::tempdir().unwrap();
    let store = AccountStore::new(dir.path().join("accounts.json"));
    let api = Arc::new(ScriptedService::default());
    let keeper = keeper(api.clone(), store.clone());

    let mut account = Account::new("a@x.com", "hunter2");
    keeper.run_keepalive(&mut account).await.unwrap();
    let first_session = account.session_state.clone();
    let handshakes_after_first = api.seen_app_ids.lock().unwrap().len();

    let outcome = keeper.run_keepalive(&mut account).await.unwrap();

    assert_eq!(outcome.points, Some(17));
    assert_eq!(account.session_state, first_session);
    assert_eq!(
        api.seen_app_ids.lock().unwrap().len(),
        handshakes_after_first
    );
}

#[tokio::test]
async fn stale_session_is_replaced_in_one_pass() {
    let dir = tempfile::tempdir().unwrap();
    let store = AccountStore::new(dir.path().join("accounts.json"));
    let api = Arc::new(ScriptedService::default());
    let keeper = keeper(api.clone(), store.clone());

    let mut account = Account::new("a@x.com", "hunter2");
    account.session_state =
        sessionkeeper_rs::SessionState::new("67deadbeefdeadbeefdeadbe", "STALE");

    let outcome = keeper.run_keepalive(&mut account).await.unwrap();

    assert_eq!(outcome.points, Some(17));
    assert!(outcome.kept_alive);
    assert_eq!(account.session_state.token, "T1");
    assert_ne!(
        account.session_state.application_id,
        "67deadbeefdeadbeefdeadbe"
    );
}
