//! Remote reward-service boundary.
//!
//! The service contract is consumed, not designed, here: challenge fetch,
//! challenge image fetch, login, points fetch, and liveness. The trait keeps
//! the credential lifecycle testable against scripted implementations while
//! [`HttpRewardApi`] talks to the real endpoints.

mod http;
mod types;

pub use http::{HttpRewardApi, ServiceConfig};
pub use types::{ChallengeImage, LoginSubmission, PointsData, ReferralPoint, RewardPoint};

use async_trait::async_trait;
use thiserror::Error;

/// Common result type for service calls.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Failure classes at the service boundary.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// HTTP 400-equivalent: the current (applicationId, token) pair is no
    /// longer accepted. Never retried at the transport layer.
    #[error("credentials rejected by the service")]
    CredentialsRejected,
    /// Retry budget exhausted without a definitive answer. Callers treat this
    /// as "unknown", not as fatal.
    #[error("service unreachable after {attempts} attempts: {reason}")]
    Unavailable { attempts: u32, reason: String },
    /// The service answered but declined the operation (falsy status flag).
    #[error("service refused the operation: {0}")]
    Refused(String),
    /// The response body did not match the documented shape.
    #[error("unexpected response: {0}")]
    Malformed(String),
    /// The client itself could not be constructed.
    #[error("client construction failed: {0}")]
    Client(String),
}

/// Operations the remote reward service exposes.
#[async_trait]
pub trait RewardApi: Send + Sync {
    /// Request a challenge scoped to a freshly generated application id.
    async fn fetch_challenge(&self, app_id: &str) -> ServiceResult<String>;

    /// Fetch the puzzle image for a previously issued challenge.
    async fn fetch_challenge_image(
        &self,
        challenge_id: &str,
        app_id: &str,
    ) -> ServiceResult<ChallengeImage>;

    /// Submit credentials plus the solved challenge; returns the bearer token.
    async fn login(&self, submission: &LoginSubmission<'_>) -> ServiceResult<String>;

    /// Fetch the accrued points total for a session.
    async fn fetch_points(&self, app_id: &str, token: &str) -> ServiceResult<u64>;

    /// Prove liveness for a session; `false` means the service declined.
    async fn keep_alive(&self, app_id: &str, token: &str, login_name: &str) -> ServiceResult<bool>;
}
