//! Reqwest-based implementation of the [`RewardApi`] trait.
//!
//! Owns the shared network primitive: a fixed retry budget with a fixed
//! inter-attempt delay, where an HTTP 400 is surfaced immediately as the
//! distinguished "credentials rejected" signal and an exhausted budget yields
//! the non-fatal [`ServiceError::Unavailable`] sentinel.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, ORIGIN};
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use url::Url;

use super::types::{
    ChallengeEnvelope, ChallengeImage, ChallengeImageEnvelope, KeepAliveEnvelope, KeepAlivePayload,
    LoginEnvelope, LoginMetadata, LoginPayload, LoginSubmission, PointsEnvelope, VersionTag,
};
use super::{RewardApi, ServiceError, ServiceResult};

const DEFAULT_BASE_URL: &str = "https://www.aeropres.in";
const CHALLENGE_PATH: &str = "/chromeapi/dawn/v1/puzzle/get-puzzle";
const CHALLENGE_IMAGE_PATH: &str = "/chromeapi/dawn/v1/puzzle/get-puzzle-image";
const LOGIN_PATH: &str = "/chromeapi/dawn/v1/user/login/v2";
const POINTS_PATH: &str = "/api/atom/v1/userreferral/getpoint";
const KEEP_ALIVE_PATH: &str = "/chromeapi/dawn/v1/userreward/keepalive";

const EXTENSION_ID: &str = "fpdkjdnhkakefebpekbdhillbhonfjjp";
const CLIENT_VERSION: &str = "1.1.3";

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:132.0) Gecko/20100101 Firefox/132.0",
];

static BASE_HEADERS: Lazy<HeaderMap> = Lazy::new(|| {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(
        HeaderName::from_static("accept-language"),
        HeaderValue::from_static("id-ID,id;q=0.9,en-US;q=0.8,en;q=0.7"),
    );
    headers.insert(
        ORIGIN,
        HeaderValue::from_static("chrome-extension://fpdkjdnhkakefebpekbdhillbhonfjjp"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("empty"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("cors"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("cross-site"),
    );
    headers
});

fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Transport-level tuning for the service client.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub base_url: Url,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base url is valid"),
            retry_attempts: 3,
            retry_delay: Duration::from_secs(12),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Reqwest-backed reward service client, one per processing attempt so each
/// account can ride its own egress.
pub struct HttpRewardApi {
    client: reqwest::Client,
    config: ServiceConfig,
}

impl HttpRewardApi {
    pub fn new(egress: Option<reqwest::Proxy>) -> ServiceResult<Self> {
        Self::with_config(egress, ServiceConfig::default())
    }

    pub fn with_config(
        egress: Option<reqwest::Proxy>,
        config: ServiceConfig,
    ) -> ServiceResult<Self> {
        let mut builder = reqwest::Client::builder()
            .cookie_store(true)
            .default_headers(BASE_HEADERS.clone())
            .timeout(config.timeout)
            // The liveness host serves an incomplete certificate chain.
            .danger_accept_invalid_certs(true);

        if let Some(proxy) = egress {
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|err| ServiceError::Client(err.to_string()))?;

        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> ServiceResult<Url> {
        self.config
            .base_url
            .join(path)
            .map_err(|err| ServiceError::Client(err.to_string()))
    }

    /// Shared network primitive. Up to `retry_attempts` tries with a fixed
    /// delay in between; a 400 short-circuits as `CredentialsRejected`, any
    /// other failure is retried, and an exhausted budget becomes the
    /// `Unavailable` sentinel.
    async fn execute(&self, request: reqwest::RequestBuilder) -> ServiceResult<reqwest::Response> {
        let attempts = self.config.retry_attempts.max(1);
        let mut last_failure = String::from("no attempt made");

        for attempt in 1..=attempts {
            let builder = request
                .try_clone()
                .ok_or_else(|| ServiceError::Client("request body is not replayable".into()))?;

            match builder
                .header(reqwest::header::USER_AGENT, random_user_agent())
                .send()
                .await
            {
                Ok(response) if response.status() == StatusCode::BAD_REQUEST => {
                    return Err(ServiceError::CredentialsRejected);
                }
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    last_failure = format!("unexpected status {}", response.status());
                }
                Err(err) => {
                    if err
                        .status()
                        .is_some_and(|status| status == StatusCode::BAD_REQUEST)
                    {
                        return Err(ServiceError::CredentialsRejected);
                    }
                    last_failure = err.to_string();
                }
            }

            if attempt < attempts {
                log::debug!("request failed ({attempt}/{attempts}): {last_failure}; retrying");
                sleep(self.config.retry_delay).await;
            }
        }

        Err(ServiceError::Unavailable {
            attempts,
            reason: last_failure,
        })
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> ServiceResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|err| ServiceError::Malformed(err.to_string()))
    }
}

fn refusal(message: Option<String>, fallback: &str) -> ServiceError {
    ServiceError::Refused(message.unwrap_or_else(|| fallback.to_string()))
}

#[async_trait]
impl RewardApi for HttpRewardApi {
    async fn fetch_challenge(&self, app_id: &str) -> ServiceResult<String> {
        let request = self
            .client
            .get(self.endpoint(CHALLENGE_PATH)?)
            .query(&[("appid", app_id)]);
        let envelope: ChallengeEnvelope = Self::parse(self.execute(request).await?).await?;

        if !envelope.success {
            return Err(refusal(envelope.message, "challenge request declined"));
        }
        envelope
            .puzzle_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ServiceError::Malformed("challenge response carried no id".into()))
    }

    async fn fetch_challenge_image(
        &self,
        challenge_id: &str,
        app_id: &str,
    ) -> ServiceResult<ChallengeImage> {
        let request = self
            .client
            .get(self.endpoint(CHALLENGE_IMAGE_PATH)?)
            .query(&[("puzzle_id", challenge_id), ("appid", app_id)]);
        let envelope: ChallengeImageEnvelope = Self::parse(self.execute(request).await?).await?;

        if !envelope.success {
            return Err(refusal(envelope.message, "challenge image declined"));
        }
        envelope
            .img_base64
            .filter(|data| !data.is_empty())
            .map(ChallengeImage::new)
            .ok_or_else(|| ServiceError::Malformed("challenge image response was empty".into()))
    }

    async fn login(&self, submission: &LoginSubmission<'_>) -> ServiceResult<String> {
        let payload = LoginPayload {
            username: submission.login_name,
            password: submission.secret,
            logindata: LoginMetadata {
                version: VersionTag {
                    version: CLIENT_VERSION,
                },
                datetime: Utc::now().to_rfc3339(),
            },
            puzzle_id: submission.challenge_id,
            ans: submission.answer,
            appid: submission.app_id,
        };

        let request = self
            .client
            .post(self.endpoint(LOGIN_PATH)?)
            .query(&[("appid", submission.app_id)])
            .json(&payload);
        let envelope: LoginEnvelope = Self::parse(self.execute(request).await?).await?;

        if !envelope.status {
            return Err(refusal(envelope.message, "login declined"));
        }
        envelope
            .data
            .and_then(|data| data.token)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ServiceError::Malformed("login response carried no token".into()))
    }

    async fn fetch_points(&self, app_id: &str, token: &str) -> ServiceResult<u64> {
        let request = self
            .client
            .get(self.endpoint(POINTS_PATH)?)
            .query(&[("appid", app_id)])
            .bearer_auth(token);
        let envelope: PointsEnvelope = Self::parse(self.execute(request).await?).await?;

        if !envelope.status {
            return Err(refusal(envelope.message, "points request declined"));
        }
        Ok(envelope.data.unwrap_or_default().total())
    }

    async fn keep_alive(&self, app_id: &str, token: &str, login_name: &str) -> ServiceResult<bool> {
        let payload = KeepAlivePayload {
            username: login_name,
            extensionid: EXTENSION_ID,
            numberoftabs: 0,
            version: CLIENT_VERSION,
        };

        let request = self
            .client
            .post(self.endpoint(KEEP_ALIVE_PATH)?)
            .query(&[("appid", app_id)])
            .bearer_auth(token)
            .json(&payload);
        let envelope: KeepAliveEnvelope = Self::parse(self.execute(request).await?).await?;

        if !envelope.success {
            log::debug!(
                "liveness declined: {}",
                envelope.message.as_deref().unwrap_or("no reason given")
            );
        }
        Ok(envelope.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_join_against_base_url() {
        let api = HttpRewardApi::new(None).unwrap();
        let url = api.endpoint(CHALLENGE_PATH).unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.aeropres.in/chromeapi/dawn/v1/puzzle/get-puzzle"
        );
    }

    #[test]
    fn base_headers_carry_extension_origin() {
        let origin = BASE_HEADERS.get(ORIGIN).unwrap().to_str().unwrap();
        assert!(origin.starts_with("chrome-extension://"));
        assert!(origin.ends_with(EXTENSION_ID));
    }

    #[test]
    fn user_agent_pool_is_non_empty() {
        for _ in 0..16 {
            assert!(random_user_agent().starts_with("Mozilla/5.0"));
        }
    }
}
