//! TwoCaptcha image-solving adapter.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::{Instant, sleep};

use super::{CaptchaSolver, SolverConfig, SolverError, SolverResult, pick_api_key};
use crate::service::ChallengeImage;

const SUBMIT_URL: &str = "https://2captcha.com/in.php";
const RESULT_URL: &str = "https://2captcha.com/res.php";
const NOT_READY: &str = "CAPCHA_NOT_READY";

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: u8,
    request: String,
}

/// Adapter for the TwoCaptcha service; holds a key pool sampled per call.
pub struct TwoCaptchaSolver {
    api_keys: Vec<String>,
    config: SolverConfig,
    client: reqwest::Client,
}

impl TwoCaptchaSolver {
    pub fn new(api_keys: Vec<String>, config: SolverConfig) -> Self {
        Self {
            api_keys,
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn submit(&self, api_key: &str, image: &ChallengeImage) -> Result<String, SolverError> {
        let mut form = HashMap::new();
        form.insert("key", api_key.to_string());
        form.insert("method", "base64".to_string());
        form.insert("body", image.as_base64().to_string());
        form.insert("regsense", "1".to_string());
        form.insert("json", "1".to_string());

        let response: ApiResponse = self
            .client
            .post(SUBMIT_URL)
            .form(&form)
            .send()
            .await
            .map_err(|err| SolverError::Provider(err.to_string()))?
            .json()
            .await
            .map_err(|err| SolverError::Provider(err.to_string()))?;

        if response.status != 1 {
            return Err(SolverError::Provider(response.request));
        }
        Ok(response.request)
    }

    async fn poll(&self, api_key: &str, task_id: &str) -> Result<String, SolverError> {
        let deadline = Instant::now() + self.config.timeout;

        loop {
            sleep(self.config.poll_interval).await;
            if Instant::now() >= deadline {
                return Err(SolverError::Timeout(self.config.timeout));
            }

            let response: ApiResponse = self
                .client
                .get(RESULT_URL)
                .query(&[
                    ("key", api_key),
                    ("action", "get"),
                    ("id", task_id),
                    ("json", "1"),
                ])
                .send()
                .await
                .map_err(|err| SolverError::Provider(err.to_string()))?
                .json()
                .await
                .map_err(|err| SolverError::Provider(err.to_string()))?;

            if response.status == 1 {
                return Ok(response.request);
            }
            if response.request != NOT_READY {
                return Err(SolverError::Provider(response.request));
            }
        }
    }
}

#[async_trait]
impl CaptchaSolver for TwoCaptchaSolver {
    fn name(&self) -> &'static str {
        "twocaptcha"
    }

    async fn solve(&self, image: &ChallengeImage) -> SolverResult {
        let api_key = pick_api_key(&self.api_keys)?;
        let task_id = self.submit(&api_key, image).await?;
        log::debug!("twocaptcha accepted task {task_id}");
        self.poll(&api_key, &task_id).await
    }
}
