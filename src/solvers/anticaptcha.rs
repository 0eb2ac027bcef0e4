//! AntiCaptcha image-solving adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::{Instant, sleep};

use super::{CaptchaSolver, SolverConfig, SolverError, SolverResult, pick_api_key};
use crate::service::ChallengeImage;

const CREATE_TASK_URL: &str = "https://api.anti-captcha.com/createTask";
const TASK_RESULT_URL: &str = "https://api.anti-captcha.com/getTaskResult";

#[derive(Debug, Serialize)]
struct CreateTaskRequest<'a> {
    #[serde(rename = "clientKey")]
    client_key: &'a str,
    task: ImageTask<'a>,
}

#[derive(Debug, Serialize)]
struct ImageTask<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    body: &'a str,
    case: bool,
}

#[derive(Debug, Deserialize)]
struct CreateTaskResponse {
    #[serde(rename = "errorId", default)]
    error_id: i64,
    #[serde(rename = "taskId", default)]
    task_id: Option<i64>,
    #[serde(rename = "errorDescription", default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskResultResponse {
    #[serde(rename = "errorId", default)]
    error_id: i64,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    solution: Option<TaskSolution>,
    #[serde(rename = "errorDescription", default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskSolution {
    #[serde(default)]
    text: Option<String>,
}

/// Adapter for the AntiCaptcha service; holds a key pool sampled per call.
pub struct AntiCaptchaSolver {
    api_keys: Vec<String>,
    config: SolverConfig,
    client: reqwest::Client,
}

impl AntiCaptchaSolver {
    pub fn new(api_keys: Vec<String>, config: SolverConfig) -> Self {
        Self {
            api_keys,
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn create_task(
        &self,
        api_key: &str,
        image: &ChallengeImage,
    ) -> Result<i64, SolverError> {
        let request = CreateTaskRequest {
            client_key: api_key,
            task: ImageTask {
                kind: "ImageToTextTask",
                body: image.as_base64(),
                case: true,
            },
        };

        let response: CreateTaskResponse = self
            .client
            .post(CREATE_TASK_URL)
            .json(&request)
            .send()
            .await
            .map_err(|err| SolverError::Provider(err.to_string()))?
            .json()
            .await
            .map_err(|err| SolverError::Provider(err.to_string()))?;

        if response.error_id != 0 {
            return Err(SolverError::Provider(
                response
                    .error_description
                    .unwrap_or_else(|| format!("error id {}", response.error_id)),
            ));
        }
        response
            .task_id
            .ok_or_else(|| SolverError::Provider("createTask returned no task id".into()))
    }

    async fn poll(&self, api_key: &str, task_id: i64) -> Result<String, SolverError> {
        let deadline = Instant::now() + self.config.timeout;

        loop {
            sleep(self.config.poll_interval).await;
            if Instant::now() >= deadline {
                return Err(SolverError::Timeout(self.config.timeout));
            }

            let response: TaskResultResponse = self
                .client
                .post(TASK_RESULT_URL)
                .json(&json!({"clientKey": api_key, "taskId": task_id}))
                .send()
                .await
                .map_err(|err| SolverError::Provider(err.to_string()))?
                .json()
                .await
                .map_err(|err| SolverError::Provider(err.to_string()))?;

            if response.error_id != 0 {
                return Err(SolverError::Provider(
                    response
                        .error_description
                        .unwrap_or_else(|| format!("error id {}", response.error_id)),
                ));
            }

            match response.status.as_deref() {
                Some("ready") => {
                    return response
                        .solution
                        .and_then(|solution| solution.text)
                        .ok_or_else(|| {
                            SolverError::Provider("ready task carried no solution text".into())
                        });
                }
                Some("processing") | None => {}
                Some(other) => {
                    return Err(SolverError::Provider(format!("unexpected status {other}")));
                }
            }
        }
    }
}

#[async_trait]
impl CaptchaSolver for AntiCaptchaSolver {
    fn name(&self) -> &'static str {
        "anticaptcha"
    }

    async fn solve(&self, image: &ChallengeImage) -> SolverResult {
        let api_key = pick_api_key(&self.api_keys)?;
        let task_id = self.create_task(&api_key, image).await?;
        log::debug!("anticaptcha accepted task {task_id}");
        self.poll(&api_key, task_id).await
    }
}
