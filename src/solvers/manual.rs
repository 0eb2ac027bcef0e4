//! Human-in-the-loop challenge resolution.
//!
//! Two delivery modes, decided once at construction: a Telegram bot channel
//! when credentials are configured, otherwise a local file plus a blocking
//! console prompt. Waiting for the human reply is deliberately unbounded;
//! process termination is the only escape.

use std::fs;
use std::io::{self, Write};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart;
use serde::Deserialize;
use tokio::time::sleep;

use super::{CaptchaSolver, SolverError, SolverResult};
use crate::config::TelegramSettings;
use crate::service::ChallengeImage;

const TELEGRAM_API: &str = "https://api.telegram.org";
const REPLY_POLL_INTERVAL: Duration = Duration::from_secs(3);
const LONG_POLL_SECS: &str = "50";

#[derive(Debug, Deserialize)]
struct TelegramEnvelope<T> {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

struct TelegramChannel {
    bot_token: String,
    chat_id: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    fn new(settings: &TelegramSettings) -> Self {
        Self {
            bot_token: settings.bot_token.clone(),
            chat_id: settings.chat_id.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{TELEGRAM_API}/bot{}/{method}", self.bot_token)
    }

    async fn send_photo(&self, image: &ChallengeImage) -> Result<(), SolverError> {
        let bytes = image.decode()?;
        let part = multipart::Part::bytes(bytes.to_vec())
            .file_name("challenge.png")
            .mime_str("image/png")
            .map_err(|err| SolverError::Provider(err.to_string()))?;
        let form = multipart::Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", "Solve this challenge and reply with the answer.")
            .part("photo", part);

        let envelope: TelegramEnvelope<serde_json::Value> = self
            .client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await
            .map_err(|err| SolverError::Provider(err.to_string()))?
            .json()
            .await
            .map_err(|err| SolverError::Provider(err.to_string()))?;

        if !envelope.ok {
            return Err(SolverError::Provider(
                envelope
                    .description
                    .unwrap_or_else(|| "sendPhoto declined".into()),
            ));
        }
        Ok(())
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, SolverError> {
        let envelope: TelegramEnvelope<Vec<Update>> = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&[("offset", offset.to_string().as_str()), ("timeout", LONG_POLL_SECS)])
            .timeout(Duration::from_secs(70))
            .send()
            .await
            .map_err(|err| SolverError::Provider(err.to_string()))?
            .json()
            .await
            .map_err(|err| SolverError::Provider(err.to_string()))?;

        if !envelope.ok {
            return Err(SolverError::Provider(
                envelope
                    .description
                    .unwrap_or_else(|| "getUpdates declined".into()),
            ));
        }
        Ok(envelope.result.unwrap_or_default())
    }

    /// Block until the configured chat replies with text. No deadline: the
    /// human may take as long as they need. Transient poll errors are logged
    /// and polling continues.
    async fn wait_for_reply(&self) -> Result<String, SolverError> {
        // Consume the backlog first so a stale message is not taken as the
        // answer to the image just sent.
        let mut offset = self
            .get_updates(0)
            .await?
            .iter()
            .map(|update| update.update_id + 1)
            .max()
            .unwrap_or(0);

        loop {
            let updates = match self.get_updates(offset).await {
                Ok(updates) => updates,
                Err(err) => {
                    log::warn!("telegram poll failed ({err}), retrying");
                    sleep(REPLY_POLL_INTERVAL).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                if let Some(message) = update.message
                    && message.chat.id.to_string() == self.chat_id
                    && let Some(text) = message.text
                {
                    let answer = text.trim().to_string();
                    if !answer.is_empty() {
                        return Ok(answer);
                    }
                }
            }

            sleep(REPLY_POLL_INTERVAL).await;
        }
    }

    async fn solve(&self, image: &ChallengeImage) -> SolverResult {
        self.send_photo(image).await?;
        log::info!("challenge image sent to telegram chat {}, waiting for a reply", self.chat_id);
        self.wait_for_reply().await
    }
}

enum Channel {
    Telegram(TelegramChannel),
    Console,
}

/// Manual resolution strategy; the terminal link of the solver chain.
pub struct ManualSolver {
    channel: Channel,
}

impl ManualSolver {
    pub fn new(telegram: &TelegramSettings) -> Self {
        let channel = if telegram.is_configured() {
            Channel::Telegram(TelegramChannel::new(telegram))
        } else {
            Channel::Console
        };
        Self { channel }
    }

    /// Persist the image locally and block on a console prompt.
    async fn console_solve(image: &ChallengeImage) -> SolverResult {
        let bytes = image.decode()?;
        let path = format!("captcha_{}.png", Utc::now().timestamp_millis());
        fs::write(&path, &bytes)?;
        log::info!("challenge image saved to {path}");

        let answer = tokio::task::spawn_blocking(|| {
            print!("Enter the challenge answer: ");
            io::stdout().flush()?;
            let mut line = String::new();
            io::stdin().read_line(&mut line)?;
            Ok::<_, io::Error>(line.trim().to_string())
        })
        .await
        .map_err(|err| SolverError::Provider(format!("prompt task failed: {err}")))??;

        Ok(answer)
    }
}

#[async_trait]
impl CaptchaSolver for ManualSolver {
    fn name(&self) -> &'static str {
        "manual"
    }

    async fn solve(&self, image: &ChallengeImage) -> SolverResult {
        match &self.channel {
            Channel::Telegram(channel) => match channel.solve(image).await {
                Ok(answer) => Ok(answer),
                Err(err) => {
                    log::warn!("telegram channel failed ({err}), using console prompt");
                    Self::console_solve(image).await
                }
            },
            Channel::Console => Self::console_solve(image).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_mode_is_decided_at_construction() {
        let solver = ManualSolver::new(&TelegramSettings::default());
        assert!(matches!(solver.channel, Channel::Console));

        let solver = ManualSolver::new(&TelegramSettings {
            bot_token: "your_bot_token".into(),
            chat_id: "your_chat_id".into(),
        });
        assert!(matches!(solver.channel, Channel::Console));

        let solver = ManualSolver::new(&TelegramSettings {
            bot_token: "123:abc".into(),
            chat_id: "42".into(),
        });
        assert!(matches!(solver.channel, Channel::Telegram(_)));
    }

    #[test]
    fn update_envelope_parses_reply() {
        let raw = r#"{
            "ok": true,
            "result": [
                {"update_id": 7, "message": {"chat": {"id": 42}, "text": "aNsWeR"}}
            ]
        }"#;
        let envelope: TelegramEnvelope<Vec<Update>> = serde_json::from_str(raw).unwrap();
        let updates = envelope.result.unwrap();
        assert_eq!(updates[0].update_id, 7);
        let message = updates[0].message.as_ref().unwrap();
        assert_eq!(message.chat.id, 42);
        assert_eq!(message.text.as_deref(), Some("aNsWeR"));
    }
}
