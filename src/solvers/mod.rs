//! Challenge solver chain.
//!
//! Three capability-equivalent strategies resolve a puzzle image to an answer
//! string: two paid solving services and a human-in-the-loop channel. The
//! strategy is chosen once at construction; any automated failure falls back
//! unconditionally to manual resolution.

mod anticaptcha;
mod manual;
mod twocaptcha;

pub use anticaptcha::AntiCaptchaSolver;
pub use manual::ManualSolver;
pub use twocaptcha::TwoCaptchaSolver;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use thiserror::Error;

use crate::config::{SolverProvider, SolverSettings};
use crate::service::ChallengeImage;

/// Tuning shared by the paid solving services. Manual resolution deliberately
/// has no deadline.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Common result type returned by solvers.
pub type SolverResult = Result<String, SolverError>;

/// Errors surfaced by individual solvers.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("solver misconfigured: {0}")]
    Configuration(String),
    #[error("solver request failed: {0}")]
    Provider(String),
    #[error("solving timed out after {0:?}")]
    Timeout(Duration),
    #[error("image payload is not valid base64: {0}")]
    Image(#[from] base64::DecodeError),
    #[error("local io failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared interface implemented by every solving strategy.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    fn name(&self) -> &'static str;
    async fn solve(&self, image: &ChallengeImage) -> SolverResult;
}

/// Pick one key uniformly at random from a configured pool. An empty pool or
/// a blank key short-circuits before any network call.
pub(crate) fn pick_api_key(keys: &[String]) -> Result<String, SolverError> {
    let key = keys
        .choose(&mut rand::thread_rng())
        .ok_or_else(|| SolverError::Configuration("no API key configured".into()))?;
    if key.trim().is_empty() {
        return Err(SolverError::Configuration("API key is empty".into()));
    }
    Ok(key.clone())
}

/// Strict fallback chain: configured service first, manual resolution second.
///
/// There is no fallback *from* the fallback; if it fails too, the chain yields
/// `None` and the caller treats the handshake attempt as unsolvable.
pub struct SolverChain {
    primary: Option<Arc<dyn CaptchaSolver>>,
    fallback: Arc<dyn CaptchaSolver>,
}

impl SolverChain {
    pub fn new(primary: Option<Arc<dyn CaptchaSolver>>, fallback: Arc<dyn CaptchaSolver>) -> Self {
        Self { primary, fallback }
    }

    /// Build the chain from settings. Selection happens here, once; call
    /// sites never branch on the provider tag again.
    pub fn from_settings(settings: &SolverSettings, config: SolverConfig) -> Self {
        let primary: Option<Arc<dyn CaptchaSolver>> = match settings.provider {
            SolverProvider::TwoCaptcha => Some(Arc::new(TwoCaptchaSolver::new(
                settings.two_captcha_keys.clone(),
                config.clone(),
            ))),
            SolverProvider::AntiCaptcha => Some(Arc::new(AntiCaptchaSolver::new(
                settings.anti_captcha_keys.clone(),
                config,
            ))),
            SolverProvider::Manual => None,
        };
        Self {
            primary,
            fallback: Arc::new(ManualSolver::new(&settings.telegram)),
        }
    }

    /// Resolve an image to an answer, or `None` when every strategy failed.
    /// Errors from the primary never propagate; they only trigger fallback.
    pub async fn solve(&self, image: &ChallengeImage) -> Option<String> {
        if let Some(primary) = &self.primary {
            match primary.solve(image).await {
                Ok(answer) if !answer.trim().is_empty() => return Some(answer),
                Ok(_) => {
                    log::warn!(
                        "{} returned an empty answer, falling back to {}",
                        primary.name(),
                        self.fallback.name()
                    );
                }
                Err(err) => {
                    log::warn!(
                        "{} failed ({err}), falling back to {}",
                        primary.name(),
                        self.fallback.name()
                    );
                }
            }
        }

        match self.fallback.solve(image).await {
            Ok(answer) if !answer.trim().is_empty() => Some(answer),
            Ok(_) => {
                log::error!("{} produced an empty answer", self.fallback.name());
                None
            }
            Err(err) => {
                log::error!("{} failed: {err}", self.fallback.name());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFails;

    #[async_trait]
    impl CaptchaSolver for AlwaysFails {
        fn name(&self) -> &'static str {
            "always-fails"
        }

        async fn solve(&self, _image: &ChallengeImage) -> SolverResult {
            Err(SolverError::Provider("service is down".into()))
        }
    }

    struct Fixed(&'static str);

    #[async_trait]
    impl CaptchaSolver for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn solve(&self, _image: &ChallengeImage) -> SolverResult {
            Ok(self.0.to_string())
        }
    }

    fn image() -> ChallengeImage {
        ChallengeImage::new("aGVsbG8=")
    }

    #[tokio::test]
    async fn failing_primary_falls_back_without_propagating() {
        let chain = SolverChain::new(Some(Arc::new(AlwaysFails)), Arc::new(Fixed("abcd")));
        assert_eq!(chain.solve(&image()).await, Some("abcd".to_string()));
    }

    #[tokio::test]
    async fn empty_primary_answer_falls_back() {
        let chain = SolverChain::new(Some(Arc::new(Fixed(""))), Arc::new(Fixed("wxyz")));
        assert_eq!(chain.solve(&image()).await, Some("wxyz".to_string()));
    }

    #[tokio::test]
    async fn failing_fallback_yields_none() {
        let chain = SolverChain::new(Some(Arc::new(AlwaysFails)), Arc::new(AlwaysFails));
        assert_eq!(chain.solve(&image()).await, None);
    }

    #[tokio::test]
    async fn manual_only_chain_skips_primary() {
        let chain = SolverChain::new(None, Arc::new(Fixed("okay")));
        assert_eq!(chain.solve(&image()).await, Some("okay".to_string()));
    }

    #[test]
    fn api_key_pool_rejects_blank_entries() {
        assert!(matches!(
            pick_api_key(&[]),
            Err(SolverError::Configuration(_))
        ));
        assert!(matches!(
            pick_api_key(&[String::new()]),
            Err(SolverError::Configuration(_))
        ));
        assert_eq!(pick_api_key(&["k".to_string()]).unwrap(), "k");
    }

    #[test]
    fn settings_select_strategy_once() {
        let mut settings = SolverSettings::default();
        let chain = SolverChain::from_settings(&settings, SolverConfig::default());
        assert!(chain.primary.is_none());

        settings.provider = SolverProvider::TwoCaptcha;
        let chain = SolverChain::from_settings(&settings, SolverConfig::default());
        assert_eq!(chain.primary.as_ref().unwrap().name(), "twocaptcha");

        settings.provider = SolverProvider::AntiCaptcha;
        let chain = SolverChain::from_settings(&settings, SolverConfig::default());
        assert_eq!(chain.primary.as_ref().unwrap().name(), "anticaptcha");
    }
}
