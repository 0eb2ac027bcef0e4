//! Wire-level data structures for the reward service.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Base64-transported challenge image, scoped to one handshake attempt.
#[derive(Debug, Clone)]
pub struct ChallengeImage {
    base64: String,
}

impl ChallengeImage {
    pub fn new(base64: impl Into<String>) -> Self {
        Self {
            base64: base64.into(),
        }
    }

    /// Raw base64 payload as the service transported it.
    pub fn as_base64(&self) -> &str {
        &self.base64
    }

    /// Decoded image bytes, for channels that need the actual picture.
    pub fn decode(&self) -> Result<Bytes, base64::DecodeError> {
        BASE64.decode(&self.base64).map(Bytes::from)
    }
}

/// Everything the login endpoint needs for one handshake attempt.
#[derive(Debug, Clone)]
pub struct LoginSubmission<'a> {
    pub login_name: &'a str,
    pub secret: &'a str,
    pub challenge_id: &'a str,
    pub answer: &'a str,
    pub app_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChallengeEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub puzzle_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChallengeImageEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default, rename = "imgBase64")]
    pub img_base64: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginEnvelope {
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub data: Option<LoginData>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginData {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PointsEnvelope {
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub data: Option<PointsData>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Nested point components the service reports; the accrued total is the sum.
#[derive(Debug, Default, Deserialize)]
pub struct PointsData {
    #[serde(default, rename = "rewardPoint")]
    pub reward_point: RewardPoint,
    #[serde(default, rename = "referralPoint")]
    pub referral_point: ReferralPoint,
}

#[derive(Debug, Default, Deserialize)]
pub struct RewardPoint {
    #[serde(default)]
    pub points: f64,
    #[serde(default)]
    pub registerpoints: f64,
    #[serde(default)]
    pub signinpoints: f64,
    #[serde(default)]
    pub twitter_x_id_points: f64,
    #[serde(default)]
    pub discordid_points: f64,
    #[serde(default)]
    pub telegramid_points: f64,
    #[serde(default)]
    pub bonus_points: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReferralPoint {
    #[serde(default)]
    pub commission: f64,
}

impl PointsData {
    /// Accrued total across every reported component.
    pub fn total(&self) -> u64 {
        let sum = self.reward_point.points
            + self.reward_point.registerpoints
            + self.reward_point.signinpoints
            + self.reward_point.twitter_x_id_points
            + self.reward_point.discordid_points
            + self.reward_point.telegramid_points
            + self.reward_point.bonus_points
            + self.referral_point.commission;
        sum.max(0.0).round() as u64
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct KeepAliveEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginPayload<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub logindata: LoginMetadata,
    pub puzzle_id: &'a str,
    pub ans: &'a str,
    pub appid: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginMetadata {
    #[serde(rename = "_v")]
    pub version: VersionTag,
    pub datetime: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct VersionTag {
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct KeepAlivePayload<'a> {
    pub username: &'a str,
    pub extensionid: &'a str,
    pub numberoftabs: u32,
    #[serde(rename = "_v")]
    pub version: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_total_sums_nested_components() {
        let raw = r#"{
            "status": true,
            "data": {
                "rewardPoint": {"points": 10, "registerpoints": 5},
                "referralPoint": {"commission": 2}
            }
        }"#;
        let envelope: PointsEnvelope = serde_json::from_str(raw).unwrap();
        assert!(envelope.status);
        assert_eq!(envelope.data.unwrap().total(), 17);
    }

    #[test]
    fn points_total_defaults_missing_components_to_zero() {
        let raw = r#"{"status": true, "data": {}}"#;
        let envelope: PointsEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.data.unwrap().total(), 0);
    }

    #[test]
    fn challenge_image_round_trips_bytes() {
        let image = ChallengeImage::new("aGVsbG8=");
        assert_eq!(image.decode().unwrap().as_ref(), b"hello");
    }

    #[test]
    fn login_payload_uses_service_field_names() {
        let payload = LoginPayload {
            username: "a@x.com",
            password: "pw",
            logindata: LoginMetadata {
                version: VersionTag { version: "1.1.3" },
                datetime: "2024-01-01T00:00:00Z".into(),
            },
            puzzle_id: "p1",
            ans: "abcd",
            appid: "67aa",
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["logindata"]["_v"]["version"], "1.1.3");
        assert_eq!(json["puzzle_id"], "p1");
        assert_eq!(json["ans"], "abcd");
        assert_eq!(json["appid"], "67aa");
    }
}
