//! Slack Web API client
//!
//! Only the handful of methods the bot needs:
//! - `auth.test` (bot token) - handshake and liveness probe
//! - `apps.connections.open` (app-level token) - Socket Mode URL
//! - `chat.postMessage` (bot token) - channel notices
//! - `users.info` (bot token) - profile lookups

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use super::TransportError;

/// Posts channel notices.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post_message(&self, channel_id: &str, text: &str) -> Result<(), TransportError>;
}

/// Upstream source of user profiles.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_info(&self, user_id: &str) -> Result<UserInfo, TransportError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserInfo {
    pub user_id: String,
    pub real_name: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthIdentity {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub team: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    body: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ConnectionsOpen {
    url: String,
}

#[derive(Debug, Deserialize)]
struct UsersInfo {
    user: SlackUser,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    id: String,
    #[serde(default)]
    real_name: String,
    #[serde(default)]
    profile: SlackProfile,
}

#[derive(Debug, Default, Deserialize)]
struct SlackProfile {
    #[serde(default)]
    real_name: String,
    #[serde(default)]
    image_192: String,
}

#[derive(Debug, Deserialize)]
struct Empty {}

pub struct SlackApi {
    http: Client,
    base_url: String,
    bot_token: String,
    app_token: String,
}

impl SlackApi {
    pub fn new(base_url: &str, bot_token: &str, app_token: &str) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
            app_token: app_token.to_string(),
        })
    }

    pub async fn auth_test(&self) -> Result<AuthIdentity, TransportError> {
        let request = self
            .http
            .post(self.url("auth.test"))
            .bearer_auth(&self.bot_token);
        self.call("auth.test", request).await
    }

    /// Ask for a fresh Socket Mode websocket URL.
    pub async fn open_connection(&self) -> Result<String, TransportError> {
        let request = self
            .http
            .post(self.url("apps.connections.open"))
            .bearer_auth(&self.app_token);
        let opened: ConnectionsOpen = self.call("apps.connections.open", request).await?;
        Ok(opened.url)
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, TransportError> {
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(TransportError::Api(format!(
                "{} returned HTTP {}",
                method,
                response.status()
            )));
        }
        let envelope: Envelope<T> = response.json().await?;
        decode_envelope(method, envelope)
    }
}

fn decode_envelope<T>(method: &str, envelope: Envelope<T>) -> Result<T, TransportError> {
    if !envelope.ok {
        return Err(TransportError::Api(format!(
            "{}: {}",
            method,
            envelope.error.unwrap_or_else(|| "unknown_error".to_string())
        )));
    }
    envelope
        .body
        .ok_or_else(|| TransportError::Api(format!("{}: malformed response", method)))
}

#[async_trait]
impl Notifier for SlackApi {
    async fn post_message(&self, channel_id: &str, text: &str) -> Result<(), TransportError> {
        let request = self
            .http
            .post(self.url("chat.postMessage"))
            .bearer_auth(&self.bot_token)
            .json(&serde_json::json!({ "channel": channel_id, "text": text }));
        let _: Empty = self.call("chat.postMessage", request).await?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for SlackApi {
    async fn user_info(&self, user_id: &str) -> Result<UserInfo, TransportError> {
        let request = self
            .http
            .get(self.url("users.info"))
            .bearer_auth(&self.bot_token)
            .query(&[("user", user_id)]);
        let info: UsersInfo = self.call("users.info", request).await?;
        Ok(info.user.into())
    }
}

impl From<SlackUser> for UserInfo {
    fn from(user: SlackUser) -> Self {
        let real_name = if user.real_name.is_empty() {
            user.profile.real_name
        } else {
            user.real_name
        };
        UserInfo {
            user_id: user.id,
            real_name,
            avatar_url: user.profile.image_192,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_users_info() {
        let raw = r#"{
            "ok": true,
            "user": {
                "id": "U1",
                "real_name": "",
                "profile": {"real_name": "Grace Hopper", "image_192": "https://img/192.png"}
            }
        }"#;
        let envelope: Envelope<UsersInfo> = serde_json::from_str(raw).unwrap();
        let info: UserInfo = decode_envelope("users.info", envelope).unwrap().user.into();
        assert_eq!(info.real_name, "Grace Hopper");
        assert_eq!(info.avatar_url, "https://img/192.png");
    }

    #[test]
    fn test_decode_api_error() {
        let raw = r#"{"ok": false, "error": "invalid_auth"}"#;
        let envelope: Envelope<Empty> = serde_json::from_str(raw).unwrap();
        match decode_envelope("auth.test", envelope) {
            Err(TransportError::Api(msg)) => assert_eq!(msg, "auth.test: invalid_auth"),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_decode_connections_open() {
        let raw = r#"{"ok": true, "url": "wss://wss-primary.slack.com/link/?ticket=abc"}"#;
        let envelope: Envelope<ConnectionsOpen> = serde_json::from_str(raw).unwrap();
        let opened = decode_envelope("apps.connections.open", envelope).unwrap();
        assert!(opened.url.starts_with("wss://"));
    }
}
