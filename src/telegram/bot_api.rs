//! Bot API transport: plain HTTPS calls to `{api_base}/bot{token}/{method}`.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, ClientBuilder};
use serde::Deserialize;
use std::path::Path;

use crate::core::config::{self, DeliveryConfig};
use crate::core::error::{AppError, AppResult};
use crate::telegram::media::MediaKind;
use crate::telegram::transport::Transport;

/// Envelope every Bot API method answers with.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    result: Option<serde_json::Value>,
}

/// The part of `getMe` we report.
#[derive(Debug, Clone, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    pub first_name: String,
}

pub struct BotApiTransport {
    client: Client,
    api_url: String,
    token: String,
    chat_id: String,
    max_file_size: u64,
}

impl BotApiTransport {
    pub fn new(config: &DeliveryConfig) -> AppResult<Self> {
        let client = ClientBuilder::new().timeout(config::network::upload_timeout()).build()?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
            max_file_size: config.bot_api_max_size,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    async fn check(method: &str, response: reqwest::Response) -> AppResult<()> {
        Self::unwrap_result(method, response).await.map(|_| ())
    }

    /// Decodes the envelope, returning `result` or the API's complaint.
    async fn unwrap_result(method: &str, response: reqwest::Response) -> AppResult<serde_json::Value> {
        let status = response.status();
        let body: ApiResponse = response.json().await.map_err(|e| {
            AppError::Delivery(format!("{}: unreadable response (HTTP {}): {}", method, status, e))
        })?;
        if body.ok {
            Ok(body.result.unwrap_or(serde_json::Value::Null))
        } else {
            Err(AppError::Delivery(format!(
                "{} rejected ({}): {}",
                method,
                body.error_code.map(|c| c.to_string()).unwrap_or_else(|| status.to_string()),
                body.description.unwrap_or_else(|| "no description".to_string())
            )))
        }
    }

    /// Calls `getMe`, which only needs a valid token.
    pub async fn get_me(&self) -> AppResult<BotIdentity> {
        let response = self
            .client
            .get(self.method_url("getMe"))
            .timeout(config::network::timeout())
            .send()
            .await?;
        let result = Self::unwrap_result("getMe", response).await?;
        Ok(serde_json::from_value(result)?)
    }

    fn method_for(kind: MediaKind) -> (&'static str, &'static str) {
        match kind {
            MediaKind::Video => ("sendVideo", "video"),
            MediaKind::Audio => ("sendAudio", "audio"),
            MediaKind::Photo => ("sendPhoto", "photo"),
            MediaKind::Document => ("sendDocument", "document"),
        }
    }
}

#[async_trait]
impl Transport for BotApiTransport {
    fn name(&self) -> &str {
        "bot_api"
    }

    fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    async fn send_file(&self, kind: MediaKind, path: &Path, caption: &str) -> AppResult<()> {
        let (method, field) = Self::method_for(kind);
        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());

        let part = Part::stream_with_length(Body::from(file), len).file_name(file_name);
        let mut form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption.to_string())
            .part(field, part);
        if kind == MediaKind::Video {
            form = form.text("supports_streaming", "true");
        }

        log::info!("📤 Bot API {} ({} bytes): {}", method, len, path.display());
        let response = self.client.post(self.method_url(method)).multipart(form).send().await?;
        Self::check(method, response).await
    }

    async fn verify(&self) -> AppResult<String> {
        let me = self.get_me().await?;
        log::info!("Bot API token belongs to bot {} ({})", me.first_name, me.id);
        Ok(match me.username {
            Some(username) => format!("@{}", username),
            None => me.first_name,
        })
    }

    async fn send_text(&self, text: &str) -> AppResult<()> {
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .timeout(config::network::timeout())
            .json(&body)
            .send()
            .await?;
        Self::check("sendMessage", response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(server: &MockServer) -> BotApiTransport {
        BotApiTransport::new(&DeliveryConfig::bot_only("123:ABC", "-100777", &server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_send_text_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:ABC/sendMessage"))
            .and(body_string_contains("-100777"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true, "result": {}})))
            .expect(1)
            .mount(&server)
            .await;

        transport(&server).send_text("hello").await.unwrap();
    }

    #[tokio::test]
    async fn test_send_file_uses_media_method() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:ABC/sendAudio"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true, "result": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("track.mp3");
        std::fs::write(&file, b"ID3data").unwrap();

        transport(&server)
            .send_file(MediaKind::Audio, &file, "caption")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_verify_reads_get_me() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bot123:ABC/getMe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": {"id": 123, "is_bot": true, "first_name": "Relay", "username": "relay_bot"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(transport(&server).verify().await.unwrap(), "@relay_bot");
    }

    #[tokio::test]
    async fn test_api_error_is_delivery_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:ABC/sendMessage"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let err = transport(&server).send_text("hello").await.unwrap_err();
        assert!(matches!(err, AppError::Delivery(_)));
        assert!(err.to_string().contains("chat not found"));
    }
}
