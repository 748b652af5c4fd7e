//! Minimal Telegram Bot API client over plain HTTPS.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::keyboards;
use crate::error::TelegramError;
use crate::models::{Destination, Notification};
use crate::notify::Dispatcher;

const API_BASE: &str = "https://api.telegram.org";

/// Seconds the server holds a `getUpdates` call open
pub const LONG_POLL_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

impl InlineKeyboard {
    pub fn row(mut self, buttons: Vec<InlineButton>) -> Self {
        self.inline_keyboard.push(buttons);
        self
    }
}

pub struct TelegramApi {
    client: reqwest::Client,
    base: String,
}

impl TelegramApi {
    pub fn new(token: &str, request_timeout: Duration) -> anyhow::Result<Self> {
        // Long polls must not be cut short by the client timeout
        let timeout = request_timeout + Duration::from_secs(LONG_POLL_SECS);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base: format!("{}/bot{}", API_BASE, token),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        body: serde_json::Value,
    ) -> Result<T, TelegramError> {
        debug!(method, "Telegram API call");

        let response: ApiResponse<T> = self
            .client
            .post(format!("{}/{}", self.base, method))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        match (response.ok, response.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(TelegramError::Api {
                method,
                description: response
                    .description
                    .unwrap_or_else(|| "unknown".to_string()),
            }),
        }
    }

    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TelegramError> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": LONG_POLL_SECS,
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), TelegramError> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = serde_json::to_value(keyboard)
                .map_err(|e| TelegramError::Api {
                    method: "sendMessage",
                    description: e.to_string(),
                })?;
        }

        let _: serde_json::Value = self.call("sendMessage", body).await?;
        Ok(())
    }

    /// Stop the button spinner, optionally with a short toast
    pub async fn answer_callback(
        &self,
        callback_id: &str,
        toast: Option<&str>,
    ) -> Result<(), TelegramError> {
        let body = callback_answer(callback_id, toast);
        let _: bool = self.call("answerCallbackQuery", body).await?;
        Ok(())
    }
}

fn callback_answer(callback_id: &str, toast: Option<&str>) -> serde_json::Value {
    let mut body = json!({ "callback_query_id": callback_id });
    if let Some(text) = toast {
        body["text"] = json!(text);
    }
    body
}

#[async_trait]
impl Dispatcher for TelegramApi {
    async fn send(&self, destination: Destination, notification: &Notification) -> anyhow::Result<()> {
        let keyboard = keyboards::notification();
        self.send_message(destination, &notification.to_html(), Some(&keyboard))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_callback_update() {
        let raw = r#"{
            "ok": true,
            "result": [{
                "update_id": 81,
                "callback_query": {
                    "id": "4382",
                    "from": {"id": 604303416, "is_bot": false, "first_name": "A"},
                    "message": {"message_id": 7, "chat": {"id": 604303416, "type": "private"}, "date": 0},
                    "data": "pick:5:3"
                }
            }]
        }"#;
        let parsed: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        assert!(parsed.ok);

        let update = &parsed.result.unwrap()[0];
        let callback = update.callback_query.as_ref().unwrap();
        assert_eq!(update.update_id, 81);
        assert_eq!(callback.from.id, 604303416);
        assert_eq!(callback.data.as_deref(), Some("pick:5:3"));
        assert_eq!(callback.message.as_ref().unwrap().chat.id, 604303416);
    }

    #[test]
    fn test_error_response_has_no_result() {
        let raw = r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#;
        let parsed: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        assert!(!parsed.ok);
        assert!(parsed.result.is_none());
        assert_eq!(parsed.description.as_deref(), Some("Unauthorized"));
    }

    #[test]
    fn test_callback_answer_carries_toast() {
        assert_eq!(
            callback_answer("4382", Some("⚠️ That button is outdated")),
            json!({"callback_query_id": "4382", "text": "⚠️ That button is outdated"})
        );
        assert_eq!(callback_answer("4382", None), json!({"callback_query_id": "4382"}));
    }

    #[test]
    fn test_keyboard_serializes_as_reply_markup() {
        let keyboard = InlineKeyboard::default().row(vec![InlineButton::new("🔍 Find", "search")]);
        let value = serde_json::to_value(&keyboard).unwrap();
        assert_eq!(
            value,
            json!({"inline_keyboard": [[{"text": "🔍 Find", "callback_data": "search"}]]})
        );
    }
}
