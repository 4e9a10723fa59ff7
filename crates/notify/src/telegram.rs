//! Telegram Bot API chat channel with Markdown formatting.
//!
//! Posts to a public channel via `sendMessage`, retracts via
//! `deleteMessage`, and authenticates once at startup with `getMe`.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::traits::{ChatChannel, MessageId, NotifyError};

/// Telegram answers this when the message is already gone.
const ALREADY_DELETED: &str = "message to delete not found";

/// Escapes characters that carry meaning in Telegram's legacy Markdown mode.
pub fn escape_markdown(text: &str) -> String {
    let special = ['_', '*', '`', '['];
    let mut result = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        if special.contains(&ch) {
            result.push('\\');
        }
        result.push(ch);
    }
    result
}

/// Identity returned by `getMe`.
#[derive(Debug, Clone, Deserialize)]
pub struct BotUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

/// Sends messages to one Telegram chat.
#[derive(Debug)]
pub struct TelegramChannel {
    bot_token: String,
    chat_id: String,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    /// Creates a new `TelegramChannel` from configuration values.
    ///
    /// If `bot_token` starts with `${`, the value between `${` and `}` is
    /// resolved as an environment variable name. Returns
    /// [`NotifyError::Config`] if the token is empty or the env var is missing.
    pub fn from_config(
        bot_token: String,
        chat_id: String,
        api_base: impl Into<String>,
    ) -> Result<Self, NotifyError> {
        let resolved_token = if bot_token.starts_with("${") {
            let var_name = bot_token
                .strip_prefix("${")
                .and_then(|s| s.strip_suffix('}'))
                .ok_or_else(|| {
                    NotifyError::Config(format!("Malformed env var reference: {bot_token}"))
                })?;
            std::env::var(var_name).map_err(|_| {
                NotifyError::Config(format!("Environment variable '{var_name}' is not set"))
            })?
        } else {
            bot_token
        };

        if resolved_token.is_empty() {
            return Err(NotifyError::Config(
                "Telegram bot token must not be empty".to_string(),
            ));
        }
        if chat_id.is_empty() {
            return Err(NotifyError::Config(
                "Telegram channel must not be empty".to_string(),
            ));
        }

        Ok(Self {
            bot_token: resolved_token,
            chat_id,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        })
    }

    /// Check the token with `getMe`. Failure here is fatal at startup.
    pub async fn authenticate(&self) -> Result<BotUser, NotifyError> {
        let result = self.call("getMe", json!({})).await?;
        let user: BotUser = serde_json::from_value(result)
            .map_err(|e| NotifyError::Api(format!("unexpected getMe result: {e}")))?;
        tracing::info!(bot_id = user.id, username = ?user.username, "Telegram bot authenticated");
        Ok(user)
    }

    /// Invoke a Bot API method and return its `result` on success.
    async fn call(&self, method: &str, body: Value) -> Result<Value, NotifyError> {
        let url = format!("{}/bot{}/{}", self.api_base, self.bot_token, method);
        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        let resp_body: Value = response.json().await?;

        if resp_body.get("ok") == Some(&Value::Bool(true)) {
            return Ok(resp_body.get("result").cloned().unwrap_or(Value::Null));
        }

        // Handle rate limiting (HTTP 429).
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp_body
                .get("parameters")
                .and_then(|p| p.get("retry_after"))
                .and_then(|v| v.as_u64())
                .unwrap_or(30);
            return Err(NotifyError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        let description = resp_body
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown Telegram API error");

        Err(NotifyError::Api(format!("Telegram {method}: {description}")))
    }
}

#[async_trait::async_trait]
impl ChatChannel for TelegramChannel {
    async fn send_message(&self, text: &str) -> Result<MessageId, NotifyError> {
        tracing::debug!(chat_id = %self.chat_id, "Sending Telegram message");
        let result = self
            .call(
                "sendMessage",
                json!({
                    "chat_id": self.chat_id,
                    "text": text,
                    "parse_mode": "Markdown",
                }),
            )
            .await?;

        let message_id = result
            .get("message_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| NotifyError::Api("sendMessage result without message_id".into()))?;
        tracing::info!(chat_id = %self.chat_id, message_id, "Telegram message sent");
        Ok(message_id)
    }

    async fn delete_message(&self, id: MessageId) -> Result<(), NotifyError> {
        let outcome = self
            .call(
                "deleteMessage",
                json!({ "chat_id": self.chat_id, "message_id": id }),
            )
            .await;
        match outcome {
            Ok(_) => Ok(()),
            Err(NotifyError::Api(msg)) if msg.contains(ALREADY_DELETED) => {
                tracing::debug!(message_id = id, "Telegram message already deleted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn channel_name(&self) -> &str {
        "telegram"
    }
}
