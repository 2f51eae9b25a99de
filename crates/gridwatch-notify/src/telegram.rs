//! Telegram Bot API client — long polling + message sending.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use gridwatch_core::config::TelegramConfig;
use gridwatch_core::error::{GridWatchError, Result};

/// Telegram Bot API client. Update offset is tracked internally so the
/// polling loop and the dispatcher can share one client.
pub struct TelegramClient {
    config: TelegramConfig,
    client: reqwest::Client,
    last_update_id: AtomicI64,
}

impl TelegramClient {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            last_update_id: AtomicI64::new(0),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{}",
            self.config.bot_token, method
        )
    }

    /// Get bot info.
    pub async fn get_me(&self) -> Result<TelegramUser> {
        let response = self
            .client
            .get(self.api_url("getMe"))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| GridWatchError::Channel(format!("getMe failed: {e}")))?;
        let body: TelegramApiResponse<TelegramUser> = response
            .json()
            .await
            .map_err(|e| GridWatchError::Channel(format!("Invalid getMe response: {e}")))?;
        body.result
            .ok_or_else(|| GridWatchError::Channel("No bot info".into()))
    }

    /// Get updates using long polling.
    pub async fn get_updates(&self) -> Result<Vec<TelegramUpdate>> {
        let offset = self.last_update_id.load(Ordering::Relaxed) + 1;
        let response = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", self.config.poll_timeout_secs.to_string()),
                ("allowed_updates", "[\"message\"]".into()),
            ])
            .timeout(Duration::from_secs(self.config.poll_timeout_secs + 10))
            .send()
            .await
            .map_err(|e| GridWatchError::Channel(format!("getUpdates failed: {e}")))?;

        let body: TelegramApiResponse<Vec<TelegramUpdate>> = response
            .json()
            .await
            .map_err(|e| GridWatchError::Channel(format!("Invalid updates response: {e}")))?;

        if !body.ok {
            return Err(GridWatchError::Channel(format!(
                "Telegram API error: {}",
                body.description.unwrap_or_default()
            )));
        }

        let updates = body.result.unwrap_or_default();
        if let Some(last) = updates.last() {
            self.last_update_id.store(last.update_id, Ordering::Relaxed);
        }
        Ok(updates)
    }

    /// Send a text message.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| GridWatchError::Channel(format!("sendMessage failed: {e}")))?;

        let result: TelegramApiResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| GridWatchError::Channel(format!("Invalid send response: {e}")))?;

        if !result.ok {
            return Err(GridWatchError::Channel(format!(
                "Send to {chat_id} failed: {}",
                result.description.unwrap_or_default()
            )));
        }
        Ok(())
    }
}

/// Escape Telegram MarkdownV1 special characters.
pub fn escape_markdown(s: &str) -> String {
    s.replace('_', "\\_")
        .replace('*', "\\*")
        .replace('[', "\\[")
        .replace('`', "\\`")
}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub text: Option<String>,
    pub date: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
    pub title: Option<String>,
}

impl TelegramUpdate {
    /// The (command, args) of a "/cmd arg arg" message from a human, if any.
    /// Strips the "@botname" suffix used in group chats.
    pub fn command(&self) -> Option<(String, Vec<String>, &TelegramMessage)> {
        let msg = self.message.as_ref()?;
        let text = msg.text.as_ref()?;
        if msg.from.as_ref().is_some_and(|u| u.is_bot) {
            return None;
        }
        let mut parts = text.split_whitespace();
        let first = parts.next()?;
        if !first.starts_with('/') {
            return None;
        }
        let command = first
            .split('@')
            .next()
            .unwrap_or(first)
            .trim_start_matches('/')
            .to_lowercase();
        let args: Vec<String> = parts.map(str::to_string).collect();
        Some((command, args, msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(text: &str, is_bot: bool) -> TelegramUpdate {
        TelegramUpdate {
            update_id: 1,
            message: Some(TelegramMessage {
                message_id: 10,
                from: Some(TelegramUser {
                    id: 42,
                    is_bot,
                    first_name: "Ivan".into(),
                    last_name: None,
                    username: Some("ivan".into()),
                }),
                chat: TelegramChat {
                    id: -100,
                    chat_type: "group".into(),
                    title: None,
                },
                text: Some(text.into()),
                date: 0,
            }),
        }
    }

    #[test]
    fn test_command_parsing() {
        let upd = update("/register 1.1 Ivan", false);
        let (cmd, args, msg) = upd.command().unwrap();
        assert_eq!(cmd, "register");
        assert_eq!(args, vec!["1.1", "Ivan"]);
        assert_eq!(msg.chat.id, -100);
    }

    #[test]
    fn test_command_with_bot_suffix() {
        let (cmd, args, _) = update("/calculate@gridwatch_bot", false).command().unwrap();
        assert_eq!(cmd, "calculate");
        assert!(args.is_empty());
    }

    #[test]
    fn test_non_commands_ignored() {
        assert!(update("hello there", false).command().is_none());
        assert!(update("/start", true).command().is_none()); // bot messages skipped
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("a_b*c"), "a\\_b\\*c");
    }
}
