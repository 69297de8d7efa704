//! Companion bot: `/start` answers with a button that opens the mini app,
//! any other text is echoed back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub const START_COMMAND: &str = "/start";
pub const START_REPLY: &str = "this is a mini app bot";
pub const START_BUTTON_TEXT: &str = "Start MiniApp";

#[derive(Debug, Error)]
pub enum BotError {
    #[error("bot api request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("bot api returned error: {0}")]
    Api(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebAppInfo {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_app: Option<WebAppInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendMessage {
    pub chat_id: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboardMarkup>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, BotError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(BotError::Api(
                self.description
                    .unwrap_or_else(|| "response without result".to_string()),
            )),
        }
    }
}

/// Bot API calls the poller needs.
#[async_trait]
pub trait BotApi: Send + Sync {
    async fn get_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>, BotError>;
    async fn send_message(&self, message: &SendMessage) -> Result<(), BotError>;
}

#[derive(Serialize)]
struct GetUpdates {
    offset: i64,
    timeout: u64,
    allowed_updates: [&'static str; 1],
}

/// Bot API over HTTPS.
#[derive(Clone)]
pub struct HttpBotApi {
    base: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpBotApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBotApi").finish_non_exhaustive()
    }
}

impl HttpBotApi {
    pub fn new(api_url: &str, token: &str, poll_timeout: Duration) -> Result<Self, BotError> {
        let client = reqwest::Client::builder()
            .timeout(poll_timeout + Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base: format!("{}/bot{token}", api_url.trim_end_matches('/')),
            client,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.base)
    }
}

#[async_trait]
impl BotApi for HttpBotApi {
    async fn get_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>, BotError> {
        let body = GetUpdates {
            offset,
            timeout: timeout.as_secs(),
            allowed_updates: ["message"],
        };
        let resp = self
            .client
            .post(self.method_url("getUpdates"))
            .json(&body)
            .send()
            .await?;
        resp.json::<ApiResponse<Vec<Update>>>().await?.into_result()
    }

    async fn send_message(&self, message: &SendMessage) -> Result<(), BotError> {
        let resp = self
            .client
            .post(self.method_url("sendMessage"))
            .json(message)
            .send()
            .await?;
        resp.json::<ApiResponse<serde_json::Value>>()
            .await?
            .into_result()
            .map(|_| ())
    }
}

pub struct Bot {
    api: Arc<dyn BotApi>,
    miniapp_url: String,
    poll_timeout: Duration,
    error_backoff: Duration,
}

impl Bot {
    pub fn new(api: Arc<dyn BotApi>, miniapp_url: impl Into<String>, poll_timeout: Duration) -> Self {
        Self {
            api,
            miniapp_url: miniapp_url.into(),
            poll_timeout,
            error_backoff: Duration::from_secs(1),
        }
    }

    #[cfg(test)]
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Reply for a single message, if any.
    pub fn reply_for(&self, message: &Message) -> Option<SendMessage> {
        let text = message.text.as_deref()?;
        if text == START_COMMAND {
            return Some(SendMessage {
                chat_id: message.chat.id,
                text: START_REPLY.to_string(),
                reply_markup: Some(InlineKeyboardMarkup {
                    inline_keyboard: vec![vec![InlineKeyboardButton {
                        text: START_BUTTON_TEXT.to_string(),
                        web_app: Some(WebAppInfo {
                            url: self.miniapp_url.clone(),
                        }),
                    }]],
                }),
            });
        }
        Some(SendMessage {
            chat_id: message.chat.id,
            text: text.to_string(),
            reply_markup: None,
        })
    }

    /// Handles one batch of updates and returns the next polling offset.
    pub async fn handle_updates(&self, offset: i64, updates: Vec<Update>) -> i64 {
        let mut next = offset;
        for update in updates {
            next = next.max(update.update_id + 1);
            let Some(message) = update.message else {
                debug!(update_id = update.update_id, "skipping update without message");
                continue;
            };
            let Some(reply) = self.reply_for(&message) else {
                continue;
            };
            if let Err(err) = self.api.send_message(&reply).await {
                warn!(chat_id = reply.chat_id, %err, "failed to send bot reply");
            }
        }
        next
    }

    /// Long-polls until `shutdown` flips.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        info!("bot starting");
        let mut offset = 0;
        loop {
            let polled = tokio::select! {
                _ = crate::shutdown::requested(shutdown.clone()) => break,
                polled = self.api.get_updates(offset, self.poll_timeout) => polled,
            };
            match polled {
                Ok(updates) => offset = self.handle_updates(offset, updates).await,
                Err(err) => {
                    warn!(%err, "bot polling failed");
                    tokio::select! {
                        _ = crate::shutdown::requested(shutdown.clone()) => break,
                        _ = sleep(self.error_backoff) => {}
                    }
                }
            }
        }
        info!("bot stopped");
    }
}
