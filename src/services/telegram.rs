//! Telegram Bot API boundary.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::sync::Mutex;

use crate::config::{FETCH_TIMEOUT, USER_AGENT};
use crate::error::{AppError, Result};
use crate::models::ChatId;
use crate::utils::http::create_client_with;

const API_BASE: &str = "https://api.telegram.org";

/// Seconds `getUpdates` may hold the connection open waiting for messages.
const LONG_POLL_SECS: u64 = 10;

/// A text message received by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCommand {
    pub chat_id: ChatId,
    pub text: String,
}

/// Outbound and inbound messaging.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Deliver an HTML-formatted message to one chat.
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<()>;

    /// Messages received since the previous call, oldest first.
    async fn receive_pending_commands(&self) -> Result<Vec<InboundCommand>>;
}

#[derive(Debug, Serialize)]
struct SendMessageBody<'a> {
    chat_id: ChatId,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
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
    id: ChatId,
}

/// Telegram client using `getUpdates` long polling.
pub struct TelegramClient {
    client: Client,
    base_url: String,
    /// Next `update_id` to request; updates below it are acknowledged.
    offset: Mutex<Option<i64>>,
}

impl TelegramClient {
    pub fn new(token: &str) -> Result<Self> {
        // The HTTP timeout must outlast the long poll.
        let client = create_client_with(USER_AGENT, FETCH_TIMEOUT)?;
        Ok(Self::with_client(client, API_BASE, token))
    }

    pub fn with_client(client: Client, api_base: &str, token: &str) -> Self {
        Self {
            client,
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
            offset: Mutex::new(None),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    /// Decode an API response, accepting error statuses that carry a body.
    async fn decode<T: DeserializeOwned>(method: &str, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| AppError::telegram(format!("{method}: {status}: {}", e.without_url())))?;

        if !body.ok {
            let reason = body.description.unwrap_or_else(|| "unknown".to_string());
            return Err(AppError::telegram(format!("{method}: {status}: {reason}")));
        }
        body.result
            .ok_or_else(|| AppError::telegram(format!("{method}: missing result")))
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<()> {
        let body = SendMessageBody {
            chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: false,
        };

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::telegram(format!("sendMessage: {}", e.without_url())))?;

        Self::decode::<serde_json::Value>("sendMessage", response).await?;
        Ok(())
    }

    async fn receive_pending_commands(&self) -> Result<Vec<InboundCommand>> {
        let mut offset = self.offset.lock().await;

        let response = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", offset.unwrap_or(0).to_string()),
                ("timeout", LONG_POLL_SECS.to_string()),
            ])
            .send()
            .await
            .map_err(|e| AppError::telegram(format!("getUpdates: {}", e.without_url())))?;

        let updates: Vec<Update> = Self::decode("getUpdates", response).await?;
        let (commands, next) = commands_from_updates(updates);
        if next.is_some() {
            *offset = next;
        }
        Ok(commands)
    }
}

/// Keep text messages and compute the offset acknowledging every update.
fn commands_from_updates(updates: Vec<Update>) -> (Vec<InboundCommand>, Option<i64>) {
    let next = updates.iter().map(|u| u.update_id + 1).max();
    let commands = updates
        .into_iter()
        .filter_map(|u| {
            let message = u.message?;
            let text = message.text?;
            Some(InboundCommand {
                chat_id: message.chat.id,
                text,
            })
        })
        .collect();
    (commands, next)
}
