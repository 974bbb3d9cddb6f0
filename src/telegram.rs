use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::notify::{Alert, AlertSink, NotifyError};
use crate::render;
use crate::subscriptions::UserId;

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("API error {status}: {description}")]
    Api { status: u16, description: String },
    #[error("BOT_TOKEN not configured")]
    MissingToken,
}

// Inbound webhook payloads

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub inline_query: Option<InlineQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
}

impl Message {
    /// The sender, falling back to the chat for channel posts.
    pub fn user_id(&self) -> UserId {
        self.from.as_ref().map(|u| u.id).unwrap_or(self.chat.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// Text typed after the bot's @name in any chat.
#[derive(Debug, Clone, Deserialize)]
pub struct InlineQuery {
    pub id: String,
    pub from: TelegramUser,
    #[serde(default)]
    pub query: String,
}

/// One article offered in reply to an inline query.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineArticle {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Markdown sent to the chat when the article is picked.
    pub message_text: String,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Debug, Serialize)]
struct AnswerInlineQueryRequest<'a> {
    inline_query_id: &'a str,
    results: Vec<InlineQueryResult<'a>>,
    cache_time: u32,
}

#[derive(Debug, Serialize)]
struct InlineQueryResult<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: &'a str,
    title: &'a str,
    description: &'a str,
    input_message_content: InputTextMessageContent<'a>,
}

#[derive(Debug, Serialize)]
struct InputTextMessageContent<'a> {
    message_text: &'a str,
    parse_mode: &'static str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramClient {
    client: Client,
    base_url: String,
    token: String,
}

impl TelegramClient {
    pub fn new(config: &Config) -> Result<Self, TelegramError> {
        let token = config.bot_token.clone().ok_or(TelegramError::MissingToken)?;
        let client = Client::builder()
            .user_agent("WeatherNotifier/1.0")
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.telegram_base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        let request = SendMessageRequest {
            chat_id,
            text,
            parse_mode: "Markdown",
        };
        self.call("sendMessage", &request).await
    }

    pub async fn answer_inline_query(
        &self,
        inline_query_id: &str,
        articles: &[InlineArticle],
        cache_time: u32,
    ) -> Result<(), TelegramError> {
        let results = articles
            .iter()
            .map(|article| InlineQueryResult {
                kind: "article",
                id: &article.id,
                title: &article.title,
                description: &article.description,
                input_message_content: InputTextMessageContent {
                    message_text: &article.message_text,
                    parse_mode: "Markdown",
                },
            })
            .collect();
        let request = AnswerInlineQueryRequest {
            inline_query_id,
            results,
            cache_time,
        };
        self.call("answerInlineQuery", &request).await
    }

    async fn call<T: Serialize>(&self, method: &str, request: &T) -> Result<(), TelegramError> {
        let url = format!("{}/bot{}/{}", self.base_url, self.token, method);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| TelegramError::RequestFailed(e.without_url()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        // Telegram explains failures in the body; fall back to the status line
        let description = match response.json::<ApiResponse>().await {
            Ok(body) if !body.ok => body.description.unwrap_or_default(),
            _ => status.canonical_reason().unwrap_or("unknown").to_string(),
        };
        Err(TelegramError::Api {
            status: status.as_u16(),
            description,
        })
    }
}

impl AlertSink for TelegramClient {
    async fn deliver(&self, user_id: UserId, alert: &Alert) -> Result<(), NotifyError> {
        self.send_message(user_id, &render::alert_text(alert)).await?;
        Ok(())
    }
}
