use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::application::{SinkError, SinkGateway};
use crate::domain::{MessageHandle, Projection, SinkTargetId};

/// Telegram Bot API sink. One status message per chat, edited in place;
/// a 400 whose description says the message is gone maps to
/// `SinkError::NotFound` so the watcher can recreate.
pub struct TelegramGateway {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramGateway {
    pub fn new(bot_token: &str) -> Self {
        Self::with_base_url(format!("https://api.telegram.org/bot{bot_token}"))
    }

    pub fn with_base_url(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    async fn call<P: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        payload: &P,
    ) -> Result<R, SinkError> {
        let url = format!("{}/{}", self.base_url, method);

        let resp = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| SinkError::Transient(e.to_string()))?;

        let body: ApiResponse<R> = resp
            .json()
            .await
            .map_err(|e| SinkError::Transient(e.to_string()))?;

        if !body.ok {
            let description = body.description.unwrap_or_else(|| "unknown error".into());
            if is_gone(&description) {
                return Err(SinkError::NotFound(description));
            }
            return Err(SinkError::Transient(format!("{method}: {description}")));
        }

        body.result
            .ok_or_else(|| SinkError::Transient(format!("{method}: empty result")))
    }
}

/// Telegram reports a missing message as ok=false with a descriptive
/// string, not a distinct status code.
fn is_gone(description: &str) -> bool {
    let d = description.to_ascii_lowercase();
    d.contains("message to edit not found")
        || d.contains("message to delete not found")
        || d.contains("message not found")
        || d.contains("message can't be edited")
}

#[derive(Debug, Deserialize)]
struct ApiResponse<R> {
    ok: bool,
    result: Option<R>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageResult {
    message_id: i64,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboard<'a>>,
}

#[derive(Debug, Serialize)]
struct EditMessageText<'a> {
    chat_id: &'a str,
    message_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboard<'a>>,
}

#[derive(Debug, Serialize)]
struct MessageRef<'a> {
    chat_id: &'a str,
    message_id: i64,
}

#[derive(Debug, Serialize)]
struct PinMessage<'a> {
    chat_id: &'a str,
    message_id: i64,
    disable_notification: bool,
}

#[derive(Debug, Serialize)]
struct InlineKeyboard<'a> {
    inline_keyboard: Vec<Vec<UrlButton<'a>>>,
}

#[derive(Debug, Serialize)]
struct UrlButton<'a> {
    text: &'a str,
    url: &'a str,
}

fn keyboard(projection: &Projection) -> Option<InlineKeyboard<'_>> {
    projection.action_url.as_deref().map(|url| InlineKeyboard {
        inline_keyboard: vec![vec![UrlButton { text: "Open", url }]],
    })
}

fn parse_handle(handle: &MessageHandle) -> Result<i64, SinkError> {
    handle
        .as_str()
        .parse()
        .map_err(|_| SinkError::Transient(format!("bad message handle: {handle}")))
}

#[async_trait]
impl SinkGateway for TelegramGateway {
    async fn create(
        &self,
        target: &SinkTargetId,
        projection: &Projection,
    ) -> Result<MessageHandle, SinkError> {
        let payload = SendMessage {
            chat_id: target.as_str(),
            text: &projection.rendered_text,
            reply_markup: keyboard(projection),
        };
        let sent: MessageResult = self.call("sendMessage", &payload).await?;
        Ok(MessageHandle::new(sent.message_id.to_string()))
    }

    async fn update(
        &self,
        target: &SinkTargetId,
        handle: &MessageHandle,
        projection: &Projection,
    ) -> Result<MessageHandle, SinkError> {
        let payload = EditMessageText {
            chat_id: target.as_str(),
            message_id: parse_handle(handle)?,
            text: &projection.rendered_text,
            reply_markup: keyboard(projection),
        };
        let edited: MessageResult = self.call("editMessageText", &payload).await?;
        Ok(MessageHandle::new(edited.message_id.to_string()))
    }

    async fn remove(&self, target: &SinkTargetId, handle: &MessageHandle) -> Result<(), SinkError> {
        let payload = MessageRef {
            chat_id: target.as_str(),
            message_id: parse_handle(handle)?,
        };
        let _: bool = self.call("deleteMessage", &payload).await?;
        Ok(())
    }

    async fn pin(&self, target: &SinkTargetId, handle: &MessageHandle) -> Result<(), SinkError> {
        let payload = PinMessage {
            chat_id: target.as_str(),
            message_id: parse_handle(handle)?,
            disable_notification: true,
        };
        let _: bool = self.call("pinChatMessage", &payload).await?;
        Ok(())
    }
}
