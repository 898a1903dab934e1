use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    /// Token handed to the client; messages and the relay refer to sessions by it.
    pub session_id: String,
    pub is_admin_mode: bool,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewChatSession {
    pub session_id: String,
    pub is_admin_mode: bool,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
    Admin,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
            Sender::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Sender::User),
            "assistant" => Some(Sender::Assistant),
            "admin" => Some(Sender::Admin),
            _ => None,
        }
    }

    /// Role used when replaying this message to the completion service.
    pub fn prompt_role(&self) -> PromptRole {
        match self {
            Sender::User | Sender::Admin => PromptRole::User,
            Sender::Assistant => PromptRole::Assistant,
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    System,
    ProductRecommendation,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::System => "system",
            MessageType::ProductRecommendation => "product_recommendation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(MessageType::Text),
            "system" => Some(MessageType::System),
            "product_recommendation" => Some(MessageType::ProductRecommendation),
            _ => None,
        }
    }
}

/// Extra data attached to non-text messages. The variant must agree with the
/// message's [`MessageType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageMetadata {
    #[serde(rename_all = "camelCase")]
    ProductRecommendation { product_ids: Vec<String> },
    System { event: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    /// Token of the owning [`ChatSession`].
    pub session_id: String,
    pub sender: Sender,
    pub message: String,
    pub message_type: MessageType,
    pub metadata: Option<MessageMetadata>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub session_id: String,
    pub sender: Sender,
    pub message: String,
    pub message_type: MessageType,
    pub metadata: Option<MessageMetadata>,
}

impl NewChatMessage {
    pub fn text(session_id: impl Into<String>, sender: Sender, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            sender,
            message: message.into(),
            message_type: MessageType::Text,
            metadata: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match (&self.message_type, &self.metadata) {
            (MessageType::Text, None)
            | (MessageType::System, None | Some(MessageMetadata::System { .. }))
            | (
                MessageType::ProductRecommendation,
                Some(MessageMetadata::ProductRecommendation { .. }),
            ) => Ok(()),
            (kind, Some(_)) => Err(format!("metadata does not match message type {}", kind.as_str())),
            (kind, None) => Err(format!("message type {} requires metadata", kind.as_str())),
        }
    }
}
