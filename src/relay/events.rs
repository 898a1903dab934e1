use serde::{Deserialize, Serialize};

use crate::chat::ChatMessage;

pub const CONNECTED_GREETING: &str = "Connected to Violet AI Chat";

/// Frames pushed to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected {
        message: String,
    },
    Joined {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Message {
        message: ChatMessage,
    },
    AdminModeActivated {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn connected() -> Self {
        Self::Connected {
            message: CONNECTED_GREETING.to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Error texts sent back over the channel.
pub mod errors {
    pub const SERVER_ERROR: &str = "Server error";
    pub const UNKNOWN_TYPE: &str = "Unknown message type";
    pub const NO_SESSION: &str = "No active session";
    pub const INVALID_SESSION_ID: &str = "Invalid session ID";
    pub const SESSION_NOT_FOUND: &str = "Session not found";
    pub const CONTENT_REQUIRED: &str = "Message content required";
}
