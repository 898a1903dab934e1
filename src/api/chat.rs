use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::chat::{ChatMessage, ChatSession, NewChatSession};
use crate::error::ApiResult;
use crate::store::Storage;

/// History returned to the widget when it reconnects.
const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    user_id: Option<String>,
}

/// The body is optional; anything unreadable is treated as anonymous.
pub async fn create_session(
    State(store): State<Arc<dyn Storage>>,
    body: Option<Json<SessionRequest>>,
) -> ApiResult<(StatusCode, Json<ChatSession>)> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let session = store
        .create_chat_session(NewChatSession {
            session_id: Uuid::new_v4().to_string(),
            is_admin_mode: false,
            user_id: request.user_id.filter(|id| !id.is_empty()),
        })
        .await?;
    info!(session_id = %session.session_id, "Chat session created");
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn list_messages(
    State(store): State<Arc<dyn Storage>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    Ok(Json(
        store.get_chat_messages(&session_id, HISTORY_LIMIT).await?,
    ))
}
