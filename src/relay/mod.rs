//! Realtime chat channel.
//!
//! A [`Connection`] starts unjoined, becomes joined on a valid `join` frame
//! and stays joined until the socket closes. Each `message` frame is stored,
//! answered by the [`Responder`] and stored again before both messages are
//! pushed back.

mod events;
mod locks;
pub mod socket;

pub use events::{errors, ServerEvent, CONNECTED_GREETING};
pub use locks::{SessionGuard, SessionLocks};

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info};

use crate::assistant::{ChatContext, Responder, SiteStats};
use crate::chat::{ChatSession, NewChatMessage, Sender};
use crate::entity::ProductQuery;
use crate::store::{Storage, StoreResult};

/// Products included in each context snapshot.
const CONTEXT_PRODUCTS: usize = 20;
/// Messages fetched for history, including the one being answered.
const CONTEXT_HISTORY: usize = 10;

/// Shared by every connection.
#[derive(Clone)]
pub struct Relay {
    store: Arc<dyn Storage>,
    responder: Arc<Responder>,
    locks: SessionLocks,
}

impl Relay {
    pub fn new(store: Arc<dyn Storage>, responder: Arc<Responder>) -> Self {
        Self {
            store,
            responder,
            locks: SessionLocks::new(),
        }
    }

    pub fn connect(&self) -> Connection {
        Connection {
            relay: self.clone(),
            session_id: None,
        }
    }

    async fn converse(&self, session_id: &str, content: &str) -> StoreResult<Vec<ServerEvent>> {
        let _guard = self.locks.acquire(session_id).await;

        let Some(session) = self.store.get_chat_session(session_id).await? else {
            return Ok(vec![ServerEvent::error(errors::SESSION_NOT_FOUND)]);
        };

        let sender = if session.is_admin_mode {
            Sender::Admin
        } else {
            Sender::User
        };
        let inbound = self
            .store
            .create_chat_message(NewChatMessage::text(session_id, sender, content))
            .await?;

        let mut context = self.snapshot(&session).await?;
        context.history.retain(|m| m.id != inbound.id);

        let reply = self.responder.respond(content, &context).await;

        let outbound = self
            .store
            .create_chat_message(NewChatMessage::text(
                session_id,
                Sender::Assistant,
                reply.message,
            ))
            .await?;

        let mut events = vec![
            ServerEvent::Message { message: inbound },
            ServerEvent::Message { message: outbound },
        ];

        if reply.enter_admin_mode {
            self.store
                .update_chat_session_admin_mode(session_id, true)
                .await?;
            info!(session_id, "Admin mode activated");
            events.push(ServerEvent::AdminModeActivated {
                session_id: session_id.to_string(),
            });
        }

        Ok(events)
    }

    async fn snapshot(&self, session: &ChatSession) -> StoreResult<ChatContext> {
        let products = self
            .store
            .get_products(&ProductQuery {
                limit: Some(CONTEXT_PRODUCTS),
                ..Default::default()
            })
            .await?;
        let categories = self.store.get_categories().await?;
        let flash_sale = self.store.get_active_flash_sale().await?;
        let history = self
            .store
            .get_chat_messages(&session.session_id, CONTEXT_HISTORY)
            .await?;

        let mut total_partners = 0;
        for category in &categories {
            total_partners += self
                .store
                .get_partners_by_category(&category.slug)
                .await?
                .len();
        }

        let stats = SiteStats {
            total_products: products.len(),
            total_partners,
            active_flash_sales: usize::from(flash_sale.is_some()),
        };

        Ok(ChatContext {
            products,
            categories,
            flash_sale,
            history,
            is_admin_mode: session.is_admin_mode,
            stats: Some(stats),
        })
    }
}

/// Per-socket state.
pub struct Connection {
    relay: Relay,
    session_id: Option<String>,
}

impl Connection {
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Handles one text frame and returns the events to send back, in order.
    /// Never closes the connection.
    pub async fn handle_frame(&mut self, frame: &str) -> Vec<ServerEvent> {
        let Ok(payload) = serde_json::from_str::<Value>(frame) else {
            debug!("Unparseable frame");
            return vec![ServerEvent::error(errors::SERVER_ERROR)];
        };

        match payload.get("type").and_then(Value::as_str) {
            Some("join") => self.join(&payload).await,
            Some("message") => self.message(&payload).await,
            other => {
                debug!(kind = ?other, "Unknown frame type");
                vec![ServerEvent::error(errors::UNKNOWN_TYPE)]
            }
        }
    }

    async fn join(&mut self, payload: &Value) -> Vec<ServerEvent> {
        let Some(session_id) = payload.get("sessionId").and_then(Value::as_str) else {
            return vec![ServerEvent::error(errors::INVALID_SESSION_ID)];
        };

        match self.relay.store.get_chat_session(session_id).await {
            Ok(Some(_)) => {
                info!(session_id, "Connection joined session");
                self.session_id = Some(session_id.to_string());
                vec![ServerEvent::Joined {
                    session_id: session_id.to_string(),
                }]
            }
            Ok(None) => vec![ServerEvent::error(errors::SESSION_NOT_FOUND)],
            Err(e) => {
                error!(error = %e, session_id, "Failed to look up chat session");
                vec![ServerEvent::error(errors::SERVER_ERROR)]
            }
        }
    }

    async fn message(&mut self, payload: &Value) -> Vec<ServerEvent> {
        let Some(session_id) = self.session_id.clone() else {
            return vec![ServerEvent::error(errors::NO_SESSION)];
        };

        let content = match payload.get("content").and_then(Value::as_str) {
            Some(content) if !content.trim().is_empty() => content,
            _ => return vec![ServerEvent::error(errors::CONTENT_REQUIRED)],
        };

        match self.relay.converse(&session_id, content).await {
            Ok(events) => events,
            Err(e) => {
                error!(error = %e, session_id = %session_id, "Failed to process chat message");
                vec![ServerEvent::error(errors::SERVER_ERROR)]
            }
        }
    }
}
