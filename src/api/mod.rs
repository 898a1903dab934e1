//! HTTP surface: the REST endpoints and the `/ws` upgrade.

mod accounts;
mod catalog;
mod chat;
mod partners;

use std::sync::Arc;

use axum::{
    extract::FromRef,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::assistant::Responder;
use crate::relay::{socket, Relay};
use crate::store::Storage;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: Arc<dyn Storage>,
    pub relay: Relay,
}

impl AppState {
    pub fn new(store: Arc<dyn Storage>, responder: Responder) -> Self {
        let relay = Relay::new(store.clone(), Arc::new(responder));
        Self { store, relay }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/categories", get(catalog::list_categories))
        .route("/api/categories/:slug", get(catalog::get_category))
        .route(
            "/api/products",
            get(catalog::list_products).post(catalog::create_product),
        )
        .route("/api/products/:id", get(catalog::get_product))
        .route("/api/flash-sale", get(catalog::active_flash_sale))
        .route(
            "/api/partners",
            get(partners::list_partners).post(partners::create_partner),
        )
        .route("/api/partners/:id/approve", post(partners::approve_partner))
        .route("/api/users", post(accounts::create_user))
        .route("/api/users/:id/orders", get(accounts::user_orders))
        .route("/api/orders", post(accounts::create_order))
        .route("/api/orders/:id", get(accounts::get_order))
        .route("/api/newsletter", post(accounts::subscribe))
        .route("/api/chat/session", post(chat::create_session))
        .route("/api/chat/messages/:session_id", get(chat::list_messages))
        .route("/ws", get(socket::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
