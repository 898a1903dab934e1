use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::entity::{is_valid_email, NewOrder, NewSubscription, NewUser, Order, User};
use crate::error::{ApiError, ApiResult};
use crate::store::Storage;

pub async fn create_user(
    State(store): State<Arc<dyn Storage>>,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let Json(user) = payload?;
    let user = user.normalize().map_err(ApiError::BadRequest)?;
    let created = store.create_user(user).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn subscribe(
    State(store): State<Arc<dyn Storage>>,
    payload: Result<Json<NewSubscription>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(NewSubscription { email }) = payload?;
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::BadRequest("invalid email address".into()));
    }

    let subscription = store.subscribe_newsletter(NewSubscription { email }).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Successfully subscribed to newsletter",
            "subscription": subscription,
        })),
    ))
}

pub async fn create_order(
    State(store): State<Arc<dyn Storage>>,
    payload: Result<Json<NewOrder>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Order>)> {
    let Json(order) = payload?;
    order.validate().map_err(ApiError::BadRequest)?;
    let created = store.create_order(order).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_order(
    State(store): State<Arc<dyn Storage>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Order>> {
    store
        .get_order(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Order"))
}

pub async fn user_orders(
    State(store): State<Arc<dyn Storage>>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<Order>>> {
    Ok(Json(store.get_user_orders(&user_id).await?))
}
