use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::entity::{NewPartner, Partner};
use crate::error::{ApiError, ApiResult};
use crate::store::Storage;

#[derive(Debug, Deserialize)]
pub struct PartnerParams {
    category: Option<String>,
}

/// Approved partners in one category. The category is required.
pub async fn list_partners(
    State(store): State<Arc<dyn Storage>>,
    params: Result<Query<PartnerParams>, QueryRejection>,
) -> ApiResult<Json<Vec<Partner>>> {
    let Query(params) = params?;
    let category = params
        .category
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Category parameter required".into()))?;
    Ok(Json(store.get_partners_by_category(&category).await?))
}

pub async fn create_partner(
    State(store): State<Arc<dyn Storage>>,
    payload: Result<Json<NewPartner>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Partner>)> {
    let Json(partner) = payload?;
    partner.validate().map_err(ApiError::BadRequest)?;

    let created = store.create_partner(partner).await?;
    info!(partner_id = %created.id, category = %created.category, "Partner application received");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn approve_partner(
    State(store): State<Arc<dyn Storage>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Partner>> {
    let partner = store
        .approve_partner(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Partner"))?;
    info!(partner_id = %partner.id, category = %partner.category, "Partner approved");
    Ok(Json(partner))
}
