use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::warn;

use crate::compliance;
use crate::entity::{Category, FlashSale, NewProduct, Product, ProductQuery};
use crate::error::{ApiError, ApiResult};
use crate::store::Storage;

pub async fn list_categories(
    State(store): State<Arc<dyn Storage>>,
) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(store.get_categories().await?))
}

pub async fn get_category(
    State(store): State<Arc<dyn Storage>>,
    Path(slug): Path<String>,
) -> ApiResult<Json<Category>> {
    store
        .get_category_by_slug(&slug)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Category"))
}

/// Raw query string; parsed by hand so bad values get a readable 400.
#[derive(Debug, Default, Deserialize)]
pub struct ProductParams {
    limit: Option<String>,
    category: Option<String>,
    featured: Option<String>,
}

impl ProductParams {
    fn into_query(self) -> Result<ProductQuery, ApiError> {
        let limit = match self.limit.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<usize>().map_err(|_| {
                ApiError::BadRequest("limit must be a non-negative integer".into())
            })?),
        };
        let featured = match self.featured.as_deref().map(str::trim) {
            None | Some("") => None,
            Some("true") => Some(true),
            Some("false") => Some(false),
            Some(_) => {
                return Err(ApiError::BadRequest(
                    "featured must be true or false".into(),
                ))
            }
        };
        let category = self.category.filter(|c| !c.trim().is_empty());
        Ok(ProductQuery {
            limit,
            category,
            featured,
        })
    }
}

pub async fn list_products(
    State(store): State<Arc<dyn Storage>>,
    params: Result<Query<ProductParams>, axum::extract::rejection::QueryRejection>,
) -> ApiResult<Json<Vec<Product>>> {
    let Query(params) = params?;
    let query = params.into_query()?;
    Ok(Json(store.get_products(&query).await?))
}

pub async fn get_product(
    State(store): State<Arc<dyn Storage>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Product>> {
    store
        .get_product(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Product"))
}

pub async fn create_product(
    State(store): State<Arc<dyn Storage>>,
    payload: Result<Json<NewProduct>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    let Json(product) = payload?;
    product.validate().map_err(ApiError::BadRequest)?;

    let verdict = compliance::check_product(&product.description);
    if !verdict.is_compliant {
        warn!(violations = ?verdict.violations, name = %product.name, "Rejected product listing");
        return Err(ApiError::BadRequest(format!(
            "Product description violates content policy: {}",
            verdict.violations.join("; ")
        )));
    }
    if !verdict.warnings.is_empty() {
        warn!(warnings = ?verdict.warnings, name = %product.name, "Product listing has compliance warnings");
    }

    let created = store.create_product(product).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `null` when no sale is running.
pub async fn active_flash_sale(
    State(store): State<Arc<dyn Storage>>,
) -> ApiResult<Json<Option<FlashSale>>> {
    Ok(Json(store.get_active_flash_sale().await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(limit: Option<&str>, featured: Option<&str>) -> ProductParams {
        ProductParams {
            limit: limit.map(str::to_string),
            category: None,
            featured: featured.map(str::to_string),
        }
    }

    #[test]
    fn query_values_are_checked() {
        let query = params(Some("5"), Some("true")).into_query().unwrap();
        assert_eq!(query.limit, Some(5));
        assert_eq!(query.featured, Some(true));

        assert!(params(Some("-1"), None).into_query().is_err());
        assert!(params(Some("ten"), None).into_query().is_err());
        assert!(params(None, Some("yes")).into_query().is_err());

        let query = ProductParams::default().into_query().unwrap();
        assert_eq!(query.limit(), 20);
    }
}
