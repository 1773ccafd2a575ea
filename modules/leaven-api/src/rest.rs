use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use leaven_store::{RecordFilter, MAX_LIST_LIMIT};

use crate::AppState;

const DEFAULT_LIMIT: u32 = 200;

#[derive(Deserialize)]
pub struct RestaurantsQuery {
    city: Option<String>,
    state: Option<String>,
    verified: Option<bool>,
    limit: Option<u32>,
}

impl RestaurantsQuery {
    fn into_filter(self) -> RecordFilter {
        let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        RecordFilter {
            city: present(self.city),
            state: present(self.state),
            verified_only: self.verified.unwrap_or(false),
            limit: Some(self.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIST_LIMIT)),
        }
    }
}

pub async fn api_restaurants(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RestaurantsQuery>,
) -> impl IntoResponse {
    let filter = params.into_filter();
    match state.store.list(&filter).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to list restaurants");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn api_restaurant_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let uuid = match Uuid::parse_str(&id) {
        Ok(u) => u,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    match state.store.get(uuid).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(id = %uuid, error = %e, "Failed to load restaurant");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
