//! HTTP surface.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::agent::{ChatReply, ChatRequest};
use crate::error::{Result, WhatnextError};
use crate::locations::{GeoPoint, Location, NearbyQuery, SortKey, MATCH_ANY_CATEGORIES};
use crate::profiles::{ProfileStore, TagsUpdate, UserProfile, UserTags};
use crate::services::Services;

pub const DEFAULT_LATITUDE: f64 = 32.8723812680163;
pub const DEFAULT_LONGITUDE: f64 = -117.21242234341588;
const DEFAULT_NEARBY_LIMIT: usize = 20;
const DEFAULT_NEARBY_RADIUS: f64 = 10_000.0;

pub struct AppState {
    pub services: Services,
}

impl IntoResponse for WhatnextError {
    fn into_response(self) -> Response {
        let status = match &self {
            WhatnextError::Validation(_) => StatusCode::BAD_REQUEST,
            WhatnextError::NotFound(_) => StatusCode::NOT_FOUND,
            WhatnextError::Upstream(_) => StatusCode::BAD_GATEWAY,
            WhatnextError::QueryFailed(_)
            | WhatnextError::Storage(_)
            | WhatnextError::Config(_)
            | WhatnextError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(status = %status, "Request failed: {}", self);
        }
        let detail = match self {
            WhatnextError::Validation(msg)
            | WhatnextError::NotFound(msg)
            | WhatnextError::QueryFailed(msg)
            | WhatnextError::Storage(msg)
            | WhatnextError::Upstream(msg)
            | WhatnextError::Config(msg)
            | WhatnextError::Internal(msg) => msg,
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(status_handler))
        .route("/chatgpt_response", post(chat_handler))
        .route("/nearby_locations", get(nearby_handler))
        .route("/user_info", post(user_info_handler))
        .route("/tags_info", post(tags_info_handler))
        .route("/update_tags", post(update_tags_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(bind_addr: &str, services: Services) -> Result<()> {
    let app = router(Arc::new(AppState { services }));
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| WhatnextError::Config(format!("Failed to bind {}: {}", bind_addr, e)))?;
    info!(bind_addr, "[Gateway] Listening");
    axum::serve(listener, app.into_make_service())
        .await
        .map_err(|e| WhatnextError::Internal(format!("server error: {}", e)))
}

async fn status_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatReply>> {
    let reply = state.services.controller.handle_turn(request).await?;
    Ok(Json(reply))
}

/// `/nearby_locations` query string; `categories` and `tag` may repeat.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyParams {
    pub latitude: f64,
    pub longitude: f64,
    pub limit: usize,
    pub radius: f64,
    pub categories: Vec<String>,
    pub open_only: bool,
    pub tags: Vec<String>,
    pub sort: SortKey,
}

impl Default for NearbyParams {
    fn default() -> Self {
        Self {
            latitude: DEFAULT_LATITUDE,
            longitude: DEFAULT_LONGITUDE,
            limit: DEFAULT_NEARBY_LIMIT,
            radius: DEFAULT_NEARBY_RADIUS,
            categories: vec![MATCH_ANY_CATEGORIES[0].to_string()],
            open_only: false,
            tags: Vec::new(),
            sort: SortKey::ReviewCount,
        }
    }
}

impl NearbyParams {
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self> {
        let mut params = Self::default();
        let mut categories = Vec::new();
        for (key, value) in pairs {
            match key.as_str() {
                "latitude" => params.latitude = parse_number(key, value)?,
                "longitude" => params.longitude = parse_number(key, value)?,
                "limit" => params.limit = parse_number(key, value)?,
                "radius" => params.radius = parse_number(key, value)?,
                "categories" => categories.push(value.clone()),
                "tag" => params.tags.push(value.clone()),
                "cur_open" => {
                    params.open_only = match value.as_str() {
                        "0" => false,
                        "1" => true,
                        other => {
                            return Err(WhatnextError::Validation(format!(
                                "cur_open must be 0 or 1, got '{}'",
                                other
                            )))
                        }
                    }
                }
                "sort_by" => {
                    params.sort = SortKey::parse(value).ok_or_else(|| {
                        WhatnextError::Validation(format!("unsupported sort_by '{}'", value))
                    })?
                }
                _ => {}
            }
        }
        if !categories.is_empty() {
            params.categories = categories;
        }
        if !params.latitude.is_finite() || !params.longitude.is_finite() || !params.radius.is_finite() {
            return Err(WhatnextError::Validation("coordinates and radius must be finite".to_string()));
        }
        Ok(params)
    }

    pub fn to_query(&self) -> NearbyQuery {
        NearbyQuery {
            center: GeoPoint::new(self.longitude, self.latitude),
            limit: self.limit,
            radius_meters: self.radius,
            categories: self.categories.clone(),
            open_only: self.open_only,
            tags: self.tags.clone(),
            sort: self.sort,
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| WhatnextError::Validation(format!("{} must be a number, got '{}'", key, value)))
}

async fn nearby_handler(
    State(state): State<Arc<AppState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<Location>>> {
    let params = NearbyParams::from_pairs(&pairs)?;
    let found = state
        .services
        .locations
        .find_nearby(&params.to_query(), Utc::now())
        .await?;
    Ok(Json(found))
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileRequest {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagsInfo {
    pub user_id: String,
    #[serde(flatten)]
    pub tags: UserTags,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTagsRequest {
    pub user_id: String,
    #[serde(flatten)]
    pub update: TagsUpdate,
}

async fn user_info_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ProfileRequest>,
) -> Result<Json<UserProfile>> {
    state
        .services
        .profiles
        .get_user(&request.user_id)
        .await?
        .map(Json)
        .ok_or_else(|| WhatnextError::NotFound("User not found".to_string()))
}

async fn tags_info_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ProfileRequest>,
) -> Result<Json<TagsInfo>> {
    let tags = state.services.profiles.get_tags(&request.user_id).await?;
    Ok(Json(TagsInfo {
        user_id: request.user_id,
        tags,
    }))
}

async fn update_tags_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateTagsRequest>,
) -> Result<Json<serde_json::Value>> {
    if request.update.is_empty() {
        return Err(WhatnextError::Validation("No update data provided".to_string()));
    }
    let updated = state
        .services
        .profiles
        .update_tags(&request.user_id, &request.update)
        .await?;
    if !updated {
        return Err(WhatnextError::NotFound(format!(
            "No user found with user_id {}",
            request.user_id
        )));
    }
    Ok(Json(json!({ "operation": true, "user_id": request.user_id })))
}
