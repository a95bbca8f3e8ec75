use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{Datelike, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;

use super::params::{self, QueryMap};
use super::{AppState, HttpError};
use crate::cache::RangeKey;
use crate::store::Granularity;
use crate::types::{Profile, Role, UserCount};

const SERVICE_NAME: &str = "beerbot";
const DEFAULT_TOP_LIMIT: usize = 20;
const DEFAULT_PAIRS_LIMIT: usize = 30;

#[derive(Debug, Serialize)]
pub struct ProfileBody {
    pub real_name: String,
    pub profile_image: String,
}

impl From<Profile> for ProfileBody {
    fn from(p: Profile) -> Self {
        Self {
            real_name: p.display_name,
            profile_image: p.avatar_url,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TopUsers {
    pub givers: Vec<UserCount>,
    pub recipients: Vec<UserCount>,
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render_prometheus(),
    )
}

/// GET /api/health
///
/// `check_slack=true` runs a live credential probe and answers 503 when it fails.
pub async fn health(State(state): State<AppState>, Query(query): Query<QueryMap>) -> impl IntoResponse {
    let mut body = json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "slack_connected": state.connection.is_connected(),
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    });
    let mut status = StatusCode::OK;

    if params::get(&query, "check_slack") == Some("true") {
        if let Err(e) = state.connection.probe().await {
            log::warn!("⚠️  Health probe failed: {}", e);
            body["status"] = json!("degraded");
            body["slack_connection_error"] = json!(e.to_string());
            status = StatusCode::SERVICE_UNAVAILABLE;
        }
    }
    (status, Json(body))
}

pub async fn givers(State(state): State<AppState>) -> Result<Json<Vec<String>>, HttpError> {
    Ok(Json(state.store.distinct_users(Role::Givers)?))
}

pub async fn recipients(State(state): State<AppState>) -> Result<Json<Vec<String>>, HttpError> {
    Ok(Json(state.store.distinct_users(Role::Recipients)?))
}

pub async fn given(
    State(state): State<AppState>,
    Query(query): Query<QueryMap>,
) -> Result<Json<serde_json::Value>, HttpError> {
    let user = params::required(&query, "user")?;
    let range = params::date_range(&query)?;
    let count = state.store.count_given(user, &range)?;
    Ok(Json(json!({
        "user": user,
        "start": range.start.to_string(),
        "end": range.end.to_string(),
        "given": count,
    })))
}

pub async fn received(
    State(state): State<AppState>,
    Query(query): Query<QueryMap>,
) -> Result<Json<serde_json::Value>, HttpError> {
    let user = params::required(&query, "user")?;
    let range = params::date_range(&query)?;
    let count = state.store.count_received(user, &range)?;
    Ok(Json(json!({
        "user": user,
        "start": range.start.to_string(),
        "end": range.end.to_string(),
        "received": count,
    })))
}

pub async fn user(
    State(state): State<AppState>,
    Query(query): Query<QueryMap>,
) -> Result<Json<ProfileBody>, HttpError> {
    let user_id = params::required(&query, "user")?;
    match state.profiles.resolve(user_id).await {
        Some(profile) => Ok(Json(profile.into())),
        None => {
            log::warn!("User {} not found upstream or in cache", user_id);
            Err(HttpError::NotFound("user not found".to_string()))
        }
    }
}

/// GET /api/users?ids=a,b,c
///
/// Ids that cannot be resolved are left out of the response map.
pub async fn users(
    State(state): State<AppState>,
    Query(query): Query<QueryMap>,
) -> Result<Json<HashMap<String, ProfileBody>>, HttpError> {
    let raw = params::get(&query, "ids")
        .ok_or_else(|| HttpError::BadRequest("ids required (comma-separated)".to_string()))?;
    let ids = params::id_list(raw);
    if ids.is_empty() {
        return Err(HttpError::BadRequest("no valid user IDs provided".to_string()));
    }

    let found = state.profiles.resolve_many(&ids).await;
    log::debug!("Batch profile lookup: {} requested, {} found", ids.len(), found.len());
    Ok(Json(
        found
            .into_iter()
            .map(|(id, profile)| (id, profile.into()))
            .collect(),
    ))
}

pub async fn timeline(
    State(state): State<AppState>,
    Query(query): Query<QueryMap>,
) -> Result<impl IntoResponse, HttpError> {
    let range = params::date_range(&query)?;
    let granularity: Granularity = params::get(&query, "granularity")
        .unwrap_or("")
        .parse()
        .map_err(HttpError::BadRequest)?;
    Ok(Json(state.store.timeline(&range, granularity)?))
}

pub async fn quarterly(
    State(state): State<AppState>,
    Query(query): Query<QueryMap>,
) -> Result<impl IntoResponse, HttpError> {
    let current_year = Utc::now().year();
    let start_year = params::year(&query, "start_year", current_year - 2);
    let end_year = params::year(&query, "end_year", current_year);
    Ok(Json(state.store.quarterly(start_year, end_year)?))
}

/// GET /api/stats/top
///
/// `range=<key>` reads the leaderboard (fast cache, falling back to the
/// ledger); otherwise a `day` or `start`/`end` range is aggregated directly.
pub async fn top(
    State(state): State<AppState>,
    Query(query): Query<QueryMap>,
) -> Result<Json<TopUsers>, HttpError> {
    let limit = params::limit(&query, DEFAULT_TOP_LIMIT);

    if let Some(raw) = params::get(&query, "range") {
        let range: RangeKey = raw.parse().map_err(HttpError::BadRequest)?;
        let now = Utc::now();
        let givers = state.leaderboard.top(Role::Givers, range, limit, now).await?;
        let recipients = state.leaderboard.top(Role::Recipients, range, limit, now).await?;
        return Ok(Json(TopUsers { givers, recipients }));
    }

    let range = params::date_range(&query)?;
    Ok(Json(TopUsers {
        givers: state.store.top_users(Role::Givers, Some(&range), limit)?,
        recipients: state.store.top_users(Role::Recipients, Some(&range), limit)?,
    }))
}

pub async fn heatmap(
    State(state): State<AppState>,
    Query(query): Query<QueryMap>,
) -> Result<impl IntoResponse, HttpError> {
    let range = params::date_range(&query)?;
    Ok(Json(state.store.heatmap(&range)?))
}

pub async fn pairs(
    State(state): State<AppState>,
    Query(query): Query<QueryMap>,
) -> Result<impl IntoResponse, HttpError> {
    let range = params::date_range(&query)?;
    let limit = params::limit(&query, DEFAULT_PAIRS_LIMIT);
    Ok(Json(state.store.pairs(&range, limit)?))
}
