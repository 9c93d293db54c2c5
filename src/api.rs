// src/api.rs
//! HTTP surface: liveness text, plus watch/cancel/list for callers that are
//! not on Telegram.

use axum::{
    extract::{Query as QueryParams, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::commands::{CommandError, Watcher};
use crate::store::{SubscriberId, Subscription};

pub const ROOT_BANNER: &str = "Movie Notifier Bot Running!";

#[derive(Clone)]
pub struct AppState {
    pub watcher: Arc<Watcher>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { ROOT_BANNER }))
        .route("/health", get(|| async { "OK" }))
        .route("/watch", post(watch))
        .route("/cancel", post(cancel))
        .route("/subscriptions", get(list))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Deserialize)]
struct WatchReq {
    subscriber: SubscriberId,
    query: String,
}

#[derive(Serialize)]
struct WatchResp {
    created: bool,
    subscription: SubscriptionView,
}

#[derive(Serialize)]
struct ErrorResp {
    error: String,
}

#[derive(Deserialize)]
struct CancelReq {
    subscriber: SubscriberId,
    #[serde(default)]
    query: Option<String>,
}

#[derive(Serialize)]
struct CancelResp {
    cancelled: usize,
}

#[derive(Deserialize)]
struct ListParams {
    subscriber: SubscriberId,
}

#[derive(Serialize)]
struct SubscriptionView {
    subscriber: SubscriberId,
    query: String,
    normalized: String,
    delivered: usize,
    covered_sources: Vec<String>,
    created_at: DateTime<Utc>,
    last_checked: Option<DateTime<Utc>>,
}

impl From<&Subscription> for SubscriptionView {
    fn from(s: &Subscription) -> Self {
        Self {
            subscriber: s.key.subscriber.clone(),
            query: s.query.raw().to_string(),
            normalized: s.key.query.clone(),
            delivered: s.delivered.len(),
            covered_sources: s.covered_sources.iter().cloned().collect(),
            created_at: s.created_at,
            last_checked: s.last_checked,
        }
    }
}

async fn watch(
    State(state): State<AppState>,
    Json(body): Json<WatchReq>,
) -> Result<(StatusCode, Json<WatchResp>), (StatusCode, Json<ErrorResp>)> {
    match state.watcher.watch(body.subscriber, &body.query) {
        Ok(outcome) => {
            let status = if outcome.is_new() {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            let resp = WatchResp {
                created: outcome.is_new(),
                subscription: SubscriptionView::from(outcome.subscription()),
            };
            Ok((status, Json(resp)))
        }
        Err(e @ CommandError::EmptyQuery) => Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResp {
                error: e.to_string(),
            }),
        )),
    }
}

async fn cancel(State(state): State<AppState>, Json(body): Json<CancelReq>) -> Json<CancelResp> {
    let cancelled = state
        .watcher
        .cancel(&body.subscriber, body.query.as_deref());
    Json(CancelResp { cancelled })
}

async fn list(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ListParams>,
) -> Json<Vec<SubscriptionView>> {
    let subs = state.watcher.list(&params.subscriber);
    Json(subs.iter().map(SubscriptionView::from).collect())
}

