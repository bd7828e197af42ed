//! Notification and push subscription HTTP routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use super::state::*;
use crate::notifications::{
    replay, DispatchError, DispatchResult, Notification, NotificationPayload,
};
use crate::push::{PushSubscription, SubscriptionStore};

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 200;

#[derive(Debug, Deserialize)]
struct ListQuery {
    /// Return notifications with an id greater than this cursor.
    after_id: Option<i64>,
    /// Only unread notifications.
    #[serde(default)]
    unread: bool,
    limit: Option<usize>,
}

async fn list_notifications(
    Path(seller_id): Path<String>,
    Query(query): Query<ListQuery>,
    State(store): State<GuardedNotificationStore>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
    let result = if query.unread {
        store.list_unread(&seller_id, limit)
    } else {
        store.list_since(&seller_id, query.after_id.unwrap_or(0), limit)
    };

    match result {
        Ok(notifications) => Json(notifications).into_response(),
        Err(e) => {
            error!("Failed to list notifications for seller {}: {}", seller_id, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReplayQuery {
    /// Highest notification id the caller has seen.
    after: i64,
}

/// Polling counterpart of the WebSocket reconnect replay, with the same
/// bounded paging.
async fn replay_notifications(
    Path(seller_id): Path<String>,
    Query(query): Query<ReplayQuery>,
    State(store): State<GuardedNotificationStore>,
) -> Response {
    match replay::collect_missed(&*store, &seller_id, query.after) {
        Ok(notifications) => Json(notifications).into_response(),
        Err(e) => {
            error!("Replay failed for seller {}: {}", seller_id, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_notification_stats(
    Path(seller_id): Path<String>,
    State(store): State<GuardedNotificationStore>,
) -> Response {
    match store.stats(&seller_id) {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => {
            error!("Failed to load stats for seller {}: {}", seller_id, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct MarkReadBody {
    /// Specific notification ids, or absent to mark everything read.
    ids: Option<Vec<i64>>,
}

#[derive(Serialize)]
struct MarkReadResponse {
    updated: usize,
}

async fn mark_notifications_read(
    Path(seller_id): Path<String>,
    State(store): State<GuardedNotificationStore>,
    Json(body): Json<MarkReadBody>,
) -> Response {
    match store.mark_read(&seller_id, body.ids.as_deref()) {
        Ok(updated) => Json(MarkReadResponse { updated }).into_response(),
        Err(e) => {
            error!(
                "Failed to mark notifications read for seller {}: {}",
                seller_id, e
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct PushSubscriptionBody {
    endpoint: String,
    p256dh_key: String,
    auth_key: String,
}

async fn put_push_subscription(
    Path(seller_id): Path<String>,
    State(store): State<GuardedNotificationStore>,
    Json(body): Json<PushSubscriptionBody>,
) -> Response {
    let subscription = PushSubscription {
        seller_id: seller_id.clone(),
        endpoint: body.endpoint,
        p256dh_key: body.p256dh_key,
        auth_key: body.auth_key,
    };
    match store.upsert_subscription(&subscription) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!(
                "Failed to store push subscription for seller {}: {}",
                seller_id, e
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn delete_push_subscription(
    Path(seller_id): Path<String>,
    State(store): State<GuardedNotificationStore>,
) -> Response {
    match store.remove_subscription(&seller_id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!(
                "Failed to remove push subscription for seller {}: {}",
                seller_id, e
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct DispatchBody {
    seller_id: String,
    payload: NotificationPayload,
}

#[derive(Serialize)]
struct DispatchResponse {
    notification: Notification,
    result: DispatchResult,
}

/// Internal dispatch endpoint, called by the order/stream/billing services.
async fn dispatch_notification(
    State(orchestrator): State<GuardedOrchestrator>,
    Json(body): Json<DispatchBody>,
) -> Response {
    match orchestrator.dispatch(&body.seller_id, body.payload).await {
        Ok((notification, result)) => {
            Json(DispatchResponse {
                notification,
                result,
            })
            .into_response()
        }
        Err(e @ DispatchError::Store(_)) => {
            error!("Dispatch failed before persisting: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e @ DispatchError::Queue { .. }) => {
            // The notification exists and is queryable, only the retry
            // scheduling failed
            error!("Dispatch stored but not queued: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn make_seller_routes(state: ServerState) -> Router {
    Router::new()
        .route("/{seller_id}/notifications", get(list_notifications))
        .route(
            "/{seller_id}/notifications/replay",
            get(replay_notifications),
        )
        .route(
            "/{seller_id}/notifications/stats",
            get(get_notification_stats),
        )
        .route(
            "/{seller_id}/notifications/read",
            post(mark_notifications_read),
        )
        .route("/{seller_id}/push-subscription", put(put_push_subscription))
        .route(
            "/{seller_id}/push-subscription",
            delete(delete_push_subscription),
        )
        .with_state(state)
}

pub fn make_internal_routes(state: ServerState) -> Router {
    Router::new()
        .route("/dispatch", post(dispatch_notification))
        .with_state(state)
}
