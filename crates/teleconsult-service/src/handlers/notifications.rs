//! Notification inbox.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use teleconsult_core::{ConsultError, Notification, NotificationId};
use teleconsult_store::Store;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Default page size.
const DEFAULT_LIMIT: usize = 50;

/// Largest page size accepted.
const MAX_LIMIT: usize = 200;

/// Query parameters for listing notifications.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsQuery {
    /// Only unread notifications.
    #[serde(default)]
    pub unread_only: bool,
    /// Maximum number returned.
    pub limit: Option<usize>,
}

/// Notification list response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsResponse {
    /// Notifications, newest first.
    pub notifications: Vec<Notification>,
    /// Unread notifications in this page.
    pub unread_count: usize,
}

/// List the caller's notifications.
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<Json<ListNotificationsResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let notifications = state
        .store
        .list_notifications(&auth.user_id, query.unread_only, limit)
        .await?;
    let unread_count = notifications.iter().filter(|n| !n.read).count();

    Ok(Json(ListNotificationsResponse {
        notifications,
        unread_count,
    }))
}

/// Mark one of the caller's notifications read.
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(notification_id): Path<String>,
) -> Result<Json<Notification>, ApiError> {
    let id: NotificationId = notification_id.parse().map_err(ConsultError::from)?;

    let notification = state
        .store
        .mark_notification_read(&auth.user_id, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Notification not found".into()))?;

    Ok(Json(notification))
}
