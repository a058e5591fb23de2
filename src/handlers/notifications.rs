use axum::{
    extract::{Path, State},
    http::HeaderMap,
};
use uuid::Uuid;

use crate::{
    database::Database,
    middleware::get_current_user,
    models::Notification,
    response::{ok, ok_with, ApiError, ApiResult},
};

pub async fn list_notifications(headers: HeaderMap, State(db): State<Database>) -> ApiResult {
    let actor = get_current_user(&headers, &db)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let notifications = sqlx::query_as::<_, Notification>(
        "SELECT id, user_id, kind, title, message, related_id, is_read, created_at
         FROM notifications WHERE user_id = $1
         ORDER BY created_at DESC",
    )
    .bind(actor.id)
    .fetch_all(&db)
    .await?;

    Ok(ok(notifications))
}

pub async fn mark_notification_read(
    headers: HeaderMap,
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let actor = get_current_user(&headers, &db)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let notification = sqlx::query_as::<_, Notification>(
        r#"
        UPDATE notifications SET is_read = true
        WHERE id = $1 AND user_id = $2
        RETURNING id, user_id, kind, title, message, related_id, is_read, created_at
        "#,
    )
    .bind(id)
    .bind(actor.id)
    .fetch_optional(&db)
    .await?
    .ok_or_else(|| ApiError::NotFound("Notification not found".to_string()))?;

    Ok(ok_with(notification, "Notification marked as read"))
}
