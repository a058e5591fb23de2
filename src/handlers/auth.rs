use axum::{
    extract::State,
    http::HeaderMap,
    Json,
};
use serde_json::json;

use crate::{
    database::Database,
    middleware::get_current_user,
    models::{CreateUser, LoginRequest, User, UserResponse},
    response::{created, ok, ApiError, ApiResult},
    utils::{create_token, hash_password, verify_password},
};

pub async fn register(
    State(db): State<Database>,
    Json(body): Json<CreateUser>,
) -> ApiResult {
    if body.name.trim().is_empty() || body.email.trim().is_empty() {
        return Err(ApiError::Invalid("name and email are required".to_string()));
    }
    if body.password.len() < 6 {
        return Err(ApiError::Invalid(
            "password must be at least 6 characters".to_string(),
        ));
    }

    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)",
    )
    .bind(&body.email)
    .fetch_one(&db)
    .await?;

    if exists {
        return Err(ApiError::Invalid("Email already exists".to_string()));
    }

    let password_hash = hash_password(&body.password)
        .map_err(|_| ApiError::Internal("Failed to process password".to_string()))?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, name, email, password_hash, role, shelter_id)
        VALUES (gen_random_uuid(), $1, $2, $3, $4, $5)
        RETURNING id, name, email, password_hash, role, shelter_id, is_active, created_at
        "#,
    )
    .bind(&body.name)
    .bind(&body.email)
    .bind(&password_hash)
    .bind(body.role)
    .bind(body.shelter_id)
    .fetch_one(&db)
    .await?;

    Ok(created(
        UserResponse::from(user),
        "User registered successfully",
    ))
}

pub async fn login(
    State(db): State<Database>,
    Json(body): Json<LoginRequest>,
) -> ApiResult {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, name, email, password_hash, role, shelter_id, is_active, created_at
         FROM users WHERE email = $1 AND is_active = true",
    )
    .bind(&body.email)
    .fetch_optional(&db)
    .await?
    .ok_or(ApiError::Unauthorized)?;

    if !verify_password(&body.password, &user.password_hash).unwrap_or(false) {
        return Err(ApiError::Unauthorized);
    }

    let token = create_token(user.id, user.email.clone())
        .map_err(|_| ApiError::Internal("Failed to issue token".to_string()))?;

    Ok(ok(json!({
        "token": token,
        "user": UserResponse::from(user),
    })))
}

pub async fn me(headers: HeaderMap, State(db): State<Database>) -> ApiResult {
    let user = get_current_user(&headers, &db)
        .await
        .ok_or(ApiError::Unauthorized)?;

    Ok(ok(user))
}
