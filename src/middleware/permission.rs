use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    database::Database,
    models::{Role, User},
    utils::verify_token,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub shelter_id: Option<Uuid>,
}

impl CurrentUser {
    pub fn from_user(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            shelter_id: user.shelter_id,
        }
    }
}

/// Resolve the `Authorization: Bearer <jwt>` header to an active user.
/// Any failure along the way (missing header, bad token, unknown or
/// deactivated user) yields `None`; callers translate that to a 401.
pub async fn get_current_user(headers: &HeaderMap, db: &Database) -> Option<CurrentUser> {
    let token = bearer_token(headers)?;

    let claims = verify_token(token).ok()?;
    let user_id = Uuid::parse_str(&claims.sub).ok()?;

    let user = sqlx::query_as::<_, User>(
        "SELECT id, name, email, password_hash, role, shelter_id, is_active, created_at
         FROM users WHERE id = $1 AND is_active = true",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await
    .ok()??;

    Some(CurrentUser::from_user(user))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(bearer_token(&headers), None);
    }
}
