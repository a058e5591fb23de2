use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    database::Database,
    middleware::get_current_user,
    models::{Item, ItemWithCategory},
    response::{created, ok, ok_with, ApiError, ApiResult},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItemsQuery {
    pub category_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateItem {
    pub name: String,
    pub category_id: Uuid,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItem {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

const ITEM_SELECT: &str = r#"
    SELECT i.id, i.name, i.category_id, c.name AS category_name,
           i.unit, i.description, i.created_at
    FROM items i
    LEFT JOIN categories c ON c.id = i.category_id
"#;

pub async fn list_items(
    headers: HeaderMap,
    State(db): State<Database>,
    Query(query): Query<ListItemsQuery>,
) -> ApiResult {
    get_current_user(&headers, &db)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let sql = format!("{ITEM_SELECT} WHERE ($1::uuid IS NULL OR i.category_id = $1) ORDER BY i.name");
    let items = sqlx::query_as::<_, ItemWithCategory>(&sql)
        .bind(query.category_id)
        .fetch_all(&db)
        .await?;

    Ok(ok(items))
}

pub async fn get_item(
    headers: HeaderMap,
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> ApiResult {
    get_current_user(&headers, &db)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let sql = format!("{ITEM_SELECT} WHERE i.id = $1");
    let item = sqlx::query_as::<_, ItemWithCategory>(&sql)
        .bind(id)
        .fetch_optional(&db)
        .await?
        .ok_or_else(|| ApiError::NotFound("Item not found".to_string()))?;

    Ok(ok(item))
}

pub async fn create_item(
    headers: HeaderMap,
    State(db): State<Database>,
    Json(body): Json<CreateItem>,
) -> ApiResult {
    let actor = get_current_user(&headers, &db)
        .await
        .ok_or(ApiError::Unauthorized)?;

    if !actor.role.can_manage_stock() {
        return Err(ApiError::Forbidden(
            "Only admin or warehouse staff can create items".to_string(),
        ));
    }

    if body.name.trim().is_empty() {
        return Err(ApiError::Invalid("name is required".to_string()));
    }

    let category_exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1)")
            .bind(body.category_id)
            .fetch_one(&db)
            .await?;
    if !category_exists {
        return Err(ApiError::NotFound("Category not found".to_string()));
    }

    let duplicate =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM items WHERE name = $1)")
            .bind(&body.name)
            .fetch_one(&db)
            .await?;
    if duplicate {
        return Err(ApiError::Invalid("Item name already exists".to_string()));
    }

    let item = sqlx::query_as::<_, Item>(
        r#"
        INSERT INTO items (id, name, category_id, unit, description)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, name, category_id, unit, description, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&body.name)
    .bind(body.category_id)
    .bind(body.unit.as_deref().unwrap_or("piece"))
    .bind(body.description.as_deref())
    .fetch_one(&db)
    .await?;

    Ok(created(item, "Item created successfully"))
}

pub async fn update_item(
    headers: HeaderMap,
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateItem>,
) -> ApiResult {
    let actor = get_current_user(&headers, &db)
        .await
        .ok_or(ApiError::Unauthorized)?;

    if !actor.role.can_manage_stock() {
        return Err(ApiError::Forbidden(
            "Only admin or warehouse staff can update items".to_string(),
        ));
    }

    let item = sqlx::query_as::<_, Item>(
        "SELECT id, name, category_id, unit, description, created_at FROM items WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&db)
    .await?
    .ok_or_else(|| ApiError::NotFound("Item not found".to_string()))?;

    let name = body.name.unwrap_or(item.name);
    let category_id = body.category_id.or(item.category_id);
    let unit = body.unit.unwrap_or(item.unit);
    let description = match body.description {
        Some(d) => Some(d),
        None => item.description,
    };

    let updated = sqlx::query_as::<_, Item>(
        r#"
        UPDATE items SET name = $2, category_id = $3, unit = $4, description = $5
        WHERE id = $1
        RETURNING id, name, category_id, unit, description, created_at
        "#,
    )
    .bind(id)
    .bind(&name)
    .bind(category_id)
    .bind(&unit)
    .bind(description.as_deref())
    .fetch_one(&db)
    .await?;

    Ok(ok_with(updated, "Item updated successfully"))
}

/// Items that appear on any request are part of that request's history and
/// must not be deleted out from under it.
fn ensure_not_requested(referenced: bool) -> Result<(), ApiError> {
    if referenced {
        Err(ApiError::Invalid(
            "Item is referenced by existing requests and cannot be deleted".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Deleting an item takes its stocks and stock logs with it.
pub async fn delete_item(
    headers: HeaderMap,
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let actor = get_current_user(&headers, &db)
        .await
        .ok_or(ApiError::Unauthorized)?;

    if !actor.role.is_admin() {
        return Err(ApiError::Forbidden("Only admin can delete items".to_string()));
    }

    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM items WHERE id = $1)")
        .bind(id)
        .fetch_one(&db)
        .await?;
    if !exists {
        return Err(ApiError::NotFound("Item not found".to_string()));
    }

    let referenced = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM request_items WHERE item_id = $1)",
    )
    .bind(id)
    .fetch_one(&db)
    .await?;
    ensure_not_requested(referenced)?;

    let mut tx = db.begin().await?;

    sqlx::query("DELETE FROM stock_logs WHERE item_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM stocks WHERE item_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM items WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(ok_with(
        json!({ "deletedId": id }),
        "Item and related data deleted successfully",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requested_items_cannot_be_deleted() {
        let err = ensure_not_requested(true).unwrap_err();
        assert!(matches!(err, ApiError::Invalid(_)));
    }

    #[test]
    fn unrequested_items_may_be_deleted() {
        assert!(ensure_not_requested(false).is_ok());
    }
}
