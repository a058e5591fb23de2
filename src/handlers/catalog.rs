use axum::{
    extract::State,
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    database::Database,
    middleware::get_current_user,
    models::{Category, Shelter, Warehouse},
    response::{created, ok, ApiError, ApiResult},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWarehouse {
    pub name: String,
    pub province: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub manager_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShelter {
    pub name: String,
    pub province: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub capacity: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCategory {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn list_warehouses(headers: HeaderMap, State(db): State<Database>) -> ApiResult {
    get_current_user(&headers, &db)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let warehouses = sqlx::query_as::<_, Warehouse>(
        "SELECT id, name, province, address, manager_name, phone, created_at
         FROM warehouses ORDER BY name",
    )
    .fetch_all(&db)
    .await?;

    Ok(ok(warehouses))
}

pub async fn create_warehouse(
    headers: HeaderMap,
    State(db): State<Database>,
    Json(body): Json<CreateWarehouse>,
) -> ApiResult {
    let actor = get_current_user(&headers, &db)
        .await
        .ok_or(ApiError::Unauthorized)?;

    if !actor.role.is_admin() {
        return Err(ApiError::Forbidden(
            "Only admin can create warehouses".to_string(),
        ));
    }

    if body.name.trim().is_empty() || body.province.trim().is_empty() {
        return Err(ApiError::Invalid(
            "name and province are required".to_string(),
        ));
    }

    let warehouse = sqlx::query_as::<_, Warehouse>(
        r#"
        INSERT INTO warehouses (id, name, province, address, manager_name, phone)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, name, province, address, manager_name, phone, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&body.name)
    .bind(&body.province)
    .bind(body.address.as_deref())
    .bind(body.manager_name.as_deref())
    .bind(body.phone.as_deref())
    .fetch_one(&db)
    .await?;

    Ok(created(warehouse, "Warehouse created successfully"))
}

pub async fn list_shelters(headers: HeaderMap, State(db): State<Database>) -> ApiResult {
    get_current_user(&headers, &db)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let shelters = sqlx::query_as::<_, Shelter>(
        "SELECT id, name, province, address, phone, capacity, created_at
         FROM shelters ORDER BY name",
    )
    .fetch_all(&db)
    .await?;

    Ok(ok(shelters))
}

pub async fn create_shelter(
    headers: HeaderMap,
    State(db): State<Database>,
    Json(body): Json<CreateShelter>,
) -> ApiResult {
    let actor = get_current_user(&headers, &db)
        .await
        .ok_or(ApiError::Unauthorized)?;

    if !actor.role.is_admin() {
        return Err(ApiError::Forbidden(
            "Only admin can create shelters".to_string(),
        ));
    }

    if body.name.trim().is_empty() || body.province.trim().is_empty() {
        return Err(ApiError::Invalid(
            "name and province are required".to_string(),
        ));
    }

    let shelter = sqlx::query_as::<_, Shelter>(
        r#"
        INSERT INTO shelters (id, name, province, address, phone, capacity)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, name, province, address, phone, capacity, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&body.name)
    .bind(&body.province)
    .bind(body.address.as_deref())
    .bind(body.phone.as_deref())
    .bind(body.capacity)
    .fetch_one(&db)
    .await?;

    Ok(created(shelter, "Shelter created successfully"))
}

pub async fn list_categories(headers: HeaderMap, State(db): State<Database>) -> ApiResult {
    get_current_user(&headers, &db)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let categories = sqlx::query_as::<_, Category>(
        "SELECT id, name, description, created_at FROM categories ORDER BY name",
    )
    .fetch_all(&db)
    .await?;

    Ok(ok(categories))
}

pub async fn create_category(
    headers: HeaderMap,
    State(db): State<Database>,
    Json(body): Json<CreateCategory>,
) -> ApiResult {
    let actor = get_current_user(&headers, &db)
        .await
        .ok_or(ApiError::Unauthorized)?;

    if !actor.role.can_manage_stock() {
        return Err(ApiError::Forbidden(
            "Only admin or warehouse staff can create categories".to_string(),
        ));
    }

    if body.name.trim().is_empty() {
        return Err(ApiError::Invalid("name is required".to_string()));
    }

    let duplicate =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM categories WHERE name = $1)")
            .bind(&body.name)
            .fetch_one(&db)
            .await?;
    if duplicate {
        return Err(ApiError::Invalid("Category already exists".to_string()));
    }

    let category = sqlx::query_as::<_, Category>(
        r#"
        INSERT INTO categories (id, name, description)
        VALUES ($1, $2, $3)
        RETURNING id, name, description, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&body.name)
    .bind(body.description.as_deref())
    .fetch_one(&db)
    .await?;

    Ok(created(category, "Category created successfully"))
}
