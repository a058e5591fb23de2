use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    database::Database,
    middleware::get_current_user,
    models::{Stock, StockRow, StockView},
    response::{ok, ok_with, ApiError, ApiResult},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListStocksQuery {
    pub warehouse_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertStock {
    pub warehouse_id: Uuid,
    pub item_id: Uuid,
    pub quantity: Option<i32>,
    pub min_alert: Option<i32>,
}

const STOCK_SELECT: &str = r#"
    SELECT st.id, st.item_id, i.name AS item_name, i.unit,
           i.description AS item_description,
           i.category_id, c.name AS category_name,
           st.warehouse_id, w.name AS warehouse_name, w.province AS warehouse_province,
           st.quantity, st.min_alert
    FROM stocks st
    JOIN items i ON i.id = st.item_id
    LEFT JOIN categories c ON c.id = i.category_id
    JOIN warehouses w ON w.id = st.warehouse_id
"#;

pub async fn list_stocks(
    headers: HeaderMap,
    State(db): State<Database>,
    Query(query): Query<ListStocksQuery>,
) -> ApiResult {
    get_current_user(&headers, &db)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let sql = format!(
        r#"
        {STOCK_SELECT}
        WHERE ($1::uuid IS NULL OR st.warehouse_id = $1)
          AND ($2::uuid IS NULL OR i.category_id = $2)
        ORDER BY i.name
        "#
    );

    let rows = sqlx::query_as::<_, StockRow>(&sql)
        .bind(query.warehouse_id)
        .bind(query.category_id)
        .fetch_all(&db)
        .await?;

    let views: Vec<StockView> = rows.into_iter().map(StockView::from).collect();
    Ok(ok(views))
}

/// Absolute set of quantity/minAlert for one (warehouse, item) pair; creates
/// the row when absent. Omitted fields keep their current values.
pub async fn upsert_stock(
    headers: HeaderMap,
    State(db): State<Database>,
    Json(body): Json<UpsertStock>,
) -> ApiResult {
    let actor = get_current_user(&headers, &db)
        .await
        .ok_or(ApiError::Unauthorized)?;

    if !actor.role.can_manage_stock() {
        return Err(ApiError::Forbidden(
            "Only admin or warehouse staff can manage stocks".to_string(),
        ));
    }

    if let Some(quantity) = body.quantity {
        if quantity < 0 {
            return Err(ApiError::Invalid("quantity cannot be negative".to_string()));
        }
    }

    let item_exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM items WHERE id = $1)")
            .bind(body.item_id)
            .fetch_one(&db)
            .await?;
    if !item_exists {
        return Err(ApiError::NotFound("Item not found".to_string()));
    }

    // Read the prior quantity for the audit log, then do the actual
    // set-or-create as one atomic statement: concurrent upserts for the same
    // (warehouse, item) pair land on the unique constraint, never error.
    let previous = sqlx::query_scalar::<_, i32>(
        "SELECT quantity FROM stocks WHERE warehouse_id = $1 AND item_id = $2",
    )
    .bind(body.warehouse_id)
    .bind(body.item_id)
    .fetch_optional(&db)
    .await?;

    let stock = sqlx::query_as::<_, Stock>(
        "INSERT INTO stocks (id, warehouse_id, item_id, quantity, min_alert)
         VALUES ($1, $2, $3, COALESCE($4::int, 0), COALESCE($5::int, 10))
         ON CONFLICT (warehouse_id, item_id) DO UPDATE
         SET quantity = COALESCE($4::int, stocks.quantity),
             min_alert = COALESCE($5::int, stocks.min_alert),
             updated_at = now()
         RETURNING id, warehouse_id, item_id, quantity, min_alert, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(body.warehouse_id)
    .bind(body.item_id)
    .bind(body.quantity)
    .bind(body.min_alert)
    .fetch_one(&db)
    .await?;

    let change = quantity_change(previous, stock.quantity);
    if change != 0 {
        record_adjustment(&db, &stock, change, actor.id).await?;
    }

    let sql = format!("{STOCK_SELECT} WHERE st.id = $1");
    let row = sqlx::query_as::<_, StockRow>(&sql)
        .bind(stock.id)
        .fetch_one(&db)
        .await?;

    Ok(ok_with(StockView::from(row), "Stock updated successfully"))
}

/// Delta for the audit log: relative to the prior quantity when the row
/// existed, the full quantity when the upsert created it.
fn quantity_change(previous: Option<i32>, current: i32) -> i32 {
    current - previous.unwrap_or(0)
}

async fn record_adjustment(
    db: &Database,
    stock: &Stock,
    change: i32,
    actor_id: Uuid,
) -> Result<(), ApiError> {
    sqlx::query(
        "INSERT INTO stock_logs (id, warehouse_id, item_id, change, reason, actor_id)
         VALUES ($1, $2, $3, $4, 'manual_update', $5)",
    )
    .bind(Uuid::new_v4())
    .bind(stock.warehouse_id)
    .bind(stock.item_id)
    .bind(change)
    .bind(actor_id)
    .execute(db)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_is_relative_to_prior_quantity() {
        assert_eq!(quantity_change(Some(40), 100), 60);
        assert_eq!(quantity_change(Some(100), 40), -60);
        // Omitted quantity keeps the current value, so nothing to log.
        assert_eq!(quantity_change(Some(40), 40), 0);
    }

    #[test]
    fn created_rows_log_their_full_quantity() {
        assert_eq!(quantity_change(None, 50), 50);
        assert_eq!(quantity_change(None, 0), 0);
    }
}
