use axum::{
    extract::State,
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    database::Database,
    middleware::{get_current_user, CurrentUser},
    response::{ok_with, ApiError, ApiResult},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkImport {
    pub warehouse_id: Uuid,
    pub items: Vec<BulkEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkEntry {
    pub name: String,
    #[serde(default, alias = "categoryName")]
    pub category: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub quantity: Option<i32>,
    #[serde(default)]
    pub min_alert: Option<i32>,
    #[serde(default)]
    pub description: Option<String>,
}

fn validate_entry(entry: &BulkEntry) -> Result<(), String> {
    if entry.name.trim().is_empty() {
        return Err("item name is required".to_string());
    }
    if entry.quantity.is_some_and(|q| q < 0) {
        return Err("quantity cannot be negative".to_string());
    }
    if entry.min_alert.is_some_and(|m| m < 0) {
        return Err("minAlert cannot be negative".to_string());
    }
    Ok(())
}

#[derive(Debug, Default)]
struct EntryOutcome {
    item_created: bool,
    stock_updated: bool,
}

/// How an imported quantity lands on a warehouse: an existing
/// (warehouse, item) row is incremented, an absent one is created with
/// defaults. One row per pair, never a duplicate.
#[derive(Debug, PartialEq, Eq)]
enum StockPlan {
    Increment { stock_id: Uuid, by: i32 },
    Create { quantity: i32, min_alert: i32 },
}

fn plan_stock_upsert(existing: Option<Uuid>, quantity: i32, min_alert: Option<i32>) -> StockPlan {
    match existing {
        Some(stock_id) => StockPlan::Increment {
            stock_id,
            by: quantity,
        },
        None => StockPlan::Create {
            quantity,
            min_alert: min_alert.unwrap_or(10),
        },
    }
}

/// Import a batch of stock entries into one warehouse. Per-entry failures are
/// collected and reported; they never abort the rest of the batch.
pub async fn bulk_import(
    headers: HeaderMap,
    State(db): State<Database>,
    Json(body): Json<BulkImport>,
) -> ApiResult {
    let actor = get_current_user(&headers, &db)
        .await
        .ok_or(ApiError::Unauthorized)?;

    if !actor.role.can_manage_stock() {
        return Err(ApiError::Forbidden(
            "Only admin or warehouse staff can bulk import".to_string(),
        ));
    }

    if body.items.is_empty() {
        return Err(ApiError::Invalid(
            "warehouseId and a non-empty items list are required".to_string(),
        ));
    }

    let warehouse_exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM warehouses WHERE id = $1)")
            .bind(body.warehouse_id)
            .fetch_one(&db)
            .await?;
    if !warehouse_exists {
        return Err(ApiError::NotFound("Warehouse not found".to_string()));
    }

    let mut inserted = 0u32;
    let mut updated = 0u32;
    let mut errors: Vec<String> = Vec::new();
    let total = body.items.len();

    for entry in &body.items {
        if let Err(msg) = validate_entry(entry) {
            errors.push(format!("{}: {}", entry.name, msg));
            continue;
        }
        match import_entry(&db, body.warehouse_id, entry, &actor).await {
            Ok(outcome) => {
                if outcome.item_created {
                    inserted += 1;
                }
                if outcome.stock_updated {
                    updated += 1;
                }
            }
            Err(err) => {
                log::error!("Bulk import entry '{}' failed: {}", entry.name, err);
                errors.push(format!("{}: {}", entry.name, err));
            }
        }
    }

    let message = format!("Imported {} new items, updated {} stocks", inserted, updated);
    let data = if errors.is_empty() {
        json!({ "inserted": inserted, "updated": updated, "total": total })
    } else {
        json!({ "inserted": inserted, "updated": updated, "total": total, "errors": errors })
    };

    Ok(ok_with(data, &message))
}

async fn import_entry(
    db: &Database,
    warehouse_id: Uuid,
    entry: &BulkEntry,
    actor: &CurrentUser,
) -> Result<EntryOutcome, sqlx::Error> {
    let mut outcome = EntryOutcome::default();

    // Find-or-create the category; entries without one fall back to the
    // first existing category.
    let category_id: Option<Uuid> = match &entry.category {
        Some(name) => {
            let existing =
                sqlx::query_scalar::<_, Uuid>("SELECT id FROM categories WHERE name = $1")
                    .bind(name)
                    .fetch_optional(db)
                    .await?;
            match existing {
                Some(id) => Some(id),
                None => Some(
                    sqlx::query_scalar::<_, Uuid>(
                        "INSERT INTO categories (id, name, description)
                         VALUES ($1, $2, $3) RETURNING id",
                    )
                    .bind(Uuid::new_v4())
                    .bind(name)
                    .bind(format!("Category {}", name))
                    .fetch_one(db)
                    .await?,
                ),
            }
        }
        None => {
            sqlx::query_scalar::<_, Uuid>(
                "SELECT id FROM categories ORDER BY created_at LIMIT 1",
            )
            .fetch_optional(db)
            .await?
        }
    };

    // Find-or-create the item by name.
    let item_id = match sqlx::query_scalar::<_, Uuid>("SELECT id FROM items WHERE name = $1")
        .bind(&entry.name)
        .fetch_optional(db)
        .await?
    {
        Some(id) => id,
        None => {
            outcome.item_created = true;
            sqlx::query_scalar::<_, Uuid>(
                "INSERT INTO items (id, name, unit, category_id, description)
                 VALUES ($1, $2, $3, $4, $5) RETURNING id",
            )
            .bind(Uuid::new_v4())
            .bind(&entry.name)
            .bind(entry.unit.as_deref().unwrap_or("piece"))
            .bind(category_id)
            .bind(entry.description.as_deref().unwrap_or(""))
            .fetch_one(db)
            .await?
        }
    };

    let quantity = entry.quantity.unwrap_or(0);

    let existing_stock = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM stocks WHERE warehouse_id = $1 AND item_id = $2",
    )
    .bind(warehouse_id)
    .bind(item_id)
    .fetch_optional(db)
    .await?;

    match plan_stock_upsert(existing_stock, quantity, entry.min_alert) {
        StockPlan::Increment { stock_id, by } => {
            sqlx::query(
                "UPDATE stocks
                 SET quantity = quantity + $2,
                     min_alert = COALESCE($3, min_alert),
                     updated_at = now()
                 WHERE id = $1",
            )
            .bind(stock_id)
            .bind(by)
            .bind(entry.min_alert)
            .execute(db)
            .await?;
            outcome.stock_updated = true;
        }
        StockPlan::Create {
            quantity,
            min_alert,
        } => {
            sqlx::query(
                "INSERT INTO stocks (id, warehouse_id, item_id, quantity, min_alert)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::new_v4())
            .bind(warehouse_id)
            .bind(item_id)
            .bind(quantity)
            .bind(min_alert)
            .execute(db)
            .await?;
        }
    }

    if quantity != 0 {
        sqlx::query(
            "INSERT INTO stock_logs (id, warehouse_id, item_id, change, reason, actor_id)
             VALUES ($1, $2, $3, $4, 'bulk_import', $5)",
        )
        .bind(Uuid::new_v4())
        .bind(warehouse_id)
        .bind(item_id)
        .bind(quantity)
        .bind(actor.id)
        .execute(db)
        .await?;
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn entry(name: &str) -> BulkEntry {
        BulkEntry {
            name: name.to_string(),
            category: None,
            unit: None,
            quantity: Some(10),
            min_alert: None,
            description: None,
        }
    }

    #[test]
    fn blank_name_is_invalid() {
        assert!(validate_entry(&entry("  ")).is_err());
        assert!(validate_entry(&entry("Rice")).is_ok());
    }

    #[test]
    fn negative_numbers_are_invalid() {
        let mut e = entry("Rice");
        e.quantity = Some(-1);
        assert!(validate_entry(&e).is_err());

        let mut e = entry("Rice");
        e.min_alert = Some(-5);
        assert!(validate_entry(&e).is_err());
    }

    #[test]
    fn missing_quantity_defaults_rather_than_failing() {
        let mut e = entry("Rice");
        e.quantity = None;
        assert!(validate_entry(&e).is_ok());
        assert_eq!(e.quantity.unwrap_or(0), 0);
    }

    // Mini model of the stocks table keyed by (warehouse, item): applies
    // each plan the way import_entry does.
    fn apply(
        rows: &mut HashMap<(Uuid, Uuid), (Uuid, i32)>,
        warehouse_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) {
        let existing = rows.get(&(warehouse_id, item_id)).map(|(id, _)| *id);
        match plan_stock_upsert(existing, quantity, None) {
            StockPlan::Increment { stock_id, by } => {
                let row = rows.get_mut(&(warehouse_id, item_id)).unwrap();
                assert_eq!(row.0, stock_id);
                row.1 += by;
            }
            StockPlan::Create {
                quantity,
                min_alert,
            } => {
                assert_eq!(min_alert, 10);
                rows.insert((warehouse_id, item_id), (Uuid::new_v4(), quantity));
            }
        }
    }

    #[test]
    fn importing_the_same_item_twice_increments_one_row() {
        let warehouse = Uuid::new_v4();
        let rice = Uuid::new_v4();
        let mut rows = HashMap::new();

        apply(&mut rows, warehouse, rice, 40);
        apply(&mut rows, warehouse, rice, 60);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[&(warehouse, rice)].1, 100);
    }

    #[test]
    fn importing_into_two_warehouses_creates_independent_rows() {
        let north = Uuid::new_v4();
        let south = Uuid::new_v4();
        let rice = Uuid::new_v4();
        let mut rows = HashMap::new();

        apply(&mut rows, north, rice, 40);
        apply(&mut rows, south, rice, 25);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[&(north, rice)].1, 40);
        assert_eq!(rows[&(south, rice)].1, 25);
    }

    #[test]
    fn create_plan_applies_min_alert_default() {
        assert_eq!(
            plan_stock_upsert(None, 15, None),
            StockPlan::Create {
                quantity: 15,
                min_alert: 10,
            }
        );
        assert_eq!(
            plan_stock_upsert(None, 15, Some(30)),
            StockPlan::Create {
                quantity: 15,
                min_alert: 30,
            }
        );
    }
}
