use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Stock {
    pub id: Uuid,
    pub warehouse_id: Uuid,
    pub item_id: Uuid,
    pub quantity: i32,
    pub min_alert: i32,
    pub updated_at: DateTime<Utc>,
}

/// A stock is `low` once it reaches its alert threshold.
pub fn stock_status(quantity: i32, min_alert: i32) -> &'static str {
    if quantity <= min_alert {
        "low"
    } else {
        "normal"
    }
}

/// Fill percentage against twice the alert threshold, rounded. Kept as the
/// legacy formula; values above 100 are possible and left to the caller.
pub fn stock_percentage(quantity: i32, min_alert: i32) -> i32 {
    if min_alert > 0 {
        ((quantity as f64 / (min_alert as f64 * 2.0)) * 100.0).round() as i32
    } else {
        100
    }
}

/// Joined row backing the stock listing: stock + item + category + warehouse.
#[derive(Debug, FromRow)]
pub struct StockRow {
    pub id: Uuid,
    pub item_id: Uuid,
    pub item_name: String,
    pub unit: String,
    pub item_description: Option<String>,
    pub category_id: Option<Uuid>,
    pub category_name: Option<String>,
    pub warehouse_id: Uuid,
    pub warehouse_name: String,
    pub warehouse_province: String,
    pub quantity: i32,
    pub min_alert: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockItemView {
    pub id: Uuid,
    pub name: String,
    pub unit: String,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockWarehouseView {
    pub id: Uuid,
    pub name: String,
    pub province: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockView {
    pub id: Uuid,
    pub item: StockItemView,
    pub warehouse: StockWarehouseView,
    pub quantity: i32,
    pub min_alert: i32,
    pub status: &'static str,
    pub percentage: i32,
}

impl From<StockRow> for StockView {
    fn from(row: StockRow) -> Self {
        Self {
            id: row.id,
            item: StockItemView {
                id: row.item_id,
                name: row.item_name,
                unit: row.unit,
                description: row.item_description,
                category_id: row.category_id,
                category: row.category_name,
            },
            warehouse: StockWarehouseView {
                id: row.warehouse_id,
                name: row.warehouse_name,
                province: row.warehouse_province,
            },
            quantity: row.quantity,
            min_alert: row.min_alert,
            status: stock_status(row.quantity, row.min_alert),
            percentage: stock_percentage(row.quantity, row.min_alert),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_low_at_or_below_threshold() {
        assert_eq!(stock_status(49, 50), "low");
        assert_eq!(stock_status(50, 50), "low");
        assert_eq!(stock_status(51, 50), "normal");
        assert_eq!(stock_status(0, 0), "low");
    }

    #[test]
    fn percentage_uses_double_threshold() {
        assert_eq!(stock_percentage(100, 50), 100);
        assert_eq!(stock_percentage(70, 50), 70);
        assert_eq!(stock_percentage(25, 50), 25);
        // Legacy formula has no upper bound.
        assert_eq!(stock_percentage(300, 50), 300);
    }

    #[test]
    fn percentage_defaults_to_full_without_threshold() {
        assert_eq!(stock_percentage(0, 0), 100);
        assert_eq!(stock_percentage(42, 0), 100);
    }
}
