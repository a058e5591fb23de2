use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// Supply-request lifecycle; stored as the Postgres enum `request_status`.
/// `pending` is the only state that admits a transition; the other two are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "request_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLineInput {
    pub item_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    #[serde(default)]
    pub shelter_id: Option<Uuid>,
    pub warehouse_id: Uuid,
    pub items: Vec<RequestLineInput>,
}

/// Joined request row with requester/shelter/warehouse names resolved.
#[derive(Debug, FromRow)]
pub struct RequestRow {
    pub id: Uuid,
    pub shelter_id: Uuid,
    pub shelter_name: String,
    pub warehouse_id: Uuid,
    pub warehouse_name: String,
    pub requested_by: Uuid,
    pub requester_name: String,
    pub status: RequestStatus,
    pub rejection_reason: Option<String>,
    pub rejected_by: Option<Uuid>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
pub struct RequestLineRow {
    pub request_id: Uuid,
    pub item_id: Uuid,
    pub item_name: String,
    pub unit: String,
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLineView {
    pub item_id: Uuid,
    pub item_name: String,
    pub unit: String,
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    pub id: Uuid,
    pub shelter_id: Uuid,
    pub shelter_name: String,
    pub warehouse_id: Uuid,
    pub warehouse_name: String,
    pub requested_by: Uuid,
    pub requester_name: String,
    pub status: RequestStatus,
    pub rejection_reason: Option<String>,
    pub rejected_by: Option<Uuid>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<RequestLineView>,
}

impl RequestView {
    pub fn assemble(row: RequestRow, lines: Vec<RequestLineRow>) -> Self {
        Self {
            id: row.id,
            shelter_id: row.shelter_id,
            shelter_name: row.shelter_name,
            warehouse_id: row.warehouse_id,
            warehouse_name: row.warehouse_name,
            requested_by: row.requested_by,
            requester_name: row.requester_name,
            status: row.status,
            rejection_reason: row.rejection_reason,
            rejected_by: row.rejected_by,
            rejected_at: row.rejected_at,
            approved_by: row.approved_by,
            approved_at: row.approved_at,
            created_at: row.created_at,
            items: lines
                .into_iter()
                .map(|l| RequestLineView {
                    item_id: l.item_id,
                    item_name: l.item_name,
                    unit: l.unit,
                    quantity: l.quantity,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_is_the_only_open_state() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(RequestStatus::Approved.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RequestStatus::Pending).unwrap(),
            "\"pending\""
        );
        let parsed: RequestStatus = serde_json::from_str("\"rejected\"").unwrap();
        assert_eq!(parsed, RequestStatus::Rejected);
    }
}
