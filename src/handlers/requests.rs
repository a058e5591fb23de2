use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    database::Database,
    fulfillment,
    middleware::{get_current_user, CurrentUser},
    models::{
        request::RequestLineInput, CreateRequest, RequestLineRow, RequestRow, RequestStatus,
        RequestView, Role,
    },
    response::{created, ok, ok_with, ApiError, ApiResult},
};

const REQUEST_COLUMNS: &str = r#"
    r.id, r.shelter_id, s.name AS shelter_name,
    r.warehouse_id, w.name AS warehouse_name,
    r.requested_by, u.name AS requester_name,
    r.status, r.rejection_reason, r.rejected_by, r.rejected_at,
    r.approved_by, r.approved_at, r.created_at
"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequestsQuery {
    pub status: Option<RequestStatus>,
    pub shelter_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct RejectBody {
    pub reason: Option<String>,
}

fn validate_lines(items: &[RequestLineInput]) -> Result<(), String> {
    if items.is_empty() {
        return Err("Request must contain at least one item".to_string());
    }
    for line in items {
        if line.quantity <= 0 {
            return Err(format!(
                "Quantity for item {} must be greater than zero",
                line.item_id
            ));
        }
    }
    let mut seen = Vec::with_capacity(items.len());
    for line in items {
        if seen.contains(&line.item_id) {
            return Err(format!("Duplicate item {} in request", line.item_id));
        }
        seen.push(line.item_id);
    }
    Ok(())
}

/// Which shelter a submission belongs to. Shelter staff are pinned to their
/// own shelter; staff roles must name one explicitly.
fn resolve_shelter(actor: &CurrentUser, requested: Option<Uuid>) -> Result<Uuid, ApiError> {
    match actor.role {
        Role::ShelterStaff => {
            let own = actor.shelter_id.ok_or_else(|| {
                ApiError::Forbidden("Shelter staff account is not linked to a shelter".to_string())
            })?;
            match requested {
                Some(sid) if sid != own => Err(ApiError::Forbidden(
                    "Cannot submit requests for another shelter".to_string(),
                )),
                _ => Ok(own),
            }
        }
        _ => requested.ok_or_else(|| ApiError::Invalid("shelterId is required".to_string())),
    }
}

pub async fn list_requests(
    headers: HeaderMap,
    State(db): State<Database>,
    Query(query): Query<ListRequestsQuery>,
) -> ApiResult {
    let actor = get_current_user(&headers, &db)
        .await
        .ok_or(ApiError::Unauthorized)?;

    // Shelter staff only ever see their shelter's requests (or, when the
    // account has no shelter link, their own submissions).
    let (scope_shelter, scope_requester) = match actor.role {
        Role::ShelterStaff => match actor.shelter_id {
            Some(sid) => (Some(sid), None),
            None => (None, Some(actor.id)),
        },
        _ => (None, None),
    };

    let sql = format!(
        r#"
        SELECT {REQUEST_COLUMNS}
        FROM requests r
        JOIN shelters s ON s.id = r.shelter_id
        JOIN warehouses w ON w.id = r.warehouse_id
        JOIN users u ON u.id = r.requested_by
        WHERE ($1::request_status IS NULL OR r.status = $1)
          AND ($2::uuid IS NULL OR r.shelter_id = $2)
          AND ($3::uuid IS NULL OR r.shelter_id = $3)
          AND ($4::uuid IS NULL OR r.requested_by = $4)
        ORDER BY r.created_at DESC
        "#
    );

    let rows = sqlx::query_as::<_, RequestRow>(&sql)
        .bind(query.status)
        .bind(query.shelter_id)
        .bind(scope_shelter)
        .bind(scope_requester)
        .fetch_all(&db)
        .await?;

    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let lines = sqlx::query_as::<_, RequestLineRow>(
        r#"
        SELECT ri.request_id, ri.item_id, i.name AS item_name, i.unit, ri.quantity
        FROM request_items ri
        JOIN items i ON i.id = ri.item_id
        WHERE ri.request_id = ANY($1)
        "#,
    )
    .bind(&ids)
    .fetch_all(&db)
    .await?;

    let mut lines_by_request: HashMap<Uuid, Vec<RequestLineRow>> = HashMap::new();
    for line in lines {
        lines_by_request.entry(line.request_id).or_default().push(line);
    }

    let views: Vec<RequestView> = rows
        .into_iter()
        .map(|row| {
            let lines = lines_by_request.remove(&row.id).unwrap_or_default();
            RequestView::assemble(row, lines)
        })
        .collect();

    Ok(ok(views))
}

pub async fn get_request(
    headers: HeaderMap,
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let actor = get_current_user(&headers, &db)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let view = fetch_request_view(&db, id).await?;

    if actor.role == Role::ShelterStaff
        && actor.shelter_id != Some(view.shelter_id)
        && actor.id != view.requested_by
    {
        return Err(ApiError::Forbidden(
            "Cannot view another shelter's request".to_string(),
        ));
    }

    Ok(ok(view))
}

pub async fn create_request(
    headers: HeaderMap,
    State(db): State<Database>,
    Json(body): Json<CreateRequest>,
) -> ApiResult {
    let actor = get_current_user(&headers, &db)
        .await
        .ok_or(ApiError::Unauthorized)?;

    validate_lines(&body.items).map_err(ApiError::Invalid)?;
    let shelter_id = resolve_shelter(&actor, body.shelter_id)?;

    let shelter_exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM shelters WHERE id = $1)")
            .bind(shelter_id)
            .fetch_one(&db)
            .await?;
    if !shelter_exists {
        return Err(ApiError::NotFound("Shelter not found".to_string()));
    }

    let warehouse_exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM warehouses WHERE id = $1)")
            .bind(body.warehouse_id)
            .fetch_one(&db)
            .await?;
    if !warehouse_exists {
        return Err(ApiError::NotFound("Warehouse not found".to_string()));
    }

    let item_ids: Vec<Uuid> = body.items.iter().map(|l| l.item_id).collect();
    let known_items =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM items WHERE id = ANY($1)")
            .bind(&item_ids)
            .fetch_one(&db)
            .await?;
    if known_items != item_ids.len() as i64 {
        return Err(ApiError::NotFound(
            "One or more requested items not found".to_string(),
        ));
    }

    let mut tx = db.begin().await?;

    let request_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO requests (id, shelter_id, warehouse_id, requested_by, status)
         VALUES ($1, $2, $3, $4, 'pending')",
    )
    .bind(request_id)
    .bind(shelter_id)
    .bind(body.warehouse_id)
    .bind(actor.id)
    .execute(&mut *tx)
    .await?;

    for line in &body.items {
        sqlx::query(
            "INSERT INTO request_items (request_id, item_id, quantity) VALUES ($1, $2, $3)",
        )
        .bind(request_id)
        .bind(line.item_id)
        .bind(line.quantity)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let view = fetch_request_view(&db, request_id).await?;
    Ok(created(view, "Request submitted successfully"))
}

pub async fn approve_request(
    headers: HeaderMap,
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let actor = get_current_user(&headers, &db)
        .await
        .ok_or(ApiError::Unauthorized)?;

    if !actor.role.can_manage_stock() {
        return Err(ApiError::Forbidden(
            "Only warehouse staff or admin can approve requests".to_string(),
        ));
    }

    let requester = fulfillment::approve(&db, &actor, id).await?;

    fulfillment::notify(
        &db,
        requester,
        "request_approved",
        "Request Approved",
        "Your supply request has been approved",
        Some(id),
    )
    .await;

    let view = fetch_request_view(&db, id).await?;
    Ok(ok_with(view, "Request approved successfully"))
}

pub async fn reject_request(
    headers: HeaderMap,
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    body: Option<Json<RejectBody>>,
) -> ApiResult {
    let actor = get_current_user(&headers, &db)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let reason = body.and_then(|Json(b)| b.reason);
    let outcome = fulfillment::reject(&db, &actor, id, reason).await?;

    fulfillment::notify(
        &db,
        outcome.requested_by,
        "request_rejected",
        "Request Rejected",
        &format!("Your request has been rejected. Reason: {}", outcome.reason),
        Some(id),
    )
    .await;

    let view = fetch_request_view(&db, id).await?;
    Ok(ok_with(view, "Request rejected successfully"))
}

async fn fetch_request_view(db: &Database, id: Uuid) -> Result<RequestView, ApiError> {
    let sql = format!(
        r#"
        SELECT {REQUEST_COLUMNS}
        FROM requests r
        JOIN shelters s ON s.id = r.shelter_id
        JOIN warehouses w ON w.id = r.warehouse_id
        JOIN users u ON u.id = r.requested_by
        WHERE r.id = $1
        "#
    );

    let row = sqlx::query_as::<_, RequestRow>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::NotFound("Request not found".to_string()))?;

    let lines = sqlx::query_as::<_, RequestLineRow>(
        r#"
        SELECT ri.request_id, ri.item_id, i.name AS item_name, i.unit, ri.quantity
        FROM request_items ri
        JOIN items i ON i.id = ri.item_id
        WHERE ri.request_id = $1
        "#,
    )
    .bind(id)
    .fetch_all(db)
    .await?;

    Ok(RequestView::assemble(row, lines))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: Role, shelter_id: Option<Uuid>) -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            name: "Test".to_string(),
            email: "test@example.org".to_string(),
            role,
            shelter_id,
        }
    }

    #[test]
    fn empty_request_is_rejected() {
        assert!(validate_lines(&[]).is_err());
    }

    #[test]
    fn zero_and_negative_quantities_are_rejected() {
        let item = Uuid::new_v4();
        let zero = vec![RequestLineInput {
            item_id: item,
            quantity: 0,
        }];
        let negative = vec![RequestLineInput {
            item_id: item,
            quantity: -3,
        }];
        assert!(validate_lines(&zero).is_err());
        assert!(validate_lines(&negative).is_err());
    }

    #[test]
    fn duplicate_items_are_rejected() {
        let item = Uuid::new_v4();
        let lines = vec![
            RequestLineInput {
                item_id: item,
                quantity: 2,
            },
            RequestLineInput {
                item_id: item,
                quantity: 5,
            },
        ];
        assert!(validate_lines(&lines).is_err());
    }

    #[test]
    fn well_formed_lines_pass() {
        let lines = vec![
            RequestLineInput {
                item_id: Uuid::new_v4(),
                quantity: 1,
            },
            RequestLineInput {
                item_id: Uuid::new_v4(),
                quantity: 30,
            },
        ];
        assert!(validate_lines(&lines).is_ok());
    }

    #[test]
    fn shelter_staff_are_pinned_to_their_shelter() {
        let own = Uuid::new_v4();
        let staff = actor(Role::ShelterStaff, Some(own));

        assert_eq!(resolve_shelter(&staff, None).unwrap(), own);
        assert_eq!(resolve_shelter(&staff, Some(own)).unwrap(), own);
        assert!(resolve_shelter(&staff, Some(Uuid::new_v4())).is_err());
    }

    #[test]
    fn unlinked_shelter_staff_cannot_submit() {
        let staff = actor(Role::ShelterStaff, None);
        assert!(resolve_shelter(&staff, Some(Uuid::new_v4())).is_err());
    }

    #[test]
    fn staff_roles_must_name_a_shelter() {
        let admin = actor(Role::Admin, None);
        let sid = Uuid::new_v4();
        assert_eq!(resolve_shelter(&admin, Some(sid)).unwrap(), sid);
        assert!(resolve_shelter(&admin, None).is_err());
    }
}
