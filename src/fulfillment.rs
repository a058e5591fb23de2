//! Supply-request lifecycle: the pending -> approved/rejected transition and
//! the stock adjustments an approval triggers. All multi-row mutation happens
//! inside one transaction; the status transition itself is a conditional
//! update, so concurrent decisions on the same request serialize and the loser
//! sees "not pending".

use std::collections::HashMap;

use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    database::Database,
    middleware::CurrentUser,
    response::ApiError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectAuthority {
    /// Admin or warehouse staff rejecting any pending request.
    Staff,
    /// The original requester cancelling their own pending request.
    Requester,
}

/// Who may reject a given request. Staff roles may reject anything; everyone
/// else only their own.
pub fn reject_authority(
    actor: &CurrentUser,
    requested_by: Uuid,
) -> Option<RejectAuthority> {
    if actor.role.can_manage_stock() {
        Some(RejectAuthority::Staff)
    } else if actor.id == requested_by {
        Some(RejectAuthority::Requester)
    } else {
        None
    }
}

pub fn default_rejection_reason(authority: RejectAuthority) -> &'static str {
    match authority {
        RejectAuthority::Requester => "Cancelled by requester",
        RejectAuthority::Staff => "Rejected by staff",
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct RequestLine {
    pub item_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, PartialEq, Eq)]
pub enum AvailabilityError {
    MissingStock { item_id: Uuid },
    Insufficient { item_id: Uuid, requested: i32, available: i32 },
}

impl From<AvailabilityError> for ApiError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::MissingStock { item_id } => ApiError::NotFound(format!(
                "No stock record for item {} in warehouse",
                item_id
            )),
            AvailabilityError::Insufficient {
                item_id,
                requested,
                available,
            } => ApiError::Invalid(format!(
                "Insufficient stock for item {}: requested {}, available {}",
                item_id, requested, available
            )),
        }
    }
}

/// Validate every line against on-hand quantities before touching anything.
/// A single failing line fails the whole approval; no partial fulfillment.
pub fn check_availability(
    lines: &[RequestLine],
    on_hand: &HashMap<Uuid, i32>,
) -> Result<(), AvailabilityError> {
    for line in lines {
        match on_hand.get(&line.item_id) {
            None => {
                return Err(AvailabilityError::MissingStock {
                    item_id: line.item_id,
                })
            }
            Some(&available) if available < line.quantity => {
                return Err(AvailabilityError::Insufficient {
                    item_id: line.item_id,
                    requested: line.quantity,
                    available,
                });
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// The item ids of a request in ascending order, which is the order stock
/// row locks are acquired in.
fn lock_order(lines: &[RequestLine]) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = lines.iter().map(|l| l.item_id).collect();
    ids.sort_unstable();
    ids
}

#[derive(Debug, FromRow)]
struct RequestHead {
    warehouse_id: Uuid,
    requested_by: Uuid,
}

#[derive(Debug, FromRow)]
struct StockOnHand {
    item_id: Uuid,
    quantity: i32,
}

/// Approve a pending request and decrement each line's stock, all or nothing.
/// Returns the requester's id for notification. The caller has already
/// checked the actor's role.
pub async fn approve(
    db: &Database,
    actor: &CurrentUser,
    request_id: Uuid,
) -> Result<Uuid, ApiError> {
    let mut tx = db.begin().await?;

    let head = sqlx::query_as::<_, RequestHead>(
        "SELECT warehouse_id, requested_by FROM requests WHERE id = $1",
    )
    .bind(request_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::NotFound("Request not found".to_string()))?;

    // Conditional transition: zero rows means a concurrent decision won or
    // the request is already terminal.
    let transition = sqlx::query(
        "UPDATE requests
         SET status = 'approved', approved_by = $2, approved_at = now()
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(request_id)
    .bind(actor.id)
    .execute(&mut *tx)
    .await?;

    if transition.rows_affected() == 0 {
        return Err(ApiError::Invalid(
            "Can only approve pending requests".to_string(),
        ));
    }

    let lines = sqlx::query_as::<_, RequestLine>(
        "SELECT item_id, quantity FROM request_items WHERE request_id = $1",
    )
    .bind(request_id)
    .fetch_all(&mut *tx)
    .await?;

    let item_ids = lock_order(&lines);

    // Lock the affected stock rows so the availability check and the
    // decrements see one consistent snapshot. Locks are taken in ascending
    // item order so overlapping concurrent approvals cannot deadlock.
    let stocks = sqlx::query_as::<_, StockOnHand>(
        "SELECT item_id, quantity FROM stocks
         WHERE warehouse_id = $1 AND item_id = ANY($2)
         ORDER BY item_id
         FOR UPDATE",
    )
    .bind(head.warehouse_id)
    .bind(&item_ids)
    .fetch_all(&mut *tx)
    .await?;

    let on_hand: HashMap<Uuid, i32> =
        stocks.into_iter().map(|s| (s.item_id, s.quantity)).collect();

    check_availability(&lines, &on_hand)?;

    for line in &lines {
        let decrement = sqlx::query(
            "UPDATE stocks
             SET quantity = quantity - $3, updated_at = now()
             WHERE warehouse_id = $1 AND item_id = $2 AND quantity >= $3",
        )
        .bind(head.warehouse_id)
        .bind(line.item_id)
        .bind(line.quantity)
        .execute(&mut *tx)
        .await?;

        // Rows are locked, so this only trips if the check above was wrong.
        if decrement.rows_affected() != 1 {
            return Err(ApiError::Invalid(format!(
                "Insufficient stock for item {}",
                line.item_id
            )));
        }

        sqlx::query(
            "INSERT INTO stock_logs (id, warehouse_id, item_id, change, reason, actor_id)
             VALUES ($1, $2, $3, $4, 'request_approved', $5)",
        )
        .bind(Uuid::new_v4())
        .bind(head.warehouse_id)
        .bind(line.item_id)
        .bind(-line.quantity)
        .bind(actor.id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(head.requested_by)
}

#[derive(Debug)]
pub struct RejectOutcome {
    pub requested_by: Uuid,
    pub reason: String,
}

/// Reject (staff) or cancel (requester) a pending request. No stock was
/// reserved at submission, so there are no stock side effects.
pub async fn reject(
    db: &Database,
    actor: &CurrentUser,
    request_id: Uuid,
    reason: Option<String>,
) -> Result<RejectOutcome, ApiError> {
    let requested_by = sqlx::query_scalar::<_, Uuid>(
        "SELECT requested_by FROM requests WHERE id = $1",
    )
    .bind(request_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| ApiError::NotFound("Request not found".to_string()))?;

    let authority = reject_authority(actor, requested_by).ok_or_else(|| {
        ApiError::Forbidden(
            "Only warehouse staff, admin, or the requester can reject this request".to_string(),
        )
    })?;

    let reason = reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| default_rejection_reason(authority).to_string());

    let transition = sqlx::query(
        "UPDATE requests
         SET status = 'rejected', rejection_reason = $2, rejected_by = $3, rejected_at = now()
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(request_id)
    .bind(&reason)
    .bind(actor.id)
    .execute(db)
    .await?;

    if transition.rows_affected() == 0 {
        return Err(ApiError::Invalid(
            "Can only reject pending requests".to_string(),
        ));
    }

    Ok(RejectOutcome {
        requested_by,
        reason,
    })
}

/// Best-effort notification insert. The decision has already been persisted,
/// so failures here are logged and swallowed.
pub async fn notify(
    db: &Database,
    user_id: Uuid,
    kind: &str,
    title: &str,
    message: &str,
    related_id: Option<Uuid>,
) {
    let result = sqlx::query(
        "INSERT INTO notifications (id, user_id, kind, title, message, related_id)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(kind)
    .bind(title)
    .bind(message)
    .bind(related_id)
    .execute(db)
    .await;

    if let Err(err) = result {
        log::warn!("Failed to create notification for {}: {}", user_id, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn user(role: Role, id: Uuid) -> CurrentUser {
        CurrentUser {
            id,
            name: "Test User".to_string(),
            email: "test@example.org".to_string(),
            role,
            shelter_id: None,
        }
    }

    fn line(item_id: Uuid, quantity: i32) -> RequestLine {
        RequestLine { item_id, quantity }
    }

    #[test]
    fn staff_may_reject_any_request() {
        let requester = Uuid::new_v4();
        let admin = user(Role::Admin, Uuid::new_v4());
        let warehouse = user(Role::WarehouseStaff, Uuid::new_v4());

        assert_eq!(
            reject_authority(&admin, requester),
            Some(RejectAuthority::Staff)
        );
        assert_eq!(
            reject_authority(&warehouse, requester),
            Some(RejectAuthority::Staff)
        );
    }

    #[test]
    fn requester_may_cancel_their_own_request_only() {
        let own_id = Uuid::new_v4();
        let shelter = user(Role::ShelterStaff, own_id);

        assert_eq!(
            reject_authority(&shelter, own_id),
            Some(RejectAuthority::Requester)
        );
        assert_eq!(reject_authority(&shelter, Uuid::new_v4()), None);
    }

    #[test]
    fn rejection_reason_defaults_by_authority() {
        assert_eq!(
            default_rejection_reason(RejectAuthority::Requester),
            "Cancelled by requester"
        );
        assert_eq!(
            default_rejection_reason(RejectAuthority::Staff),
            "Rejected by staff"
        );
    }

    #[test]
    fn availability_passes_when_every_line_is_covered() {
        let rice = Uuid::new_v4();
        let water = Uuid::new_v4();
        let on_hand = HashMap::from([(rice, 100), (water, 20)]);

        let lines = vec![line(rice, 30), line(water, 20)];
        assert_eq!(check_availability(&lines, &on_hand), Ok(()));
    }

    #[test]
    fn availability_fails_on_missing_stock_row() {
        let rice = Uuid::new_v4();
        let blankets = Uuid::new_v4();
        let on_hand = HashMap::from([(rice, 100)]);

        let lines = vec![line(rice, 10), line(blankets, 1)];
        assert_eq!(
            check_availability(&lines, &on_hand),
            Err(AvailabilityError::MissingStock { item_id: blankets })
        );
    }

    #[test]
    fn availability_fails_whole_request_on_one_short_line() {
        let rice = Uuid::new_v4();
        let water = Uuid::new_v4();
        let on_hand = HashMap::from([(rice, 100), (water, 5)]);

        let lines = vec![line(rice, 30), line(water, 6)];
        assert_eq!(
            check_availability(&lines, &on_hand),
            Err(AvailabilityError::Insufficient {
                item_id: water,
                requested: 6,
                available: 5,
            })
        );
    }

    #[test]
    fn sequential_approvals_drain_stock_exactly() {
        // Stock of 100; a 30-unit approval leaves 70, after which an
        // 80-unit request must fail.
        let rice = Uuid::new_v4();
        let mut on_hand = HashMap::from([(rice, 100)]);

        let first = vec![line(rice, 30)];
        assert_eq!(check_availability(&first, &on_hand), Ok(()));
        *on_hand.get_mut(&rice).unwrap() -= 30;
        assert_eq!(on_hand[&rice], 70);

        let second = vec![line(rice, 80)];
        assert_eq!(
            check_availability(&second, &on_hand),
            Err(AvailabilityError::Insufficient {
                item_id: rice,
                requested: 80,
                available: 70,
            })
        );
        // Nothing was decremented by the failed check.
        assert_eq!(on_hand[&rice], 70);
    }

    #[test]
    fn lock_order_is_ascending_regardless_of_line_order() {
        let mut lines: Vec<RequestLine> =
            (1..=6).map(|q| line(Uuid::new_v4(), q)).collect();
        lines.reverse();

        let ids = lock_order(&lines);
        let mut sorted = ids.clone();
        sorted.sort_unstable();

        assert_eq!(ids, sorted);
        assert_eq!(ids.len(), lines.len());
    }

    #[test]
    fn exact_quantity_is_sufficient() {
        let rice = Uuid::new_v4();
        let on_hand = HashMap::from([(rice, 70)]);
        assert_eq!(check_availability(&[line(rice, 70)], &on_hand), Ok(()));
    }
}
