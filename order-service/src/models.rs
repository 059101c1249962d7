use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use shared::ServiceError;
use uuid::Uuid;

/// Order lifecycle. Transitions are monotonic: `pending` moves into exactly
/// one terminal status and never moves again. Saga compensation rejects, TCC
/// cancellation cancels; 2PC writes `completed` directly inside the prepared
/// transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Completed,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Decision for Complete (saga final step) and Confirm (TCC). Returns the
/// status to write, `None` for an idempotent noop.
pub fn decide_completion(status: Option<OrderStatus>) -> Result<Option<OrderStatus>, ServiceError> {
    match status {
        None => Err(ServiceError::NotFound("order")),
        Some(OrderStatus::Pending) => Ok(Some(OrderStatus::Completed)),
        Some(OrderStatus::Completed) => Ok(None),
        Some(OrderStatus::Rejected) | Some(OrderStatus::Cancelled) => Err(ServiceError::Conflict(
            "cannot complete a failed order".to_string(),
        )),
    }
}

/// Decision for Compensate (saga, target `rejected`) and Cancel (TCC, target
/// `cancelled`). A missing order is an empty rollback and succeeds.
pub fn decide_failure(
    status: Option<OrderStatus>,
    target: OrderStatus,
) -> Result<Option<OrderStatus>, ServiceError> {
    match status {
        None => Ok(None),
        Some(OrderStatus::Pending) => Ok(Some(target)),
        Some(OrderStatus::Rejected) | Some(OrderStatus::Cancelled) => Ok(None),
        Some(OrderStatus::Completed) => Err(ServiceError::Conflict(
            "cannot fail a completed order".to_string(),
        )),
    }
}

#[derive(Debug, Clone, Queryable, Serialize)]
pub struct Order {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub amount: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::orders)]
pub struct NewOrder {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub amount: i32,
    pub status: String,
}

impl NewOrder {
    pub fn with_status(
        order_id: Uuid,
        user_id: Uuid,
        product_id: Uuid,
        amount: i32,
        status: OrderStatus,
    ) -> Self {
        Self {
            order_id,
            user_id,
            product_id,
            amount,
            status: status.as_str().to_string(),
        }
    }

    pub fn pending(order_id: Uuid, user_id: Uuid, product_id: Uuid, amount: i32) -> Self {
        Self::with_status(order_id, user_id, product_id, amount, OrderStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn status_strings_round_trip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Completed,
            OrderStatus::Rejected,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("unknown"), None);
    }

    #[test]
    fn only_pending_is_not_terminal() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }

    #[test]
    fn completion_advances_pending_orders() {
        assert_eq!(
            decide_completion(Some(OrderStatus::Pending)).unwrap(),
            Some(OrderStatus::Completed)
        );
    }

    #[test]
    fn completion_is_idempotent() {
        assert_eq!(decide_completion(Some(OrderStatus::Completed)).unwrap(), None);
    }

    #[test]
    fn completion_of_missing_order_is_refused() {
        let err = decide_completion(None).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn completion_after_failure_conflicts() {
        for status in [OrderStatus::Rejected, OrderStatus::Cancelled] {
            let err = decide_completion(Some(status)).unwrap_err();
            assert_eq!(err.status_code(), StatusCode::CONFLICT);
        }
    }

    #[test]
    fn failure_targets_the_protocol_status() {
        assert_eq!(
            decide_failure(Some(OrderStatus::Pending), OrderStatus::Rejected).unwrap(),
            Some(OrderStatus::Rejected)
        );
        assert_eq!(
            decide_failure(Some(OrderStatus::Pending), OrderStatus::Cancelled).unwrap(),
            Some(OrderStatus::Cancelled)
        );
    }

    #[test]
    fn failure_of_missing_order_is_an_empty_rollback() {
        assert_eq!(decide_failure(None, OrderStatus::Rejected).unwrap(), None);
    }

    #[test]
    fn failure_is_idempotent_on_terminal_failure_states() {
        for status in [OrderStatus::Rejected, OrderStatus::Cancelled] {
            assert_eq!(decide_failure(Some(status), OrderStatus::Cancelled).unwrap(), None);
        }
    }

    #[test]
    fn failure_of_completed_order_conflicts() {
        let err = decide_failure(Some(OrderStatus::Completed), OrderStatus::Rejected).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }
}
