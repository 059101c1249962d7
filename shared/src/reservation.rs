//! Try/Confirm/Cancel ledger state machine.
//!
//! A reservation row exists per `order_id` and moves `pending` into exactly
//! one of `completed` or `rejected`. The decision tables here are evaluated
//! while the resource row lock is held; the store layer then applies the
//! chosen action inside the same transaction.

use crate::ServiceError;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_REJECTED: &str = "rejected";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationStatus {
    Pending,
    Completed,
    Rejected,
}

impl ReservationStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            STATUS_PENDING => Some(Self::Pending),
            STATUS_COMPLETED => Some(Self::Completed),
            STATUS_REJECTED => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => STATUS_PENDING,
            Self::Completed => STATUS_COMPLETED,
            Self::Rejected => STATUS_REJECTED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryAction {
    /// No reservation yet: take from `available` and insert a pending row.
    Reserve,
    /// A pending row already exists for this order; duplicate delivery.
    AlreadyReserved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmAction {
    /// Move the reserved amount out of `current` and complete the row.
    Apply,
    /// Already confirmed; duplicate delivery.
    AlreadyConfirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelAction {
    /// Nothing was ever reserved (empty rollback) or already cancelled.
    Noop,
    /// Return the reserved amount to `available` and reject the row.
    Release,
}

/// Try phase against the existing ledger state.
pub fn decide_try(status: Option<ReservationStatus>) -> Result<TryAction, ServiceError> {
    match status {
        None => Ok(TryAction::Reserve),
        Some(ReservationStatus::Pending) => Ok(TryAction::AlreadyReserved),
        // The coordinator finished this order already; a late Try must not
        // reserve a second time.
        Some(ReservationStatus::Completed) | Some(ReservationStatus::Rejected) => {
            Err(ServiceError::Conflict(
                "reservation already finalised".to_string(),
            ))
        }
    }
}

/// Confirm phase. Confirming an order that never reserved would decrement
/// `current` without a matching `available` decrement, so it is rejected
/// rather than applied blind.
pub fn decide_confirm(status: Option<ReservationStatus>) -> Result<ConfirmAction, ServiceError> {
    match status {
        Some(ReservationStatus::Pending) => Ok(ConfirmAction::Apply),
        Some(ReservationStatus::Completed) => Ok(ConfirmAction::AlreadyConfirmed),
        Some(ReservationStatus::Rejected) => Err(ServiceError::Conflict(
            "cannot confirm cancelled reservation".to_string(),
        )),
        None => Err(ServiceError::Conflict(
            "cannot confirm without reservation".to_string(),
        )),
    }
}

/// Cancel phase. A cancel with no prior Try is accepted as a noop so the
/// coordinator's empty rollback succeeds.
pub fn decide_cancel(status: Option<ReservationStatus>) -> Result<CancelAction, ServiceError> {
    match status {
        None | Some(ReservationStatus::Rejected) => Ok(CancelAction::Noop),
        Some(ReservationStatus::Pending) => Ok(CancelAction::Release),
        Some(ReservationStatus::Completed) => Err(ServiceError::Conflict(
            "cannot cancel completed reservation".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn try_reserves_when_no_ledger_row_exists() {
        assert_eq!(decide_try(None).unwrap(), TryAction::Reserve);
    }

    #[test]
    fn try_is_idempotent_on_pending() {
        assert_eq!(
            decide_try(Some(ReservationStatus::Pending)).unwrap(),
            TryAction::AlreadyReserved
        );
    }

    #[test]
    fn try_after_finalisation_conflicts() {
        for status in [ReservationStatus::Completed, ReservationStatus::Rejected] {
            let err = decide_try(Some(status)).unwrap_err();
            assert_eq!(err.status_code(), StatusCode::CONFLICT);
        }
    }

    #[test]
    fn confirm_applies_on_pending() {
        assert_eq!(
            decide_confirm(Some(ReservationStatus::Pending)).unwrap(),
            ConfirmAction::Apply
        );
    }

    #[test]
    fn confirm_is_idempotent_on_completed() {
        assert_eq!(
            decide_confirm(Some(ReservationStatus::Completed)).unwrap(),
            ConfirmAction::AlreadyConfirmed
        );
    }

    #[test]
    fn confirm_without_reservation_conflicts() {
        let err = decide_confirm(None).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn confirm_after_cancel_conflicts() {
        let err = decide_confirm(Some(ReservationStatus::Rejected)).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn cancel_without_reservation_is_an_empty_rollback() {
        assert_eq!(decide_cancel(None).unwrap(), CancelAction::Noop);
    }

    #[test]
    fn cancel_is_idempotent_on_rejected() {
        assert_eq!(
            decide_cancel(Some(ReservationStatus::Rejected)).unwrap(),
            CancelAction::Noop
        );
    }

    #[test]
    fn cancel_releases_pending_reservation() {
        assert_eq!(
            decide_cancel(Some(ReservationStatus::Pending)).unwrap(),
            CancelAction::Release
        );
    }

    #[test]
    fn cancel_of_completed_reservation_conflicts() {
        let err = decide_cancel(Some(ReservationStatus::Completed)).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            ReservationStatus::Pending,
            ReservationStatus::Completed,
            ReservationStatus::Rejected,
        ] {
            assert_eq!(ReservationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ReservationStatus::parse("unknown"), None);
    }
}
