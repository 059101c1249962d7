//! TCC participant: balance reservations against `available_amount`,
//! confirmed against `current_amount`. The Try/Confirm/Cancel pairing keeps
//! `available_amount <= current_amount`.

use diesel_async::{pooled_connection::bb8::Pool, AsyncConnection, AsyncPgConnection};
use shared::reservation::{
    self, CancelAction, ConfirmAction, ReservationStatus, TryAction, STATUS_PENDING,
};
use shared::{ActionRequest, ServiceError};
use tracing::info;

use crate::models::{NewUserPayment, PAYMENT_DEBIT};
use crate::store;

type DbPool = Pool<AsyncPgConnection>;

pub async fn try_reserve(pool: &DbPool, req: &ActionRequest) -> Result<(), ServiceError> {
    let order_id = req.order_id;
    let user_id = req.user_id;
    let amount = req.amount;

    if amount <= 0 {
        return Err(ServiceError::InvalidInput(
            "amount must be greater than 0".to_string(),
        ));
    }

    let mut conn = pool.get().await.map_err(ServiceError::pool)?;
    conn.transaction::<_, ServiceError, _>(|conn| {
        Box::pin(async move {
            let wallet = store::wallet_for_update(conn, user_id)
                .await?
                .ok_or(ServiceError::NotFound("wallet"))?;

            let status = store::payment_status(conn, order_id).await?;
            match reservation::decide_try(status)? {
                TryAction::AlreadyReserved => {
                    info!("payment already pending for order {}", order_id);
                    return Ok(());
                }
                TryAction::Reserve => {}
            }

            if wallet.available_amount < amount {
                return Err(ServiceError::Insufficient("funds"));
            }

            store::adjust_available_amount(conn, user_id, -amount).await?;
            store::insert_payment(
                conn,
                NewUserPayment::new(user_id, order_id, amount, PAYMENT_DEBIT, Some(STATUS_PENDING)),
            )
            .await?;

            Ok(())
        })
    })
    .await?;

    info!("reserved {} from wallet of user {} for order {}", amount, user_id, order_id);
    Ok(())
}

pub async fn confirm(pool: &DbPool, req: &ActionRequest) -> Result<(), ServiceError> {
    let order_id = req.order_id;
    let user_id = req.user_id;
    let amount = req.amount;

    let mut conn = pool.get().await.map_err(ServiceError::pool)?;
    conn.transaction::<_, ServiceError, _>(|conn| {
        Box::pin(async move {
            store::wallet_for_update(conn, user_id)
                .await?
                .ok_or(ServiceError::NotFound("wallet"))?;

            let status = store::payment_status(conn, order_id).await?;
            match reservation::decide_confirm(status)? {
                ConfirmAction::AlreadyConfirmed => {
                    info!("payment already confirmed for order {}", order_id);
                    return Ok(());
                }
                ConfirmAction::Apply => {}
            }

            // Try already took the amount from available_amount; the balance
            // catches up here and the ledger row is closed.
            store::adjust_current_amount(conn, user_id, -amount).await?;
            store::finalise_payment(conn, order_id, ReservationStatus::Completed).await?;

            Ok(())
        })
    })
    .await?;

    info!("confirmed debit of {} for order {}", amount, order_id);
    Ok(())
}

pub async fn cancel(pool: &DbPool, req: &ActionRequest) -> Result<(), ServiceError> {
    let order_id = req.order_id;
    let user_id = req.user_id;
    let amount = req.amount;

    let mut conn = pool.get().await.map_err(ServiceError::pool)?;
    conn.transaction::<_, ServiceError, _>(|conn| {
        Box::pin(async move {
            store::wallet_for_update(conn, user_id)
                .await?
                .ok_or(ServiceError::NotFound("wallet"))?;

            let status = store::payment_status(conn, order_id).await?;
            match reservation::decide_cancel(status)? {
                CancelAction::Noop => {
                    info!("nothing to cancel for order {}", order_id);
                    return Ok(());
                }
                CancelAction::Release => {}
            }

            store::adjust_available_amount(conn, user_id, amount).await?;
            store::finalise_payment(conn, order_id, ReservationStatus::Rejected).await?;

            Ok(())
        })
    })
    .await?;

    info!("released reserved {} for order {}", amount, order_id);
    Ok(())
}
