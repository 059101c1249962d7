//! Saga participant: forward wallet debit and its compensating credit. The
//! debit checks funds under the row lock before updating, so the balance can
//! never go negative on the saga path.

use diesel_async::{pooled_connection::bb8::Pool, AsyncConnection, AsyncPgConnection};
use shared::{ActionRequest, ServiceError};
use tracing::info;

use crate::models::{NewUserPayment, PAYMENT_CREDIT, PAYMENT_DEBIT};
use crate::store;

type DbPool = Pool<AsyncPgConnection>;

/// Forward action: debit the order amount from the user's wallet.
pub async fn debit(pool: &DbPool, req: &ActionRequest) -> Result<(), ServiceError> {
    let order_id = req.order_id;
    let user_id = req.user_id;
    let amount = req.amount;

    let mut conn = pool.get().await.map_err(ServiceError::pool)?;
    conn.transaction::<_, ServiceError, _>(|conn| {
        Box::pin(async move {
            let wallet = store::wallet_for_update(conn, user_id)
                .await?
                .ok_or(ServiceError::NotFound("wallet"))?;

            if store::payment_exists(conn, order_id, PAYMENT_DEBIT).await? {
                info!("debit already applied for order {}", order_id);
                return Ok(());
            }

            if wallet.current_amount < amount {
                return Err(ServiceError::Insufficient("funds"));
            }

            store::adjust_current_amount(conn, user_id, -amount).await?;
            store::insert_payment(
                conn,
                NewUserPayment::new(user_id, order_id, amount, PAYMENT_DEBIT, None),
            )
            .await?;

            Ok(())
        })
    })
    .await?;

    info!("debited {} from wallet of user {} for order {}", amount, user_id, order_id);
    Ok(())
}

/// Compensation: credit the amount back. No funds check; guarded only by the
/// idempotency ledger.
pub async fn compensate(pool: &DbPool, req: &ActionRequest) -> Result<(), ServiceError> {
    let order_id = req.order_id;
    let user_id = req.user_id;
    let amount = req.amount;

    let mut conn = pool.get().await.map_err(ServiceError::pool)?;
    conn.transaction::<_, ServiceError, _>(|conn| {
        Box::pin(async move {
            store::wallet_for_update(conn, user_id)
                .await?
                .ok_or(ServiceError::NotFound("wallet"))?;

            if store::payment_exists(conn, order_id, PAYMENT_CREDIT).await? {
                info!("compensation already applied for order {}", order_id);
                return Ok(());
            }

            store::adjust_current_amount(conn, user_id, amount).await?;
            store::insert_payment(
                conn,
                NewUserPayment::new(user_id, order_id, amount, PAYMENT_CREDIT, None),
            )
            .await?;

            Ok(())
        })
    })
    .await?;

    info!("credited {} back to wallet of user {} for order {}", amount, user_id, order_id);
    Ok(())
}
