//! TCC participant: reservations against `stock_available`, confirmed against
//! `current_stock`. Every Try pairs with exactly one Confirm (current catches
//! up with the reservation) or one Cancel (the reservation is returned), which
//! preserves `stock_available <= current_stock`.

use diesel_async::{pooled_connection::bb8::Pool, AsyncConnection, AsyncPgConnection};
use shared::reservation::{
    self, CancelAction, ConfirmAction, ReservationStatus, TryAction, STATUS_PENDING,
};
use shared::{ActionRequest, ServiceError};
use tracing::info;

use crate::models::{NewInventoryMovement, MOVEMENT_DECREASE};
use crate::store;

type DbPool = Pool<AsyncPgConnection>;

pub async fn try_reserve(pool: &DbPool, req: &ActionRequest) -> Result<(), ServiceError> {
    let order_id = req.order_id;
    let product_id = req.product_id;

    let mut conn = pool.get().await.map_err(ServiceError::pool)?;
    conn.transaction::<_, ServiceError, _>(|conn| {
        Box::pin(async move {
            let product = store::product_for_update(conn, product_id)
                .await?
                .ok_or(ServiceError::NotFound("product"))?;

            let status = store::movement_status(conn, order_id).await?;
            match reservation::decide_try(status)? {
                TryAction::AlreadyReserved => {
                    info!("reservation already pending for order {}", order_id);
                    return Ok(());
                }
                TryAction::Reserve => {}
            }

            if product.stock_available < 1 {
                return Err(ServiceError::Insufficient("stock"));
            }

            store::adjust_stock_available(conn, product_id, -1).await?;
            store::insert_movement(
                conn,
                NewInventoryMovement::new(
                    product_id,
                    order_id,
                    MOVEMENT_DECREASE,
                    Some(STATUS_PENDING),
                ),
            )
            .await?;

            Ok(())
        })
    })
    .await?;

    info!("reserved 1 unit of product {} for order {}", product_id, order_id);
    Ok(())
}

pub async fn confirm(pool: &DbPool, req: &ActionRequest) -> Result<(), ServiceError> {
    let order_id = req.order_id;
    let product_id = req.product_id;

    let mut conn = pool.get().await.map_err(ServiceError::pool)?;
    conn.transaction::<_, ServiceError, _>(|conn| {
        Box::pin(async move {
            store::product_for_update(conn, product_id)
                .await?
                .ok_or(ServiceError::NotFound("product"))?;

            let status = store::movement_status(conn, order_id).await?;
            match reservation::decide_confirm(status)? {
                ConfirmAction::AlreadyConfirmed => {
                    info!("reservation already confirmed for order {}", order_id);
                    return Ok(());
                }
                ConfirmAction::Apply => {}
            }

            // Try already took the unit from stock_available; current_stock
            // catches up here and the reservation row is closed.
            store::adjust_current_stock(conn, product_id, -1).await?;
            store::finalise_movement(conn, order_id, ReservationStatus::Completed).await?;

            Ok(())
        })
    })
    .await?;

    info!("confirmed reservation of product {} for order {}", product_id, order_id);
    Ok(())
}

pub async fn cancel(pool: &DbPool, req: &ActionRequest) -> Result<(), ServiceError> {
    let order_id = req.order_id;
    let product_id = req.product_id;

    let mut conn = pool.get().await.map_err(ServiceError::pool)?;
    conn.transaction::<_, ServiceError, _>(|conn| {
        Box::pin(async move {
            store::product_for_update(conn, product_id)
                .await?
                .ok_or(ServiceError::NotFound("product"))?;

            let status = store::movement_status(conn, order_id).await?;
            match reservation::decide_cancel(status)? {
                CancelAction::Noop => {
                    info!("nothing to cancel for order {}", order_id);
                    return Ok(());
                }
                CancelAction::Release => {}
            }

            store::adjust_stock_available(conn, product_id, 1).await?;
            store::finalise_movement(conn, order_id, ReservationStatus::Rejected).await?;

            Ok(())
        })
    })
    .await?;

    info!("released reservation of product {} for order {}", product_id, order_id);
    Ok(())
}
