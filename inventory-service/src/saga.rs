//! Saga participant: forward stock decrement and its compensation. Both run
//! under the product row lock with an idempotency pre-check, so at-least-once
//! delivery from the coordinator applies the effect at most once.

use diesel_async::{pooled_connection::bb8::Pool, AsyncConnection, AsyncPgConnection};
use shared::{ActionRequest, ServiceError};
use tracing::info;

use crate::models::{NewInventoryMovement, MOVEMENT_DECREASED, MOVEMENT_INCREASED};
use crate::store;

type DbPool = Pool<AsyncPgConnection>;

/// Forward action: take one unit of stock for the order.
pub async fn decrease(pool: &DbPool, req: &ActionRequest) -> Result<(), ServiceError> {
    let order_id = req.order_id;
    let product_id = req.product_id;

    let mut conn = pool.get().await.map_err(ServiceError::pool)?;
    conn.transaction::<_, ServiceError, _>(|conn| {
        Box::pin(async move {
            let product = store::product_for_update(conn, product_id)
                .await?
                .ok_or(ServiceError::NotFound("product"))?;

            if store::movement_exists(conn, order_id, MOVEMENT_DECREASED).await? {
                info!("decrease already applied for order {}", order_id);
                return Ok(());
            }

            if product.current_stock < 1 {
                return Err(ServiceError::Insufficient("stock"));
            }

            store::adjust_current_stock(conn, product_id, -1).await?;
            store::insert_movement(
                conn,
                NewInventoryMovement::new(product_id, order_id, MOVEMENT_DECREASED, None),
            )
            .await?;

            Ok(())
        })
    })
    .await?;

    info!("decreased stock of product {} for order {}", product_id, order_id);
    Ok(())
}

/// Compensation: put the unit back. No stock check; the reverse always
/// increments, guarded only by the idempotency ledger.
pub async fn compensate(pool: &DbPool, req: &ActionRequest) -> Result<(), ServiceError> {
    let order_id = req.order_id;
    let product_id = req.product_id;

    let mut conn = pool.get().await.map_err(ServiceError::pool)?;
    conn.transaction::<_, ServiceError, _>(|conn| {
        Box::pin(async move {
            store::product_for_update(conn, product_id)
                .await?
                .ok_or(ServiceError::NotFound("product"))?;

            if store::movement_exists(conn, order_id, MOVEMENT_INCREASED).await? {
                info!("compensation already applied for order {}", order_id);
                return Ok(());
            }

            store::adjust_current_stock(conn, product_id, 1).await?;
            store::insert_movement(
                conn,
                NewInventoryMovement::new(product_id, order_id, MOVEMENT_INCREASED, None),
            )
            .await?;

            Ok(())
        })
    })
    .await?;

    info!("compensated stock of product {} for order {}", product_id, order_id);
    Ok(())
}
