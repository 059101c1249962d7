//! TCC participant for the orders resource. Try inserts the pending row,
//! Confirm and Cancel drive the same monotonic status machine the saga path
//! uses, with `cancelled` as the failure status.

use diesel_async::AsyncConnection;
use shared::{ActionRequest, ServiceError};
use tracing::info;

use crate::models::{NewOrder, OrderStatus};
use crate::saga::{apply_completion, apply_failure};
use crate::store::{self, DbPool};

pub async fn try_create(pool: &DbPool, req: &ActionRequest) -> Result<(), ServiceError> {
    let mut conn = pool.get().await.map_err(ServiceError::pool)?;
    store::insert_order(
        &mut conn,
        NewOrder::pending(req.order_id, req.user_id, req.product_id, req.amount),
    )
    .await?;
    info!("created pending order {}", req.order_id);
    Ok(())
}

pub async fn confirm(pool: &DbPool, req: &ActionRequest) -> Result<(), ServiceError> {
    let order_id = req.order_id;
    let mut conn = pool.get().await.map_err(ServiceError::pool)?;
    conn.transaction::<_, ServiceError, _>(|conn| {
        Box::pin(async move { apply_completion(conn, order_id).await })
    })
    .await?;
    info!("confirmed order {}", order_id);
    Ok(())
}

pub async fn cancel(pool: &DbPool, req: &ActionRequest) -> Result<(), ServiceError> {
    let order_id = req.order_id;
    let mut conn = pool.get().await.map_err(ServiceError::pool)?;
    conn.transaction::<_, ServiceError, _>(|conn| {
        Box::pin(async move { apply_failure(conn, order_id, OrderStatus::Cancelled).await })
    })
    .await?;
    info!("cancelled order {}", order_id);
    Ok(())
}
