//! Saga participant for the orders resource: create the pending row, complete
//! it as the saga's final step, or reject it when the chain compensates.

use diesel_async::{AsyncConnection, AsyncPgConnection};
use shared::{ActionRequest, ServiceError};
use tracing::info;

use crate::models::{self, NewOrder, OrderStatus};
use crate::store::{self, DbPool};

pub async fn create(pool: &DbPool, req: &ActionRequest) -> Result<(), ServiceError> {
    let mut conn = pool.get().await.map_err(ServiceError::pool)?;
    store::insert_order(
        &mut conn,
        NewOrder::pending(req.order_id, req.user_id, req.product_id, req.amount),
    )
    .await?;
    info!("created pending order {}", req.order_id);
    Ok(())
}

pub async fn complete(pool: &DbPool, req: &ActionRequest) -> Result<(), ServiceError> {
    let order_id = req.order_id;
    let mut conn = pool.get().await.map_err(ServiceError::pool)?;
    conn.transaction::<_, ServiceError, _>(|conn| {
        Box::pin(async move { apply_completion(conn, order_id).await })
    })
    .await?;
    info!("completed order {}", order_id);
    Ok(())
}

pub async fn compensate(pool: &DbPool, req: &ActionRequest) -> Result<(), ServiceError> {
    let order_id = req.order_id;
    let mut conn = pool.get().await.map_err(ServiceError::pool)?;
    conn.transaction::<_, ServiceError, _>(|conn| {
        Box::pin(async move { apply_failure(conn, order_id, OrderStatus::Rejected).await })
    })
    .await?;
    info!("compensated order {}", order_id);
    Ok(())
}

pub(crate) async fn apply_completion(
    conn: &mut AsyncPgConnection,
    order_id: uuid::Uuid,
) -> Result<(), ServiceError> {
    let current = store::order_for_update(conn, order_id)
        .await?
        .as_ref()
        .and_then(|o| OrderStatus::parse(&o.status));
    match models::decide_completion(current)? {
        Some(next) => store::set_status(conn, order_id, next).await,
        None => {
            info!("order {} already completed", order_id);
            Ok(())
        }
    }
}

pub(crate) async fn apply_failure(
    conn: &mut AsyncPgConnection,
    order_id: uuid::Uuid,
    target: OrderStatus,
) -> Result<(), ServiceError> {
    let current = store::order_for_update(conn, order_id)
        .await?
        .as_ref()
        .and_then(|o| OrderStatus::parse(&o.status));
    match models::decide_failure(current, target)? {
        Some(next) => store::set_status(conn, order_id, next).await,
        None => {
            info!("nothing to undo for order {}", order_id);
            Ok(())
        }
    }
}
