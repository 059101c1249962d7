//! Store adapter for the orders participant.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection, RunQueryDsl};
use shared::{CreateOrderRequest, ServiceError};
use uuid::Uuid;

use crate::models::{NewOrder, Order, OrderStatus};
use crate::schema::orders;

pub type DbPool = Pool<AsyncPgConnection>;

/// `SELECT ... FOR UPDATE` on the order row.
pub async fn order_for_update(
    conn: &mut AsyncPgConnection,
    order: Uuid,
) -> Result<Option<Order>, ServiceError> {
    let row = orders::table
        .filter(orders::order_id.eq(order))
        .for_update()
        .first::<Order>(conn)
        .await
        .optional()?;
    Ok(row)
}

pub async fn get_order(
    conn: &mut AsyncPgConnection,
    order: Uuid,
) -> Result<Option<Order>, ServiceError> {
    let row = orders::table
        .filter(orders::order_id.eq(order))
        .first::<Order>(conn)
        .await
        .optional()?;
    Ok(row)
}

/// Idempotent insert; the primary key is the fence against duplicate
/// delivery of the create phase.
pub async fn insert_order(
    conn: &mut AsyncPgConnection,
    order: NewOrder,
) -> Result<(), ServiceError> {
    diesel::insert_into(orders::table)
        .values(&order)
        .on_conflict(orders::order_id)
        .do_nothing()
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_status(
    conn: &mut AsyncPgConnection,
    order: Uuid,
    to: OrderStatus,
) -> Result<(), ServiceError> {
    diesel::update(orders::table.filter(orders::order_id.eq(order)))
        .set((
            orders::status.eq(to.as_str()),
            orders::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

/// Writes the terminal stub for an order whose coordinator registration
/// failed, so the id handed back to the caller stays resolvable.
pub async fn insert_failed_stub(
    pool: &DbPool,
    order_id: Uuid,
    req: &CreateOrderRequest,
    status: OrderStatus,
) -> Result<(), ServiceError> {
    let mut conn = pool.get().await.map_err(ServiceError::pool)?;
    insert_order(
        &mut conn,
        NewOrder::with_status(order_id, req.user_id, req.product_id, req.amount, status),
    )
    .await
}
