//! Store adapter for the inventory participant. Every mutation is applied
//! while the caller holds the product row lock taken by
//! [`product_for_update`]; the idempotency lookup, the business rule, the
//! stock update and the ledger write all live inside one transaction.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use shared::reservation::{ReservationStatus, STATUS_PENDING};
use shared::ServiceError;
use uuid::Uuid;

use crate::models::{NewInventoryMovement, ProductInventory};
use crate::schema::{inventory_movements, products_inventory};

/// `SELECT ... FOR UPDATE` on the product row. Serialises every concurrent
/// phase touching this product until the surrounding transaction ends.
pub async fn product_for_update(
    conn: &mut AsyncPgConnection,
    product: Uuid,
) -> Result<Option<ProductInventory>, ServiceError> {
    let row = products_inventory::table
        .filter(products_inventory::product_id.eq(product))
        .for_update()
        .first::<ProductInventory>(conn)
        .await
        .optional()?;
    Ok(row)
}

pub async fn movement_exists(
    conn: &mut AsyncPgConnection,
    order: Uuid,
    movement_type: &str,
) -> Result<bool, ServiceError> {
    let found = inventory_movements::table
        .filter(inventory_movements::order_id.eq(order))
        .filter(inventory_movements::movement_type.eq(movement_type))
        .select(inventory_movements::movement_id)
        .first::<Uuid>(conn)
        .await
        .optional()?;
    Ok(found.is_some())
}

/// Latest ledger status for an order, used by the TCC decision tables.
pub async fn movement_status(
    conn: &mut AsyncPgConnection,
    order: Uuid,
) -> Result<Option<ReservationStatus>, ServiceError> {
    let status = inventory_movements::table
        .filter(inventory_movements::order_id.eq(order))
        .order(inventory_movements::created_at.desc())
        .select(inventory_movements::status)
        .first::<Option<String>>(conn)
        .await
        .optional()?;

    Ok(status.flatten().as_deref().and_then(ReservationStatus::parse))
}

pub async fn insert_movement(
    conn: &mut AsyncPgConnection,
    movement: NewInventoryMovement,
) -> Result<(), ServiceError> {
    diesel::insert_into(inventory_movements::table)
        .values(&movement)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn adjust_current_stock(
    conn: &mut AsyncPgConnection,
    product: Uuid,
    delta: i32,
) -> Result<(), ServiceError> {
    diesel::update(products_inventory::table.filter(products_inventory::product_id.eq(product)))
        .set((
            products_inventory::current_stock.eq(products_inventory::current_stock + delta),
            products_inventory::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn adjust_stock_available(
    conn: &mut AsyncPgConnection,
    product: Uuid,
    delta: i32,
) -> Result<(), ServiceError> {
    diesel::update(products_inventory::table.filter(products_inventory::product_id.eq(product)))
        .set((
            products_inventory::stock_available.eq(products_inventory::stock_available + delta),
            products_inventory::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

/// Flips the pending reservation row for this order to a terminal status.
pub async fn finalise_movement(
    conn: &mut AsyncPgConnection,
    order: Uuid,
    to: ReservationStatus,
) -> Result<usize, ServiceError> {
    let updated = diesel::update(
        inventory_movements::table
            .filter(inventory_movements::order_id.eq(order))
            .filter(inventory_movements::status.eq(STATUS_PENDING)),
    )
    .set(inventory_movements::status.eq(to.as_str()))
    .execute(conn)
    .await?;
    Ok(updated)
}
