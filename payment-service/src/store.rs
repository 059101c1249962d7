//! Store adapter for the payments participant. All mutations run while the
//! caller holds the wallet row lock taken by [`wallet_for_update`], keeping
//! the idempotency lookup, the funds check, the balance update and the ledger
//! write inside one transaction.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use shared::reservation::{ReservationStatus, STATUS_PENDING};
use shared::ServiceError;
use uuid::Uuid;

use crate::models::{NewUserPayment, Wallet};
use crate::schema::{user_payments, wallets};

/// `SELECT ... FOR UPDATE` on the wallet row.
pub async fn wallet_for_update(
    conn: &mut AsyncPgConnection,
    user: Uuid,
) -> Result<Option<Wallet>, ServiceError> {
    let row = wallets::table
        .filter(wallets::user_id.eq(user))
        .for_update()
        .first::<Wallet>(conn)
        .await
        .optional()?;
    Ok(row)
}

pub async fn payment_exists(
    conn: &mut AsyncPgConnection,
    order: Uuid,
    payment_type: &str,
) -> Result<bool, ServiceError> {
    let found = user_payments::table
        .filter(user_payments::order_id.eq(order))
        .filter(user_payments::payment_type.eq(payment_type))
        .select(user_payments::payment_id)
        .first::<Uuid>(conn)
        .await
        .optional()?;
    Ok(found.is_some())
}

/// Latest ledger status for an order, used by the TCC decision tables.
pub async fn payment_status(
    conn: &mut AsyncPgConnection,
    order: Uuid,
) -> Result<Option<ReservationStatus>, ServiceError> {
    let status = user_payments::table
        .filter(user_payments::order_id.eq(order))
        .order(user_payments::created_at.desc())
        .select(user_payments::status)
        .first::<Option<String>>(conn)
        .await
        .optional()?;

    Ok(status.flatten().as_deref().and_then(ReservationStatus::parse))
}

pub async fn insert_payment(
    conn: &mut AsyncPgConnection,
    payment: NewUserPayment,
) -> Result<(), ServiceError> {
    diesel::insert_into(user_payments::table)
        .values(&payment)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn adjust_current_amount(
    conn: &mut AsyncPgConnection,
    user: Uuid,
    delta: i32,
) -> Result<(), ServiceError> {
    diesel::update(wallets::table.filter(wallets::user_id.eq(user)))
        .set((
            wallets::current_amount.eq(wallets::current_amount + delta),
            wallets::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn adjust_available_amount(
    conn: &mut AsyncPgConnection,
    user: Uuid,
    delta: i32,
) -> Result<(), ServiceError> {
    diesel::update(wallets::table.filter(wallets::user_id.eq(user)))
        .set((
            wallets::available_amount.eq(wallets::available_amount + delta),
            wallets::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

/// Flips the pending payment row for this order to a terminal status.
pub async fn finalise_payment(
    conn: &mut AsyncPgConnection,
    order: Uuid,
    to: ReservationStatus,
) -> Result<usize, ServiceError> {
    let updated = diesel::update(
        user_payments::table
            .filter(user_payments::order_id.eq(order))
            .filter(user_payments::status.eq(STATUS_PENDING)),
    )
    .set(user_payments::status.eq(to.as_str()))
    .execute(conn)
    .await?;
    Ok(updated)
}
