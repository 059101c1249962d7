use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

/// Ledger row types. The saga path writes a `debit`/`credit` pair, the TCC
/// and XA paths a single `debit` row per order.
pub const PAYMENT_DEBIT: &str = "debit";
pub const PAYMENT_CREDIT: &str = "credit";

#[derive(Debug, Clone, Queryable, Serialize)]
pub struct Wallet {
    pub user_id: Uuid,
    pub current_amount: i32,
    pub available_amount: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Serialize)]
pub struct UserPayment {
    pub payment_id: Uuid,
    pub user_id: Uuid,
    pub order_id: Uuid,
    pub amount: i32,
    pub payment_type: String,
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::user_payments)]
pub struct NewUserPayment {
    pub payment_id: Uuid,
    pub user_id: Uuid,
    pub order_id: Uuid,
    pub amount: i32,
    pub payment_type: String,
    pub status: Option<String>,
}

impl NewUserPayment {
    pub fn new(
        user_id: Uuid,
        order_id: Uuid,
        amount: i32,
        payment_type: &str,
        status: Option<&str>,
    ) -> Self {
        Self {
            payment_id: Uuid::new_v4(),
            user_id,
            order_id,
            amount,
            payment_type: payment_type.to_string(),
            status: status.map(str::to_string),
        }
    }
}
