use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

/// Ledger row types. The saga path writes a `decreased`/`increased` pair,
/// the TCC and XA paths a single `decrease` row per order.
pub const MOVEMENT_DECREASED: &str = "decreased";
pub const MOVEMENT_INCREASED: &str = "increased";
pub const MOVEMENT_DECREASE: &str = "decrease";

#[derive(Debug, Clone, Queryable, Serialize)]
pub struct ProductInventory {
    pub product_id: Uuid,
    pub current_stock: i32,
    pub stock_available: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Serialize)]
pub struct InventoryMovement {
    pub movement_id: Uuid,
    pub product_id: Uuid,
    pub order_id: Uuid,
    pub movement_type: String,
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::inventory_movements)]
pub struct NewInventoryMovement {
    pub movement_id: Uuid,
    pub product_id: Uuid,
    pub order_id: Uuid,
    pub movement_type: String,
    pub status: Option<String>,
}

impl NewInventoryMovement {
    pub fn new(product_id: Uuid, order_id: Uuid, movement_type: &str, status: Option<&str>) -> Self {
        Self {
            movement_id: Uuid::new_v4(),
            product_id,
            order_id,
            movement_type: movement_type.to_string(),
            status: status.map(str::to_string),
        }
    }
}
