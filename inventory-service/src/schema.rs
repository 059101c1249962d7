diesel::table! {
    products_inventory (product_id) {
        product_id -> Uuid,
        current_stock -> Int4,
        stock_available -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    inventory_movements (movement_id) {
        movement_id -> Uuid,
        product_id -> Uuid,
        order_id -> Uuid,
        movement_type -> Varchar,
        status -> Nullable<Varchar>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    xa_barrier (id) {
        id -> Int8,
        gid -> Varchar,
        branch_id -> Varchar,
        op -> Varchar,
        barrier_id -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    products_inventory,
    inventory_movements,
);
