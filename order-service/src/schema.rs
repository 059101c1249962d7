diesel::table! {
    orders (order_id) {
        order_id -> Uuid,
        user_id -> Uuid,
        product_id -> Uuid,
        amount -> Int4,
        status -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
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
