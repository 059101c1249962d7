diesel::table! {
    wallets (user_id) {
        user_id -> Uuid,
        current_amount -> Int4,
        available_amount -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    user_payments (payment_id) {
        payment_id -> Uuid,
        user_id -> Uuid,
        order_id -> Uuid,
        amount -> Int4,
        payment_type -> Varchar,
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
    wallets,
    user_payments,
);
