//! XA participant endpoint. Phase 1 (`op=action`) runs the business write and
//! the barrier insert in one transaction ended by `PREPARE TRANSACTION`;
//! phase 2 (`op=commit` / `op=rollback`) applies the coordinator's decision.
//! The transaction is driven with raw statements because the prepared-commit
//! handshake replaces the usual COMMIT.

use diesel::prelude::*;
use diesel::sql_query;
use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection, RunQueryDsl};
use shared::xa::{XaOp, XaQuery, BARRIER_ID_FIRST, BARRIER_OP_ACTION};
use shared::{ActionRequest, ServiceError};
use tracing::info;

use crate::models::{NewInventoryMovement, MOVEMENT_DECREASE};
use crate::schema::{products_inventory, xa_barrier};
use crate::store;

type DbPool = Pool<AsyncPgConnection>;

pub async fn handle(
    pool: &DbPool,
    query: &XaQuery,
    body: Option<ActionRequest>,
) -> Result<(), ServiceError> {
    let mut conn = pool.get().await.map_err(ServiceError::pool)?;
    match query.op {
        XaOp::Commit => finalise(&mut conn, &query.xid(), true).await,
        XaOp::Rollback => finalise(&mut conn, &query.xid(), false).await,
        XaOp::Action => {
            let req = body
                .ok_or_else(|| ServiceError::InvalidInput("missing request body".to_string()))?;
            prepare(&mut conn, query, &req).await
        }
    }
}

async fn prepare(
    conn: &mut AsyncPgConnection,
    query: &XaQuery,
    req: &ActionRequest,
) -> Result<(), ServiceError> {
    sql_query("BEGIN").execute(conn).await?;

    match prepare_branch(conn, query, req).await {
        Ok(true) => {
            info!("prepared stock decrease for order {} (xid {})", req.order_id, query.xid());
            Ok(())
        }
        Ok(false) => {
            // Duplicate Prepare delivery; the first one holds the effect.
            let _ = sql_query("ROLLBACK").execute(conn).await;
            info!("duplicate prepare for xid {}", query.xid());
            Ok(())
        }
        Err(err) => {
            let _ = sql_query("ROLLBACK").execute(conn).await;
            Err(err)
        }
    }
}

/// Returns `Ok(false)` when the barrier shows this branch was already
/// prepared. On `Ok(true)` the transaction has been handed to
/// `PREPARE TRANSACTION` and awaits the coordinator's decision.
async fn prepare_branch(
    conn: &mut AsyncPgConnection,
    query: &XaQuery,
    req: &ActionRequest,
) -> Result<bool, ServiceError> {
    let inserted = diesel::insert_into(xa_barrier::table)
        .values((
            xa_barrier::gid.eq(&query.gid),
            xa_barrier::branch_id.eq(&query.branch_id),
            xa_barrier::op.eq(BARRIER_OP_ACTION),
            xa_barrier::barrier_id.eq(BARRIER_ID_FIRST),
        ))
        .on_conflict((
            xa_barrier::gid,
            xa_barrier::branch_id,
            xa_barrier::op,
            xa_barrier::barrier_id,
        ))
        .do_nothing()
        .execute(conn)
        .await?;
    if inserted == 0 {
        return Ok(false);
    }

    // Inline guard: the decrement and the stock check are one statement, so a
    // zero row count is the branch refusing and the coordinator rolls back.
    let updated = diesel::update(
        products_inventory::table
            .filter(products_inventory::product_id.eq(req.product_id))
            .filter(products_inventory::current_stock.ge(1)),
    )
    .set((
        products_inventory::current_stock.eq(products_inventory::current_stock - 1),
        products_inventory::updated_at.eq(chrono::Utc::now()),
    ))
    .execute(conn)
    .await?;
    if updated == 0 {
        return Err(ServiceError::Insufficient("stock"));
    }

    store::insert_movement(
        conn,
        NewInventoryMovement::new(req.product_id, req.order_id, MOVEMENT_DECREASE, None),
    )
    .await?;

    sql_query(format!("PREPARE TRANSACTION '{}'", query.xid()))
        .execute(conn)
        .await?;
    Ok(true)
}

async fn finalise(
    conn: &mut AsyncPgConnection,
    xid: &str,
    commit: bool,
) -> Result<(), ServiceError> {
    let stmt = if commit {
        format!("COMMIT PREPARED '{}'", xid)
    } else {
        format!("ROLLBACK PREPARED '{}'", xid)
    };

    match sql_query(stmt).execute(conn).await {
        Ok(_) => Ok(()),
        // Retried decision: the prepared transaction was already resolved.
        Err(diesel::result::Error::DatabaseError(_, info))
            if info.message().contains("does not exist") =>
        {
            info!("xid {} already finalised", xid);
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
