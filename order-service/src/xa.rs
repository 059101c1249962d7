//! XA participant endpoint for the orders resource. The order is written
//! directly as `completed` inside the prepared transaction; a global rollback
//! discards it entirely, so no order row survives a failed 2PC run.

use diesel::prelude::*;
use diesel::sql_query;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use shared::xa::{XaOp, XaQuery, BARRIER_ID_FIRST, BARRIER_OP_ACTION};
use shared::{ActionRequest, ServiceError};
use tracing::info;

use crate::models::{NewOrder, OrderStatus};
use crate::schema::{orders, xa_barrier};
use crate::store::DbPool;

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
            if req.amount <= 0 {
                return Err(ServiceError::InvalidInput(
                    "amount must be greater than 0".to_string(),
                ));
            }
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
            info!("prepared order {} (xid {})", req.order_id, query.xid());
            Ok(())
        }
        Ok(false) => {
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

    let order = NewOrder::with_status(
        req.order_id,
        req.user_id,
        req.product_id,
        req.amount,
        OrderStatus::Completed,
    );
    diesel::insert_into(orders::table)
        .values(&order)
        .execute(conn)
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
        Err(diesel::result::Error::DatabaseError(_, info))
            if info.message().contains("does not exist") =>
        {
            info!("xid {} already finalised", xid);
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
