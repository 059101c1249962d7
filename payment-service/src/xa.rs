//! XA participant endpoint for the wallet debit. Same shape as the inventory
//! branch: barrier insert plus guarded debit inside one transaction ended by
//! `PREPARE TRANSACTION`, then commit/rollback of the prepared set on the
//! coordinator's decision.

use diesel::prelude::*;
use diesel::sql_query;
use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection, RunQueryDsl};
use shared::xa::{XaOp, XaQuery, BARRIER_ID_FIRST, BARRIER_OP_ACTION};
use shared::{ActionRequest, ServiceError};
use tracing::info;

use crate::models::{NewUserPayment, PAYMENT_DEBIT};
use crate::schema::{wallets, xa_barrier};
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
            info!("prepared debit of {} for order {} (xid {})", req.amount, req.order_id, query.xid());
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

    let updated = diesel::update(
        wallets::table
            .filter(wallets::user_id.eq(req.user_id))
            .filter(wallets::current_amount.ge(req.amount)),
    )
    .set((
        wallets::current_amount.eq(wallets::current_amount - req.amount),
        wallets::updated_at.eq(chrono::Utc::now()),
    ))
    .execute(conn)
    .await?;
    if updated == 0 {
        return Err(ServiceError::Insufficient("funds"));
    }

    store::insert_payment(
        conn,
        NewUserPayment::new(req.user_id, req.order_id, req.amount, PAYMENT_DEBIT, None),
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
        Err(diesel::result::Error::DatabaseError(_, info))
            if info.message().contains("does not exist") =>
        {
            info!("xid {} already finalised", xid);
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
