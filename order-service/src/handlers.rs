use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};
use shared::trace::{action_span, TraceContext};
use shared::xa::XaQuery;
use shared::{ActionRequest, CreateOrderRequest, JsonBody, ServiceError};
use tracing::{error, info, Instrument};
use uuid::Uuid;

use crate::api::AppState;
use crate::dtm::Protocol;
use crate::models::OrderStatus;
use crate::{saga, store, tcc, xa};

/// Caller-facing entry point: synthesise the order id, snapshot the trace
/// context and drive the configured protocol. Saga/TCC reply 202 as soon as
/// registration succeeds; XA replies 200 only after the global outcome.
pub async fn create_order(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Value>), ServiceError> {
    if req.amount <= 0 {
        return Err(ServiceError::InvalidInput(
            "amount must be greater than 0".to_string(),
        ));
    }

    let order_id = Uuid::new_v4();
    let trace = TraceContext::from_payload(req.trace_id.as_deref(), req.span_id.as_deref())
        .unwrap_or_else(TraceContext::generate);
    let span = tracing::info_span!(
        "orders.create_order",
        %order_id,
        trace_id = %trace.trace_id,
        protocol = ?state.protocol,
    );

    let result = async {
        match state.protocol {
            Protocol::Saga => state.orchestrator.submit_saga(order_id, &req, &trace).await,
            Protocol::Tcc => state.orchestrator.submit_tcc(order_id, &req, &trace).await,
            Protocol::Xa => state.orchestrator.submit_xa(order_id, &req, &trace).await,
        }
    }
    .instrument(span)
    .await;

    match result {
        Ok(()) => {
            let (code, status) = match state.protocol {
                Protocol::Xa => (StatusCode::OK, "completed"),
                Protocol::Saga | Protocol::Tcc => (StatusCode::ACCEPTED, "processing"),
            };
            Ok((
                code,
                Json(json!({
                    "order_id": order_id,
                    "trace_id": trace.trace_id,
                    "status": status,
                })),
            ))
        }
        Err(err) => {
            error!("failed to register transaction for order {}: {}", order_id, err);
            // Keep the synthesised id resolvable: record the failed attempt
            // in the terminal status the protocol would have used.
            let stub_status = match state.protocol {
                Protocol::Saga => Some(OrderStatus::Rejected),
                Protocol::Tcc => Some(OrderStatus::Cancelled),
                Protocol::Xa => None,
            };
            if let Some(status) = stub_status {
                if let Err(stub_err) =
                    store::insert_failed_stub(&state.pool, order_id, &req, status).await
                {
                    error!("failed to record failed order {}: {}", order_id, stub_err);
                } else {
                    info!("recorded failed order {} as {}", order_id, status.as_str());
                }
            }
            Err(err)
        }
    }
}

/// Lookup used by callers polling an asynchronous order to its outcome.
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Value>), ServiceError> {
    let mut conn = state.pool.get().await.map_err(ServiceError::pool)?;
    match store::get_order(&mut conn, order_id).await? {
        Some(order) => Ok((StatusCode::OK, Json(serde_json::to_value(order).unwrap_or_default()))),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "order not found" })),
        )),
    }
}

fn request_span(operation: &'static str, req: &ActionRequest) -> tracing::Span {
    let ctx = TraceContext::from_payload(req.trace_id.as_deref(), req.span_id.as_deref());
    action_span(operation, req.order_id, ctx.as_ref())
}

pub async fn saga_create(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ActionRequest>,
) -> Result<Json<Value>, ServiceError> {
    let span = request_span("orders.create", &req);
    saga::create(&state.pool, &req).instrument(span).await?;
    Ok(Json(json!({ "result": "success" })))
}

pub async fn saga_complete(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ActionRequest>,
) -> Result<Json<Value>, ServiceError> {
    let span = request_span("orders.complete", &req);
    saga::complete(&state.pool, &req).instrument(span).await?;
    Ok(Json(json!({ "result": "success" })))
}

pub async fn saga_compensate(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ActionRequest>,
) -> Result<Json<Value>, ServiceError> {
    let span = request_span("orders.compensate", &req);
    saga::compensate(&state.pool, &req).instrument(span).await?;
    Ok(Json(json!({ "result": "success" })))
}

pub async fn tcc_try(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ActionRequest>,
) -> Result<Json<Value>, ServiceError> {
    let span = request_span("orders.try", &req);
    tcc::try_create(&state.pool, &req).instrument(span).await?;
    Ok(Json(json!({ "status": "try_success" })))
}

pub async fn tcc_confirm(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ActionRequest>,
) -> Result<Json<Value>, ServiceError> {
    let span = request_span("orders.confirm", &req);
    tcc::confirm(&state.pool, &req).instrument(span).await?;
    Ok(Json(json!({ "status": "confirm_success" })))
}

pub async fn tcc_cancel(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ActionRequest>,
) -> Result<Json<Value>, ServiceError> {
    let span = request_span("orders.cancel", &req);
    tcc::cancel(&state.pool, &req).instrument(span).await?;
    Ok(Json(json!({ "status": "cancel_success" })))
}

pub async fn xa(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ServiceError> {
    let query = XaQuery::from_params(&params)?;
    let req = if body.is_empty() {
        None
    } else {
        Some(
            serde_json::from_slice::<ActionRequest>(&body)
                .map_err(|e| ServiceError::InvalidInput(e.to_string()))?,
        )
    };

    let ctx = headers
        .get("traceparent")
        .and_then(|v| v.to_str().ok())
        .and_then(TraceContext::from_traceparent);
    let span = match &ctx {
        Some(tc) => tracing::info_span!(
            "xa_branch",
            gid = %query.gid,
            branch_id = %query.branch_id,
            trace_id = %tc.trace_id,
        ),
        None => tracing::info_span!("xa_branch", gid = %query.gid, branch_id = %query.branch_id),
    };

    xa::handle(&state.pool, &query, req).instrument(span).await?;
    Ok(Json(json!({ "status": "xa_success" })))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}
