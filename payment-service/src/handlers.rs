use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};
use shared::trace::{action_span, TraceContext};
use shared::xa::XaQuery;
use shared::{ActionRequest, JsonBody, ServiceError};
use tracing::Instrument;

use crate::api::AppState;
use crate::{saga, tcc, xa};

fn request_span(operation: &'static str, req: &ActionRequest) -> tracing::Span {
    let ctx = TraceContext::from_payload(req.trace_id.as_deref(), req.span_id.as_deref());
    action_span(operation, req.order_id, ctx.as_ref())
}

pub async fn debit(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ActionRequest>,
) -> Result<Json<Value>, ServiceError> {
    let span = request_span("payments.debit", &req);
    saga::debit(&state.pool, &req).instrument(span).await?;
    Ok(Json(json!({ "result": "success" })))
}

pub async fn compensate(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ActionRequest>,
) -> Result<Json<Value>, ServiceError> {
    let span = request_span("payments.compensate", &req);
    saga::compensate(&state.pool, &req).instrument(span).await?;
    Ok(Json(json!({ "result": "success" })))
}

pub async fn try_reserve(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ActionRequest>,
) -> Result<Json<Value>, ServiceError> {
    let span = request_span("payment.try", &req);
    tcc::try_reserve(&state.pool, &req).instrument(span).await?;
    Ok(Json(json!({ "status": "try_success" })))
}

pub async fn confirm(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ActionRequest>,
) -> Result<Json<Value>, ServiceError> {
    let span = request_span("payment.confirm", &req);
    tcc::confirm(&state.pool, &req).instrument(span).await?;
    Ok(Json(json!({ "status": "confirm_success" })))
}

pub async fn cancel(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ActionRequest>,
) -> Result<Json<Value>, ServiceError> {
    let span = request_span("payment.cancel", &req);
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
