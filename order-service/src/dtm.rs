//! Coordinator adapter. Talks to the DTM server over HTTP: obtains a GID,
//! registers branches and hands the global transaction over. Delivery and
//! retry of the individual phases is the coordinator's job; this side never
//! retries registration, so a failed registration becomes a failed order.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use shared::{ActionRequest, CreateOrderRequest, ServiceError, TraceContext};
use tracing::info;
use uuid::Uuid;

pub const TRANS_TYPE_SAGA: &str = "saga";
pub const TRANS_TYPE_TCC: &str = "tcc";
pub const TRANS_TYPE_XA: &str = "xa";

/// Which coordination protocol `POST /api/orders` drives. One protocol per
/// deployment; the participant endpoints are always mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Protocol {
    Saga,
    Tcc,
    Xa,
}

#[derive(Debug, Clone)]
pub struct ServiceUrls {
    pub orders: String,
    pub inventory: String,
    pub payment: String,
}

fn coordinator_err(err: reqwest::Error) -> ServiceError {
    ServiceError::Coordinator(err.to_string())
}

/// Thin client for the DTM server's transaction API.
#[derive(Clone)]
pub struct DtmClient {
    http: reqwest::Client,
    server: String,
}

impl DtmClient {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            server: server.into(),
        }
    }

    pub async fn new_gid(&self) -> Result<String, ServiceError> {
        #[derive(Deserialize)]
        struct GidReply {
            gid: String,
        }

        let resp = self
            .http
            .get(format!("{}/newGid", self.server))
            .send()
            .await
            .map_err(coordinator_err)?;
        if !resp.status().is_success() {
            return Err(ServiceError::Coordinator(format!(
                "newGid returned {}",
                resp.status()
            )));
        }

        let reply: GidReply = resp.json().await.map_err(coordinator_err)?;
        if reply.gid.is_empty() {
            return Err(ServiceError::Coordinator("empty gid".to_string()));
        }
        Ok(reply.gid)
    }

    async fn trans_call(&self, path: &str, body: serde_json::Value) -> Result<(), ServiceError> {
        let resp = self
            .http
            .post(format!("{}/{}", self.server, path))
            .json(&body)
            .send()
            .await
            .map_err(coordinator_err)?;
        if !resp.status().is_success() {
            return Err(ServiceError::Coordinator(format!(
                "{} returned {}",
                path,
                resp.status()
            )));
        }
        Ok(())
    }

    pub async fn prepare(&self, gid: &str, trans_type: &str) -> Result<(), ServiceError> {
        self.trans_call("prepare", json!({ "gid": gid, "trans_type": trans_type }))
            .await
    }

    pub async fn submit(&self, gid: &str, trans_type: &str) -> Result<(), ServiceError> {
        self.trans_call("submit", json!({ "gid": gid, "trans_type": trans_type }))
            .await
    }

    pub async fn abort(&self, gid: &str, trans_type: &str) -> Result<(), ServiceError> {
        self.trans_call("abort", json!({ "gid": gid, "trans_type": trans_type }))
            .await
    }

    pub async fn submit_saga(&self, saga: &Saga) -> Result<(), ServiceError> {
        self.trans_call(
            "submit",
            json!({
                "gid": saga.gid,
                "trans_type": TRANS_TYPE_SAGA,
                "steps": saga.steps,
                "payloads": saga.payloads,
            }),
        )
        .await
    }

    pub async fn register_tcc_branch(
        &self,
        gid: &str,
        branch_id: &str,
        branch: &TccBranch,
        payload: &ActionRequest,
    ) -> Result<(), ServiceError> {
        let data = serde_json::to_string(payload)
            .map_err(|e| ServiceError::Coordinator(e.to_string()))?;
        self.trans_call(
            "registerBranch",
            json!({
                "gid": gid,
                "trans_type": TRANS_TYPE_TCC,
                "branch_id": branch_id,
                "data": data,
                "try": branch.try_url,
                "confirm": branch.confirm_url,
                "cancel": branch.cancel_url,
            }),
        )
        .await
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SagaStep {
    pub action: String,
    pub compensate: String,
}

/// Linear saga definition: one forward/compensate URL pair plus one payload
/// per step, submitted to the coordinator in a single call.
#[derive(Debug, Clone)]
pub struct Saga {
    pub gid: String,
    pub steps: Vec<SagaStep>,
    pub payloads: Vec<String>,
}

impl Saga {
    pub fn new(gid: &str) -> Self {
        Self {
            gid: gid.to_string(),
            steps: Vec::new(),
            payloads: Vec::new(),
        }
    }

    pub fn add(
        &mut self,
        action: String,
        compensate: String,
        payload: &ActionRequest,
    ) -> Result<(), ServiceError> {
        let body = serde_json::to_string(payload)
            .map_err(|e| ServiceError::Coordinator(e.to_string()))?;
        self.steps.push(SagaStep { action, compensate });
        self.payloads.push(body);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TccBranch {
    pub try_url: String,
    pub confirm_url: String,
    pub cancel_url: String,
}

/// Builds and registers one global transaction per incoming order.
#[derive(Clone)]
pub struct Orchestrator {
    pub dtm: DtmClient,
    pub urls: ServiceUrls,
    http: reqwest::Client,
}

impl Orchestrator {
    pub fn new(dtm: DtmClient, urls: ServiceUrls) -> Self {
        Self {
            dtm,
            urls,
            http: reqwest::Client::new(),
        }
    }

    fn payload(
        &self,
        order_id: Uuid,
        req: &CreateOrderRequest,
        trace: &TraceContext,
    ) -> ActionRequest {
        ActionRequest::new(order_id, req, trace)
    }

    /// Saga: register the forward chain with compensations and submit.
    /// Execution is asynchronous; the caller gets the order id immediately.
    pub async fn submit_saga(
        &self,
        order_id: Uuid,
        req: &CreateOrderRequest,
        trace: &TraceContext,
    ) -> Result<(), ServiceError> {
        let gid = self.dtm.new_gid().await?;
        info!("starting saga {} for order {}", gid, order_id);

        let payload = self.payload(order_id, req, trace);
        let mut saga = Saga::new(&gid);
        saga.add(
            format!("{}/api/orders/create", self.urls.orders),
            format!("{}/api/orders/compensate", self.urls.orders),
            &payload,
        )?;
        saga.add(
            format!("{}/api/inventory/decrease", self.urls.inventory),
            format!("{}/api/inventory/compensate", self.urls.inventory),
            &payload,
        )?;
        saga.add(
            format!("{}/api/payments/debit", self.urls.payment),
            format!("{}/api/payments/compensate", self.urls.payment),
            &payload,
        )?;
        saga.add(
            format!("{}/api/orders/complete", self.urls.orders),
            String::new(),
            &payload,
        )?;

        self.dtm.submit_saga(&saga).await?;
        info!("saga {} submitted for order {}", gid, order_id);
        Ok(())
    }

    /// TCC: register the three branches inside a global transaction. The
    /// coordinator runs Try/Confirm/Cancel asynchronously after submit.
    pub async fn submit_tcc(
        &self,
        order_id: Uuid,
        req: &CreateOrderRequest,
        trace: &TraceContext,
    ) -> Result<(), ServiceError> {
        let gid = self.dtm.new_gid().await?;
        info!("registering tcc branches for gid {} order {}", gid, order_id);

        self.dtm.prepare(&gid, TRANS_TYPE_TCC).await?;

        let payload = self.payload(order_id, req, trace);
        let branches = [
            TccBranch {
                try_url: format!("{}/api/orders/try", self.urls.orders),
                confirm_url: format!("{}/api/orders/confirm", self.urls.orders),
                cancel_url: format!("{}/api/orders/cancel", self.urls.orders),
            },
            TccBranch {
                try_url: format!("{}/api/inventory/try", self.urls.inventory),
                confirm_url: format!("{}/api/inventory/confirm", self.urls.inventory),
                cancel_url: format!("{}/api/inventory/cancel", self.urls.inventory),
            },
            TccBranch {
                try_url: format!("{}/api/payment/try", self.urls.payment),
                confirm_url: format!("{}/api/payment/confirm", self.urls.payment),
                cancel_url: format!("{}/api/payment/cancel", self.urls.payment),
            },
        ];

        for (index, branch) in branches.iter().enumerate() {
            let branch_id = format!("{:02}", index + 1);
            if let Err(err) = self
                .dtm
                .register_tcc_branch(&gid, &branch_id, branch, &payload)
                .await
            {
                let _ = self.dtm.abort(&gid, TRANS_TYPE_TCC).await;
                return Err(err);
            }
        }

        self.dtm.submit(&gid, TRANS_TYPE_TCC).await?;
        info!("tcc transaction {} submitted for order {}", gid, order_id);
        Ok(())
    }

    /// XA: drive Prepare on every branch synchronously, then submit (global
    /// commit) or abort (global rollback). Returns only once the outcome is
    /// known.
    pub async fn submit_xa(
        &self,
        order_id: Uuid,
        req: &CreateOrderRequest,
        trace: &TraceContext,
    ) -> Result<(), ServiceError> {
        let gid = self.dtm.new_gid().await?;
        info!("starting xa transaction {} for order {}", gid, order_id);

        self.dtm.prepare(&gid, TRANS_TYPE_XA).await?;

        let payload = self.payload(order_id, req, trace);
        let branch_urls = [
            format!("{}/api/orders/xa", self.urls.orders),
            format!("{}/api/inventory/xa", self.urls.inventory),
            format!("{}/api/payment/xa", self.urls.payment),
        ];

        for (index, url) in branch_urls.iter().enumerate() {
            let branch_id = format!("{:02}", index + 1);
            if let Err(err) = self
                .call_xa_branch(url, &gid, &branch_id, &payload, trace)
                .await
            {
                let _ = self.dtm.abort(&gid, TRANS_TYPE_XA).await;
                return Err(err);
            }
        }

        self.dtm.submit(&gid, TRANS_TYPE_XA).await?;
        info!("xa transaction {} committed for order {}", gid, order_id);
        Ok(())
    }

    async fn call_xa_branch(
        &self,
        url: &str,
        gid: &str,
        branch_id: &str,
        payload: &ActionRequest,
        trace: &TraceContext,
    ) -> Result<(), ServiceError> {
        let resp = self
            .http
            .post(url)
            .query(&[("gid", gid), ("branch_id", branch_id), ("op", "action")])
            .header("traceparent", trace.traceparent())
            .json(payload)
            .send()
            .await
            .map_err(coordinator_err)?;

        match resp.status() {
            status if status.is_success() => Ok(()),
            StatusCode::BAD_REQUEST | StatusCode::CONFLICT => Err(ServiceError::Coordinator(
                format!("branch {} refused: {}", branch_id, resp.status()),
            )),
            status => Err(ServiceError::Coordinator(format!(
                "branch {} failed: {}",
                branch_id, status
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::HeaderMap;
    use axum::routing::{get, post, MethodRouter};
    use axum::{Json, Router};
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<(String, Value)>>>,
    }

    impl Recorder {
        fn record(&self, name: &str, body: Value) {
            self.calls.lock().unwrap().push((name.to_string(), body));
        }

        fn names(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
        }

        fn body_of(&self, name: &str) -> Option<Value> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
        }

        fn bodies_of(&self, name: &str) -> Vec<Value> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
                .collect()
        }
    }

    fn dtm_route(rec: Recorder, name: &'static str, fail: bool) -> MethodRouter {
        post(move |Json(v): Json<Value>| {
            let rec = rec.clone();
            async move {
                rec.record(name, v);
                if fail {
                    (
                        axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                        Json(serde_json::json!({ "dtm_result": "FAILURE" })),
                    )
                } else {
                    (
                        axum::http::StatusCode::OK,
                        Json(serde_json::json!({ "dtm_result": "SUCCESS" })),
                    )
                }
            }
        })
    }

    fn xa_route(rec: Recorder, name: &'static str, refuse: bool) -> MethodRouter {
        post(
            move |Query(params): Query<HashMap<String, String>>,
                  headers: HeaderMap,
                  Json(v): Json<Value>| {
                let rec = rec.clone();
                async move {
                    let traceparent = headers
                        .get("traceparent")
                        .and_then(|h| h.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    rec.record(
                        name,
                        serde_json::json!({
                            "params": params,
                            "traceparent": traceparent,
                            "body": v,
                        }),
                    );
                    if refuse {
                        (
                            axum::http::StatusCode::BAD_REQUEST,
                            Json(serde_json::json!({ "error": "insufficient stock" })),
                        )
                    } else {
                        (
                            axum::http::StatusCode::OK,
                            Json(serde_json::json!({ "status": "xa_success" })),
                        )
                    }
                }
            },
        )
    }

    fn stub_router(rec: &Recorder, register_fails: bool, inventory_refuses: bool) -> Router {
        Router::new()
            .route(
                "/newGid",
                get(|| async { Json(serde_json::json!({ "gid": "gid-test-1" })) }),
            )
            .route("/prepare", dtm_route(rec.clone(), "prepare", false))
            .route("/submit", dtm_route(rec.clone(), "submit", false))
            .route("/abort", dtm_route(rec.clone(), "abort", false))
            .route(
                "/registerBranch",
                dtm_route(rec.clone(), "registerBranch", register_fails),
            )
            .route("/api/orders/xa", xa_route(rec.clone(), "orders_xa", false))
            .route(
                "/api/inventory/xa",
                xa_route(rec.clone(), "inventory_xa", inventory_refuses),
            )
            .route("/api/payment/xa", xa_route(rec.clone(), "payment_xa", false))
    }

    async fn spawn_stub(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn orchestrator_for(base: &str) -> Orchestrator {
        Orchestrator::new(
            DtmClient::new(base),
            ServiceUrls {
                orders: base.to_string(),
                inventory: base.to_string(),
                payment: base.to_string(),
            },
        )
    }

    fn order_request() -> CreateOrderRequest {
        CreateOrderRequest {
            user_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            amount: 100,
            trace_id: None,
            span_id: None,
        }
    }

    #[tokio::test]
    async fn new_gid_comes_from_the_coordinator() {
        let rec = Recorder::default();
        let base = spawn_stub(stub_router(&rec, false, false)).await;

        let gid = DtmClient::new(&base).new_gid().await.unwrap();
        assert_eq!(gid, "gid-test-1");
    }

    #[tokio::test]
    async fn unreachable_coordinator_is_a_transient_error() {
        let client = DtmClient::new("http://127.0.0.1:1");
        let err = client.new_gid().await.unwrap_err();
        assert_eq!(
            err.status_code(),
            axum::http::StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn saga_registers_four_steps_in_branch_order() {
        let rec = Recorder::default();
        let base = spawn_stub(stub_router(&rec, false, false)).await;
        let orch = orchestrator_for(&base);

        let req = order_request();
        let order_id = Uuid::new_v4();
        let trace = TraceContext::generate();
        orch.submit_saga(order_id, &req, &trace).await.unwrap();

        let submit = rec.body_of("submit").unwrap();
        assert_eq!(submit["gid"], "gid-test-1");
        assert_eq!(submit["trans_type"], "saga");

        let steps = submit["steps"].as_array().unwrap();
        assert_eq!(steps.len(), 4);
        assert!(steps[0]["action"].as_str().unwrap().ends_with("/api/orders/create"));
        assert!(steps[0]["compensate"]
            .as_str()
            .unwrap()
            .ends_with("/api/orders/compensate"));
        assert!(steps[1]["action"]
            .as_str()
            .unwrap()
            .ends_with("/api/inventory/decrease"));
        assert!(steps[2]["action"].as_str().unwrap().ends_with("/api/payments/debit"));
        assert!(steps[3]["action"].as_str().unwrap().ends_with("/api/orders/complete"));
        assert_eq!(steps[3]["compensate"], "");

        let payloads = submit["payloads"].as_array().unwrap();
        assert_eq!(payloads.len(), 4);
        let first: ActionRequest =
            serde_json::from_str(payloads[0].as_str().unwrap()).unwrap();
        assert_eq!(first.order_id, order_id);
        assert_eq!(first.amount, 100);
        assert_eq!(first.trace_id.as_deref(), Some(trace.trace_id.as_str()));
        assert_eq!(first.span_id.as_deref(), Some(trace.span_id.as_str()));
    }

    #[tokio::test]
    async fn tcc_registers_three_branches_then_submits() {
        let rec = Recorder::default();
        let base = spawn_stub(stub_router(&rec, false, false)).await;
        let orch = orchestrator_for(&base);

        let order_id = Uuid::new_v4();
        orch.submit_tcc(order_id, &order_request(), &TraceContext::generate())
            .await
            .unwrap();

        assert_eq!(
            rec.names(),
            vec!["prepare", "registerBranch", "registerBranch", "registerBranch", "submit"]
        );

        let branches = rec.bodies_of("registerBranch");
        assert_eq!(branches[0]["branch_id"], "01");
        assert_eq!(branches[1]["branch_id"], "02");
        assert_eq!(branches[2]["branch_id"], "03");
        assert!(branches[0]["try"].as_str().unwrap().ends_with("/api/orders/try"));
        assert!(branches[1]["confirm"]
            .as_str()
            .unwrap()
            .ends_with("/api/inventory/confirm"));
        assert!(branches[2]["cancel"]
            .as_str()
            .unwrap()
            .ends_with("/api/payment/cancel"));

        let data: ActionRequest =
            serde_json::from_str(branches[0]["data"].as_str().unwrap()).unwrap();
        assert_eq!(data.order_id, order_id);
    }

    #[tokio::test]
    async fn tcc_aborts_when_branch_registration_fails() {
        let rec = Recorder::default();
        let base = spawn_stub(stub_router(&rec, true, false)).await;
        let orch = orchestrator_for(&base);

        let result = orch
            .submit_tcc(Uuid::new_v4(), &order_request(), &TraceContext::generate())
            .await;
        assert!(result.is_err());

        let names = rec.names();
        assert!(names.contains(&"abort".to_string()));
        assert!(!names.contains(&"submit".to_string()));
        // Registration is not retried; the first failure ends the attempt.
        assert_eq!(names.iter().filter(|n| *n == "registerBranch").count(), 1);
    }

    #[tokio::test]
    async fn xa_prepares_every_branch_then_commits() {
        let rec = Recorder::default();
        let base = spawn_stub(stub_router(&rec, false, false)).await;
        let orch = orchestrator_for(&base);

        let trace = TraceContext::generate();
        orch.submit_xa(Uuid::new_v4(), &order_request(), &trace)
            .await
            .unwrap();

        assert_eq!(
            rec.names(),
            vec!["prepare", "orders_xa", "inventory_xa", "payment_xa", "submit"]
        );

        let orders_call = rec.body_of("orders_xa").unwrap();
        assert_eq!(orders_call["params"]["gid"], "gid-test-1");
        assert_eq!(orders_call["params"]["branch_id"], "01");
        assert_eq!(orders_call["params"]["op"], "action");
        assert_eq!(
            orders_call["traceparent"].as_str().unwrap(),
            trace.traceparent()
        );

        let inventory_call = rec.body_of("inventory_xa").unwrap();
        assert_eq!(inventory_call["params"]["branch_id"], "02");
    }

    #[tokio::test]
    async fn xa_aborts_when_a_branch_refuses() {
        let rec = Recorder::default();
        let base = spawn_stub(stub_router(&rec, false, true)).await;
        let orch = orchestrator_for(&base);

        let result = orch
            .submit_xa(Uuid::new_v4(), &order_request(), &TraceContext::generate())
            .await;
        assert!(result.is_err());

        let names = rec.names();
        // The refusing branch stops the sequence: payments is never prepared
        // and the coordinator is told to roll back.
        assert!(!names.contains(&"payment_xa".to_string()));
        assert!(names.contains(&"abort".to_string()));
        assert!(!names.contains(&"submit".to_string()));
    }
}
