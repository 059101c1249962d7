use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod error;
pub mod reservation;
pub mod trace;
pub mod xa;

pub use error::{JsonBody, ServiceError};
pub use reservation::ReservationStatus;
pub use trace::TraceContext;

/// Caller-facing request that initiates a distributed transaction.
/// Every order is exactly one unit of one product at the given price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub amount: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
}

/// Payload delivered to every participant phase endpoint. The trace ids are
/// carried in-band because not every coordinator mode forwards HTTP headers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub amount: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
}

impl ActionRequest {
    pub fn new(order_id: Uuid, req: &CreateOrderRequest, trace: &TraceContext) -> Self {
        Self {
            order_id,
            user_id: req.user_id,
            product_id: req.product_id,
            amount: req.amount,
            trace_id: Some(trace.trace_id.clone()),
            span_id: Some(trace.span_id.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_request_uses_wire_field_names() {
        let req = ActionRequest {
            order_id: Uuid::nil(),
            user_id: Uuid::nil(),
            product_id: Uuid::nil(),
            amount: 42,
            trace_id: Some("ab".repeat(16)),
            span_id: Some("cd".repeat(8)),
        };

        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["amount"], 42);
        assert!(value.get("order_id").is_some());
        assert!(value.get("trace_id").is_some());
        assert!(value.get("span_id").is_some());
    }

    #[test]
    fn trace_fields_are_optional_on_the_wire() {
        let json = serde_json::json!({
            "order_id": Uuid::new_v4(),
            "user_id": Uuid::new_v4(),
            "product_id": Uuid::new_v4(),
            "amount": 1,
        });

        let req: ActionRequest = serde_json::from_value(json).unwrap();
        assert!(req.trace_id.is_none());
        assert!(req.span_id.is_none());
    }
}
