use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Error taxonomy shared by every participant service.
///
/// The coordinator interprets the mapped status code: 400 is a permanent
/// business refusal (compensate / cancel / rollback), 409 is a phase applied
/// against an incompatible ledger state, 500 is transient and retried.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    InvalidInput(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("insufficient {0}")]
    Insufficient(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("coordinator request failed: {0}")]
    Coordinator(String),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(String),
}

impl ServiceError {
    pub fn pool<E: std::fmt::Display>(err: E) -> Self {
        ServiceError::Pool(err.to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidInput(_)
            | ServiceError::NotFound(_)
            | ServiceError::Insufficient(_) => StatusCode::BAD_REQUEST,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Coordinator(_)
            | ServiceError::Database(_)
            | ServiceError::Pool(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {}", self);
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

/// JSON body extractor whose rejection is a [`ServiceError::InvalidInput`],
/// so malformed or incomplete payloads surface as 400 like every other
/// invalid-input case.
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(ServiceError::InvalidInput(rejection.body_text())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_refusals_map_to_bad_request() {
        assert_eq!(
            ServiceError::Insufficient("stock").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::Insufficient("funds").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::NotFound("product").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidInput("amount must be greater than 0".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn conflicts_map_to_409() {
        let err = ServiceError::Conflict("cannot cancel completed reservation".into());
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn transient_failures_map_to_500() {
        assert_eq!(
            ServiceError::Coordinator("connection refused".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::Pool("timed out".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::Database(diesel::result::Error::BrokenTransactionManager).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn messages_name_the_refused_resource() {
        assert_eq!(
            ServiceError::Insufficient("stock").to_string(),
            "insufficient stock"
        );
        assert_eq!(ServiceError::NotFound("wallet").to_string(), "wallet not found");
    }
}
