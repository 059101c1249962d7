//! Manual trace-context carry. Some coordinator modes invoke participants
//! without forwarding W3C headers, so the ids travel inside the JSON payload
//! as hex strings and are rebuilt on the receiving side.

use uuid::Uuid;

const TRACE_ID_LEN: usize = 32;
const SPAN_ID_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
}

impl TraceContext {
    /// Starts a fresh trace for a request that arrived without one.
    pub fn generate() -> Self {
        let trace_id = Uuid::new_v4().simple().to_string();
        let span_id = Uuid::new_v4().simple().to_string()[..SPAN_ID_LEN].to_string();
        Self { trace_id, span_id }
    }

    /// Rebuilds the remote context from payload fields, rejecting ids that are
    /// not well-formed hex. Malformed ids are dropped rather than surfaced as
    /// request errors.
    pub fn from_payload(trace_id: Option<&str>, span_id: Option<&str>) -> Option<Self> {
        let trace_id = trace_id?;
        let span_id = span_id?;
        if !is_hex(trace_id, TRACE_ID_LEN) || !is_hex(span_id, SPAN_ID_LEN) {
            return None;
        }
        Some(Self {
            trace_id: trace_id.to_ascii_lowercase(),
            span_id: span_id.to_ascii_lowercase(),
        })
    }

    /// Renders the W3C `traceparent` header value carried on XA branch calls.
    pub fn traceparent(&self) -> String {
        format!("00-{}-{}-01", self.trace_id, self.span_id)
    }

    /// Parses a W3C `traceparent` header: `00-{trace-id}-{parent-span-id}-{flags}`.
    pub fn from_traceparent(header: &str) -> Option<Self> {
        let parts: Vec<&str> = header.split('-').collect();
        if parts.len() != 4 {
            return None;
        }
        Self::from_payload(Some(parts[1]), Some(parts[2]))
    }
}

fn is_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Span for a participant phase, linked to the caller's trace when the payload
/// carries one.
pub fn action_span(operation: &'static str, order_id: Uuid, ctx: Option<&TraceContext>) -> tracing::Span {
    match ctx {
        Some(tc) => tracing::info_span!(
            "participant_action",
            operation,
            %order_id,
            trace_id = %tc.trace_id,
            parent_span_id = %tc.span_id,
        ),
        None => tracing::info_span!("participant_action", operation, %order_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_context_is_well_formed() {
        let ctx = TraceContext::generate();
        assert_eq!(ctx.trace_id.len(), 32);
        assert_eq!(ctx.span_id.len(), 16);
        assert!(ctx.trace_id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(ctx.span_id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn traceparent_round_trips() {
        let ctx = TraceContext::generate();
        let parsed = TraceContext::from_traceparent(&ctx.traceparent()).unwrap();
        assert_eq!(parsed, ctx);
    }

    #[test]
    fn payload_ids_survive_the_round_trip() {
        let ctx = TraceContext::generate();
        let rebuilt =
            TraceContext::from_payload(Some(ctx.trace_id.as_str()), Some(ctx.span_id.as_str()))
                .unwrap();
        assert_eq!(rebuilt, ctx);
    }

    #[test]
    fn malformed_ids_are_dropped() {
        let long = "a".repeat(32);
        assert!(TraceContext::from_payload(Some("not-hex"), Some("1234567890abcdef")).is_none());
        assert!(TraceContext::from_payload(Some(long.as_str()), Some("short")).is_none());
        assert!(TraceContext::from_payload(None, Some("1234567890abcdef")).is_none());
        assert!(TraceContext::from_traceparent("00-garbage").is_none());
        assert!(TraceContext::from_traceparent("00-xyz-abc-01").is_none());
    }

    #[test]
    fn ids_are_normalised_to_lowercase() {
        let trace = "AB".repeat(16);
        let span = "CD".repeat(8);
        let ctx = TraceContext::from_payload(Some(trace.as_str()), Some(span.as_str())).unwrap();
        assert_eq!(ctx.trace_id, "ab".repeat(16));
        assert_eq!(ctx.span_id, "cd".repeat(8));
    }
}
