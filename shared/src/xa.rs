//! XA branch plumbing shared by every participant.
//!
//! The coordinator calls each XA endpoint with `gid`, `branch_id` and `op` in
//! the query string. `op=action` is the Prepare phase and carries a JSON body;
//! `op=commit` / `op=rollback` finalise a previously prepared transaction and
//! carry no body. The barrier row makes duplicate Prepare deliveries safe and
//! must be written inside the prepared transaction itself.

use std::collections::HashMap;

use crate::ServiceError;

pub const BARRIER_OP_ACTION: &str = "action";
pub const BARRIER_ID_FIRST: &str = "01";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XaOp {
    Action,
    Commit,
    Rollback,
}

impl XaOp {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "action" => Some(Self::Action),
            "commit" => Some(Self::Commit),
            "rollback" => Some(Self::Rollback),
            _ => None,
        }
    }
}

/// Coordinator-supplied identity of one XA branch invocation.
#[derive(Debug, Clone)]
pub struct XaQuery {
    pub gid: String,
    pub branch_id: String,
    pub op: XaOp,
}

impl XaQuery {
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ServiceError> {
        let gid = params
            .get("gid")
            .ok_or_else(|| ServiceError::InvalidInput("missing gid".to_string()))?;
        let branch_id = params
            .get("branch_id")
            .ok_or_else(|| ServiceError::InvalidInput("missing branch_id".to_string()))?;
        let op = params
            .get("op")
            .and_then(|op| XaOp::parse(op))
            .ok_or_else(|| ServiceError::InvalidInput("missing or unknown op".to_string()))?;

        if !valid_xid_component(gid) || !valid_xid_component(branch_id) {
            return Err(ServiceError::InvalidInput(
                "gid and branch_id must be alphanumeric".to_string(),
            ));
        }

        Ok(Self {
            gid: gid.clone(),
            branch_id: branch_id.clone(),
            op,
        })
    }

    /// Transaction identifier handed to `PREPARE TRANSACTION` and friends.
    pub fn xid(&self) -> String {
        format!("{}-{}", self.gid, self.branch_id)
    }
}

// The xid is spliced into PREPARE/COMMIT/ROLLBACK statements, which take no
// bind parameters, so the charset is restricted up front.
fn valid_xid_component(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 64
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_a_prepare_invocation() {
        let q = XaQuery::from_params(&params(&[
            ("gid", "gid-123"),
            ("branch_id", "01"),
            ("op", "action"),
        ]))
        .unwrap();
        assert_eq!(q.op, XaOp::Action);
        assert_eq!(q.xid(), "gid-123-01");
    }

    #[test]
    fn parses_commit_and_rollback() {
        for (op, expected) in [("commit", XaOp::Commit), ("rollback", XaOp::Rollback)] {
            let q = XaQuery::from_params(&params(&[
                ("gid", "g1"),
                ("branch_id", "02"),
                ("op", op),
            ]))
            .unwrap();
            assert_eq!(q.op, expected);
        }
    }

    #[test]
    fn missing_fields_are_invalid_input() {
        assert!(XaQuery::from_params(&params(&[("branch_id", "01"), ("op", "action")])).is_err());
        assert!(XaQuery::from_params(&params(&[("gid", "g"), ("op", "action")])).is_err());
        assert!(XaQuery::from_params(&params(&[("gid", "g"), ("branch_id", "01")])).is_err());
    }

    #[test]
    fn unknown_op_is_rejected() {
        let result = XaQuery::from_params(&params(&[
            ("gid", "g"),
            ("branch_id", "01"),
            ("op", "prepare"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn xid_components_with_sql_metacharacters_are_rejected() {
        for bad in ["g'; DROP TABLE orders; --", "g id", "", "g\""] {
            let result = XaQuery::from_params(&params(&[
                ("gid", bad),
                ("branch_id", "01"),
                ("op", "action"),
            ]));
            assert!(result.is_err(), "accepted {:?}", bad);
        }
    }
}
