use crate::error::ValidationError;
use serde::Serialize;

/// Node id reserved for the campaign master.
pub const MASTER_ID: &str = "0";
const MASTER_NAME: &str = "master";
const SECONDARY_PREFIX: &str = "fuzzer";

/// The part a node plays in a campaign, derived from its node id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "role", content = "name", rename_all = "kebab-case")]
pub enum NodeRole {
    Master,
    Secondary(String),
}

impl NodeRole {
    /// `"0"` is the master; every other id, numeric or not, names a secondary `fuzzer<id>`.
    pub fn resolve(node_id: &str) -> Self {
        if node_id == MASTER_ID {
            NodeRole::Master
        } else {
            NodeRole::Secondary(format!("{SECONDARY_PREFIX}{node_id}"))
        }
    }

    pub fn is_master(&self) -> bool {
        matches!(self, NodeRole::Master)
    }

    /// Name of the node's directory below the campaign output root.
    pub fn name(&self) -> &str {
        match self {
            NodeRole::Master => MASTER_NAME,
            NodeRole::Secondary(name) => name.as_str(),
        }
    }

    /// afl-fuzz selection flag and its value, e.g. `["-S", "fuzzer3"]`.
    pub fn selection_args(&self) -> [&str; 2] {
        match self {
            NodeRole::Master => ["-M", MASTER_NAME],
            NodeRole::Secondary(name) => ["-S", name.as_str()],
        }
    }

    pub fn selection_flag(&self) -> String {
        self.selection_args().join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentifierPolicy {
    /// Any token is accepted as a secondary suffix.
    #[default]
    Lenient,
    /// Only non-empty decimal ids are accepted.
    Strict,
}

impl IdentifierPolicy {
    pub fn from_strict_flag(strict: bool) -> Self {
        if strict {
            IdentifierPolicy::Strict
        } else {
            IdentifierPolicy::Lenient
        }
    }
}

fn is_decimal(node_id: &str) -> bool {
    !node_id.is_empty() && node_id.bytes().all(|b| b.is_ascii_digit())
}

/// Checks `node_id` against `policy`. Lenient mode only warns about odd ids.
pub fn validate_node_id(node_id: &str, policy: IdentifierPolicy) -> Result<(), ValidationError> {
    if is_decimal(node_id) {
        return Ok(());
    }
    match policy {
        IdentifierPolicy::Strict => Err(ValidationError::MalformedNodeId {
            node_id: node_id.to_string(),
        }),
        IdentifierPolicy::Lenient => {
            tracing::warn!(
                node_id,
                "node id is not a decimal number, using it verbatim as a secondary suffix"
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_master() {
        let role = NodeRole::resolve("0");
        assert_eq!(role, NodeRole::Master);
        assert!(role.is_master());
        assert_eq!(role.name(), "master");
        assert_eq!(role.selection_args(), ["-M", "master"]);
        assert_eq!(role.selection_flag(), "-M master");
    }

    #[test]
    fn other_ids_are_secondaries() {
        for id in ["1", "3", "42", "00", "abc", ""] {
            let role = NodeRole::resolve(id);
            let expected = format!("fuzzer{id}");
            assert_eq!(role, NodeRole::Secondary(expected.clone()));
            assert!(!role.is_master());
            assert_eq!(role.name(), expected);
            assert_eq!(role.selection_flag(), format!("-S {expected}"));
        }
    }

    #[test]
    fn lenient_policy_accepts_any_token() {
        assert!(validate_node_id("7", IdentifierPolicy::Lenient).is_ok());
        assert!(validate_node_id("gpu-box", IdentifierPolicy::Lenient).is_ok());
        assert!(validate_node_id("", IdentifierPolicy::Lenient).is_ok());
    }

    #[test]
    fn strict_policy_rejects_non_decimal_ids() {
        assert!(validate_node_id("0", IdentifierPolicy::Strict).is_ok());
        assert!(validate_node_id("12", IdentifierPolicy::Strict).is_ok());
        assert_eq!(
            validate_node_id("x1", IdentifierPolicy::Strict),
            Err(ValidationError::MalformedNodeId {
                node_id: "x1".to_string()
            })
        );
        assert!(validate_node_id("", IdentifierPolicy::Strict).is_err());
        assert!(validate_node_id("-1", IdentifierPolicy::Strict).is_err());
    }

    #[test]
    fn role_serializes_with_name() {
        let json = serde_json::to_string(&NodeRole::resolve("2")).unwrap();
        assert_eq!(json, r#"{"role":"secondary","name":"fuzzer2"}"#);
        let json = serde_json::to_string(&NodeRole::Master).unwrap();
        assert_eq!(json, r#"{"role":"master"}"#);
    }
}
