//! Change records produced by instance plans.

use serde::Serialize;
use tracing::debug;

/// Why an instance needs work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// Recreation requested.
    Recreate,
    /// VM type cloud properties differ.
    VmType,
    /// Stemcell differs.
    Stemcell,
    /// Agent environment differs.
    Env,
    /// Network reservations or settings differ.
    Network,
    /// Persistent disk differs.
    PersistentDisk,
    /// DNS records are missing.
    Dns,
    /// Bootstrap election moved.
    Bootstrap,
    /// Lifecycle state differs.
    State,
}

impl std::fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Recreate => "recreate",
            Self::VmType => "vm_type",
            Self::Stemcell => "stemcell",
            Self::Env => "env",
            Self::Network => "network",
            Self::PersistentDisk => "persistent_disk",
            Self::Dns => "dns",
            Self::Bootstrap => "bootstrap",
            Self::State => "state",
        };
        write!(f, "{s}")
    }
}

/// A single field that differs between applied and desired state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeDetail {
    /// Field that differs.
    pub field: String,
    /// Applied value, if any.
    pub old_value: Option<String>,
    /// Desired value.
    pub new_value: String,
}

impl ChangeDetail {
    /// Creates a detail record.
    #[must_use]
    pub fn new(field: impl Into<String>, old_value: Option<String>, new_value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            old_value,
            new_value: new_value.into(),
        }
    }

    /// Logs this change against `instance`.
    pub fn log(&self, predicate: &str, instance: &str) {
        debug!(
            "{predicate} changed FROM: {} TO: {} on instance {instance}",
            self.old_value.as_deref().unwrap_or("nil"),
            self.new_value
        );
    }
}

impl std::fmt::Display for ChangeDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} changed FROM: {} TO: {}",
            self.field,
            self.old_value.as_deref().unwrap_or("nil"),
            self.new_value
        )
    }
}

/// Renders a JSON map compactly for change records.
#[must_use]
pub fn render_map(map: &serde_json::Map<String, serde_json::Value>) -> String {
    serde_json::Value::Object(map.clone()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_display() {
        let detail = ChangeDetail::new("stemcell", Some(String::from("ubuntu version: 1")), "ubuntu version: 2");
        assert_eq!(
            detail.to_string(),
            "stemcell changed FROM: ubuntu version: 1 TO: ubuntu version: 2"
        );

        let first = ChangeDetail::new("vm_type", None, "{}");
        assert_eq!(first.to_string(), "vm_type changed FROM: nil TO: {}");
    }

    #[test]
    fn test_reasons_sort_stably() {
        let mut reasons = vec![ChangeReason::Dns, ChangeReason::Recreate, ChangeReason::Network];
        reasons.sort();
        assert_eq!(reasons, vec![ChangeReason::Recreate, ChangeReason::Network, ChangeReason::Dns]);
        assert_eq!(ChangeReason::PersistentDisk.to_string(), "persistent_disk");
    }

    #[test]
    fn test_render_map() {
        let mut map = serde_json::Map::new();
        map.insert(String::from("cpu"), serde_json::json!(2));
        assert_eq!(render_map(&map), r#"{"cpu":2}"#);
    }
}
