//! Child-completion notification (wire format of the internal notification endpoint).

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use light_core::JobId;

/// Emitted when a child job reaches `Complete`; consumed by the parent's dispatcher.
///
/// Delivery is at-least-once and unordered relative to the parent's own progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildJobCompletionNotification {
    pub child_job_id: JobId,
    pub parent_job_id: JobId,
    #[serde(default)]
    pub payload: JsonValue,
}

impl ChildJobCompletionNotification {
    pub fn new(child_job_id: JobId, parent_job_id: JobId, payload: JsonValue) -> Self {
        Self {
            child_job_id,
            parent_job_id,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_uses_camel_case_ids() {
        let json = serde_json::json!({
            "childJobId": 12,
            "parentJobId": 3,
            "payload": {"moduleId": "m1"}
        });
        let n: ChildJobCompletionNotification = serde_json::from_value(json).unwrap();
        assert_eq!(n.child_job_id.get(), 12);
        assert_eq!(n.parent_job_id.get(), 3);
    }

    #[test]
    fn payload_defaults_to_null() {
        let json = serde_json::json!({"childJobId": 2, "parentJobId": 1});
        let n: ChildJobCompletionNotification = serde_json::from_value(json).unwrap();
        assert!(n.payload.is_null());
    }
}
