//! Job payloads and the per-invocation step context.

use serde::{Deserialize, Serialize};

use light_core::{DomainError, DomainResult, JobId, PromiseHandle, UserId};

use crate::state::JobState;

/// Identity a pipeline step runs under.
///
/// Steps execute on separate queue invocations, never inline with the request
/// that created the job, so the principal is carried explicitly.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobContext {
    pub job_id: JobId,
    pub owner_id: UserId,
    pub actor_id: UserId,
}

impl JobContext {
    pub fn new(job_id: JobId, owner_id: UserId, actor_id: UserId) -> Self {
        Self {
            job_id,
            owner_id,
            actor_id,
        }
    }
}

/// Progress record of an import-family job (root Google Doc import or child module import).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportContext {
    /// External resource being imported (e.g. a Google Doc id).
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Export handle returned by the document source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_id: Option<String>,
    /// Storage location of the downloaded archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub indexed: bool,
    /// Promise an external actor fills once the owner has authorised document access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_promise: Option<PromiseHandle>,
}

impl ImportContext {
    pub fn new(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_module(mut self, module_id: impl Into<String>) -> Self {
        self.module_id = Some(module_id.into());
        self
    }

    /// Check that the fields required by `state` are populated.
    ///
    /// A failure here is a programming or data error, never contention.
    pub fn validate(&self, state: JobState) -> DomainResult<()> {
        require_text("resource_id", Some(&self.resource_id), state)?;

        match state {
            JobState::Enqueued => Ok(()),
            JobState::WaitingForArchive => require_text("archive_id", self.archive_id.as_ref(), state),
            JobState::ArchiveDownloaded => {
                require_text("archive_id", self.archive_id.as_ref(), state)?;
                require_text("archive_location", self.archive_location.as_ref(), state)
            }
            JobState::ModuleCreated => require_text("module_id", self.module_id.as_ref(), state),
            JobState::ModuleVersionReserved => {
                require_text("module_id", self.module_id.as_ref(), state)?;
                require_version(self.version, state)
            }
            JobState::ModuleVersionPublished => {
                require_text("module_id", self.module_id.as_ref(), state)?;
                require_version(self.version, state)?;
                require_flag("published", self.published, state)
            }
            JobState::ModuleIndexed => {
                require_text("module_id", self.module_id.as_ref(), state)?;
                require_version(self.version, state)?;
                require_flag("published", self.published, state)?;
                require_flag("indexed", self.indexed, state)
            }
            JobState::WaitingForChildCompleteNotification
            | JobState::PollingForChilds
            | JobState::Complete => require_text("module_id", self.module_id.as_ref(), state),
        }
    }
}

fn require_text(field: &str, value: Option<&String>, state: JobState) -> DomainResult<()> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(DomainError::validation(format!(
            "{field} must be set in state {state}"
        ))),
    }
}

fn require_version(version: Option<u32>, state: JobState) -> DomainResult<()> {
    match version {
        Some(v) if v > 0 => Ok(()),
        _ => Err(DomainError::validation(format!(
            "version must be reserved in state {state}"
        ))),
    }
}

fn require_flag(field: &str, value: bool, state: JobState) -> DomainResult<()> {
    if value {
        Ok(())
    } else {
        Err(DomainError::validation(format!("{field} must be true in state {state}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn complete_context() -> ImportContext {
        ImportContext {
            resource_id: "doc-1".to_string(),
            title: Some("Intro".to_string()),
            archive_id: Some("export-1".to_string()),
            archive_location: Some("gs://light-archives/export-1.zip".to_string()),
            module_id: Some("m100".to_string()),
            version: Some(1),
            published: true,
            indexed: true,
            authorization_promise: None,
        }
    }

    /// Blank out one field (0..=6) of a complete context.
    fn without(field: usize) -> ImportContext {
        let mut ctx = complete_context();
        match field {
            0 => ctx.resource_id = "  ".to_string(),
            1 => ctx.archive_id = None,
            2 => ctx.archive_location = Some(String::new()),
            3 => ctx.module_id = None,
            4 => ctx.version = None,
            5 => ctx.published = false,
            _ => ctx.indexed = false,
        }
        ctx
    }

    /// Which stripped fields each state depends on.
    fn required(state: JobState) -> &'static [usize] {
        match state {
            JobState::Enqueued => &[0],
            JobState::WaitingForArchive => &[0, 1],
            JobState::ArchiveDownloaded => &[0, 1, 2],
            JobState::ModuleCreated => &[0, 3],
            JobState::ModuleVersionReserved => &[0, 3, 4],
            JobState::ModuleVersionPublished => &[0, 3, 4, 5],
            JobState::ModuleIndexed => &[0, 3, 4, 5, 6],
            _ => &[0, 3],
        }
    }

    #[test]
    fn fully_populated_context_is_valid_in_every_state() {
        let ctx = complete_context();
        for state in JobState::ALL {
            assert!(ctx.validate(state).is_ok(), "state {state}");
        }
    }

    #[test]
    fn archive_downloaded_requires_location() {
        let ctx = ImportContext {
            archive_id: Some("export-1".to_string()),
            ..ImportContext::new("doc-1")
        };
        assert!(ctx.validate(JobState::WaitingForArchive).is_ok());
        match ctx.validate(JobState::ArchiveDownloaded) {
            Err(DomainError::Validation(msg)) => assert!(msg.contains("archive_location")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn coordination_job_needs_only_module_id_once_created() {
        let ctx = ImportContext::new("doc-1").with_module("m7");
        assert!(ctx.validate(JobState::ModuleCreated).is_ok());
        assert!(ctx.validate(JobState::WaitingForChildCompleteNotification).is_ok());
        assert!(ctx.validate(JobState::ModuleVersionReserved).is_err());
    }

    #[test]
    fn zero_version_is_not_reserved() {
        let ctx = ImportContext {
            version: Some(0),
            ..ImportContext::new("doc-1").with_module("m7")
        };
        assert!(ctx.validate(JobState::ModuleVersionReserved).is_err());
    }

    proptest! {
        /// Property: missing any field a state requires fails validation; missing
        /// a field it does not require does not.
        #[test]
        fn missing_required_field_fails(state_idx in 0usize..10, field in 0usize..7) {
            let state = JobState::ALL[state_idx];
            let result = without(field).validate(state);
            if required(state).contains(&field) {
                prop_assert!(matches!(result, Err(DomainError::Validation(_))));
            } else {
                prop_assert!(result.is_ok());
            }
        }
    }
}
