//! End-to-end orchestration tests.
//!
//! Tests: root job → steps → child job → notification → fan-in → tree
//!
//! Verifies:
//! - A Google Doc import completes with a collection tree
//! - External authorization resumes a suspended pipeline
//! - Retriable failures (archive export, commit conflicts) are absorbed
//! - Duplicate and early notifications leave the parent consistent
//! - An early notification is consumed once the parent reaches the fan-in

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use light_core::UserId;
    use light_jobs::{
        ChildJobCompletionNotification, CollectionTreeNode, ImportContext, Job, JobState,
        ModuleImportResult,
    };
    use serde_json::json;

    use crate::config::OrchestrationConfig;
    use crate::pipeline::{PromiseKind, StepRun};
    use crate::import::{InMemoryDocumentSource, InMemoryModuleCatalog};
    use crate::queue::{InMemoryTaskQueue, Task, TaskPayload, TaskQueue};
    use crate::retry::RetryPolicy;
    use crate::runtime::Orchestrator;
    use crate::store::InMemoryDatastore;
    use crate::worker::TaskReport;

    struct Harness {
        orchestrator: Orchestrator,
        store: Arc<InMemoryDatastore>,
        queue: Arc<InMemoryTaskQueue>,
        documents: Arc<InMemoryDocumentSource>,
        catalog: Arc<InMemoryModuleCatalog>,
        owner: UserId,
    }

    impl Harness {
        fn new(export_polls: u32) -> Self {
            let config = OrchestrationConfig::default()
                .with_transaction_retry(RetryPolicy::fixed(16, Duration::ZERO))
                .with_queue_retry(RetryPolicy::fixed(5, Duration::ZERO));

            let store = Arc::new(InMemoryDatastore::new());
            let queue = InMemoryTaskQueue::arc();
            let documents = Arc::new(InMemoryDocumentSource::new().with_export_polls(export_polls));
            let catalog = Arc::new(InMemoryModuleCatalog::new());
            documents.add_document("doc-1", "Cell Biology").unwrap();

            let orchestrator = Orchestrator::with_backends(
                config,
                store.clone(),
                queue.clone(),
                documents.clone(),
                catalog.clone(),
            );
            Self {
                orchestrator,
                store,
                queue,
                documents,
                catalog,
                owner: UserId::new(),
            }
        }

        fn start(&self) -> Job {
            self.orchestrator
                .start_google_doc_import("doc-1", self.owner, UserId::new())
                .unwrap()
        }

        fn drain(&self) -> Vec<TaskReport> {
            self.orchestrator.worker().run_until_idle(200).unwrap()
        }

        fn job(&self, job: &Job) -> Job {
            self.orchestrator.manager().get(None, job.id()).unwrap().unwrap()
        }

        fn child(&self, root: &Job) -> Job {
            let children = self.orchestrator.manager().children(root.id()).unwrap();
            assert_eq!(children.len(), 1);
            children.into_iter().next().unwrap()
        }
    }

    fn tree(job: &Job) -> CollectionTreeNode {
        serde_json::from_value(job.response().cloned().unwrap()).unwrap()
    }

    #[test]
    fn authorized_import_builds_collection_tree() {
        let h = Harness::new(0);
        h.documents.grant(h.owner, "doc-1").unwrap();
        let root = h.start();

        h.drain();

        let root = h.job(&root);
        assert_eq!(root.state(), JobState::Complete);
        assert!(root.pending_children.is_empty());
        assert!(root.suspension.is_none());

        let child = h.child(&root);
        assert_eq!(child.state(), JobState::Complete);
        assert_eq!(child.parent_job_id, Some(root.id()));
        assert_eq!(child.root_job_id, Some(root.id()));
        assert_eq!(child.owner_id, h.owner);
        assert_eq!(child.actor_id, root.actor_id);

        let result: ModuleImportResult =
            serde_json::from_value(child.response().cloned().unwrap()).unwrap();
        assert_eq!(result.version, 1);
        assert_eq!(result.title, "Cell Biology");

        let tree = tree(&root);
        assert_eq!(tree.title, "Cell Biology");
        assert_eq!(tree.version, None);
        assert_eq!(tree.children, vec![CollectionTreeNode::leaf(&result)]);

        // Collection module plus the imported module.
        assert_eq!(h.catalog.module_count(), 2);
        let module = h.catalog.module(&result.module_id).unwrap();
        assert!(module.indexed.contains(&1));
        assert!(h.queue.is_empty().unwrap());
        assert!(h.queue.list_dead_letters(10).unwrap().is_empty());
    }

    #[test]
    fn unauthorized_import_waits_for_external_grant() {
        let h = Harness::new(0);
        let root = h.start();

        h.drain();
        let waiting = h.job(&root);
        assert_eq!(waiting.state(), JobState::Enqueued);
        let suspension = waiting.suspension.clone().unwrap();
        assert_eq!(suspension.then, "create_module");
        assert!(h.queue.is_empty().unwrap());

        let handle = suspension.awaiting[0];
        assert!(h.orchestrator.engine().fulfill_external(handle, json!(true)).unwrap());
        // A second grant is a no-op.
        assert!(!h.orchestrator.engine().fulfill_external(handle, json!(true)).unwrap());

        h.drain();
        assert_eq!(h.job(&root).state(), JobState::Complete);
    }

    #[test]
    fn denied_access_stops_the_pipeline() {
        let h = Harness::new(0);
        let root = h.start();
        h.drain();

        let handle = h.job(&root).suspension.unwrap().awaiting[0];
        h.orchestrator.engine().fulfill_external(handle, json!(false)).unwrap();
        let reports = h.drain();

        assert!(reports.iter().any(|r| matches!(
            r,
            TaskReport::DeadLettered { reason, .. } if reason.contains("document access was denied")
        )));
        let root = h.job(&root);
        assert_ne!(root.state(), JobState::Complete);
        assert!(root.last_message().unwrap().starts_with("failed:"));
        assert!(root.child_job_ids.is_empty());
        assert_eq!(h.queue.list_dead_letters(10).unwrap().len(), 1);
    }

    #[test]
    fn pending_archive_export_is_retried() {
        let h = Harness::new(2);
        h.documents.grant(h.owner, "doc-1").unwrap();
        let root = h.start();

        let reports = h.drain();

        let retried = reports
            .iter()
            .filter(|r| matches!(r, TaskReport::Retrying { .. }))
            .count();
        assert_eq!(retried, 2);
        assert_eq!(h.documents.archive_requests(), 1);
        assert_eq!(h.job(&root).state(), JobState::Complete);
    }

    #[test]
    fn commit_conflicts_are_absorbed() {
        let h = Harness::new(0);
        h.documents.grant(h.owner, "doc-1").unwrap();
        let root = h.start();

        h.store.fail_next_commits(5);
        h.drain();

        let root = h.job(&root);
        assert_eq!(root.state(), JobState::Complete);
        assert_eq!(h.catalog.module_count(), 2);
    }

    #[test]
    fn repeated_child_completion_leaves_parent_alone() {
        let h = Harness::new(0);
        h.documents.grant(h.owner, "doc-1").unwrap();
        let root = h.start();
        h.drain();

        let before = h.job(&root);
        let child = h.child(&before);
        let response = child.response().cloned().unwrap();

        h.orchestrator
            .manager()
            .enqueue_complete_job(child.id(), json!("ignored"), "completed again")
            .unwrap();
        let reports = h.drain();
        assert!(matches!(reports.as_slice(), [TaskReport::Done { kind: "child_completed", .. }]));

        let after = h.job(&root);
        assert_eq!(after.response(), before.response());
        assert_eq!(after.state(), JobState::Complete);

        let child = h.job(&child);
        assert_eq!(child.response(), Some(&response));
        assert_eq!(child.last_message(), Some("completed again (already complete)"));
    }

    #[test]
    fn child_finishing_before_fan_in_is_consumed_once_parent_waits() {
        let h = Harness::new(0);
        h.documents.grant(h.owner, "doc-1").unwrap();
        let root = h.start();
        let worker = h.orchestrator.worker();

        // authorize, create_module
        for _ in 0..2 {
            assert!(matches!(worker.process_next().unwrap(), Some(TaskReport::Done { .. })));
        }
        assert_eq!(h.job(&root).state(), JobState::ModuleCreated);

        // The spawn step is slow: its child is created and finishes first.
        let spawn = h.queue.claim_next().unwrap().unwrap();
        let manager = h.orchestrator.manager();
        let handle = manager
            .runner()
            .run(|txn| manager.promises().create(txn, root.id(), PromiseKind::ChildFuture))
            .unwrap();
        let child = manager
            .enqueue_import_job(
                &ImportContext::new("doc-1").with_title("Cell Biology"),
                root.id(),
                root.id(),
                Some(handle),
            )
            .unwrap();

        let first = loop {
            match worker.process_next().unwrap() {
                Some(TaskReport::Done { .. }) => continue,
                other => break other,
            }
        };
        assert!(matches!(first, Some(TaskReport::Retrying { attempt: 1, .. })));
        assert_eq!(h.job(&child).state(), JobState::Complete);

        // Redelivered past the queue's attempt limit while the parent lags.
        for _ in 0..8 {
            assert!(matches!(worker.process_next().unwrap(), Some(TaskReport::Retrying { .. })));
        }
        let parent = h.job(&root);
        assert_eq!(parent.state(), JobState::ModuleCreated);
        assert!(parent.pending_children.contains(&child.id()));
        assert!(h.queue.list_dead_letters(10).unwrap().is_empty());

        let TaskPayload::RunStep { job_id, step, args } = &spawn.payload else {
            panic!("expected the spawn step, got {:?}", spawn.payload);
        };
        let run = h
            .orchestrator
            .engine()
            .run_step(spawn.id, *job_id, step, args.clone())
            .unwrap();
        assert_eq!(run, StepRun::Suspended { then: "assemble_tree".into() });
        h.queue.complete(spawn.id).unwrap();
        assert_eq!(h.job(&root).state(), JobState::WaitingForChildCompleteNotification);

        let reports = h.drain();
        assert!(
            matches!(
                reports.as_slice(),
                [
                    TaskReport::Done { kind: "child_completed", .. },
                    TaskReport::Done { kind: "poll_children", .. },
                    TaskReport::Done { kind: "run_step", .. },
                ]
            ),
            "{reports:?}"
        );

        let root = h.job(&root);
        assert_eq!(root.state(), JobState::Complete);
        assert!(root.pending_children.is_empty());
        assert_eq!(root.child_job_ids, vec![child.id()]);
        assert_eq!(tree(&root).children.len(), 1);
        assert!(h.queue.is_empty().unwrap());
    }

    #[test]
    fn notification_for_enqueued_parent_waits_in_queue() {
        let h = Harness::new(0);
        let root = h.start();
        h.drain();

        // Parent is still in Enqueued, awaiting authorization.
        let child = h.orchestrator.manager().allocate_job_id().unwrap();
        h.queue
            .enqueue(Task::new(TaskPayload::ChildCompleted(
                ChildJobCompletionNotification::new(child, root.id(), json!(null)),
            )))
            .unwrap();

        let reports = h.drain();
        assert!(reports.iter().all(|r| matches!(r, TaskReport::Retrying { .. })));
        assert_eq!(h.job(&root).state(), JobState::Enqueued);
        assert!(h.queue.list_dead_letters(10).unwrap().is_empty());
        assert_eq!(h.queue.stats().unwrap().ready, 1);
    }

    #[test]
    fn purge_removes_jobs_and_promises() {
        let h = Harness::new(0);
        h.documents.grant(h.owner, "doc-1").unwrap();
        let root = h.start();
        h.drain();

        let removed = h.orchestrator.manager().purge_all().unwrap();
        // Root, child and the child's promise.
        assert_eq!(removed, 3);
        assert!(h.orchestrator.manager().get(None, root.id()).unwrap().is_none());
    }
}
