use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use light_core::UserId;
use light_infra::queue::{InMemoryTaskQueue, Task, TaskPayload, TaskQueue};
use light_infra::store::{Datastore, InMemoryDatastore};
use light_infra::{JobManager, RetryPolicy, TransactionRunner};
use light_jobs::{ImportContext, JobState, JobType};
use std::sync::Arc;
use std::time::Duration;

fn manager() -> JobManager {
    let store: Arc<dyn Datastore> = Arc::new(InMemoryDatastore::new());
    let queue: Arc<dyn TaskQueue> = InMemoryTaskQueue::arc();
    JobManager::new(TransactionRunner::new(
        store,
        queue,
        RetryPolicy::fixed(64, Duration::ZERO),
    ))
}

/// Create a root job: one id allocation plus one commit with a buffered task.
fn bench_enqueue_root_job(c: &mut Criterion) {
    let manager = manager();
    let owner = UserId::new();
    let context = ImportContext::new("doc-1");

    c.bench_function("enqueue_root_job", |b| {
        b.iter(|| {
            let job = manager
                .enqueue_root_job(JobType::GoogleDocImport, black_box(&context), owner, owner)
                .unwrap();
            black_box(job.id())
        })
    });
}

/// Context updates on a job with a growing ChangeLog.
fn bench_transition(c: &mut Criterion) {
    let mut group = c.benchmark_group("transition_with_history");

    for history in [10usize, 100, 1_000] {
        let manager = manager();
        let owner = UserId::new();
        let job = manager
            .enqueue_root_job(
                JobType::Import,
                &ImportContext::new("doc-1").with_module("m1"),
                owner,
                owner,
            )
            .unwrap();
        for i in 0..history {
            manager
                .update_context(job.id(), |c: &mut ImportContext| c.title = Some(format!("t{i}")), "update")
                .unwrap();
        }

        group.bench_with_input(BenchmarkId::from_parameter(history), &history, |b, _| {
            b.iter(|| {
                manager
                    .transition(
                        job.id(),
                        JobState::ModuleCreated,
                        |_: &mut ImportContext| {},
                        "re-enter",
                    )
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_queue_claim(c: &mut Criterion) {
    let queue = InMemoryTaskQueue::new();
    let job_id = light_core::JobId::new(1).unwrap();

    c.bench_function("queue_enqueue_claim_complete", |b| {
        b.iter(|| {
            queue.enqueue(Task::new(TaskPayload::Resume { job_id })).unwrap();
            let task = queue.claim_next().unwrap().unwrap();
            queue.complete(black_box(task.id)).unwrap();
        })
    });
}

criterion_group!(benches, bench_enqueue_root_job, bench_transition, bench_queue_claim);
criterion_main!(benches);
