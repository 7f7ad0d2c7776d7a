//! End-to-end harness tests: queue shape, variant fallback, provider
//! circuits, and pause/resume — all against in-memory collaborators.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use verity_analysis::EvidencePolicy;
use verity_common::{JobStatus, LogLevel, PipelineVariant};
use verity_runner::pipeline::StrategyContext;
use verity_runner::testing::{test_job, BlockingExecutor, MemoryJobStore, StubAnalyst, StubSearcher};
use verity_runner::{
    CircuitState, ControlService, HealthTracker, PipelineRunner, ProviderClass, QueueConfig,
    RunnerQueue, WebhookNotifier,
};

async fn wait_until<F: Fn() -> bool>(cond: F, what: &str) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for: {what}");
}

fn runner(
    store: Arc<MemoryJobStore>,
    analyst: Arc<StubAnalyst>,
    searcher: Arc<StubSearcher>,
    health: Arc<HealthTracker>,
) -> PipelineRunner {
    let ctx = StrategyContext::new(analyst, searcher, health, EvidencePolicy::EvidenceOnly);
    PipelineRunner::new(store, ctx)
}

// ---------------------------------------------------------------------------
// Queue shape
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queue_caps_concurrency_and_drains_one_in_one_out() {
    let store = Arc::new(MemoryJobStore::new());
    let health = Arc::new(HealthTracker::new(3));
    let executor = Arc::new(BlockingExecutor::new());
    let queue = RunnerQueue::new(
        QueueConfig {
            max_concurrency: 3,
            queue_timeout_secs: 300,
        },
        store.clone(),
        health,
        executor.clone(),
    );

    // max_concurrency + 2 jobs submitted at once.
    let jobs: Vec<_> = (0..5)
        .map(|_| {
            let job = test_job("orchestrated");
            store.insert(job.clone());
            assert!(queue.submit(job.id));
            job
        })
        .collect();

    queue.clone().drain().await;
    wait_until(|| executor.started().len() == 3, "3 jobs running").await;
    assert_eq!(queue.running_len(), 3);
    assert_eq!(queue.queued_len(), 2);

    // One completes, exactly one more starts — FIFO.
    executor.release(1);
    wait_until(|| executor.started().len() == 4, "4th job started").await;
    assert_eq!(queue.running_len(), 3);
    assert_eq!(queue.queued_len(), 1);
    assert_eq!(executor.started()[3], jobs[3].id);

    executor.release(4);
    wait_until(|| queue.running_len() == 0, "all slots released").await;
    assert_eq!(executor.started().len(), 5);
    assert_eq!(queue.queued_len(), 0);
}

#[tokio::test]
async fn submit_is_idempotent_for_queued_and_running_jobs() {
    let store = Arc::new(MemoryJobStore::new());
    let health = Arc::new(HealthTracker::new(3));
    let executor = Arc::new(BlockingExecutor::new());
    let queue = RunnerQueue::new(QueueConfig::default(), store.clone(), health, executor.clone());

    let job = test_job("orchestrated");
    store.insert(job.clone());
    assert!(queue.submit(job.id));
    assert!(!queue.submit(job.id), "duplicate enqueue must be refused");

    queue.clone().drain().await;
    wait_until(|| executor.started().len() == 1, "job running").await;
    assert!(!queue.submit(job.id), "running job must not re-enqueue");
    executor.release(1);
}

#[tokio::test]
async fn stale_queue_entries_are_evicted_as_failed() {
    let store = Arc::new(MemoryJobStore::new());
    let health = Arc::new(HealthTracker::new(3));
    let executor = Arc::new(BlockingExecutor::new());
    let queue = RunnerQueue::new(
        QueueConfig {
            max_concurrency: 3,
            queue_timeout_secs: 0,
        },
        store.clone(),
        health,
        executor.clone(),
    );

    let job = test_job("orchestrated");
    store.insert(job.clone());
    queue.submit(job.id);
    tokio::time::sleep(Duration::from_millis(10)).await;

    queue.clone().drain().await;
    assert!(executor.started().is_empty(), "evicted job must never start");

    let history = store.history_for(job.id);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, JobStatus::Failed);
    assert!(history[0].message.contains("queue timeout"));
    assert_eq!(store.job(job.id).unwrap().status, JobStatus::Failed);
}

#[tokio::test]
async fn jobs_already_progressed_in_the_store_are_skipped() {
    let store = Arc::new(MemoryJobStore::new());
    let health = Arc::new(HealthTracker::new(3));
    let executor = Arc::new(BlockingExecutor::new());
    let queue = RunnerQueue::new(QueueConfig::default(), store.clone(), health, executor.clone());

    let mut job = test_job("orchestrated");
    job.status = JobStatus::Succeeded;
    store.insert(job.clone());

    queue.submit(job.id);
    queue.clone().drain().await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(executor.started().is_empty(), "retried trigger must not restart the job");
    assert_eq!(queue.running_len(), 0);
}

#[tokio::test]
async fn paused_system_starts_nothing_until_resume() {
    let store = Arc::new(MemoryJobStore::new());
    let health = Arc::new(HealthTracker::new(3));
    let executor = Arc::new(BlockingExecutor::new());
    let queue = RunnerQueue::new(
        QueueConfig::default(),
        store.clone(),
        health.clone(),
        executor.clone(),
    );
    let control = ControlService::new(health.clone(), queue.clone(), WebhookNotifier::new("", ""));

    control.pause("operator maintenance");
    let job = test_job("orchestrated");
    store.insert(job.clone());
    queue.submit(job.id);
    queue.clone().drain().await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(executor.started().is_empty(), "paused system must not start jobs");
    assert_eq!(queue.queued_len(), 1);

    control.resume().await;
    wait_until(|| executor.started().len() == 1, "job started after resume").await;
    assert!(!health.is_paused());
    executor.release(1);
}

// ---------------------------------------------------------------------------
// Pipeline variants
// ---------------------------------------------------------------------------

#[tokio::test]
async fn orchestrated_job_succeeds_with_full_report() {
    let store = Arc::new(MemoryJobStore::new());
    let health = Arc::new(HealthTracker::new(3));
    let runner = runner(
        store.clone(),
        Arc::new(StubAnalyst::new()),
        Arc::new(StubSearcher::new()),
        health,
    );

    let job = test_job("orchestrated");
    store.insert(job.clone());
    runner.run_job(job.clone()).await;

    assert_eq!(store.job(job.id).unwrap().status, JobStatus::Succeeded);
    let report = store.result(job.id).expect("result persisted");
    assert_eq!(report.variant, PipelineVariant::Orchestrated);
    assert!(!report.pipeline_fallback);
    assert_eq!(report.claims.len(), 2);

    // Coverage dimensions track claims x boundaries structurally.
    assert_eq!(report.coverage.counts.len(), report.claims.len());
    for row in &report.coverage.counts {
        assert_eq!(row.len(), report.boundaries.len());
    }

    // Central claim triggered the contradiction search: 2 gathers + 1.
    assert_eq!(report.searches_performed, 3);
    assert!(report.contradiction_search_performed);
    assert!(report.gates.passed, "gates: {}", report.gates.summary);
    assert_eq!(report.article.verdict, "mostly_true");
}

#[tokio::test]
async fn failing_monolithic_variant_falls_back_to_orchestrated() {
    let store = Arc::new(MemoryJobStore::new());
    let health = Arc::new(HealthTracker::new(5));
    let analyst = Arc::new(StubAnalyst::new());
    analyst.fail_full_analysis.store(true, Ordering::Relaxed);
    let runner = runner(store.clone(), analyst, Arc::new(StubSearcher::new()), health);

    let job = test_job("monolithic_canonical");
    store.insert(job.clone());
    runner.run_job(job.clone()).await;

    assert_eq!(store.job(job.id).unwrap().status, JobStatus::Succeeded);
    let report = store.result(job.id).expect("fallback result persisted");
    assert!(report.pipeline_fallback);
    assert!(report
        .fallback_reason
        .as_deref()
        .unwrap()
        .contains("schema drift"));
    assert_eq!(report.variant, PipelineVariant::Orchestrated);

    // A warn event must appear in the history before the success.
    let history = store.history_for(job.id);
    let warn_idx = history
        .iter()
        .position(|e| matches!(e.level, LogLevel::Warn) && e.message.contains("falling back"))
        .expect("fallback warning reported");
    let success_idx = history
        .iter()
        .position(|e| e.status == JobStatus::Succeeded)
        .expect("success reported");
    assert!(warn_idx < success_idx);
}

#[tokio::test]
async fn monolithic_success_does_not_fall_back() {
    let store = Arc::new(MemoryJobStore::new());
    let health = Arc::new(HealthTracker::new(3));
    let runner = runner(
        store.clone(),
        Arc::new(StubAnalyst::new()),
        Arc::new(StubSearcher::new()),
        health,
    );

    let job = test_job("monolithic_dynamic");
    store.insert(job.clone());
    runner.run_job(job.clone()).await;

    let report = store.result(job.id).unwrap();
    assert_eq!(report.variant, PipelineVariant::MonolithicDynamic);
    assert!(!report.pipeline_fallback);
    assert!(report.fallback_reason.is_none());
}

#[tokio::test]
async fn unknown_variant_warns_and_substitutes_orchestrated() {
    let store = Arc::new(MemoryJobStore::new());
    let health = Arc::new(HealthTracker::new(3));
    let runner = runner(
        store.clone(),
        Arc::new(StubAnalyst::new()),
        Arc::new(StubSearcher::new()),
        health,
    );

    let job = test_job("monolithic_v3");
    store.insert(job.clone());
    runner.run_job(job.clone()).await;

    assert_eq!(store.job(job.id).unwrap().status, JobStatus::Succeeded);
    let history = store.history_for(job.id);
    assert!(history
        .iter()
        .any(|e| matches!(e.level, LogLevel::Warn) && e.message.contains("monolithic_v3")));
    assert_eq!(
        store.result(job.id).unwrap().variant,
        PipelineVariant::Orchestrated
    );
}

// ---------------------------------------------------------------------------
// Provider circuits end to end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn search_circuit_opens_on_the_third_recorded_failure() {
    let store = Arc::new(MemoryJobStore::new());
    let health = Arc::new(HealthTracker::new(3));
    let searcher = Arc::new(StubSearcher::new());
    searcher.fail_all.store(true, Ordering::Relaxed);
    let runner = runner(store.clone(), Arc::new(StubAnalyst::new()), searcher, health.clone());

    // Each failed job records one search failure (after its in-call retry).
    for expected_state in [CircuitState::Closed, CircuitState::Closed, CircuitState::Open] {
        let job = test_job("orchestrated");
        store.insert(job.clone());
        runner.run_job(job.clone()).await;
        assert_eq!(store.job(job.id).unwrap().status, JobStatus::Failed);
        assert_eq!(health.snapshot().search.state, expected_state);
    }

    assert!(!health.is_healthy(ProviderClass::Search));
    // Search trouble never bleeds into the llm circuit.
    assert!(health.is_healthy(ProviderClass::Llm));
    assert_eq!(health.snapshot().llm.consecutive_failures, 0);
}

#[tokio::test]
async fn open_search_circuit_fails_jobs_fast() {
    let store = Arc::new(MemoryJobStore::new());
    let health = Arc::new(HealthTracker::new(1));
    health.record_failure(ProviderClass::Search, "seeded outage", None);
    assert_eq!(health.snapshot().search.state, CircuitState::Open);

    let searcher = Arc::new(StubSearcher::new());
    let runner = runner(
        store.clone(),
        Arc::new(StubAnalyst::new()),
        searcher.clone(),
        health,
    );

    let job = test_job("orchestrated");
    store.insert(job.clone());
    runner.run_job(job.clone()).await;

    assert_eq!(store.job(job.id).unwrap().status, JobStatus::Failed);
    assert_eq!(searcher.calls(), 0, "open circuit must gate the call entirely");
    let history = store.history_for(job.id);
    assert!(history
        .iter()
        .any(|e| e.status == JobStatus::Failed && e.message.contains("circuit")));
}
