//! Test doubles for harness tests: an in-memory job store that records the
//! full status history, scripted collaborators, and a blocking executor for
//! queue-shape assertions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use verity_analysis::{
    AnalysisDraft, BoundaryDraft, DecomposedClaim, Decomposition, EvidencePolicy,
    EvidenceSearcher, MonolithicMode, TextAnalyst, TextPair, VerdictDraft,
};
use verity_common::{
    AnalysisReport, Boundary, Claim, ClaimDirection, EvidenceItem, InputType, Job, JobStatus,
    LogLevel, ProbativeValue, VerityError,
};

use crate::queue::JobExecutor;
use crate::store::JobStore;

// ---------------------------------------------------------------------------
// In-memory job store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: u8,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<Uuid, Job>>,
    history: Mutex<Vec<StatusEvent>>,
    results: Mutex<HashMap<Uuid, AnalysisReport>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: Job) {
        self.jobs.lock().unwrap().insert(job.id, job);
    }

    pub fn job(&self, id: Uuid) -> Option<Job> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }

    pub fn history(&self) -> Vec<StatusEvent> {
        self.history.lock().unwrap().clone()
    }

    pub fn history_for(&self, id: Uuid) -> Vec<StatusEvent> {
        self.history()
            .into_iter()
            .filter(|e| e.job_id == id)
            .collect()
    }

    pub fn result(&self, id: Uuid) -> Option<AnalysisReport> {
        self.results.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn fetch(&self, id: Uuid) -> Result<Job, VerityError> {
        self.job(id)
            .ok_or_else(|| VerityError::Store(format!("job {id} not found")))
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: JobStatus,
        progress: u8,
        level: LogLevel,
        message: &str,
    ) -> Result<(), VerityError> {
        self.history.lock().unwrap().push(StatusEvent {
            job_id: id,
            status,
            progress,
            level,
            message: message.to_string(),
        });
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            job.status = status;
            job.progress = progress;
        }
        Ok(())
    }

    async fn put_result(&self, id: Uuid, report: &AnalysisReport) -> Result<(), VerityError> {
        self.results.lock().unwrap().insert(id, report.clone());
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            job.result_payload = Some(serde_json::to_value(report).unwrap());
        }
        Ok(())
    }
}

pub fn test_job(variant: &str) -> Job {
    Job {
        id: Uuid::new_v4(),
        input_type: InputType::Text,
        input_value: "The 2019 reform reduced emissions by 12%.".to_string(),
        pipeline_variant: variant.to_string(),
        status: JobStatus::Pending,
        progress: 0,
        result_payload: None,
        enqueued_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Scripted collaborators
// ---------------------------------------------------------------------------

/// A well-behaved analyst with switchable failure modes.
#[derive(Default)]
pub struct StubAnalyst {
    /// Every `full_analysis` call fails (exercises variant fallback).
    pub fail_full_analysis: AtomicBool,
    /// Every LLM call fails (exercises the llm circuit).
    pub fail_all: AtomicBool,
}

impl StubAnalyst {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(&self) -> Result<()> {
        if self.fail_all.load(Ordering::Relaxed) {
            bail!("model overloaded");
        }
        Ok(())
    }
}

#[async_trait]
impl TextAnalyst for StubAnalyst {
    async fn decompose(&self, _input: &str) -> Result<Decomposition> {
        self.check()?;
        Ok(Decomposition {
            claims: vec![
                DecomposedClaim {
                    text: "The reform reduced emissions by 12%".into(),
                    is_central: true,
                    category: Some("factual".into()),
                    boundary_hint: Some("post2019".into()),
                },
                DecomposedClaim {
                    text: "The reform passed in 2019".into(),
                    is_central: false,
                    category: Some("factual".into()),
                    boundary_hint: None,
                },
            ],
            recency_sensitive: false,
        })
    }

    async fn detect_boundaries(
        &self,
        _input: &str,
        _claims: &[DecomposedClaim],
    ) -> Result<Vec<BoundaryDraft>> {
        self.check()?;
        Ok(vec![BoundaryDraft {
            name: "Post-2019 measurement window".into(),
            short_name: "post2019".into(),
            constituent_scopes: vec!["2019-2024 official statistics".into()],
            internal_coherence: 0.9,
        }])
    }

    async fn grade_claim(
        &self,
        claim: &Claim,
        evidence: &[EvidenceItem],
        _policy: EvidencePolicy,
    ) -> Result<VerdictDraft> {
        self.check()?;
        Ok(VerdictDraft {
            truth_percentage: 82.0,
            confidence: 74.0,
            verdict: "mostly_true".into(),
            reasoning: format!("evidence supports: {}", claim.text),
            supporting_evidence: evidence.first().map(|e| e.id.clone()).into_iter().collect(),
            contradicting_evidence: Vec::new(),
            boundary_findings: Vec::new(),
        })
    }

    async fn extract_key_terms(
        &self,
        reasonings: &[(String, String)],
    ) -> Result<HashMap<String, Vec<String>>> {
        self.check()?;
        // Neutral: no terms means no grounding penalty.
        Ok(reasonings
            .iter()
            .map(|(id, _)| (id.clone(), Vec::new()))
            .collect())
    }

    async fn score_pairs(&self, pairs: &[TextPair]) -> Result<Vec<serde_json::Value>> {
        self.check()?;
        Ok(pairs.iter().map(|_| serde_json::json!(0.5)).collect())
    }

    async fn full_analysis(
        &self,
        _input: &str,
        _mode: MonolithicMode,
        _policy: EvidencePolicy,
    ) -> Result<AnalysisDraft> {
        self.check()?;
        if self.fail_full_analysis.load(Ordering::Relaxed) {
            bail!("schema drift in single-pass response");
        }
        Ok(AnalysisDraft {
            claims: vec![DecomposedClaim {
                text: "The reform reduced emissions by 12%".into(),
                is_central: true,
                category: Some("factual".into()),
                boundary_hint: None,
            }],
            boundaries: Vec::new(),
            evidence: vec![stub_evidence("ev_mono_1", "src_a", ClaimDirection::Supports)],
            verdicts: vec![VerdictDraft {
                truth_percentage: 80.0,
                confidence: 70.0,
                verdict: "mostly_true".into(),
                reasoning: "single-pass reasoning".into(),
                supporting_evidence: vec!["ev_mono_1".into()],
                contradicting_evidence: Vec::new(),
                boundary_findings: Vec::new(),
            }],
            recency_sensitive: false,
            searches_performed: 2,
            contradiction_search_performed: true,
        })
    }
}

pub fn stub_evidence(id: &str, source: &str, claim_direction: ClaimDirection) -> EvidenceItem {
    EvidenceItem {
        id: id.to_string(),
        statement: format!("measured statement {id}"),
        source_id: source.to_string(),
        boundary_id: None,
        claim_direction,
        probative_value: ProbativeValue::Medium,
        source_reliability: Some(0.8),
    }
}

/// A searcher returning two supporting items per gather plus one
/// contradicting item per contradiction search, with a switchable
/// always-fail mode for circuit tests.
#[derive(Default)]
pub struct StubSearcher {
    pub fail_all: AtomicBool,
    calls: Mutex<u32>,
}

impl StubSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }

    fn next_id(&self) -> u32 {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        *calls
    }
}

#[async_trait]
impl EvidenceSearcher for StubSearcher {
    async fn gather(&self, _claim: &Claim, _boundaries: &[Boundary]) -> Result<Vec<EvidenceItem>> {
        let n = self.next_id();
        if self.fail_all.load(Ordering::Relaxed) {
            bail!("search backend unavailable");
        }
        Ok(vec![
            stub_evidence(&format!("ev_{n}_1"), "src_a", ClaimDirection::Supports),
            stub_evidence(&format!("ev_{n}_2"), "src_b", ClaimDirection::Neutral),
        ])
    }

    async fn contradiction_search(&self, _claim: &Claim) -> Result<Vec<EvidenceItem>> {
        let n = self.next_id();
        if self.fail_all.load(Ordering::Relaxed) {
            bail!("search backend unavailable");
        }
        Ok(vec![stub_evidence(
            &format!("ev_{n}_c"),
            "src_c",
            ClaimDirection::Contradicts,
        )])
    }
}

// ---------------------------------------------------------------------------
// Blocking executor
// ---------------------------------------------------------------------------

/// Records which jobs started and holds each until a permit is released —
/// lets tests observe the queue's concurrency shape deterministically.
pub struct BlockingExecutor {
    started: Mutex<Vec<Uuid>>,
    gate: tokio::sync::Semaphore,
}

impl Default for BlockingExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockingExecutor {
    pub fn new() -> Self {
        Self {
            started: Mutex::new(Vec::new()),
            gate: tokio::sync::Semaphore::new(0),
        }
    }

    pub fn started(&self) -> Vec<Uuid> {
        self.started.lock().unwrap().clone()
    }

    /// Let `n` held jobs run to completion.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }
}

#[async_trait]
impl JobExecutor for BlockingExecutor {
    async fn execute(&self, job: Job) {
        self.started.lock().unwrap().push(job.id);
        let permit = self.gate.acquire().await.expect("gate closed");
        permit.forget();
    }
}
