//! Variant resolution, fallback policy, and terminal-state reporting for a
//! single job.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use verity_common::{Job, JobStatus, LogLevel, PipelineVariant};

use crate::pipeline::{strategy_for, AnalysisInput, JobProgress, ProgressSink, StrategyContext};
use crate::queue::JobExecutor;
use crate::store::JobStore;

pub struct PipelineRunner {
    store: Arc<dyn JobStore>,
    ctx: StrategyContext,
}

impl PipelineRunner {
    pub fn new(store: Arc<dyn JobStore>, ctx: StrategyContext) -> Self {
        Self { store, ctx }
    }

    /// Resolve a requested variant string. Unknown values substitute the
    /// orchestrated strategy — never a reason to fail the job.
    fn resolve_variant(requested: &str) -> (PipelineVariant, bool) {
        match PipelineVariant::parse(requested) {
            Some(v) => (v, false),
            None => (PipelineVariant::Orchestrated, true),
        }
    }

    /// Run one job to its terminal state. Every outcome — success, variant
    /// fallback, fatal failure — is reported through the status sink before
    /// this returns; nothing propagates to the queue.
    pub async fn run_job(&self, job: Job) {
        let progress = JobProgress::new(Arc::clone(&self.store), job.id);
        let (variant, unknown) = Self::resolve_variant(&job.pipeline_variant);
        if unknown {
            warn!(job_id = %job.id, requested = %job.pipeline_variant, "Unknown pipeline variant");
            progress
                .warn(&format!(
                    "unknown pipeline variant '{}', substituting orchestrated",
                    job.pipeline_variant
                ))
                .await;
        }

        let input = AnalysisInput {
            input_type: job.input_type,
            value: job.input_value.clone(),
        };

        let mut outcome = strategy_for(variant).execute(&input, &self.ctx, &progress).await;

        // The monolithic variants get exactly one fallback attempt through
        // the orchestrated strategy; its failure is the job's failure.
        if let Err(original) = &outcome {
            if variant != PipelineVariant::Orchestrated {
                let reason = original.to_string();
                warn!(job_id = %job.id, variant = %variant, error = %reason, "Pipeline variant failed, falling back");
                progress
                    .warn(&format!(
                        "{variant} pipeline failed ({reason}); falling back to orchestrated"
                    ))
                    .await;
                outcome = strategy_for(PipelineVariant::Orchestrated)
                    .execute(&input, &self.ctx, &progress)
                    .await
                    .map(|mut report| {
                        report.pipeline_fallback = true;
                        report.fallback_reason = Some(reason);
                        report
                    });
            }
        }

        match outcome {
            Ok(report) => {
                if let Err(e) = self.store.put_result(job.id, &report).await {
                    error!(job_id = %job.id, error = %e, "Failed to persist analysis result");
                    self.report_failed(job.id, &format!("failed to persist result: {e}"))
                        .await;
                    return;
                }
                info!(
                    job_id = %job.id,
                    variant = %report.variant,
                    fallback = report.pipeline_fallback,
                    gates_passed = report.gates.passed,
                    "Analysis complete"
                );
                if let Err(e) = self
                    .store
                    .set_status(job.id, JobStatus::Succeeded, 100, LogLevel::Info, "analysis complete")
                    .await
                {
                    warn!(job_id = %job.id, error = %e, "Failed to report success status");
                }
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Analysis failed");
                self.report_failed(job.id, &format!("analysis failed: {e}"))
                    .await;
            }
        }
    }

    async fn report_failed(&self, job_id: uuid::Uuid, message: &str) {
        if let Err(e) = self
            .store
            .set_status(job_id, JobStatus::Failed, 0, LogLevel::Error, message)
            .await
        {
            warn!(job_id = %job_id, error = %e, "Failed to report failure status");
        }
    }
}

#[async_trait]
impl JobExecutor for PipelineRunner {
    async fn execute(&self, job: Job) {
        self.run_job(job).await;
    }
}
