use tracing::{info, instrument, warn};
use uuid::Uuid;

use actready_core::audit::{AuditFailure, AuditOutcome};
use actready_core::provider::{LlmProvider, StreamOptions};
use actready_core::retrieval::RetrievalIndex;

use crate::error::ScanError;
use crate::prompt::compose;
use crate::sampler::{sample_repository, CodeCorpus, ScanLimits};
use crate::validator::validate;

#[derive(Clone, Debug, Default)]
pub struct ScanOptions {
    pub limits: ScanLimits,
    pub generation: StreamOptions,
}

/// Audit one repository end to end.
///
/// Only clone and workspace failures come back as `Err`; everything after a
/// successful clone resolves to an [`AuditOutcome`].
#[instrument(skip_all, fields(scan_id = %Uuid::now_v7(), url = %url))]
pub async fn run_scan(
    url: &str,
    provider: &dyn LlmProvider,
    index: &dyn RetrievalIndex,
    options: &ScanOptions,
) -> Result<AuditOutcome, ScanError> {
    info!("scan started");
    let corpus = sample_repository(url, &options.limits).await?;
    Ok(audit_corpus(&corpus, provider, index, &options.generation).await)
}

/// Compose, generate and validate for an already sampled corpus.
pub async fn audit_corpus(
    corpus: &CodeCorpus,
    provider: &dyn LlmProvider,
    index: &dyn RetrievalIndex,
    generation: &StreamOptions,
) -> AuditOutcome {
    if corpus.is_empty() {
        warn!("no matching source files, auditing an empty corpus");
    }

    let request = match compose(index, corpus).await {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "retrieval failed");
            return AuditOutcome::Failure(AuditFailure::retrieval(&e));
        }
    };

    let raw = match provider.complete(&request.into_messages(), generation).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, kind = e.error_kind(), "generation failed");
            return AuditOutcome::Failure(AuditFailure::generation(&e));
        }
    };

    match validate(&raw) {
        Ok(report) => {
            info!(
                tier = %report.tier(),
                actions = report.actions().len(),
                model = provider.model(),
                "scan complete"
            );
            AuditOutcome::Report(report)
        }
        Err(failure) => {
            warn!(error = %failure.error, raw_len = raw.len(), "model output failed validation");
            AuditOutcome::Failure(failure)
        }
    }
}
