//! External collaborator seams and their HTTP implementations.
//!
//! The traits here are what the pipeline depends on; the submodules provide
//! clients for the public endpoints (ClinicalTrials.gov, NCBI eutils,
//! openFDA, NLM clinical tables). Wire formats are owned upstream, so every
//! client maps untyped JSON into internal records through a validating step
//! and fails with a structured parse error on shape mismatch.

mod codes;
mod labels;
mod literature;
mod registry;

pub use codes::ClinicalTablesCodes;
pub use labels::OpenFdaLabels;
pub use literature::PubMedSource;
pub use registry::CtGovRegistry;

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

use crate::error::{PipelineError, Result};
use crate::models::{DrugLabel, LiteratureArticle, TrialCandidate};

/// Trial-registry search. The upstream accepts exactly two filters:
/// free-text condition and free-text location. Everything else is applied
/// locally by the caller.
#[async_trait]
pub trait TrialRegistry: Send + Sync {
    async fn search(
        &self,
        condition: &str,
        location: Option<&str>,
        max_results: usize,
    ) -> Result<Vec<TrialCandidate>>;
}

/// Keyword literature search plus per-id summary fetch.
#[async_trait]
pub trait LiteratureSource: Send + Sync {
    async fn search_ids(&self, query: &str, max_results: usize) -> Result<Vec<String>>;
    async fn fetch_summary(&self, id: &str) -> Result<LiteratureArticle>;
}

/// Drug-label lookup by brand or generic name.
#[async_trait]
pub trait DrugLabelSource: Send + Sync {
    async fn fetch_label(&self, name: &str) -> Result<DrugLabel>;
}

/// Free-text diagnosis to code resolution.
#[async_trait]
pub trait CodeLookup: Send + Sync {
    async fn lookup(&self, text: &str) -> Result<Option<String>>;
}

/// Default per-call timeout for single upstream requests.
pub(crate) const CALL_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(CALL_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Backoff before retrying a throttled call. `Some` only on a 429 whose
/// single retry has not been spent yet; the delay honors a numeric
/// Retry-After header and defaults to one second without one.
pub(crate) fn throttle_backoff(
    status: reqwest::StatusCode,
    retry_after: Option<&str>,
    retried: bool,
) -> Option<Duration> {
    if retried || status != reqwest::StatusCode::TOO_MANY_REQUESTS {
        return None;
    }
    let secs = retry_after.and_then(|s| s.parse::<u64>().ok()).unwrap_or(1);
    Some(Duration::from_secs(secs))
}

/// Issue a GET and decode the body as JSON. An upstream 429 is always
/// transient: wait and retry exactly once; a second 429 falls through to
/// the ordinary non-success error.
pub(crate) async fn get_json(client: &reqwest::Client, url: &str, source: &str) -> Result<Value> {
    let mut retried = false;
    loop {
        let response = client.get(url).send().await?;

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        if let Some(wait) = throttle_backoff(response.status(), retry_after.as_deref(), retried) {
            warn!(%source, wait_secs = wait.as_secs(), "rate limited upstream, retrying once");
            tokio::time::sleep(wait).await;
            retried = true;
            continue;
        }

        if !response.status().is_success() {
            return Err(PipelineError::external(
                source,
                format!("HTTP {}", response.status()),
            ));
        }

        return response
            .json::<Value>()
            .await
            .map_err(|e| PipelineError::malformed(source, e.to_string()));
    }
}

/// Required string field accessor for validating JSON mapping.
pub(crate) fn require_str<'a>(value: &'a Value, pointer: &str, source: &str) -> Result<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| PipelineError::malformed(source, format!("missing field {pointer}")))
}
