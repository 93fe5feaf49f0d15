use std::time::Duration;

/// Tunables for one pipeline instance. Constructed by the caller and
/// injected; there is no global configuration or environment loading here.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Registry calls admitted per second.
    pub registry_rate_limit: usize,
    /// Literature (eutils) calls admitted per second.
    pub literature_rate_limit: usize,
    /// Drug-label calls admitted per second.
    pub label_rate_limit: usize,
    /// Diagnosis-code lookups admitted per second.
    pub code_rate_limit: usize,
    /// Freshness window for cached search results.
    pub cache_ttl: Duration,
    /// Upper bound on the single broadened fallback search.
    pub fallback_timeout: Duration,
    /// Minimum match score for ELIGIBLE.
    pub eligible_threshold: f64,
    /// Minimum match score for POTENTIALLY_ELIGIBLE.
    pub potential_threshold: f64,
    /// Minimum cosine similarity retained by the semantic cross-check.
    pub semantic_threshold: f64,
    /// Weight of semantic similarity when blending into the match score.
    pub semantic_blend: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            registry_rate_limit: 5,
            literature_rate_limit: 3,
            label_rate_limit: 4,
            code_rate_limit: 3,
            cache_ttl: Duration::from_secs(300),
            fallback_timeout: Duration::from_secs(30),
            eligible_threshold: 0.7,
            potential_threshold: 0.4,
            semantic_threshold: 0.35,
            semantic_blend: 0.3,
        }
    }
}
