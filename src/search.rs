use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::cache::ResponseCache;
use crate::config::PipelineConfig;
use crate::models::{PatientProfile, TrialCandidate, TrialStatus};
use crate::ratelimit::RateLimiter;
use crate::scoring::RelevanceScorer;
use crate::sources::TrialRegistry;
use crate::synonyms;

const REGISTRY_SOURCE_NAME: &str = "registry";
const MIN_RELEVANCE: f64 = 0.1;
const FALLBACK_TRIGGER_COUNT: usize = 3;
const FALLBACK_MAX_RESULTS: usize = 50;
const FALLBACK_MIN_RADIUS_MILES: u32 = 200;
const SCORE_TIE_EPSILON: f64 = 0.01;

/// Full parameter set for one registry search. Serialized canonically as
/// the cache key, so two differently phrased but equivalent queries are
/// distinct entries on purpose.
#[derive(Debug, Clone, Serialize)]
pub struct TrialQuery {
    pub condition: String,
    pub secondary_conditions: Vec<String>,
    pub age: Option<u32>,
    pub statuses: Vec<TrialStatus>,
    pub location: Option<String>,
    pub radius_miles: Option<u32>,
    pub gender: Option<String>,
    pub phase: Option<String>,
    pub max_results: usize,
    #[serde(skip)]
    pub is_fallback: bool,
}

impl TrialQuery {
    pub fn new(condition: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            secondary_conditions: Vec::new(),
            age: None,
            statuses: Vec::new(),
            location: None,
            radius_miles: None,
            gender: None,
            phase: None,
            max_results: 10,
            is_fallback: false,
        }
    }

    /// Broadened variant for the single fallback attempt: bigger cap, no
    /// phase/age/gender constraints, wider radius, every status accepted.
    fn broadened(&self) -> Self {
        Self {
            condition: self.condition.clone(),
            secondary_conditions: self.secondary_conditions.clone(),
            age: None,
            statuses: TrialStatus::ALL.to_vec(),
            location: self.location.clone(),
            radius_miles: Some(
                self.radius_miles
                    .unwrap_or(0)
                    .max(FALLBACK_MIN_RADIUS_MILES),
            ),
            gender: None,
            phase: None,
            max_results: (self.max_results * 2).min(FALLBACK_MAX_RESULTS),
            is_fallback: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub candidates: Vec<TrialCandidate>,
    pub fallback_used: bool,
    pub cache_hit: bool,
}

/// Builds and executes registry queries: synonym expansion upstream,
/// everything the registry cannot filter (age, gender, phase, status)
/// applied locally, with one broadened fallback when the first pass comes
/// back thin.
pub struct TrialSearchClient {
    registry: Arc<dyn TrialRegistry>,
    limiter: RateLimiter,
    cache: ResponseCache<Vec<TrialCandidate>>,
    scorer: RelevanceScorer,
    rate_limit: usize,
    cache_ttl: Duration,
    fallback_timeout: Duration,
}

impl TrialSearchClient {
    pub fn new(
        registry: Arc<dyn TrialRegistry>,
        limiter: RateLimiter,
        cache: ResponseCache<Vec<TrialCandidate>>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            registry,
            limiter,
            cache,
            scorer: RelevanceScorer::new(),
            rate_limit: config.registry_rate_limit,
            cache_ttl: config.cache_ttl,
            fallback_timeout: config.fallback_timeout,
        }
    }

    pub async fn search(&self, profile: &PatientProfile, query: TrialQuery) -> SearchOutcome {
        let cache_key = match serde_json::to_string(&query) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "query not serializable, bypassing cache");
                String::new()
            }
        };

        if !cache_key.is_empty() {
            if let Some(candidates) = self.cache.get(&cache_key, self.cache_ttl) {
                info!(condition = %query.condition, "search served from cache");
                return SearchOutcome {
                    candidates,
                    fallback_used: false,
                    cache_hit: true,
                };
            }
        }

        let mut candidates = self.execute(&query).await;
        let mut fallback_used = false;
        // Ranking must honor the constraints of whichever query actually
        // produced the candidates.
        let mut effective_query = &query;
        let broadened;

        if candidates.len() < FALLBACK_TRIGGER_COUNT && !query.is_fallback {
            broadened = query.broadened();
            info!(
                initial = candidates.len(),
                "thin result set, issuing broadened fallback query"
            );
            let fallback = match timeout(self.fallback_timeout, self.execute(&broadened)).await {
                Ok(results) => results,
                Err(_) => {
                    warn!("fallback query timed out, keeping original results");
                    Vec::new()
                }
            };
            // The fallback replaces the original only when it strictly
            // produced more.
            if fallback.len() > candidates.len() {
                candidates = fallback;
                fallback_used = true;
                effective_query = &broadened;
            }
        }

        let ranked = self.rank(profile, effective_query, candidates);
        if !cache_key.is_empty() {
            self.cache.set(cache_key, ranked.clone());
        }
        SearchOutcome {
            candidates: ranked,
            fallback_used,
            cache_hit: false,
        }
    }

    /// One rate-limited registry call; upstream failure degrades to an
    /// empty result rather than propagating.
    async fn execute(&self, query: &TrialQuery) -> Vec<TrialCandidate> {
        // The registry takes one free-text condition filter, so secondary
        // conditions ride along as extra OR terms.
        let mut terms = synonyms::expand_condition(&query.condition);
        for extra in &query.secondary_conditions {
            if !terms.iter().any(|t| t.eq_ignore_ascii_case(extra)) {
                terms.push(extra.clone());
            }
        }
        let condition = terms.join(" OR ");

        self.limiter
            .wait_if_needed(REGISTRY_SOURCE_NAME, self.rate_limit)
            .await;
        match self
            .registry
            .search(&condition, query.location.as_deref(), query.max_results)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, condition = %query.condition, "registry search failed, degrading to empty");
                Vec::new()
            }
        }
    }

    /// Local post-filter and ranking: status/gender/phase constraints the
    /// registry never saw, then relevance scoring with a floor, then sort
    /// by score with the status-priority tiebreak.
    fn rank(
        &self,
        profile: &PatientProfile,
        query: &TrialQuery,
        candidates: Vec<TrialCandidate>,
    ) -> Vec<TrialCandidate> {
        let mut scored: Vec<TrialCandidate> = candidates
            .into_iter()
            .filter(|c| query.statuses.is_empty() || query.statuses.contains(&c.status))
            .filter(|c| gender_accepts(query.gender.as_deref(), c.criteria.gender.as_deref()))
            .filter(|c| phase_accepts(query.phase.as_deref(), c.phase.as_deref()))
            .map(|mut c| {
                c.relevance_score = self.scorer.score(profile, &c);
                c
            })
            .filter(|c| c.relevance_score >= MIN_RELEVANCE)
            .collect();

        scored.sort_by(|a, b| {
            if (a.relevance_score - b.relevance_score).abs() < SCORE_TIE_EPSILON {
                a.status.rank_priority().cmp(&b.status.rank_priority())
            } else {
                b.relevance_score
                    .partial_cmp(&a.relevance_score)
                    .unwrap_or(Ordering::Equal)
            }
        });
        scored.truncate(query.max_results);
        scored
    }
}

fn gender_accepts(requested: Option<&str>, trial: Option<&str>) -> bool {
    match (requested, trial) {
        (Some(requested), Some(trial)) => {
            let trial = trial.to_lowercase();
            trial == "all" || trial.is_empty() || trial == requested.to_lowercase()
        }
        _ => true,
    }
}

fn phase_accepts(requested: Option<&str>, trial: Option<&str>) -> bool {
    match (requested, trial) {
        (Some(requested), Some(trial)) => trial
            .to_lowercase()
            .contains(&requested.to_lowercase()),
        (Some(_), None) => false,
        _ => true,
    }
}
