use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::ResponseCache;
use crate::config::PipelineConfig;
use crate::eligibility::EligibilityAssessor;
use crate::embedding::Embedder;
use crate::error::{PipelineError, Result};
use crate::models::{
    EligibilityAssessment, EligibilityStatus, LiteratureArticle, PatientProfile, PipelineReport,
    SearchPreferences, TrialCandidate, TrialStatus,
};
use crate::ratelimit::RateLimiter;
use crate::safety::DrugSafetyAnalyzer;
use crate::search::{TrialQuery, TrialSearchClient};
use crate::semantic::{SemanticMatcher, NCT_METADATA_KEY};
use crate::sources::{CodeLookup, DrugLabelSource, LiteratureSource, TrialRegistry};

const LITERATURE_SOURCE_NAME: &str = "pubmed";
const CODES_SOURCE_NAME: &str = "codes";
const DEFAULT_SEARCH_RADIUS_MILES: u32 = 50;

/// Sequences one patient through retrieval, scoring, the semantic
/// cross-check, safety screening, and assessment. External calls are issued
/// sequentially through the shared rate limiter; concurrent runs may share
/// one orchestrator because limiter, cache, and corpus state all sit behind
/// shared handles.
pub struct PipelineOrchestrator {
    search: TrialSearchClient,
    matcher: SemanticMatcher,
    safety: DrugSafetyAnalyzer,
    assessor: EligibilityAssessor,
    literature: Arc<dyn LiteratureSource>,
    codes: Arc<dyn CodeLookup>,
    limiter: RateLimiter,
    config: PipelineConfig,
}

impl PipelineOrchestrator {
    pub fn new(
        registry: Arc<dyn TrialRegistry>,
        literature: Arc<dyn LiteratureSource>,
        labels: Arc<dyn DrugLabelSource>,
        codes: Arc<dyn CodeLookup>,
        embedder: Arc<dyn Embedder>,
        config: PipelineConfig,
    ) -> Self {
        let limiter = RateLimiter::new();
        let cache = ResponseCache::new();
        Self {
            search: TrialSearchClient::new(registry, limiter.clone(), cache, &config),
            matcher: SemanticMatcher::new(embedder),
            safety: DrugSafetyAnalyzer::new(labels, limiter.clone(), config.label_rate_limit),
            assessor: EligibilityAssessor::new(
                config.eligible_threshold,
                config.potential_threshold,
            ),
            literature,
            codes,
            limiter,
            config,
        }
    }

    /// One full pipeline run. The only fatal outcomes are missing required
    /// inputs; every retrieval failure downstream degrades to partial data.
    pub async fn run(
        &self,
        profile: &PatientProfile,
        preferences: &SearchPreferences,
    ) -> Result<PipelineReport> {
        if profile.diagnosis.trim().is_empty() {
            return Err(PipelineError::MissingInput("patient diagnosis".into()));
        }
        if profile.age == 0 {
            return Err(PipelineError::MissingInput("positive patient age".into()));
        }

        let run_id = Uuid::new_v4();
        info!(%run_id, diagnosis = %profile.diagnosis, "pipeline run started");

        let diagnosis_code = self.resolve_diagnosis_code(profile).await;

        let outcome = self
            .search
            .search(profile, self.build_query(profile, preferences))
            .await;
        info!(
            candidates = outcome.candidates.len(),
            fallback = outcome.fallback_used,
            cache_hit = outcome.cache_hit,
            "candidate retrieval finished"
        );

        let similarities = self.semantic_cross_check(profile, &outcome.candidates).await;
        let literature = self.fetch_literature(profile, preferences).await;
        let safety = self.safety.analyze(profile).await;

        let mut assessments = Vec::with_capacity(outcome.candidates.len());
        for candidate in &outcome.candidates {
            let match_score = match similarities.get(&candidate.nct_id) {
                Some(similarity) => blend(
                    candidate.relevance_score,
                    *similarity,
                    self.config.semantic_blend,
                ),
                None => candidate.relevance_score,
            };
            assessments.push(self.assessor.assess(
                profile,
                candidate,
                match_score,
                &safety.interactions,
                &safety.flags,
            ));
        }

        let count = |status: EligibilityStatus| {
            assessments.iter().filter(|a| a.status == status).count()
        };
        let report = PipelineReport {
            run_id,
            diagnosis_code,
            total_assessed: assessments.len(),
            eligible_count: count(EligibilityStatus::Eligible),
            potentially_eligible_count: count(EligibilityStatus::PotentiallyEligible),
            ineligible_count: count(EligibilityStatus::Ineligible),
            requires_review_count: count(EligibilityStatus::RequiresReview),
            assessments,
            safety_concerns: safety.flags,
            interactions: safety.interactions,
            literature,
            fallback_used: outcome.fallback_used,
            // Per-run rate: this run issues one registry search, so it is
            // either fully served from cache or not at all. The cumulative
            // counter stays available on `ResponseCache::hit_rate`.
            cache_hit_rate: if outcome.cache_hit { 1.0 } else { 0.0 },
        };
        info!(
            %run_id,
            assessed = report.total_assessed,
            eligible = report.eligible_count,
            "pipeline run finished"
        );
        Ok(report)
    }

    /// Assess an externally supplied candidate list. An empty list is a
    /// missing required input and fails fast.
    pub async fn assess_candidates(
        &self,
        profile: &PatientProfile,
        candidates: &[TrialCandidate],
    ) -> Result<Vec<EligibilityAssessment>> {
        if candidates.is_empty() {
            return Err(PipelineError::MissingInput("candidate list".into()));
        }
        let safety = self.safety.analyze(profile).await;
        Ok(candidates
            .iter()
            .map(|c| {
                self.assessor.assess(
                    profile,
                    c,
                    c.relevance_score,
                    &safety.interactions,
                    &safety.flags,
                )
            })
            .collect())
    }

    fn build_query(&self, profile: &PatientProfile, preferences: &SearchPreferences) -> TrialQuery {
        let mut statuses = vec![
            TrialStatus::Recruiting,
            TrialStatus::ActiveNotRecruiting,
            TrialStatus::EnrollingByInvitation,
        ];
        if preferences.include_completed {
            statuses.push(TrialStatus::Completed);
        }
        let mut query = TrialQuery::new(profile.diagnosis.clone());
        query.secondary_conditions = profile.comorbidities.clone();
        query.age = Some(profile.age);
        query.statuses = statuses;
        query.location = profile.location.clone();
        query.radius_miles = Some(DEFAULT_SEARCH_RADIUS_MILES);
        query.max_results = preferences.max_candidates;
        query
    }

    async fn resolve_diagnosis_code(&self, profile: &PatientProfile) -> Option<String> {
        if profile.diagnosis_code.is_some() {
            return profile.diagnosis_code.clone();
        }
        self.limiter
            .wait_if_needed(CODES_SOURCE_NAME, self.config.code_rate_limit)
            .await;
        match self.codes.lookup(&profile.diagnosis).await {
            Ok(code) => code,
            Err(e) => {
                warn!(error = %e, "diagnosis code lookup failed, continuing without");
                None
            }
        }
    }

    /// Populate the corpus with each candidate's criteria text (idempotent
    /// by the dedupe rule) and query it with a profile summary. Failures
    /// here degrade to "no similarity" for the affected candidates.
    async fn semantic_cross_check(
        &self,
        profile: &PatientProfile,
        candidates: &[TrialCandidate],
    ) -> HashMap<String, f64> {
        for candidate in candidates {
            let text = candidate.criteria.combined_text();
            if text.is_empty() {
                continue;
            }
            let metadata = HashMap::from([(
                NCT_METADATA_KEY.to_string(),
                candidate.nct_id.clone(),
            )]);
            if let Err(e) = self
                .matcher
                .add_document(candidate.nct_id.clone(), text, metadata)
                .await
            {
                warn!(nct_id = %candidate.nct_id, error = %e, "corpus insert failed, skipping");
            }
        }

        let summary = profile_summary(profile);
        match self
            .matcher
            .search(
                &summary,
                candidates.len().max(1),
                self.config.semantic_threshold,
            )
            .await
        {
            Ok(hits) => hits.into_iter().map(|h| (h.id, h.similarity)).collect(),
            Err(e) => {
                warn!(error = %e, "semantic cross-check failed, proceeding without");
                HashMap::new()
            }
        }
    }

    /// Keyword search then one summary fetch per id, sequentially through
    /// the rate limiter. A failed id is skipped; a failed search yields no
    /// literature at all, which downstream treats as a valid outcome.
    async fn fetch_literature(
        &self,
        profile: &PatientProfile,
        preferences: &SearchPreferences,
    ) -> Vec<LiteratureArticle> {
        if preferences.literature_cap == 0 {
            return Vec::new();
        }
        self.limiter
            .wait_if_needed(LITERATURE_SOURCE_NAME, self.config.literature_rate_limit)
            .await;
        let ids = match self
            .literature
            .search_ids(&profile.diagnosis, preferences.literature_cap)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "literature search failed, continuing without");
                return Vec::new();
            }
        };

        let mut articles = Vec::new();
        for id in ids.iter().take(preferences.literature_cap) {
            self.limiter
                .wait_if_needed(LITERATURE_SOURCE_NAME, self.config.literature_rate_limit)
                .await;
            match self.literature.fetch_summary(id).await {
                Ok(article) => articles.push(article),
                Err(e) => warn!(pmid = %id, error = %e, "summary fetch failed, skipping"),
            }
        }
        articles
    }
}

fn blend(relevance: f64, similarity: f64, weight: f64) -> f64 {
    ((1.0 - weight) * relevance + weight * similarity).clamp(0.0, 1.0)
}

fn profile_summary(profile: &PatientProfile) -> String {
    let mut parts = vec![profile.diagnosis.clone()];
    parts.extend(profile.biomarkers.iter().cloned());
    parts.extend(profile.comorbidities.iter().cloned());
    parts.extend(profile.prior_treatments.iter().cloned());
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as CrateResult;
    use crate::models::EligibilityCriteria;
    use async_trait::async_trait;

    struct EmptyRegistry;

    #[async_trait]
    impl TrialRegistry for EmptyRegistry {
        async fn search(
            &self,
            _condition: &str,
            _location: Option<&str>,
            _max_results: usize,
        ) -> CrateResult<Vec<TrialCandidate>> {
            Ok(Vec::new())
        }
    }

    struct NoLiterature;

    #[async_trait]
    impl LiteratureSource for NoLiterature {
        async fn search_ids(&self, _query: &str, _max: usize) -> CrateResult<Vec<String>> {
            Ok(Vec::new())
        }
        async fn fetch_summary(&self, id: &str) -> CrateResult<LiteratureArticle> {
            Err(PipelineError::external("pubmed", format!("no summary {id}")))
        }
    }

    struct NoLabels;

    #[async_trait]
    impl DrugLabelSource for NoLabels {
        async fn fetch_label(&self, name: &str) -> CrateResult<crate::models::DrugLabel> {
            Err(PipelineError::external("openfda", format!("no label {name}")))
        }
    }

    struct NoCodes;

    #[async_trait]
    impl CodeLookup for NoCodes {
        async fn lookup(&self, _text: &str) -> CrateResult<Option<String>> {
            Ok(None)
        }
    }

    struct FlatEmbedder;

    #[async_trait]
    impl Embedder for FlatEmbedder {
        async fn embed(&self, _text: &str) -> CrateResult<Vec<f32>> {
            Ok(vec![1.0, 0.0, 0.0])
        }
    }

    fn orchestrator() -> PipelineOrchestrator {
        PipelineOrchestrator::new(
            Arc::new(EmptyRegistry),
            Arc::new(NoLiterature),
            Arc::new(NoLabels),
            Arc::new(NoCodes),
            Arc::new(FlatEmbedder),
            PipelineConfig::default(),
        )
    }

    #[tokio::test]
    async fn blank_diagnosis_is_fatal() {
        let profile = PatientProfile::new("   ", 40);
        let err = orchestrator()
            .run(&profile, &SearchPreferences::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput(_)));
    }

    #[tokio::test]
    async fn zero_age_is_fatal() {
        let profile = PatientProfile::new("Asthma", 0);
        let err = orchestrator()
            .run(&profile, &SearchPreferences::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput(_)));
    }

    #[tokio::test]
    async fn empty_retrieval_yields_empty_report_not_error() {
        let profile = PatientProfile::new("Asthma", 40);
        let report = orchestrator()
            .run(&profile, &SearchPreferences::default())
            .await
            .unwrap();
        assert_eq!(report.total_assessed, 0);
        assert!(report.assessments.is_empty());
    }

    #[tokio::test]
    async fn assess_candidates_requires_a_nonempty_list() {
        let profile = PatientProfile::new("Asthma", 40);
        let err = orchestrator()
            .assess_candidates(&profile, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput(_)));
    }

    #[tokio::test]
    async fn assess_candidates_covers_every_input() {
        let profile = PatientProfile::new("Type 2 Diabetes Mellitus", 55);
        let candidate = TrialCandidate {
            nct_id: "NCT1".into(),
            title: "T".into(),
            status: TrialStatus::Recruiting,
            phase: None,
            condition: "Type 2 Diabetes Mellitus".into(),
            criteria: EligibilityCriteria {
                inclusion: vec!["Adults with type 2 diabetes".into()],
                exclusion: vec![],
                minimum_age: Some("18 Years".into()),
                maximum_age: None,
                gender: None,
            },
            locations: vec![],
            relevance_score: 0.8,
        };
        let assessments = orchestrator()
            .assess_candidates(&profile, &[candidate])
            .await
            .unwrap();
        assert_eq!(assessments.len(), 1);
        assert_eq!(assessments[0].status, EligibilityStatus::Eligible);
    }

    #[tokio::test(start_paused = true)]
    async fn code_lookups_pass_through_the_shared_rate_limiter() {
        let mut config = PipelineConfig::default();
        config.code_rate_limit = 1;
        let orchestrator = PipelineOrchestrator::new(
            Arc::new(EmptyRegistry),
            Arc::new(NoLiterature),
            Arc::new(NoLabels),
            Arc::new(NoCodes),
            Arc::new(FlatEmbedder),
            config,
        );
        let profile = PatientProfile::new("Asthma", 40);
        let prefs = SearchPreferences::default();

        let start = tokio::time::Instant::now();
        orchestrator.run(&profile, &prefs).await.unwrap();
        orchestrator.run(&profile, &prefs).await.unwrap();
        // The second lookup must wait out the admission window; every other
        // source stays under its limit across both runs.
        assert!(start.elapsed() >= std::time::Duration::from_millis(900));
    }

    #[test]
    fn blend_stays_in_unit_interval() {
        assert_eq!(blend(1.0, 1.0, 0.3), 1.0);
        assert!((blend(0.8, 0.4, 0.5) - 0.6).abs() < 1e-9);
        assert_eq!(blend(0.0, 0.0, 0.3), 0.0);
    }
}
