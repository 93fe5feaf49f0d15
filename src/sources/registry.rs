use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::models::{EligibilityCriteria, TrialCandidate, TrialLocation, TrialStatus};
use crate::sources::{get_json, http_client, require_str, TrialRegistry};

const SOURCE: &str = "clinicaltrials.gov";
const DEFAULT_BASE_URL: &str = "https://clinicaltrials.gov/api/v2";

/// ClinicalTrials.gov v2 `studies` client.
pub struct CtGovRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl CtGovRegistry {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.into(),
        }
    }
}

impl Default for CtGovRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrialRegistry for CtGovRegistry {
    async fn search(
        &self,
        condition: &str,
        location: Option<&str>,
        max_results: usize,
    ) -> Result<Vec<TrialCandidate>> {
        let mut url = format!(
            "{}/studies?query.cond={}&pageSize={}",
            self.base_url,
            urlencoding::encode(condition),
            max_results
        );
        if let Some(location) = location {
            url.push_str(&format!("&query.locn={}", urlencoding::encode(location)));
        }

        let body = get_json(&self.client, &url, SOURCE).await?;
        let candidates = parse_studies(&body)?;
        info!(
            condition,
            count = candidates.len(),
            "registry search completed"
        );
        Ok(candidates)
    }
}

/// Validating mapping from the untyped response envelope. A missing
/// `studies` array is a malformed envelope; a single malformed study is
/// logged and skipped so the rest of the batch survives.
pub(crate) fn parse_studies(body: &Value) -> Result<Vec<TrialCandidate>> {
    let studies = body
        .get("studies")
        .and_then(Value::as_array)
        .ok_or_else(|| PipelineError::malformed(SOURCE, "missing studies array"))?;

    let mut candidates = Vec::with_capacity(studies.len());
    for study in studies {
        match parse_study(study) {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => warn!(error = %e, "skipping malformed study record"),
        }
    }
    Ok(candidates)
}

fn parse_study(study: &Value) -> Result<TrialCandidate> {
    let nct_id = require_str(study, "/protocolSection/identificationModule/nctId", SOURCE)?;
    let title = study
        .pointer("/protocolSection/identificationModule/briefTitle")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let status_str = require_str(study, "/protocolSection/statusModule/overallStatus", SOURCE)?;
    let status = TrialStatus::parse(status_str)
        .ok_or_else(|| PipelineError::malformed(SOURCE, format!("unknown status {status_str}")))?;

    let condition = study
        .pointer("/protocolSection/conditionsModule/conditions")
        .and_then(Value::as_array)
        .map(|conditions| {
            conditions
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();

    let phase = study
        .pointer("/protocolSection/designModule/phases")
        .and_then(Value::as_array)
        .map(|phases| {
            phases
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .filter(|p| !p.is_empty());

    let eligibility = study.pointer("/protocolSection/eligibilityModule");
    let criteria_text = eligibility
        .and_then(|e| e.get("eligibilityCriteria"))
        .and_then(Value::as_str)
        .unwrap_or("");
    let (inclusion, exclusion) = split_criteria(criteria_text);
    let criteria = EligibilityCriteria {
        inclusion,
        exclusion,
        minimum_age: eligibility
            .and_then(|e| e.get("minimumAge"))
            .and_then(Value::as_str)
            .map(str::to_string),
        maximum_age: eligibility
            .and_then(|e| e.get("maximumAge"))
            .and_then(Value::as_str)
            .map(str::to_string),
        gender: eligibility
            .and_then(|e| e.get("sex"))
            .and_then(Value::as_str)
            .map(str::to_string),
    };

    let locations = study
        .pointer("/protocolSection/contactsLocationsModule/locations")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().map(parse_location).collect())
        .unwrap_or_default();

    Ok(TrialCandidate {
        nct_id: nct_id.to_string(),
        title,
        status,
        phase,
        condition,
        criteria,
        locations,
        relevance_score: 0.0,
    })
}

fn parse_location(entry: &Value) -> TrialLocation {
    let field = |key: &str| {
        entry
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    TrialLocation {
        facility: field("facility"),
        city: field("city"),
        state: field("state"),
        country: field("country"),
    }
}

/// Split registry criteria free text into inclusion and exclusion lines.
/// The upstream convention is two headed sections with bulleted entries.
pub(crate) fn split_criteria(text: &str) -> (Vec<String>, Vec<String>) {
    #[derive(PartialEq)]
    enum Section {
        None,
        Inclusion,
        Exclusion,
    }

    let mut section = Section::None;
    let mut inclusion = Vec::new();
    let mut exclusion = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let lower = trimmed.to_lowercase();
        if lower.contains("inclusion criteria") {
            section = Section::Inclusion;
            continue;
        }
        if lower.contains("exclusion criteria") {
            section = Section::Exclusion;
            continue;
        }

        let entry = trimmed
            .trim_start_matches(['*', '-', '•'])
            .trim()
            .to_string();
        if entry.is_empty() {
            continue;
        }
        match section {
            Section::Inclusion => inclusion.push(entry),
            Section::Exclusion => exclusion.push(entry),
            Section::None => {}
        }
    }

    (inclusion, exclusion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn study_json(nct_id: &str, status: &str) -> Value {
        json!({
            "protocolSection": {
                "identificationModule": { "nctId": nct_id, "briefTitle": "Metformin Extension Study" },
                "statusModule": { "overallStatus": status },
                "conditionsModule": { "conditions": ["Type 2 Diabetes Mellitus"] },
                "designModule": { "phases": ["PHASE3"] },
                "eligibilityModule": {
                    "eligibilityCriteria": "Inclusion Criteria:\n* Diagnosed type 2 diabetes\n* HbA1c above 7%\n\nExclusion Criteria:\n* Pregnancy\n* Severe renal impairment",
                    "minimumAge": "18 Years",
                    "maximumAge": "75 Years",
                    "sex": "ALL"
                },
                "contactsLocationsModule": {
                    "locations": [
                        { "facility": "Emory Clinic", "city": "Atlanta", "state": "Georgia", "country": "United States" }
                    ]
                }
            }
        })
    }

    #[test]
    fn parses_well_formed_study() {
        let body = json!({ "studies": [study_json("NCT01234567", "RECRUITING")] });
        let candidates = parse_studies(&body).unwrap();
        assert_eq!(candidates.len(), 1);

        let c = &candidates[0];
        assert_eq!(c.nct_id, "NCT01234567");
        assert_eq!(c.status, TrialStatus::Recruiting);
        assert_eq!(c.criteria.inclusion.len(), 2);
        assert_eq!(c.criteria.exclusion, vec!["Pregnancy", "Severe renal impairment"]);
        assert_eq!(c.criteria.minimum_age.as_deref(), Some("18 Years"));
        assert_eq!(c.locations[0].state.as_deref(), Some("Georgia"));
    }

    #[test]
    fn malformed_study_is_skipped_not_fatal() {
        let body = json!({
            "studies": [
                study_json("NCT01234567", "RECRUITING"),
                { "protocolSection": { "identificationModule": {} } },
                study_json("NCT07654321", "NOT_A_STATUS"),
            ]
        });
        let candidates = parse_studies(&body).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].nct_id, "NCT01234567");
    }

    #[test]
    fn missing_envelope_is_malformed() {
        let err = parse_studies(&json!({ "unexpected": true })).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MalformedResponse { .. }
        ));
    }

    #[test]
    fn criteria_split_honors_section_headers() {
        let (inclusion, exclusion) = split_criteria(
            "Inclusion Criteria:\n* Age over 18\n- Stable dose\nExclusion Criteria:\n* Dialysis",
        );
        assert_eq!(inclusion, vec!["Age over 18", "Stable dose"]);
        assert_eq!(exclusion, vec!["Dialysis"]);
    }

    #[test]
    fn criteria_split_without_headers_is_empty() {
        let (inclusion, exclusion) = split_criteria("free text with no sections");
        assert!(inclusion.is_empty());
        assert!(exclusion.is_empty());
    }
}
