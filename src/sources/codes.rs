use async_trait::async_trait;
use serde_json::Value;

use crate::error::{PipelineError, Result};
use crate::sources::{get_json, http_client, CodeLookup};

const SOURCE: &str = "clinicaltables";
const DEFAULT_BASE_URL: &str = "https://clinicaltables.nlm.nih.gov/api/icd10cm/v3/search";

/// NLM clinical-tables ICD-10-CM lookup. The response is a positional JSON
/// array: `[total, [codes], null, [[code, name], ...]]`.
pub struct ClinicalTablesCodes {
    client: reqwest::Client,
    base_url: String,
}

impl ClinicalTablesCodes {
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

impl Default for ClinicalTablesCodes {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CodeLookup for ClinicalTablesCodes {
    async fn lookup(&self, text: &str) -> Result<Option<String>> {
        let url = format!(
            "{}?sf=code,name&terms={}",
            self.base_url,
            urlencoding::encode(text)
        );
        let body = get_json(&self.client, &url, SOURCE).await?;
        parse_first_code(&body)
    }
}

pub(crate) fn parse_first_code(body: &Value) -> Result<Option<String>> {
    let envelope = body
        .as_array()
        .ok_or_else(|| PipelineError::malformed(SOURCE, "response is not a positional array"))?;
    let codes = envelope
        .get(1)
        .and_then(Value::as_array)
        .ok_or_else(|| PipelineError::malformed(SOURCE, "missing code list"))?;
    Ok(codes
        .first()
        .and_then(Value::as_str)
        .map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_code_wins() {
        let body = json!([2, ["E11.9", "E11.8"], null, [["E11.9", "Type 2 diabetes mellitus without complications"]]]);
        assert_eq!(parse_first_code(&body).unwrap().as_deref(), Some("E11.9"));
    }

    #[test]
    fn no_match_yields_none() {
        let body = json!([0, [], null, []]);
        assert_eq!(parse_first_code(&body).unwrap(), None);
    }

    #[test]
    fn non_array_envelope_is_malformed() {
        assert!(parse_first_code(&json!({ "oops": 1 })).is_err());
    }
}
