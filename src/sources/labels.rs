use async_trait::async_trait;
use serde_json::Value;

use crate::error::{PipelineError, Result};
use crate::models::DrugLabel;
use crate::sources::{get_json, http_client, DrugLabelSource};

const SOURCE: &str = "openfda";
const DEFAULT_BASE_URL: &str = "https://api.fda.gov/drug/label.json";

/// openFDA structured-product-label client.
pub struct OpenFdaLabels {
    client: reqwest::Client,
    base_url: String,
}

impl OpenFdaLabels {
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

impl Default for OpenFdaLabels {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DrugLabelSource for OpenFdaLabels {
    async fn fetch_label(&self, name: &str) -> Result<DrugLabel> {
        let quoted = format!("\"{name}\"");
        let url = format!(
            "{}?search=openfda.brand_name:{q}+openfda.generic_name:{q}&limit=1",
            self.base_url,
            q = urlencoding::encode(&quoted)
        );
        let body = get_json(&self.client, &url, SOURCE).await?;
        parse_label(&body, name)
    }
}

/// Label sections arrive as arrays of free-text blocks; joined into one
/// string per section for downstream substring scanning.
pub(crate) fn parse_label(body: &Value, name: &str) -> Result<DrugLabel> {
    let record = body
        .pointer("/results/0")
        .ok_or_else(|| PipelineError::malformed(SOURCE, format!("no label found for {name}")))?;

    let section = |key: &str| {
        record
            .get(key)
            .and_then(Value::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default()
    };

    Ok(DrugLabel {
        name: name.to_string(),
        interactions: section("drug_interactions"),
        contraindications: section("contraindications"),
        warnings: section("warnings"),
    })
}
