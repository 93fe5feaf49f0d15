use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::models::LiteratureArticle;
use crate::sources::{get_json, http_client, LiteratureSource};

const SOURCE: &str = "pubmed";
const DEFAULT_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// NCBI eutils client: `esearch` for PMIDs, `esummary` for article
/// metadata, both in JSON mode.
pub struct PubMedSource {
    client: reqwest::Client,
    base_url: String,
}

impl PubMedSource {
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

impl Default for PubMedSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LiteratureSource for PubMedSource {
    async fn search_ids(&self, query: &str, max_results: usize) -> Result<Vec<String>> {
        let url = format!(
            "{}/esearch.fcgi?db=pubmed&term={}&retmax={}&retmode=json",
            self.base_url,
            urlencoding::encode(query),
            max_results
        );
        let body = get_json(&self.client, &url, SOURCE).await?;
        let ids = parse_id_list(&body)?;
        info!(query, count = ids.len(), "literature search completed");
        Ok(ids)
    }

    async fn fetch_summary(&self, id: &str) -> Result<LiteratureArticle> {
        let url = format!(
            "{}/esummary.fcgi?db=pubmed&id={}&retmode=json",
            self.base_url,
            urlencoding::encode(id)
        );
        let body = get_json(&self.client, &url, SOURCE).await?;
        parse_summary(&body, id)
    }
}

pub(crate) fn parse_id_list(body: &Value) -> Result<Vec<String>> {
    let ids = body
        .pointer("/esearchresult/idlist")
        .and_then(Value::as_array)
        .ok_or_else(|| PipelineError::malformed(SOURCE, "missing esearchresult.idlist"))?;
    Ok(ids
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect())
}

pub(crate) fn parse_summary(body: &Value, id: &str) -> Result<LiteratureArticle> {
    let record = body
        .pointer(&format!("/result/{id}"))
        .ok_or_else(|| PipelineError::malformed(SOURCE, format!("missing summary for {id}")))?;

    let title = record
        .get("title")
        .and_then(Value::as_str)
        .ok_or_else(|| PipelineError::malformed(SOURCE, format!("missing title for {id}")))?;

    Ok(LiteratureArticle {
        pmid: id.to_string(),
        title: title.to_string(),
        journal: record
            .get("fulljournalname")
            .and_then(Value::as_str)
            .map(str::to_string),
        summary: record
            .get("elocationid")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_list_parses_from_esearch_envelope() {
        let body = json!({
            "esearchresult": { "count": "2", "idlist": ["38881234", "38880001"] }
        });
        assert_eq!(parse_id_list(&body).unwrap(), vec!["38881234", "38880001"]);
    }

    #[test]
    fn missing_idlist_is_malformed() {
        let err = parse_id_list(&json!({ "esearchresult": {} })).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedResponse { .. }));
    }

    #[test]
    fn summary_parses_title_and_journal() {
        let body = json!({
            "result": {
                "uids": ["38881234"],
                "38881234": {
                    "title": "SGLT2 inhibition in older adults with type 2 diabetes",
                    "fulljournalname": "Diabetes Care"
                }
            }
        });
        let article = parse_summary(&body, "38881234").unwrap();
        assert_eq!(article.pmid, "38881234");
        assert_eq!(article.journal.as_deref(), Some("Diabetes Care"));
    }

    #[test]
    fn summary_without_title_is_malformed() {
        let body = json!({ "result": { "38881234": {} } });
        assert!(parse_summary(&body, "38881234").is_err());
    }
}
