use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::embedding::Embedder;
use crate::error::{PipelineError, Result};
use crate::models::VectorDocument;

/// Metadata key carrying the external trial identifier; part of the dedupe
/// rule.
pub const NCT_METADATA_KEY: &str = "nct_id";

/// One search hit from the semantic corpus.
#[derive(Debug, Clone)]
pub struct SemanticHit {
    pub id: String,
    pub similarity: f64,
    pub metadata: HashMap<String, String>,
}

struct Corpus {
    documents: Vec<VectorDocument>,
    ids: HashSet<String>,
}

/// Append-mostly, deduplicated corpus of trial-criteria documents with
/// brute-force cosine search.
///
/// The linear scan is the point: no index to maintain, exact results,
/// suitable up to a few thousand documents. Past that an ANN index would be
/// needed, which this corpus does not justify.
#[derive(Clone)]
pub struct SemanticMatcher {
    embedder: Arc<dyn Embedder>,
    corpus: Arc<Mutex<Corpus>>,
}

impl SemanticMatcher {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            corpus: Arc::new(Mutex::new(Corpus {
                documents: Vec::new(),
                ids: HashSet::new(),
            })),
        }
    }

    /// Add a document unless a duplicate already exists: same id, identical
    /// content, or same trial identifier in metadata. Duplicates are silent
    /// no-ops (first insert wins, also under concurrent insertion), so the
    /// population step is idempotent and safe to re-run. Returns whether
    /// the document was inserted.
    pub async fn add_document(
        &self,
        id: impl Into<String>,
        content: impl Into<String>,
        metadata: HashMap<String, String>,
    ) -> Result<bool> {
        let id = id.into();
        let content = content.into();

        {
            let corpus = self.corpus.lock().await;
            if is_duplicate(&corpus, &id, &content, &metadata) {
                debug!(%id, "duplicate document, skipping");
                return Ok(false);
            }
        }

        let embedding = self.embedder.embed(&content).await?;

        // The embedding call suspended; a concurrent insert may have won
        // the race, so the dedupe check runs again under the lock.
        let mut corpus = self.corpus.lock().await;
        if is_duplicate(&corpus, &id, &content, &metadata) {
            debug!(%id, "duplicate document inserted concurrently, skipping");
            return Ok(false);
        }
        corpus.ids.insert(id.clone());
        corpus.documents.push(VectorDocument {
            id,
            content,
            metadata,
            embedding,
            created_at: Utc::now(),
        });
        Ok(true)
    }

    /// Embed the query and linearly scan every stored embedding; hits with
    /// cosine similarity at or above `threshold`, top `limit` by similarity
    /// descending.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<SemanticHit>> {
        let query_embedding = self.embedder.embed(query).await?;

        let corpus = self.corpus.lock().await;
        let mut hits = Vec::new();
        for document in &corpus.documents {
            let similarity = cosine_similarity(&query_embedding, &document.embedding)?;
            if similarity >= threshold {
                hits.push(SemanticHit {
                    id: document.id.clone(),
                    similarity,
                    metadata: document.metadata.clone(),
                });
            }
        }
        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        info!(query_len = query.len(), hits = hits.len(), "semantic search completed");
        Ok(hits)
    }

    pub async fn len(&self) -> usize {
        self.corpus.lock().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn is_duplicate(corpus: &Corpus, id: &str, content: &str, metadata: &HashMap<String, String>) -> bool {
    if corpus.ids.contains(id) {
        return true;
    }
    if corpus.documents.iter().any(|d| d.content == content) {
        return true;
    }
    if let Some(nct) = metadata.get(NCT_METADATA_KEY) {
        return corpus
            .documents
            .iter()
            .any(|d| d.metadata.get(NCT_METADATA_KEY) == Some(nct));
    }
    false
}

/// Cosine similarity clamped into [0,1]; vectors must share a length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(PipelineError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0))
}
