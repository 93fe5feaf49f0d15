use async_trait::async_trait;

use crate::error::Result;

/// Text-embedding capability: one fixed-length float vector per input
/// string. All vectors produced by one implementation must share a length.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Local ONNX embedder backed by fastembed.
#[cfg(feature = "fastembed")]
pub struct FastembedEmbedder;

#[cfg(feature = "fastembed")]
#[async_trait]
impl Embedder for FastembedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        use crate::error::PipelineError;

        let input = text.to_owned();

        // Off-load the ONNX inference to a blocking thread so we don't
        // obstruct Tokio's async scheduler.
        let embedding = tokio::task::spawn_blocking(move || {
            use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

            let model = TextEmbedding::try_new(
                InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false),
            )?;
            let embeddings = model.embed(vec![input], None)?;
            embeddings
                .into_iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("model returned no embedding"))
        })
        .await
        .map_err(|e| PipelineError::external("fastembed", e.to_string()))?
        .map_err(|e: anyhow::Error| PipelineError::external("fastembed", e.to_string()))?;

        Ok(embedding)
    }
}
