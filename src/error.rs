use thiserror::Error;

/// Errors surfaced by the matching pipeline.
///
/// Only `MissingInput` is allowed to escape a pipeline run; everything else is
/// either absorbed as a degraded (empty) result by the retrieval layer or
/// logged and skipped inside its batch.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing required input: {0}")]
    MissingInput(String),

    // The upstream name is plain context, not a wrapped error, so the
    // field must not be called `source` or thiserror claims it for
    // `Error::source()`.
    #[error("malformed response from {origin}: {detail}")]
    MalformedResponse { origin: String, detail: String },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("external call to {origin} failed: {detail}")]
    External { origin: String, detail: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl PipelineError {
    pub fn malformed(origin: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::MalformedResponse {
            origin: origin.into(),
            detail: detail.into(),
        }
    }

    pub fn external(origin: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::External {
            origin: origin.into(),
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn context_fields_render_without_claiming_a_cause() {
        let err = PipelineError::malformed("registry", "missing field /studies");
        assert_eq!(
            err.to_string(),
            "malformed response from registry: missing field /studies"
        );
        assert!(err.source().is_none());

        let err = PipelineError::external("openfda", "HTTP 500");
        assert_eq!(err.to_string(), "external call to openfda failed: HTTP 500");
        assert!(err.source().is_none());
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
