use thiserror::Error;

/// Failures scoped to a single record or a single source. None of them abort a
/// whole build run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed coordinate '{text}': {reason}")]
    MalformedCoordinate { text: String, reason: &'static str },
    #[error("malformed table for source '{source_name}': {details}")]
    MalformedTable {
        source_name: String,
        details: String,
    },
    #[error("no usable dated artifact found on index {index_url} (marker '{marker}')")]
    NoCandidateArtifact { index_url: String, marker: String },
    #[error("retrieval of {url} failed with status {status}")]
    RetrievalFailure { url: String, status: u16 },
    #[error("archive entry '{entry}' could not be read: {reason}")]
    Archive { entry: String, reason: String },
}

impl IngestError {
    pub(crate) fn malformed_coordinate(text: &str, reason: &'static str) -> Self {
        Self::MalformedCoordinate {
            text: text.to_string(),
            reason,
        }
    }

    pub(crate) fn malformed_table(source_name: &str, details: impl Into<String>) -> Self {
        Self::MalformedTable {
            source_name: source_name.to_string(),
            details: details.into(),
        }
    }
}
