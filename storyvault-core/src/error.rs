//! Error taxonomy for content versioning operations

use crate::revision::ProjectId;

/// Result type for content operations
pub type Result<T> = std::result::Result<T, ContentError>;

/// Errors that can occur while reading or mutating story content
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    /// Project lookup failed, or the project is not owned by the caller
    #[error("Project {0} not found or access denied")]
    NotFoundOrForbidden(ProjectId),

    /// Mutation attempted without an active revision and no way to create one
    #[error("Project {0} has no active revision")]
    NoActiveRevision(ProjectId),

    #[error("No content to version for project {0}")]
    NoContentToVersion(ProjectId),

    #[error("Version {version} not found for project {project}")]
    VersionNotFound { project: ProjectId, version: u32 },

    /// Persistence layer failure
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Zero or multiple active revisions observed where exactly one was expected
    #[error("Project {project} has {active} active revisions")]
    ConcurrencyViolation { project: ProjectId, active: usize },

    /// The project's writer stopped before answering
    #[error("Writer for project {0} closed")]
    WriterClosed(ProjectId),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ContentError {
    /// Transient store failures are the only errors worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ContentError::StoreUnavailable(_))
    }

    /// Errors caused by the request rather than by the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ContentError::NotFoundOrForbidden(_)
                | ContentError::NoActiveRevision(_)
                | ContentError::NoContentToVersion(_)
                | ContentError::VersionNotFound { .. }
                | ContentError::InvalidInput(_)
        )
    }
}

impl From<rusqlite::Error> for ContentError {
    fn from(e: rusqlite::Error) -> Self {
        ContentError::StoreUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for ContentError {
    fn from(e: serde_json::Error) -> Self {
        ContentError::InvalidInput(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(ContentError::StoreUnavailable("down".into()).is_retryable());
        assert!(!ContentError::StoreUnavailable("down".into()).is_client_error());
        assert!(ContentError::VersionNotFound { project: 1, version: 3 }.is_client_error());
        assert!(!ContentError::NoContentToVersion(1).is_retryable());
        assert!(!ContentError::ConcurrencyViolation { project: 1, active: 2 }.is_client_error());
    }

    #[test]
    fn test_messages() {
        let e = ContentError::VersionNotFound { project: 7, version: 2 };
        assert_eq!(e.to_string(), "Version 2 not found for project 7");
        assert_eq!(
            ContentError::NotFoundOrForbidden(4).to_string(),
            "Project 4 not found or access denied"
        );
    }
}
