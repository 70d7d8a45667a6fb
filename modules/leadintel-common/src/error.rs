use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Repository error: {0}")]
    Repository(#[source] anyhow::Error),

    #[error("Delivery via {channel} failed: {message}")]
    Delivery { channel: String, message: String },

    #[error("Sync to {system} failed: {message}")]
    Sync { system: String, message: String },

    #[error("Concurrent modification of {entity}: gave up after {attempts} attempts")]
    Conflict { entity: &'static str, attempts: u32 },

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

impl PipelineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True for failures of the persistence boundary itself.
    pub fn is_repository(&self) -> bool {
        matches!(self, Self::Repository(_))
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Wraps port-level `anyhow` failures as `PipelineError::Repository`.
pub trait RepoResultExt<T> {
    fn repo(self) -> PipelineResult<T>;
}

impl<T> RepoResultExt<T> for anyhow::Result<T> {
    fn repo(self) -> PipelineResult<T> {
        self.map_err(PipelineError::Repository)
    }
}
