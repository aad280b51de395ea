use bigcol_core::BigColError;

pub type CollectiveResult<T> = std::result::Result<T, CollectiveError>;

#[derive(Debug, thiserror::Error)]
pub enum CollectiveError {
    #[error(transparent)]
    Core(#[from] BigColError),
    #[error("Ranks disagree on {what}: {values:?}")]
    InconsistentArgument { what: String, values: Vec<String> },
    #[error("Collective {operation} of '{name}' failed on ranks {failed_ranks:?}: {}", reasons.join("; "))]
    CollectiveFailure {
        operation: String,
        name: String,
        failed_ranks: Vec<usize>,
        reasons: Vec<String>,
    },
    #[error("Communicator error: {0}")]
    Communicator(String),
    #[error("Failed to exchange value between ranks: {0}")]
    Serialization(#[from] serde_json::Error),
}
