use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("cloud snapshot error: {0}")]
    Cloud(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("every volume snapshot failed for context {0}")]
    TotalFailure(String),
}
