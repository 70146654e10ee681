use thiserror::Error;

#[derive(Error, Debug)]
pub enum FailoverError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("cloud error: {0}")]
    Cloud(String),

    #[error("SNA error: {0}")]
    Sna(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("driver injection failed: {0}")]
    VirtioInjection(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),
}
