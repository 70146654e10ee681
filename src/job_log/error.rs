use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobLogError {
    #[error("job log entry not found: {0}")]
    NotFound(String),

    #[error("job log persistence error: {0}")]
    Persistence(String),
}
