use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("backup persistence error: {0}")]
    Persistence(String),

    #[error("data mover error: {0}")]
    DataMover(String),
}
