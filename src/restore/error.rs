use thiserror::Error;

#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("backup disk not found: {0}")]
    DiskNotFound(String),

    #[error("no free loopback nbd device available")]
    AllocationExhausted,

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("mount error: {0}")]
    Mount(String),
}
