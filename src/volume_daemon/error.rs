use thiserror::Error;

#[derive(Error, Debug)]
pub enum VolumeDaemonError {
    #[error("cloud error: {0}")]
    Cloud(String),

    #[error("device correlation timed out after attach")]
    CorrelationTimeout,

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("nbd export error: {0}")]
    Nbd(String),

    #[error("operation {0} not found")]
    OperationNotFound(String),

    #[error("timed out waiting for operation {0} to complete")]
    WaitTimeout(String),
}
