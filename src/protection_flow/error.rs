use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("flow not found: {0}")]
    NotFound(String),

    #[error("invalid schedule expression: {0}")]
    InvalidSchedule(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("no targets resolved for flow {0}")]
    NoTargets(String),
}
