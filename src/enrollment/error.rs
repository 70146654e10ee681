use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrollmentError {
    #[error("no enrollment found for that pairing code")]
    UnknownPairingCode,

    #[error("pairing code expired")]
    Expired,

    #[error("pairing code already claimed by an SNA")]
    AlreadyClaimed,

    #[error("enrollment not found: {0}")]
    NotFound(String),

    #[error("enrollment {0} is not pending approval")]
    NotPending(String),

    #[error("enrollment {0} is not approved")]
    NotApproved(String),

    #[error("persistence error: {0}")]
    Persistence(String),
}
