use thiserror::Error;

#[derive(Error, Debug)]
pub enum NbdError {
    #[error("failed to write export fragment: {0}")]
    FragmentWrite(String),

    #[error("failed to reload nbd server: {0}")]
    Reload(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
