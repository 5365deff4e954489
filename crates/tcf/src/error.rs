use thiserror::Error;

#[derive(Debug, Error)]
pub enum TcfError {
    #[error("invalid character '{character}' at offset {offset}")]
    InvalidCharacter { character: char, offset: usize },
    #[error("segment truncated reading {field}: need {needed} bits, have {available}")]
    Truncated { field: &'static str, needed: usize, available: usize },
    #[error("unsupported TC string version {0}")]
    UnsupportedVersion(u64),
    #[error("consent entrypoint is locked by another script")]
    EntrypointLocked,
    #[error("page host failure: {0}")]
    Host(String),
}

impl From<TcfError> for unbanner_core::ScanError {
    fn from(e: TcfError) -> Self {
        match e {
            TcfError::EntrypointLocked | TcfError::Host(_) => unbanner_core::ScanError::script_error(e.to_string()),
            other => unbanner_core::ScanError::parsing_error(other.to_string()),
        }
    }
}
