#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("digest mismatch: expected {expected}, got {actual}")]
    Mismatch { expected: String, actual: String },

    #[error("illegal state: {0}")]
    IllegalState(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
