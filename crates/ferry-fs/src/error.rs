use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to write '{path}': {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to read '{path}': {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("'{0}' has no file name")]
    NoFileName(PathBuf),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Write { source, .. } | Self::Read { source, .. } => {
                source.kind() == io::ErrorKind::NotFound
            }
            Self::NoFileName(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
