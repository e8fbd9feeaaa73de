use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to configure {kind} source: {source}")]
    Configure {
        kind:   &'static str,
        source: object_store::Error,
    },

    #[error("failed to list objects in {store}: {source}")]
    List {
        store:  String,
        source: object_store::Error,
    },

    #[error("invalid object key '{key}': {source}")]
    InvalidKey {
        key:    String,
        source: object_store::path::Error,
    },

    #[error("failed to open object '{key}': {source}")]
    Open {
        key:    String,
        source: object_store::Error,
    },
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Open {
                source: object_store::Error::NotFound { .. },
                ..
            }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
