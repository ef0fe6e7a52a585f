// batcher-core/src/error.rs

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatcherError {

    #[error("Storage error at '{path}': {message}")]
    Storage {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Dataset '{name}' error: {message}")]
    Dataset {
        name: String,
        message: String,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Vocabulary error: {message}")]
    Vocab {
        message: String,
    },

    #[error("Id {id} not found in vocabulary (size {size})")]
    IdOutOfRange {
        id: u32,
        size: usize,
    },

    #[error(
        "Model produced word id {id} which corresponds to article OOV {oov_index} \
         but this example only has {available} article OOVs"
    )]
    OovOutOfRange {
        id: u32,
        oov_index: usize,
        available: usize,
    },

    #[error("Record error: {message}")]
    Record {
        message: String,
    },

    #[error("Pipeline error: {message}")]
    Pipeline {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, BatcherError>;

// Convenience constructors
impl BatcherError {

    pub fn storage(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn storage_with_source(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn dataset(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dataset {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn vocab(message: impl Into<String>) -> Self {
        Self::Vocab {
            message: message.into(),
        }
    }

    pub fn id_out_of_range(id: u32, size: usize) -> Self {
        Self::IdOutOfRange { id, size }
    }

    pub fn oov_out_of_range(id: u32, oov_index: usize, available: usize) -> Self {
        Self::OovOutOfRange {
            id,
            oov_index,
            available,
        }
    }

    pub fn record(message: impl Into<String>) -> Self {
        Self::Record {
            message: message.into(),
        }
    }

    pub fn pipeline(message: impl Into<String>) -> Self {
        Self::Pipeline {
            message: message.into(),
        }
    }
}
