/// Storage for the caller's declared situation ("user context").
///
/// There is exactly one value. Writes replace it wholesale and reads return it wholesale;
/// there is no locking, so concurrent writers are last-write-wins. Reads degrade gracefully:
/// a missing or unreadable value is `None`, never an error.
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::CommonError;

#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Current value, or `None` when nothing is stored or it cannot be read.
    async fn get(&self) -> Option<String>;

    /// Replace the stored value.
    async fn set(&self, value: &str) -> Result<(), CommonError>;
}

/// A `ContextStore` backed by one plain-text file.
#[derive(Debug, Clone)]
pub struct FileContextStore {
    path: PathBuf,
}

impl FileContextStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ContextStore for FileContextStore {
    async fn get(&self) -> Option<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(value) => Some(value),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no user context stored");
                None
            }
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "failed to read user context");
                None
            }
        }
    }

    async fn set(&self, value: &str) -> Result<(), CommonError> {
        tokio::fs::write(&self.path, value).await?;
        Ok(())
    }
}
