/// Error types shared across advisor server crates.
///
/// These errors represent failures in infrastructure components (the assistant child
/// process, the user context store) that any server built on this crate talks to.
/// Application-specific errors should be defined in each server crate and wrap
/// `CommonError` via `#[from]`.
use crate::assistant::AssistantError;

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error(transparent)]
    Assistant(#[from] AssistantError),

    #[error("context store error: {0}")]
    ContextStore(#[from] std::io::Error),
}
