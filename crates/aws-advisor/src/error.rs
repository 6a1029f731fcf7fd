use advisor_common::assistant::AssistantError;
use advisor_common::error::CommonError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("{0}")]
    MissingInput(&'static str),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("cloudtrail error: {0}")]
    CloudTrail(String),
}

impl From<AssistantError> for AppError {
    fn from(err: AssistantError) -> Self {
        AppError::Common(CommonError::Assistant(err))
    }
}

impl AppError {
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            AppError::Common(CommonError::Assistant(AssistantError::Timeout(_)))
        )
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingInput(_) | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ if self.is_timeout() => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Plain-text `Error: ...` bodies; the stderr of a failed assistant run is passed through raw.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if self.is_timeout() {
            "Request timed out".to_string()
        } else {
            self.to_string()
        };
        (status, format!("Error: {message}")).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn assistant_failures_map_to_distinct_statuses() {
        let timeout = AppError::from(AssistantError::Timeout(Duration::from_secs(120)));
        assert_eq!(timeout.status(), StatusCode::REQUEST_TIMEOUT);

        let process = AppError::from(AssistantError::Process {
            stderr: "credentials expired".to_string(),
        });
        assert_eq!(process.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(process.to_string(), "credentials expired");

        let missing = AppError::MissingInput("No body provided");
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
        assert_eq!(missing.to_string(), "No body provided");
    }
}
