use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    Conflict,
    RateLimited,
    Internal,
}

impl ErrorCode {
    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            409 => Self::Conflict,
            429 => Self::RateLimited,
            400..=499 => Self::Validation,
            _ => Self::Internal,
        }
    }
}

/// Error body reported by a remote store for a rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code:?}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::from_http_status(status), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_http_statuses_to_codes() {
        assert_eq!(ErrorCode::from_http_status(401), ErrorCode::Unauthorized);
        assert_eq!(ErrorCode::from_http_status(409), ErrorCode::Conflict);
        assert_eq!(ErrorCode::from_http_status(422), ErrorCode::Validation);
        assert_eq!(ErrorCode::from_http_status(503), ErrorCode::Internal);
    }

    #[test]
    fn serializes_code_in_snake_case() {
        let value = serde_json::to_value(ApiError::new(ErrorCode::RateLimited, "slow down"))
            .expect("json");
        assert_eq!(value["code"], "rate_limited");
        assert_eq!(value["message"], "slow down");
    }
}
