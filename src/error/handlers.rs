//! Standardized error handling for registry responses

use crate::error::{RegistryError, Result};
use reqwest::{Response, StatusCode};

/// Upper bound on how much of an error body ends up in an error message
const MAX_ERROR_BODY: usize = 512;

/// Standard error handler for HTTP responses
pub struct HttpErrorHandler;

impl HttpErrorHandler {
    /// Pass the response through if its status is one of `expected`,
    /// otherwise consume the body into a `Protocol` error for `step`.
    pub async fn expect_status(
        response: Response,
        expected: &[StatusCode],
        step: &'static str,
    ) -> Result<Response> {
        let status = response.status();
        if expected.contains(&status) {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!(step, status = status.as_u16(), body = %body, "unexpected registry response");
        Err(Self::protocol_error(step, status, &body))
    }

    /// Build a `Protocol` error, trimming oversized bodies
    pub fn protocol_error(step: &'static str, status: StatusCode, body: &str) -> RegistryError {
        let body = body.trim();
        let body = match body.char_indices().nth(MAX_ERROR_BODY) {
            Some((cut, _)) => format!("{}...", &body[..cut]),
            None => body.to_string(),
        };

        RegistryError::Protocol {
            step,
            status: status.as_u16(),
            body,
        }
    }

    /// Human hint for a status code, shown next to protocol errors
    pub fn hint(status: u16) -> Option<&'static str> {
        match status {
            400 => Some("the registry rejected the request; check digests and manifest content"),
            401 => Some("credentials were rejected or the token lacks push scope"),
            403 => Some("insufficient permissions for this repository"),
            404 => Some("repository not found or upload session expired"),
            413 => Some("chunk or blob too large for this registry"),
            416 => Some("registry disagrees about the upload offset"),
            429 => Some("rate limited by the registry"),
            500 => Some("registry server error"),
            502 | 503 => Some("registry temporarily unavailable"),
            507 => Some("registry out of storage"),
            _ => None,
        }
    }
}

/// Network error categorization and handling
pub struct NetworkErrorHandler;

impl NetworkErrorHandler {
    /// Wrap a transport failure with the step it happened in
    pub fn handle_network_error(error: reqwest::Error, step: &'static str) -> RegistryError {
        if error.is_timeout() {
            tracing::warn!(step, "request timed out");
        } else if error.is_connect() {
            tracing::warn!(step, "connection failed");
        }
        RegistryError::Transport { step, source: error }
    }
}

/// Validation helpers for CLI input
pub struct ValidationErrorHandler;

impl ValidationErrorHandler {
    /// Username and password come as a pair or not at all
    pub fn validate_credentials(username: &Option<String>, password: &Option<String>) -> Result<()> {
        match (username, password) {
            (Some(_), None) => Err(RegistryError::Configuration(
                "Password is required when username is provided".to_string(),
            )),
            (None, Some(_)) => Err(RegistryError::Configuration(
                "Username is required when password is provided".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn validate_timeout(timeout: u64) -> Result<()> {
        if timeout == 0 {
            return Err(RegistryError::Configuration(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if timeout > 86400 {
            return Err(RegistryError::Configuration(
                "Timeout cannot exceed 24 hours (86400 seconds)".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_tags(tags: &[String]) -> Result<()> {
        if tags.is_empty() {
            return Err(RegistryError::Configuration(
                "At least one tag is required to push a manifest".to_string(),
            ));
        }

        for tag in tags {
            if tag.is_empty() || tag.contains('/') || tag.contains(char::is_whitespace) {
                return Err(RegistryError::Configuration(format!("Invalid tag: {:?}", tag)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_trims_long_bodies() {
        let body = "x".repeat(2000);
        let err = HttpErrorHandler::protocol_error("uploading manifest", StatusCode::BAD_REQUEST, &body);
        match err {
            RegistryError::Protocol { status, body, .. } => {
                assert_eq!(status, 400);
                assert!(body.len() < 600);
                assert!(body.ends_with("..."));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_validate_credentials_pairs() {
        assert!(ValidationErrorHandler::validate_credentials(&None, &None).is_ok());
        assert!(ValidationErrorHandler::validate_credentials(&Some("u".into()), &Some("p".into())).is_ok());
        assert!(ValidationErrorHandler::validate_credentials(&Some("u".into()), &None).is_err());
        assert!(ValidationErrorHandler::validate_credentials(&None, &Some("p".into())).is_err());
    }

    #[test]
    fn test_validate_tags() {
        assert!(ValidationErrorHandler::validate_tags(&[]).is_err());
        assert!(ValidationErrorHandler::validate_tags(&["v1".to_string(), "latest".to_string()]).is_ok());
        assert!(ValidationErrorHandler::validate_tags(&["a/b".to_string()]).is_err());
        assert!(ValidationErrorHandler::validate_tags(&["".to_string()]).is_err());
    }

    #[test]
    fn test_hint_known_statuses() {
        assert!(HttpErrorHandler::hint(401).is_some());
        assert!(HttpErrorHandler::hint(299).is_none());
    }
}
