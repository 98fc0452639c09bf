use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorKind {
    RateLimit,
    Timeout,
    Server,
    Network,
    Auth,
    NotConfigured,
    InvalidResponse,
    Other,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BackendErrorKind::RateLimit => "rate limited",
            BackendErrorKind::Timeout => "timeout",
            BackendErrorKind::Server => "server error",
            BackendErrorKind::Network => "network error",
            BackendErrorKind::Auth => "authentication failed",
            BackendErrorKind::NotConfigured => "backend not configured",
            BackendErrorKind::InvalidResponse => "invalid response",
            BackendErrorKind::Other => "backend error",
        };
        f.write_str(label)
    }
}

/// A failed call to the completion backend.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub provider: Option<String>,
    /// True when kind was inferred from free-form message parsing.
    pub legacy_classified: bool,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            provider: None,
            legacy_classified: false,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn not_configured(stage: &str) -> Self {
        Self::new(
            BackendErrorKind::NotConfigured,
            format!("no completion client configured for stage '{}'", stage),
        )
    }

    pub fn network(detail: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Network, detail)
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Timeout, detail)
    }

    pub fn invalid_response(detail: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::InvalidResponse, detail)
    }

    /// Maps an HTTP status and response body to a typed error.
    pub fn from_status(status: u16, provider: &str, body: impl Into<String>) -> Self {
        let kind = match status {
            429 => BackendErrorKind::RateLimit,
            401 | 403 => BackendErrorKind::Auth,
            408 | 504 => BackendErrorKind::Timeout,
            500..=599 => BackendErrorKind::Server,
            _ => BackendErrorKind::Other,
        };
        Self::new(kind, body)
            .with_status(status)
            .with_provider(provider)
    }

    pub fn from_reqwest(err: &reqwest::Error, provider: &str) -> Self {
        let kind = if err.is_timeout() {
            BackendErrorKind::Timeout
        } else if err.is_connect() || err.is_request() {
            BackendErrorKind::Network
        } else if err.is_decode() || err.is_body() {
            BackendErrorKind::InvalidResponse
        } else {
            BackendErrorKind::Other
        };
        let mut out = Self::new(kind, err.to_string()).with_provider(provider);
        if let Some(status) = err.status() {
            out = out.with_status(status.as_u16());
        }
        out
    }

    pub fn classify_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let msg = message.to_lowercase();
        let kind = if msg.contains("rate limit") || msg.contains("429") || msg.contains("quota")
        {
            BackendErrorKind::RateLimit
        } else if msg.contains("timeout") || msg.contains("timed out") {
            BackendErrorKind::Timeout
        } else if msg.contains("401")
            || msg.contains("403")
            || msg.contains("unauthorized")
            || msg.contains("api key")
        {
            BackendErrorKind::Auth
        } else if msg.contains("500")
            || msg.contains("502")
            || msg.contains("503")
            || msg.contains("504")
            || msg.contains("provider error")
        {
            BackendErrorKind::Server
        } else if msg.contains("network") || msg.contains("connection") || msg.contains("dns") {
            BackendErrorKind::Network
        } else {
            BackendErrorKind::Other
        };

        let mut err = Self::new(kind, message);
        err.legacy_classified = true;
        err
    }

    /// Typed errors raised by our providers pass through unchanged; anything
    /// else is classified from its message.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<BackendError>() {
            Some(typed) => typed.clone(),
            None => Self::classify_message(format!("{:#}", err)),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            BackendErrorKind::RateLimit
                | BackendErrorKind::Timeout
                | BackendErrorKind::Server
                | BackendErrorKind::Network
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_message_maps_provider_failures() {
        assert_eq!(
            BackendError::classify_message("provider returned 429").kind,
            BackendErrorKind::RateLimit
        );
        assert_eq!(
            BackendError::classify_message("request timed out after 30s").kind,
            BackendErrorKind::Timeout
        );
        assert_eq!(
            BackendError::classify_message("HTTP 503 Service Unavailable").kind,
            BackendErrorKind::Server
        );
        assert_eq!(
            BackendError::classify_message("dns lookup failed").kind,
            BackendErrorKind::Network
        );
        assert_eq!(
            BackendError::classify_message("invalid API key supplied").kind,
            BackendErrorKind::Auth
        );
        let other = BackendError::classify_message("something odd");
        assert_eq!(other.kind, BackendErrorKind::Other);
        assert!(other.legacy_classified);
    }

    #[test]
    fn from_anyhow_prefers_typed_errors() {
        let typed = BackendError::from_status(401, "openai", "bad key");
        let err = anyhow::Error::new(typed.clone());
        let back = BackendError::from_anyhow(&err);
        assert_eq!(back, typed);
        assert_eq!(back.kind, BackendErrorKind::Auth);
        assert!(!back.legacy_classified);

        let untyped = anyhow::anyhow!("connection reset by peer");
        assert_eq!(
            BackendError::from_anyhow(&untyped).kind,
            BackendErrorKind::Network
        );
    }

    #[test]
    fn status_mapping_and_retryability() {
        assert!(BackendError::from_status(429, "gemini", "slow down").is_retryable());
        assert!(BackendError::from_status(502, "gemini", "bad gateway").is_retryable());
        assert!(!BackendError::from_status(403, "gemini", "forbidden").is_retryable());
        assert!(!BackendError::not_configured("reasoning").is_retryable());
        assert_eq!(
            BackendError::from_status(404, "gemini", "no model").kind,
            BackendErrorKind::Other
        );
    }

    #[test]
    fn display_names_kind_and_message() {
        let err = BackendError::not_configured("context");
        assert_eq!(
            err.to_string(),
            "backend not configured: no completion client configured for stage 'context'"
        );
    }
}
