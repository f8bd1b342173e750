//! Provider error taxonomy and retry classification

use thiserror::Error;

/// How a failed provider call should be handled by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Transient: retry the same call after a backoff.
    WithBackoff,
    /// Permanent: the entity does not exist, stop immediately.
    Never,
    /// Give up on this method and let the fallback chain try the next one.
    NextMethod,
}

#[derive(Error, Debug)]
pub enum ProviderError {
    /// Vendor throttled the request (HTTP 429 or an in-body rate limit notice).
    #[error("Rate limited by {provider}: {message}")]
    RateLimited { provider: String, message: String },

    /// Entity unknown to the vendor or delisted.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP error: {status} for {context}")]
    Http {
        status: reqwest::StatusCode,
        context: String,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl ProviderError {
    pub fn retry_class(&self) -> RetryClass {
        match self {
            ProviderError::RateLimited { .. } => RetryClass::WithBackoff,
            ProviderError::NotFound(_)
            | ProviderError::MissingCredential(_)
            | ProviderError::Unsupported(_) => RetryClass::Never,
            ProviderError::Transport(_) | ProviderError::Http { .. } | ProviderError::Parse(_) => {
                RetryClass::NextMethod
            }
        }
    }

    /// Maps an unsuccessful HTTP status onto the taxonomy.
    pub fn from_status(provider: &str, status: reqwest::StatusCode, context: &str) -> Self {
        match status {
            reqwest::StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
                provider: provider.to_string(),
                message: format!("HTTP {status} for {context}"),
            },
            reqwest::StatusCode::NOT_FOUND => ProviderError::NotFound(context.to_string()),
            _ => ProviderError::Http {
                status,
                context: context.to_string(),
            },
        }
    }
}

/// Errors raised while building adapters.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Unsupported data source type: {0}")]
    UnsupportedProvider(String),

    #[error("Failed to construct {provider} data source: {message}")]
    Construction { provider: String, message: String },

    #[error("Data source {0} is not available")]
    Unavailable(String),

    #[error("Data source {provider} does not support market {market}")]
    MarketUnsupported { provider: String, market: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_retry_class_per_variant() {
        let limited = ProviderError::RateLimited {
            provider: "YFINANCE".to_string(),
            message: "slow down".to_string(),
        };
        assert_eq!(limited.retry_class(), RetryClass::WithBackoff);
        assert_eq!(
            ProviderError::NotFound("ZZZZ".to_string()).retry_class(),
            RetryClass::Never
        );
        assert_eq!(
            ProviderError::Parse("bad json".to_string()).retry_class(),
            RetryClass::NextMethod
        );
    }

    #[test]
    fn test_from_status() {
        assert!(matches!(
            ProviderError::from_status("YFINANCE", StatusCode::TOO_MANY_REQUESTS, "AAPL"),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            ProviderError::from_status("YFINANCE", StatusCode::NOT_FOUND, "AAPL"),
            ProviderError::NotFound(_)
        ));
        let err = ProviderError::from_status("YFINANCE", StatusCode::BAD_GATEWAY, "AAPL");
        assert_eq!(err.to_string(), "HTTP error: 502 Bad Gateway for AAPL");
        assert_eq!(err.retry_class(), RetryClass::NextMethod);
    }
}
