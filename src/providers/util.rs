use crate::core::error::{ProviderError, RetryClass};
use crate::core::quote::Quote;
use futures::future::BoxFuture;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const USER_AGENT: &str = concat!("holdings/", env!("CARGO_PKG_VERSION"));

/// One fallback method: a label for logs and the lazy lookup future.
pub type Method<'a> = (&'static str, BoxFuture<'a, Result<Option<Quote>, ProviderError>>);

/// Starts the per-adapter HTTP client with the shared user agent and timeout.
pub fn client_builder(timeout: Duration) -> reqwest::ClientBuilder {
    let builder = reqwest::Client::builder().user_agent(USER_AGENT);
    if timeout.is_zero() {
        builder
    } else {
        builder.timeout(timeout)
    }
}

/// Fetches `url` as text, mapping unsuccessful statuses onto [`ProviderError`].
pub async fn get_text(
    client: &reqwest::Client,
    provider: &str,
    url: reqwest::Url,
    context: &str,
) -> Result<String, ProviderError> {
    debug!("Requesting {} from {}", context, url);
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::from_status(provider, status, context));
    }
    Ok(response.text().await?)
}

/// Runs the methods in order and returns the first quote produced.
///
/// A method that errors is treated like one that found nothing.
pub async fn first_success(provider: &str, code: &str, methods: Vec<Method<'_>>) -> Option<Quote> {
    for (label, method) in methods {
        match method.await {
            Ok(Some(quote)) => {
                debug!(provider, code, method = label, value = %quote.value, as_of = %quote.as_of, "Method succeeded");
                return Some(quote);
            }
            Ok(None) => debug!(provider, code, method = label, "Method returned no data"),
            Err(e) => warn!(provider, code, method = label, error = %e, "Method failed"),
        }
    }
    warn!(provider, code, "All methods exhausted");
    None
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Linear backoff: `delay * attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay * attempt
    }
}

/// Retries an async operation while it fails with a transient error.
///
/// Rate limiting is retried with linearly increasing delays up to
/// `max_attempts`; any other error is returned immediately without sleeping.
pub async fn with_backoff<F, Fut, T>(mut operation: F, policy: RetryPolicy) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) if err.retry_class() == RetryClass::WithBackoff && attempt < max_attempts => {
                let wait = policy.delay_for(attempt);
                warn!(
                    "Attempt {}/{} rate limited: {}. Retrying in {:?}",
                    attempt, max_attempts, err, wait
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Enforces a minimum spacing between outbound requests.
pub struct Throttle {
    spacing: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(spacing: Duration) -> Self {
        Throttle {
            spacing,
            last_request: Mutex::new(None),
        }
    }

    pub async fn wait(&self) {
        // Held across the sleep so concurrent callers queue up.
        let mut last_request = self.last_request.lock().await;
        if let Some(previous) = *last_request {
            let elapsed = previous.elapsed();
            if elapsed < self.spacing {
                let pause = self.spacing - elapsed;
                debug!("Throttling request for {:?}", pause);
                tokio::time::sleep(pause).await;
            }
        }
        *last_request = Some(Instant::now());
    }
}
