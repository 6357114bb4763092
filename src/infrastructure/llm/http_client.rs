use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use std::time::Duration;

pub struct HttpClientFactory;

impl HttpClientFactory {
    /// Creates an HTTP client with transport-level retry middleware.
    ///
    /// Only connection resets and similar transient transport failures are
    /// retried here; backoff across whole completions is the job of
    /// `RetryingLanguageModel`, so keep `transport_retries` small.
    pub fn create_client(request_timeout: Duration, transport_retries: u32) -> ClientWithMiddleware {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(transport_retries);

        let client = Client::builder()
            .pool_max_idle_per_host(5)
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build()
    }
}

/// Joins a base URL and a path with exactly one slash between them
pub fn join_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("https://api.example.com/v1/", "/chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(join_url("http://localhost:8080", "models"), "http://localhost:8080/models");
    }
}
