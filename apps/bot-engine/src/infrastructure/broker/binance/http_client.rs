//! HTTP client wrapper with request signing and retry logic.

use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use sha2::Sha256;

use super::api_types::BinanceErrorResponse;
use super::config::{BinanceConfig, RetryConfig};
use super::error::BinanceError;

type HmacSha256 = Hmac<Sha256>;

/// Query parameters of one request, in wire order.
pub type Params = Vec<(&'static str, String)>;

/// HTTP client for the Binance REST API with retry logic.
#[derive(Clone)]
pub struct BinanceHttpClient {
    client: Client,
    api_key: String,
    api_secret: String,
    base_url: String,
    recv_window_ms: u128,
    retry_config: RetryConfig,
}

impl std::fmt::Debug for BinanceHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceHttpClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl BinanceHttpClient {
    /// Create a new HTTP client from config.
    pub fn new(config: &BinanceConfig) -> Result<Self, BinanceError> {
        if config.api_key.is_empty() || config.api_secret.is_empty() {
            return Err(BinanceError::AuthenticationFailed(
                "API key and secret are required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BinanceError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            base_url: config.base_url().trim_end_matches('/').to_string(),
            recv_window_ms: config.recv_window.as_millis(),
            retry_config: config.retry.clone(),
        })
    }

    /// Unsigned GET.
    pub async fn get_public<T: DeserializeOwned>(&self, path: &str) -> Result<T, BinanceError> {
        self.request(Method::GET, path, &[], false).await
    }

    /// Signed request; parameters travel in the query string.
    pub async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&'static str, String)],
    ) -> Result<T, BinanceError> {
        self.request(method, path, params, true).await
    }

    /// Internal request implementation with retry logic.
    #[allow(clippy::too_many_lines)]
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&'static str, String)],
        sign: bool,
    ) -> Result<T, BinanceError> {
        let mut backoff = ExponentialBackoff::new(&self.retry_config);

        loop {
            // Timestamp is part of the signature, so sign per attempt.
            let url = self.build_url(path, params, sign)?;
            let response = match self
                .client
                .request(method.clone(), url)
                .header("X-MBX-APIKEY", &self.api_key)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    if let Some(delay) = backoff.next_backoff() {
                        tracing::warn!(
                            error = %e,
                            delay_ms = delay.as_millis(),
                            attempt = backoff.attempt,
                            "Network error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    tracing::error!(error = %e, attempts = backoff.attempt, "Network error, giving up");
                    return Err(BinanceError::MaxRetriesExceeded {
                        attempts: backoff.attempt,
                    });
                }
            };

            let status = response.status();

            if status.is_success() {
                let text = response
                    .text()
                    .await
                    .map_err(|e| BinanceError::Network(e.to_string()))?;
                let text = if text.is_empty() { "null" } else { text.as_str() };
                return serde_json::from_str(text)
                    .map_err(|e| BinanceError::JsonParse(e.to_string()));
            }

            // Handle error response
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());

            let error_body = response.text().await.unwrap_or_default();
            let (error_code, error_message) =
                match serde_json::from_str::<BinanceErrorResponse>(&error_body) {
                    Ok(err) => (err.code, err.msg),
                    Err(_) => (-i64::from(status.as_u16()), error_body),
                };

            match categorize_status(status) {
                ErrorCategory::RateLimited => {
                    if let Some(delay) = backoff
                        .next_backoff()
                        .map(|fallback| retry_after.map_or(fallback, Duration::from_secs))
                    {
                        tracing::warn!(
                            code = error_code,
                            delay_ms = delay.as_millis(),
                            "Rate limited, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(BinanceError::RateLimited {
                        retry_after_secs: retry_after.unwrap_or(60),
                    });
                }
                ErrorCategory::Retryable => {
                    if let Some(delay) = backoff.next_backoff() {
                        tracing::warn!(
                            code = error_code,
                            message = %error_message,
                            delay_ms = delay.as_millis(),
                            "Retryable error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(BinanceError::MaxRetriesExceeded {
                        attempts: backoff.attempt,
                    });
                }
                ErrorCategory::NonRetryable => {
                    return match status {
                        StatusCode::UNAUTHORIZED => {
                            Err(BinanceError::AuthenticationFailed(error_message))
                        }
                        _ => Err(BinanceError::Api {
                            code: error_code,
                            message: error_message,
                        }),
                    };
                }
            }
        }
    }

    fn build_url(
        &self,
        path: &str,
        params: &[(&'static str, String)],
        sign: bool,
    ) -> Result<Url, BinanceError> {
        let mut url = Url::parse(&format!("{}{path}", self.base_url))
            .map_err(|e| BinanceError::Http(e.to_string()))?;

        if !params.is_empty() || sign {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
            if sign {
                pairs.append_pair("recvWindow", &self.recv_window_ms.to_string());
                pairs.append_pair(
                    "timestamp",
                    &chrono::Utc::now().timestamp_millis().to_string(),
                );
            }
        }

        if sign {
            let query = url.query().unwrap_or_default().to_string();
            let signature = sign_query(&self.api_secret, &query)?;
            url.query_pairs_mut().append_pair("signature", &signature);
        }

        Ok(url)
    }
}

/// HMAC-SHA256 of the query string, hex encoded.
pub fn sign_query(secret: &str, query: &str) -> Result<String, BinanceError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| BinanceError::AuthenticationFailed(e.to_string()))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Error category for determining retry behavior.
enum ErrorCategory {
    RateLimited,
    Retryable,
    NonRetryable,
}

/// Categorize HTTP status code for retry handling.
///
/// 418 is Binance's IP ban after ignoring 429s.
const fn categorize_status(status: StatusCode) -> ErrorCategory {
    match status.as_u16() {
        418 | 429 => ErrorCategory::RateLimited,
        408 | 500 | 502 | 503 | 504 => ErrorCategory::Retryable,
        _ => ErrorCategory::NonRetryable,
    }
}

/// Exponential backoff calculator.
struct ExponentialBackoff {
    attempt: u32,
    max_attempts: u32,
    current_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
}

impl ExponentialBackoff {
    const fn new(config: &RetryConfig) -> Self {
        Self {
            attempt: 0,
            max_attempts: config.max_attempts,
            current_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            multiplier: config.multiplier,
        }
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.attempt += 1;
        if self.attempt >= self.max_attempts {
            return None;
        }

        let backoff = self.current_backoff;
        self.current_backoff = Duration::from_secs_f64(
            (self.current_backoff.as_secs_f64() * self.multiplier)
                .min(self.max_backoff.as_secs_f64()),
        );

        Some(backoff)
    }
}
