use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::{AnalysisRequest, AnalysisResult, ExternalAnalysis};
use crate::config::{AnalysisConfig, RequestConfig};
use crate::error::{EngineError, EngineResult};

/// Service name carried by `ExternalServiceUnavailable` errors.
pub const ANALYSIS_SERVICE: &str = "external_analysis";

/// HTTP client for the remote analysis service.
#[derive(Clone)]
pub struct HttpAnalysisClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    request_config: RequestConfig,
}

impl HttpAnalysisClient {
    /// Create a client for `base_url`.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        request_config: RequestConfig,
    ) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(|e| EngineError::unavailable(ANALYSIS_SERVICE, e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            request_config,
        })
    }

    /// Client from configuration, `None` when no base URL is configured.
    pub fn from_config(
        config: &AnalysisConfig,
        request_config: RequestConfig,
    ) -> EngineResult<Option<Self>> {
        config
            .base_url
            .as_deref()
            .map(|url| Self::new(url, config.api_key.clone(), request_config))
            .transpose()
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute a single request (internal)
    async fn execute_request(
        &self,
        url: &str,
        request: &AnalysisRequest,
    ) -> EngineResult<AnalysisResult> {
        debug!(
            query_len = request.query.len(),
            concepts = request.concepts.len(),
            "Calling analysis service"
        );

        let mut builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                EngineError::unavailable(
                    ANALYSIS_SERVICE,
                    format!("timed out after {}ms", self.request_config.timeout_ms),
                )
            } else {
                EngineError::unavailable(ANALYSIS_SERVICE, e.to_string())
            }
        })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(EngineError::unavailable(
                ANALYSIS_SERVICE,
                format!("HTTP {}: {}", status.as_u16(), error_body),
            ));
        }

        let result: AnalysisResult = response.json().await.map_err(|e| {
            EngineError::unavailable(ANALYSIS_SERVICE, format!("Failed to parse response: {}", e))
        })?;

        if !(0.0..=1.0).contains(&result.confidence) {
            return Err(EngineError::unavailable(
                ANALYSIS_SERVICE,
                format!("confidence {} outside [0, 1]", result.confidence),
            ));
        }

        Ok(result)
    }
}

#[async_trait]
impl ExternalAnalysis for HttpAnalysisClient {
    async fn analyze(&self, request: &AnalysisRequest) -> EngineResult<AnalysisResult> {
        let url = format!("{}/v1/analyze", self.base_url);

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying analysis request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, request).await {
                Ok(result) => {
                    info!(
                        latency_ms = start.elapsed().as_millis(),
                        confidence = result.confidence,
                        "Analysis call succeeded"
                    );
                    return Ok(result);
                }
                Err(e) => {
                    error!(
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Analysis call failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            EngineError::unavailable(ANALYSIS_SERVICE, "Unknown error")
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = HttpAnalysisClient::new(
            "https://analysis.example.org/",
            Some("key".to_string()),
            RequestConfig::default(),
        )
        .unwrap();
        assert_eq!(client.base_url(), "https://analysis.example.org");
    }

    #[test]
    fn test_from_config_without_url() {
        let client =
            HttpAnalysisClient::from_config(&AnalysisConfig::default(), RequestConfig::default())
                .unwrap();
        assert!(client.is_none());
    }
}
