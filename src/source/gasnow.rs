//! GasNow price source
//!
//! Fetches the current price tiers from the GasNow HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::base::{snapshot_from_response, PriceSource, SourceError};
use crate::model::GasSnapshot;

/// Default GasNow endpoint
pub const DEFAULT_GASNOW_URL: &str =
    "https://www.gasnow.org/api/v3/gas/price?utm_source=:SushiSwapMonitor";

/// Time a single fetch may take before it fails
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuration for the GasNow source
#[derive(Debug, Clone)]
pub struct GasNowConfig {
    /// Full URL of the price endpoint
    pub api_url: String,
    /// Upper bound on each request
    pub timeout: Duration,
}

impl Default for GasNowConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_GASNOW_URL.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// GasNow price source
pub struct GasNowSource {
    client: Client,
    config: GasNowConfig,
}

impl GasNowSource {
    /// Creates a source for the default endpoint
    pub fn new() -> Self {
        Self::with_config(GasNowConfig::default())
    }

    /// Creates a source with custom configuration
    pub fn with_config(config: GasNowConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Creates a source for a specific endpoint URL
    pub fn with_url(api_url: impl Into<String>) -> Self {
        Self::with_config(GasNowConfig {
            api_url: api_url.into(),
            ..GasNowConfig::default()
        })
    }

    /// The endpoint this source queries
    pub fn api_url(&self) -> &str {
        &self.config.api_url
    }
}

impl Default for GasNowSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceSource for GasNowSource {
    fn id(&self) -> &'static str {
        "gasnow"
    }

    async fn fetch(&self) -> Result<GasSnapshot, SourceError> {
        let response = self
            .client
            .get(&self.config.api_url)
            .timeout(self.config.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        snapshot_from_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Tier;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn source_for(server: &MockServer) -> GasNowSource {
        GasNowSource::with_url(format!("{}/api/v3/gas/price", server.uri()))
    }

    #[test]
    fn test_gasnow_source_new() {
        let source = GasNowSource::new();
        assert_eq!(source.id(), "gasnow");
        assert_eq!(source.api_url(), DEFAULT_GASNOW_URL);
    }

    #[tokio::test]
    async fn test_fetch_converts_prices() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/gas/price"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "data": {
                    "rapid": "50000000000",
                    "fast": "41000000000",
                    "standard": "20000000000",
                    "slow": "18000000000",
                    "timestamp": 1000
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = source_for(&server).await.fetch().await.unwrap();

        assert_eq!(snapshot.timestamp, 1000);
        assert_eq!(snapshot.price(Tier::Rapid), Some(50));
        assert_eq!(snapshot.price(Tier::Fast), Some(41));
        assert_eq!(snapshot.price(Tier::Standard), Some(20));
        assert_eq!(snapshot.price(Tier::Slow), Some(18));
    }

    #[tokio::test]
    async fn test_fetch_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = source_for(&server).await.fetch().await.unwrap_err();
        assert!(matches!(err, SourceError::Status(503)));
    }

    #[tokio::test]
    async fn test_fetch_body_without_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 429 })))
            .mount(&server)
            .await;

        let err = source_for(&server).await.fetch().await.unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }

    #[tokio::test]
    async fn test_fetch_non_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let err = source_for(&server).await.fetch().await.unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }

    #[tokio::test]
    async fn test_fetch_times_out_on_slow_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "data": { "timestamp": 1000 } }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let source = GasNowSource::with_config(GasNowConfig {
            api_url: format!("{}/api/v3/gas/price", server.uri()),
            timeout: Duration::from_millis(100),
        });

        let err = source.fetch().await.unwrap_err();
        match err {
            SourceError::Network(e) => assert!(e.is_timeout()),
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
