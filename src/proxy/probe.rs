//! Probe boundary and the HTTP-based proxy probe

use crate::error::ProbeError;
use crate::proxy::geo::{GeoLocator, GeoSource, DEFAULT_GEO_ENDPOINT};
use crate::proxy::models::{ProbeOutcome, ProbeTarget};
use crate::Result;
use reqwest::{Client, Proxy as ReqwestProxy};
use serde::Deserialize;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default URL to test proxies against
pub const DEFAULT_TEST_URL: &str = "http://httpbin.org/ip";

/// Timeout for geo lookups, independent of the probe timeout
const GEO_TIMEOUT_SECS: u64 = 10;

/// A single liveness check against one proxy
///
/// Implementations bound their own wait by `timeout`. Transport failures
/// should come back as `Ok` with `working == false`; `Err` is reserved for
/// targets the probe cannot even attempt.
pub trait ProxyProbe: Send + Sync + 'static {
    fn probe(
        &self,
        target: &ProbeTarget,
        timeout: Duration,
    ) -> impl Future<Output = std::result::Result<ProbeOutcome, ProbeError>> + Send;
}

/// Configuration for the HTTP probe
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// URL fetched through the proxy; must answer with `{"origin": "<ip>"}`
    pub test_url: String,
    /// ip-api compatible endpoint for enrichment
    pub geo_endpoint: String,
    /// Path to an MMDB file; replaces the ip-api lookup when set
    pub mmdb_path: Option<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            test_url: DEFAULT_TEST_URL.to_string(),
            geo_endpoint: DEFAULT_GEO_ENDPOINT.to_string(),
            mmdb_path: None,
        }
    }
}

impl ProbeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_test_url(mut self, url: String) -> Self {
        self.test_url = url;
        self
    }

    pub fn with_geo_endpoint(mut self, endpoint: String) -> Self {
        self.geo_endpoint = endpoint;
        self
    }

    pub fn with_mmdb_path(mut self, path: String) -> Self {
        self.mmdb_path = Some(path);
        self
    }
}

#[derive(Debug, Deserialize)]
struct OriginResponse {
    origin: String,
}

/// Probe that fetches the test URL through the proxy with reqwest
#[derive(Clone)]
pub struct HttpProbe {
    config: ProbeConfig,
    geo: GeoSource,
}

impl HttpProbe {
    /// Create a probe with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(ProbeConfig::default())
    }

    /// Create a probe with custom configuration
    pub fn with_config(config: ProbeConfig) -> Result<Self> {
        let geo = match &config.mmdb_path {
            Some(path) => GeoSource::Mmdb(GeoLocator::from_path(path)?),
            None => GeoSource::ip_api(
                config.geo_endpoint.clone(),
                Duration::from_secs(GEO_TIMEOUT_SECS),
            )?,
        };

        Ok(Self { config, geo })
    }

    /// Create a reqwest client routed through the proxy
    fn create_client(
        &self,
        target: &ProbeTarget,
        timeout: Duration,
    ) -> std::result::Result<Client, ProbeError> {
        if target.address.port > u32::from(u16::MAX) {
            return Err(ProbeError::PortOutOfRange(target.address.port));
        }

        // Every test URL scheme must go through the proxy, never direct
        let reqwest_proxy = ReqwestProxy::all(target.url())?;

        let client = Client::builder()
            .proxy(reqwest_proxy)
            .timeout(timeout)
            .build()?;

        Ok(client)
    }

    /// Fetch the test URL and return the exit address reported by it
    async fn fetch_origin(&self, client: &Client) -> Result<String> {
        let response = client
            .get(&self.config.test_url)
            .send()
            .await?
            .error_for_status()?;
        let body: OriginResponse = response.json().await?;

        // Chained proxies report "a, b"; the first hop is the exit
        let origin = body.origin.split(',').next().unwrap_or_default().trim();
        Ok(origin.to_string())
    }
}

impl ProxyProbe for HttpProbe {
    async fn probe(
        &self,
        target: &ProbeTarget,
        timeout: Duration,
    ) -> std::result::Result<ProbeOutcome, ProbeError> {
        let timeout_ms = timeout.as_millis() as u64;
        let client = self.create_client(target, timeout)?;
        let start = Instant::now();

        let origin = match tokio::time::timeout(timeout, self.fetch_origin(&client)).await {
            Ok(Ok(origin)) => origin,
            Ok(Err(e)) => {
                debug!(proxy = %target.address, error = %e, "probe failed");
                return Ok(ProbeOutcome::failed(timeout_ms));
            }
            Err(_) => {
                debug!(proxy = %target.address, "probe timed out");
                return Ok(ProbeOutcome::failed(timeout_ms));
            }
        };
        let elapsed = start.elapsed().as_millis() as u64;

        let geo = match self.geo.lookup(&origin).await {
            Ok(geo) => Some(geo),
            Err(e) => {
                warn!(proxy = %target.address, origin, error = %e, "geo lookup failed");
                None
            }
        };

        Ok(ProbeOutcome::working(elapsed, geo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::{ProxyAddress, ProxyType};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn target(port: u32, proxy_type: ProxyType) -> ProbeTarget {
        ProbeTarget {
            address: ProxyAddress::new("127.0.0.1".to_string(), port),
            proxy_type,
        }
    }

    #[test]
    fn test_probe_config_default() {
        let config = ProbeConfig::default();
        assert_eq!(config.test_url, DEFAULT_TEST_URL);
        assert_eq!(config.geo_endpoint, DEFAULT_GEO_ENDPOINT);
        assert!(config.mmdb_path.is_none());
    }

    #[test]
    fn test_probe_config_builder() {
        let config = ProbeConfig::new()
            .with_test_url("http://example.com/ip".to_string())
            .with_geo_endpoint("http://geo.local/json".to_string());

        assert_eq!(config.test_url, "http://example.com/ip");
        assert_eq!(config.geo_endpoint, "http://geo.local/json");
    }

    #[test]
    fn test_missing_mmdb_is_an_error() {
        let config = ProbeConfig::new().with_mmdb_path("/nonexistent/city.mmdb".to_string());
        assert!(HttpProbe::with_config(config).is_err());
    }

    #[tokio::test]
    async fn test_out_of_range_port_is_rejected() {
        let probe = HttpProbe::new().unwrap();
        let err = probe
            .probe(&target(70000, ProxyType::Http), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::PortOutOfRange(70000)));
    }

    #[tokio::test]
    async fn test_unreachable_proxy_reports_timeout_latency() {
        let probe = HttpProbe::with_config(
            ProbeConfig::new().with_test_url("http://127.0.0.1:9/ip".to_string()),
        )
        .unwrap();
        // Port 1 on loopback refuses immediately
        let outcome = probe
            .probe(&target(1, ProxyType::Http), Duration::from_secs(2))
            .await
            .unwrap();
        assert!(!outcome.working);
        assert_eq!(outcome.response_time_ms, 2000);
        assert!(outcome.geo.is_none());
    }

    /// Run a probe against a loopback listener posing as the proxy and
    /// return the first bytes the listener received
    async fn first_bytes_at_proxy(proxy_type: ProxyType, test_url: &str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let n = socket.read(&mut buf).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });

        let probe =
            HttpProbe::with_config(ProbeConfig::new().with_test_url(test_url.to_string())).unwrap();
        let outcome = probe
            .probe(&target(u32::from(port), proxy_type), Duration::from_secs(2))
            .await
            .unwrap();
        assert!(!outcome.working);

        tokio::time::timeout(Duration::from_secs(2), accepted)
            .await
            .expect("proxy listener never saw a connection")
            .unwrap()
    }

    #[tokio::test]
    async fn test_http_proxy_receives_plain_request() {
        let received = first_bytes_at_proxy(ProxyType::Http, "http://127.0.0.1:9/ip").await;
        assert!(received.starts_with("GET http://127.0.0.1:9/ip"), "{received}");
    }

    #[tokio::test]
    async fn test_https_proxy_is_spoken_to_in_plain_http() {
        let received = first_bytes_at_proxy(ProxyType::Https, "http://127.0.0.1:9/ip").await;
        assert!(received.starts_with("GET http://127.0.0.1:9/ip"), "{received}");
    }

    #[tokio::test]
    async fn test_https_test_url_tunnels_through_proxy() {
        for proxy_type in [ProxyType::Http, ProxyType::Https] {
            let received = first_bytes_at_proxy(proxy_type, "https://127.0.0.1:9/ip").await;
            assert!(received.starts_with("CONNECT 127.0.0.1:9"), "{received}");
        }
    }
}
