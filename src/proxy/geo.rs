//! Geo and ISP enrichment for proxy exit addresses
//!
//! Two sources are supported: the ip-api JSON service, which also reports
//! ISP, ASN and mobile/hosting/proxy flags, and an offline MMDB database
//! which only knows about location.

use crate::Result;
use anyhow::anyhow;
use maxminddb::{geoip2, Reader};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Default ip-api endpoint; the address is appended as a path segment
pub const DEFAULT_GEO_ENDPOINT: &str = "http://ip-api.com/json";

/// Fields requested from ip-api; the flags are omitted unless asked for
const IP_API_FIELDS: &str = "status,message,country,countryCode,regionName,city,zip,lat,lon,\
timezone,isp,org,as,asname,mobile,proxy,hosting";

/// Enrichment payload for a successfully probed proxy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GeoInfo {
    pub country: Option<String>,
    /// ISO 3166-1 alpha-2 country code (e.g., "US", "CN")
    pub country_code: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// Timezone (e.g., "America/New_York")
    pub timezone: Option<String>,
    pub isp: Option<String>,
    pub org: Option<String>,
    /// Autonomous system, as reported (e.g., "AS15169 Google LLC")
    pub as_number: Option<String>,
    pub as_name: Option<String>,
    pub mobile: bool,
    pub hosting: bool,
    pub proxy_detected: bool,
}

impl GeoInfo {
    /// Create a bag holding only country information
    pub fn with_country(country: Option<String>, country_code: Option<String>) -> Self {
        Self {
            country,
            country_code,
            ..Default::default()
        }
    }

    /// Get a short display string for the location
    pub fn short_display(&self) -> String {
        match (&self.country_code, &self.city) {
            (Some(cc), Some(city)) => format!("{}, {}", city, cc),
            (Some(cc), None) => cc.clone(),
            (None, Some(city)) => city.clone(),
            (None, None) => String::from("Unknown"),
        }
    }
}

/// ip-api response body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiResponse {
    status: String,
    message: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
    region_name: Option<String>,
    city: Option<String>,
    zip: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    timezone: Option<String>,
    isp: Option<String>,
    org: Option<String>,
    #[serde(rename = "as")]
    as_number: Option<String>,
    #[serde(rename = "asname")]
    as_name: Option<String>,
    #[serde(default)]
    mobile: bool,
    #[serde(default)]
    proxy: bool,
    #[serde(default)]
    hosting: bool,
}

impl IpApiResponse {
    fn into_geo(self) -> Result<GeoInfo> {
        if self.status != "success" {
            return Err(anyhow!(
                "ip-api lookup failed: {}",
                self.message.unwrap_or(self.status)
            ));
        }

        // ip-api reports missing strings as ""
        let present = |value: Option<String>| value.filter(|v| !v.is_empty());

        Ok(GeoInfo {
            country: present(self.country),
            country_code: present(self.country_code),
            region: present(self.region_name),
            city: present(self.city),
            postal_code: present(self.zip),
            lat: self.lat,
            lon: self.lon,
            timezone: present(self.timezone),
            isp: present(self.isp),
            org: present(self.org),
            as_number: present(self.as_number),
            as_name: present(self.as_name),
            mobile: self.mobile,
            hosting: self.hosting,
            proxy_detected: self.proxy,
        })
    }
}

/// GeoLocator for looking up IP addresses in MMDB databases
#[derive(Clone)]
pub struct GeoLocator {
    reader: Arc<Reader<Vec<u8>>>,
}

impl GeoLocator {
    /// Create a new GeoLocator from an MMDB file path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = Reader::open_readfile(path)?;
        Ok(Self {
            reader: Arc::new(reader),
        })
    }

    /// Look up the location for an IpAddr
    pub fn lookup_ip(&self, ip: IpAddr) -> Result<GeoInfo> {
        let lookup_result = self.reader.lookup(ip)?;

        let city: Option<geoip2::City> = lookup_result.decode()?;
        let Some(city) = city else {
            return Ok(GeoInfo::default());
        };

        Ok(GeoInfo {
            country: city.country.names.english.map(String::from),
            country_code: city.country.iso_code.map(String::from),
            city: city.city.names.english.map(String::from),
            lat: city.location.latitude,
            lon: city.location.longitude,
            timezone: city.location.time_zone.map(String::from),
            ..Default::default()
        })
    }
}

/// Where enrichment data comes from
#[derive(Clone)]
pub enum GeoSource {
    /// Query an ip-api compatible JSON endpoint
    IpApi { client: Client, endpoint: String },
    /// Read from a local MMDB database
    Mmdb(GeoLocator),
}

impl GeoSource {
    /// ip-api source with its own request timeout
    pub fn ip_api(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(GeoSource::IpApi {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Look up the geolocation for an IP address string
    pub async fn lookup(&self, ip_str: &str) -> Result<GeoInfo> {
        let ip: IpAddr = ip_str.trim().parse()?;

        match self {
            GeoSource::IpApi { client, endpoint } => {
                let url = format!("{}/{}", endpoint.trim_end_matches('/'), ip);
                let body: IpApiResponse = client
                    .get(url)
                    .query(&[("fields", IP_API_FIELDS)])
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                body.into_geo()
            }
            GeoSource::Mmdb(locator) => locator.lookup_ip(ip),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_info_default() {
        let geo = GeoInfo::default();
        assert!(geo.country.is_none() && geo.city.is_none() && geo.isp.is_none());
        assert_eq!(geo.short_display(), "Unknown");
        assert!(!geo.mobile && !geo.hosting && !geo.proxy_detected);
    }

    #[test]
    fn test_geo_info_short_display() {
        let mut geo = GeoInfo::with_country(Some("United States".to_string()), Some("US".to_string()));
        assert_eq!(geo.short_display(), "US");

        geo.city = Some("New York".to_string());
        assert_eq!(geo.short_display(), "New York, US");
    }

    #[test]
    fn test_ip_api_success_mapping() {
        let body = r#"{
            "status": "success",
            "country": "Germany",
            "countryCode": "DE",
            "regionName": "Hesse",
            "city": "Frankfurt am Main",
            "zip": "",
            "lat": 50.1109,
            "lon": 8.6821,
            "timezone": "Europe/Berlin",
            "isp": "Acme, Inc",
            "org": "Acme",
            "as": "AS64500 Acme",
            "asname": "ACME-AS",
            "mobile": false,
            "proxy": true,
            "hosting": true
        }"#;
        let response: IpApiResponse = serde_json::from_str(body).unwrap();
        let geo = response.into_geo().unwrap();

        assert_eq!(geo.country.as_deref(), Some("Germany"));
        assert_eq!(geo.country_code.as_deref(), Some("DE"));
        assert_eq!(geo.region.as_deref(), Some("Hesse"));
        assert_eq!(geo.postal_code, None);
        assert_eq!(geo.lat, Some(50.1109));
        assert_eq!(geo.isp.as_deref(), Some("Acme, Inc"));
        assert_eq!(geo.as_number.as_deref(), Some("AS64500 Acme"));
        assert_eq!(geo.as_name.as_deref(), Some("ACME-AS"));
        assert!(geo.hosting && geo.proxy_detected && !geo.mobile);
    }

    #[test]
    fn test_ip_api_failure_status() {
        let body = r#"{"status": "fail", "message": "private range"}"#;
        let response: IpApiResponse = serde_json::from_str(body).unwrap();
        let err = response.into_geo().unwrap_err();
        assert!(err.to_string().contains("private range"));
    }
}
