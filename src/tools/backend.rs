//! HTTP client for the booking backend and the OneMap geocoder.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::context::AuthHeader;
use crate::error::{Result, VaxError};
use crate::provider::http::{shared_client, status_to_error};
use crate::util::timeout::with_timeout;

pub const DEFAULT_ONEMAP_URL: &str = "https://www.onemap.gov.sg";

/// Thin JSON client over the booking backend. Every call carries its own timeout.
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    onemap_url: String,
    timeout: Duration,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            onemap_url: DEFAULT_ONEMAP_URL.to_string(),
            timeout,
        }
    }

    pub fn with_onemap_url(mut self, url: impl Into<String>) -> Self {
        self.onemap_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET `{base}{path}` with the caller's credentials. `Ok(None)` on 404.
    pub async fn get_json(
        &self,
        auth: &AuthHeader,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<Value>> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "backend GET");
        with_timeout(self.timeout, async {
            let resp = shared_client()
                .get(&url)
                .headers(auth.headers())
                .query(query)
                .send()
                .await?;
            let status = resp.status().as_u16();
            if status == 404 {
                return Ok(None);
            }
            if !resp.status().is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(status_to_error(status, &body));
            }
            Ok(Some(resp.json::<Value>().await?))
        })
        .await
    }

    /// Like [`get_json`](Self::get_json) but a 404 is an error.
    pub async fn get_required(
        &self,
        auth: &AuthHeader,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Value> {
        self.get_json(auth, path, query)
            .await?
            .ok_or_else(|| VaxError::api(404, format!("{path} not found")))
    }

    /// Resolve a free-text place name to coordinates. `Ok(None)` when nothing matches.
    pub async fn geocode(&self, location_name: &str) -> Result<Option<GeoLocation>> {
        let url = format!("{}/api/common/elastic/search", self.onemap_url);
        debug!(location = location_name, "OneMap search");
        with_timeout(self.timeout, async {
            let resp = shared_client()
                .get(&url)
                .query(&[
                    ("searchVal", location_name),
                    ("returnGeom", "Y"),
                    ("getAddrDetails", "Y"),
                    ("pageNum", "1"),
                ])
                .send()
                .await?;
            if !resp.status().is_success() {
                return Ok(None);
            }
            let data: OneMapSearch = resp.json().await?;
            if data.found == 0 {
                return Ok(None);
            }
            data.results
                .into_iter()
                .next()
                .map(GeoLocation::try_from)
                .transpose()
        })
        .await
    }
}

/// A geocoded place.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoLocation {
    pub postal_code: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Deserialize)]
struct OneMapSearch {
    #[serde(default)]
    found: u64,
    #[serde(default)]
    results: Vec<OneMapResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "UPPERCASE")]
struct OneMapResult {
    #[serde(default)]
    postal: String,
    #[serde(default)]
    address: String,
    latitude: String,
    longitude: String,
}

impl TryFrom<OneMapResult> for GeoLocation {
    type Error = VaxError;

    fn try_from(r: OneMapResult) -> Result<Self> {
        let parse = |s: &str| {
            s.parse::<f64>()
                .map_err(|e| VaxError::api(200, format!("bad OneMap coordinate {s:?}: {e}")))
        };
        Ok(Self {
            latitude: parse(&r.latitude)?,
            longitude: parse(&r.longitude)?,
            postal_code: r.postal,
            address: r.address,
        })
    }
}
