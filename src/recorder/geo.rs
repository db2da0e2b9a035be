use crate::config::RecorderConfig;
use crate::error::{ArScanError, Result};
use crate::records::ScanLocation;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Best-effort coarse location of the scanning client
#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn locate(&self) -> Result<ScanLocation>;
}

#[derive(Debug, Deserialize)]
struct GeoResponse {
    #[serde(default)]
    country_name: Option<String>,
    #[serde(default)]
    city: Option<String>,
}

/// IP geolocation over HTTP (`country_name` / `city` JSON fields)
pub struct HttpGeoLocator {
    client: reqwest::Client,
    url: String,
}

impl HttpGeoLocator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ArScanError::component("geolocation", &e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &RecorderConfig) -> Result<Self> {
        Self::new(
            config.geolocation_url.clone(),
            Duration::from_millis(config.geolocation_timeout_ms),
        )
    }
}

#[async_trait]
impl GeoLocator for HttpGeoLocator {
    async fn locate(&self) -> Result<ScanLocation> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ArScanError::component("geolocation", &e.to_string()))?;

        let body: GeoResponse = response
            .json()
            .await
            .map_err(|e| ArScanError::component("geolocation", &e.to_string()))?;

        Ok(ScanLocation {
            country: body.country_name.filter(|s| !s.is_empty()),
            city: body.city.filter(|s| !s.is_empty()),
        })
    }
}

/// Fixed answer, or a failing locator when built with `None`
#[derive(Debug, Clone, Default)]
pub struct StaticGeoLocator {
    location: Option<ScanLocation>,
}

impl StaticGeoLocator {
    pub fn new(location: Option<ScanLocation>) -> Self {
        Self { location }
    }

    pub fn at(country: &str, city: &str) -> Self {
        Self::new(Some(ScanLocation {
            country: Some(country.to_string()),
            city: Some(city.to_string()),
        }))
    }
}

#[async_trait]
impl GeoLocator for StaticGeoLocator {
    async fn locate(&self) -> Result<ScanLocation> {
        self.location
            .clone()
            .ok_or_else(|| ArScanError::component("geolocation", "lookup unavailable"))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum LookupState {
    Idle,
    Pending,
    Resolved(ScanLocation),
    Failed,
}

/// Caches the client location so recording a scan never waits on the network.
///
/// The first read kicks off a background lookup and returns `None`; later
/// reads return whatever the lookup produced. A failed lookup is retried on
/// the next prefetch.
#[derive(Clone)]
pub struct LocationCache {
    locator: Arc<dyn GeoLocator>,
    timeout: Duration,
    state: Arc<RwLock<LookupState>>,
}

impl LocationCache {
    pub fn new(locator: Arc<dyn GeoLocator>, timeout: Duration) -> Self {
        Self {
            locator,
            timeout,
            state: Arc::new(RwLock::new(LookupState::Idle)),
        }
    }

    /// Cached location without blocking; starts a lookup if none is cached
    pub fn current(&self) -> Option<ScanLocation> {
        if let LookupState::Resolved(location) = &*self.state.read() {
            return Some(location.clone());
        }
        self.prefetch();
        None
    }

    /// Start a background lookup unless one is running or already succeeded.
    /// Must be called from within a tokio runtime.
    pub fn prefetch(&self) {
        {
            let mut state = self.state.write();
            if matches!(*state, LookupState::Pending | LookupState::Resolved(_)) {
                return;
            }
            *state = LookupState::Pending;
        }

        let cache = self.clone();
        tokio::spawn(async move {
            cache.run_lookup().await;
        });
    }

    /// Perform a lookup now and wait for it, bounded by the configured timeout
    pub async fn refresh(&self) -> Option<ScanLocation> {
        *self.state.write() = LookupState::Pending;
        self.run_lookup().await
    }

    async fn run_lookup(&self) -> Option<ScanLocation> {
        let outcome = tokio::time::timeout(self.timeout, self.locator.locate()).await;
        let next = match outcome {
            Ok(Ok(location)) => {
                debug!("Resolved client location: {:?}", location);
                LookupState::Resolved(location)
            }
            Ok(Err(e)) => {
                warn!("Location lookup failed: {}", e);
                LookupState::Failed
            }
            Err(_) => {
                warn!("Location lookup timed out after {:?}", self.timeout);
                LookupState::Failed
            }
        };

        let location = match &next {
            LookupState::Resolved(location) => Some(location.clone()),
            _ => None,
        };
        *self.state.write() = next;
        location
    }
}
