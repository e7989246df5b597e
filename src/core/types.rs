//! # Core Data Types
//!
//! Wire and domain types shared by every layer of the lookup gateway: the
//! search input, the pickup points it resolves to, and the response envelope
//! that tells callers where the data came from.

use crate::core::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Deserializer, Serialize};

/// Pickup-point search input as received from the storefront.
///
/// At least one of `city` / `postal_code` must be present (see [`SearchQuery::validate`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub city: Option<String>,

    #[serde(default, alias = "postalCode", alias = "postcode")]
    pub postal_code: Option<String>,

    #[serde(default)]
    pub provider: Option<String>,

    /// Accepts either a list or a single comma-separated string
    #[serde(
        default,
        rename = "courierServices",
        alias = "courier_services",
        deserialize_with = "deserialize_courier_services"
    )]
    pub courier_services: Vec<String>,
}

impl SearchQuery {
    pub fn for_city(city: impl Into<String>) -> Self {
        Self {
            city: Some(city.into()),
            ..Default::default()
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_postal_code(mut self, postal_code: impl Into<String>) -> Self {
        self.postal_code = Some(postal_code.into());
        self
    }

    pub fn with_courier_services<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.courier_services = services.into_iter().map(Into::into).collect();
        self
    }

    /// City with surrounding whitespace removed, `None` when blank
    pub fn city(&self) -> Option<&str> {
        non_blank(self.city.as_deref())
    }

    pub fn postal_code(&self) -> Option<&str> {
        non_blank(self.postal_code.as_deref())
    }

    pub fn provider(&self) -> Option<&str> {
        non_blank(self.provider.as_deref())
    }

    /// Reject queries that carry neither a city nor a postal code
    pub fn validate(&self) -> GatewayResult<()> {
        if self.city().is_none() && self.postal_code().is_none() {
            return Err(GatewayError::validation(
                "city or postal_code is required",
            ));
        }
        Ok(())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn deserialize_courier_services<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<OneOrMany>::deserialize(deserializer)?;
    let services = match raw {
        None => Vec::new(),
        Some(OneOrMany::One(joined)) => joined.split(',').map(str::to_string).collect(),
        Some(OneOrMany::Many(list)) => list,
    };
    Ok(services
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Geographic position of a pickup point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// A physical parcel collection location (locker, courier branch, partner shop)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupPoint {
    pub id: String,
    pub provider: String,
    pub name: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    /// Untransformed upstream record
    #[serde(default)]
    pub raw_payload: serde_json::Value,
}

/// Where the points in a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupSource {
    /// Fresh upstream answer
    Upstream,
    /// Served from a fresh cache entry
    Cache,
    /// Upstream failed or returned nothing; synthetic data
    MockFallback,
    /// Breaker open; stale cache entry reused
    CacheBreakerOpen,
    /// Breaker open and nothing cached; synthetic data
    MockBreakerOpen,
}

impl LookupSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upstream => "upstream",
            Self::Cache => "cache",
            Self::MockFallback => "mock_fallback",
            Self::CacheBreakerOpen => "cache_breaker_open",
            Self::MockBreakerOpen => "mock_breaker_open",
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, Self::MockFallback | Self::MockBreakerOpen)
    }
}

impl std::fmt::Display for LookupSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Success body of the search endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub points: Vec<PickupPoint>,
    pub source: LookupSource,
    pub count: usize,
    /// Remaining freshness of the backing cache entry, in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}
