//! Per-query orchestration of the response cache, the retrying fetcher and
//! the stale-data recovery policy.

use chrono::{Duration, Utc};
use serde_json::Value;
use thiserror::Error;

use super::cache::{TieredCache, FALLBACK_MAX_AGE_HOURS};
use super::retry::{Classification, FetchError, Fetched, RetryingFetcher};
use super::types::{validate_payload, GeocodeResponse};
use super::{Coordinate, Endpoint};
use crate::config::Config;
use crate::utils::format_age;

/// Why a query produced no usable data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("weather provider unreachable: {0}")]
    Unreachable(String),
    #[error("weather provider returned HTTP {0}")]
    Status(u16),
    #[error("unexpected {context} payload: {detail}")]
    Malformed { context: String, detail: String },
    #[error("city {0:?} not found")]
    CityNotFound(String),
}

/// Last known current weather offered in place of a failed live fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct StaleWeather {
    pub payload: Value,
    pub age: Duration,
    /// Where the snapshot was taken. Not necessarily the queried coordinate.
    pub city: Option<String>,
    pub coordinate: Coordinate,
}

impl StaleWeather {
    pub fn describe_age(&self) -> String {
        format_age(self.age)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Fresh(Value),
    /// Live data failed; a recent snapshot exists but needs the caller's
    /// confirmation before it is treated as valid.
    StaleAvailable(StaleWeather),
    Unavailable(GatewayError),
}

impl QueryOutcome {
    pub fn fresh(self) -> Option<Value> {
        match self {
            Self::Fresh(payload) => Some(payload),
            _ => None,
        }
    }

    /// Resolve the outcome given the caller's answer to "use stale data?".
    pub fn into_payload(self, accept_stale: bool) -> Option<Value> {
        match self {
            Self::Fresh(payload) => Some(payload),
            Self::StaleAvailable(stale) if accept_stale => Some(stale.payload),
            _ => None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh(_))
    }
}

/// Current weather for one geocoding candidate.
#[derive(Debug, Clone)]
pub struct CityWeather {
    pub location: GeocodeResponse,
    pub outcome: QueryOutcome,
}

pub struct WeatherGateway {
    config: Config,
    fetcher: RetryingFetcher,
    cache: TieredCache,
}

impl WeatherGateway {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let fetcher = RetryingFetcher::new(config.retry_config())?;
        let cache = TieredCache::new(&config.api_cache_dir, config.fallback_path())?;
        Ok(Self::with_parts(config, fetcher, cache))
    }

    pub fn with_parts(config: Config, fetcher: RetryingFetcher, cache: TieredCache) -> Self {
        Self {
            config,
            fetcher,
            cache,
        }
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    pub fn provider_url(&self, coordinate: Coordinate, endpoint: Endpoint) -> String {
        let mut url = format!(
            "{}{}?lat={}&lon={}&appid={}",
            self.config.openweather_base_url,
            endpoint.path(&self.config),
            coordinate.lat,
            coordinate.lon,
            self.config.api_key
        );
        if endpoint.is_localized() {
            url.push_str("&units=metric&lang=");
            url.push_str(&urlencoding::encode(&self.config.openweather_lang));
        }
        url
    }

    /// Run a cache operation on the blocking pool. A panicked task counts
    /// as a miss.
    async fn with_cache<T, F>(&self, op: F) -> Option<T>
    where
        F: FnOnce(&TieredCache) -> T + Send + 'static,
        T: Send + 'static,
    {
        let cache = self.cache.clone();
        match tokio::task::spawn_blocking(move || op(&cache)).await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Cache task failed: {}", e);
                None
            }
        }
    }

    pub async fn get(&self, coordinate: Coordinate, endpoint: Endpoint) -> QueryOutcome {
        let cached = self
            .with_cache(move |cache| cache.get_response(coordinate, endpoint))
            .await
            .flatten();
        if let Some(payload) = cached {
            return QueryOutcome::Fresh(payload);
        }

        let url = self.provider_url(coordinate, endpoint);
        let fetched = match self.fetcher.fetch(&url).await {
            Ok(fetched) => fetched,
            Err(FetchError::Unreachable { attempts, last_error }) => {
                tracing::error!(
                    "{} for {} failed after {} attempts: {}",
                    endpoint,
                    coordinate,
                    attempts,
                    last_error
                );
                return self.recover(endpoint, GatewayError::Unreachable(last_error)).await;
            }
            Err(e) => {
                tracing::error!("{} request for {} could not be sent: {}", endpoint, coordinate, e);
                return QueryOutcome::Unavailable(GatewayError::Unreachable(e.to_string()));
            }
        };

        match fetched.classification() {
            Classification::Success if fetched.status == reqwest::StatusCode::OK => {
                self.accept(coordinate, endpoint, &fetched).await
            }
            Classification::Transient => {
                self.recover(endpoint, GatewayError::Status(fetched.status.as_u16())).await
            }
            _ => {
                tracing::warn!("{} for {} returned HTTP {}", endpoint, coordinate, fetched.status);
                QueryOutcome::Unavailable(GatewayError::Status(fetched.status.as_u16()))
            }
        }
    }

    pub async fn current_weather(&self, coordinate: Coordinate) -> QueryOutcome {
        self.get(coordinate, Endpoint::CurrentWeather).await
    }

    pub async fn forecast(&self, coordinate: Coordinate) -> QueryOutcome {
        self.get(coordinate, Endpoint::Forecast).await
    }

    pub async fn air_quality(&self, coordinate: Coordinate) -> QueryOutcome {
        self.get(coordinate, Endpoint::AirQuality).await
    }

    /// The fallback snapshot, if it is recent enough to offer.
    pub async fn stale_fallback(&self) -> Option<StaleWeather> {
        let snapshot = self
            .with_cache(|cache| {
                if !cache.snapshot_is_fresh(Duration::hours(FALLBACK_MAX_AGE_HOURS)) {
                    return None;
                }
                cache.get_fallback_snapshot()
            })
            .await
            .flatten();
        let Some(snapshot) = snapshot else {
            tracing::debug!("No fallback snapshot recent enough to offer");
            return None;
        };

        Some(StaleWeather {
            age: snapshot.age_at(Utc::now()),
            payload: snapshot.weather,
            city: snapshot.city,
            coordinate: snapshot.coordinate,
        })
    }

    /// Resolve a city name to up to `geocode_limit` candidate locations.
    pub async fn geocode(&self, city: &str) -> Result<Vec<GeocodeResponse>, GatewayError> {
        let url = format!(
            "{}{}?q={}&limit={}&appid={}",
            self.config.openweather_base_url,
            self.config.openweather_geocode_direct_path,
            urlencoding::encode(city),
            self.config.geocode_limit,
            self.config.api_key
        );

        let fetched = self.fetcher.fetch(&url).await.map_err(|e| {
            tracing::error!("Geocoding {:?} failed: {}", city, e);
            GatewayError::Unreachable(e.to_string())
        })?;

        if fetched.status != reqwest::StatusCode::OK {
            tracing::warn!("Geocoding {:?} returned HTTP {}", city, fetched.status);
            return Err(GatewayError::Status(fetched.status.as_u16()));
        }

        let mut candidates: Vec<GeocodeResponse> =
            serde_json::from_str(&fetched.body).map_err(|e| {
                tracing::warn!("Malformed geocoding response for {:?}: {}", city, e);
                GatewayError::Malformed {
                    context: "geocoding".to_string(),
                    detail: e.to_string(),
                }
            })?;

        if candidates.is_empty() {
            return Err(GatewayError::CityNotFound(city.to_string()));
        }
        candidates.truncate(self.config.geocode_limit.max(1) as usize);
        Ok(candidates)
    }

    /// Current weather for every candidate a city name resolves to, in
    /// provider order. A failed candidate keeps its slot.
    pub async fn current_weather_for_city(&self, city: &str) -> Result<Vec<CityWeather>, GatewayError> {
        let candidates = self.geocode(city).await?;
        let mut results = Vec::with_capacity(candidates.len());

        for location in candidates {
            let coordinate = Coordinate::new(location.lat, location.lon);
            let outcome = self.current_weather(coordinate).await;
            results.push(CityWeather { location, outcome });
        }

        Ok(results)
    }

    async fn accept(&self, coordinate: Coordinate, endpoint: Endpoint, fetched: &Fetched) -> QueryOutcome {
        let payload: Value = match serde_json::from_str(&fetched.body) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("{} for {} is not valid JSON: {}", endpoint, coordinate, e);
                return QueryOutcome::Unavailable(GatewayError::Malformed {
                    context: endpoint.to_string(),
                    detail: e.to_string(),
                });
            }
        };

        if let Err(e) = validate_payload(endpoint, &payload) {
            tracing::warn!("{} for {} has an unexpected shape: {}", endpoint, coordinate, e);
            return QueryOutcome::Unavailable(GatewayError::Malformed {
                context: endpoint.to_string(),
                detail: e.to_string(),
            });
        }

        let record = payload.clone();
        let stored = self
            .with_cache(move |cache| {
                let response = cache.put_response(coordinate, endpoint, &record);
                let snapshot = endpoint.has_fallback().then(|| {
                    let city = record.get("name").and_then(Value::as_str);
                    cache.put_fallback_snapshot(city, coordinate, &record)
                });
                (response, snapshot)
            })
            .await;

        if let Some((response, snapshot)) = stored {
            if let Err(e) = response {
                tracing::warn!("Failed to cache {} for {}: {}", endpoint, coordinate, e);
            }
            if let Some(Err(e)) = snapshot {
                tracing::warn!("Failed to update fallback snapshot: {}", e);
            }
        }

        tracing::info!("Fetched {} for {} in {} attempt(s)", endpoint, coordinate, fetched.attempts);
        QueryOutcome::Fresh(payload)
    }

    async fn recover(&self, endpoint: Endpoint, error: GatewayError) -> QueryOutcome {
        if !endpoint.has_fallback() {
            return QueryOutcome::Unavailable(error);
        }

        match self.stale_fallback().await {
            Some(stale) => {
                tracing::info!(
                    "Offering {} old fallback snapshot for {}",
                    stale.describe_age(),
                    stale.city.as_deref().unwrap_or("unknown city")
                );
                QueryOutcome::StaleAvailable(stale)
            }
            None => QueryOutcome::Unavailable(error),
        }
    }
}
