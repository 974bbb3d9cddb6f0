pub mod cache;
pub mod daily;
pub mod gateway;
#[cfg(test)]
pub mod mock;
pub mod retry;
pub mod types;

use serde::{Deserialize, Serialize};

use crate::config::Config;

/// A query location. Two coordinates that agree to 4 decimal places share
/// cache records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn cache_key(&self, endpoint: Endpoint) -> String {
        format!("{:.4}_{:.4}_{}", self.lat, self.lon, endpoint.cache_name())
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}, {:.4}", self.lat, self.lon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    CurrentWeather,
    Forecast,
    AirQuality,
}

impl Endpoint {
    pub fn cache_name(&self) -> &'static str {
        match self {
            Self::CurrentWeather => "weather",
            Self::Forecast => "forecast",
            Self::AirQuality => "air_pollution",
        }
    }

    pub fn path<'a>(&self, config: &'a Config) -> &'a str {
        match self {
            Self::CurrentWeather => &config.openweather_weather_path,
            Self::Forecast => &config.openweather_forecast_path,
            Self::AirQuality => &config.openweather_air_pollution_path,
        }
    }

    /// Only current weather is mirrored into the fallback snapshot.
    pub fn has_fallback(&self) -> bool {
        matches!(self, Self::CurrentWeather)
    }

    /// The air pollution endpoint takes neither units nor language.
    pub fn is_localized(&self) -> bool {
        !matches!(self, Self::AirQuality)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.cache_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_rounds_to_four_places() {
        let a = Coordinate::new(55.755_81, 37.617_64);
        let b = Coordinate::new(55.755_84, 37.617_61);
        assert_eq!(a.cache_key(Endpoint::CurrentWeather), "55.7558_37.6176_weather");
        assert_eq!(
            a.cache_key(Endpoint::CurrentWeather),
            b.cache_key(Endpoint::CurrentWeather)
        );
    }

    #[test]
    fn test_cache_key_separates_endpoints() {
        let c = Coordinate::new(-33.8688, 151.2093);
        assert_eq!(c.cache_key(Endpoint::Forecast), "-33.8688_151.2093_forecast");
        assert_eq!(c.cache_key(Endpoint::AirQuality), "-33.8688_151.2093_air_pollution");
    }

    #[test]
    fn test_endpoint_paths() {
        let config = Config::new("key", "http://localhost");
        assert_eq!(Endpoint::CurrentWeather.path(&config), "/data/2.5/weather");
        assert_eq!(Endpoint::Forecast.path(&config), "/data/2.5/forecast");
        assert_eq!(Endpoint::AirQuality.path(&config), "/data/2.5/air_pollution");
        assert!(Endpoint::CurrentWeather.has_fallback());
        assert!(!Endpoint::Forecast.has_fallback());
        assert!(!Endpoint::AirQuality.is_localized());
    }
}
