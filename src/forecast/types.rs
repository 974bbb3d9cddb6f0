use serde::{Deserialize, Serialize};

use super::Endpoint;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentWeatherResponse {
    #[serde(default)]
    pub name: Option<String>,
    pub main: WeatherMain,
    pub wind: WeatherWind,
    pub weather: Vec<WeatherCondition>,
    pub clouds: WeatherClouds,
    pub sys: WeatherSys,
}

impl CurrentWeatherResponse {
    pub fn condition(&self) -> Option<&WeatherCondition> {
        self.weather.first()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherMain {
    pub temp: f64,
    pub feels_like: f64,
    pub humidity: f64,
    pub pressure: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherWind {
    pub speed: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherCondition {
    pub main: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherClouds {
    pub all: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherSys {
    pub sunrise: i64,
    pub sunset: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast3hResponse {
    pub city: Forecast3hCity,
    pub list: Vec<Forecast3hItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast3hItem {
    pub dt_txt: String,
    pub main: Forecast3hMain,
    pub weather: Vec<WeatherCondition>,
    pub wind: WeatherWind,
}

impl Forecast3hItem {
    pub fn condition(&self) -> Option<&WeatherCondition> {
        self.weather.first()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast3hMain {
    pub temp: f64,
    pub humidity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast3hCity {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirPollutionResponse {
    pub list: Vec<AirPollutionItem>,
}

impl AirPollutionResponse {
    pub fn current(&self) -> Option<&AirPollutionItem> {
        self.list.first()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirPollutionItem {
    pub main: AirQualityIndex,
    pub components: AirComponents,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirQualityIndex {
    pub aqi: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirComponents {
    pub co: f64,
    pub no: f64,
    pub no2: f64,
    pub o3: f64,
    pub so2: f64,
    pub pm2_5: f64,
    pub pm10: f64,
    pub nh3: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeResponse {
    pub name: String,
    pub state: Option<String>,
    pub country: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

impl GeocodeResponse {
    /// "Name (State)" or "Name (Country)" for telling same-named places apart.
    pub fn display_name(&self) -> String {
        match self.state.as_deref().or(self.country.as_deref()) {
            Some(region) if !region.is_empty() => format!("{} ({})", self.name, region),
            _ => self.name.clone(),
        }
    }
}

/// Checks a provider document against the shape its endpoint promises.
pub fn validate_payload(endpoint: Endpoint, payload: &serde_json::Value) -> Result<(), serde_json::Error> {
    match endpoint {
        Endpoint::CurrentWeather => CurrentWeatherResponse::deserialize(payload).map(|_| ()),
        Endpoint::Forecast => Forecast3hResponse::deserialize(payload).map(|_| ()),
        Endpoint::AirQuality => AirPollutionResponse::deserialize(payload).map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::mock;

    #[test]
    fn test_validate_accepts_provider_documents() {
        assert!(validate_payload(Endpoint::CurrentWeather, &mock::current_weather(-5.0)).is_ok());
        assert!(validate_payload(Endpoint::Forecast, &mock::forecast(&["Clear", "Rain"])).is_ok());
        assert!(validate_payload(Endpoint::AirQuality, &mock::air_pollution(2)).is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let payload = serde_json::json!({"main": {"temp": 1.0}});
        assert!(validate_payload(Endpoint::CurrentWeather, &payload).is_err());
        assert!(validate_payload(Endpoint::AirQuality, &serde_json::json!({})).is_err());
    }

    #[test]
    fn test_geocode_display_name() {
        let springfield = GeocodeResponse {
            name: "Springfield".to_string(),
            state: Some("Illinois".to_string()),
            country: Some("US".to_string()),
            lat: 39.78,
            lon: -89.65,
        };
        assert_eq!(springfield.display_name(), "Springfield (Illinois)");

        let paris = GeocodeResponse {
            name: "Paris".to_string(),
            state: None,
            country: Some("FR".to_string()),
            lat: 48.85,
            lon: 2.35,
        };
        assert_eq!(paris.display_name(), "Paris (FR)");
    }
}
