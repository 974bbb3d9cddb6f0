//! Provider documents shaped like real OpenWeather responses, for tests.

use chrono::{Duration, NaiveDate};
use serde_json::{json, Value};

pub fn current_weather(temp: f64) -> Value {
    current_weather_named("Moscow", temp)
}

pub fn current_weather_named(name: &str, temp: f64) -> Value {
    json!({
        "name": name,
        "main": {
            "temp": temp,
            "feels_like": temp - 4.0,
            "humidity": 81,
            "pressure": 1012
        },
        "wind": {"speed": 3.6},
        "weather": [{"id": 600, "main": "Snow", "description": "небольшой снег", "icon": "13d"}],
        "clouds": {"all": 90},
        "sys": {"sunrise": 1_700_000_000_i64, "sunset": 1_700_030_000_i64}
    })
}

/// One 3-hour entry per condition group, starting at 2024-01-15 00:00.
pub fn forecast(conditions: &[&str]) -> Value {
    let start = NaiveDate::from_ymd_opt(2024, 1, 15)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();

    let list: Vec<Value> = conditions
        .iter()
        .enumerate()
        .map(|(i, main)| {
            let ts = start + Duration::hours(3 * i as i64);
            json!({
                "dt": ts.and_utc().timestamp(),
                "dt_txt": ts.format("%Y-%m-%d %H:%M:%S").to_string(),
                "main": {"temp": -2.0 + i as f64, "humidity": 80},
                "weather": [{"main": main, "description": main.to_lowercase()}],
                "wind": {"speed": 4.0}
            })
        })
        .collect();

    json!({
        "city": {"name": "Moscow"},
        "cnt": list.len(),
        "list": list
    })
}

pub fn air_pollution(aqi: u8) -> Value {
    json!({
        "list": [{
            "main": {"aqi": aqi},
            "components": {
                "co": 230.31,
                "no": 0.0,
                "no2": 15.08,
                "o3": 62.94,
                "so2": 3.52,
                "pm2_5": 8.2,
                "pm10": 11.4,
                "nh3": 0.9
            }
        }]
    })
}

pub fn geocode(candidates: &[(&str, Option<&str>, f64, f64)]) -> Value {
    let items: Vec<Value> = candidates
        .iter()
        .map(|(name, state, lat, lon)| {
            json!({
                "name": name,
                "state": state,
                "country": "RU",
                "lat": lat,
                "lon": lon
            })
        })
        .collect();
    Value::Array(items)
}
