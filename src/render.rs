//! Markdown text for chat replies and plain CLI output.

use chrono::DateTime;
use std::fmt::Write;

use crate::air_quality::{aqi_label, rank_pollutants};
use crate::forecast::daily::group_into_days;
use crate::forecast::gateway::{GatewayError, StaleWeather};
use crate::forecast::types::{AirPollutionResponse, CurrentWeatherResponse, Forecast3hResponse};
use crate::forecast::Coordinate;
use crate::notify::{Alert, AlertKind};

pub const HELP_TEXT: &str = "*Weather bot*\n\n\
/weather <city> - current weather\n\
/forecast - 5-day forecast for your saved location\n\
/forecast <1-5> - 3-hour details for one day\n\
/air [city] - air quality\n\
/compare <city1>, <city2> - compare two cities\n\
/extended - weather and air quality for the next location you share\n\
/notify - toggle rain and snow alerts\n\
/stale - accept the last known weather when live data is down\n\n\
Share your location to save it.\n\
Type @ and the bot name followed by a city in any chat for inline weather.";

/// Backslash-escape the characters legacy Markdown treats as entity markers.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn clock(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%H:%M UTC").to_string())
        .unwrap_or_else(|| "n/a".to_string())
}

pub fn current_weather(weather: &CurrentWeatherResponse, place: Option<&str>) -> String {
    let place = place
        .or(weather.name.as_deref())
        .filter(|p| !p.is_empty())
        .unwrap_or("unknown place");
    let description = weather
        .condition()
        .map(|c| capitalize(&c.description))
        .unwrap_or_default();

    format!(
        "*Weather in {}*\n\n\
         Temperature: *{}°C*\n\
         Feels like: *{}°C*\n\
         {}\n\
         Humidity: {}%\n\
         Wind: {} m/s\n\
         Pressure: {} hPa\n",
        escape_markdown(place),
        weather.main.temp,
        weather.main.feels_like,
        escape_markdown(&description),
        weather.main.humidity,
        weather.wind.speed,
        weather.main.pressure,
    )
}

pub fn stale_notice(stale: &StaleWeather) -> String {
    let whose = match &stale.city {
        Some(city) => format!("{} ({})", escape_markdown(city), stale.coordinate),
        None => stale.coordinate.to_string(),
    };
    format!(
        "Live weather is unavailable. Cached data for {} from {} ago is available.",
        whose,
        stale.describe_age()
    )
}

pub fn stale_prompt(stale: &StaleWeather) -> String {
    format!("{}\nUse cached data? (y/n) ", stale_notice(stale))
}

pub fn gateway_error(error: &GatewayError) -> String {
    match error {
        GatewayError::CityNotFound(city) => format!("City \"{}\" not found", escape_markdown(city)),
        GatewayError::Unreachable(_) => "Weather service is unreachable, try again later".to_string(),
        GatewayError::Status(401) => "Weather service rejected the API key".to_string(),
        GatewayError::Status(code) => format!("Weather service returned HTTP {}", code),
        GatewayError::Malformed { context, .. } => {
            format!("Weather service sent unexpected {} data", context)
        }
    }
}

/// One line per day: date, dominant condition, average and range.
pub fn forecast(forecast: &Forecast3hResponse) -> String {
    let days = group_into_days(forecast);
    if days.is_empty() {
        return "No forecast data".to_string();
    }

    let mut text = format!("*5-day forecast for {}*\n\n", escape_markdown(&forecast.city.name));
    for (n, day) in days.iter().enumerate() {
        let _ = writeln!(
            text,
            "{}. {}: {}, avg {:.1}°C ({:.0}..{:.0}°C)",
            n + 1,
            day.date.format("%a %d.%m"),
            day.dominant_condition().unwrap_or("n/a"),
            day.avg_temp_c,
            day.min_temp_c,
            day.max_temp_c,
        );
    }
    text
}

/// Every 3-hour entry of the `day`-th forecast day, counting from 1.
pub fn forecast_day(forecast: &Forecast3hResponse, day: usize) -> String {
    let days = group_into_days(forecast);
    let Some(summary) = day.checked_sub(1).and_then(|i| days.get(i)) else {
        return format!("No forecast data for day {} of {}", day, days.len());
    };

    let mut text = format!(
        "*{}, {}*\n\n",
        escape_markdown(&forecast.city.name),
        summary.date.format("%a %d.%m.%Y")
    );
    for entry in &summary.entries {
        let time = entry
            .dt_txt
            .split_whitespace()
            .nth(1)
            .and_then(|t| t.get(..5))
            .unwrap_or("--:--");
        let description = entry
            .condition()
            .map(|c| capitalize(&c.description))
            .unwrap_or_default();
        let _ = writeln!(
            text,
            "*{}* {:.1}°C, {}\nHumidity {}%, wind {} m/s\n",
            time,
            entry.main.temp,
            escape_markdown(&description),
            entry.main.humidity,
            entry.wind.speed,
        );
    }
    text
}

/// Plain-text summary for an inline result: "Light snow, humidity 80%".
pub fn weather_headline(weather: &CurrentWeatherResponse) -> String {
    match weather.condition() {
        Some(c) => format!("{}, humidity {}%", capitalize(&c.description), weather.main.humidity),
        None => format!("Humidity {}%", weather.main.humidity),
    }
}

pub fn air_quality(air: &AirPollutionResponse, place: &str) -> String {
    let place = escape_markdown(place);
    let Some(current) = air.current() else {
        return format!("No air quality data for {}", place);
    };

    let mut text = format!(
        "*Air quality in {}*\nAQI: {} - {}\n\n",
        place,
        current.main.aqi,
        aqi_label(current.main.aqi)
    );
    for (pollutant, value, level) in rank_pollutants(&current.components) {
        let _ = writeln!(text, "{}: {:.2} µg/m³ ({})", pollutant.symbol(), value, level.label());
    }
    text
}

pub fn comparison(
    first_name: &str,
    first: &CurrentWeatherResponse,
    second_name: &str,
    second: &CurrentWeatherResponse,
) -> String {
    // a backtick would close the code block early
    let short = |name: &str| name.chars().filter(|c| *c != '`').take(10).collect::<String>();

    let mut text = String::from("*Weather comparison*\n\n```\n");
    let _ = writeln!(text, "{:<12} {:<12} {:<12}", "", short(first_name), short(second_name));
    let _ = writeln!(text, "{}", "-".repeat(36));
    let _ = writeln!(
        text,
        "{:<12} {:>6.1}°C     {:>6.1}°C",
        "Temp", first.main.temp, second.main.temp
    );
    let _ = writeln!(
        text,
        "{:<12} {:>6.1}°C     {:>6.1}°C",
        "Feels like", first.main.feels_like, second.main.feels_like
    );
    let _ = writeln!(
        text,
        "{:<12} {:>6}%      {:>6}%",
        "Humidity", first.main.humidity, second.main.humidity
    );
    let _ = writeln!(
        text,
        "{:<12} {:>6.1} m/s    {:>6.1} m/s",
        "Wind", first.wind.speed, second.wind.speed
    );
    text.push_str("```\n");

    let diff = (first.main.temp - second.main.temp).abs();
    if diff < 0.05 {
        text.push_str("\nSame temperature in both cities");
    } else {
        let warmer = if first.main.temp > second.main.temp {
            first_name
        } else {
            second_name
        };
        let _ = write!(text, "\n*{}* is warmer by *{:.1}°C*", escape_markdown(warmer), diff);
    }
    text
}

/// Weather plus air quality for a shared location.
pub fn extended(
    coordinate: Coordinate,
    place: Option<&str>,
    weather: &CurrentWeatherResponse,
    air: Option<&AirPollutionResponse>,
) -> String {
    let mut text = String::from("*Extended data*\n");
    if let Some(place) = place {
        let _ = writeln!(text, "{}", escape_markdown(place));
    }
    let _ = writeln!(text, "{}\n", coordinate);
    text.push_str(&current_weather(weather, place));
    let _ = writeln!(text, "Clouds: {}%", weather.clouds.all);
    let _ = writeln!(text, "Sunrise: {}", clock(weather.sys.sunrise));
    let _ = writeln!(text, "Sunset: {}", clock(weather.sys.sunset));

    if let Some(current) = air.and_then(|a| a.current()) {
        let _ = write!(
            text,
            "\n*Air quality*\nAQI: {} - {}\n",
            current.main.aqi,
            aqi_label(current.main.aqi)
        );
        let c = &current.components;
        let _ = writeln!(text, "CO: {} µg/m³", c.co);
        let _ = writeln!(text, "NO2: {} µg/m³", c.no2);
        let _ = writeln!(text, "O3: {} µg/m³", c.o3);
        let _ = writeln!(text, "PM2.5: {} µg/m³", c.pm2_5);
        let _ = writeln!(text, "PM10: {} µg/m³", c.pm10);
    }
    text
}

pub fn alert_text(alert: &Alert) -> String {
    let warning = match alert.kind {
        AlertKind::Rain => "*Heads up!*\nRain is expected in the next 12 hours. Take an umbrella!",
        AlertKind::Snow => "*Heads up!*\nSnow is expected in the next 12 hours. Dress warmly!",
    };
    format!("{}\n\nCurrent temperature: {}°C", warning, alert.current_temp)
}
