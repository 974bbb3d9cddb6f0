use chrono::{DateTime, NaiveDateTime, Utc};

/// Validate latitude and longitude coordinates
pub fn validate_coordinates(lat: f64, lon: f64) -> Result<(), String> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(format!("Invalid latitude: {}. Must be between -90 and 90", lat));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(format!("Invalid longitude: {}. Must be between -180 and 180", lon));
    }
    Ok(())
}

/// Replace the value of any `appid` query parameter so URLs can be logged.
pub fn redact_credentials(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };

    let query = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some(("appid", _)) => "appid=***".to_string(),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&");

    format!("{}?{}", base, query)
}

/// Parse an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Human-readable age of a cached record, e.g. "45 minutes" or "2 hours 5 minutes".
pub fn format_age(age: chrono::Duration) -> String {
    let minutes = age.num_minutes().max(0);
    let hours = minutes / 60;
    let rest = minutes % 60;

    let unit = |n: i64, one: &str, many: &str| {
        if n == 1 {
            format!("1 {}", one)
        } else {
            format!("{} {}", n, many)
        }
    };

    match (hours, rest) {
        (0, m) => unit(m, "minute", "minutes"),
        (h, 0) => unit(h, "hour", "hours"),
        (h, m) => format!("{} {}", unit(h, "hour", "hours"), unit(m, "minute", "minutes")),
    }
}
