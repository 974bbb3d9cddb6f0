use anyhow::{anyhow, bail, Context};
use std::io::Write;

use crate::forecast::gateway::{QueryOutcome, StaleWeather, WeatherGateway};
use crate::forecast::types::{AirPollutionResponse, CurrentWeatherResponse, Forecast3hResponse};
use crate::forecast::Coordinate;
use crate::render;
use crate::utils::validate_coordinates;

pub const USAGE: &str = "\
Usage:
  weather-notifier weather  (--city <name> | --lat <lat> --lon <lon>) [--yes]
  weather-notifier forecast (--city <name> | --lat <lat> --lon <lon>)
  weather-notifier air      (--city <name> | --lat <lat> --lon <lon>)
  weather-notifier serve";

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    City(String),
    Coordinate(Coordinate),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub target: Target,
    /// Accept a stale snapshot without asking.
    pub assume_yes: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Weather(Query),
    Forecast(Query),
    Air(Query),
    Serve,
}

/// Parse everything after the program name.
pub fn parse_args<I>(args: I) -> anyhow::Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let name = args.next().ok_or_else(|| anyhow!("missing command"))?;

    let mut city: Option<String> = None;
    let mut lat: Option<f64> = None;
    let mut lon: Option<f64> = None;
    let mut assume_yes = false;

    while let Some(flag) = args.next() {
        match flag.as_str() {
            "--city" => {
                let value = args.next().ok_or_else(|| anyhow!("--city needs a value"))?;
                if value.trim().is_empty() {
                    bail!("--city must not be empty");
                }
                city = Some(value.trim().to_string());
            }
            "--lat" => lat = Some(parse_number("--lat", args.next())?),
            "--lon" => lon = Some(parse_number("--lon", args.next())?),
            "--yes" | "-y" => assume_yes = true,
            other => bail!("unknown argument {:?}", other),
        }
    }

    if name == "serve" {
        return Ok(Command::Serve);
    }

    let target = match (city, lat, lon) {
        (Some(city), None, None) => Target::City(city),
        (None, Some(lat), Some(lon)) => {
            validate_coordinates(lat, lon).map_err(|e| anyhow!(e))?;
            Target::Coordinate(Coordinate::new(lat, lon))
        }
        (Some(_), _, _) => bail!("use either --city or --lat/--lon, not both"),
        _ => bail!("expected --city <name> or both --lat and --lon"),
    };
    let query = Query { target, assume_yes };

    match name.as_str() {
        "weather" => Ok(Command::Weather(query)),
        "forecast" => Ok(Command::Forecast(query)),
        "air" => Ok(Command::Air(query)),
        other => bail!("unknown command {:?}", other),
    }
}

fn parse_number(flag: &str, value: Option<String>) -> anyhow::Result<f64> {
    let value = value.ok_or_else(|| anyhow!("{} needs a value", flag))?;
    value
        .trim()
        .parse()
        .with_context(|| format!("{} expects a number, got {:?}", flag, value))
}

pub async fn run(gateway: &WeatherGateway, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Weather(query) => weather(gateway, &query).await,
        Command::Forecast(query) => forecast(gateway, &query).await,
        Command::Air(query) => air(gateway, &query).await,
        Command::Serve => bail!("serve is handled by the server entry point"),
    }
}

async fn weather(gateway: &WeatherGateway, query: &Query) -> anyhow::Result<()> {
    let results = match &query.target {
        Target::Coordinate(coordinate) => {
            vec![(None, gateway.current_weather(*coordinate).await)]
        }
        Target::City(city) => gateway
            .current_weather_for_city(city)
            .await
            .map_err(|e| anyhow!(render::gateway_error(&e)))?
            .into_iter()
            .map(|result| (Some(result.location.display_name()), result.outcome))
            .collect(),
    };

    for (place, outcome) in results {
        let accept_stale = match &outcome {
            QueryOutcome::StaleAvailable(stale) => confirm_stale(stale, query.assume_yes).await?,
            QueryOutcome::Unavailable(e) => {
                println!("{}: {}", place.as_deref().unwrap_or("weather"), render::gateway_error(e));
                continue;
            }
            QueryOutcome::Fresh(_) => false,
        };

        match outcome.into_payload(accept_stale) {
            Some(payload) => {
                let weather: CurrentWeatherResponse = serde_json::from_value(payload)?;
                println!("{}", render::current_weather(&weather, place.as_deref()));
            }
            None => println!("No data"),
        }
    }
    Ok(())
}

async fn resolve(gateway: &WeatherGateway, target: &Target) -> anyhow::Result<(Coordinate, String)> {
    match target {
        Target::Coordinate(coordinate) => Ok((*coordinate, coordinate.to_string())),
        Target::City(city) => {
            let location = gateway
                .geocode(city)
                .await
                .map_err(|e| anyhow!(render::gateway_error(&e)))?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("city {:?} not found", city))?;
            Ok((Coordinate::new(location.lat, location.lon), location.display_name()))
        }
    }
}

async fn forecast(gateway: &WeatherGateway, query: &Query) -> anyhow::Result<()> {
    let (coordinate, _) = resolve(gateway, &query.target).await?;
    match gateway.forecast(coordinate).await {
        QueryOutcome::Fresh(payload) => {
            let forecast: Forecast3hResponse = serde_json::from_value(payload)?;
            println!("{}", render::forecast(&forecast));
        }
        QueryOutcome::Unavailable(e) => println!("{}", render::gateway_error(&e)),
        QueryOutcome::StaleAvailable(_) => println!("No data"),
    }
    Ok(())
}

async fn air(gateway: &WeatherGateway, query: &Query) -> anyhow::Result<()> {
    let (coordinate, place) = resolve(gateway, &query.target).await?;
    match gateway.air_quality(coordinate).await {
        QueryOutcome::Fresh(payload) => {
            let air: AirPollutionResponse = serde_json::from_value(payload)?;
            println!("{}", render::air_quality(&air, &place));
        }
        QueryOutcome::Unavailable(e) => println!("{}", render::gateway_error(&e)),
        QueryOutcome::StaleAvailable(_) => println!("No data"),
    }
    Ok(())
}

async fn confirm_stale(stale: &StaleWeather, assume_yes: bool) -> anyhow::Result<bool> {
    if assume_yes {
        println!("{}", render::stale_notice(stale));
        return Ok(true);
    }

    print!("{}", render::stale_prompt(stale));
    std::io::stdout().flush()?;

    let answer = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| line)
    })
    .await??;

    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes" | "д" | "да")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_city() {
        let command = parse_args(args(&["weather", "--city", "Moscow", "--yes"])).unwrap();
        assert_eq!(
            command,
            Command::Weather(Query {
                target: Target::City("Moscow".to_string()),
                assume_yes: true,
            })
        );
    }

    #[test]
    fn test_parse_coordinates() {
        let command = parse_args(args(&["forecast", "--lat", "55.7558", "--lon", "37.6176"])).unwrap();
        assert_eq!(
            command,
            Command::Forecast(Query {
                target: Target::Coordinate(Coordinate::new(55.7558, 37.6176)),
                assume_yes: false,
            })
        );
    }

    #[test]
    fn test_parse_serve() {
        assert_eq!(parse_args(args(&["serve"])).unwrap(), Command::Serve);
    }

    #[test]
    fn test_rejects_out_of_range_coordinates() {
        let err = parse_args(args(&["air", "--lat", "91", "--lon", "0"])).unwrap_err();
        assert!(err.to_string().contains("Invalid latitude"));
        assert!(parse_args(args(&["air", "--lat", "0", "--lon", "-181"])).is_err());
    }

    #[test]
    fn test_rejects_incomplete_or_mixed_targets() {
        assert!(parse_args(args(&["weather", "--lat", "10"])).is_err());
        assert!(parse_args(args(&["weather", "--city", "Moscow", "--lat", "1", "--lon", "2"])).is_err());
        assert!(parse_args(args(&["weather"])).is_err());
        assert!(parse_args(args(&["weather", "--lat", "north", "--lon", "2"])).is_err());
        assert!(parse_args(args(&["rain", "--city", "Moscow"])).is_err());
        assert!(parse_args(Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" Yes "));
        assert!(is_yes("да"));
        assert!(!is_yes("n"));
        assert!(!is_yes(""));
    }
}
