use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::{
    forecast::{
        daily::{group_into_days, FORECAST_DAYS},
        gateway::{GatewayError, QueryOutcome, WeatherGateway},
        types::{AirPollutionResponse, CurrentWeatherResponse, Forecast3hResponse, GeocodeResponse},
        Coordinate,
    },
    render,
    subscriptions::{SubscriptionStore, UserId},
    telegram::{InlineArticle, InlineQuery, Message, TelegramClient, Update},
};

const INLINE_RESULTS: usize = 5;
const INLINE_CACHE_SECS: u32 = 600;
const INLINE_ERROR_CACHE_SECS: u32 = 60;

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<WeatherGateway>,
    pub store: Arc<dyn SubscriptionStore>,
    pub telegram: Arc<TelegramClient>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/telegram/webhook", post(webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Always 200, acknowledged before the update is handled. Telegram
/// redelivers anything else.
pub async fn webhook(State(state): State<AppState>, body: Bytes) -> StatusCode {
    match serde_json::from_slice::<Update>(&body) {
        Ok(update) => {
            tokio::spawn(async move { process_update(&state, update).await });
        }
        Err(e) => tracing::warn!("Ignoring unparseable update: {}", e),
    }
    StatusCode::OK
}

async fn process_update(state: &AppState, update: Update) {
    if let Some(message) = update.message {
        let chat_id = message.chat.id;
        for reply in handle_message(state, &message).await {
            if let Err(e) = state.telegram.send_message(chat_id, &reply).await {
                tracing::error!("Failed to reply to chat {}: {}", chat_id, e);
            }
        }
    } else if let Some(query) = update.inline_query {
        answer_inline(state, &query).await;
    } else {
        tracing::debug!("Update {} carries nothing to handle", update.update_id);
    }
}

async fn answer_inline(state: &AppState, query: &InlineQuery) {
    let city = query.query.trim();
    if city.is_empty() {
        return;
    }
    tracing::debug!("Inline query {} from {}: {:?}", query.id, query.from.id, city);

    let (articles, cache_time) = match inline_results(state, city).await {
        Ok(articles) => (articles, INLINE_CACHE_SECS),
        Err(article) => (vec![article], INLINE_ERROR_CACHE_SECS),
    };
    if let Err(e) = state
        .telegram
        .answer_inline_query(&query.id, &articles, cache_time)
        .await
    {
        tracing::error!("Failed to answer inline query {}: {}", query.id, e);
    }
}

/// One article per geocoding candidate with live weather, at most
/// `INLINE_RESULTS`. The error variant is a single explanatory article.
pub async fn inline_results(state: &AppState, city: &str) -> Result<Vec<InlineArticle>, InlineArticle> {
    let results = state
        .gateway
        .current_weather_for_city(city)
        .await
        .map_err(|e| inline_error(city, &e))?;

    let articles: Vec<InlineArticle> = results
        .into_iter()
        .filter_map(|result| {
            let place = result.location.display_name();
            let weather = result.outcome.fresh().and_then(view::<CurrentWeatherResponse>)?;
            Some((place, weather))
        })
        .take(INLINE_RESULTS)
        .enumerate()
        .map(|(n, (place, weather))| InlineArticle {
            id: n.to_string(),
            title: format!("{}: {}°C", place, weather.main.temp),
            description: render::weather_headline(&weather),
            message_text: render::current_weather(&weather, Some(&place)),
        })
        .collect();

    if articles.is_empty() {
        return Err(inline_error(city, &GatewayError::Unreachable(String::new())));
    }
    Ok(articles)
}

fn inline_error(city: &str, error: &GatewayError) -> InlineArticle {
    let message = render::gateway_error(error);
    let title = match error {
        GatewayError::CityNotFound(_) => format!("City \"{}\" not found", city),
        _ => "No weather data".to_string(),
    };
    InlineArticle {
        id: "error".to_string(),
        title,
        description: "Check the spelling or try again later".to_string(),
        message_text: message,
    }
}

/// The replies for one incoming message, in send order.
pub async fn handle_message(state: &AppState, message: &Message) -> Vec<String> {
    let user_id = message.user_id();
    if let Err(e) = state.store.ensure_user(user_id) {
        tracing::error!("Failed to register user {}: {}", user_id, e);
    }

    if let Some(location) = message.location {
        let coordinate = Coordinate::new(location.latitude, location.longitude);
        return handle_location(state, user_id, coordinate).await;
    }

    let Some(text) = message.text.as_deref() else {
        return Vec::new();
    };
    let (command, args) = split_command(text);

    match command.as_str() {
        "/start" | "/help" => vec![render::HELP_TEXT.to_string()],
        "/weather" if args.is_empty() => vec!["Usage: /weather <city>".to_string()],
        "/weather" => weather_by_city(state, args).await,
        "/stale" => vec![stale_weather(state).await],
        "/forecast" => vec![forecast(state, user_id, args).await],
        "/air" => vec![air_quality(state, user_id, args).await],
        "/compare" => vec![compare(state, args).await],
        "/extended" => vec![request_extended(state, user_id)],
        "/notify" => vec![toggle_notifications(state, user_id)],
        _ => vec!["Unknown command. Send /help for the list.".to_string()],
    }
}

/// "/weather@my_bot Moscow" -> ("/weather", "Moscow")
fn split_command(text: &str) -> (String, &str) {
    let text = text.trim();
    let (head, args) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    let command = head.split('@').next().unwrap_or(head).to_lowercase();
    (command, args.trim())
}

fn view<T: DeserializeOwned>(payload: Value) -> Option<T> {
    serde_json::from_value(payload)
        .map_err(|e| tracing::warn!("Cached payload does not match its view: {}", e))
        .ok()
}

async fn first_candidate(state: &AppState, city: &str) -> Result<GeocodeResponse, String> {
    let candidates = state
        .gateway
        .geocode(city)
        .await
        .map_err(|e| render::gateway_error(&e))?;
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| render::gateway_error(&GatewayError::CityNotFound(city.to_string())))
}

fn stored_coordinate(state: &AppState, user_id: UserId) -> Option<Coordinate> {
    state.store.get(user_id).and_then(|record| record.coordinate())
}

async fn weather_by_city(state: &AppState, city: &str) -> Vec<String> {
    let results = match state.gateway.current_weather_for_city(city).await {
        Ok(results) => results,
        Err(e) => return vec![render::gateway_error(&e)],
    };

    let mut replies = Vec::with_capacity(results.len());
    let mut stale_offered = false;
    for result in results {
        let place = result.location.display_name();
        let label = render::escape_markdown(&place);
        match result.outcome {
            QueryOutcome::Fresh(payload) => match view::<CurrentWeatherResponse>(payload) {
                Some(weather) => replies.push(render::current_weather(&weather, Some(&place))),
                None => replies.push(format!("{}: unreadable weather data", label)),
            },
            QueryOutcome::StaleAvailable(stale) if !stale_offered => {
                stale_offered = true;
                replies.push(format!(
                    "{}: {}\nSend /stale to see it.",
                    label,
                    render::stale_notice(&stale)
                ));
            }
            QueryOutcome::StaleAvailable(_) => {
                replies.push(format!("{}: live weather is unavailable", label));
            }
            QueryOutcome::Unavailable(e) => {
                replies.push(format!("{}: {}", label, render::gateway_error(&e)));
            }
        }
    }
    replies
}

async fn stale_weather(state: &AppState) -> String {
    let Some(stale) = state.gateway.stale_fallback().await else {
        return "No recent cached weather".to_string();
    };

    let age = stale.describe_age();
    let place = stale.city.clone();
    match view::<CurrentWeatherResponse>(stale.payload) {
        Some(weather) => format!(
            "{}\n_Cached {} ago_",
            render::current_weather(&weather, place.as_deref()),
            age
        ),
        None => "No recent cached weather".to_string(),
    }
}

/// "/forecast" summarizes every day; "/forecast 2" details the second.
async fn forecast(state: &AppState, user_id: UserId, day: &str) -> String {
    let day = match day {
        "" => None,
        day => match day.parse::<usize>() {
            Ok(n) if (1..=FORECAST_DAYS).contains(&n) => Some(n),
            _ => return format!("Usage: /forecast [1-{}]", FORECAST_DAYS),
        },
    };
    let Some(coordinate) = stored_coordinate(state, user_id) else {
        return "Share your location first".to_string();
    };

    match state.gateway.forecast(coordinate).await {
        QueryOutcome::Fresh(payload) => match (view::<Forecast3hResponse>(payload), day) {
            (Some(f), Some(n)) => render::forecast_day(&f, n),
            (Some(f), None) => match group_into_days(&f).len() {
                0 => "No forecast data".to_string(),
                days => format!(
                    "{}\nSend /forecast <1-{}> for 3-hour details",
                    render::forecast(&f),
                    days
                ),
            },
            (None, _) => "No forecast data".to_string(),
        },
        QueryOutcome::Unavailable(e) => render::gateway_error(&e),
        QueryOutcome::StaleAvailable(_) => "No forecast data".to_string(),
    }
}

async fn air_quality(state: &AppState, user_id: UserId, city: &str) -> String {
    let (coordinate, place) = if city.is_empty() {
        match stored_coordinate(state, user_id) {
            Some(coordinate) => (coordinate, coordinate.to_string()),
            None => return "Usage: /air <city>, or share your location first".to_string(),
        }
    } else {
        match first_candidate(state, city).await {
            Ok(location) => (
                Coordinate::new(location.lat, location.lon),
                location.display_name(),
            ),
            Err(reply) => return reply,
        }
    };

    match state.gateway.air_quality(coordinate).await {
        QueryOutcome::Fresh(payload) => view::<AirPollutionResponse>(payload)
            .map(|air| render::air_quality(&air, &place))
            .unwrap_or_else(|| format!("No air quality data for {}", render::escape_markdown(&place))),
        QueryOutcome::Unavailable(e) => render::gateway_error(&e),
        QueryOutcome::StaleAvailable(_) => {
            format!("No air quality data for {}", render::escape_markdown(&place))
        }
    }
}

async fn live_weather_for(state: &AppState, city: &str) -> Result<(String, CurrentWeatherResponse), String> {
    let location = first_candidate(state, city).await?;
    let coordinate = Coordinate::new(location.lat, location.lon);

    let payload = match state.gateway.current_weather(coordinate).await {
        QueryOutcome::Fresh(payload) => payload,
        QueryOutcome::Unavailable(e) => return Err(render::gateway_error(&e)),
        QueryOutcome::StaleAvailable(_) => {
            return Err(render::gateway_error(&GatewayError::Unreachable(String::new())))
        }
    };
    let weather = view(payload).ok_or_else(|| {
        format!("{}: unreadable weather data", render::escape_markdown(&location.name))
    })?;
    Ok((location.name, weather))
}

async fn compare(state: &AppState, args: &str) -> String {
    let Some((first, second)) = args
        .split_once(',')
        .map(|(a, b)| (a.trim(), b.trim()))
        .filter(|(a, b)| !a.is_empty() && !b.is_empty())
    else {
        return "Usage: /compare <city1>, <city2>".to_string();
    };

    let first = match live_weather_for(state, first).await {
        Ok(found) => found,
        Err(reply) => return reply,
    };
    let second = match live_weather_for(state, second).await {
        Ok(found) => found,
        Err(reply) => return reply,
    };

    render::comparison(&first.0, &first.1, &second.0, &second.1)
}

fn request_extended(state: &AppState, user_id: UserId) -> String {
    if let Err(e) = state.store.set_waiting_for_extended(user_id, true) {
        tracing::error!("Failed to update user {}: {}", user_id, e);
        return "Something went wrong, try again".to_string();
    }
    "Share a location to get extended data".to_string()
}

fn toggle_notifications(state: &AppState, user_id: UserId) -> String {
    match state.store.toggle_notifications(user_id) {
        Ok(true) if stored_coordinate(state, user_id).is_none() => {
            "Notifications enabled. Share your location so I know where to check.".to_string()
        }
        Ok(true) => "Notifications enabled".to_string(),
        Ok(false) => "Notifications disabled".to_string(),
        Err(e) => {
            tracing::error!("Failed to toggle notifications for {}: {}", user_id, e);
            "Something went wrong, try again".to_string()
        }
    }
}

async fn handle_location(state: &AppState, user_id: UserId, coordinate: Coordinate) -> Vec<String> {
    let record = match state.store.set_location(user_id, coordinate) {
        Ok(record) => record,
        Err(e) => {
            tracing::error!("Failed to store location for {}: {}", user_id, e);
            return vec!["Something went wrong, try again".to_string()];
        }
    };

    if !record.waiting_for_extended {
        return vec![format!("Location saved: {}", coordinate)];
    }

    if let Err(e) = state.store.set_waiting_for_extended(user_id, false) {
        tracing::error!("Failed to clear extended flag for {}: {}", user_id, e);
    }
    vec![extended_report(state, coordinate).await]
}

async fn extended_report(state: &AppState, coordinate: Coordinate) -> String {
    let weather = match state.gateway.current_weather(coordinate).await {
        QueryOutcome::Fresh(payload) => view::<CurrentWeatherResponse>(payload),
        _ => None,
    };
    let Some(weather) = weather else {
        return "Could not get weather data".to_string();
    };

    let air = state
        .gateway
        .air_quality(coordinate)
        .await
        .fresh()
        .and_then(view::<AirPollutionResponse>);
    let place = weather.name.clone();

    render::extended(coordinate, place.as_deref(), &weather, air.as_ref())
}
