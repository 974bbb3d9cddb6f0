//! Periodic precipitation check for subscribed users.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::forecast::gateway::WeatherGateway;
use crate::forecast::types::{CurrentWeatherResponse, Forecast3hResponse};
use crate::forecast::Coordinate;
use crate::subscriptions::{SubscriptionStore, UserId};
use crate::telegram::TelegramError;

/// Number of 3-hour forecast entries inspected, about 12 hours ahead.
pub const LOOKAHEAD_ENTRIES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Rain,
    Snow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub kind: AlertKind,
    pub current_temp: f64,
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("chat API error: {0}")]
    Telegram(#[from] TelegramError),
    #[error("alert delivery failed: {0}")]
    Delivery(String),
}

/// Where alerts go.
pub trait AlertSink: Send + Sync {
    fn deliver(
        &self,
        user_id: UserId,
        alert: &Alert,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Rain wins over snow; only the first `LOOKAHEAD_ENTRIES` entries count.
pub fn detect_precipitation(forecast: &Forecast3hResponse) -> Option<AlertKind> {
    let upcoming: Vec<String> = forecast
        .list
        .iter()
        .take(LOOKAHEAD_ENTRIES)
        .filter_map(|item| item.condition().map(|c| c.main.to_lowercase()))
        .collect();

    if upcoming.iter().any(|main| main.contains("rain")) {
        Some(AlertKind::Rain)
    } else if upcoming.iter().any(|main| main.contains("snow")) {
        Some(AlertKind::Snow)
    } else {
        None
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub checked: usize,
    pub alerted: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct NotificationScheduler<S> {
    gateway: Arc<WeatherGateway>,
    store: Arc<dyn SubscriptionStore>,
    sink: Arc<S>,
    interval: Duration,
}

impl<S: AlertSink + 'static> NotificationScheduler<S> {
    pub fn new(
        gateway: Arc<WeatherGateway>,
        store: Arc<dyn SubscriptionStore>,
        sink: Arc<S>,
        interval: Duration,
    ) -> Self {
        Self {
            gateway,
            store,
            sink,
            interval,
        }
    }

    /// Run ticks forever on a background task. The first check happens one
    /// full interval after start.
    pub fn spawn(self) -> JoinHandle<()> {
        tracing::info!("Notification scheduler every {:?}", self.interval);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.tick().await;

            loop {
                interval.tick().await;
                let report = self.run_tick().await;
                tracing::info!(
                    checked = report.checked,
                    alerted = report.alerted,
                    skipped = report.skipped,
                    failed = report.failed,
                    "Notification tick finished"
                );
            }
        })
    }

    /// Check every subscriber once, in id order.
    pub async fn run_tick(&self) -> TickReport {
        let mut report = TickReport::default();

        for subscription in self.store.subscribers() {
            let Some(coordinate) = subscription.coordinate else {
                continue;
            };
            report.checked += 1;

            let Some(alert) = self.check(coordinate).await else {
                report.skipped += 1;
                continue;
            };

            match self.sink.deliver(subscription.id, &alert).await {
                Ok(()) => {
                    tracing::info!("Sent {:?} alert to user {}", alert.kind, subscription.id);
                    report.alerted += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to notify user {}: {}", subscription.id, e);
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// `None` when there is nothing to report or no live data to judge by.
    async fn check(&self, coordinate: Coordinate) -> Option<Alert> {
        let weather = self.gateway.current_weather(coordinate).await.fresh()?;
        let forecast = self.gateway.forecast(coordinate).await.fresh()?;

        let weather: CurrentWeatherResponse = serde_json::from_value(weather)
            .map_err(|e| tracing::warn!("Unusable current weather for {}: {}", coordinate, e))
            .ok()?;
        let forecast: Forecast3hResponse = serde_json::from_value(forecast)
            .map_err(|e| tracing::warn!("Unusable forecast for {}: {}", coordinate, e))
            .ok()?;

        detect_precipitation(&forecast).map(|kind| Alert {
            kind,
            current_temp: weather.main.temp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::forecast::mock;
    use crate::subscriptions::MockSubscriptionStore;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn parse(conditions: &[&str]) -> Forecast3hResponse {
        serde_json::from_value(mock::forecast(conditions)).unwrap()
    }

    #[test]
    fn test_snow_alert() {
        let forecast = parse(&["Clouds", "Snow", "Clear", "Clouds"]);
        assert_eq!(detect_precipitation(&forecast), Some(AlertKind::Snow));
    }

    #[test]
    fn test_rain_takes_priority_over_snow() {
        let forecast = parse(&["Snow", "Clouds", "Rain", "Clear"]);
        assert_eq!(detect_precipitation(&forecast), Some(AlertKind::Rain));
    }

    #[test]
    fn test_entries_past_lookahead_are_ignored() {
        let forecast = parse(&["Clear", "Clouds", "Clear", "Clouds", "Rain", "Snow"]);
        assert_eq!(detect_precipitation(&forecast), None);
    }

    #[test]
    fn test_match_is_case_insensitive() {
        let forecast = parse(&["RAIN"]);
        assert_eq!(detect_precipitation(&forecast), Some(AlertKind::Rain));
    }

    #[derive(Default)]
    struct RecordingSink {
        fail_for: Option<UserId>,
        delivered: Mutex<Vec<(UserId, Alert)>>,
    }

    impl AlertSink for RecordingSink {
        async fn deliver(&self, user_id: UserId, alert: &Alert) -> Result<(), NotifyError> {
            if self.fail_for == Some(user_id) {
                return Err(NotifyError::Delivery("chat not found".to_string()));
            }
            self.delivered.lock().unwrap().push((user_id, alert.clone()));
            Ok(())
        }
    }

    fn scheduler(
        base_url: &str,
        dir: &std::path::Path,
        store: Arc<MockSubscriptionStore>,
        sink: Arc<RecordingSink>,
    ) -> NotificationScheduler<RecordingSink> {
        let mut config = Config::new("test-key", base_url);
        config.data_dir = dir.join("database");
        config.api_cache_dir = dir.join(".cache");
        config.retry_initial_backoff_ms = 5;
        let gateway = Arc::new(WeatherGateway::new(config).unwrap());
        NotificationScheduler::new(gateway, store, sink, Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_tick_isolates_delivery_failures() {
        let mock_server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock::current_weather(3.5)))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/forecast"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(mock::forecast(&["Clouds", "Rain"])),
            )
            .mount(&mock_server)
            .await;

        let store = Arc::new(MockSubscriptionStore::new());
        for id in [1, 2, 3] {
            store.set_location(id, Coordinate::new(55.7558, 37.6176)).unwrap();
            store.toggle_notifications(id).unwrap();
        }
        // has notifications but no location
        store.toggle_notifications(4).unwrap();

        let sink = Arc::new(RecordingSink {
            fail_for: Some(1),
            ..Default::default()
        });
        let scheduler = scheduler(&mock_server.uri(), dir.path(), store, sink.clone());

        let report = scheduler.run_tick().await;
        assert_eq!(
            report,
            TickReport {
                checked: 3,
                alerted: 2,
                skipped: 0,
                failed: 1,
            }
        );

        let delivered = sink.delivered.lock().unwrap();
        let ids: Vec<UserId> = delivered.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(delivered[0].1.kind, AlertKind::Rain);
        assert_eq!(delivered[0].1.current_temp, 3.5);
    }

    #[tokio::test]
    async fn test_tick_skips_users_without_live_data() {
        let mock_server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let store = Arc::new(MockSubscriptionStore::new());
        store.set_location(10, Coordinate::new(59.93, 30.33)).unwrap();
        store.toggle_notifications(10).unwrap();

        let sink = Arc::new(RecordingSink::default());
        let scheduler = scheduler(&mock_server.uri(), dir.path(), store, sink.clone());
        // a stale snapshot must not produce alerts
        scheduler
            .gateway
            .cache()
            .put_fallback_snapshot(None, Coordinate::new(59.93, 30.33), &mock::current_weather(0.0))
            .unwrap();

        let report = scheduler.run_tick().await;
        assert_eq!(report.checked, 1);
        assert_eq!(report.skipped, 1);
        assert!(sink.delivered.lock().unwrap().is_empty());
    }
}
