use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod air_quality;
mod cli;
mod config;
mod forecast;
mod notify;
mod render;
mod routes;
mod subscriptions;
mod telegram;
mod utils;

use cli::Command;
use config::Config;
use forecast::gateway::WeatherGateway;
use notify::NotificationScheduler;
use routes::{create_router, AppState};
use subscriptions::{JsonSubscriptionStore, SubscriptionStore};
use telegram::TelegramClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weather_notifier=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let command = match cli::parse_args(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}\n\n{}", e, cli::USAGE);
            std::process::exit(2);
        }
    };

    let config = Config::from_env()?;
    let gateway = Arc::new(WeatherGateway::new(config.clone())?);

    match command {
        Command::Serve => serve(config, gateway).await,
        command => cli::run(&gateway, command).await,
    }
}

async fn serve(config: Config, gateway: Arc<WeatherGateway>) -> anyhow::Result<()> {
    config.require_bot_token()?;

    let store: Arc<dyn SubscriptionStore> = Arc::new(JsonSubscriptionStore::open(config.users_path())?);
    let telegram = Arc::new(TelegramClient::new(&config)?);

    NotificationScheduler::new(
        gateway.clone(),
        store.clone(),
        telegram.clone(),
        config.notify_interval(),
    )
    .spawn();

    let state = AppState {
        gateway,
        store,
        telegram,
    };
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server starting on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
