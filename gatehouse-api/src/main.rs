use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use gatehouse_api::{app, worker, AppState, AuthConfig, Backends};
use gatehouse_core::publisher::{TicketEventPublisher, TracingPublisher};
use gatehouse_store::app_config::{Config, KafkaConfig};
use gatehouse_store::{DbClient, RedisClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatehouse_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Gatehouse API on port {}", config.server.port);

    let mut business_rules = config.business_rules.clone();
    let backends = match &config.database.url {
        Some(url) => {
            let db = DbClient::new(url).await.context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            business_rules = db
                .fetch_business_rules(business_rules)
                .await
                .context("Failed to load business rules")?;
            Backends::postgres(&db)
        }
        None => {
            tracing::warn!("No database configured; running on in-memory storage");
            Backends::in_memory()
        }
    };

    let redis = match &config.redis.url {
        Some(url) => Some(Arc::new(RedisClient::new(url).await.context("Failed to connect to Redis")?)),
        None => None,
    };

    let app_state = AppState::new(
        backends,
        publisher(&config.kafka)?,
        redis,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
        business_rules.clone(),
    );

    let _expiry_worker = worker::start_expiry_worker(
        app_state.sweep.clone(),
        tokio::time::Duration::from_secs(business_rules.expiry_sweep_seconds),
    );

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.context("Failed to bind listener")?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("Server error")?;
    Ok(())
}

#[cfg(feature = "kafka")]
fn publisher(kafka: &KafkaConfig) -> anyhow::Result<Arc<dyn TicketEventPublisher>> {
    match &kafka.brokers {
        Some(brokers) => {
            let producer = gatehouse_store::EventProducer::new(brokers).context("Failed to create Kafka producer")?;
            Ok(Arc::new(producer))
        }
        None => Ok(Arc::new(TracingPublisher)),
    }
}

#[cfg(not(feature = "kafka"))]
fn publisher(kafka: &KafkaConfig) -> anyhow::Result<Arc<dyn TicketEventPublisher>> {
    if kafka.brokers.is_some() {
        tracing::warn!("kafka.brokers is set but this build lacks the `kafka` feature; logging events instead");
    }
    Ok(Arc::new(TracingPublisher))
}
