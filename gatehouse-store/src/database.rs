use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::{info, warn};

use crate::app_config::BusinessRules;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlay rows of the `business_rules` table onto the file defaults.
    pub async fn fetch_business_rules(&self, defaults: BusinessRules) -> Result<BusinessRules, sqlx::Error> {
        let rows: Vec<(String, serde_json::Value)> =
            sqlx::query_as("SELECT rule_key, rule_value FROM business_rules")
                .fetch_all(&self.pool)
                .await?;

        let mut rules = defaults;
        for (key, value) in rows {
            if rules.apply_override(&key, &value) {
                info!(rule = %key, "business rule overridden from database");
            } else {
                warn!(rule = %key, "ignoring unrecognised business rule");
            }
        }
        Ok(rules)
    }
}

/// Map a driver error onto the domain taxonomy. Unique violations become
/// `Conflict`; everything else is a transient storage failure.
pub(crate) fn storage_error(e: sqlx::Error) -> gatehouse_core::CoreError {
    use gatehouse_core::CoreError;

    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => CoreError::Conflict(db.message().to_string()),
        sqlx::Error::RowNotFound => CoreError::NotFound("row".to_string()),
        _ => CoreError::Storage(e.to_string()),
    }
}
