// In crates/database/src/postgres.rs

use crate::{Error, Persistence, Result, Version};
use app_config::types::PostgresSettings;
use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgPoolOptions};

/// A wrapper around the `sqlx` connection pool.
#[derive(Debug, Clone)]
pub struct PgStore(PgPool);

/// Establishes a connection pool to the PostgreSQL database and runs migrations.
pub async fn connect(settings: &PostgresSettings) -> Result<PgStore> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        // The `?` operator uses the `#[from]` attribute in our error enum
        // to automatically convert the `sqlx::Error` into a `database::Error`.
        .connect(&settings.url)
        .await?;

    // Run database migrations. This ensures the database schema is up-to-date.
    sqlx::migrate!("../../migrations").run(&pool).await?;

    Ok(PgStore(pool))
}

fn parse_version(tag: &str) -> Result<i64> {
    tag.parse()
        .map_err(|_| Error::Corrupt(format!("'{tag}' is not a postgres state version")))
}

impl PgStore {
    async fn current_version(&self, key: &str) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT version FROM trading_state WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.0)
            .await?;
        row.map(|r| r.try_get::<i64, _>("version")).transpose().map_err(Error::from)
    }

    async fn conflict(&self, key: &str, expected: &Version) -> Error {
        let actual = match self.current_version(key).await {
            Ok(Some(v)) => v.to_string(),
            Ok(None) => Version::Absent.to_string(),
            Err(_) => "unknown".to_string(),
        };
        Error::ConcurrentModification { key: key.to_string(), expected: expected.to_string(), actual }
    }
}

#[async_trait]
impl Persistence for PgStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn read(&self, key: &str) -> Result<Option<(String, Version)>> {
        let row = sqlx::query("SELECT payload::text AS payload, version FROM trading_state WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.0)
            .await?;
        match row {
            None => Ok(None),
            Some(row) => {
                let payload: String = row.try_get("payload")?;
                let version: i64 = row.try_get("version")?;
                Ok(Some((payload, Version::Tag(version.to_string()))))
            }
        }
    }

    async fn write(&self, key: &str, payload: &str, expected: &Version) -> Result<Version> {
        let (result, next) = match expected {
            Version::Absent => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO trading_state (key, payload, version, updated_at)
                    VALUES ($1, $2::jsonb, 1, NOW())
                    ON CONFLICT (key) DO NOTHING
                    "#,
                )
                .bind(key)
                .bind(payload)
                .execute(&self.0)
                .await?;
                (result, 1)
            }
            Version::Tag(tag) => {
                let current = parse_version(tag)?;
                let result = sqlx::query(
                    r#"
                    UPDATE trading_state
                    SET payload = $2::jsonb, version = version + 1, updated_at = NOW()
                    WHERE key = $1 AND version = $3
                    "#,
                )
                .bind(key)
                .bind(payload)
                .bind(current)
                .execute(&self.0)
                .await?;
                (result, current + 1)
            }
        };

        if result.rows_affected() == 0 {
            return Err(self.conflict(key, expected).await);
        }
        Ok(Version::Tag(next.to_string()))
    }

    async fn write_record(&self, name: &str, payload: &str) -> Result<()> {
        sqlx::query("INSERT INTO cycle_records (name, payload, created_at) VALUES ($1, $2::jsonb, NOW())")
            .bind(name)
            .bind(payload)
            .execute(&self.0)
            .await?;
        Ok(())
    }
}
