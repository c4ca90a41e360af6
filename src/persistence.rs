use crate::error::PersistenceError;
use crate::monitor::ThresholdPolicy;
use crate::reading::Reading;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::future::Future;
use std::time::Duration;

/// Durable storage for readings.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn insert(&self, reading: &Reading) -> Result<(), PersistenceError>;

    /// Up to `limit` readings, newest first.
    async fn query_recent(&self, limit: u32) -> Result<Vec<Reading>, PersistenceError>;
}

pub async fn build_pool(
    database_url: &str,
    max_connections: u32,
    timeout: Duration,
) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(timeout)
        .connect(database_url)
        .await
        .context("failed to connect to the readings database")?;
    Ok(pool)
}

#[derive(Clone)]
pub struct PgGateway {
    pool: PgPool,
    timeout: Duration,
}

impl PgGateway {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the unit and reading tables when missing and registers every unit the policy
    /// knows about.
    pub async fn ensure_schema(&self, policy: &ThresholdPolicy) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS StorageUnits (
                unit_id INTEGER PRIMARY KEY,
                unit_name VARCHAR(50),
                min_temp NUMERIC(5,2),
                max_temp NUMERIC(5,2)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create StorageUnits")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sensor_readings (
                id SERIAL PRIMARY KEY,
                unit_id INTEGER REFERENCES StorageUnits(unit_id),
                unit_name VARCHAR(255),
                temperature DOUBLE PRECISION,
                humidity DOUBLE PRECISION,
                timestamp VARCHAR(255)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create sensor_readings")?;

        for unit in policy.units() {
            sqlx::query(
                r#"
                INSERT INTO StorageUnits (unit_id, unit_name, min_temp, max_temp)
                VALUES ($1, $2, $3::float8::numeric, $4::float8::numeric)
                ON CONFLICT (unit_id) DO NOTHING
                "#,
            )
            .bind(unit.unit_id)
            .bind(&unit.unit_name)
            .bind(unit.min_temp)
            .bind(unit.max_temp)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to register storage unit {}", unit.unit_id))?;
        }

        tracing::info!(units = policy.units().count(), "readings schema ready");
        Ok(())
    }

    async fn with_timeout<T, F>(&self, fut: F, unit_id: Option<i32>) -> Result<T, PersistenceError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(PersistenceError::from_sqlx(err, unit_id)),
            Err(_) => Err(PersistenceError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl PersistenceGateway for PgGateway {
    async fn insert(&self, reading: &Reading) -> Result<(), PersistenceError> {
        let query = sqlx::query(
            r#"
            INSERT INTO sensor_readings (unit_id, unit_name, temperature, humidity, timestamp)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(reading.unit_id())
        .bind(reading.unit_name())
        .bind(reading.temperature())
        .bind(reading.humidity())
        .bind(reading.timestamp())
        .execute(&self.pool);

        self.with_timeout(query, Some(reading.unit_id())).await?;
        tracing::debug!(unit = reading.unit_id(), "reading stored");
        Ok(())
    }

    async fn query_recent(&self, limit: u32) -> Result<Vec<Reading>, PersistenceError> {
        let query = sqlx::query(
            r#"
            SELECT unit_id, unit_name, temperature, humidity, timestamp
            FROM sensor_readings
            ORDER BY id DESC
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool);

        let rows = self.with_timeout(query, None).await?;
        let mut readings = Vec::with_capacity(rows.len());
        for row in rows {
            let decode = |err: sqlx::Error| PersistenceError::Query(err.to_string());
            let unit_id = row.try_get::<Option<i32>, _>("unit_id").map_err(decode)?;
            let unit_name = row.try_get::<Option<String>, _>("unit_name").map_err(decode)?;
            let temperature = row.try_get::<Option<f64>, _>("temperature").map_err(decode)?;
            let humidity = row.try_get::<Option<f64>, _>("humidity").map_err(decode)?;
            let timestamp = row.try_get::<Option<String>, _>("timestamp").map_err(decode)?;

            let (Some(unit_id), Some(temperature), Some(timestamp)) =
                (unit_id, temperature, timestamp)
            else {
                tracing::warn!("skipping incomplete sensor_readings row");
                continue;
            };
            match Reading::new(
                unit_id,
                unit_name.unwrap_or_default(),
                temperature,
                humidity,
                timestamp,
            ) {
                Ok(reading) => readings.push(reading),
                Err(err) => {
                    tracing::warn!(error=%err, unit = unit_id, "skipping unreadable stored reading")
                }
            }
        }
        Ok(readings)
    }
}
