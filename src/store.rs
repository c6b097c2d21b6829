//! ==============================================================================
//! store.rs - reading storage
//! ==============================================================================
//!
//! purpose:
//!     the data access seam. handlers only see `ReadingStore`; two
//!     implementations sit behind it:
//!     - MySqlStore: the real table, through a bounded sqlx pool
//!     - MemoryStore: an in-process table for tests and `--memory` runs
//!
//! connection discipline:
//!     one pool per process, built in main.rs and handed in here. every
//!     operation is a single statement, so there are no transactions.
//!     pool exhaustion is the only backpressure: requests wait up to the
//!     acquire timeout and then fail as StorageError.
//!
//! relationships:
//!     - used by: handlers.rs (via AppState), main.rs (construction/shutdown)
//!     - uses: query.rs (statements), config.rs (pool bounds)
//!
//! ==============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::{DatabaseConfig, PoolConfig};
use crate::error::StorageError;
use crate::query::{build_insert, build_select, BindValue, ReadFilter};
use crate::reading::{Measurements, NewReading, SensorReading};

#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Rows matching `filter`, newest first. Measurements are sanitized, so
    /// a non-finite value written by any other client comes back as `0.0`.
    async fn fetch(&self, filter: &ReadFilter) -> Result<Vec<SensorReading>, StorageError>;

    /// Insert one reading. Measurements are sanitized before they are written.
    async fn insert(&self, reading: NewReading) -> Result<(), StorageError>;

    /// Cheap liveness probe.
    async fn ping(&self) -> Result<(), StorageError>;

    /// Release connections. Called once on shutdown.
    async fn close(&self);
}

// ==============================================================================
// mysql
// ==============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ReadingRow {
    id: i64,
    location: i32,
    #[sqlx(rename = "recTime")]
    rec_time: DateTime<Utc>,
    temp: f64,
    #[sqlx(rename = "rH")]
    rh: f64,
    #[sqlx(rename = "VOC")]
    voc: f64,
    #[sqlx(rename = "NOx")]
    nox: f64,
    pmass1: f64,
    pmass25: f64,
    pmass4: f64,
    pmass10: f64,
    #[sqlx(rename = "HCHO")]
    hcho: f64,
    #[sqlx(rename = "CO2")]
    co2: f64,
    #[sqlx(rename = "indoorTd")]
    indoor_td: f64,
}

impl From<ReadingRow> for SensorReading {
    fn from(row: ReadingRow) -> Self {
        SensorReading {
            id: row.id,
            location: row.location,
            recorded_at: row.rec_time,
            measurements: Measurements {
                temp: row.temp,
                rh: row.rh,
                voc: row.voc,
                nox: row.nox,
                pmass1: row.pmass1,
                pmass25: row.pmass25,
                pmass4: row.pmass4,
                pmass10: row.pmass10,
                hcho: row.hcho,
                co2: row.co2,
                indoor_td: row.indoor_td,
            },
        }
    }
}

pub struct MySqlStore {
    pool: MySqlPool,
    table: String,
    insert_sql: String,
}

impl MySqlStore {
    /// Open the pool. Fails if the first connection cannot be established.
    pub async fn connect(db: &DatabaseConfig, pool: &PoolConfig) -> Result<Self, StorageError> {
        let options = MySqlConnectOptions::new()
            .host(&db.host)
            .port(db.port)
            .username(&db.user)
            .password(&db.password)
            .database(&db.database);

        let pool_handle = MySqlPoolOptions::new()
            .max_connections(pool.max_connections)
            .min_connections(pool.min_connections)
            .max_lifetime(pool.max_lifetime())
            .acquire_timeout(pool.acquire_timeout())
            .connect_with(options)
            .await?;

        info!(
            "Connected to MySQL at {}:{}/{} (max {} connections)",
            db.host, db.port, db.database, pool.max_connections
        );
        Ok(Self::from_pool(pool_handle, &db.table))
    }

    /// Wrap an existing pool. `table` must be a validated identifier.
    pub fn from_pool(pool: MySqlPool, table: &str) -> Self {
        Self {
            pool,
            table: table.to_string(),
            insert_sql: build_insert(table),
        }
    }
}

#[async_trait]
impl ReadingStore for MySqlStore {
    async fn fetch(&self, filter: &ReadFilter) -> Result<Vec<SensorReading>, StorageError> {
        let statement = build_select(&self.table, filter);
        debug!("fetch: {} ({} binds)", statement.sql, statement.binds.len());

        let mut query = sqlx::query_as::<_, ReadingRow>(&statement.sql);
        for value in &statement.binds {
            query = match value {
                BindValue::Timestamp(at) => query.bind(*at),
                BindValue::Limit(limit) => query.bind(*limit),
            };
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let mut reading = SensorReading::from(row);
                reading.measurements.sanitize();
                reading
            })
            .collect())
    }

    async fn insert(&self, mut reading: NewReading) -> Result<(), StorageError> {
        reading.measurements.sanitize();
        let m = &reading.measurements;

        sqlx::query(&self.insert_sql)
            .bind(reading.location)
            .bind(reading.recorded_at)
            .bind(m.temp)
            .bind(m.rh)
            .bind(m.voc)
            .bind(m.nox)
            .bind(m.pmass1)
            .bind(m.pmass25)
            .bind(m.pmass4)
            .bind(m.pmass10)
            .bind(m.hcho)
            .bind(m.co2)
            .bind(m.indoor_td)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("MySQL pool closed");
    }
}

// ==============================================================================
// in-memory
// ==============================================================================

/// In-process table with the same filter/order/limit semantics as the SQL.
#[derive(Default)]
pub struct MemoryStore {
    rows: RwLock<Vec<SensorReading>>,
    next_id: AtomicI64,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a row in as-is, bypassing sanitization. Returns the assigned id.
    pub async fn seed(
        &self,
        location: i32,
        recorded_at: DateTime<Utc>,
        measurements: Measurements,
    ) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.rows.write().await.push(SensorReading {
            id,
            location,
            recorded_at,
            measurements,
        });
        id
    }

    /// Make every subsequent operation fail until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::Relaxed) {
            Err(StorageError::Unavailable("memory store marked as failing".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn fetch(&self, filter: &ReadFilter) -> Result<Vec<SensorReading>, StorageError> {
        self.check()?;
        let rows = self.rows.read().await;

        let mut matching: Vec<SensorReading> = rows
            .iter()
            .filter(|r| filter.contains(&r.recorded_at))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at).then(b.id.cmp(&a.id)));
        matching.truncate(usize::try_from(filter.limit).unwrap_or(0));
        for reading in &mut matching {
            reading.measurements.sanitize();
        }

        Ok(matching)
    }

    async fn insert(&self, mut reading: NewReading) -> Result<(), StorageError> {
        self.check()?;
        reading.measurements.sanitize();
        self.seed(reading.location, reading.recorded_at, reading.measurements)
            .await;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.check()
    }

    async fn close(&self) {}
}
