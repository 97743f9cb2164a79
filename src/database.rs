// src/database.rs
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    QueryBuilder, Row, Sqlite, SqlitePool,
};
use tracing::{debug, info};

use crate::{
    config::DatabaseConfig,
    errors::AcarsRecorderError,
    filter::{Column, Condition, FieldValue, FilterField, Predicate},
    models::{AcarsMessage, StoredMessage},
};

mod models;

use models::MessageRow;

const SELECT_COLUMNS: &str = "SELECT id, time, freq, level, error, mode, label, sub_label, \
     block_id, ack, reg_no, flight_no, msg_no, reassembly_status, text, libacars FROM acars";

/// Number of rows holding one distinct value of a field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueCount<T = Option<FieldValue>> {
    pub value: T,
    pub count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum OrderDirection {
    #[default]
    #[serde(alias = "asc", alias = "ascend", alias = "ASC")]
    Ascending,
    #[serde(alias = "desc", alias = "descend", alias = "DESC")]
    Descending,
}

impl OrderDirection {
    fn sql(self) -> &'static str {
        match self {
            OrderDirection::Ascending => "ASC",
            OrderDirection::Descending => "DESC",
        }
    }
}

/// Sort column and direction; ties are always broken by insertion order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ordering {
    pub column: Column,
    pub direction: OrderDirection,
}

/// One page of matching messages plus the total number of matches
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub rows: Vec<StoredMessage>,
    pub total_count: i64,
}

/// Storage operations used by ingestion, queries, statistics and export.
pub trait MessageStore: Send + Sync {
    /// Append one record and return its assigned id
    fn insert(
        &self,
        message: &AcarsMessage,
    ) -> impl Future<Output = Result<i64, AcarsRecorderError>> + Send;

    /// Matching rows, `offset`/`limit` applied after ordering.
    ///
    /// Without an ordering rows come back in insertion order.
    fn fetch(
        &self,
        predicate: &Predicate,
        ordering: Option<Ordering>,
        offset: i64,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<StoredMessage>, AcarsRecorderError>> + Send;

    fn count_where(
        &self,
        predicate: &Predicate,
    ) -> impl Future<Output = Result<i64, AcarsRecorderError>> + Send;

    /// Distinct values of `field` among matching rows with their counts,
    /// ascending by value
    fn count_grouped_by(
        &self,
        predicate: &Predicate,
        field: FilterField,
    ) -> impl Future<Output = Result<Vec<ValueCount>, AcarsRecorderError>> + Send;
}

/// SQLite message store.
///
/// The pool is shared by the listener and all request handlers. WAL mode
/// lets readers run while the listener inserts.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(pool: SqlitePool) -> Result<Self, AcarsRecorderError> {
        let db = Self { pool };
        db.create_tables_indices().await?;
        Ok(db)
    }

    /// Open or create the database file described by the configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AcarsRecorderError> {
        config.validate()?;
        info!(
            "Opening database at {} (max_connections={})",
            config.path.display(),
            config.max_connections
        );
        Self::open(&config.path, config.max_connections, config.busy_timeout).await
    }

    pub async fn open(
        path: &Path,
        max_connections: u32,
        busy_timeout: Duration,
    ) -> Result<Self, AcarsRecorderError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| AcarsRecorderError::DatabaseConnectionError(e.to_string()))?;

        Self::new(pool).await
    }

    /// Create table `acars` and its time index
    async fn create_tables_indices(&self) -> Result<(), AcarsRecorderError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS acars (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                time REAL NOT NULL,
                freq TEXT NOT NULL,
                level REAL NOT NULL,
                error INTEGER NOT NULL,
                mode TEXT NOT NULL,
                label TEXT NOT NULL,
                sub_label TEXT,
                block_id TEXT,
                ack TEXT,
                reg_no TEXT,
                flight_no TEXT,
                msg_no TEXT,
                reassembly_status INTEGER NOT NULL DEFAULT 0,
                text TEXT,
                libacars TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AcarsRecorderError::DatabaseConnectionError(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_acars_time ON acars(time)")
            .execute(&self.pool)
            .await
            .map_err(|e| AcarsRecorderError::DatabaseConnectionError(e.to_string()))?;

        Ok(())
    }

    /// Page of matching rows together with the total match count
    pub async fn query(
        &self,
        predicate: &Predicate,
        ordering: Option<Ordering>,
        offset: i64,
        limit: i64,
    ) -> Result<Page, AcarsRecorderError> {
        let (rows, total_count) = tokio::try_join!(
            self.fetch(predicate, ordering, offset, limit),
            self.count_where(predicate)
        )?;
        Ok(Page { rows, total_count })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl MessageStore for Database {
    async fn insert(&self, message: &AcarsMessage) -> Result<i64, AcarsRecorderError> {
        let result = sqlx::query(
            "INSERT INTO acars (
                time, freq, level, error, mode, label, sub_label, block_id,
                ack, reg_no, flight_no, msg_no, reassembly_status, text, libacars
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        )
        .bind(message.time)
        .bind(&message.freq)
        .bind(message.level)
        .bind(message.error)
        .bind(&message.mode)
        .bind(&message.label)
        .bind(&message.sub_label)
        .bind(&message.block_id)
        .bind(&message.ack)
        .bind(&message.reg_no)
        .bind(&message.flight_no)
        .bind(&message.msg_no)
        .bind(i64::from(message.reassembly_status.code()))
        .bind(&message.text)
        .bind(&message.libacars)
        .execute(&self.pool)
        .await
        .map_err(AcarsRecorderError::StoreWriteError)?;

        Ok(result.last_insert_rowid())
    }

    async fn fetch(
        &self,
        predicate: &Predicate,
        ordering: Option<Ordering>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<StoredMessage>, AcarsRecorderError> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        push_where(&mut builder, predicate);

        builder.push(" ORDER BY ");
        if let Some(ordering) = ordering {
            builder
                .push(ordering.column.name())
                .push(" ")
                .push(ordering.direction.sql())
                .push(", ");
        }
        builder.push("id ASC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        let rows: Vec<MessageRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(AcarsRecorderError::StoreReadError)?;

        debug!("Fetched {} rows at offset {}", rows.len(), offset);
        rows.into_iter().map(StoredMessage::try_from).collect()
    }

    async fn count_where(&self, predicate: &Predicate) -> Result<i64, AcarsRecorderError> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM acars");
        push_where(&mut builder, predicate);

        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(AcarsRecorderError::StoreReadError)?;
        Ok(count)
    }

    async fn count_grouped_by(
        &self,
        predicate: &Predicate,
        field: FilterField,
    ) -> Result<Vec<ValueCount>, AcarsRecorderError> {
        let column = field.column().name();
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT ");
        builder
            .push(column)
            .push(" AS value, COUNT(*) AS count FROM acars");
        push_where(&mut builder, predicate);
        builder
            .push(" GROUP BY ")
            .push(column)
            .push(" ORDER BY ")
            .push(column)
            .push(" ASC");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(AcarsRecorderError::StoreReadError)?;

        rows.iter()
            .map(|row| -> Result<ValueCount, sqlx::Error> {
                let value = if field.is_integer() {
                    row.try_get::<Option<i64>, _>("value")?
                        .map(FieldValue::Integer)
                } else {
                    row.try_get::<Option<String>, _>("value")?
                        .map(FieldValue::Text)
                };
                Ok(ValueCount {
                    value,
                    count: row.try_get("count")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(AcarsRecorderError::StoreReadError)
    }
}

/// Render the predicate as a WHERE clause, binding every value
fn push_where(builder: &mut QueryBuilder<'_, Sqlite>, predicate: &Predicate) {
    for (i, condition) in predicate.conditions().iter().enumerate() {
        builder.push(if i == 0 { " WHERE " } else { " AND " });

        match condition {
            Condition::TimeAtLeast(start) => {
                builder.push("time >= ").push_bind(*start);
            }
            Condition::TimeAtMost(end) => {
                builder.push("time <= ").push_bind(*end);
            }
            Condition::OneOf {
                column,
                values,
                or_null,
            } => {
                builder.push("(");
                if *or_null {
                    builder.push(column.name()).push(" IS NULL OR ");
                }
                builder.push(column.name()).push(" IN (");
                let mut list = builder.separated(", ");
                for value in values {
                    match value {
                        FieldValue::Integer(v) => list.push_bind(*v),
                        FieldValue::Text(v) => list.push_bind(v.clone()),
                    };
                }
                list.push_unseparated("))");
            }
            Condition::IsNull(column) => {
                builder.push(column.name()).push(" IS NULL");
            }
            Condition::IsNotNull(column) => {
                builder.push(column.name()).push(" IS NOT NULL");
            }
            Condition::TextContains(needle) => {
                builder
                    .push("text LIKE ")
                    .push_bind(format!("%{}%", escape_like(needle)))
                    .push(" ESCAPE '\\'");
            }
        }
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
