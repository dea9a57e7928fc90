//! `PostgreSQL` implementation of the `EventRepository` trait.
//!
//! A push runs in one serializable transaction. Each event is appended with a
//! single `INSERT ... SELECT ... WHERE EXISTS` that reads the stream's current
//! maximum sequence and inserts nothing when the caller's expected previous
//! sequence is stale. Unique constraints are written in the same transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres as Pg, Row};
use thiserror::Error;
use uuid::Uuid;

use warden_core::error::DomainError;
use warden_core::event::{PushEvent, StoredEvent};
use warden_core::repository::EventRepository;
use warden_core::search::{Columns, SearchQuery};
use warden_core::unique::{UniqueConstraint, check_unique_constraint_actions};

use crate::config::EventStoreConfig;
use crate::dialect::{Dialect, Postgres};
use crate::query::{BindValue, CompiledQuery, compile};
use crate::schema;

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// Failure of one push attempt.
#[derive(Debug, Error)]
enum PushError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl PushError {
    /// Serialization failures, deadlocks, and sequence collisions with a
    /// concurrent push are resolved by running the transaction again.
    fn is_transient(&self) -> bool {
        let Self::Database(sqlx::Error::Database(db_err)) = self else {
            return false;
        };
        match db_err.code().as_deref() {
            Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED) => true,
            _ => {
                db_err.is_unique_violation()
                    && db_err.constraint() == Some(schema::EVENTS_PRIMARY_KEY)
            }
        }
    }

    fn into_domain(self) -> DomainError {
        match self {
            Self::Domain(err) => err,
            Self::Database(err) => internal(&err),
        }
    }
}

fn internal(err: &sqlx::Error) -> DomainError {
    DomainError::Internal(format!("database error: {err}"))
}

/// PostgreSQL-backed event repository.
#[derive(Debug, Clone)]
pub struct PgEventRepository {
    pool: PgPool,
    config: EventStoreConfig,
    insert_event: String,
    insert_constraint: String,
    delete_constraint: String,
}

impl PgEventRepository {
    /// Creates a new `PgEventRepository` with default retry settings.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self::with_config(pool, EventStoreConfig::default())
    }

    /// Creates a new `PgEventRepository` with explicit retry settings.
    #[must_use]
    pub fn with_config(pool: PgPool, config: EventStoreConfig) -> Self {
        let dialect = Postgres;
        Self {
            pool,
            config,
            insert_event: insert_event_statement(dialect.events_table()),
            insert_constraint: format!(
                "INSERT INTO {} (unique_type, unique_field) VALUES ($1, $2)",
                dialect.unique_constraints_table()
            ),
            delete_constraint: format!(
                "DELETE FROM {} WHERE unique_type = $1 AND unique_field = $2",
                dialect.unique_constraints_table()
            ),
        }
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn push_once(
        &self,
        events: &[PushEvent],
        unique_constraints: &[UniqueConstraint],
    ) -> Result<Vec<StoredEvent>, PushError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        let mut stored = Vec::with_capacity(events.len());
        for event in events {
            let row = sqlx::query(&self.insert_event)
                .bind(Uuid::now_v7())
                .bind(event.event_type.as_str())
                .bind(event.aggregate_type.as_str())
                .bind(&event.aggregate_id)
                .bind(event.version.as_str())
                .bind(event.creation_date)
                .bind(payload(&event.data))
                .bind(&event.editor_user)
                .bind(&event.editor_service)
                .bind(&event.resource_owner)
                .bind(event.check_previous_sequence)
                .bind(to_big_int(event.previous_sequence)?)
                .fetch_optional(&mut *tx)
                .await?;

            let Some(row) = row else {
                tracing::warn!(
                    aggregate_type = %event.aggregate_type,
                    aggregate_id = %event.aggregate_id,
                    expected = event.previous_sequence,
                    "previous sequence is stale, rejecting push"
                );
                return Err(DomainError::ConcurrencyConflict {
                    aggregate_type: event.aggregate_type.clone(),
                    aggregate_id: event.aggregate_id.clone(),
                    expected: event.previous_sequence,
                }
                .into());
            };
            stored.push(appended(event, &row)?);
        }

        let actions = check_unique_constraint_actions(unique_constraints);
        for constraint in actions.removes {
            sqlx::query(&self.delete_constraint)
                .bind(&constraint.unique_type)
                .bind(&constraint.unique_field)
                .execute(&mut *tx)
                .await?;
        }
        for constraint in actions.adds {
            let result = sqlx::query(&self.insert_constraint)
                .bind(&constraint.unique_type)
                .bind(&constraint.unique_field)
                .execute(&mut *tx)
                .await;
            if let Err(sqlx::Error::Database(db_err)) = &result {
                if db_err.is_unique_violation() {
                    tracing::debug!(
                        unique_type = %constraint.unique_type,
                        unique_field = %constraint.unique_field,
                        "unique constraint already taken"
                    );
                    return Err(DomainError::AlreadyExists(constraint.error_key.clone()).into());
                }
            }
            result?;
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn fetch(&self, compiled: &CompiledQuery) -> Result<Vec<PgRow>, DomainError> {
        bind_all(sqlx::query(&compiled.sql), &compiled.binds)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "event query failed");
                internal(&e)
            })
    }
}

#[async_trait]
impl EventRepository for PgEventRepository {
    #[tracing::instrument(skip_all, fields(events = events.len(), constraints = unique_constraints.len()))]
    async fn push(
        &self,
        events: &[PushEvent],
        unique_constraints: &[UniqueConstraint],
    ) -> Result<Vec<StoredEvent>, DomainError> {
        for event in events {
            event.validate()?;
        }
        if events.is_empty() && unique_constraints.is_empty() {
            return Ok(vec![]);
        }

        let mut attempt = 1;
        loop {
            match self.push_once(events, unique_constraints).await {
                Ok(stored) => {
                    tracing::info!(events = stored.len(), attempt, "pushed events");
                    return Ok(stored);
                }
                Err(err) if err.is_transient() && attempt < self.config.max_push_attempts => {
                    tracing::warn!(attempt, error = %err, "transient push failure, retrying");
                    tokio::time::sleep(self.config.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(PushError::Database(err)) => {
                    tracing::error!(attempt, error = %err, "push failed");
                    return Err(internal(&err));
                }
                Err(err) => return Err(err.into_domain()),
            }
        }
    }

    #[tracing::instrument(skip_all, fields(filter_groups = query.filters.len(), limit = query.limit))]
    async fn filter(&self, query: &SearchQuery) -> Result<Vec<StoredEvent>, DomainError> {
        let query = SearchQuery {
            columns: Columns::Event,
            ..query.clone()
        };
        let compiled = compile(&Postgres, &query)?;
        self.fetch(&compiled)
            .await?
            .iter()
            .map(stored_event)
            .collect()
    }

    #[tracing::instrument(skip_all, fields(filter_groups = query.filters.len()))]
    async fn latest_sequence(&self, query: &SearchQuery) -> Result<u64, DomainError> {
        let query = SearchQuery {
            columns: Columns::MaxSequence,
            ..query.clone()
        };
        let compiled = compile(&Postgres, &query)?;
        let rows = self.fetch(&compiled).await?;
        let max: Option<i64> = match rows.first() {
            Some(row) => row.try_get(0).map_err(|e| internal(&e))?,
            None => None,
        };
        match max {
            Some(sequence) => from_big_int(sequence),
            None => Err(DomainError::NotFound(
                "no events match the query".to_owned(),
            )),
        }
    }

    async fn health(&self) -> Result<(), DomainError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| internal(&e))?;
        Ok(())
    }
}

fn insert_event_statement(table: &str) -> String {
    format!(
        "INSERT INTO {table} (
            id, event_type, aggregate_type, aggregate_id, aggregate_version,
            creation_date, event_data, editor_user, editor_service, resource_owner,
            event_sequence, previous_sequence
        )
        SELECT
            $1, $2, $3, $4, $5,
            COALESCE($6, NOW()), $7, $8, $9,
            COALESCE(
                (SELECT first_event.resource_owner FROM {table} AS first_event
                  WHERE first_event.aggregate_type = $3 AND first_event.aggregate_id = $4
                  ORDER BY first_event.event_sequence LIMIT 1),
                $10
            ),
            COALESCE(stream.max_sequence, 0) + 1,
            COALESCE(stream.max_sequence, 0)
        FROM (
            SELECT MAX(event_sequence) AS max_sequence, COUNT(*) AS event_count
              FROM {table}
             WHERE aggregate_type = $3 AND aggregate_id = $4
        ) AS stream
        WHERE EXISTS (
            SELECT 1 WHERE NOT $11
                OR (stream.event_count = 0 AND $12 = 0)
                OR stream.max_sequence = $12
        )
        RETURNING id, creation_date, event_sequence, previous_sequence, resource_owner"
    )
}

fn bind_all<'q>(
    mut query: Query<'q, Pg, PgArguments>,
    binds: &'q [BindValue],
) -> Query<'q, Pg, PgArguments> {
    for bind in binds {
        query = match bind {
            BindValue::Text(text) => query.bind(text.as_str()),
            BindValue::TextList(values) => query.bind(values.as_slice()),
            BindValue::BigInt(value) => query.bind(*value),
        };
    }
    query
}

fn payload(data: &serde_json::Value) -> Option<&serde_json::Value> {
    if data.is_null() { None } else { Some(data) }
}

fn to_big_int(value: u64) -> Result<i64, DomainError> {
    i64::try_from(value)
        .map_err(|_| DomainError::InvalidArgument(format!("{value} exceeds the sequence range")))
}

fn from_big_int(value: i64) -> Result<u64, DomainError> {
    u64::try_from(value)
        .map_err(|_| DomainError::Internal(format!("stored sequence {value} is negative")))
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, DomainError>
where
    T: sqlx::Decode<'r, Pg> + sqlx::Type<Pg>,
{
    row.try_get(name)
        .map_err(|e| DomainError::Internal(format!("cannot read column {name}: {e}")))
}

fn appended(event: &PushEvent, row: &PgRow) -> Result<StoredEvent, DomainError> {
    let creation_date: DateTime<Utc> = column(row, "creation_date")?;
    Ok(StoredEvent {
        id: column(row, "id")?,
        aggregate_id: event.aggregate_id.clone(),
        aggregate_type: event.aggregate_type.clone(),
        resource_owner: column(row, "resource_owner")?,
        version: event.version.clone(),
        event_type: event.event_type.clone(),
        data: event.data.clone(),
        editor_user: event.editor_user.clone(),
        editor_service: event.editor_service.clone(),
        sequence: from_big_int(column(row, "event_sequence")?)?,
        previous_sequence: from_big_int(column(row, "previous_sequence")?)?,
        creation_date,
    })
}

fn stored_event(row: &PgRow) -> Result<StoredEvent, DomainError> {
    let data: Option<serde_json::Value> = column(row, "event_data")?;
    Ok(StoredEvent {
        id: column(row, "id")?,
        aggregate_id: column(row, "aggregate_id")?,
        aggregate_type: column::<String>(row, "aggregate_type")?.into(),
        resource_owner: column(row, "resource_owner")?,
        version: column::<String>(row, "aggregate_version")?.into(),
        event_type: column::<String>(row, "event_type")?.into(),
        data: data.unwrap_or(serde_json::Value::Null),
        editor_user: column(row, "editor_user")?,
        editor_service: column(row, "editor_service")?,
        sequence: from_big_int(column(row, "event_sequence")?)?,
        previous_sequence: from_big_int(column(row, "previous_sequence")?)?,
        creation_date: column(row, "creation_date")?,
    })
}
