//! PostgreSQL store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgExecutor, Postgres, QueryBuilder, Row};
use tracing::info;

use super::{IndexStore, StoreError, TransactionPage, TransactionQuery};
use crate::cursor::{CursorUpdate, IndexerState};
use crate::events::{EventType, IndexedTransaction, ParsedEvent};
use crate::types::{InMessage, Lt, OutMessage};

const TRANSACTION_COLUMNS: &str = "hash, lt, utime, contract_address, in_msg, out_msgs, \
     event_type, parsed_data, processed, created_at";

/// [`IndexStore`] backed by a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects to `database_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    async fn write_cursor<'e, E>(executor: E, update: &CursorUpdate) -> Result<(), StoreError>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r"
            INSERT INTO indexer_state
                (contract_address, last_processed_lt, last_processed_hash, last_processed_time)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (contract_address) DO UPDATE SET
                last_processed_lt = EXCLUDED.last_processed_lt,
                last_processed_hash = EXCLUDED.last_processed_hash,
                last_processed_time = EXCLUDED.last_processed_time,
                updated_at = NOW()
            ",
        )
        .bind(&update.contract_address)
        .bind(update.lt.to_string())
        .bind(&update.hash)
        .bind(update.time)
        .execute(executor)
        .await?;

        Ok(())
    }
}

fn lt_to_db(lt: Lt) -> Result<i64, StoreError> {
    i64::try_from(lt.get()).map_err(|_| StoreError::OutOfRange("lt"))
}

fn lt_from_db(value: i64) -> Result<Lt, StoreError> {
    u64::try_from(value)
        .map(Lt::new)
        .map_err(|_| StoreError::OutOfRange("lt"))
}

fn state_from_row(row: &PgRow) -> Result<IndexerState, StoreError> {
    let lt: String = row.try_get("last_processed_lt")?;
    let last_processed_lt: Lt = lt
        .parse()
        .map_err(|e| StoreError::Corrupt(format!("last_processed_lt: {e}")))?;

    Ok(IndexerState {
        contract_address: row.try_get("contract_address")?,
        last_processed_lt,
        last_processed_hash: row.try_get("last_processed_hash")?,
        last_processed_time: row.try_get::<Option<DateTime<Utc>>, _>("last_processed_time")?,
        is_running: row.try_get("is_running")?,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<IndexedTransaction, StoreError> {
    let event_type: String = row.try_get("event_type")?;
    let event_type: EventType = event_type
        .parse()
        .map_err(|e| StoreError::Corrupt(format!("event_type: {e}")))?;

    let in_msg: Option<Json<InMessage>> = row.try_get("in_msg")?;
    let out_msgs: Json<Vec<OutMessage>> = row.try_get("out_msgs")?;
    let parsed_data: Option<Json<ParsedEvent>> = row.try_get("parsed_data")?;

    Ok(IndexedTransaction {
        hash: row.try_get("hash")?,
        lt: lt_from_db(row.try_get("lt")?)?,
        utime: row.try_get("utime")?,
        contract_address: row.try_get("contract_address")?,
        in_msg: in_msg.map(|json| json.0),
        out_msgs: out_msgs.0,
        event_type,
        parsed_data: parsed_data.map(|json| json.0),
        processed: row.try_get("processed")?,
        created_at: row.try_get("created_at")?,
    })
}

fn push_filters<'q>(builder: &mut QueryBuilder<'q, Postgres>, query: &TransactionQuery) {
    builder.push(" WHERE TRUE");
    if let Some(address) = &query.contract_address {
        builder.push(" AND contract_address = ").push_bind(address.clone());
    }
    if let Some(event_type) = query.event_type {
        builder
            .push(" AND event_type = ")
            .push_bind(event_type.as_str());
    }
    if let Some(processed) = query.processed {
        builder.push(" AND processed = ").push_bind(processed);
    }
}

#[async_trait]
impl IndexStore for PgStore {
    async fn load_state(
        &self,
        contract_address: &str,
    ) -> Result<Option<IndexerState>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT contract_address, last_processed_lt, last_processed_hash,
                   last_processed_time, is_running
            FROM indexer_state
            WHERE contract_address = $1
            ",
        )
        .bind(contract_address)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(state_from_row).transpose()
    }

    async fn insert_state_if_absent(
        &self,
        state: &IndexerState,
    ) -> Result<IndexerState, StoreError> {
        sqlx::query(
            r"
            INSERT INTO indexer_state
                (contract_address, last_processed_lt, last_processed_hash,
                 last_processed_time, is_running)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (contract_address) DO NOTHING
            ",
        )
        .bind(&state.contract_address)
        .bind(state.last_processed_lt.to_string())
        .bind(&state.last_processed_hash)
        .bind(state.last_processed_time)
        .bind(state.is_running)
        .execute(&self.pool)
        .await?;

        self.load_state(&state.contract_address)
            .await?
            .ok_or_else(|| StoreError::Corrupt("state row vanished after insert".to_string()))
    }

    async fn set_running(&self, contract_address: &str, running: bool) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE indexer_state SET is_running = $2, updated_at = NOW() WHERE contract_address = $1",
        )
        .bind(contract_address)
        .bind(running)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn rewind_cursor(&self, contract_address: &str, lt: Lt) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO indexer_state
                (contract_address, last_processed_lt, last_processed_hash, last_processed_time)
            VALUES ($1, $2, '', NOW())
            ON CONFLICT (contract_address) DO UPDATE SET
                last_processed_lt = EXCLUDED.last_processed_lt,
                last_processed_hash = '',
                last_processed_time = NOW(),
                updated_at = NOW()
            ",
        )
        .bind(contract_address)
        .bind(lt.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn advance_cursor(&self, update: &CursorUpdate) -> Result<(), StoreError> {
        Self::write_cursor(&self.pool, update).await
    }

    async fn find_transaction(
        &self,
        hash: &str,
    ) -> Result<Option<IndexedTransaction>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM indexed_transactions WHERE hash = $1"
        ))
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn insert_transaction(&self, row: &IndexedTransaction) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r"
            INSERT INTO indexed_transactions
                (hash, lt, utime, contract_address, in_msg, out_msgs,
                 event_type, parsed_data, processed, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (hash) DO NOTHING
            ",
        )
        .bind(&row.hash)
        .bind(lt_to_db(row.lt)?)
        .bind(row.utime)
        .bind(&row.contract_address)
        .bind(row.in_msg.as_ref().map(Json))
        .bind(Json(&row.out_msgs))
        .bind(row.event_type.as_str())
        .bind(row.parsed_data.as_ref().map(Json))
        .bind(row.processed)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete_transaction(
        &self,
        hash: &str,
        update: &CursorUpdate,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE indexed_transactions SET processed = TRUE, updated_at = NOW() WHERE hash = $1",
        )
        .bind(hash)
        .execute(&mut *tx)
        .await?;

        Self::write_cursor(&mut *tx, update).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn count_transactions(
        &self,
        contract_address: &str,
        processed: Option<bool>,
    ) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM indexed_transactions
            WHERE contract_address = $1 AND ($2::BOOLEAN IS NULL OR processed = $2)
            ",
        )
        .bind(contract_address)
        .bind(processed)
        .fetch_one(&self.pool)
        .await?;

        u64::try_from(count).map_err(|_| StoreError::OutOfRange("count"))
    }

    async fn list_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<TransactionPage, StoreError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM indexed_transactions");
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let offset = i64::try_from(query.offset()).map_err(|_| StoreError::OutOfRange("offset"))?;
        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {TRANSACTION_COLUMNS} FROM indexed_transactions"
        ));
        push_filters(&mut select, query);
        select
            .push(" ORDER BY lt DESC, created_at DESC LIMIT ")
            .push_bind(i64::from(query.limit))
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = select.build().fetch_all(&self.pool).await?;
        let transactions = rows
            .iter()
            .map(transaction_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TransactionPage {
            transactions,
            total: u64::try_from(total).map_err(|_| StoreError::OutOfRange("count"))?,
        })
    }
}
