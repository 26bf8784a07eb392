//! SQLite-backed ledger store.
//!
//! Schema:
//!
//! | table | columns |
//! |-------|---------|
//! | `movements` | `id` (primary key), `signed_amount_minor`, `kind`, `occurred_at` (RFC 3339), `note` |
//! | `ledger_state` | single row (`id = 1`): `balance_minor`, `currency`, `version` |
//!
//! Amounts are stored as integer minor units so no precision is lost. The
//! combined movement + state write runs in one SQLite transaction, and the
//! database is opened with `synchronous = FULL` so a committed write survives a
//! crash.
//!
//! ## Runtime
//!
//! `LedgerStore` is synchronous; sqlx is async. The store owns a small tokio runtime
//! and blocks on it. Called from a worker of a multi-thread tokio runtime it goes
//! through `block_in_place`; from inside a current-thread runtime every call fails
//! with `StoreError::Storage` instead of panicking (use `spawn_blocking` there).

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Row, SqliteConnection};
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use tracing::{Span, info, instrument, warn};

use piggybank_core::{Currency, MovementId, from_minor_units, to_minor_units};
use piggybank_ledger::{LedgerSnapshot, Movement, MovementKind};

use super::{LedgerStore, StoreError};

/// Durable ledger store on a SQLite database file.
#[derive(Debug)]
pub struct SqliteLedgerStore {
    pool: SqlitePool,
    handle: Handle,
    /// Only taken in `Drop`.
    runtime: Option<Runtime>,
}

impl SqliteLedgerStore {
    /// Open (creating if missing) the database at `url`, e.g. `sqlite://piggy.db`.
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid SQLite url {url:?}"))
            .map_err(storage_failure)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);

        Self::connect(SqlitePoolOptions::new().max_connections(4), options)
    }

    /// Private in-memory database (tests/dev). Lives as long as the store.
    pub fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("invalid in-memory SQLite url")
            .map_err(storage_failure)?;

        // Every connection to `:memory:` is a separate database: pin exactly one.
        let pool_options = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>);

        Self::connect(pool_options, options)
    }

    fn connect(
        pool_options: SqlitePoolOptions,
        options: SqliteConnectOptions,
    ) -> Result<Self, StoreError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("piggybank-sqlite")
            .enable_all()
            .build()
            .context("failed to start runtime for the SQLite store")
            .map_err(storage_failure)?;

        let handle = runtime.handle().clone();

        let connected = run_blocking(&handle, async {
            let pool = pool_options
                .connect_with(options)
                .await
                .context("failed to create SQLite pool")?;
            create_schema(&pool).await?;
            Ok::<_, anyhow::Error>(pool)
        })
        .and_then(|result| result.map_err(storage_failure));

        match connected {
            Ok(pool) => {
                info!("sqlite ledger store ready");
                Ok(Self {
                    pool,
                    handle,
                    runtime: Some(runtime),
                })
            }
            Err(err) => {
                // A plain drop panics when we are inside another runtime.
                runtime.shutdown_background();
                Err(err)
            }
        }
    }

    #[instrument(skip(self, movement), fields(movement_id = %movement.id()), err)]
    async fn append_async(&self, movement: &Movement) -> Result<(), StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        insert_movement(&mut conn, movement).await
    }

    #[instrument(
        skip(self, movement, state),
        fields(movement_id = %movement.id(), version = state.version()),
        err
    )]
    async fn append_with_state_async(
        &self,
        movement: &Movement,
        state: &LedgerSnapshot,
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        insert_movement(&mut tx, movement).await?;
        upsert_state(&mut tx, state).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self), fields(movement_count = tracing::field::Empty), err)]
    async fn read_all_async(&self) -> Result<Vec<Movement>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, signed_amount_minor, kind, occurred_at, note
            FROM movements
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("read_all", e))?;

        let movements = rows
            .iter()
            .map(movement_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Span::current().record("movement_count", movements.len());
        Ok(movements)
    }

    #[instrument(skip(self), err)]
    async fn read_state_async(&self) -> Result<Option<LedgerSnapshot>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT balance_minor, currency, version
            FROM ledger_state
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("read_current_state", e))?;

        row.as_ref().map(state_from_row).transpose()
    }

    #[instrument(skip(self, state), fields(version = state.version()), err)]
    async fn write_state_async(&self, state: &LedgerSnapshot) -> Result<(), StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        upsert_state(&mut conn, state).await
    }
}

impl Drop for SqliteLedgerStore {
    fn drop(&mut self) {
        // Close connections while the runtime that drives them is still alive.
        if run_blocking(&self.handle, self.pool.close()).is_err() {
            warn!("SQLite store dropped inside a current-thread runtime; connections close in the background");
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn append(&self, movement: &Movement) -> Result<(), StoreError> {
        run_blocking(&self.handle, self.append_async(movement))?
    }

    fn append_with_state(
        &self,
        movement: &Movement,
        state: &LedgerSnapshot,
    ) -> Result<(), StoreError> {
        run_blocking(&self.handle, self.append_with_state_async(movement, state))?
    }

    fn read_all(&self) -> Result<Vec<Movement>, StoreError> {
        run_blocking(&self.handle, self.read_all_async())?
    }

    fn read_current_state(&self) -> Result<Option<LedgerSnapshot>, StoreError> {
        run_blocking(&self.handle, self.read_state_async())?
    }

    fn write_current_state(&self, state: &LedgerSnapshot) -> Result<(), StoreError> {
        run_blocking(&self.handle, self.write_state_async(state))?
    }
}

/// Drive `future` on the store's runtime from synchronous code.
fn run_blocking<F>(handle: &Handle, future: F) -> Result<F::Output, StoreError>
where
    F: std::future::Future,
{
    match Handle::try_current() {
        Err(_) => Ok(handle.block_on(future)),
        Ok(current) if current.runtime_flavor() == RuntimeFlavor::MultiThread => {
            Ok(tokio::task::block_in_place(|| handle.block_on(future)))
        }
        Ok(_) => Err(StoreError::storage(
            "SQLite store called from a current-thread tokio runtime; call it via spawn_blocking",
        )),
    }
}

async fn create_schema(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS movements (
            id                  INTEGER PRIMARY KEY NOT NULL,
            signed_amount_minor INTEGER NOT NULL,
            kind                TEXT NOT NULL CHECK (kind IN ('DEPOSIT', 'WITHDRAWAL')),
            occurred_at         TEXT NOT NULL,
            note                TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create movements table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ledger_state (
            id            INTEGER PRIMARY KEY NOT NULL CHECK (id = 1),
            balance_minor INTEGER NOT NULL CHECK (balance_minor >= 0),
            currency      TEXT NOT NULL,
            version       INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create ledger_state table")?;

    Ok(())
}

async fn insert_movement(
    conn: &mut SqliteConnection,
    movement: &Movement,
) -> Result<(), StoreError> {
    let id = i64::try_from(movement.id().value())
        .map_err(|_| StoreError::storage(format!("movement id {} out of range", movement.id())))?;
    let minor = to_minor_units(movement.signed_amount())
        .map_err(|e| StoreError::storage(e.to_string()))?;

    let result = sqlx::query(
        r#"
        INSERT INTO movements (id, signed_amount_minor, kind, occurred_at, note)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(id)
    .bind(minor)
    .bind(movement.kind().as_str())
    .bind(movement.occurred_at().to_rfc3339_opts(SecondsFormat::Nanos, true))
    .bind(movement.note())
    .execute(&mut *conn)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(err) if is_unique_violation(&err) => Err(StoreError::DuplicateId(movement.id())),
        Err(err) => Err(map_sqlx_error("append", err)),
    }
}

async fn upsert_state(conn: &mut SqliteConnection, state: &LedgerSnapshot) -> Result<(), StoreError> {
    let balance = to_minor_units(state.balance()).map_err(|e| StoreError::storage(e.to_string()))?;
    let version = i64::try_from(state.version())
        .map_err(|_| StoreError::storage(format!("version {} out of range", state.version())))?;

    sqlx::query(
        r#"
        INSERT INTO ledger_state (id, balance_minor, currency, version)
        VALUES (1, ?1, ?2, ?3)
        ON CONFLICT(id)
        DO UPDATE SET
            balance_minor = excluded.balance_minor,
            currency = excluded.currency,
            version = excluded.version
        "#,
    )
    .bind(balance)
    .bind(state.currency().code())
    .bind(version)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("write_current_state", e))?;

    Ok(())
}

fn movement_from_row(row: &SqliteRow) -> Result<Movement, StoreError> {
    let id: i64 = row.try_get("id").map_err(decode_error)?;
    let minor: i64 = row.try_get("signed_amount_minor").map_err(decode_error)?;
    let kind: String = row.try_get("kind").map_err(decode_error)?;
    let occurred_at: String = row.try_get("occurred_at").map_err(decode_error)?;
    let note: String = row.try_get("note").map_err(decode_error)?;

    let id = u64::try_from(id).map_err(|_| StoreError::corrupt(format!("negative movement id {id}")))?;
    let kind = MovementKind::parse(&kind).map_err(|e| StoreError::corrupt(e.to_string()))?;
    let occurred_at = DateTime::parse_from_rfc3339(&occurred_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::corrupt(format!("movement {id}: bad timestamp: {e}")))?;

    Movement::from_parts(
        MovementId::new(id),
        from_minor_units(minor),
        kind,
        occurred_at,
        note,
    )
    .map_err(|e| StoreError::corrupt(e.to_string()))
}

fn state_from_row(row: &SqliteRow) -> Result<LedgerSnapshot, StoreError> {
    let balance: i64 = row.try_get("balance_minor").map_err(decode_error)?;
    let currency: String = row.try_get("currency").map_err(decode_error)?;
    let version: i64 = row.try_get("version").map_err(decode_error)?;

    let currency = Currency::from_str(&currency).map_err(|e| StoreError::corrupt(e.to_string()))?;
    let version =
        u64::try_from(version).map_err(|_| StoreError::corrupt(format!("negative version {version}")))?;

    LedgerSnapshot::from_parts(from_minor_units(balance), currency, version)
        .map_err(|e| StoreError::corrupt(e.to_string()))
}

fn storage_failure(err: anyhow::Error) -> StoreError {
    StoreError::Storage(format!("{err:#}"))
}

fn decode_error(err: sqlx::Error) -> StoreError {
    StoreError::corrupt(format!("failed to decode row: {err}"))
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            StoreError::storage(format!("database error in {operation}: {}", db_err.message()))
        }
        sqlx::Error::PoolClosed => {
            StoreError::storage(format!("connection pool closed in {operation}"))
        }
        other => StoreError::storage(format!("sqlx error in {operation}: {other}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error().is_some_and(|db_err| {
        db_err.is_unique_violation() || db_err.message().contains("UNIQUE constraint failed")
    })
}
