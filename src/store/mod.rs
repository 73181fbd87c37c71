// ============================================================================
// Storage Layer - embedded SQLite through sqlx
// ============================================================================
//
// Repository functions take `&mut SqliteConnection` so the ledger can run
// catalog, cart and order writes inside one transaction.
//
// ============================================================================

use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};

use crate::config::DatabaseConfig;
use crate::domain::order::OrderError;

pub mod cart;
pub mod catalog;
pub mod orders;
mod schema;

#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        tracing::info!(
            url = %config.url,
            max_connections = config.max_connections,
            "Connected to SQLite"
        );

        Ok(Self { pool })
    }

    /// Private in-memory database with the schema applied. A single pinned
    /// connection keeps the database alive for the lifetime of the pool.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create tables and indexes if missing.
    pub async fn init_schema(&self) -> Result<(), sqlx::Error> {
        for statement in schema::ALL_STATEMENTS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::debug!("Schema initialized");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a write transaction. `BEGIN IMMEDIATE` takes the write lock up
    /// front, so competing writers wait out `busy_timeout` instead of failing
    /// with SQLITE_BUSY when upgrading a stale read snapshot.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin_with("BEGIN IMMEDIATE").await
    }
}

pub(crate) fn encode_money(value: Decimal) -> String {
    value.to_string()
}

pub(crate) fn decode_money(column: &str, raw: &str) -> Result<Decimal, OrderError> {
    Decimal::from_str(raw)
        .map_err(|e| OrderError::Corrupt(format!("{column} = {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let store = Store::in_memory().await.unwrap();
        store.init_schema().await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(store.pool())
        .await
        .unwrap();

        assert_eq!(tables, vec!["cart_items", "order_events", "order_items", "orders", "products"]);
    }

    #[test]
    fn test_money_text_keeps_scale() {
        assert_eq!(encode_money(dec!(42.39)), "42.39");
        assert_eq!(encode_money(dec!(0.00)), "0.00");
        assert_eq!(decode_money("total", "108.00").unwrap(), dec!(108.00));
    }

    #[test]
    fn test_bad_money_is_corrupt() {
        let result = decode_money("price", "twelve");
        assert!(matches!(result, Err(OrderError::Corrupt(msg)) if msg.contains("price")));
    }
}
