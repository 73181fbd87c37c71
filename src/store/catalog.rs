use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::SqliteConnection;

use super::{decode_money, encode_money};
use crate::domain::order::OrderError;

// ============================================================================
// Catalog Repository - products and their stock counts
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    pub stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    price: String,
    stock: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = OrderError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            price: decode_money("products.price", &row.price)?,
            name: row.name,
            stock: row.stock,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub async fn insert_product(
    conn: &mut SqliteConnection,
    name: &str,
    price: Decimal,
    stock: i64,
    now: DateTime<Utc>,
) -> Result<Product, OrderError> {
    let result = sqlx::query(
        "INSERT INTO products (name, price, stock, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(name)
    .bind(encode_money(price))
    .bind(stock)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(Product {
        id: result.last_insert_rowid(),
        name: name.to_string(),
        price,
        stock,
        created_at: now,
        updated_at: now,
    })
}

pub async fn get_product(conn: &mut SqliteConnection, id: i64) -> Result<Option<Product>, OrderError> {
    let row: Option<ProductRow> = sqlx::query_as(
        "SELECT id, name, price, stock, created_at, updated_at FROM products WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(Product::try_from).transpose()
}

/// Add `delta` to a product's stock. Negative deltas only apply when enough
/// stock remains, so the check and the decrement are one statement.
///
/// Returns `false` when the product is missing or the decrement would go
/// below zero.
pub async fn adjust_stock(
    conn: &mut SqliteConnection,
    id: i64,
    delta: i64,
    now: DateTime<Utc>,
) -> Result<bool, OrderError> {
    let result = sqlx::query(
        "UPDATE products SET stock = stock + ?1, updated_at = ?2 WHERE id = ?3 AND stock + ?1 >= 0",
    )
    .bind(delta)
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Reprice a product. Existing order items keep their captured price.
pub async fn set_price(
    conn: &mut SqliteConnection,
    id: i64,
    price: Decimal,
    now: DateTime<Utc>,
) -> Result<bool, OrderError> {
    let result = sqlx::query("UPDATE products SET price = ?, updated_at = ? WHERE id = ?")
        .bind(encode_money(price))
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() == 1)
}
