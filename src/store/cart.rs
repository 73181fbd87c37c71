use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::decode_money;
use crate::domain::order::{CartLine, LiveProduct, OrderError};

// ============================================================================
// Cart Repository - per-user product/quantity lines
// ============================================================================

#[derive(sqlx::FromRow)]
struct CartLineRow {
    product_id: i64,
    quantity: i64,
    name: Option<String>,
    price: Option<String>,
    stock: Option<i64>,
}

/// Add `quantity` of a product to the user's cart, merging with an existing line.
pub async fn add_item(
    conn: &mut SqliteConnection,
    user_id: i64,
    product_id: i64,
    quantity: i64,
    now: DateTime<Utc>,
) -> Result<(), OrderError> {
    sqlx::query(
        "INSERT INTO cart_items (user_id, product_id, quantity, created_at) VALUES (?, ?, ?, ?)
         ON CONFLICT (user_id, product_id) DO UPDATE SET quantity = quantity + excluded.quantity",
    )
    .bind(user_id)
    .bind(product_id)
    .bind(quantity)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// All cart lines for a user, in insertion order, joined with live product data.
pub async fn lines_for_user(conn: &mut SqliteConnection, user_id: i64) -> Result<Vec<CartLine>, OrderError> {
    let rows: Vec<CartLineRow> = sqlx::query_as(
        "SELECT c.product_id, c.quantity, p.name, p.price, p.stock
         FROM cart_items c
         LEFT JOIN products p ON p.id = c.product_id
         WHERE c.user_id = ?
         ORDER BY c.id",
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|row| -> Result<CartLine, OrderError> {
            let product = match (row.name, row.price, row.stock) {
                (Some(name), Some(price), Some(stock)) => Some(LiveProduct {
                    price: decode_money("products.price", &price)?,
                    name,
                    stock,
                }),
                _ => None,
            };

            Ok(CartLine {
                product_id: row.product_id,
                quantity: row.quantity,
                product,
            })
        })
        .collect()
}

/// Remove every line from the user's cart. Returns the number of lines removed.
pub async fn clear(conn: &mut SqliteConnection, user_id: i64) -> Result<u64, OrderError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}
