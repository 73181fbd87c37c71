use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::{decode_money, encode_money};
use crate::domain::order::{
    Address, CheckoutRequest, Order, OrderError, OrderEvent, OrderItem, OrderStatus, OrderTotals,
    PaymentStatus, RecordedOrderEvent,
};

// ============================================================================
// Order Repository - orders, item snapshots and the order event trail
// ============================================================================
//
// This is the only place addresses and money cross between structured values
// and their stored text form.
//
// ============================================================================

const ORDER_COLUMNS: &str = "id, user_id, status, subtotal, tax, shipping, total, \
     shipping_address, billing_address, payment_method, payment_status, notes, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    user_id: i64,
    status: OrderStatus,
    subtotal: String,
    tax: String,
    shipping: String,
    total: String,
    shipping_address: Json<Address>,
    billing_address: Json<Address>,
    payment_method: String,
    payment_status: PaymentStatus,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, OrderError> {
        Ok(Order {
            id: self.id,
            user_id: self.user_id,
            status: self.status,
            subtotal: decode_money("orders.subtotal", &self.subtotal)?,
            tax: decode_money("orders.tax", &self.tax)?,
            shipping: decode_money("orders.shipping", &self.shipping)?,
            total: decode_money("orders.total", &self.total)?,
            shipping_address: self.shipping_address.0,
            billing_address: self.billing_address.0,
            payment_method: self.payment_method,
            payment_status: self.payment_status,
            notes: self.notes,
            items,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    order_id: i64,
    product_id: i64,
    product_name: String,
    unit_price: String,
    quantity: i64,
}

#[derive(sqlx::FromRow)]
struct OrderEventRow {
    id: i64,
    order_id: i64,
    payload: String,
    created_at: DateTime<Utc>,
}

/// Everything needed to persist a freshly checked-out order.
pub struct NewOrder<'a> {
    pub user_id: i64,
    pub request: &'a CheckoutRequest,
    pub totals: &'a OrderTotals,
    pub items: &'a [OrderItem],
    pub now: DateTime<Utc>,
}

/// Insert an order in `pending`/`pending` together with its item snapshots.
pub async fn insert(conn: &mut SqliteConnection, new: NewOrder<'_>) -> Result<Order, OrderError> {
    debug_assert!(new.totals.is_consistent(), "inconsistent totals: {:?}", new.totals);

    let result = sqlx::query(
        "INSERT INTO orders (
            user_id, status, subtotal, tax, shipping, total,
            shipping_address, billing_address, payment_method, payment_status,
            notes, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(new.user_id)
    .bind(OrderStatus::Pending)
    .bind(encode_money(new.totals.subtotal))
    .bind(encode_money(new.totals.tax))
    .bind(encode_money(new.totals.shipping))
    .bind(encode_money(new.totals.total))
    .bind(Json(&new.request.shipping_address))
    .bind(Json(&new.request.billing_address))
    .bind(&new.request.payment_method)
    .bind(PaymentStatus::Pending)
    .bind(&new.request.notes)
    .bind(new.now)
    .bind(new.now)
    .execute(&mut *conn)
    .await?;

    let order_id = result.last_insert_rowid();

    for item in new.items {
        sqlx::query(
            "INSERT INTO order_items (order_id, product_id, product_name, unit_price, quantity)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(order_id)
        .bind(item.product_id)
        .bind(&item.product_name)
        .bind(encode_money(item.unit_price))
        .bind(item.quantity)
        .execute(&mut *conn)
        .await?;
    }

    Ok(Order {
        id: order_id,
        user_id: new.user_id,
        status: OrderStatus::Pending,
        subtotal: new.totals.subtotal,
        tax: new.totals.tax,
        shipping: new.totals.shipping,
        total: new.totals.total,
        shipping_address: new.request.shipping_address.clone(),
        billing_address: new.request.billing_address.clone(),
        payment_method: new.request.payment_method.clone(),
        payment_status: PaymentStatus::Pending,
        notes: new.request.notes.clone(),
        items: new.items.to_vec(),
        created_at: new.now,
        updated_at: new.now,
    })
}

/// Load an order with its items, regardless of owner.
pub async fn find(conn: &mut SqliteConnection, order_id: i64) -> Result<Option<Order>, OrderError> {
    let query = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?");
    let row: Option<OrderRow> = sqlx::query_as(&query)
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?;

    hydrate_one(conn, row).await
}

/// Load an order only if it belongs to `user_id`.
pub async fn find_for_user(
    conn: &mut SqliteConnection,
    user_id: i64,
    order_id: i64,
) -> Result<Option<Order>, OrderError> {
    let query = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ? AND user_id = ?");
    let row: Option<OrderRow> = sqlx::query_as(&query)
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    hydrate_one(conn, row).await
}

async fn hydrate_one(conn: &mut SqliteConnection, row: Option<OrderRow>) -> Result<Option<Order>, OrderError> {
    let Some(row) = row else {
        return Ok(None);
    };

    let mut items = items_for(conn, &[row.id]).await?;
    let order_items = items.remove(&row.id).unwrap_or_default();
    row.into_order(order_items).map(Some)
}

/// Persist the mutable lifecycle fields of an order.
pub async fn update_state(conn: &mut SqliteConnection, order: &Order) -> Result<(), OrderError> {
    sqlx::query("UPDATE orders SET status = ?, payment_status = ?, updated_at = ? WHERE id = ?")
        .bind(order.status)
        .bind(order.payment_status)
        .bind(order.updated_at)
        .bind(order.id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Filter for order listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderFilter {
    pub user_id: Option<i64>,
    pub status: Option<OrderStatus>,
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &OrderFilter) {
    builder.push(" WHERE 1 = 1");
    if let Some(user_id) = filter.user_id {
        builder.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status);
    }
}

pub async fn count(conn: &mut SqliteConnection, filter: &OrderFilter) -> Result<u64, OrderError> {
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM orders");
    push_filter(&mut builder, filter);

    let total: i64 = builder.build_query_scalar().fetch_one(&mut *conn).await?;
    Ok(total.max(0) as u64)
}

/// Newest orders first, each hydrated with its items.
pub async fn page(
    conn: &mut SqliteConnection,
    filter: &OrderFilter,
    limit: u32,
    offset: u64,
) -> Result<Vec<Order>, OrderError> {
    let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {ORDER_COLUMNS} FROM orders"));
    push_filter(&mut builder, filter);
    builder
        .push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(i64::from(limit))
        .push(" OFFSET ")
        .push_bind(offset as i64);

    let rows: Vec<OrderRow> = builder.build_query_as().fetch_all(&mut *conn).await?;

    let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
    let mut items = items_for(conn, &ids).await?;

    rows.into_iter()
        .map(|row| {
            let order_items = items.remove(&row.id).unwrap_or_default();
            row.into_order(order_items)
        })
        .collect()
}

/// Item snapshots for a batch of orders, keyed by order id.
async fn items_for(
    conn: &mut SqliteConnection,
    order_ids: &[i64],
) -> Result<HashMap<i64, Vec<OrderItem>>, OrderError> {
    let mut by_order: HashMap<i64, Vec<OrderItem>> = HashMap::new();
    if order_ids.is_empty() {
        return Ok(by_order);
    }

    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT order_id, product_id, product_name, unit_price, quantity FROM order_items WHERE order_id IN (",
    );
    let mut separated = builder.separated(", ");
    for id in order_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY id");

    let rows: Vec<OrderItemRow> = builder.build_query_as().fetch_all(&mut *conn).await?;

    for row in rows {
        let item = OrderItem {
            product_id: row.product_id,
            unit_price: decode_money("order_items.unit_price", &row.unit_price)?,
            product_name: row.product_name,
            quantity: row.quantity,
        };
        by_order.entry(row.order_id).or_default().push(item);
    }

    Ok(by_order)
}

pub async fn append_events(
    conn: &mut SqliteConnection,
    order_id: i64,
    events: &[OrderEvent],
) -> Result<(), OrderError> {
    for event in events {
        let payload = serde_json::to_string(event)
            .map_err(|e| OrderError::Corrupt(format!("unencodable {} event: {e}", event.event_type())))?;

        sqlx::query("INSERT INTO order_events (order_id, event_type, payload, created_at) VALUES (?, ?, ?, ?)")
            .bind(order_id)
            .bind(event.event_type())
            .bind(payload)
            .bind(event.occurred_at())
            .execute(&mut *conn)
            .await?;

        tracing::debug!(
            order_id = order_id,
            event_type = event.event_type(),
            "Recorded order event"
        );
    }

    Ok(())
}

/// The event trail for one order, oldest first.
pub async fn events_for(conn: &mut SqliteConnection, order_id: i64) -> Result<Vec<RecordedOrderEvent>, OrderError> {
    let rows: Vec<OrderEventRow> = sqlx::query_as(
        "SELECT id, order_id, payload, created_at FROM order_events WHERE order_id = ? ORDER BY id",
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|row| -> Result<RecordedOrderEvent, OrderError> {
            let event: OrderEvent = serde_json::from_str(&row.payload)
                .map_err(|e| OrderError::Corrupt(format!("order_events.payload #{}: {e}", row.id)))?;

            Ok(RecordedOrderEvent {
                id: row.id,
                order_id: row.order_id,
                event,
                recorded_at: row.created_at,
            })
        })
        .collect()
}
