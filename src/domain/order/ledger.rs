use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::{OrderEvent, OrderPlaced, RecordedOrderEvent};
use super::pricing::OrderTotals;
use super::value_objects::{CheckoutRequest, Order, OrderItem, OrderPage, OrderStatus};
use crate::metrics::Metrics;
use crate::store::orders::{NewOrder, OrderFilter};
use crate::store::{cart, catalog, orders, Store};
use crate::utils::{retry_on_transient, Clock, RetryConfig};

// ============================================================================
// Order Ledger
// ============================================================================
//
// Orchestrates: Cart/Catalog → Order → Aggregate → Events → Store
//
// Every operation runs in a single transaction. A transient storage failure
// replays the whole operation; business-rule failures roll back and return.
//
// ============================================================================

pub const MAX_PAGE_SIZE: u32 = 100;

pub struct OrderLedger {
    store: Store,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
    metrics: Option<Arc<Metrics>>,
}

impl OrderLedger {
    pub fn new(store: Store, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            retry: RetryConfig::default(),
            metrics: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Turn the user's cart into a pending order, decrementing stock and
    /// clearing the cart.
    pub async fn create_order(&self, user_id: i64, request: &CheckoutRequest) -> Result<Order, OrderError> {
        let started = Instant::now();

        let result = retry_on_transient(&self.retry, "create_order", move |attempt| {
            note_retry(self.metrics.as_deref(), "create_order", attempt);
            self.try_create_order(user_id, request)
        })
        .await
        .into_result();

        let result = self.committed(result);
        observe(self.metrics.as_deref(), "create_order", started, &result);

        if let Ok(order) = &result {
            tracing::info!(
                order_id = order.id,
                user_id = user_id,
                items = order.items.len(),
                total = %order.total,
                "Order created"
            );
        }
        result
    }

    async fn try_create_order(
        &self,
        user_id: i64,
        request: &CheckoutRequest,
    ) -> Result<(Order, Vec<OrderEvent>), OrderError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let lines = cart::lines_for_user(&mut *tx, user_id).await?;
        if lines.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let product = match line.product {
                Some(product) if product.stock >= line.quantity => product,
                Some(product) => return Err(OrderError::InsufficientStock { product: product.name }),
                None => {
                    return Err(OrderError::InsufficientStock {
                        product: format!("product #{}", line.product_id),
                    })
                }
            };

            items.push(OrderItem {
                product_id: line.product_id,
                product_name: product.name,
                unit_price: product.price,
                quantity: line.quantity,
            });
        }

        let totals = OrderTotals::from_items(&items)?;

        let order = orders::insert(
            &mut *tx,
            NewOrder {
                user_id,
                request,
                totals: &totals,
                items: &items,
                now,
            },
        )
        .await?;

        // The read above may be stale under concurrency; the conditional
        // decrement is the authoritative check.
        for item in &order.items {
            if !catalog::adjust_stock(&mut *tx, item.product_id, -item.quantity, now).await? {
                return Err(OrderError::InsufficientStock {
                    product: item.product_name.clone(),
                });
            }
        }

        cart::clear(&mut *tx, user_id).await?;

        let events = vec![OrderEvent::Placed(OrderPlaced {
            total: order.total,
            item_count: order.items.len(),
            at: now,
        })];
        orders::append_events(&mut *tx, order.id, &events).await?;

        tx.commit().await?;
        Ok((order, events))
    }

    /// Customer cancellation. Restocks every item.
    pub async fn cancel_order(&self, user_id: i64, order_id: i64) -> Result<Order, OrderError> {
        let started = Instant::now();

        let result = retry_on_transient(&self.retry, "cancel_order", move |attempt| {
            note_retry(self.metrics.as_deref(), "cancel_order", attempt);
            self.try_cancel_order(user_id, order_id)
        })
        .await
        .into_result();

        let result = self.committed(result);
        observe(self.metrics.as_deref(), "cancel_order", started, &result);

        if let Ok(order) = &result {
            tracing::info!(order_id = order.id, user_id = user_id, "Order cancelled");
        }
        result
    }

    async fn try_cancel_order(&self, user_id: i64, order_id: i64) -> Result<(Order, Vec<OrderEvent>), OrderError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let mut order = orders::find_for_user(&mut *tx, user_id, order_id)
            .await?
            .ok_or(OrderError::NotFound)?;

        let events = order.execute(&OrderCommand::Cancel, now)?;
        save_changes(&mut *tx, &order, &events, now).await?;

        tx.commit().await?;
        Ok((order, events))
    }

    /// Administrative status change along the transition table. Requesting
    /// the current status returns the order untouched.
    pub async fn admin_update_status(&self, order_id: i64, status: OrderStatus) -> Result<Order, OrderError> {
        let started = Instant::now();

        let result = retry_on_transient(&self.retry, "admin_update_status", move |attempt| {
            note_retry(self.metrics.as_deref(), "admin_update_status", attempt);
            self.try_admin_update_status(order_id, status)
        })
        .await
        .into_result();

        let result = self.committed(result);
        observe(self.metrics.as_deref(), "admin_update_status", started, &result);

        if let Ok(order) = &result {
            tracing::info!(order_id = order.id, status = %order.status, "Order status set by admin");
        }
        result
    }

    async fn try_admin_update_status(
        &self,
        order_id: i64,
        status: OrderStatus,
    ) -> Result<(Order, Vec<OrderEvent>), OrderError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let mut order = orders::find(&mut *tx, order_id).await?.ok_or(OrderError::NotFound)?;

        let events = order.execute(&OrderCommand::SetStatus { status }, now)?;
        if events.is_empty() {
            return Ok((order, events));
        }

        save_changes(&mut *tx, &order, &events, now).await?;

        tx.commit().await?;
        Ok((order, events))
    }

    /// The user's own orders, newest first.
    pub async fn list_orders(&self, user_id: i64, page: u32, page_size: u32) -> Result<OrderPage, OrderError> {
        let filter = OrderFilter {
            user_id: Some(user_id),
            status: None,
        };
        self.list("list_orders", filter, page, page_size).await
    }

    /// Every order, optionally restricted to one status.
    pub async fn list_all_orders(
        &self,
        page: u32,
        page_size: u32,
        status: Option<OrderStatus>,
    ) -> Result<OrderPage, OrderError> {
        let filter = OrderFilter { user_id: None, status };
        self.list("list_all_orders", filter, page, page_size).await
    }

    async fn list(
        &self,
        operation: &'static str,
        filter: OrderFilter,
        page: u32,
        page_size: u32,
    ) -> Result<OrderPage, OrderError> {
        let started = Instant::now();
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);

        let result = retry_on_transient(&self.retry, operation, move |attempt| {
            note_retry(self.metrics.as_deref(), operation, attempt);
            self.try_list(filter, page, page_size)
        })
        .await
        .into_result();

        observe(self.metrics.as_deref(), operation, started, &result);
        result
    }

    async fn try_list(&self, filter: OrderFilter, page: u32, page_size: u32) -> Result<OrderPage, OrderError> {
        let mut conn = self.store.pool().acquire().await?;

        let total = orders::count(&mut *conn, &filter).await?;
        let offset = u64::from(page - 1) * u64::from(page_size);
        let orders = orders::page(&mut *conn, &filter, page_size, offset).await?;

        Ok(OrderPage {
            orders,
            page,
            page_size,
            total,
            total_pages: page_count(total, page_size),
        })
    }

    /// A single order owned by `user_id`.
    pub async fn get_order(&self, user_id: i64, order_id: i64) -> Result<Order, OrderError> {
        let started = Instant::now();

        let result = retry_on_transient(&self.retry, "get_order", move |attempt| {
            note_retry(self.metrics.as_deref(), "get_order", attempt);
            self.try_get_order(user_id, order_id)
        })
        .await
        .into_result();

        observe(self.metrics.as_deref(), "get_order", started, &result);
        result
    }

    async fn try_get_order(&self, user_id: i64, order_id: i64) -> Result<Order, OrderError> {
        let mut conn = self.store.pool().acquire().await?;
        orders::find_for_user(&mut *conn, user_id, order_id)
            .await?
            .ok_or(OrderError::NotFound)
    }

    /// The audit trail of an order owned by `user_id`, oldest first.
    pub async fn order_history(&self, user_id: i64, order_id: i64) -> Result<Vec<RecordedOrderEvent>, OrderError> {
        let started = Instant::now();

        let result = retry_on_transient(&self.retry, "order_history", move |attempt| {
            note_retry(self.metrics.as_deref(), "order_history", attempt);
            self.try_order_history(user_id, order_id)
        })
        .await
        .into_result();

        observe(self.metrics.as_deref(), "order_history", started, &result);
        result
    }

    async fn try_order_history(&self, user_id: i64, order_id: i64) -> Result<Vec<RecordedOrderEvent>, OrderError> {
        let mut conn = self.store.pool().acquire().await?;

        if orders::find_for_user(&mut *conn, user_id, order_id).await?.is_none() {
            return Err(OrderError::NotFound);
        }
        orders::events_for(&mut *conn, order_id).await
    }

    /// Count the events of a committed operation and hand back the order.
    fn committed(&self, result: Result<(Order, Vec<OrderEvent>), OrderError>) -> Result<Order, OrderError> {
        let (order, events) = result?;
        if let Some(metrics) = &self.metrics {
            metrics.record_order_events(&events);
        }
        Ok(order)
    }
}

/// Persist an order's new lifecycle state and the events that produced it.
/// Cancellation returns every item to stock, whoever requested it.
pub(crate) async fn save_changes(
    conn: &mut SqliteConnection,
    order: &Order,
    events: &[OrderEvent],
    now: DateTime<Utc>,
) -> Result<(), OrderError> {
    if events.is_empty() {
        return Ok(());
    }

    if events.iter().any(|e| matches!(e, OrderEvent::Cancelled(_))) {
        for item in &order.items {
            let restocked = catalog::adjust_stock(&mut *conn, item.product_id, item.quantity, now).await?;
            if !restocked {
                tracing::warn!(
                    order_id = order.id,
                    product_id = item.product_id,
                    quantity = item.quantity,
                    "Product no longer exists, skipping restock"
                );
            }
        }
    }

    orders::update_state(&mut *conn, order).await?;
    orders::append_events(&mut *conn, order.id, events).await?;

    Ok(())
}

pub(crate) fn note_retry(metrics: Option<&Metrics>, operation: &str, attempt: u32) {
    if attempt > 1 {
        if let Some(metrics) = metrics {
            metrics.record_retry(operation);
        }
    }
}

pub(crate) fn observe<T>(
    metrics: Option<&Metrics>,
    operation: &str,
    started: Instant,
    result: &Result<T, OrderError>,
) {
    if let Err(e) = result {
        if e.is_business_rule() {
            tracing::debug!(operation = operation, reason = e.kind(), error = %e, "Operation rejected");
        } else {
            tracing::error!(operation = operation, error = %e, "Operation failed");
        }
    }

    let Some(metrics) = metrics else {
        return;
    };

    if let Err(e) = result {
        if e.is_business_rule() {
            metrics.record_rejection(operation, e.kind());
        }
    }
    metrics.observe_duration(operation, started.elapsed().as_secs_f64());
}

// ============================================================================
// Unit Tests
// ============================================================================

/// Pages needed for `total` rows, saturating at `u32::MAX`.
fn page_count(total: u64, page_size: u32) -> u32 {
    u32::try_from(total.div_ceil(u64::from(page_size))).unwrap_or(u32::MAX)
}
