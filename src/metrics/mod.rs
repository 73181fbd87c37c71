// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

use crate::domain::order::{OrderEvent, OrderStatus};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Checkout throughput and cancellations
// - Status transitions
// - Payment outcomes
// - Business-rule rejections and storage retries
// - Operation latency
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Central metrics registry for the order core
pub struct Metrics {
    registry: Registry,

    // Order lifecycle
    pub orders_created: IntCounter,
    pub orders_cancelled: IntCounter,
    pub status_transitions: IntCounterVec,

    // Payments
    pub payments: IntCounterVec,

    // Failures
    pub rejections: IntCounterVec,
    pub storage_retries: IntCounterVec,

    // Latency
    pub operation_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounter::new("orders_created_total", "Total orders created at checkout")?;
        registry.register(Box::new(orders_created.clone()))?;

        let orders_cancelled = IntCounter::new("orders_cancelled_total", "Total orders cancelled and restocked")?;
        registry.register(Box::new(orders_cancelled.clone()))?;

        let status_transitions = IntCounterVec::new(
            Opts::new("order_status_transitions_total", "Order status transitions"),
            &["from", "to"],
        )?;
        registry.register(Box::new(status_transitions.clone()))?;

        let payments = IntCounterVec::new(
            Opts::new("payments_total", "Payment attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(payments.clone()))?;

        let rejections = IntCounterVec::new(
            Opts::new("order_rejections_total", "Operations rejected by a business rule"),
            &["operation", "reason"],
        )?;
        registry.register(Box::new(rejections.clone()))?;

        let storage_retries = IntCounterVec::new(
            Opts::new("storage_retries_total", "Operations replayed after a transient storage failure"),
            &["operation"],
        )?;
        registry.register(Box::new(storage_retries.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new("order_operation_duration_seconds", "Order operation duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            orders_cancelled,
            status_transitions,
            payments,
            rejections,
            storage_retries,
            operation_duration,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_transition(&self, from: OrderStatus, to: OrderStatus) {
        self.status_transitions
            .with_label_values(&[from.as_str(), to.as_str()])
            .inc();
    }

    /// Count committed lifecycle events.
    pub fn record_order_events(&self, events: &[OrderEvent]) {
        for event in events {
            match event {
                OrderEvent::Placed(_) => self.orders_created.inc(),
                OrderEvent::Cancelled(e) => {
                    self.orders_cancelled.inc();
                    self.record_transition(e.previous_status, OrderStatus::Cancelled);
                }
                OrderEvent::StatusChanged(e) => self.record_transition(e.from, e.to),
                OrderEvent::PaymentCompleted(_) => self.record_payment("completed"),
                OrderEvent::PaymentFailed(_) => self.record_payment("failed"),
            }
        }
    }

    pub fn record_payment(&self, outcome: &str) {
        self.payments.with_label_values(&[outcome]).inc();
    }

    pub fn record_rejection(&self, operation: &str, reason: &str) {
        self.rejections.with_label_values(&[operation, reason]).inc();
    }

    pub fn record_retry(&self, operation: &str) {
        self.storage_retries.with_label_values(&[operation]).inc();
    }

    pub fn observe_duration(&self, operation: &str, duration_secs: f64) {
        self.operation_duration
            .with_label_values(&[operation])
            .observe(duration_secs);
    }
}
