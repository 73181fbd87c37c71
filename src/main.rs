use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storefront_orders::config::Config;
use storefront_orders::domain::order::{Address, CheckoutRequest, OrderError, OrderLedger, OrderStatus};
use storefront_orders::domain::payment::{PaymentDetails, PaymentSimulator, SentinelCardGateway, DECLINE_SENTINEL};
use storefront_orders::metrics::{self, Metrics};
use storefront_orders::store::{cart, catalog, Store};
use storefront_orders::utils::{Clock, SystemClock};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv_failure = storefront_orders::config::load_dotenv();

    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,storefront_orders=debug"))
        )
        .init();

    if let Some(e) = dotenv_failure {
        tracing::warn!(error = %e, "Ignoring unreadable .env file");
    }

    tracing::info!("🚀 Starting storefront order core");

    let config = Config::from_env();

    // === 1. Open the database ===
    tracing::info!(url = %config.database.url, "Opening SQLite database");
    let store = Store::connect(&config.database).await?;
    store.init_schema().await?;

    // === 2. Initialize Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // Start metrics HTTP server in background thread
    let metrics_registry = Arc::new(metrics.registry().clone());
    let metrics_config = config.metrics.clone();
    std::thread::spawn(move || {
        let system = actix_web::rt::System::new();
        if let Err(e) = system.block_on(metrics::start_metrics_server(
            metrics_registry,
            metrics_config.host,
            metrics_config.port,
        )) {
            tracing::error!("Metrics server error: {}", e);
        }
    });

    // === 3. Build the core services ===
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ledger = OrderLedger::new(store.clone(), clock.clone())
        .with_retry(config.retry.clone())
        .with_metrics(metrics.clone());
    let payments = PaymentSimulator::new(store.clone(), Arc::new(SentinelCardGateway), clock.clone())
        .with_retry(config.retry.clone())
        .with_metrics(metrics.clone());

    // === 4. Demonstrate the order lifecycle ===
    tracing::info!("📝 Demonstrating checkout, payment and cancellation");

    let (headphones, cable) = {
        let mut conn = store.pool().acquire().await?;
        let headphones = catalog::insert_product(&mut conn, "Headphones", Decimal::new(5000, 2), 10, Utc::now()).await?;
        let cable = catalog::insert_product(&mut conn, "USB-C Cable", Decimal::new(1299, 2), 25, Utc::now()).await?;
        (headphones, cable)
    };

    let alice = 1;
    let bob = 2;
    {
        let mut conn = store.pool().acquire().await?;
        cart::add_item(&mut conn, alice, headphones.id, 2, Utc::now()).await?;
        cart::add_item(&mut conn, bob, cable.id, 1, Utc::now()).await?;
    }

    // Alice checks out above the free-shipping threshold and pays
    let alice_order = ledger.create_order(alice, &demo_request("Alice")).await?;
    tracing::info!(
        order_id = alice_order.id,
        subtotal = %alice_order.subtotal,
        tax = %alice_order.tax,
        shipping = %alice_order.shipping,
        total = %alice_order.total,
        "✅ Order created"
    );

    let receipt = payments
        .process_payment(alice, alice_order.id, &PaymentDetails::card("4111111111111111"))
        .await?;
    tracing::info!(order_id = alice_order.id, transaction_id = %receipt.transaction_id, "💳 Payment completed");

    // Bob's card is declined, so he cancels and his cable goes back on the shelf
    let bob_order = ledger.create_order(bob, &demo_request("Bob")).await?;
    match payments
        .process_payment(bob, bob_order.id, &PaymentDetails::card(DECLINE_SENTINEL))
        .await
    {
        Err(OrderError::PaymentFailed { reason }) => {
            tracing::info!(order_id = bob_order.id, reason = %reason, "❌ Payment declined as expected");
        }
        other => tracing::warn!(result = ?other.map(|r| r.transaction_id), "Unexpected payment result"),
    }
    ledger.cancel_order(bob, bob_order.id).await?;

    // Fulfilment
    ledger.admin_update_status(alice_order.id, OrderStatus::Shipped).await?;
    ledger.admin_update_status(alice_order.id, OrderStatus::Delivered).await?;

    let page = ledger.list_all_orders(1, 20, None).await?;
    tracing::info!(total = page.total, total_pages = page.total_pages, "📋 Orders on record");
    for order in &page.orders {
        tracing::info!(
            order_id = order.id,
            user_id = order.user_id,
            status = %order.status,
            payment_status = %order.payment_status,
            total = %order.total,
            "Order"
        );
    }

    for recorded in ledger.order_history(alice, alice_order.id).await? {
        tracing::info!(
            order_id = recorded.order_id,
            event_type = recorded.event.event_type(),
            at = %recorded.recorded_at,
            "History"
        );
    }

    tracing::info!(
        "✅ Demo complete. Metrics at http://{}:{}/metrics. Press Ctrl+C to exit",
        config.metrics.host,
        config.metrics.port
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    store.pool().close().await;

    Ok(())
}

fn demo_request(name: &str) -> CheckoutRequest {
    let address = Address {
        name: Some(name.to_string()),
        street: "500 Market Street".to_string(),
        city: "San Francisco".to_string(),
        state: "CA".to_string(),
        postal_code: "94105".to_string(),
        country: "US".to_string(),
        phone: None,
    };

    CheckoutRequest {
        shipping_address: address.clone(),
        billing_address: address,
        payment_method: "credit_card".to_string(),
        notes: None,
    }
}
