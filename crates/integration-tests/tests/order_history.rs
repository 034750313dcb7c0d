//! Order history after checkout: merged views, status changes, durability.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::TimeDelta;

use chainmart_core::{OrderId, OrderStatus, WalletAddress};
use chainmart_integration_tests::{
    RemoteBehavior, Scenario, TestContext, buyer, domain_configuration, domain_listing,
};
use chainmart_storefront::checkout::{Checkout, CheckoutReceipt};
use chainmart_storefront::store::{
    FileStore, LocalStore, OrderBook, OrderHistory, RemoteOrderStore, StoreError, StoreEvents,
};

async fn purchase(ctx: &TestContext, keyword: &str) -> CheckoutReceipt {
    let mut checkout = Checkout::domain(domain_listing(keyword, 3999), domain_configuration());
    ctx.orchestrator.run(&mut checkout).await.unwrap()
}

fn history(ctx: &TestContext) -> OrderHistory {
    let remote: Arc<dyn RemoteOrderStore> = ctx.remote.clone();
    OrderHistory::new(ctx.deps().orders.clone(), remote)
}

// =============================================================================
// Merged History
// =============================================================================

#[tokio::test]
async fn test_history_merges_orders_from_other_devices() {
    let ctx = TestContext::new();
    let receipt = purchase(&ctx, "example.io").await;

    let mut elsewhere = receipt.order.clone();
    elsewhere.id = OrderId::new("ORD-1700000000000");
    elsewhere.created_at = receipt.order.created_at - TimeDelta::days(1);
    ctx.remote.seed_order(elsewhere.clone());

    let orders = history(&ctx).for_buyer(&buyer()).await.unwrap();

    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0], receipt.order);
    assert_eq!(orders[1], elsewhere);
}

#[tokio::test]
async fn test_history_excludes_other_buyers() {
    let ctx = TestContext::new();
    let receipt = purchase(&ctx, "example.io").await;

    let stranger = WalletAddress::parse("0x1111111111111111111111111111111111111111").unwrap();
    let mut theirs = receipt.order.clone();
    theirs.id = OrderId::new("ORD-1700000000001");
    theirs.buyer = stranger.clone();
    ctx.remote.seed_order(theirs);

    assert_eq!(history(&ctx).for_buyer(&buyer()).await.unwrap().len(), 1);
    assert_eq!(history(&ctx).for_buyer(&stranger).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_history_falls_back_to_local_orders() {
    let ctx = Scenario {
        remote: RemoteBehavior::Fails,
        ..Scenario::default()
    }
    .build();
    let receipt = purchase(&ctx, "example.io").await;

    let orders = history(&ctx).for_buyer(&buyer()).await.unwrap();

    assert_eq!(orders, [receipt.order]);
    assert!(ctx.log.contains("remote:query_orders_by_buyer"));
}

// =============================================================================
// Status Changes
// =============================================================================

#[tokio::test]
async fn test_processing_order_moves_once() {
    let ctx = TestContext::new();
    let receipt = purchase(&ctx, "example.io").await;
    let id = &receipt.order.id;

    let confirmed = ctx
        .deps()
        .orders
        .set_status(id, OrderStatus::Confirmed)
        .await
        .unwrap();
    assert_eq!(confirmed.status, OrderStatus::Confirmed);
    assert_eq!(confirmed.items, receipt.order.items);
    assert_eq!(confirmed.total, receipt.order.total);

    let err = ctx
        .deps()
        .orders
        .set_status(id, OrderStatus::Failed)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Order(_)));

    ctx.remote
        .update_order_status(id, OrderStatus::Confirmed)
        .await
        .unwrap();
    assert_eq!(ctx.remote.orders()[0].status, OrderStatus::Confirmed);
}

#[tokio::test]
async fn test_unknown_order_status_change_is_not_found() {
    let ctx = TestContext::new();
    let err = ctx
        .deps()
        .orders
        .set_status(&OrderId::new("ORD-0"), OrderStatus::Confirmed)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

// =============================================================================
// Durability
// =============================================================================

#[tokio::test]
async fn test_recorded_order_survives_reopen() {
    let ctx = TestContext::new();
    let receipt = purchase(&ctx, "example.io").await;
    let dir = tempfile::tempdir().unwrap();

    {
        let store: Arc<dyn LocalStore> = Arc::new(FileStore::open(dir.path()).await.unwrap());
        let book = OrderBook::new(store, StoreEvents::new());
        book.record_order(receipt.order.clone()).await.unwrap();
        book.save_domain(receipt.domain.clone().unwrap()).await.unwrap();
    }

    let store: Arc<dyn LocalStore> = Arc::new(FileStore::open(dir.path()).await.unwrap());
    let book = OrderBook::new(store, StoreEvents::new());

    assert_eq!(book.orders().await.unwrap(), [receipt.order.clone()]);
    let domain = book.domain("example.io").await.unwrap().unwrap();
    assert_eq!(domain.owner, Some(buyer()));

    let err = book.record_order(receipt.order).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}
