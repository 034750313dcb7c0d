//! End-to-end checkout scenarios for Chainmart.
//!
//! The tests in `tests/` drive a real [`Orchestrator`] whose collaborators
//! are the in-memory fakes below. Every fake appends to a shared
//! [`EventLog`], so a scenario can assert the order in which the wallet,
//! the registrar, the fulfillment service and the stores were touched.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p chainmart-integration-tests
//! ```
//!
//! No database, wallet or upstream service is needed.

#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use primitive_types::U256;
use rust_decimal::Decimal;

use chainmart_core::{
    Cart, Currency, Domain, DomainName, FulfillmentOrderId, Order, OrderId, OrderStatus, Product,
    ProductId, Provenance, TxHash, WalletAddress,
};
use chainmart_storefront::chain::{
    ChainGateway, ConnectorKind, NetworkConfig, ProviderError, TransactionReceipt,
    TransactionRequest, WalletProvider,
};
use chainmart_storefront::checkout::{
    CheckoutConfig, CheckoutDeps, DomainConfiguration, Orchestrator, ShippingForm,
};
use chainmart_storefront::fulfillment::{
    FulfillmentError, FulfillmentOrderRequest, FulfillmentService, SellableItem,
};
use chainmart_storefront::registrar::{
    DegradedModePolicy, FollowUpConfig, FollowUpQueue, RegistrarClient, RegistrarError,
    RegistrarTransport,
};
use chainmart_storefront::store::{
    CartService, LocalStore, MemoryStore, OrderBook, RemoteOrderStore, StoreError, StoreEvents,
};

pub const BUYER: &str = "0x52908400098527886e0f7030069857d2e4169ee7";
pub const MERCHANT: &str = "0x8617e340b3d01fa5f11f306f4090fd50e238070d";

/// Registration id the healthy fake registrar hands out.
pub const REGISTRATION_ID: &str = "REG-1001";

/// Order id the accepting fake fulfillment service hands out.
pub const FULFILLMENT_ORDER_ID: &str = "PF-5001";

/// Head block reported by the fake wallet; receipts land one block earlier.
const HEAD_BLOCK: u64 = 101;

pub fn buyer() -> WalletAddress {
    WalletAddress::parse(BUYER).unwrap()
}

pub fn payment_hash() -> TxHash {
    TxHash::parse(&format!("0x{}", "ab".repeat(32))).unwrap()
}

// =============================================================================
// Event Log
// =============================================================================

/// Ordered record of every call the fakes saw.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn record(&self, event: impl Into<String>) {
        self.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Index of the first occurrence of `event`.
    pub fn position(&self, event: &str) -> Option<usize> {
        self.lock().iter().position(|recorded| recorded == event)
    }

    pub fn contains(&self, event: &str) -> bool {
        self.position(event).is_some()
    }

    /// Index of the first event starting with `prefix`.
    pub fn first_with_prefix(&self, prefix: &str) -> Option<usize> {
        self.lock()
            .iter()
            .position(|recorded| recorded.starts_with(prefix))
    }

    pub fn any_with_prefix(&self, prefix: &str) -> bool {
        self.first_with_prefix(prefix).is_some()
    }

    /// Panics unless every registrar and fulfillment call came after the
    /// payment was mined.
    pub fn assert_provisioned_after_payment(&self) {
        let Some(mined) = self.position("wallet:mined") else {
            assert!(
                !self.any_with_prefix("registrar:") && !self.any_with_prefix("fulfillment:"),
                "provisioning ran without a mined payment: {:?}",
                self.events()
            );
            return;
        };
        for prefix in ["registrar:", "fulfillment:"] {
            if let Some(first) = self.first_with_prefix(prefix) {
                assert!(
                    first > mined,
                    "{prefix} call before payment was mined: {:?}",
                    self.events()
                );
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// Wallet
// =============================================================================

/// How the fake wallet treats a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalletBehavior {
    /// Accept and mine the transaction.
    #[default]
    Confirms,
    /// The buyer declines the signature request.
    Rejects,
    /// Accept, but the transaction never gets a receipt.
    NeverConfirms,
    /// Accept and mine, but the transaction reverts.
    Reverts,
}

/// Injected wallet on BNB Smart Chain holding 1 BNB.
pub struct FakeWallet {
    behavior: WalletBehavior,
    log: EventLog,
    sent: Mutex<Vec<TransactionRequest>>,
}

impl FakeWallet {
    pub const fn new(behavior: WalletBehavior, log: EventLog) -> Self {
        Self {
            behavior,
            log,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Transactions the buyer signed.
    pub fn sent(&self) -> Vec<TransactionRequest> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl WalletProvider for FakeWallet {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Injected
    }

    async fn request_accounts(&self) -> Result<Vec<WalletAddress>, ProviderError> {
        self.log.record("wallet:connect");
        Ok(vec![buyer()])
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        Ok(chainmart_storefront::chain::DEFAULT_CHAIN_ID)
    }

    async fn switch_chain(&self, _chain_id: u64) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn native_balance(&self, _address: &WalletAddress) -> Result<U256, ProviderError> {
        Ok(U256::exp10(18))
    }

    async fn call(&self, _to: &WalletAddress, _data: &[u8]) -> Result<Vec<u8>, ProviderError> {
        let mut word = [0_u8; 32];
        (U256::from(100_u8) * U256::exp10(18)).to_big_endian(&mut word);
        Ok(word.to_vec())
    }

    async fn send_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<TxHash, ProviderError> {
        self.log.record("wallet:send");
        if self.behavior == WalletBehavior::Rejects {
            return Err(ProviderError::UserRejected);
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        Ok(payment_hash())
    }

    async fn transaction_receipt(
        &self,
        tx_hash: &TxHash,
    ) -> Result<Option<TransactionReceipt>, ProviderError> {
        let succeeded = match self.behavior {
            WalletBehavior::NeverConfirms | WalletBehavior::Rejects => return Ok(None),
            WalletBehavior::Confirms => true,
            WalletBehavior::Reverts => false,
        };
        self.log.record("wallet:mined");
        Ok(Some(TransactionReceipt {
            tx_hash: tx_hash.clone(),
            block_number: HEAD_BLOCK - 1,
            succeeded,
        }))
    }

    async fn block_number(&self) -> Result<u64, ProviderError> {
        Ok(HEAD_BLOCK)
    }
}

// =============================================================================
// Registrar
// =============================================================================

/// How the fake registrar answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistrarBehavior {
    #[default]
    Healthy,
    /// `register` cannot reach the registrar; everything else works.
    RegistrationDown,
    /// `register` works; every follow-up command fails.
    FollowUpsDown,
}

/// Registrar transport that answers from a script and records every call.
pub struct FakeRegistrar {
    behavior: RegistrarBehavior,
    log: EventLog,
    calls: Mutex<Vec<Vec<(String, String)>>>,
}

impl FakeRegistrar {
    pub const fn new(behavior: RegistrarBehavior, log: EventLog) -> Self {
        Self {
            behavior,
            log,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Wire names of every command sent, in order.
    pub fn commands(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|params| param(params, "command").map(str::to_owned))
            .collect()
    }

    /// Parameters of every call to `command`.
    pub fn calls_for(&self, command: &str) -> Vec<Vec<(String, String)>> {
        self.calls()
            .into_iter()
            .filter(|params| param(params, "command") == Some(command))
            .collect()
    }

    fn calls(&self) -> Vec<Vec<(String, String)>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Value of `key` in a recorded parameter list.
pub fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.as_str())
}

#[async_trait]
impl RegistrarTransport for FakeRegistrar {
    async fn get(&self, params: &[(String, String)]) -> Result<String, RegistrarError> {
        let command = param(params, "command").unwrap_or_default().to_owned();
        self.log.record(format!("registrar:{command}"));
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(params.to_vec());

        match (self.behavior, command.as_str()) {
            (RegistrarBehavior::RegistrationDown, "register") => {
                Err(RegistrarError::Unavailable("registrar offline".to_owned()))
            }
            (RegistrarBehavior::FollowUpsDown, command) if command != "register" => {
                Err(RegistrarError::Unavailable("registrar offline".to_owned()))
            }
            (_, "register") => Ok(serde_json::json!({
                "RegisterResponse": {
                    "ResponseCode": "0",
                    "RegistrationId": REGISTRATION_ID,
                }
            })
            .to_string()),
            _ => Ok(r#"{"CommandResponse":{"ResponseCode":"0"}}"#.to_owned()),
        }
    }
}

// =============================================================================
// Fulfillment
// =============================================================================

/// How the fake fulfillment service answers `create_order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FulfillmentBehavior {
    #[default]
    Accepts,
    Fails,
    /// The client crashes mid-call.
    Panics,
}

pub struct FakeFulfillment {
    behavior: FulfillmentBehavior,
    log: EventLog,
    requests: Mutex<Vec<FulfillmentOrderRequest>>,
}

impl FakeFulfillment {
    pub const fn new(behavior: FulfillmentBehavior, log: EventLog) -> Self {
        Self {
            behavior,
            log,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every order request received.
    pub fn requests(&self) -> Vec<FulfillmentOrderRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl FulfillmentService for FakeFulfillment {
    async fn list_products(&self) -> Result<Vec<SellableItem>, FulfillmentError> {
        Ok(Vec::new())
    }

    async fn create_order(
        &self,
        request: &FulfillmentOrderRequest,
    ) -> Result<FulfillmentOrderId, FulfillmentError> {
        self.log.record("fulfillment:create_order");
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        match self.behavior {
            FulfillmentBehavior::Accepts => Ok(FulfillmentOrderId::new(FULFILLMENT_ORDER_ID)),
            FulfillmentBehavior::Fails => Err(FulfillmentError::Unavailable(
                "print provider offline".to_owned(),
            )),
            FulfillmentBehavior::Panics => panic!("fulfillment client crashed"),
        }
    }
}

// =============================================================================
// Stores
// =============================================================================

/// How the fake remote store behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemoteBehavior {
    #[default]
    Records,
    /// Every call fails as if the network dropped.
    Fails,
    /// Remote persistence is switched off.
    Disabled,
}

/// In-memory stand-in for the server-side order mirror.
pub struct FakeRemoteStore {
    behavior: RemoteBehavior,
    log: EventLog,
    orders: Mutex<Vec<Order>>,
    domains: Mutex<Vec<Domain>>,
}

impl FakeRemoteStore {
    pub const fn new(behavior: RemoteBehavior, log: EventLog) -> Self {
        Self {
            behavior,
            log,
            orders: Mutex::new(Vec::new()),
            domains: Mutex::new(Vec::new()),
        }
    }

    pub fn orders(&self) -> Vec<Order> {
        self.orders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn domains(&self) -> Vec<Domain> {
        self.domains
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Seed an order as if another device had written it.
    pub fn seed_order(&self, order: Order) {
        self.orders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(order);
    }

    fn check(&self, operation: &str) -> Result<(), StoreError> {
        self.log.record(format!("remote:{operation}"));
        if self.behavior == RemoteBehavior::Fails {
            return Err(StoreError::Remote("connection reset by peer".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteOrderStore for FakeRemoteStore {
    fn is_enabled(&self) -> bool {
        self.behavior != RemoteBehavior::Disabled
    }

    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        self.check("insert_order")?;
        let mut orders = self.orders.lock().unwrap_or_else(PoisonError::into_inner);
        if orders.iter().any(|existing| existing.id == order.id) {
            return Err(StoreError::Conflict(format!("order {} already exists", order.id)));
        }
        orders.push(order.clone());
        Ok(())
    }

    async fn query_orders_by_buyer(
        &self,
        buyer: &WalletAddress,
    ) -> Result<Vec<Order>, StoreError> {
        self.check("query_orders_by_buyer")?;
        let mut orders: Vec<Order> = self
            .orders()
            .into_iter()
            .filter(|order| &order.buyer == buyer)
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn upsert_domain(&self, domain: &Domain) -> Result<(), StoreError> {
        self.check("upsert_domain")?;
        let mut domains = self.domains.lock().unwrap_or_else(PoisonError::into_inner);
        domains.retain(|existing| existing.full_name != domain.full_name);
        domains.push(domain.clone());
        Ok(())
    }

    async fn update_order_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        self.check("update_order_status")?;
        let mut orders = self.orders.lock().unwrap_or_else(PoisonError::into_inner);
        let order = orders
            .iter_mut()
            .find(|order| &order.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("order {id}")))?;
        order.transition_to(status)?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check("ping")
    }
}

/// [`MemoryStore`] that records writes and can refuse order and domain
/// writes.
pub struct FakeLocalStore {
    inner: MemoryStore,
    log: EventLog,
    fail_order_writes: bool,
}

impl FakeLocalStore {
    pub fn new(fail_order_writes: bool, log: EventLog) -> Self {
        Self {
            inner: MemoryStore::new(),
            log,
            fail_order_writes,
        }
    }

    fn check(&self, operation: &str) -> Result<(), StoreError> {
        self.log.record(format!("local:{operation}"));
        if self.fail_order_writes {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        Ok(())
    }
}

#[async_trait]
impl LocalStore for FakeLocalStore {
    async fn load_cart(&self) -> Result<Cart, StoreError> {
        self.inner.load_cart().await
    }

    async fn save_cart(&self, cart: &Cart) -> Result<(), StoreError> {
        self.log.record("local:save_cart");
        self.inner.save_cart(cart).await
    }

    async fn load_orders(&self) -> Result<Vec<Order>, StoreError> {
        self.inner.load_orders().await
    }

    async fn save_orders(&self, orders: &[Order]) -> Result<(), StoreError> {
        self.check("save_orders")?;
        self.inner.save_orders(orders).await
    }

    async fn load_domains(&self) -> Result<Vec<Domain>, StoreError> {
        self.inner.load_domains().await
    }

    async fn save_domains(&self, domains: &[Domain]) -> Result<(), StoreError> {
        self.check("save_domains")?;
        self.inner.save_domains(domains).await
    }
}

// =============================================================================
// Scenario Wiring
// =============================================================================

/// Knobs for one checkout scenario.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub wallet: WalletBehavior,
    pub registrar: RegistrarBehavior,
    pub fulfillment: FulfillmentBehavior,
    pub remote: RemoteBehavior,
    pub local_writes_fail: bool,
    pub policy: DegradedModePolicy,
    pub confirmation_timeout: Duration,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            wallet: WalletBehavior::default(),
            registrar: RegistrarBehavior::default(),
            fulfillment: FulfillmentBehavior::default(),
            remote: RemoteBehavior::default(),
            local_writes_fail: false,
            policy: DegradedModePolicy::lenient(),
            confirmation_timeout: Duration::from_secs(5),
        }
    }
}

impl Scenario {
    /// Wire an orchestrator around the fakes.
    ///
    /// Must be called inside a tokio runtime; the follow-up worker is
    /// spawned here.
    pub fn build(self) -> TestContext {
        let log = EventLog::default();

        let wallet = Arc::new(FakeWallet::new(self.wallet, log.clone()));
        let provider: Arc<dyn WalletProvider> = wallet.clone();
        let gateway = Arc::new(ChainGateway::new(network()).with_injected(provider));

        let registrar = Arc::new(FakeRegistrar::new(self.registrar, log.clone()));
        let transport: Arc<dyn RegistrarTransport> = registrar.clone();
        let client = RegistrarClient::new(transport, self.policy);
        let follow_ups = FollowUpQueue::spawn(
            client.clone(),
            FollowUpConfig {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(1),
            },
        );

        let fulfillment = Arc::new(FakeFulfillment::new(self.fulfillment, log.clone()));
        let remote = Arc::new(FakeRemoteStore::new(self.remote, log.clone()));
        let local: Arc<dyn LocalStore> =
            Arc::new(FakeLocalStore::new(self.local_writes_fail, log.clone()));
        let events = StoreEvents::new();

        let deps = CheckoutDeps {
            gateway,
            registrar: client,
            follow_ups,
            fulfillment: fulfillment.clone(),
            remote: remote.clone(),
            cart: CartService::new(Arc::clone(&local), events.clone()),
            orders: OrderBook::new(local, events),
        };
        let config = CheckoutConfig {
            confirmation_timeout: self.confirmation_timeout,
            ..CheckoutConfig::default()
        };

        TestContext {
            log,
            wallet,
            registrar,
            fulfillment,
            remote,
            orchestrator: Orchestrator::new(deps, config),
        }
    }
}

/// A wired orchestrator and handles to every fake behind it.
pub struct TestContext {
    pub log: EventLog,
    pub wallet: Arc<FakeWallet>,
    pub registrar: Arc<FakeRegistrar>,
    pub fulfillment: Arc<FakeFulfillment>,
    pub remote: Arc<FakeRemoteStore>,
    pub orchestrator: Orchestrator,
}

impl TestContext {
    /// Default scenario: every collaborator healthy.
    pub fn new() -> Self {
        Scenario::default().build()
    }

    pub const fn deps(&self) -> &CheckoutDeps {
        self.orchestrator.deps()
    }

    pub async fn add_to_cart(&self, product: Product, quantity: u32) -> Cart {
        self.deps().cart.add_to_cart(product, quantity).await.unwrap()
    }

    /// Wait for every follow-up command to be applied or parked.
    pub async fn settle_follow_ups(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.deps().follow_ups.wait_idle())
            .await
            .unwrap();
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// BNB Smart Chain, paying `MERCHANT`, polling fast.
pub fn network() -> NetworkConfig {
    let mut network = NetworkConfig::bsc(WalletAddress::parse(MERCHANT).unwrap()).unwrap();
    network.poll_interval = Duration::from_millis(5);
    network
}

/// An unowned listing priced in USDT.
pub fn domain_listing(keyword: &str, cents: i64) -> Domain {
    let name = DomainName::from_keyword(keyword).unwrap();
    Domain::listing(
        &name,
        Decimal::new(cents, 2),
        Currency::Usdt,
        false,
        Provenance::Live,
    )
}

/// One year, two nameservers, privacy on, no forwarding.
pub fn domain_configuration() -> DomainConfiguration {
    DomainConfiguration {
        years: 1,
        nameservers: vec![
            "ns1.chainmart.io".to_owned(),
            "ns2.chainmart.io".to_owned(),
        ],
        ..DomainConfiguration::default()
    }
}

pub fn shipping_form() -> ShippingForm {
    ShippingForm {
        full_name: "Ada Lovelace".to_owned(),
        email: "ada@example.com".to_owned(),
        phone: "+44 20 7946 0958".to_owned(),
        address: "12 St James's Square".to_owned(),
        city: Some("London".to_owned()),
        country_code: Some("gb".to_owned()),
        zip: "SW1Y 4JH".to_owned(),
    }
}

/// A product the fulfillment service can print.
pub fn printable(id: &str, cents: i64, variant: i64) -> Product {
    Product {
        fulfillment_variant_id: Some(variant),
        ..digital(id, cents)
    }
}

/// A product with no fulfillment variant.
pub fn digital(id: &str, cents: i64) -> Product {
    Product {
        id: ProductId::new(id),
        name: id.to_owned(),
        price: Decimal::new(cents, 2),
        currency: Currency::Usdt,
        image_url: None,
        fulfillment_variant_id: None,
    }
}
