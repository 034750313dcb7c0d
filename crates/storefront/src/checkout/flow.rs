//! A single purchase and the steps that move it forward.

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use chainmart_core::{
    Currency, Domain, FulfillmentOrderId, Order, OrderId, OrderKind, OrderStatus,
    RegistrationRecord, TxHash, WalletAddress,
};

use crate::chain::{PaymentOutcome, PendingPayment, WalletSession};
use crate::fulfillment::FulfillmentOrderRequest;
use crate::registrar::FollowUpCommand;

use super::state::{CheckoutState, FailureReason, StepResult};
use super::validation::{
    DomainConfiguration, DomainPlan, GoodsPlan, ShippingForm, ValidationError, validate_domain,
    validate_goods,
};
use super::{CheckoutConfig, CheckoutDeps, CheckoutError};

static ORDER_SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// Random high bits over a per-process sequence in the low twelve, so ids
/// minted in the same millisecond never collide within one process.
fn order_suffix() -> u32 {
    let sequence = ORDER_SEQUENCE.fetch_add(1, Ordering::Relaxed) & 0xFFF;
    (rand::random::<u32>() & 0x00FF_F000) | sequence
}

/// What is being bought.
#[derive(Debug, Clone)]
pub enum Purchase {
    Domain {
        domain: Domain,
        configuration: DomainConfiguration,
    },
    Goods {
        shipping: ShippingForm,
        currency: Currency,
    },
}

impl Purchase {
    #[must_use]
    pub const fn kind(&self) -> OrderKind {
        match self {
            Self::Domain { .. } => OrderKind::Domain,
            Self::Goods { .. } => OrderKind::Goods,
        }
    }
}

#[derive(Debug, Clone)]
enum Plan {
    Domain(DomainPlan),
    Goods(GoodsPlan),
}

impl Plan {
    fn amount(&self) -> (rust_decimal::Decimal, Currency) {
        match self {
            Self::Domain(plan) => (plan.total, plan.currency),
            Self::Goods(plan) => (plan.total, plan.currency),
        }
    }
}

/// What a finished checkout produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutReceipt {
    pub order: Order,
    /// The newly owned domain, for domain purchases.
    pub domain: Option<Domain>,
    /// Problems that did not stop the purchase.
    pub warnings: Vec<String>,
}

/// One purchase from configuration to receipt.
///
/// Create one per purchase and drive it with
/// [`Orchestrator::run`](super::Orchestrator::run). A finished checkout
/// cannot be restarted.
#[derive(Debug)]
pub struct Checkout {
    purchase: Purchase,
    pub(super) state: CheckoutState,
    pub(super) history: Vec<CheckoutState>,
    pub(super) warnings: Vec<String>,
    session: Option<WalletSession>,
    plan: Option<Plan>,
    tx_hash: Option<TxHash>,
    pending: Option<PendingPayment>,
    order_id: Option<OrderId>,
    created_at: Option<DateTime<Utc>>,
    registration: Option<RegistrationRecord>,
    fulfillment_order_id: Option<FulfillmentOrderId>,
    pub(super) receipt: Option<CheckoutReceipt>,
}

impl Checkout {
    fn new(purchase: Purchase) -> Self {
        Self {
            purchase,
            state: CheckoutState::Idle,
            history: vec![CheckoutState::Idle],
            warnings: Vec::new(),
            session: None,
            plan: None,
            tx_hash: None,
            pending: None,
            order_id: None,
            created_at: None,
            registration: None,
            fulfillment_order_id: None,
            receipt: None,
        }
    }

    /// Buy `domain` with the given options.
    #[must_use]
    pub fn domain(domain: Domain, configuration: DomainConfiguration) -> Self {
        Self::new(Purchase::Domain {
            domain,
            configuration,
        })
    }

    /// Buy the current cart, paying in `currency`.
    #[must_use]
    pub fn goods(shipping: ShippingForm, currency: Currency) -> Self {
        Self::new(Purchase::Goods { shipping, currency })
    }

    #[must_use]
    pub const fn state(&self) -> &CheckoutState {
        &self.state
    }

    /// Every state visited, in order.
    #[must_use]
    pub fn history(&self) -> &[CheckoutState] {
        &self.history
    }

    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    #[must_use]
    pub const fn purchase(&self) -> &Purchase {
        &self.purchase
    }

    #[must_use]
    pub const fn session(&self) -> Option<&WalletSession> {
        self.session.as_ref()
    }

    /// Hash of the submitted payment, once there is one.
    #[must_use]
    pub const fn tx_hash(&self) -> Option<&TxHash> {
        self.tx_hash.as_ref()
    }

    #[must_use]
    pub const fn registration(&self) -> Option<&RegistrationRecord> {
        self.registration.as_ref()
    }

    #[must_use]
    pub const fn receipt(&self) -> Option<&CheckoutReceipt> {
        self.receipt.as_ref()
    }

    /// Replace the domain options.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Locked`] once payment has been requested or
    /// if this is not a domain checkout.
    pub fn configure_domain(
        &mut self,
        configuration: DomainConfiguration,
    ) -> Result<(), CheckoutError> {
        self.ensure_editable()?;
        match &mut self.purchase {
            Purchase::Domain {
                configuration: current,
                ..
            } => {
                *current = configuration;
                Ok(())
            }
            Purchase::Goods { .. } => Err(CheckoutError::Locked),
        }
    }

    /// Replace the shipping details.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Locked`] once payment has been requested or
    /// if this is not a goods checkout.
    pub fn update_shipping(&mut self, shipping: ShippingForm) -> Result<(), CheckoutError> {
        self.ensure_editable()?;
        match &mut self.purchase {
            Purchase::Goods {
                shipping: current, ..
            } => {
                *current = shipping;
                Ok(())
            }
            Purchase::Domain { .. } => Err(CheckoutError::Locked),
        }
    }

    const fn ensure_editable(&self) -> Result<(), CheckoutError> {
        match self.state {
            CheckoutState::Idle | CheckoutState::Configuring => Ok(()),
            _ => Err(CheckoutError::Locked),
        }
    }

    fn buyer(&self) -> Option<WalletAddress> {
        self.session.as_ref().map(|session| session.address.clone())
    }

    // Steps

    /// `Idle`: make sure a wallet is connected.
    pub(super) async fn ensure_wallet(&mut self, deps: &CheckoutDeps) -> StepResult {
        if let Some(session) = deps.gateway.session().await {
            self.session = Some(session);
            return StepResult::Advance;
        }
        match deps.gateway.connect().await {
            Ok(session) => {
                self.session = Some(session);
                StepResult::Advance
            }
            Err(error) => StepResult::HardFail(FailureReason::NoWallet(error.to_string())),
        }
    }

    /// `Configuring`: validate input and freeze the amount due.
    pub(super) async fn validate(&mut self, deps: &CheckoutDeps) -> StepResult {
        let plan = match &self.purchase {
            Purchase::Domain {
                domain,
                configuration,
            } => {
                match deps.orders.domain(&domain.full_name).await {
                    Ok(Some(saved)) if !saved.is_purchasable() => {
                        return StepResult::Invalid(ValidationError::NotPurchasable(
                            domain.full_name.clone(),
                        ));
                    }
                    Ok(_) => {}
                    Err(error) => {
                        return StepResult::HardFail(FailureReason::Unexpected(error.to_string()));
                    }
                }
                validate_domain(domain, configuration).map(Plan::Domain)
            }
            Purchase::Goods { shipping, currency } => {
                let cart = match deps.cart.get_cart().await {
                    Ok(cart) => cart,
                    Err(error) => {
                        return StepResult::HardFail(FailureReason::Unexpected(error.to_string()));
                    }
                };
                validate_goods(&cart, shipping, *currency).map(Plan::Goods)
            }
        };

        match plan {
            Ok(plan) => {
                self.plan = Some(plan);
                StepResult::Advance
            }
            Err(error) => StepResult::Invalid(error),
        }
    }

    /// `AwaitingPayment`: ask the wallet to pay.
    pub(super) async fn submit_payment(&mut self, deps: &CheckoutDeps) -> StepResult {
        let Some(plan) = &self.plan else {
            return StepResult::HardFail(FailureReason::Unexpected(
                "checkout was not validated".to_owned(),
            ));
        };
        let (amount, currency) = plan.amount();

        match deps.gateway.pay(amount, currency).await {
            PaymentOutcome::Submitted(pending) => {
                info!(tx_hash = %pending.tx_hash(), %amount, %currency, "Payment submitted");
                self.tx_hash = Some(pending.tx_hash().clone());
                self.pending = Some(pending);
                StepResult::Advance
            }
            PaymentOutcome::Rejected(error) => {
                warn!(error = %error, "Payment rejected");
                StepResult::HardFail(FailureReason::PaymentRejected(error.to_string()))
            }
        }
    }

    /// `Confirming`: wait for the payment to land, within the timeout.
    pub(super) async fn await_confirmation(&mut self, config: &CheckoutConfig) -> StepResult {
        let Some(pending) = self.pending.take() else {
            return StepResult::HardFail(FailureReason::Unexpected(
                "no payment to confirm".to_owned(),
            ));
        };

        match tokio::time::timeout(config.confirmation_timeout, pending.confirm()).await {
            Ok(Ok(receipt)) => {
                info!(
                    tx_hash = %receipt.tx_hash,
                    block = receipt.block_number,
                    "Payment confirmed"
                );
                StepResult::Advance
            }
            Ok(Err(error)) => {
                error!(error = %error, "Payment confirmation failed");
                StepResult::HardFail(FailureReason::ConfirmationFailed(error.to_string()))
            }
            Err(_) => {
                error!(
                    tx_hash = ?self.tx_hash,
                    timeout_secs = config.confirmation_timeout.as_secs(),
                    "Payment confirmation timed out"
                );
                StepResult::HardFail(FailureReason::ConfirmationTimeout(
                    config.confirmation_timeout.as_secs(),
                ))
            }
        }
    }

    /// `Provisioning`: register the domain or place the fulfillment order.
    #[instrument(skip_all, fields(kind = self.purchase.kind().as_str()))]
    pub(super) async fn provision(&mut self, deps: &CheckoutDeps) -> StepResult {
        let now = Utc::now();
        let order_id = OrderId::from_timestamp(now, order_suffix());
        self.created_at = Some(now);
        self.order_id = Some(order_id.clone());

        match self.plan.clone() {
            Some(Plan::Domain(plan)) => self.register(deps, &plan).await,
            Some(Plan::Goods(plan)) => self.fulfill(deps, &order_id, &plan).await,
            None => StepResult::HardFail(FailureReason::Unexpected(
                "checkout was not validated".to_owned(),
            )),
        }
    }

    async fn register(&mut self, deps: &CheckoutDeps, plan: &DomainPlan) -> StepResult {
        let Purchase::Domain { domain, .. } = &self.purchase else {
            return StepResult::HardFail(FailureReason::Unexpected(
                "domain plan on a goods checkout".to_owned(),
            ));
        };
        let full_name = domain.full_name.clone();

        let registration = match deps.registrar.register_domain(&full_name, plan.years).await {
            Ok(registration) => registration,
            Err(error) => {
                error!(domain = %full_name, error = %error, "Registration failed after payment");
                return StepResult::HardFail(FailureReason::RegistrationFailed(error.to_string()));
            }
        };

        deps.follow_ups.dispatch(FollowUpCommand::SetNameservers {
            domain: full_name.clone(),
            nameservers: plan.nameservers.clone(),
        });
        if let Some(forwarding) = &plan.email_forwarding {
            deps.follow_ups.dispatch(FollowUpCommand::SetEmailForwarding {
                domain: full_name.clone(),
                forwarding: forwarding.clone(),
            });
        }
        deps.follow_ups.dispatch(FollowUpCommand::SetPrivacy {
            domain: full_name.clone(),
            enabled: plan.privacy,
        });

        let synthesized = registration.provenance.is_synthesized();
        self.registration = Some(registration);
        if synthesized {
            StepResult::SoftFail(format!(
                "Registration of {full_name} is pending verification with the registrar"
            ))
        } else {
            StepResult::Advance
        }
    }

    async fn fulfill(
        &mut self,
        deps: &CheckoutDeps,
        order_id: &OrderId,
        plan: &GoodsPlan,
    ) -> StepResult {
        let Some(request) = FulfillmentOrderRequest::for_items(order_id, &plan.shipping, &plan.items)
        else {
            debug!(order_id = %order_id, "No fulfillment-eligible items");
            return StepResult::Advance;
        };

        match deps.fulfillment.create_order(&request).await {
            Ok(id) => {
                info!(order_id = %order_id, fulfillment_order_id = %id, "Fulfillment order placed");
                self.fulfillment_order_id = Some(id);
                StepResult::Advance
            }
            Err(error) => {
                warn!(order_id = %order_id, error = %error, "Fulfillment order failed");
                StepResult::SoftFail(format!("Fulfillment order could not be placed: {error}"))
            }
        }
    }

    /// `Persisting`: write the order remotely, then locally.
    #[instrument(skip_all, fields(order_id = ?self.order_id))]
    pub(super) async fn persist(&mut self, deps: &CheckoutDeps, config: &CheckoutConfig) -> StepResult {
        let (order, domain) = match self.build_records(config) {
            Ok(records) => records,
            Err(reason) => return StepResult::HardFail(reason),
        };
        let mut warnings = Vec::new();

        if deps.remote.is_enabled() {
            if let Err(error) = deps.remote.insert_order(&order).await {
                warn!(error = %error, "Remote order write failed");
                warnings.push(format!("Order was saved on this device only: {error}"));
            }
            if let Some(domain) = &domain
                && let Err(error) = deps.remote.upsert_domain(domain).await
            {
                warn!(domain = %domain.full_name, error = %error, "Remote domain write failed");
                warnings.push(format!("Domain was saved on this device only: {error}"));
            }
        }

        if let Err(error) = deps.orders.record_order(order.clone()).await {
            error!(error = %error, "Local order write failed");
            return StepResult::HardFail(FailureReason::PersistenceFailed(error.to_string()));
        }
        if let Some(domain) = &domain
            && let Err(error) = deps.orders.save_domain(domain.clone()).await
        {
            error!(domain = %domain.full_name, error = %error, "Local domain write failed");
            return StepResult::HardFail(FailureReason::PersistenceFailed(error.to_string()));
        }

        if order.kind == OrderKind::Goods
            && let Err(error) = deps.cart.clear_cart().await
        {
            warn!(error = %error, "Cart could not be cleared");
            warnings.push(format!("Cart could not be cleared: {error}"));
        }

        info!(
            order_id = %order.id,
            invoice = %order.invoice_number,
            total = %order.total,
            currency = %order.currency,
            "Order recorded"
        );
        self.receipt = Some(CheckoutReceipt {
            order,
            domain,
            warnings: Vec::new(),
        });

        if warnings.is_empty() {
            StepResult::Advance
        } else {
            StepResult::SoftFail(warnings.join("; "))
        }
    }

    fn build_records(
        &self,
        config: &CheckoutConfig,
    ) -> Result<(Order, Option<Domain>), FailureReason> {
        let missing = |what: &str| FailureReason::Unexpected(format!("missing {what}"));
        let buyer = self.buyer().ok_or_else(|| missing("wallet session"))?;
        let tx_hash = self.tx_hash.clone().ok_or_else(|| missing("transaction hash"))?;
        let id = self.order_id.clone().ok_or_else(|| missing("order id"))?;
        let created_at = self.created_at.ok_or_else(|| missing("order timestamp"))?;
        let plan = self.plan.as_ref().ok_or_else(|| missing("checkout plan"))?;
        let (total, currency) = plan.amount();

        let mut order = Order {
            id,
            kind: self.purchase.kind(),
            buyer: buyer.clone(),
            total,
            currency,
            items: Vec::new(),
            created_at,
            tx_hash,
            status: OrderStatus::Processing,
            shipping: None,
            invoice_number: Order::invoice_number(created_at, rand::random()),
            estimated_delivery: None,
            domain: None,
            registration: None,
            fulfillment_order_id: None,
        };

        let owned = match (plan, &self.purchase) {
            (Plan::Domain(plan), Purchase::Domain { domain, .. }) => {
                let registration = self
                    .registration
                    .clone()
                    .ok_or_else(|| missing("registration"))?;
                let mut owned = domain.clone();
                owned
                    .assign_owner(buyer, created_at, plan.years)
                    .map_err(|error| FailureReason::Unexpected(error.to_string()))?;
                owned.nameservers.clone_from(&plan.nameservers);
                owned.email_forwarding.clone_from(&plan.email_forwarding);
                owned.privacy = plan.privacy;
                owned.auto_renew = plan.auto_renew;
                owned.provenance = registration.provenance;

                order.domain = Some(owned.full_name.clone());
                order.registration = Some(registration);
                Some(owned)
            }
            (Plan::Goods(plan), Purchase::Goods { .. }) => {
                order.items.clone_from(&plan.items);
                order.shipping = Some(plan.shipping.clone());
                order.fulfillment_order_id.clone_from(&self.fulfillment_order_id);
                order.estimated_delivery = TimeDelta::from_std(config.delivery_estimate)
                    .ok()
                    .and_then(|estimate| created_at.checked_add_signed(estimate));
                None
            }
            _ => return Err(FailureReason::Unexpected("plan does not match purchase".to_owned())),
        };

        Ok((order, owned))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chainmart_core::{DomainName, Provenance};
    use rust_decimal::Decimal;

    use super::*;

    fn domain_checkout() -> Checkout {
        let name = DomainName::from_keyword("example.io").unwrap();
        Checkout::domain(
            Domain::listing(&name, Decimal::new(3999, 2), Currency::Usdt, true, Provenance::Live),
            DomainConfiguration::default(),
        )
    }

    #[test]
    fn test_order_suffixes_are_distinct_within_process() {
        let mut suffixes: Vec<u32> = (0..1024).map(|_| order_suffix() & 0xFFF).collect();
        suffixes.sort_unstable();
        suffixes.dedup();
        assert_eq!(suffixes.len(), 1024);
    }

    #[test]
    fn test_new_checkout_is_idle() {
        let checkout = domain_checkout();
        assert_eq!(checkout.state(), &CheckoutState::Idle);
        assert_eq!(checkout.history(), [CheckoutState::Idle]);
        assert!(checkout.tx_hash().is_none());
        assert_eq!(checkout.purchase().kind(), OrderKind::Domain);
    }

    #[test]
    fn test_configuration_locked_after_payment_requested() {
        let mut checkout = domain_checkout();
        checkout.state = CheckoutState::Configuring;
        assert!(
            checkout
                .configure_domain(DomainConfiguration {
                    years: 2,
                    ..DomainConfiguration::default()
                })
                .is_ok()
        );

        checkout.state = CheckoutState::AwaitingPayment;
        assert!(matches!(
            checkout.configure_domain(DomainConfiguration::default()),
            Err(CheckoutError::Locked)
        ));
    }

    #[test]
    fn test_shipping_on_domain_checkout_is_rejected() {
        let mut checkout = domain_checkout();
        assert!(matches!(
            checkout.update_shipping(ShippingForm::default()),
            Err(CheckoutError::Locked)
        ));
    }
}
