//! Checkout input validation.
//!
//! Runs in the `Configuring` state, before any payment is requested. A
//! failure leaves the checkout in `Configuring` so the buyer can correct
//! the input and run it again.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use chainmart_core::{
    Cart, CartItem, Currency, Domain, Email, EmailError, EmailForwarding, ShippingInfo,
};

/// Nameservers a domain must be configured with.
pub const MIN_NAMESERVERS: usize = 2;

/// Alias used when forwarding is enabled without one.
pub const DEFAULT_FORWARDING_ALIAS: &str = "info";

/// Input the buyer has to fix.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("At least {MIN_NAMESERVERS} nameservers are required")]
    MissingNameservers,

    #[error("Invalid forwarding email: {0}")]
    InvalidForwardingEmail(EmailError),

    #[error("Invalid email: {0}")]
    InvalidEmail(EmailError),

    #[error("Registration must be for at least one year")]
    InvalidYears,

    #[error("{0} is not available for purchase")]
    NotPurchasable(String),

    #[error("Your cart is empty")]
    EmptyCart,

    #[error("{product} is priced in {found}, but this checkout pays in {expected}")]
    CurrencyMismatch {
        product: String,
        expected: Currency,
        found: Currency,
    },
}

/// Email forwarding as entered by the buyer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingForm {
    /// Local part on the new domain; defaults to `info`.
    #[serde(default)]
    pub alias: String,
    pub target: String,
}

/// Domain options chosen before payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfiguration {
    pub years: u32,
    pub nameservers: Vec<String>,
    /// `Some` when forwarding is enabled.
    pub email_forwarding: Option<ForwardingForm>,
    pub privacy: bool,
    pub auto_renew: bool,
}

impl Default for DomainConfiguration {
    fn default() -> Self {
        Self {
            years: 1,
            nameservers: Vec::new(),
            email_forwarding: None,
            privacy: true,
            auto_renew: false,
        }
    }
}

/// Validated domain options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainPlan {
    pub years: u32,
    pub nameservers: Vec<String>,
    pub email_forwarding: Option<EmailForwarding>,
    pub privacy: bool,
    pub auto_renew: bool,
    /// Unit price × years.
    pub total: Decimal,
    pub currency: Currency,
}

/// Shipping details as entered by the buyer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingForm {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    pub zip: String,
}

/// Validated goods checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoodsPlan {
    /// Copy of the cart lines at validation time.
    pub items: Vec<CartItem>,
    pub shipping: ShippingInfo,
    pub total: Decimal,
    pub currency: Currency,
}

/// Check the domain options.
///
/// # Errors
///
/// Returns the first problem found.
pub fn validate_domain(
    domain: &Domain,
    configuration: &DomainConfiguration,
) -> Result<DomainPlan, ValidationError> {
    if !domain.is_purchasable() {
        return Err(ValidationError::NotPurchasable(domain.full_name.clone()));
    }
    if configuration.years == 0 {
        return Err(ValidationError::InvalidYears);
    }

    let nameservers: Vec<String> = configuration
        .nameservers
        .iter()
        .map(|ns| ns.trim().trim_end_matches('.').to_ascii_lowercase())
        .filter(|ns| !ns.is_empty())
        .collect();
    if nameservers.len() < MIN_NAMESERVERS {
        return Err(ValidationError::MissingNameservers);
    }

    let email_forwarding = configuration
        .email_forwarding
        .as_ref()
        .map(|form| {
            let target =
                Email::parse(&form.target).map_err(ValidationError::InvalidForwardingEmail)?;
            let alias = form.alias.trim().to_ascii_lowercase();
            Ok(EmailForwarding {
                alias: if alias.is_empty() {
                    DEFAULT_FORWARDING_ALIAS.to_owned()
                } else {
                    alias
                },
                target,
            })
        })
        .transpose()?;

    Ok(DomainPlan {
        years: configuration.years,
        nameservers,
        email_forwarding,
        privacy: configuration.privacy,
        auto_renew: configuration.auto_renew,
        total: domain.price * Decimal::from(configuration.years),
        currency: domain.currency,
    })
}

/// Check the shipping form and snapshot the cart.
///
/// # Errors
///
/// Returns the first problem found.
pub fn validate_goods(
    cart: &Cart,
    form: &ShippingForm,
    currency: Currency,
) -> Result<GoodsPlan, ValidationError> {
    let required = [
        ("Full name", &form.full_name),
        ("Email", &form.email),
        ("Phone", &form.phone),
        ("Address", &form.address),
        ("ZIP code", &form.zip),
    ];
    if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
        return Err(ValidationError::MissingField(field));
    }
    let email = Email::parse(&form.email).map_err(ValidationError::InvalidEmail)?;

    if cart.is_empty() {
        return Err(ValidationError::EmptyCart);
    }
    if let Some(item) = cart
        .items()
        .iter()
        .find(|item| item.product.currency != currency)
    {
        return Err(ValidationError::CurrencyMismatch {
            product: item.product.name.clone(),
            expected: currency,
            found: item.product.currency,
        });
    }

    Ok(GoodsPlan {
        items: cart.items().to_vec(),
        shipping: ShippingInfo {
            full_name: form.full_name.trim().to_owned(),
            email,
            phone: form.phone.trim().to_owned(),
            address: form.address.trim().to_owned(),
            city: non_empty(form.city.as_deref()),
            country_code: non_empty(form.country_code.as_deref())
                .map(|code| code.to_ascii_uppercase()),
            zip: form.zip.trim().to_owned(),
        },
        total: cart.total(),
        currency,
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chainmart_core::{DomainName, Product, ProductId, Provenance, WalletAddress};

    use super::*;

    fn domain() -> Domain {
        let name = DomainName::from_keyword("example.io").unwrap();
        Domain::listing(
            &name,
            Decimal::new(3999, 2),
            Currency::Usdt,
            true,
            Provenance::Live,
        )
    }

    fn configuration() -> DomainConfiguration {
        DomainConfiguration {
            nameservers: vec!["NS1.Host.net.".to_owned(), "ns2.host.net".to_owned()],
            ..DomainConfiguration::default()
        }
    }

    fn shipping() -> ShippingForm {
        ShippingForm {
            full_name: "Ada Lovelace".to_owned(),
            email: "ada@example.com".to_owned(),
            phone: "+44 20 7946 0000".to_owned(),
            address: "12 Analytical Row".to_owned(),
            city: Some("  ".to_owned()),
            country_code: Some("gb".to_owned()),
            zip: "N1 9GU".to_owned(),
        }
    }

    fn cart() -> Cart {
        let mut cart = Cart::new();
        cart.add(
            Product {
                id: ProductId::new("tee"),
                name: "Tee".to_owned(),
                price: Decimal::new(2500, 2),
                currency: Currency::Usdt,
                image_url: None,
                fulfillment_variant_id: Some(4011),
            },
            2,
        )
        .unwrap();
        cart
    }

    #[test]
    fn test_domain_plan_total_and_nameservers() {
        let plan = validate_domain(
            &domain(),
            &DomainConfiguration {
                years: 2,
                ..configuration()
            },
        )
        .unwrap();
        assert_eq!(plan.total, Decimal::new(7998, 2));
        assert_eq!(plan.nameservers, ["ns1.host.net", "ns2.host.net"]);
        assert!(plan.email_forwarding.is_none());
    }

    #[test]
    fn test_domain_needs_two_nameservers() {
        let config = DomainConfiguration {
            nameservers: vec!["ns1.host.net".to_owned(), "   ".to_owned()],
            ..configuration()
        };
        assert_eq!(
            validate_domain(&domain(), &config),
            Err(ValidationError::MissingNameservers)
        );
    }

    #[test]
    fn test_domain_zero_years() {
        let config = DomainConfiguration {
            years: 0,
            ..configuration()
        };
        assert_eq!(
            validate_domain(&domain(), &config),
            Err(ValidationError::InvalidYears)
        );
    }

    #[test]
    fn test_forwarding_email_must_be_valid() {
        let config = DomainConfiguration {
            email_forwarding: Some(ForwardingForm {
                alias: String::new(),
                target: "not-an-email".to_owned(),
            }),
            ..configuration()
        };
        assert_eq!(
            validate_domain(&domain(), &config),
            Err(ValidationError::InvalidForwardingEmail(
                EmailError::MissingAtSymbol
            ))
        );
    }

    #[test]
    fn test_forwarding_alias_defaults() {
        let config = DomainConfiguration {
            email_forwarding: Some(ForwardingForm {
                alias: String::new(),
                target: "me@mail.net".to_owned(),
            }),
            ..configuration()
        };
        let plan = validate_domain(&domain(), &config).unwrap();
        assert_eq!(plan.email_forwarding.unwrap().alias, "info");
    }

    #[test]
    fn test_owned_domain_not_purchasable() {
        let mut owned = domain();
        owned
            .assign_owner(
                WalletAddress::parse("0x52908400098527886e0f7030069857d2e4169ee7").unwrap(),
                chrono::Utc::now(),
                1,
            )
            .unwrap();
        assert_eq!(
            validate_domain(&owned, &configuration()),
            Err(ValidationError::NotPurchasable("example.io".to_owned()))
        );
    }

    #[test]
    fn test_goods_plan_snapshots_cart() {
        let plan = validate_goods(&cart(), &shipping(), Currency::Usdt).unwrap();
        assert_eq!(plan.total, Decimal::new(5000, 2));
        assert_eq!(plan.items.len(), 1);
        assert_eq!(plan.shipping.city, None);
        assert_eq!(plan.shipping.country_code.as_deref(), Some("GB"));
    }

    #[test]
    fn test_goods_missing_field() {
        let form = ShippingForm {
            phone: " ".to_owned(),
            ..shipping()
        };
        assert_eq!(
            validate_goods(&cart(), &form, Currency::Usdt),
            Err(ValidationError::MissingField("Phone"))
        );
    }

    #[test]
    fn test_goods_empty_cart() {
        assert_eq!(
            validate_goods(&Cart::new(), &shipping(), Currency::Usdt),
            Err(ValidationError::EmptyCart)
        );
    }

    #[test]
    fn test_goods_currency_mismatch() {
        assert!(matches!(
            validate_goods(&cart(), &shipping(), Currency::Bnb),
            Err(ValidationError::CurrencyMismatch { .. })
        ));
    }
}
