//! Registrar command client.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use chainmart_core::{
    Currency, Domain, DomainName, EmailForwarding, Provenance, RegistrationId, RegistrationRecord,
};

use super::policy::{DegradedModePolicy, fallback_candidates};
use super::transport::RegistrarTransport;
use super::wire::CommandResponse;
use super::RegistrarError;

/// Prefix of locally synthesized registration ids.
pub const LOCAL_REGISTRATION_PREFIX: &str = "LOCAL-";

/// `Status` value of a search result that can be registered.
const STATUS_AVAILABLE: &str = "available";

/// Registrar commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Search,
    Register,
    SetNameservers,
    SetEmailForwarding,
    SetPrivacy,
}

impl Command {
    /// Wire name passed as the `command` parameter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Register => "register",
            Self::SetNameservers => "set_ns",
            Self::SetEmailForwarding => "set_email_forward",
            Self::SetPrivacy => "set_privacy",
        }
    }
}

/// Domains returned for one search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResults {
    /// Normalized full name that was searched (empty for unusable input).
    pub query: String,
    pub domains: Vec<Domain>,
    /// `Synthesized` when the registrar did not answer and the results are
    /// fallback candidates.
    pub provenance: Provenance,
}

impl SearchResults {
    fn empty(query: String) -> Self {
        Self {
            query,
            domains: Vec::new(),
            provenance: Provenance::Live,
        }
    }
}

/// Client for the domain registrar.
///
/// Cheap to clone; clones share the transport and search cache.
#[derive(Clone)]
pub struct RegistrarClient {
    inner: Arc<RegistrarClientInner>,
}

struct RegistrarClientInner {
    transport: Arc<dyn RegistrarTransport>,
    policy: DegradedModePolicy,
    search_cache: Cache<String, SearchResults>,
}

impl RegistrarClient {
    /// Create a client over `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn RegistrarTransport>, policy: DegradedModePolicy) -> Self {
        let search_cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Self {
            inner: Arc::new(RegistrarClientInner {
                transport,
                policy,
                search_cache,
            }),
        }
    }

    #[must_use]
    pub fn policy(&self) -> DegradedModePolicy {
        self.inner.policy
    }

    /// Send one command. Never fails: transport errors, unparseable bodies
    /// and non-OK response codes all come back with `success == false`.
    #[instrument(skip_all, fields(command = command.as_str()))]
    pub async fn send(&self, command: Command, params: &[(&str, String)]) -> CommandResponse {
        let mut query = Vec::with_capacity(params.len() + 1);
        query.push(("command".to_owned(), command.as_str().to_owned()));
        query.extend(
            params
                .iter()
                .map(|(key, value)| ((*key).to_owned(), value.clone())),
        );

        let response = match self.inner.transport.get(&query).await {
            Ok(raw) => CommandResponse::parse(raw),
            Err(e) => CommandResponse::failed(e.to_string(), String::new()),
        };

        if response.success {
            debug!("Registrar command succeeded");
        } else {
            debug!(
                error = response.error.as_deref().unwrap_or_default(),
                "Registrar command failed"
            );
        }
        response
    }

    /// Search for registrable domains matching `keyword`.
    ///
    /// Keeps only results the registrar reports as available. When the
    /// registrar fails or nothing usable comes back and the policy allows,
    /// returns [`fallback_candidates`] instead. A keyword with no usable
    /// name returns an empty result.
    #[instrument(skip(self))]
    pub async fn search(&self, keyword: &str) -> SearchResults {
        let Some(name) = DomainName::from_keyword(keyword) else {
            return SearchResults::empty(String::new());
        };
        let query = name.full_name();

        if let Some(cached) = self.inner.search_cache.get(&query).await {
            debug!(query = %query, "Search cache hit");
            return cached;
        }

        let mut params = vec![("domain0", query.clone())];
        let alternative = name.with_tld(super::policy::PREMIUM_TLD);
        if alternative != name {
            params.push(("domain1", alternative.full_name()));
        }
        params.push(("show_price", "1".to_owned()));

        let response = self.send(Command::Search, &params).await;
        let domains: Vec<Domain> = if response.success {
            response
                .list("SearchResults")
                .iter()
                .filter_map(parse_search_result)
                .collect()
        } else {
            Vec::new()
        };

        if !domains.is_empty() {
            let results = SearchResults {
                query: query.clone(),
                domains,
                provenance: Provenance::Live,
            };
            self.inner.search_cache.insert(query, results.clone()).await;
            return results;
        }

        if !self.inner.policy.fallback_search {
            return SearchResults::empty(query);
        }

        warn!(
            query = %query,
            error = response.error.as_deref().unwrap_or("no available results"),
            "Registrar search unusable, returning fallback candidates"
        );
        SearchResults {
            query,
            domains: fallback_candidates(&name),
            provenance: Provenance::Synthesized,
        }
    }

    /// Whether `full_name` can be registered.
    ///
    /// With `fail_open_availability` any failure to get an answer counts as
    /// available; otherwise it counts as unavailable.
    #[instrument(skip(self))]
    pub async fn check_domain(&self, full_name: &str) -> bool {
        let response = self
            .send(Command::Search, &[("domain0", full_name.to_owned())])
            .await;

        let status = response.success.then(|| {
            response.list("SearchResults").iter().find_map(|entry| {
                let name = entry.get("DomainName")?.as_str()?;
                name.eq_ignore_ascii_case(full_name)
                    .then(|| entry.get("Status").and_then(Value::as_str))
                    .flatten()
            })
        });

        match status.flatten() {
            Some(status) => status.eq_ignore_ascii_case(STATUS_AVAILABLE),
            None => {
                let fail_open = self.inner.policy.fail_open_availability;
                warn!(
                    domain = %full_name,
                    fail_open,
                    error = response.error.as_deref().unwrap_or("no status for domain"),
                    "Availability check inconclusive"
                );
                fail_open
            }
        }
    }

    /// Register `full_name` for `years`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrarError::Rejected`] when registration fails and the
    /// policy does not allow a synthesized registration.
    #[instrument(skip(self))]
    pub async fn register_domain(
        &self,
        full_name: &str,
        years: u32,
    ) -> Result<RegistrationRecord, RegistrarError> {
        let response = self
            .send(
                Command::Register,
                &[
                    ("domain", full_name.to_owned()),
                    ("duration", years.to_string()),
                ],
            )
            .await;

        if response.success {
            let id = response
                .field("RegistrationId")
                .or_else(|| response.field("OrderId"))
                .unwrap_or(full_name);
            info!(domain = %full_name, registration_id = %id, "Domain registered");
            return Ok(RegistrationRecord {
                id: RegistrationId::new(id),
                provenance: Provenance::Live,
            });
        }

        let message = response
            .error
            .unwrap_or_else(|| "registration failed".to_owned());
        if !self.inner.policy.synthesize_registration {
            return Err(RegistrarError::Rejected {
                command: Command::Register.as_str(),
                message,
            });
        }

        let id = format!("{LOCAL_REGISTRATION_PREFIX}{}", Uuid::new_v4());
        warn!(
            domain = %full_name,
            registration_id = %id,
            error = %message,
            "Registration failed, continuing with a synthesized registration id"
        );
        Ok(RegistrationRecord {
            id: RegistrationId::new(id),
            provenance: Provenance::Synthesized,
        })
    }

    /// Point `full_name` at `nameservers`.
    pub async fn set_nameservers(&self, full_name: &str, nameservers: &[String]) -> CommandResponse {
        let mut params = vec![("domain", full_name.to_owned())];
        let keys = ["ns0", "ns1", "ns2", "ns3", "ns4", "ns5", "ns6", "ns7", "ns8", "ns9"];
        params.extend(keys.iter().copied().zip(nameservers.iter().cloned()));
        self.send(Command::SetNameservers, &params).await
    }

    /// Forward `alias@full_name` to the forwarding target.
    pub async fn set_email_forwarding(
        &self,
        full_name: &str,
        forwarding: &EmailForwarding,
    ) -> CommandResponse {
        self.send(
            Command::SetEmailForwarding,
            &[
                ("domain", full_name.to_owned()),
                ("forward_type", "forward".to_owned()),
                ("username0", forwarding.alias.clone()),
                ("exist_email0", forwarding.target.to_string()),
            ],
        )
        .await
    }

    /// Turn WHOIS privacy on or off.
    pub async fn set_privacy(&self, full_name: &str, enabled: bool) -> CommandResponse {
        let option = if enabled { "full" } else { "off" };
        self.send(
            Command::SetPrivacy,
            &[
                ("domain", full_name.to_owned()),
                ("option", option.to_owned()),
            ],
        )
        .await
    }
}

/// Turn one search entry into a listing if it is available and priced.
fn parse_search_result(entry: &Value) -> Option<Domain> {
    let status = entry.get("Status")?.as_str()?;
    if !status.eq_ignore_ascii_case(STATUS_AVAILABLE) {
        return None;
    }

    let raw_name = entry.get("DomainName").and_then(Value::as_str);
    let Some(name) = raw_name.and_then(DomainName::from_keyword) else {
        debug!(domain = ?raw_name, "Skipping available search result without a usable name");
        return None;
    };
    let Some(price) = entry.get("Price").and_then(parse_price) else {
        debug!(
            domain = %name.full_name(),
            price = ?entry.get("Price"),
            "Skipping available search result without a usable price"
        );
        return None;
    };
    let premium = entry
        .get("Premium")
        .and_then(Value::as_str)
        .is_some_and(|flag| flag.eq_ignore_ascii_case("yes"));

    Some(Domain::listing(
        &name,
        price,
        Currency::Usdt,
        premium,
        Provenance::Live,
    ))
}

/// Prices arrive as `"12.99"`, `"12.99 in USD"` or a bare number.
fn parse_price(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    let amount: Decimal = text.split_whitespace().next()?.parse().ok()?;
    (amount > Decimal::ZERO).then_some(amount)
}
