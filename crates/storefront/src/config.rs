//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `REGISTRAR_API_URL` - Upstream registrar command endpoint
//! - `REGISTRAR_API_KEY` - Registrar credential (injected by the proxy, high entropy)
//! - `FULFILLMENT_API_TOKEN` - Fulfillment service bearer token (high entropy)
//! - `MERCHANT_ADDRESS` - Wallet that receives every payment
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STOREFRONT_BASE_URL` - Public URL (default: `http://{host}:{port}`)
//! - `FULFILLMENT_API_URL` - Fulfillment service (default: <https://api.printful.com>)
//! - `DATABASE_URL` - `PostgreSQL` connection string; unset disables remote persistence
//! - `CHAIN_ID` - Chain payments are made on (default: 56)
//! - `CHAIN_RPC_URL` - Wallet JSON-RPC endpoint (default: BSC public dataseed)
//! - `PAYMENT_TOKEN_ADDRESS` - Token contract for USDT payments (default: BSC USDT)
//! - `CONFIRMATION_TIMEOUT_SECS` - Payment confirmation bound (default: 600)
//! - `STOREFRONT_DATA_DIR` - Local cart/order storage (default: ./data)
//! - `REGISTRAR_DEGRADED_MODE` - `lenient` (default) or `strict`
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use chainmart_core::WalletAddress;

use crate::chain::{DEFAULT_CHAIN_ID, DEFAULT_TOKEN_CONTRACT, NetworkConfig};
use crate::checkout::{CheckoutConfig, ClientSettings};
use crate::registrar::{DegradedModePolicy, FollowUpConfig};

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_FULFILLMENT_API_URL: &str = "https://api.printful.com";
const DEFAULT_CHAIN_RPC_URL: &str = "https://bsc-dataseed.binance.org";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    pub registrar: RegistrarConfig,
    pub fulfillment: FulfillmentConfig,
    /// `PostgreSQL` URL; `None` disables remote persistence
    pub database_url: Option<SecretString>,
    pub chain: ChainConfig,
    pub confirmation_timeout: Duration,
    /// Directory for the local cart/order store
    pub data_dir: PathBuf,
    pub degraded_mode: DegradedModePolicy,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
}

/// Upstream registrar the proxy forwards to.
///
/// Implements `Debug` manually to redact the credential.
#[derive(Clone)]
pub struct RegistrarConfig {
    pub api_url: String,
    pub api_key: SecretString,
}

impl std::fmt::Debug for RegistrarConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrarConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Upstream fulfillment service the proxy forwards to.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct FulfillmentConfig {
    pub api_url: String,
    pub api_token: SecretString,
}

impl std::fmt::Debug for FulfillmentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FulfillmentConfig")
            .field("api_url", &self.api_url)
            .field("api_token", &"[REDACTED]")
            .finish()
    }
}

/// Chain payments are made on.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub rpc_url: String,
    pub token_contract: WalletAddress,
    pub merchant: WalletAddress,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host: IpAddr = parse_env_or_default("STOREFRONT_HOST", "127.0.0.1")?;
        let port: u16 = parse_env_or_default("STOREFRONT_PORT", "3000")?;
        let base_url = match get_optional_env("STOREFRONT_BASE_URL") {
            Some(url) => validate_url("STOREFRONT_BASE_URL", &url)?,
            None => format!("http://{}", SocketAddr::new(host, port)),
        };

        let registrar = RegistrarConfig {
            api_url: validate_url("REGISTRAR_API_URL", &get_required_env("REGISTRAR_API_URL")?)?,
            api_key: get_validated_secret("REGISTRAR_API_KEY")?,
        };
        let fulfillment = FulfillmentConfig {
            api_url: validate_url(
                "FULFILLMENT_API_URL",
                &get_env_or_default("FULFILLMENT_API_URL", DEFAULT_FULFILLMENT_API_URL),
            )?,
            api_token: get_validated_secret("FULFILLMENT_API_TOKEN")?,
        };
        let chain = ChainConfig::from_env()?;

        let timeout_secs: u64 = parse_env_or_default("CONFIRMATION_TIMEOUT_SECS", "600")?;

        Ok(Self {
            host,
            port,
            base_url,
            registrar,
            fulfillment,
            database_url: get_optional_env("DATABASE_URL").map(SecretString::from),
            chain,
            confirmation_timeout: Duration::from_secs(timeout_secs),
            data_dir: PathBuf::from(get_env_or_default("STOREFRONT_DATA_DIR", "./data")),
            degraded_mode: parse_env_or_default("REGISTRAR_DEGRADED_MODE", "lenient")?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether orders are mirrored to Postgres.
    #[must_use]
    pub const fn remote_persistence_enabled(&self) -> bool {
        self.database_url.is_some()
    }

    /// Chain parameters for the payment gateway.
    #[must_use]
    pub fn network(&self) -> NetworkConfig {
        NetworkConfig {
            chain_id: self.chain.chain_id,
            token_contract: self.chain.token_contract.clone(),
            merchant: self.chain.merchant.clone(),
            required_confirmations: 1,
            poll_interval: Duration::from_secs(3),
        }
    }

    #[must_use]
    pub fn checkout_config(&self) -> CheckoutConfig {
        CheckoutConfig {
            confirmation_timeout: self.confirmation_timeout,
            ..CheckoutConfig::default()
        }
    }

    /// Settings for a checkout client talking to this storefront.
    #[must_use]
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            storefront_url: self.base_url.clone(),
            wallet_rpc_url: self.chain.rpc_url.clone(),
            network: self.network(),
            data_dir: self.data_dir.clone(),
            policy: self.degraded_mode,
            follow_ups: FollowUpConfig::default(),
            remote_persistence: self.remote_persistence_enabled(),
        }
    }
}

impl ChainConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            chain_id: parse_env_or_default("CHAIN_ID", &DEFAULT_CHAIN_ID.to_string())?,
            rpc_url: validate_url(
                "CHAIN_RPC_URL",
                &get_env_or_default("CHAIN_RPC_URL", DEFAULT_CHAIN_RPC_URL),
            )?,
            token_contract: parse_address(
                "PAYMENT_TOKEN_ADDRESS",
                &get_env_or_default("PAYMENT_TOKEN_ADDRESS", DEFAULT_TOKEN_CONTRACT),
            )?,
            merchant: parse_address("MERCHANT_ADDRESS", &get_required_env("MERCHANT_ADDRESS")?)?,
        })
    }
}

#[cfg(test)]
impl StorefrontConfig {
    /// A complete configuration for unit tests.
    #[allow(clippy::unwrap_used)]
    pub(crate) fn for_tests() -> Self {
        let address = |last: char| {
            WalletAddress::parse(&format!("0x{}", last.to_string().repeat(40))).unwrap()
        };

        Self {
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: "http://127.0.0.1:3000".to_string(),
            registrar: RegistrarConfig {
                api_url: "https://registrar.test/api".to_string(),
                api_key: SecretString::from("rk_9fQ2xL7pWm4Zt8Vb"),
            },
            fulfillment: FulfillmentConfig {
                api_url: DEFAULT_FULFILLMENT_API_URL.to_string(),
                api_token: SecretString::from("ft_Hq3Jk8Ls2Np5Rt7W"),
            },
            database_url: None,
            chain: ChainConfig {
                chain_id: 56,
                rpc_url: DEFAULT_CHAIN_RPC_URL.to_string(),
                token_contract: address('5'),
                merchant: address('a'),
            },
            confirmation_timeout: Duration::from_secs(120),
            data_dir: PathBuf::from("./data"),
            degraded_mode: DegradedModePolicy::strict(),
            sentry_dsn: None,
            sentry_environment: None,
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable, falling back to `default`.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Require an absolute http(s) URL. Returned without a trailing slash.
fn validate_url(key: &str, value: &str) -> Result<String, ConfigError> {
    let url = url::Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(value.trim_end_matches('/').to_string())
}

fn parse_address(key: &str, value: &str) -> Result<WalletAddress, ConfigError> {
    WalletAddress::parse(value).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    // API keys and tokens are random; low entropy means a hand-typed value
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the credential issued by the provider."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn address(last: char) -> WalletAddress {
        WalletAddress::parse(&format!("0x{}", last.to_string().repeat(40))).unwrap()
    }

    fn config() -> StorefrontConfig {
        StorefrontConfig::for_tests()
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        // All same character = 0 entropy
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        // "ab" has entropy of 1 bit per char (50% a, 50% b)
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let err = validate_secret_strength("your-api-key-here", "REGISTRAR_API_KEY").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let err =
            validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        assert!(validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR").is_ok());
    }

    #[test]
    fn test_parse_address_reports_variable() {
        let err = parse_address("MERCHANT_ADDRESS", "0x1234").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref key, _) if key == "MERCHANT_ADDRESS"));
    }

    #[test]
    fn test_validate_url() {
        assert_eq!(
            validate_url("REGISTRAR_API_URL", "https://registrar.test/api/").unwrap(),
            "https://registrar.test/api"
        );
        assert!(validate_url("REGISTRAR_API_URL", "registrar.test").is_err());
        assert!(validate_url("CHAIN_RPC_URL", "ftp://node.test").is_err());
    }

    #[test]
    fn test_socket_addr() {
        let addr = config().socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_client_settings_follow_config() {
        let config = config();
        let settings = config.client_settings();
        assert_eq!(settings.storefront_url, "http://127.0.0.1:3000");
        assert_eq!(settings.network.merchant, address('a'));
        assert_eq!(settings.policy, DegradedModePolicy::strict());
        assert!(!settings.remote_persistence);
        assert_eq!(
            config.checkout_config().confirmation_timeout,
            Duration::from_secs(120)
        );
    }

    #[test]
    fn test_config_debug_redacts_secrets() {
        let debug_output = format!("{:?}", config());

        assert!(debug_output.contains("https://registrar.test/api"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("rk_9fQ2xL7pWm4Zt8Vb"));
        assert!(!debug_output.contains("ft_Hq3Jk8Ls2Np5Rt7W"));
    }
}
