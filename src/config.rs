use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "USD";
const DEFAULT_GATEWAY_VERSION: &str = "2.1.0";
const DEFAULT_GATEWAY_COMMAND: &str = "pay";
const DEFAULT_GATEWAY_LOCALE: &str = "en";
const DEV_DEFAULT_GATEWAY_SECRET: &str =
    "development_gateway_secret_do_not_use_in_production_0123456789";

/// Payment gateway connection settings.
///
/// `secret_key` is the shared HMAC secret; every outbound redirect and
/// inbound callback is signed/verified with it.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Gateway payment page the buyer is redirected to
    #[serde(default = "default_gateway_endpoint")]
    pub endpoint: String,

    /// Merchant identifier issued by the gateway
    #[serde(default = "default_merchant_code")]
    pub merchant_code: String,

    /// Shared HMAC secret (minimum 32 characters)
    #[validate(length(min = 32))]
    #[serde(default = "default_gateway_secret")]
    pub secret_key: String,

    /// Gateway protocol version tag
    #[serde(default = "default_gateway_version")]
    pub version: String,

    /// Gateway command tag for a payment request
    #[serde(default = "default_gateway_command")]
    pub command: String,

    #[serde(default = "default_currency")]
    pub currency_code: String,

    #[serde(default = "default_gateway_locale")]
    pub locale: String,

    /// URL the gateway sends the signed callback to
    #[serde(default = "default_return_url")]
    pub return_url: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: default_gateway_endpoint(),
            merchant_code: default_merchant_code(),
            secret_key: default_gateway_secret(),
            version: default_gateway_version(),
            command: default_gateway_command(),
            currency_code: default_currency(),
            locale: default_gateway_locale(),
            return_url: default_return_url(),
        }
    }
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Default currency for orders
    #[serde(default = "default_currency")]
    pub currency: String,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// Payment gateway settings
    #[validate]
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_gateway_endpoint() -> String {
    "https://sandbox.gateway.example/paymentv2/vpcpay.html".to_string()
}
fn default_merchant_code() -> String {
    "DEMO_MERCHANT".to_string()
}
fn default_gateway_secret() -> String {
    DEV_DEFAULT_GATEWAY_SECRET.to_string()
}
fn default_gateway_version() -> String {
    DEFAULT_GATEWAY_VERSION.to_string()
}
fn default_gateway_command() -> String {
    DEFAULT_GATEWAY_COMMAND.to_string()
}
fn default_gateway_locale() -> String {
    DEFAULT_GATEWAY_LOCALE.to_string()
}
fn default_return_url() -> String {
    "http://127.0.0.1:8080/api/v1/payments/callback".to_string()
}

impl AppConfig {
    /// Programmatic constructor used by tests and tooling.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            currency: default_currency(),
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            gateway: GatewayConfig::default(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

/// Loads configuration from `config/default.toml`, an environment-specific
/// file, and `APP_*` environment variables (double underscore separates
/// nesting, e.g. `APP_GATEWAY__SECRET_KEY`), then validates the result.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let run_env = env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let cfg: AppConfig = Config::builder()
        .add_source(File::with_name(&format!("{CONFIG_DIR}/default")).required(false))
        .add_source(File::with_name(&format!("{CONFIG_DIR}/{run_env}")).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?
        .try_deserialize()?;

    cfg.validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;

    if cfg.is_production() && cfg.gateway.secret_key == DEV_DEFAULT_GATEWAY_SECRET {
        return Err(ConfigError::Message(
            "the development gateway secret must not be used in production".to_string(),
        ));
    }

    Ok(cfg)
}

/// Initializes the global tracing subscriber.
pub fn init_tracing(log_level: &str, json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
