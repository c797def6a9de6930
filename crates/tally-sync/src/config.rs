//! # Sync Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_ML_REFRESH_TOKEN=...                                         │
//! │     TALLY_ERP_ACCESS_TOKEN=...                                         │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     --config / TALLY_CONFIG, else                                      │
//! │     ~/.config/tally/tally.toml (Linux)                                 │
//! │     ~/Library/Application Support/com.tally.tally/tally.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [marketplace]
//! seller_id = "1100552101"
//! client_id = "8935093653553463"
//! page_size = 50
//!
//! [erp]
//! page_size = 100
//!
//! [store]
//! database_path = "/var/lib/tally/tally.db"
//!
//! [fetch]
//! max_attempts = 3
//! initial_delay_ms = 1000
//! page_delay_ms = 500
//!
//! [pricing]
//! commission_bps = 741
//! tax_bps = 920
//! free_shipping_threshold = 79.0
//!
//! [sales]
//! marketplace_label = "mercadolivre"
//! ```
//!
//! Secrets (`client_secret`, `refresh_token`, `access_token`) normally come
//! from the environment rather than the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::error::{SyncError, SyncResult};
use crate::fetcher::RetryPolicy;
use tally_core::financial::FinancialPolicy;
use tally_core::Rate;

/// The marketplace caps `limit` on search endpoints at 50.
pub const MARKETPLACE_MAX_PAGE_SIZE: u32 = 50;

/// The ERP caps `limit` on the product list at 100.
pub const ERP_MAX_PAGE_SIZE: u32 = 100;

// =============================================================================
// Marketplace
// =============================================================================

/// Marketplace API and OAuth credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceSettings {
    /// Run the fulfillment stage. Sales also needs the marketplace.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_marketplace_base")]
    pub api_base: String,

    #[serde(default = "default_token_url")]
    pub token_url: String,

    #[serde(default)]
    pub seller_id: String,

    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    #[serde(default)]
    pub refresh_token: String,

    /// Items per search page, at most 50.
    #[serde(default = "default_marketplace_page_size")]
    pub page_size: u32,
}

fn default_true() -> bool {
    true
}

fn default_marketplace_base() -> String {
    "https://api.mercadolibre.com".to_string()
}

fn default_token_url() -> String {
    "https://api.mercadolibre.com/oauth/token".to_string()
}

fn default_marketplace_page_size() -> u32 {
    MARKETPLACE_MAX_PAGE_SIZE
}

impl Default for MarketplaceSettings {
    fn default() -> Self {
        MarketplaceSettings {
            enabled: true,
            api_base: default_marketplace_base(),
            token_url: default_token_url(),
            seller_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            page_size: default_marketplace_page_size(),
        }
    }
}

// =============================================================================
// ERP
// =============================================================================

/// ERP product API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErpSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_erp_base")]
    pub api_base: String,

    /// Bearer token issued by the ERP.
    #[serde(default)]
    pub access_token: String,

    /// Products per page, at most 100.
    #[serde(default = "default_erp_page_size")]
    pub page_size: u32,
}

fn default_erp_base() -> String {
    "https://api.bling.com.br/v3".to_string()
}

fn default_erp_page_size() -> u32 {
    ERP_MAX_PAGE_SIZE
}

impl Default for ErpSettings {
    fn default() -> Self {
        ErpSettings {
            enabled: true,
            api_base: default_erp_base(),
            access_token: String::new(),
            page_size: default_erp_page_size(),
        }
    }
}

// =============================================================================
// Store
// =============================================================================

/// Where the SQLite database lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Defaults to `tally.db` in the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    4
}

impl StoreSettings {
    pub fn resolved_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("com", "tally", "tally")
                .map(|dirs| dirs.data_dir().join("tally.db"))
                .unwrap_or_else(|| PathBuf::from("tally.db"))
        })
    }
}

// =============================================================================
// Fetch
// =============================================================================

/// Retry, pacing and timeout settings shared by every HTTP call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSettings {
    /// Attempts per request when rate limited, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay; doubles on each retry.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Pause between consecutive pages.
    #[serde(default = "default_page_delay")]
    pub page_delay_ms: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Stop paging the ERP when the same page keeps coming back.
    #[serde(default = "default_true")]
    pub loop_detection: bool,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> u64 {
    1000
}

fn default_page_delay() -> u64 {
    500
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for FetchSettings {
    fn default() -> Self {
        FetchSettings {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            page_delay_ms: default_page_delay(),
            request_timeout_secs: default_request_timeout(),
            loop_detection: true,
        }
    }
}

impl FetchSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
        )
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// =============================================================================
// Pricing
// =============================================================================

/// Fee and tax parameters for the sales pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingSettings {
    #[serde(default = "default_fulfillment_rate")]
    pub fulfillment_rate_per_unit: f64,

    #[serde(default = "default_flat_cost")]
    pub flex_flat_cost: f64,

    #[serde(default = "default_flat_cost")]
    pub cross_docking_flat_cost: f64,

    #[serde(default = "default_commission_bps")]
    pub commission_bps: u32,

    #[serde(default = "default_tax_bps")]
    pub tax_bps: u32,

    #[serde(default = "default_free_shipping_threshold")]
    pub free_shipping_threshold: f64,
}

fn default_fulfillment_rate() -> f64 {
    1.2
}

fn default_flat_cost() -> f64 {
    6.0
}

fn default_commission_bps() -> u32 {
    741
}

fn default_tax_bps() -> u32 {
    920
}

fn default_free_shipping_threshold() -> f64 {
    79.0
}

impl Default for PricingSettings {
    fn default() -> Self {
        PricingSettings {
            fulfillment_rate_per_unit: default_fulfillment_rate(),
            flex_flat_cost: default_flat_cost(),
            cross_docking_flat_cost: default_flat_cost(),
            commission_bps: default_commission_bps(),
            tax_bps: default_tax_bps(),
            free_shipping_threshold: default_free_shipping_threshold(),
        }
    }
}

impl PricingSettings {
    pub fn policy(&self) -> FinancialPolicy {
        FinancialPolicy {
            fulfillment_rate_per_unit: self.fulfillment_rate_per_unit,
            flex_flat_cost: self.flex_flat_cost,
            cross_docking_flat_cost: self.cross_docking_flat_cost,
            commission_rate: Rate::from_bps(self.commission_bps),
            tax_rate: Rate::from_bps(self.tax_bps),
            free_shipping_threshold: self.free_shipping_threshold,
        }
    }
}

// =============================================================================
// Sales
// =============================================================================

/// Sales import settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Value written to `sales_ledger.marketplace`.
    #[serde(default = "default_marketplace_label")]
    pub marketplace_label: String,

    /// Orders per search page, at most 50.
    #[serde(default = "default_marketplace_page_size")]
    pub page_size: u32,
}

fn default_marketplace_label() -> String {
    "mercadolivre".to_string()
}

impl Default for SalesSettings {
    fn default() -> Self {
        SalesSettings {
            enabled: true,
            marketplace_label: default_marketplace_label(),
            page_size: default_marketplace_page_size(),
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete configuration for one sync cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub marketplace: MarketplaceSettings,

    #[serde(default)]
    pub erp: ErpSettings,

    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub fetch: FetchSettings,

    #[serde(default)]
    pub pricing: PricingSettings,

    #[serde(default)]
    pub sales: SalesSettings,
}

/// Whether a secret is configured. Never carries the value itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretStatus {
    pub name: &'static str,
    pub required: bool,
    /// First characters of the value followed by `…`, if present.
    pub preview: Option<String>,
}

impl SecretStatus {
    fn of(name: &'static str, required: bool, value: &str) -> Self {
        let preview = if value.is_empty() {
            None
        } else {
            Some(format!("{}…", value.chars().take(4).collect::<String>()))
        };
        SecretStatus {
            name,
            required,
            preview,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.required && self.preview.is_none()
    }
}

impl SyncConfig {
    /// Loads configuration from file and environment, then validates it.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (tally.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let config = Self::load_unvalidated(config_path)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads without validating, for `check-config` reporting.
    pub fn load_unvalidated(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = match config_path.or_else(Self::default_config_path) {
            Some(path) if path.exists() => Self::from_file(&path)?,
            Some(path) => {
                debug!(?path, "Config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> SyncResult<Self> {
        info!(?path, "Loading config from file");
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.marketplace.enabled || self.sales.enabled {
            Url::parse(&self.marketplace.api_base)?;
            Url::parse(&self.marketplace.token_url)?;

            for (name, value) in [
                ("marketplace.seller_id", &self.marketplace.seller_id),
                ("marketplace.client_id", &self.marketplace.client_id),
                ("marketplace.client_secret", &self.marketplace.client_secret),
                ("marketplace.refresh_token", &self.marketplace.refresh_token),
            ] {
                if value.trim().is_empty() {
                    return Err(SyncError::InvalidConfig(format!("{name} is required")));
                }
            }

            check_page_size(
                "marketplace.page_size",
                self.marketplace.page_size,
                MARKETPLACE_MAX_PAGE_SIZE,
            )?;
            check_page_size(
                "sales.page_size",
                self.sales.page_size,
                MARKETPLACE_MAX_PAGE_SIZE,
            )?;
        }

        if self.erp.enabled {
            Url::parse(&self.erp.api_base)?;
            if self.erp.access_token.trim().is_empty() {
                return Err(SyncError::InvalidConfig(
                    "erp.access_token is required".into(),
                ));
            }
            check_page_size("erp.page_size", self.erp.page_size, ERP_MAX_PAGE_SIZE)?;
        }

        if self.fetch.max_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "fetch.max_attempts must be at least 1".into(),
            ));
        }

        if self.fetch.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "fetch.request_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Presence of each secret the enabled stages need.
    pub fn secret_report(&self) -> Vec<SecretStatus> {
        let marketplace = self.marketplace.enabled || self.sales.enabled;
        vec![
            SecretStatus::of(
                "marketplace.client_secret",
                marketplace,
                &self.marketplace.client_secret,
            ),
            SecretStatus::of(
                "marketplace.refresh_token",
                marketplace,
                &self.marketplace.refresh_token,
            ),
            SecretStatus::of("erp.access_token", self.erp.enabled, &self.erp.access_token),
        ]
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |target: &mut String, key: &str| {
            if let Some(value) = lookup(key) {
                debug!(key, "Overriding from environment");
                *target = value;
            }
        };

        set(&mut self.marketplace.api_base, "TALLY_ML_API_BASE");
        set(&mut self.marketplace.token_url, "TALLY_ML_TOKEN_URL");
        set(&mut self.marketplace.seller_id, "TALLY_ML_SELLER_ID");
        set(&mut self.marketplace.client_id, "TALLY_ML_CLIENT_ID");
        set(&mut self.marketplace.client_secret, "TALLY_ML_CLIENT_SECRET");
        set(&mut self.marketplace.refresh_token, "TALLY_ML_REFRESH_TOKEN");
        set(&mut self.erp.api_base, "TALLY_ERP_API_BASE");
        set(&mut self.erp.access_token, "TALLY_ERP_ACCESS_TOKEN");

        if let Some(path) = lookup("TALLY_DATABASE_PATH") {
            self.store.database_path = Some(PathBuf::from(path));
        }

        if let Some(attempts) = lookup("TALLY_FETCH_MAX_ATTEMPTS") {
            if let Ok(n) = attempts.parse::<u32>() {
                self.fetch.max_attempts = n;
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("TALLY_CONFIG") {
            return Some(PathBuf::from(path));
        }
        directories::ProjectDirs::from("com", "tally", "tally")
            .map(|dirs| dirs.config_dir().join("tally.toml"))
    }
}

fn check_page_size(name: &str, value: u32, max: u32) -> SyncResult<()> {
    if value == 0 || value > max {
        return Err(SyncError::InvalidConfig(format!(
            "{name} must be between 1 and {max}, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn complete() -> SyncConfig {
        let mut config = SyncConfig::default();
        config.marketplace.seller_id = "1100552101".into();
        config.marketplace.client_id = "client".into();
        config.marketplace.client_secret = "secret".into();
        config.marketplace.refresh_token = "TG-refresh".into();
        config.erp.access_token = "erp-token".into();
        config
    }

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.fetch.max_attempts, 3);
        assert_eq!(config.fetch.page_delay(), Duration::from_millis(500));
        assert_eq!(config.marketplace.page_size, 50);
        assert_eq!(config.erp.page_size, 100);
        assert_eq!(config.pricing.policy(), FinancialPolicy::default());
    }

    #[test]
    fn test_validation_requires_secrets() {
        assert!(complete().validate().is_ok());

        let mut config = complete();
        config.marketplace.refresh_token.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("refresh_token"));

        let mut config = complete();
        config.erp.access_token.clear();
        assert!(config.validate().is_err());

        config.erp.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_limits() {
        let mut config = complete();
        config.marketplace.page_size = 51;
        assert!(config.validate().is_err());

        let mut config = complete();
        config.erp.page_size = 0;
        assert!(config.validate().is_err());

        let mut config = complete();
        config.fetch.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = complete();
        config.erp.api_base = "not a url".into();
        assert!(matches!(
            config.validate().unwrap_err(),
            SyncError::InvalidUrl(_)
        ));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("TALLY_ML_REFRESH_TOKEN", "TG-from-env"),
            ("TALLY_DATABASE_PATH", "/tmp/tally-test.db"),
            ("TALLY_FETCH_MAX_ATTEMPTS", "5"),
        ]
        .into_iter()
        .collect();

        let mut config = SyncConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.marketplace.refresh_token, "TG-from-env");
        assert_eq!(
            config.store.database_path,
            Some(PathBuf::from("/tmp/tally-test.db"))
        );
        assert_eq!(config.fetch.max_attempts, 5);
        assert!(config.erp.access_token.is_empty());
    }

    #[test]
    fn test_partial_toml() {
        let config: SyncConfig = toml::from_str(
            r#"
            [marketplace]
            seller_id = "42"

            [pricing]
            tax_bps = 1000

            [sales]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.marketplace.seller_id, "42");
        assert_eq!(config.marketplace.page_size, 50);
        assert_eq!(config.pricing.tax_bps, 1000);
        assert_eq!(config.pricing.commission_bps, 741);
        assert!(!config.sales.enabled);
    }

    #[test]
    fn test_secret_report_hides_values() {
        let report = complete().secret_report();
        let refresh = report
            .iter()
            .find(|s| s.name == "marketplace.refresh_token")
            .unwrap();
        assert_eq!(refresh.preview.as_deref(), Some("TG-r…"));
        assert!(!refresh.is_missing());

        let mut config = complete();
        config.erp.access_token.clear();
        let erp = config
            .secret_report()
            .into_iter()
            .find(|s| s.name == "erp.access_token")
            .unwrap();
        assert!(erp.is_missing());
    }
}
