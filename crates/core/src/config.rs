use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `CRM__` (e.g. `CRM__PROVIDER__OFFLINE=true`).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub estimator: EstimatorConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub campaigns: CampaignConfig,
}

/// Simulated latency for each data provider call, in milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_stats_latency_ms")]
    pub stats_latency_ms: u64,
    #[serde(default = "default_list_latency_ms")]
    pub campaigns_latency_ms: u64,
    #[serde(default = "default_list_latency_ms")]
    pub segments_latency_ms: u64,
    #[serde(default = "default_customers_latency_ms")]
    pub customers_latency_ms: u64,
    #[serde(default = "default_estimate_latency_ms")]
    pub estimate_latency_ms: u64,
    #[serde(default = "default_assistant_latency_ms")]
    pub assistant_latency_ms: u64,
    /// Every call fails with `DataUnavailable` while set.
    #[serde(default)]
    pub offline: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EstimatorConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_store_path")]
    pub store_path: String,
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CampaignConfig {
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
    #[serde(default = "default_failure_rate")]
    pub delivery_failure_rate: f64,
    #[serde(default = "default_delivery_seed")]
    pub delivery_seed: u64,
    #[serde(default = "default_delivery_batch_size")]
    pub delivery_batch_size: usize,
}

// Default functions
fn default_stats_latency_ms() -> u64 {
    800
}
fn default_list_latency_ms() -> u64 {
    800
}
fn default_customers_latency_ms() -> u64 {
    1000
}
fn default_estimate_latency_ms() -> u64 {
    500
}
fn default_assistant_latency_ms() -> u64 {
    800
}
fn default_debounce_ms() -> u64 {
    300
}
fn default_store_path() -> String {
    "crm-session.json".to_string()
}
fn default_storage_key() -> String {
    "user".to_string()
}
fn default_recent_limit() -> usize {
    5
}
fn default_failure_rate() -> f64 {
    0.04
}
fn default_delivery_seed() -> u64 {
    42
}
fn default_delivery_batch_size() -> usize {
    50
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            stats_latency_ms: default_stats_latency_ms(),
            campaigns_latency_ms: default_list_latency_ms(),
            segments_latency_ms: default_list_latency_ms(),
            customers_latency_ms: default_customers_latency_ms(),
            estimate_latency_ms: default_estimate_latency_ms(),
            assistant_latency_ms: default_assistant_latency_ms(),
            offline: false,
        }
    }
}

impl ProviderConfig {
    /// Zero latency everywhere. Used by tests and batch tooling.
    pub fn instant() -> Self {
        Self {
            stats_latency_ms: 0,
            campaigns_latency_ms: 0,
            segments_latency_ms: 0,
            customers_latency_ms: 0,
            estimate_latency_ms: 0,
            assistant_latency_ms: 0,
            offline: false,
        }
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            storage_key: default_storage_key(),
        }
    }
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            recent_limit: default_recent_limit(),
            delivery_failure_rate: default_failure_rate(),
            delivery_seed: default_delivery_seed(),
            delivery_batch_size: default_delivery_batch_size(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            estimator: EstimatorConfig::default(),
            session: SessionConfig::default(),
            campaigns: CampaignConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("CRM")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let app: AppConfig = config.try_deserialize()?;
        app.validate()?;
        tracing::debug!(offline = app.provider.offline, "Configuration resolved from environment");
        Ok(app)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        let rate = self.campaigns.delivery_failure_rate;
        if !(0.0..=1.0).contains(&rate) {
            return Err(config::ConfigError::Message(format!(
                "campaigns.delivery_failure_rate must be within 0..=1, got {rate}"
            )));
        }
        if self.campaigns.delivery_batch_size == 0 {
            return Err(config::ConfigError::Message(
                "campaigns.delivery_batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_provider_latencies() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.provider.stats_latency_ms, 800);
        assert_eq!(cfg.provider.customers_latency_ms, 1000);
        assert_eq!(cfg.provider.estimate_latency_ms, 500);
        assert!(!cfg.provider.offline);
        assert_eq!(cfg.session.storage_key, "user");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_failure_rate() {
        let mut cfg = AppConfig::default();
        cfg.campaigns.delivery_failure_rate = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_partial_section_falls_back_to_defaults() {
        let cfg: AppConfig = serde_json::from_value(serde_json::json!({
            "provider": { "offline": true }
        }))
        .unwrap();
        assert!(cfg.provider.offline);
        assert_eq!(cfg.provider.segments_latency_ms, 800);
        assert_eq!(cfg.estimator.debounce_ms, 300);
    }
}
