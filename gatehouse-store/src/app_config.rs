use gatehouse_core::MAX_GROUP_SIZE;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

/// Tunables that the `business_rules` table may override at start-up.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BusinessRules {
    #[serde(default = "default_invitation_window")]
    pub invitation_window_seconds: u64,
    #[serde(default = "default_sweep_interval")]
    pub expiry_sweep_seconds: u64,
    #[serde(default = "default_max_group_size")]
    pub max_group_size: usize,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            invitation_window_seconds: default_invitation_window(),
            expiry_sweep_seconds: default_sweep_interval(),
            max_group_size: default_max_group_size(),
            rate_limit_per_minute: default_rate_limit(),
        }
    }
}

impl BusinessRules {
    /// Apply one `{"value": n}` override. Unknown keys and non-numeric values
    /// are ignored; returns whether anything changed.
    pub fn apply_override(&mut self, key: &str, value: &serde_json::Value) -> bool {
        let Some(n) = value.get("value").and_then(serde_json::Value::as_u64) else {
            return false;
        };
        match key {
            "invitation_window_seconds" => self.invitation_window_seconds = n,
            "expiry_sweep_seconds" => self.expiry_sweep_seconds = n.max(1),
            "max_group_size" => self.max_group_size = (n as usize).clamp(1, MAX_GROUP_SIZE),
            "rate_limit_per_minute" => self.rate_limit_per_minute = n as i64,
            _ => return false,
        }
        true
    }

    /// Pull values read straight from config files into their legal ranges.
    fn clamp(&mut self) {
        self.expiry_sweep_seconds = self.expiry_sweep_seconds.max(1);
        self.max_group_size = self.max_group_size.clamp(1, MAX_GROUP_SIZE);
    }
}

fn default_invitation_window() -> u64 { 86_400 }
fn default_sweep_interval() -> u64 { 60 }
fn default_max_group_size() -> usize { 5 }
fn default_rate_limit() -> i64 { 100 }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

/// Without a URL the service runs on in-memory backends.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct KafkaConfig {
    pub brokers: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Untracked developer overrides
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `GATEHOUSE__DATABASE__URL=postgres://...` sets `database.url`
            .add_source(config::Environment::with_prefix("GATEHOUSE").separator("__"))
            .build()?;

        let mut config: Config = s.try_deserialize()?;
        config.business_rules.clamp();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_overrides() {
        let mut rules = BusinessRules::default();
        assert!(rules.apply_override("invitation_window_seconds", &json!({"value": 3600})));
        assert!(rules.apply_override("max_group_size", &json!({"value": 3})));
        assert!(!rules.apply_override("max_group_size", &json!({"value": "lots"})));
        assert!(!rules.apply_override("tax_rate", &json!({"value": 2})));

        assert_eq!(rules.invitation_window_seconds, 3600);
        assert_eq!(rules.max_group_size, 3);
        assert_eq!(rules.expiry_sweep_seconds, 60);
    }

    #[test]
    fn test_group_size_stays_within_five() {
        let mut rules = BusinessRules::default();
        assert!(rules.apply_override("max_group_size", &json!({"value": 8})));
        assert_eq!(rules.max_group_size, 5);

        rules.apply_override("max_group_size", &json!({"value": 0}));
        assert_eq!(rules.max_group_size, 1);

        let mut from_file = BusinessRules { max_group_size: 12, expiry_sweep_seconds: 0, ..Default::default() };
        from_file.clamp();
        assert_eq!((from_file.max_group_size, from_file.expiry_sweep_seconds), (5, 1));
    }

    #[test]
    fn test_sweep_interval_never_zero() {
        let mut rules = BusinessRules::default();
        rules.apply_override("expiry_sweep_seconds", &json!({"value": 0}));
        assert_eq!(rules.expiry_sweep_seconds, 1);
    }
}
