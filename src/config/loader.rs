use super::types::*;
use crate::policy::{BackupPlan, BackupRule, Schedule};
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate the configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.store.table_name.is_empty() {
        return Err(ConfigError::ValidationError(
            "store.table_name must not be empty".to_string(),
        ));
    }

    if config.store.scan_page_size == 0 {
        return Err(ConfigError::ValidationError(
            "store.scan_page_size must be at least 1".to_string(),
        ));
    }

    if config.global.tick_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "global.tick_interval_secs must be at least 1".to_string(),
        ));
    }

    if config.global.store_retry_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "global.store_retry_attempts must be at least 1".to_string(),
        ));
    }

    for (name, rule) in &config.rules {
        validate_rule(name, rule)?;
    }

    Ok(())
}

fn validate_rule(name: &str, rule: &RuleConfig) -> Result<()> {
    if let Err(e) = Schedule::parse(&rule.schedule) {
        return Err(ConfigError::ValidationError(format!(
            "Rule '{}': {}",
            name, e
        )));
    }

    if rule.retention_days == 0 {
        return Err(ConfigError::ValidationError(format!(
            "Rule '{}': retention_days must be at least 1",
            name
        )));
    }

    Ok(())
}

/// Build the backup plan for the configured table
///
/// Rules are added in name order so the plan is deterministic regardless of
/// map iteration order.
pub fn build_plan(config: &Config) -> Result<BackupPlan> {
    let mut plan = BackupPlan::new(config.store.table_name.clone());

    let mut names: Vec<&String> = config.rules.keys().collect();
    names.sort();

    for name in names {
        let rule_config = &config.rules[name];
        let rule = BackupRule::new(name.clone(), &rule_config.schedule, rule_config.retention_days)
            .map_err(|e| ConfigError::ValidationError(format!("Rule '{}': {}", name, e)))?;
        let rule = if rule_config.enabled { rule } else { rule.disabled() };
        plan.add_rule(rule)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_rule(schedule: &str, retention_days: u32) -> Config {
        let mut config = Config::default();
        config.rules.insert(
            "daily".to_string(),
            RuleConfig {
                schedule: schedule.to_string(),
                retention_days,
                enabled: true,
                description: String::new(),
            },
        );
        config
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.store.table_name, "Product");
    }

    #[test]
    fn test_invalid_schedule_rejected() {
        let config = config_with_rule("not a cron", 30);
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("daily"));
    }

    #[test]
    fn test_zero_retention_rejected() {
        let config = config_with_rule("10 9 * * *", 0);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_build_plan_orders_rules_by_name() {
        let mut config = config_with_rule("10 9 * * *", 30);
        config.rules.insert(
            "archive".to_string(),
            RuleConfig {
                schedule: "0 3 1 * *".to_string(),
                retention_days: 365,
                enabled: true,
                description: String::new(),
            },
        );

        let plan = build_plan(&config).unwrap();
        let names: Vec<&str> = plan.rules().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["archive", "daily"]);
        assert_eq!(plan.resource(), "Product");
    }

    #[test]
    fn test_build_plan_respects_enabled_flag() {
        let mut config = config_with_rule("10 9 * * *", 30);
        config.rules.get_mut("daily").unwrap().enabled = false;

        let plan = build_plan(&config).unwrap();
        assert!(!plan.rules()[0].enabled);
    }
}
