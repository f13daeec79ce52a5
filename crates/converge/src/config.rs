use std::{collections::HashMap, sync::LazyLock, time::Duration};

use serde::{Deserialize, Serialize};

use crate::PhaseOrder;

pub static CONFIG: LazyLock<DynAppConfig> = LazyLock::new(get_config);

#[derive(Clone, Deserialize, Serialize, Debug, Default, PartialEq)]
pub struct DynAppConfig {
    /// Phase order used when a resource kind has no override.
    #[serde(default)]
    pub phase_order: PhaseOrder,
    /// Phase order per resource kind, e.g. `folder_permissions = "remove-first"`
    /// for resources where a stale grant must never outlive a revocation.
    #[serde(default)]
    pub phase_order_overrides: HashMap<String, PhaseOrder>,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl DynAppConfig {
    #[must_use]
    pub fn phase_order_for(&self, resource_kind: &str) -> PhaseOrder {
        self.phase_order_overrides
            .get(resource_kind)
            .copied()
            .unwrap_or(self.phase_order)
    }
}

/// Retries of the whole `list → diff → execute` cycle on transient failures.
#[derive(Clone, Copy, Deserialize, Serialize, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    /// Additional attempts after the first one. `0` disables retries.
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

fn default_initial_backoff_ms() -> u64 {
    250
}

fn get_config() -> DynAppConfig {
    let defaults = figment::providers::Serialized::defaults(DynAppConfig::default());

    #[cfg(not(test))]
    let prefixes = &["CONVERGE__"];
    #[cfg(test)]
    let prefixes = &["CONVERGE_TEST__"];

    let mut config = figment::Figment::from(defaults);
    for prefix in prefixes {
        let env = figment::providers::Env::prefixed(prefix).split("__");
        config = config.merge(env);
    }

    match config.extract::<DynAppConfig>() {
        Ok(c) => c,
        Err(e) => {
            panic!("Failed to extract converge config: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = get_config();
            assert_eq!(config.phase_order, PhaseOrder::CreateFirst);
            assert_eq!(config.retry, RetryConfig::default());
            assert_eq!(config.retry.initial_backoff(), Duration::from_millis(250));
            Ok(())
        });
    }

    #[test]
    fn test_phase_order_overrides_env_vars() {
        figment::Jail::expect_with(|jail| {
            jail.set_env(
                "CONVERGE_TEST__PHASE_ORDER_OVERRIDES__FOLDER_PERMISSIONS",
                "remove-first",
            );
            let config = get_config();
            assert_eq!(
                config.phase_order_for("folder_permissions"),
                PhaseOrder::RemoveFirst
            );
            assert_eq!(
                config.phase_order_for("dashboard_permissions"),
                PhaseOrder::CreateFirst
            );
            Ok(())
        });

        figment::Jail::expect_with(|jail| {
            jail.set_env("CONVERGE_TEST__PHASE_ORDER", "remove-first");
            let config = get_config();
            assert_eq!(
                config.phase_order_for("dashboard_permissions"),
                PhaseOrder::RemoveFirst
            );
            Ok(())
        });
    }

    #[test]
    fn test_retry_env_vars() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("CONVERGE_TEST__RETRY__MAX_RETRIES", "3");
            jail.set_env("CONVERGE_TEST__RETRY__INITIAL_BACKOFF_MS", "10");
            let config = get_config();
            assert_eq!(
                config.retry,
                RetryConfig {
                    max_retries: 3,
                    initial_backoff_ms: 10
                }
            );
            Ok(())
        });
    }
}
