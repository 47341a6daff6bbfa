use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{CommonError, CommonResult};

const DEFAULT_CONFIG: &str = include_str!("default.toml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub store: StoreConfig,
    pub compute: ComputeConfig,
    pub runtime: RuntimeConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Loads the embedded defaults, overridden by `STRATA__`-prefixed environment variables.
    /// A double underscore separates nested keys, e.g. `STRATA__SESSION__DEFAULT_PAGE_SIZE`.
    pub fn load() -> CommonResult<Self> {
        Self::figment()
            .admerge(Env::prefixed("STRATA__").map(|p| p.as_str().replace("__", ".").into()))
            .extract::<Self>()?
            .validated()
    }

    /// Loads the embedded defaults only, ignoring the environment.
    pub fn defaults() -> CommonResult<Self> {
        Self::figment()
            .extract::<Self>()?
            .validated()
    }

    fn figment() -> Figment {
        Figment::from(Toml::string(DEFAULT_CONFIG))
    }

    fn validated(self) -> CommonResult<Self> {
        if self.session.default_page_size == 0 {
            return Err(CommonError::config("session.default_page_size must be positive"));
        }
        if self.compute.target_partitions == 0 {
            return Err(CommonError::config("compute.target_partitions must be positive"));
        }
        if self.compute.batch_size == 0 {
            return Err(CommonError::config("compute.batch_size must be positive"));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// The number of rows returned by a chunk request that does not specify a limit.
    pub default_page_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub enable_progress_bar: bool,
    pub preserve_insertion_order: bool,
    pub threads: usize,
    pub memory_limit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeConfig {
    pub target_partitions: usize,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub worker_threads: usize,
    pub stack_size: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub trace_to_console: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::defaults().unwrap();
        assert_eq!(config.session.default_page_size, 500);
        assert_eq!(config.compute.target_partitions, 1);
        assert!(config.store.preserve_insertion_order);
        assert!(!config.store.enable_progress_bar);
        assert!(config.store.memory_limit.is_empty());
    }

    #[test]
    fn test_env_override() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("STRATA__SESSION__DEFAULT_PAGE_SIZE", "250");
            jail.set_env("STRATA__STORE__THREADS", "2");
            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.session.default_page_size, 250);
            assert_eq!(config.store.threads, 2);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_page_size() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("STRATA__SESSION__DEFAULT_PAGE_SIZE", "0");
            assert!(matches!(
                AppConfig::load(),
                Err(CommonError::InvalidConfig(_))
            ));
            Ok(())
        });
    }
}
