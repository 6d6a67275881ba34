use std::env;
use std::path::PathBuf;

use action_locator::{ExecutionPolicy, HealConfig};
use anyhow::{Context, Result};
use autoheal_selector_cache::CacheBackend;
use tokio::fs;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const ENV_POLICY: &str = "AUTOHEAL_POLICY";
pub const ENV_TRUST_THRESHOLD: &str = "AUTOHEAL_TRUST_THRESHOLD";
pub const ENV_WORKERS: &str = "AUTOHEAL_WORKERS";
pub const ENV_CACHE_FILE: &str = "AUTOHEAL_CACHE_FILE";

/// Logs go to stderr so structured command output on stdout stays parseable.
pub fn init_logging(level: &str, debug: bool, json: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let plain = (!json).then(|| fmt::layer().with_writer(std::io::stderr));
    let structured = json.then(|| fmt::layer().json().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(structured)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

pub struct LoadedConfig {
    pub config: HealConfig,
    pub path: PathBuf,
}

pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let config_path = match config_path {
        Some(path) => path.clone(),
        None => {
            // Priority: ./config/autoheal.yaml > ~/.config/autoheal/config.yaml
            let local_config = PathBuf::from("config/autoheal.yaml");
            if local_config.exists() {
                local_config
            } else {
                let mut path = dirs::config_dir().context("Failed to get config directory")?;
                path.push("autoheal");
                path.push("config.yaml");
                path
            }
        }
    };

    if fs::try_exists(&config_path).await.unwrap_or(false) {
        let content = fs::read_to_string(&config_path)
            .await
            .context("Failed to read config file")?;

        let config: HealConfig =
            serde_yaml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded configuration from: {}", config_path.display());
        Ok(LoadedConfig {
            config,
            path: config_path,
        })
    } else {
        warn!(
            "Config file not found, using defaults: {}",
            config_path.display()
        );
        Ok(LoadedConfig {
            config: HealConfig::default(),
            path: config_path,
        })
    }
}

pub fn apply_env_overrides(config: &mut HealConfig) -> Result<()> {
    apply_overrides_from(config, |key| env::var(key).ok())
}

/// Applies `AUTOHEAL_*` overrides read through `lookup`, then re-validates.
pub fn apply_overrides_from<F>(config: &mut HealConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(ENV_POLICY) {
        let policy: ExecutionPolicy = raw.parse()?;
        info!(%policy, "Execution policy overridden from {}", ENV_POLICY);
        config.engine.policy = policy;
    }
    if let Some(raw) = lookup(ENV_TRUST_THRESHOLD) {
        config.trust.trust_threshold = raw
            .trim()
            .parse()
            .with_context(|| format!("{ENV_TRUST_THRESHOLD} must be a number, got '{raw}'"))?;
    }
    if let Some(raw) = lookup(ENV_WORKERS) {
        config.engine.worker_pool_size = raw
            .trim()
            .parse()
            .with_context(|| format!("{ENV_WORKERS} must be a positive integer, got '{raw}'"))?;
    }
    if let Some(raw) = lookup(ENV_CACHE_FILE) {
        let path = PathBuf::from(raw.trim());
        info!(path = %path.display(), "Selector cache file overridden from {}", ENV_CACHE_FILE);
        config.cache.backend = CacheBackend::File { path };
    }
    config.validate()?;
    Ok(())
}
