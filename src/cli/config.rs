use std::path::Path;

use crate::cli::context::CliContext;
use crate::cli::output::{emit, OutputFormat};
use action_locator::HealConfig;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tokio::fs;
use tracing::info;

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Validate the configuration file
    Validate,

    /// Write the default configuration to the configuration path
    Reset,
}

pub async fn cmd_config(args: ConfigArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let path = ctx.config_path().to_path_buf();
    match args.action {
        ConfigAction::Show => {
            emit(output, ctx.config(), |config| {
                println!("Current configuration ({}):", path.display());
                match serde_yaml::to_string(config) {
                    Ok(yaml) => println!("{yaml}"),
                    Err(err) => println!("<unprintable: {err}>"),
                }
            })?;
        }
        ConfigAction::Validate => {
            if fs::try_exists(&path).await? {
                let config = load_config_file(&path).await?;
                config
                    .validate()
                    .with_context(|| format!("validating {}", path.display()))?;
                println!("Configuration file {} is valid", path.display());
            } else {
                println!(
                    "No configuration file at {}; defaults are valid",
                    path.display()
                );
            }
        }
        ConfigAction::Reset => {
            save_config_file(&path, &HealConfig::default()).await?;
            info!("Configuration reset at {}", path.display());
            println!(
                "Configuration reset to defaults and written to {}",
                path.display()
            );
        }
    }

    Ok(())
}

async fn load_config_file(path: &Path) -> Result<HealConfig> {
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let config =
        serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}

async fn save_config_file(path: &Path, config: &HealConfig) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let serialized = serde_yaml::to_string(config)?;
    fs::write(path, serialized)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_locator::ExecutionPolicy;

    #[tokio::test]
    async fn reset_writes_loadable_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("autoheal.yaml");
        save_config_file(&path, &HealConfig::default()).await.unwrap();
        let loaded = load_config_file(&path).await.unwrap();
        assert_eq!(loaded.engine.policy, ExecutionPolicy::Sequential);
        assert_eq!(loaded.trust, HealConfig::default().trust);
        assert!(loaded.validate().is_ok());
    }
}
