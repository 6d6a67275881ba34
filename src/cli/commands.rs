use clap::Subcommand;

use super::cache::CacheArgs;
use super::config::ConfigArgs;
use super::resolve::ResolveArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Resolve selectors against a scripted page fixture
    Resolve(ResolveArgs),

    /// Inspect or maintain the selector cache
    Cache(CacheArgs),

    /// Manage AutoHeal configuration
    Config(ConfigArgs),
}
