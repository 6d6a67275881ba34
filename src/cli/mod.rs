pub mod app;
pub mod cache;
pub mod commands;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod output;
pub mod resolve;
pub mod runtime;

pub use app::run;
pub use cache::{cmd_cache, CacheArgs};
pub use config::{cmd_config, ConfigArgs};
pub use resolve::{cmd_resolve, ResolveArgs};
