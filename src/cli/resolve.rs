use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use action_locator::{
    ExecutionPolicy, HealthStatus, LocatorError, LocatorMetricsSnapshot, ResolutionCoordinator,
    ResolutionRequest, ResolutionResult,
};
use anyhow::{bail, Result};
use autoheal_core_types::AutomationDriver;
use autoheal_resilience::ServiceMetricsSnapshot;
use autoheal_selector_cache::CacheMetricsSnapshot;
use clap::Args;
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::context::CliContext;
use crate::cli::output::{emit, OutputFormat};
use crate::fixture::{AnalysisCalls, PageFixture, RequestSpec};

#[derive(Args, Clone, Debug)]
pub struct ResolveArgs {
    /// Page fixture describing the page and the analysis answers
    #[arg(long, value_name = "FILE")]
    pub fixture: PathBuf,

    /// Resolve this selector instead of the fixture's requests
    #[arg(long)]
    pub selector: Option<String>,

    /// Element description used with --selector
    #[arg(long, default_value = "")]
    pub description: String,

    /// Execution policy override
    #[arg(long)]
    pub policy: Option<ExecutionPolicy>,

    /// Run each request this many times
    #[arg(long, default_value_t = 1)]
    pub repeat: usize,

    /// Skip the selector cache for every request
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(Debug, Serialize)]
pub struct ResolveReport {
    pub policy: ExecutionPolicy,
    pub resolutions: Vec<ResolutionReport>,
    pub metrics: LocatorMetricsSnapshot,
    pub cache: CacheMetricsSnapshot,
    pub service: ServiceMetricsSnapshot,
    pub analysis_calls: AnalysisCalls,
    pub health: HealthStatus,
}

#[derive(Debug, Serialize)]
pub struct ResolutionReport {
    pub selector: String,
    pub description: String,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResolutionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub code: &'static str,
    pub message: String,
    /// 0 (low) to 3 (critical)
    pub severity: u8,
    /// Worth resubmitting later (timeouts, open breaker, cache or driver trouble)
    pub retryable: bool,
}

impl From<&LocatorError> for ErrorReport {
    fn from(err: &LocatorError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            severity: err.severity(),
            retryable: err.is_retryable(),
        }
    }
}

pub async fn cmd_resolve(args: ResolveArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let fixture = PageFixture::load(&args.fixture).await?;
    let mut config = ctx.config().clone();
    if let Some(policy) = args.policy {
        config.engine.policy = policy;
    }
    let deadline = config.timeouts.element_timeout();
    let defaults = config.defaults.clone();

    let requests = requested(&fixture, &args)?;
    let service = Arc::new(fixture.service());
    let driver: Arc<dyn AutomationDriver> = Arc::new(fixture.driver());
    let coordinator = ResolutionCoordinator::new(config, service.clone()).await?;

    let mut resolutions = Vec::new();
    for spec in requests {
        let mut options = spec.options.clone().unwrap_or_else(|| defaults.clone());
        if args.no_cache {
            options.enable_caching = false;
        }
        let runs = spec.repeat.max(1) * args.repeat.max(1);
        for _ in 0..runs {
            let request = ResolutionRequest::builder(
                spec.selector.clone(),
                spec.description.clone(),
                Arc::clone(&driver),
            )
            .options(options.clone())
            .context(spec.context.clone())
            .build()?;
            let outcome = resolve_one(&coordinator, request, deadline).await;
            let interrupted = matches!(outcome, Err(LocatorError::Cancelled));
            resolutions.push(ResolutionReport {
                selector: spec.selector.clone(),
                description: spec.description.clone(),
                resolved: outcome.is_ok(),
                error: outcome.as_ref().err().map(ErrorReport::from),
                result: outcome.ok(),
            });
            if interrupted {
                break;
            }
        }
    }

    let report = ResolveReport {
        policy: coordinator.config().engine.policy,
        resolutions,
        metrics: coordinator.metrics(),
        cache: coordinator.cache_metrics(),
        service: coordinator.service_metrics(),
        analysis_calls: service.calls(),
        health: coordinator.health().await,
    };
    coordinator.shutdown();

    emit(output, &report, print_human)?;

    let failed = report.resolutions.iter().filter(|r| !r.resolved).count();
    if failed > 0 {
        bail!(
            "{} of {} resolutions failed",
            failed,
            report.resolutions.len()
        );
    }
    Ok(())
}

fn requested(fixture: &PageFixture, args: &ResolveArgs) -> Result<Vec<RequestSpec>> {
    if let Some(selector) = &args.selector {
        return Ok(vec![RequestSpec {
            selector: selector.clone(),
            description: args.description.clone(),
            context: Default::default(),
            options: None,
            repeat: 1,
        }]);
    }
    if fixture.requests.is_empty() {
        bail!(
            "fixture {} lists no requests; pass --selector",
            args.fixture.display()
        );
    }
    Ok(fixture.requests.clone())
}

async fn resolve_one(
    coordinator: &ResolutionCoordinator,
    request: ResolutionRequest,
    deadline: Duration,
) -> Result<ResolutionResult, LocatorError> {
    let selector = request.selector().to_string();
    tokio::select! {
        result = coordinator.resolve_with_deadline(request, deadline) => {
            match &result {
                Ok(resolved) => info!(
                    %selector,
                    resolved = %resolved.selector,
                    strategy = %resolved.strategy,
                    "Element resolved"
                ),
                Err(err) => warn!(%selector, code = err.code(), "Resolution failed: {}", err),
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            warn!(%selector, "Interrupted");
            Err(LocatorError::Cancelled)
        }
    }
}

fn print_human(report: &ResolveReport) {
    println!("Policy: {}", report.policy);
    for (idx, resolution) in report.resolutions.iter().enumerate() {
        match (&resolution.result, &resolution.error) {
            (Some(result), _) => println!(
                "{:>3}. {} -> {} via {} (confidence {:.2}, {})",
                idx + 1,
                resolution.selector,
                result.selector,
                result.strategy,
                result.confidence,
                humantime::format_duration(whole_millis(result.duration))
            ),
            (None, Some(error)) => println!(
                "{:>3}. {} failed [{}{}]: {}",
                idx + 1,
                resolution.selector,
                error.code,
                if error.retryable { ", retryable" } else { "" },
                error.message
            ),
            (None, None) => println!("{:>3}. {} unresolved", idx + 1, resolution.selector),
        }
    }

    let m = &report.metrics;
    println!();
    println!(
        "Requests: {}  succeeded: {}  success rate: {:.1}%  cache hit rate: {:.1}%",
        m.requests,
        m.successes,
        m.success_rate * 100.0,
        m.cache_hit_rate * 100.0
    );
    println!(
        "Analysis calls: structural {}  visual {}  rank {}  (estimated cost ${:.3})",
        report.analysis_calls.structural,
        report.analysis_calls.visual,
        report.analysis_calls.rank,
        m.estimated_cost
    );
    println!(
        "Health: {:?}  circuit {:?}",
        report.health.severity, report.health.circuit_state
    );
    for alert in &report.health.alerts {
        println!("  ! {}: {}", alert.code, alert.message);
    }
}

fn whole_millis(duration: Duration) -> Duration {
    Duration::from_millis(duration.as_millis() as u64)
}
