//! Lodestar probe: dispatch a few calls through a configured service call
//! and print the readiness report.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use lodestar_runtime::health::{invoke_readiness, render_report, ExposureLevel, ReportOptions};
use lodestar_runtime::{
    CallOutcome, HealthCheckRegistry, HealthCheckService, RuntimeConfig, ServiceCallConfig,
    ServiceCallFactory, ServiceContext, ServiceLoadBalancer, ServiceRegistry,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Lodestar probe
#[derive(Parser, Debug)]
#[command(name = "lodestar-probe")]
#[command(about = "Dispatch calls through a Lodestar service call and report readiness")]
#[command(version)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// JSON configuration file
    #[arg(short, long, env = "LODESTAR_CONFIG")]
    config: Option<String>,

    /// Static servers (`name@host:port,...`) used when no configuration is given
    #[arg(long, conflicts_with = "config")]
    servers: Option<String>,

    /// Service call to dispatch through (default: the first configured one)
    #[arg(short, long)]
    service: Option<String>,

    /// Number of calls to dispatch
    #[arg(short = 'n', long, default_value_t = 1)]
    calls: u32,

    /// Report exposure level: full, default or oneline
    #[arg(long)]
    exposure_level: Option<ExposureLevel>,

    /// Include error debug output in the report
    #[arg(long)]
    stack_trace: bool,

    /// Include check details in the report
    #[arg(long)]
    data: bool,
}

fn load_config(args: &Args) -> Result<RuntimeConfig> {
    let mut config = match (&args.config, &args.servers) {
        (Some(path), _) => RuntimeConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {path}"))?,
        (None, Some(servers)) => {
            let name = servers
                .split('@')
                .next()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .context("Cannot derive a service name from --servers")?;
            let config = RuntimeConfig {
                service_calls: vec![ServiceCallConfig::with_static_servers(
                    name,
                    servers.as_str(),
                )],
                ..RuntimeConfig::default()
            };
            config.validate()?;
            config
        }
        (None, None) => anyhow::bail!("either --config or --servers is required"),
    };
    if let Some(level) = args.exposure_level {
        config.health.exposure_level = level;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());
    if args.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = load_config(&args)?;
    let service = match &args.service {
        Some(name) => name.clone(),
        None => config
            .service_calls
            .first()
            .map(|call| call.name.clone())
            .context("Configuration has no service calls")?,
    };

    let services = ServiceRegistry::new();
    let health = Arc::new(HealthCheckRegistry::new());
    services.register_arc(Arc::clone(&health));
    services.register(HealthCheckService::new(
        Arc::clone(&health),
        config.health.poll_interval(),
    ));
    let balancers = ServiceCallFactory::new().install(&config, &services, &health)?;
    let balancer = balancers
        .get(&service)
        .with_context(|| format!("Unknown service call '{service}'"))?;

    let ctx = ServiceContext::new(config);
    services.init_all(&ctx).await?;

    for call in 1..=args.calls {
        let chosen = balancer.process(&service, &mut |_| Ok(CallOutcome::Done));
        match chosen {
            Ok(endpoint) => println!("call {call}: {endpoint} ({})", endpoint.address()),
            Err(err) => println!("call {call}: failed: {err}"),
        }
    }

    let results = invoke_readiness(&health)?;
    let options = ReportOptions {
        include_stack_trace: args.stack_trace,
        include_data: args.data,
    };
    let report = render_report(&results, health.exposure_level(), true, options);
    println!("{}", serde_json::to_string_pretty(&report)?);

    services.shutdown_all(false).await?;
    info!("probe finished");
    Ok(())
}
