use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use grindvakt_config::GrindvaktConfig;
use grindvakt_core::Direction;
use grindvakt_engine::{firewall_settings, Sentinel};
use grindvakt_prevention::{Enforcer, Firewall};
use grindvakt_telemetry::EventLogger;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(version, about = "Host-resident traffic enforcement")]
pub struct Cli {
    /// Configuration file; defaults to config/grindvakt.yaml plus overrides
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture live traffic and enforce rules until interrupted
    Run(RunArgs),
    /// Insert a drop rule for a target right away
    Block(TargetArgs),
    /// Remove a drop rule for a target
    Unblock(TargetArgs),
    /// List configured rules
    Rules,
    /// Load and validate the configuration
    CheckConfig,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Interface to capture on, overriding the configuration
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Extra rule as VALUE[=DIRECTION], may be repeated
    #[arg(short, long = "rule", value_parser = parse_rule_spec)]
    pub rules: Vec<RuleSpec>,
}

#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// IPv4 or IPv6 literal
    pub target: String,

    /// incoming, outgoing or both
    #[arg(short, long, default_value = "outgoing", value_parser = Direction::from_str)]
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSpec {
    pub value: String,
    pub direction: Direction,
}

fn parse_rule_spec(spec: &str) -> Result<RuleSpec, String> {
    let (value, direction) = match spec.split_once('=') {
        Some((value, direction)) => (
            value,
            direction.parse::<Direction>().map_err(|e| e.to_string())?,
        ),
        None => (spec, Direction::default()),
    };
    let value = value.trim();
    if value.is_empty() {
        return Err("rule value is empty".into());
    }
    Ok(RuleSpec {
        value: value.to_string(),
        direction,
    })
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<GrindvaktConfig> {
    match path {
        Some(path) => GrindvaktConfig::load_from_path(path)
            .with_context(|| format!("loading {}", path.display())),
        None => GrindvaktConfig::load().context("loading configuration"),
    }
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = load_config(cli.config.as_ref())?;
    if let Err(e) = EventLogger::init(&config.telemetry.log_level) {
        eprintln!("Logging already initialised: {e}");
    }

    match cli.command {
        Commands::Run(args) => {
            if args.interface.is_some() {
                config.capture.interface = args.interface;
            }
            run(config, args.rules).await
        }
        Commands::Block(args) => enforce(&config, &args, true),
        Commands::Unblock(args) => enforce(&config, &args, false),
        Commands::Rules => {
            list_rules(&config);
            Ok(())
        }
        Commands::CheckConfig => {
            check_config(&config);
            Ok(())
        }
    }
}

async fn run(config: GrindvaktConfig, extra: Vec<RuleSpec>) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let sentinel = tokio::task::spawn_blocking({
        let config = config.clone();
        move || Sentinel::start(&config)
    })
    .await
    .context("startup task failed")?
    .context("starting enforcement")?;

    let facade = sentinel.facade();
    for spec in extra {
        match facade.add_rule(&spec.value, spec.direction) {
            Ok(rule) => info!("Added rule {} for {}", rule.id, rule.value),
            Err(e) => warn!("Skipping rule {}: {e}", spec.value),
        }
    }

    info!(
        "Enforcing {} rules on {}; press Ctrl-C to stop",
        facade.rules().len(),
        sentinel.interface().unwrap_or_default()
    );
    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;

    let sentinel = Arc::new(sentinel);
    let summary = tokio::task::spawn_blocking({
        let sentinel = sentinel.clone();
        move || sentinel.stop()
    })
    .await
    .context("shutdown task failed")?;

    info!(
        "Captured {} frames ({} without an IP header)",
        summary.frames, summary.unresolved
    );
    if let Ok(stats) = facade.statistics(5) {
        info!("Blocked {} pairs: {:?}", stats.total, stats.by_direction);
    }
    if let Some(metrics) = sentinel.metrics() {
        match metrics.gather_metrics() {
            Ok(text) => debug!("Final metrics:\n{text}"),
            Err(e) => warn!("Failed to render metrics: {e}"),
        }
    }
    Ok(())
}

fn enforce(config: &GrindvaktConfig, args: &TargetArgs, block: bool) -> anyhow::Result<()> {
    let firewall = Firewall::new(firewall_settings(&config.prevention.firewall));
    let result = if block {
        firewall.block(&args.target, args.direction)
    } else {
        firewall.unblock(&args.target, args.direction)
    };
    result.context("firewall command failed")?;
    println!(
        "{} {} traffic for {}",
        if block { "Blocked" } else { "Unblocked" },
        args.direction,
        args.target
    );
    Ok(())
}

fn list_rules(config: &GrindvaktConfig) {
    if config.rules.is_empty() {
        println!("No rules configured");
        return;
    }
    println!("{:<40} {:<10} {:<12} ENABLED", "VALUE", "DIRECTION", "KIND");
    for rule in &config.rules {
        println!(
            "{:<40} {:<10} {:<12} {}",
            rule.value,
            rule.direction.as_str(),
            rule.kind.as_str(),
            rule.enabled
        );
    }
}

fn check_config(config: &GrindvaktConfig) {
    let capture = &config.capture;
    let firewall = &config.prevention.firewall;
    println!("Configuration OK");
    println!(
        "  capture:    interface={} promiscuous={} snaplen={} read_timeout={}ms",
        capture.interface.as_deref().unwrap_or("<first non-loopback>"),
        capture.promiscuous,
        capture.snaplen,
        capture.read_timeout_ms
    );
    println!(
        "  firewall:   {}/{} sudo={} chains={}/{} retry_failed={}",
        firewall.ipv4_command,
        firewall.ipv6_command,
        firewall.use_sudo,
        firewall.inbound_chain,
        firewall.outbound_chain,
        config.prevention.retry_failed
    );
    println!(
        "  telemetry:  log_level={} metrics={}",
        config.telemetry.log_level, config.telemetry.metrics.enabled
    );
    println!("  rules:      {}", config.rules.len());
}
