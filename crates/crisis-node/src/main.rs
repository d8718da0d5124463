//! crisis-node - Crisis Escalation Daemon
//!
//! Runs the escalation scheduler and the reporting aggregator against the
//! durable alert store, and exposes one-shot operator commands for
//! inspecting and resolving alerts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use crisis_engine::{
    AlertId, AlertStore, ClassificationContext, CrisisAlert, CrisisEngine, EngineConfig,
    EscalationScheduler, FileAlertStore, ReportingAggregator, SubjectId, TracingNotifier,
    TracingReportSink,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_LOG_FILTER: &str = "crisis_node=info,crisis_engine=info";

#[derive(Parser)]
#[command(name = "crisis-node")]
#[command(about = "Crisis alert escalation daemon")]
#[command(version)]
struct Cli {
    /// Path to config file (defaults are used when omitted)
    #[arg(short, long, global = true, env = "CRISIS_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the escalation scheduler and reporting aggregator
    Run,

    /// Write a config file with every default filled in
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = "crisis.json")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate the config file and print the effective settings
    CheckConfig,

    /// List unresolved alerts, most urgent first
    ListActive {
        /// Print alerts as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve an alert
    Resolve {
        /// Alert ID
        id: String,

        /// Who resolved it
        #[arg(long)]
        by: String,
    },

    /// Print the alert rollup for the configured window
    Report,

    /// Analyze a message and raise an alert if it carries risk
    AnalyzeText {
        /// Opaque subject ID
        #[arg(long)]
        subject: String,

        /// Message text
        #[arg(long)]
        text: String,

        /// Language tag
        #[arg(long, default_value = "en")]
        language: String,

        /// Prior contextual score
        #[arg(long)]
        prior_score: Option<f64>,

        /// Number of earlier alerts for this subject
        #[arg(long)]
        prior_alerts: Option<u32>,

        /// Session duration in seconds
        #[arg(long)]
        session_secs: Option<u64>,
    },
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Commands::Run => {
            let config = load_config(cli.config.as_deref())?;
            run_daemon(config).await?;
        }

        Commands::InitConfig { output, force } => {
            init_config(&output, force)?;
            println!("Config written to {}", output.display());
            println!();
            println!("Adjust deadlines and lexicons as needed, then run:");
            println!("  crisis-node --config {} run", output.display());
        }

        Commands::CheckConfig => {
            let config = load_config(cli.config.as_deref())?;
            print_config_summary(&config);
        }

        Commands::ListActive { json } => {
            let config = load_config(cli.config.as_deref())?;
            let store = open_store(&config)?;
            let alerts = store.list_active()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&alerts)?);
            } else {
                print_alerts(&alerts);
            }
        }

        Commands::Resolve { id, by } => {
            let config = load_config(cli.config.as_deref())?;
            let store = open_store(&config)?;
            let id: AlertId = id.parse()?;
            store.resolve(id, &by)?;
            println!("Alert {id} resolved by {by}");
        }

        Commands::Report => {
            let config = load_config(cli.config.as_deref())?;
            let store = open_store(&config)?;
            let aggregator =
                ReportingAggregator::new(store, Arc::new(TracingReportSink), config.reporting);
            let rollup = aggregator.rollup_at(Utc::now())?;
            println!("{}", serde_json::to_string_pretty(&rollup)?);
        }

        Commands::AnalyzeText {
            subject,
            text,
            language,
            prior_score,
            prior_alerts,
            session_secs,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let store = open_store(&config)?;
            let engine = CrisisEngine::new(&config, store, Arc::new(TracingNotifier::new()));
            let subject = SubjectId::new(subject)?;
            let context = build_context(prior_score, prior_alerts, session_secs);

            match engine.analyze_text(&subject, &text, &language, &context)? {
                Some(alert) => println!("{}", serde_json::to_string_pretty(&alert)?),
                None => println!("No risk detected"),
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => {
            let config = EngineConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

fn open_store(config: &EngineConfig) -> anyhow::Result<Arc<dyn AlertStore>> {
    let store = FileAlertStore::open(&config.store.path)
        .with_context(|| format!("failed to open alert store at {}", config.store.path.display()))?;
    Ok(Arc::new(store))
}

fn build_context(
    prior_score: Option<f64>,
    prior_alerts: Option<u32>,
    session_secs: Option<u64>,
) -> ClassificationContext {
    let mut context = ClassificationContext::new();
    if let Some(score) = prior_score {
        context = context.with_prior_score(score);
    }
    if let Some(count) = prior_alerts {
        context = context.with_prior_alert_count(count);
    }
    if let Some(secs) = session_secs {
        context = context.with_session_duration_secs(secs);
    }
    context
}

fn init_config(output: &Path, force: bool) -> anyhow::Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            output.display()
        );
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, EngineConfig::default().to_json()?)?;
    Ok(())
}

fn print_config_summary(config: &EngineConfig) {
    let deadlines = &config.escalation.deadlines;
    println!("Configuration OK");
    println!();
    println!("  Store: {}", config.store.path.display());
    println!("  Sweep interval: {}s", config.escalation.sweep_interval_secs);
    println!(
        "  Deadlines: critical {}s, high {}s, medium {}s, low {}s",
        deadlines.critical_secs, deadlines.high_secs, deadlines.medium_secs, deadlines.low_secs
    );
    println!(
        "  Reporting: every {}s over {}s",
        config.reporting.interval_secs, config.reporting.window_secs
    );
    println!(
        "  Lexicons: {}",
        config
            .keywords
            .lexicons
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    );
}

fn print_alerts(alerts: &[CrisisAlert]) {
    if alerts.is_empty() {
        println!("No active alerts");
        return;
    }

    println!("{} active alert(s):", alerts.len());
    println!();
    for alert in alerts {
        println!("  {} [{}] {}", alert.id, alert.severity, alert.trigger_type);
        println!("    Subject: {}", alert.subject_id);
        println!("    Created: {}", alert.created_at.to_rfc3339());
        if alert.escalated {
            println!("    Escalated: yes");
        }
        if !alert.risk_factors.is_empty() {
            println!("    Factors: {}", alert.risk_factors.join("; "));
        }
        println!();
    }
}

async fn run_daemon(config: EngineConfig) -> anyhow::Result<()> {
    let store = open_store(&config)?;
    info!(
        store = %config.store.path.display(),
        active = store.list_active()?.len(),
        "starting crisis-node"
    );

    let engine = CrisisEngine::new(&config, Arc::clone(&store), Arc::new(TracingNotifier::new()));
    let sink = Arc::new(TracingReportSink);
    let scheduler = Arc::new(
        EscalationScheduler::new(
            Arc::clone(&store),
            engine.dispatcher().clone(),
            config.escalation,
        )
        .with_sink(sink.clone()),
    );
    let aggregator = Arc::new(ReportingAggregator::new(store, sink, config.reporting));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = tokio::spawn(Arc::clone(&scheduler).run(shutdown_rx.clone()));
    let aggregator_task = tokio::spawn(Arc::clone(&aggregator).run(shutdown_rx));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received SIGINT, initiating shutdown"),
        Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
    }
    if shutdown_tx.send(true).is_err() {
        warn!("background loops already stopped");
    }

    for (name, task) in [("scheduler", scheduler_task), ("aggregator", aggregator_task)] {
        if let Err(e) = task.await {
            error!(task = name, error = %e, "background task failed");
        }
    }
    info!("crisis-node stopped");
    Ok(())
}
