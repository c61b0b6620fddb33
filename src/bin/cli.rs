use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use integration_flows::pool::{PoolKind, TunerHandle};
use integration_flows::prelude::*;
use integration_flows::MetadataCatalog;
use serde_json::Value;
use tracing_subscriber::EnvFilter;
#[cfg(feature = "otel")]
use tracing_subscriber::layer::SubscriberExt;
#[cfg(feature = "otel")]
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "integration-flows")]
#[command(about = "Run declarative integration flows", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Bootstrap the configured adapters and run one flow
    Run {
        /// Id of the flow to run
        #[arg(value_name = "FLOW")]
        flow: String,

        /// Path to engine.yaml
        #[arg(short, long)]
        config: PathBuf,

        /// JSON file holding the inbound payload
        #[arg(short, long)]
        payload: Option<PathBuf>,

        /// Message header as KEY=VALUE (repeatable)
        #[arg(short = 'H', long = "header", value_name = "KEY=VALUE")]
        headers: Vec<String>,
    },

    /// Validate flow files or an engine config without running anything
    Validate {
        /// Path to a flow file, an engine config or a directory
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// Print the metadata of one adapter type and mode
    Metadata {
        #[arg(short = 't', long = "type")]
        adapter_type: AdapterType,

        #[arg(short, long)]
        mode: AdapterMode,
    },

    /// Bootstrap the configured adapters and print their status
    Adapters {
        /// Path to engine.yaml
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn log_filter(verbose: bool) -> &'static str {
    if verbose {
        "integration_flows=debug"
    } else {
        "integration_flows=info"
    }
}

#[cfg(feature = "otel")]
fn init_otel_tracing(verbose: bool) -> anyhow::Result<()> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::runtime::Tokio;
    use opentelemetry_sdk::trace::TracerProvider;

    let otlp_endpoint =
        std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").unwrap_or_else(|_| "http://localhost:4317".to_string());

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&otlp_endpoint)
        .build()
        .context("Failed to create OTLP exporter")?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .build();

    let tracer = provider.tracer("integration-flows");
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(EnvFilter::new(log_filter(verbose)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(otel_layer)
        .init();

    opentelemetry::global::set_tracer_provider(provider);
    Ok(())
}

#[cfg(not(feature = "otel"))]
fn init_tracing(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_filter(verbose)))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    #[cfg(feature = "otel")]
    if let Err(e) = init_otel_tracing(cli.verbose) {
        eprintln!("{:#}", e);
        return ExitCode::from(2);
    }

    #[cfg(not(feature = "otel"))]
    init_tracing(cli.verbose);

    let result = run(cli).await;

    #[cfg(feature = "otel")]
    opentelemetry::global::shutdown_tracer_provider();

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    match cli.command {
        Commands::Run {
            flow,
            config,
            payload,
            headers,
        } => run_flow(&flow, &config, payload.as_deref(), &headers).await,
        Commands::Validate { path } => validate(&path),
        Commands::Metadata { adapter_type, mode } => print_metadata(adapter_type, mode),
        Commands::Adapters { config } => list_adapters(&config).await,
    }
}

/// Pools, tuner, registry and manager built from one engine config
struct Runtime {
    registry: Arc<AdapterRegistry>,
    manager: AdapterManager,
    pools: Vec<Arc<ManagedPool>>,
    tuner: Option<TunerHandle>,
}

impl Runtime {
    async fn start(config: &EngineConfig) -> anyhow::Result<Self> {
        let database = ManagedPool::new(
            "database",
            PoolKind::Database,
            config.pools.database.max_size,
            config.pools.database.min_idle,
        )?;
        let http = ManagedPool::new(
            "http",
            PoolKind::Http,
            config.pools.http.max_size,
            config.pools.http.min_idle,
        )?;

        let tuner = if config.tuner.enabled {
            let tuner = Arc::new(PoolTuner::new(config.tuner.clone())?);
            tuner.register(database.clone());
            tuner.register(http.clone());
            Some(tuner.spawn())
        } else {
            None
        };

        let environment = AdapterEnvironment::new(database.clone(), http.clone());
        let registry = Arc::new(AdapterRegistry::new(AdapterFactories::builtin(), environment));
        let manager = AdapterManager::new(registry.clone(), Arc::new(InMemoryConfigurationRepository::new()));

        let report = manager.bootstrap(config.adapters.clone()).await;
        for failure in &report.failures {
            eprintln!("⚠ {}", failure);
        }
        tracing::info!(
            started = report.started.len(),
            failed = report.failures.len(),
            "Adapters bootstrapped"
        );

        Ok(Self {
            registry,
            manager,
            pools: vec![database, http],
            tuner,
        })
    }

    async fn shutdown(self) {
        for failure in self.manager.shutdown_all().await {
            eprintln!("⚠ {}", failure);
        }
        if let Some(tuner) = self.tuner {
            tuner.stop().await;
        }
        for pool in &self.pools {
            pool.close();
        }
    }
}

fn parse_headers(raw: &[String]) -> anyhow::Result<HashMap<String, String>> {
    raw.iter()
        .map(|header| -> anyhow::Result<(String, String)> {
            let (key, value) = header
                .split_once('=')
                .with_context(|| format!("Invalid header '{}', expected KEY=VALUE", header))?;
            Ok((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn read_payload(path: Option<&Path>) -> anyhow::Result<Value> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read payload {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("Payload {} is not valid JSON", path.display()))
        }
        None => Ok(Value::Object(serde_json::Map::new())),
    }
}

#[tracing::instrument(skip(config_path, payload, headers), fields(config = %config_path.display()))]
async fn run_flow(
    flow_id: &str,
    config_path: &Path,
    payload: Option<&Path>,
    headers: &[String],
) -> anyhow::Result<bool> {
    let config = EngineConfig::load(config_path)?;
    let headers = parse_headers(headers)?;
    let payload = read_payload(payload)?;

    let flows_dir = config
        .flows_dir
        .clone()
        .context("engine config does not declare a flows_dir")?;
    let flows = FlowLoader::load_directory(&flows_dir)?;

    let runtime = Runtime::start(&config).await?;
    let executor = FlowExecutor::new(runtime.registry.clone());
    for flow in flows {
        executor.register_flow(flow)?;
    }

    let outcome = execute(&executor, flow_id, payload, headers, config.default_timeout_ms).await;
    runtime.shutdown().await;

    let result = outcome?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.success)
}

/// Run a flow, cancelling it once the engine's default timeout elapses
async fn execute(
    executor: &FlowExecutor,
    flow_id: &str,
    payload: Value,
    headers: HashMap<String, String>,
    deadline_ms: u64,
) -> anyhow::Result<FlowExecutionResult> {
    let flow = executor
        .flow(flow_id)
        .ok_or_else(|| EngineError::FlowNotFound(flow_id.to_string()))?;
    if !flow.active {
        return Err(EngineError::FlowInactive(flow_id.to_string()).into());
    }

    let mut ctx = FlowExecutionContext::for_flow(&flow, payload);
    ctx.headers = headers;

    let cancel = CancellationFlag::new();
    let deadline = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(deadline_ms)).await;
            tracing::warn!("Flow exceeded {}ms, cancelling", deadline_ms);
            cancel.cancel();
        })
    };

    let result = executor.execute_with_cancel(&flow, ctx, &cancel).await;
    deadline.abort();
    Ok(result)
}

fn is_engine_config(path: &Path) -> bool {
    matches!(
        path.file_name().and_then(|n| n.to_str()),
        Some("engine.yaml") | Some("engine.yml")
    )
}

fn validate(path: &Path) -> anyhow::Result<bool> {
    if !path.exists() {
        anyhow::bail!("Path not found: {}", path.display());
    }

    if path.is_dir() {
        let flows = FlowLoader::load_directory(path)?;
        println!("✓ {} flows validated", flows.len());

        let mut valid = true;
        for name in ["engine.yaml", "engine.yml"] {
            let config_path = path.join(name);
            if config_path.exists() {
                valid &= validate_engine_config(&config_path)?;
            }
        }
        return Ok(valid);
    }

    if is_engine_config(path) {
        return validate_engine_config(path);
    }

    let flow = FlowLoader::load_file(path)?;
    println!("✓ {} ({}) is valid", path.display(), flow.id);
    Ok(true)
}

fn validate_engine_config(path: &Path) -> anyhow::Result<bool> {
    let config = EngineConfig::load(path)?;
    let registry = Arc::new(AdapterRegistry::builtin());
    let manager = AdapterManager::new(registry, Arc::new(InMemoryConfigurationRepository::new()));

    let mut valid = true;
    for adapter in &config.adapters {
        let label = adapter.id.as_deref().unwrap_or(&adapter.name);
        let result = manager.validate_configuration(adapter);
        if result.success {
            println!("  ✓ {} ({} {})", label, adapter.adapter_type, adapter.mode);
        } else {
            println!("  ✗ {} ({} {}): {}", label, adapter.adapter_type, adapter.mode, result.message);
            valid = false;
        }
    }

    println!(
        "{} {} validated, {} adapters",
        if valid { "✓" } else { "✗" },
        path.display(),
        config.adapters.len()
    );
    Ok(valid)
}

fn print_metadata(adapter_type: AdapterType, mode: AdapterMode) -> anyhow::Result<bool> {
    let metadata = MetadataCatalog::builtin().get(adapter_type, mode);
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(true)
}

async fn list_adapters(config_path: &Path) -> anyhow::Result<bool> {
    let config = EngineConfig::load(config_path)?;
    let runtime = Runtime::start(&config).await?;

    let summaries = runtime.manager.list_adapters().await?;
    let mut healthy = true;

    println!("Adapters in {}:\n", config_path.display());
    for summary in &summaries {
        let status = runtime.manager.get_adapter_status(&summary.id).await?;
        healthy &= status.success || !summary.active;
        println!(
            "  {} {} ({} {}) {}",
            if status.success { "✓" } else { "✗" },
            summary.id,
            summary.adapter_type,
            summary.mode,
            status.message
        );
    }
    if summaries.is_empty() {
        println!("  (none)");
    }

    runtime.shutdown().await;
    Ok(healthy && summaries.len() == config.adapters.len())
}
