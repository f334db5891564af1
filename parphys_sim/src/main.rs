//! ParPhys Simulator CLI
//!
//! Run scenario workloads through the batch-scheduling engine.

use clap::Parser;
use parphys_core::{ConfigError, CostModel, EngineConfig, LinearCostModel};
use parphys_sim::exporter::write_formula_charts;
use parphys_sim::scenarios::ScenarioId;
use parphys_sim::{ScenarioResult, ScenarioRunner};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// ParPhys scenario CLI
#[derive(Parser, Debug)]
#[command(name = "parphys-sim")]
#[command(about = "Run batch-scheduling physics scenarios", long_about = None)]
struct Args {
    /// Master seed for determinism
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Objects per generated world
    #[arg(short, long, default_value = "100")]
    objects: usize,

    /// Worker threads (overrides --config)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Frames per scenario
    #[arg(short, long, default_value = "10")]
    frames: usize,

    /// Time step per frame
    #[arg(long, default_value = "0.1")]
    dt: f64,

    /// Maximum objects per batch
    #[arg(long)]
    max_batch_size: Option<usize>,

    /// Maximum predicted cost per batch
    #[arg(long)]
    max_batch_cost: Option<f64>,

    /// Per-frame deadline in milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// Always use the heuristic cost estimate
    #[arg(long)]
    no_predictor: bool,

    /// Linear cost model JSON file
    #[arg(long)]
    model: Option<String>,

    /// Engine configuration JSON file
    #[arg(long)]
    config: Option<String>,

    /// Scenario to run (constant_cost, increasing_cost, random_cost, exponential_cost,
    /// fault_isolation, deadline_overrun, broken_model, batch_ceiling, cancellation, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Export frames and reports to a JSON file (single scenario only)
    #[arg(long)]
    export: Option<String>,

    /// Write formula comparison charts to a JSON file
    #[arg(long)]
    formula_series: Option<String>,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn engine_config(args: &Args) -> Result<EngineConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(workers) = args.workers {
        config.worker_count = workers;
    }
    if let Some(max) = args.max_batch_size {
        config.max_batch_size = Some(max);
    }
    if let Some(max) = args.max_batch_cost {
        config.max_batch_cost = Some(max);
    }
    if let Some(ms) = args.deadline_ms {
        config.frame_deadline = Duration::from_millis(ms);
    }
    if args.no_predictor {
        config.predictor_enabled = false;
    }
    config.validate()?;
    Ok(config)
}

fn report(result: &ScenarioResult) {
    if result.passed {
        info!(
            "✓ {} (seed={}) PASSED | frames={} objects={} fallback={} worst_ratio={:.3}",
            result.scenario.name(),
            result.seed,
            result.frames_run,
            result.final_object_count,
            result.metrics.fallback_predicted,
            result.metrics.worst_balance_ratio,
        );
    } else {
        error!(
            "✗ {} (seed={}) FAILED: {}",
            result.scenario.name(),
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = if args.verbose {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("ParPhys Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let config = engine_config(&args).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    let model: Option<Arc<dyn CostModel>> = match &args.model {
        Some(path) => match LinearCostModel::from_json_file(path) {
            Ok(model) => {
                info!("Loaded cost model {} from {}", model.version, path);
                Some(Arc::new(model))
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        None => None,
    };

    if let Some(path) = &args.formula_series {
        match write_formula_charts(path) {
            Ok(()) => info!("Wrote formula charts to {}", path),
            Err(e) => {
                error!("Failed to write formula charts: {}", e);
                std::process::exit(1);
            }
        }
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            let names: Vec<&str> = ScenarioId::all().iter().map(|s| s.name()).collect();
            eprintln!("Available scenarios: {}, all", names.join(", "));
            std::process::exit(1);
        })]
    };

    let mut runner = ScenarioRunner::new(args.seed, args.objects)
        .with_frames(args.frames)
        .with_dt(args.dt)
        .with_config(config);
    if let Some(model) = model {
        runner = runner.with_model(model);
    }

    // Handle --export mode for visualization
    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            eprintln!("Error: --export only supports a single scenario, not 'all'");
            std::process::exit(1);
        }

        let (result, export) = runner.run_recorded(scenarios[0]);
        report(&result);
        if let Err(e) = export.write_to_file(export_path) {
            error!("Failed to write export: {}", e);
            std::process::exit(1);
        }
        info!("Exported {} frames to {}", export.frames.len(), export_path);

        if !result.passed {
            std::process::exit(1);
        }
        return;
    }

    let results: Vec<ScenarioResult> = scenarios.iter().map(|s| runner.run(*s)).collect();
    let failed_count = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed_count,
            "failed": failed_count,
            "results": results,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        for result in &results {
            report(result);
        }
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
