//! Plotline CLI: check branching scenarios for consistency.
//!
//! Usage:
//!   plotline validate <scenario>
//!   plotline evaluate <scenario> [--classifications file] [--max-paths n] [--max-depth n] [--json]
//!
//! Exit status is 0 when the scenario is consistent, 2 when it is not and
//! 1 on any error.

use clap::{Parser, Subcommand};
use plotline::analysis::{EvaluationRequest, StaticClassifier};
use plotline::graph::{InMemoryScenarioStore, ScenarioStore};
use plotline::{ConsistencyEvaluator, EngineConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "plotline",
    version,
    about = "Consistency checker for branching narrative scenarios"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to a YAML config file (defaults to the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Report structural problems in a scenario file
    Validate {
        /// Scenario file (.json, .yaml or .yml)
        scenario: PathBuf,
    },
    /// Evaluate every path through a scenario
    Evaluate {
        /// Scenario file (.json, .yaml or .yml)
        scenario: PathBuf,
        /// JSON table of per-scene entity classifications
        #[arg(long)]
        classifications: Option<PathBuf>,
        /// Maximum number of paths (0 for unlimited)
        #[arg(long)]
        max_paths: Option<usize>,
        /// Maximum scenes per path (0 for unlimited)
        #[arg(long)]
        max_depth: Option<usize>,
        /// Only evaluate paths through this scene (repeatable)
        #[arg(long = "target")]
        targets: Vec<String>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plotline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<EngineConfig, String> {
    match path {
        Some(path) => EngineConfig::load(&path),
        None => EngineConfig::load_default(),
    }
    .map_err(|e| format!("Failed to load config: {}", e))
}

fn load_scenario(store: &InMemoryScenarioStore, path: &Path) -> Result<plotline::ScenarioId, String> {
    store
        .insert_file(path)
        .map_err(|e| format!("Failed to read scenario '{}': {}", path.display(), e))
}

async fn cmd_validate(scenario: &Path) -> i32 {
    let store = InMemoryScenarioStore::new();
    let id = match load_scenario(&store, scenario) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let graph = match store.load(&id).await {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let issues = graph.validate();
    if issues.is_empty() {
        println!("Scenario '{}' ({} scenes): no structural issues", id, graph.scene_count());
        return 0;
    }
    println!("{:<10}  {}", "SEVERITY", "ISSUE");
    println!("{}", "-".repeat(72));
    for issue in &issues {
        println!("{:<10}  {}", issue.severity.to_string(), issue.summary());
    }
    if issues.iter().any(|i| i.severity >= plotline::Severity::High) {
        2
    } else {
        0
    }
}

struct EvaluateArgs {
    scenario: PathBuf,
    classifications: Option<PathBuf>,
    max_paths: Option<usize>,
    max_depth: Option<usize>,
    targets: Vec<String>,
    json: bool,
}

async fn cmd_evaluate(config: EngineConfig, args: EvaluateArgs) -> i32 {
    let store = Arc::new(InMemoryScenarioStore::new());
    let id = match load_scenario(&store, &args.scenario) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let mut evaluator = ConsistencyEvaluator::new(store).with_config(config);
    if let Some(path) = &args.classifications {
        let table = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|raw| StaticClassifier::from_json(&raw).map_err(|e| e.to_string()));
        match table {
            Ok(classifier) => evaluator = evaluator.with_classifier(Arc::new(classifier)),
            Err(e) => {
                eprintln!("Error: cannot read classifications '{}': {}", path.display(), e);
                return 1;
            }
        }
    }

    let mut request = EvaluationRequest::new(id);
    request.max_paths = args.max_paths;
    request.max_depth = args.max_depth;
    for target in args.targets {
        request = request.with_target(target);
    }

    let response = evaluator.evaluate(&request).await;
    let Some(result) = response.result.as_ref().filter(|_| response.success) else {
        eprintln!("Error: {}", response.error.clone().unwrap_or_default());
        return 1;
    };

    if args.json {
        match serde_json::to_string_pretty(&response) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    } else {
        println!(
            "Scenario '{}': score {:.2}, {}{}",
            result.scenario_id,
            result.score,
            result.assessment,
            if result.fully_explored() { "" } else { " (partial exploration)" }
        );
        println!("{} paths evaluated, {} issues", result.paths.len(), result.issues.len());
        if !result.issues.is_empty() {
            println!();
            println!("{:<10}  {:<28}  {:<16}  {}", "SEVERITY", "TYPE", "SCENE", "SUMMARY");
            println!("{}", "-".repeat(96));
            for issue in &result.issues {
                let issue_type = serde_json::to_value(issue.issue_type)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default();
                println!(
                    "{:<10}  {:<28}  {:<16}  {}",
                    issue.severity.to_string(),
                    issue_type,
                    issue.primary_scene().map(|s| s.as_str()).unwrap_or("-"),
                    issue.summary
                );
            }
        }
    }

    if result.is_consistent {
        0
    } else {
        2
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let config = match load_config(cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Validate { scenario } => cmd_validate(&scenario).await,
        Commands::Evaluate {
            scenario,
            classifications,
            max_paths,
            max_depth,
            targets,
            json,
        } => {
            let args = EvaluateArgs {
                scenario,
                classifications,
                max_paths,
                max_depth,
                targets,
                json,
            };
            cmd_evaluate(config, args).await
        }
    };
    std::process::exit(code);
}
