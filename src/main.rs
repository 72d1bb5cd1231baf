//! Cognitive Loop - Entry Point
//!
//! Replays a scripted list of cycles for one agent against the Ollama oracle,
//! checkpointing after every cycle so a replay can be resumed.

use std::sync::Arc;

use anyhow::Context;
use cognitive_loop::{CheckpointStore, CognitiveLoop, Config, CycleInput, OllamaOracle, OracleClient};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");
    let json_logs = args.iter().any(|a| a == "--json-logs");
    let script_path = arg_value(&args, "--script", "-s");
    let agent_id = arg_value(&args, "--agent", "-a").unwrap_or_else(|| "default".to_string());

    if help_mode || script_path.is_none() {
        println!("Cognitive Loop v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: cognitive-loop --script <cycles.json> [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --script, -s <FILE>  JSON array of cycles to replay");
        println!("  --agent, -a <ID>     Agent whose checkpoint to resume (default: default)");
        println!("  --json-logs          Log to stderr as JSON");
        println!("  --help, -h           Show this help");
        println!();
        println!("Environment variables:");
        println!("  OLLAMA_URL                     Ollama server (default: http://localhost:11434)");
        println!("  COGNITION_MODEL                Oracle model (default: llama3.2:3b)");
        println!("  COGNITION_DB_PATH              Checkpoint database path");
        println!("  COGNITION_ORACLE_TIMEOUT       Oracle timeout in seconds (default: 60)");
        println!("  COGNITION_MAX_GOALS            Active goal cap (default: 10)");
        println!("  COGNITION_MAX_ACTIVE_PLANS     Active plan cap (default: 3)");
        println!("  COGNITION_MAX_REPLANS          Replans per goal (default: 3)");
        println!("  COGNITION_GENERATION_INTERVAL  Cycles between goal generation (default: 5)");
        println!("  COGNITION_EXTRACTION_INTERVAL  Cycles between lesson extraction (default: 3)");
        println!("  COGNITION_DECAY_HOURS          Simulated hours per cycle (default: 0.5)");
        println!("  RUST_LOG                       trace, debug, info, warn or error");
        return Ok(());
    }

    // Setup logging
    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    if json_logs {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    info!("Cognitive Loop v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();
    let script_path = script_path.unwrap_or_default();
    let script = std::fs::read_to_string(&script_path).with_context(|| format!("reading {}", script_path))?;
    let cycles: Vec<CycleInput> = serde_json::from_str(&script).with_context(|| format!("parsing {}", script_path))?;

    let oracle = OllamaOracle::new(config.ollama.clone())?;
    if !oracle.is_available().await {
        warn!("Ollama not reachable at {}, cycles will run without the oracle", config.ollama.ollama_url);
    }
    info!("Oracle model: {}", oracle.model());

    let client = OracleClient::new(Arc::new(oracle))
        .with_timeout(config.oracle_timeout)
        .with_json_repair(config.repair_malformed_json);

    let store = CheckpointStore::open(&config.db_path)?;
    let cognition = match store.load(&agent_id)? {
        Some(snapshot) => {
            info!("Resuming agent {} from checkpoint", agent_id);
            CognitiveLoop::from_snapshot(client, &config, snapshot)
        }
        None => {
            info!("Starting agent {} fresh", agent_id);
            CognitiveLoop::new(client, &config)
        }
    };
    let cognition = cognition.into_shared();

    for (i, input) in cycles.into_iter().enumerate() {
        let mut guard = cognition.lock().await;
        let report = guard.run_cycle(input).await;

        println!("=== Cycle {} ===", i + 1);
        println!("{}", serde_json::to_string(&report)?);
        println!("{}", guard.format_for_prompt());
        println!();

        store.save(&agent_id, &guard.snapshot())?;
    }

    let stats = cognition.lock().await.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}

/// Value following `--long` or `-s`
fn arg_value(args: &[String], long: &str, short: &str) -> Option<String> {
    args.iter()
        .position(|a| a == long || a == short)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
