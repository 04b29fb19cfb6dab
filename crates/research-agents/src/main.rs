use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use coordination::{ProgressEvent, WorkflowState};
use research_agents::{AgentFactory, AppConfig, FileConfig, LlmProvider};

/// Multi-agent research team: research, compress, critique, synthesize.
#[derive(Debug, Parser)]
#[command(name = "research-team", version, about)]
struct Cli {
    /// Research topic. Read from stdin when omitted.
    topic: Option<String>,

    /// Research rounds before a forced synthesis.
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Messages folded into one summary per compression pass.
    #[arg(long)]
    window: Option<usize>,

    /// TOML config file with [engine] and [provider] tables.
    #[arg(long, env = "RESEARCH_TEAM_CONFIG")]
    config: Option<PathBuf>,

    /// Override the text-generation provider (openai | anthropic).
    #[arg(long)]
    provider: Option<LlmProvider>,

    /// Override the model name.
    #[arg(long)]
    model: Option<String>,

    /// Print the final workflow state as JSON instead of the report.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is fine; keys may come from the real environment.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let topic = match cli.topic.clone() {
        Some(topic) => topic,
        None => prompt_topic()?,
    };
    if topic.trim().is_empty() {
        bail!("research topic must not be empty");
    }
    let topic = topic.trim().to_string();

    let factory = AgentFactory::new(&config.provider)?;
    let engine = factory.build_orchestrator(config.engine.clone())?;

    if !cli.json {
        println!("\n--- Starting Research Team for: {topic} ---\n");
    }

    let mut run = engine.start(topic);
    while let Some(event) = run.next_event().await {
        if !cli.json {
            print_event(&event);
        }
    }
    info!(history = %run.summary(), "Run complete");
    let state = run.into_state();

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&state).context("Failed to serialize workflow state")?
        );
    } else {
        print_report(&state);
    }
    Ok(())
}

/// Config file and environment, then CLI overrides.
fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut file = match &cli.config {
        Some(path) => FileConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => FileConfig::default(),
    };
    if let Some(provider) = cli.provider {
        file.provider.provider = Some(provider);
    }
    if let Some(model) = &cli.model {
        file.provider.model = Some(model.clone());
    }
    if let Some(max_iterations) = cli.max_iterations {
        file.engine.max_iterations = max_iterations;
    }
    if let Some(window) = cli.window {
        file.engine.compression_window_size = window;
    }
    AppConfig::from_file_config(file).context("Invalid configuration")
}

fn prompt_topic() -> Result<String> {
    print!("Enter research topic: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read research topic from stdin")?;
    Ok(line)
}

fn print_event(event: &ProgressEvent) {
    println!("\n[NODE COMPLETED]: {}", event.step);
    match event.latest_confidence {
        Some(confidence) => println!("Confidence: {confidence}"),
        None => println!("Confidence: N/A"),
    }
    if let Some(decision) = event.decision {
        println!("Decision: {decision}");
    }
}

fn print_report(state: &WorkflowState) {
    for failure in &state.turn_failures {
        warn!(
            step = %failure.step,
            agent = %failure.agent,
            iteration = failure.iteration,
            error = %failure.error,
            "Recovered failure during run"
        );
    }
    if let Some(error) = &state.compression_error {
        warn!(error = %error, "Last compression failed");
    }

    println!("\n=== Final Report ===\n");
    match state.final_report() {
        Some(report) => println!("{report}"),
        None => println!("(no report produced)"),
    }

    let sources = state.sources();
    if !sources.is_empty() {
        println!("\nSources:");
        for source in sources {
            println!("- {source}");
        }
    }
    let termination = state
        .termination
        .map(|t| t.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!(
        "\nIterations: {}  Termination: {termination}",
        state.iteration_count
    );
}
