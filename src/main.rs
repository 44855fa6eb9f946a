//! CortexOS CLI entry point

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::info;

use cortexos::cli::{AgentsCommand, Cli, Command, MemoryCommand};
use cortexos::config::Config;
use cortexos::engine::{Engine, EngineConfig, RunReport};
use cortexos::events::{spawn_event_logger, EventBus};
use cortexos::memory::{DisabledMemory, InMemoryStore, MemoryStore};
use cortexos::planner::{analyze_prompt, Planner};
use cortexos::provider::create_provider;
use cortexos::session::SessionWriter;
use cortexos::RoleRegistry;

fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let mut config = Config::load(cli.config.as_ref()).context("failed to load configuration")?;

    let exit_code = match cli.command {
        Command::Run {
            prompt,
            dir,
            budget,
            model,
            provider,
            no_memory,
            no_verify,
            dry_run,
            json,
        } => {
            // CLI overrides are the last configuration layer
            if let Some(provider) = provider {
                config.providers.default = provider;
            }
            if let Some(model) = model {
                config.providers.model = Some(model);
            }
            if let Some(budget) = budget {
                config.cost.budget_per_run = budget;
            }
            if no_memory {
                config.memory.enabled = false;
            }
            config.validate().context("invalid configuration")?;

            if dry_run {
                run_dry(&prompt, json)
            } else {
                run_engine(&config, &prompt, dir, no_verify, json).await?
            }
        }

        Command::Status { json } => show_status(&config, json),

        Command::Agents { command } => match command {
            AgentsCommand::List => {
                let registry = RoleRegistry::standard(config.agents.max_iterations);
                for role_config in registry.roles() {
                    println!(
                        "{:<14} temp {:.1}  tools: {}",
                        role_config.role.to_string().bold(),
                        role_config.temperature,
                        role_config.tools.join(", ")
                    );
                }
                0
            }
            AgentsCommand::Status => show_agent_status(&config),
        },

        Command::Memory { command } => run_memory_command(&config, command).await?,
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

fn run_dry(prompt: &str, json: bool) -> i32 {
    let analysis = analyze_prompt(prompt);
    let plan = Planner::new().plan(prompt, &analysis);

    if json {
        let value = serde_json::json!({
            "analysis": analysis,
            "tasks": plan.tasks,
            "waves": plan.waves,
        });
        println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
        return 0;
    }

    println!("{} {}", "intent:".bold(), analysis.intent);
    println!("{} {:.2}", "complexity:".bold(), analysis.complexity);
    println!("{} {} tasks in {} waves", "plan:".bold(), plan.task_count(), plan.wave_count());
    for (i, wave) in plan.waves.iter().enumerate() {
        println!("  wave {}{}", i + 1, if wave.parallel { " (parallel)" } else { "" });
        for task_id in &wave.tasks {
            if let Some(task) = plan.task(task_id) {
                println!("    [{}] {}", task.role, task.description);
            }
        }
    }
    0
}

async fn run_engine(config: &Config, prompt: &str, dir: PathBuf, no_verify: bool, json: bool) -> Result<i32> {
    let dir = dir.canonicalize().unwrap_or(dir);

    let provider = create_provider(&config.provider_chain()).context("failed to build provider chain")?;

    let memory: Arc<dyn MemoryStore> = if config.memory.enabled {
        Arc::new(
            InMemoryStore::with_snapshot(config.memory.decay_half_life_days, config.memory_path())
                .context("failed to open memory store")?,
        )
    } else {
        Arc::new(DisabledMemory)
    };

    let events = Arc::new(EventBus::with_default_capacity());
    let logger = spawn_event_logger(events.clone(), config.runs_dir());

    let mut engine_config = EngineConfig::from_config(config);
    engine_config.verify = !no_verify;

    let engine = Engine::new(config, engine_config, provider, memory, events)?;

    // Ctrl-C propagates as cooperative cancellation
    let cancel = engine.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling run");
            cancel.cancel("interrupted");
        }
    });

    let report = engine.run(prompt, dir).await?;
    logger.abort();

    print_report(&report, json);
    Ok(if report.success { 0 } else { 1 })
}

fn print_report(report: &RunReport, json: bool) {
    if json {
        let value = serde_json::json!({
            "run_id": report.context.run_id,
            "success": report.success,
            "tasks": report.plan.task_count(),
            "succeeded": report.context.succeeded_count(),
            "failed": report.context.failed_count(),
            "input_tokens": report.context.usage.input_tokens,
            "output_tokens": report.context.usage.output_tokens,
            "cost_usd": report.context.cost_usd,
            "results": report.context.results,
        });
        println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
        return;
    }

    let status = if report.success {
        "success".green().bold()
    } else {
        "failed".red().bold()
    };
    println!("{} {} ({})", "run".bold(), report.context.run_id, status);
    println!(
        "  {} succeeded, {} failed, {} tokens, ${:.4}",
        report.context.succeeded_count(),
        report.context.failed_count(),
        report.context.usage.total_tokens(),
        report.context.cost_usd
    );
    for result in &report.context.results {
        let mark = if result.success { "+".green() } else { "-".red() };
        let note = result.error.as_deref().unwrap_or("");
        println!("  {} [{}] {} {}", mark, result.role, result.task_id, note.dimmed());
    }
    for outcome in &report.gate_outcomes {
        let mark = if outcome.passed { "+".green() } else { "-".red() };
        println!("  {} gate {} (exit {})", mark, outcome.gate, outcome.exit_code);
    }
}

fn show_status(config: &Config, json: bool) -> i32 {
    let session = SessionWriter::new(config.runs_dir());
    let Some(run_id) = session.list_runs().into_iter().next() else {
        println!("no runs recorded");
        return 0;
    };

    match session.load(&run_id) {
        Ok(context) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&context).unwrap_or_default());
            } else {
                println!("{} {}", "run".bold(), context.run_id);
                println!("  stage: {}", context.stage);
                println!(
                    "  {} results ({} ok), {} tokens, ${:.4} spent, ${:.4} remaining",
                    context.results.len(),
                    context.succeeded_count(),
                    context.usage.total_tokens(),
                    context.cost_usd,
                    context.budget_remaining_usd
                );
            }
            0
        }
        Err(e) => {
            eprintln!("failed to load run {}: {}", run_id, e);
            1
        }
    }
}

fn show_agent_status(config: &Config) -> i32 {
    let session = SessionWriter::new(config.runs_dir());
    let Some(run_id) = session.list_runs().into_iter().next() else {
        println!("no runs recorded");
        return 0;
    };
    let Ok(context) = session.load(&run_id) else {
        println!("no readable run context");
        return 0;
    };

    println!("{} {}", "run".bold(), context.run_id);
    for result in &context.results {
        let status = if result.success { "ok".green() } else { "failed".red() };
        println!(
            "  {:<12} {}  {} in / {} out tokens",
            result.role.to_string(),
            status,
            result.usage.input_tokens,
            result.usage.output_tokens
        );
    }
    0
}

async fn run_memory_command(config: &Config, command: MemoryCommand) -> Result<i32> {
    let store = InMemoryStore::with_snapshot(config.memory.decay_half_life_days, config.memory_path())
        .context("failed to open memory store")?;

    match command {
        MemoryCommand::Stats => {
            let stats = store.stats().await;
            println!("{} entries", stats.entries);
        }
        MemoryCommand::Search { query, limit } => {
            let hits = store.recall(&query, limit).await?;
            if hits.is_empty() {
                println!("no matches");
            }
            for hit in hits {
                println!("{:.3}  {}", hit.score, hit.entry.text);
            }
        }
        MemoryCommand::Clear => {
            let removed = store.clear().await?;
            println!("cleared {} entries", removed);
        }
    }
    Ok(0)
}
