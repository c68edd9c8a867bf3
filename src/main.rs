use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use taskline::cli::commands::{RunCommand, ValidateCommand};
use taskline::cli::output::*;
use taskline::cli::{Cli, Command};
use taskline::core::config::{config_dir, resolve_continue_on_error, PipelineConfig};
use taskline::execution::{ExecutionEngine, PipelineObserver, RunOptions, ShellExecutor};
use taskline::watch::{PipelineJob, WatchScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Logs go to stderr so stdout stays clean for --json
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let exit_code = match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
    };

    std::process::exit(exit_code);
}

async fn run_pipeline(cmd: &RunCommand) -> Result<i32> {
    let config_path = Path::new(&cmd.file);
    let config = PipelineConfig::from_file(config_path).context("Failed to load pipeline config")?;

    let base_dir = config.base_dir(&config_dir(config_path)?);

    let options = RunOptions {
        continue_on_error: resolve_continue_on_error(config.continue_on_error, cmd.fail_fast),
        base_dir: base_dir.clone(),
        base_env: config.env.clone(),
    };

    let reporter: Arc<dyn PipelineObserver> = if cmd.json {
        Arc::new(JsonReporter)
    } else {
        Arc::new(PrettyReporter::new(&config.name))
    };
    let engine = ExecutionEngine::new(ShellExecutor::new(), options).with_observer(reporter);
    let steps = config.step_definitions();

    if !cmd.watch {
        let result = engine.execute(&steps).await;
        return Ok(result.exit_code);
    }

    let mut exclude = config.watch.exclude.clone();
    exclude.extend(cmd.exclude.iter().cloned());

    let mut scheduler = WatchScheduler::new(&base_dir, PipelineJob::new(engine, steps), &exclude)
        .context("Invalid watch configuration")?;

    if !cmd.json {
        println!("{}Watching {} (Ctrl-C to stop)", EYES, style(base_dir.display()).dim());
        scheduler.add_event_handler(|event| {
            if let Some(line) = format_watch_event(event) {
                println!("{}", line);
            }
        });
    }

    let stop = CancellationToken::new();
    let signal = stop.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, stopping watch mode");
                signal.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    let outcome = scheduler.run(stop).await;
    if let Some(reason) = &outcome.fallback_reason {
        info!(reason = %reason, "Watch mode ended without file watching");
    }
    Ok(outcome.exit_code)
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<i32> {
    match PipelineConfig::from_file(&cmd.file) {
        Ok(config) => {
            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{}", json);
            } else {
                println!("{}Pipeline configuration is valid!", CHECK);
                println!("  Name: {}", style(&config.name).bold());
                println!("  Steps: {}", style(config.steps.len()).cyan());
                for step in &config.steps {
                    println!("    {} {}", style(&step.id).cyan(), style(&step.command).dim());
                }
            }
            Ok(0)
        }
        Err(e) => {
            println!("{}Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            Ok(1)
        }
    }
}
