mod cli;
mod shell_completion;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use cli::{Cli, Command};
use sweep::config::ProjectConfig;
use sweep::log::BatchLogger;
use sweep::orchestrator::{ConsoleObserver, ObserverSet, Orchestrator, TerminalMessage};
use sweep::surface::sim::Scenario;

fn config_source_label(config_path: Option<&Path>) -> String {
    config_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(defaults, no .sweep/config.toml found)".to_string())
}

fn push_kv(output: &mut String, key: &str, value: impl std::fmt::Display) {
    output.push_str(&format!("  {key:<20} {value}\n"));
}

fn push_list(output: &mut String, key: &str, values: &[String]) {
    if values.is_empty() {
        push_kv(output, key, "(none)");
        return;
    }
    for (i, value) in values.iter().enumerate() {
        push_kv(output, if i == 0 { key } else { "" }, value);
    }
}

fn render_config_human(config: &ProjectConfig, config_path: Option<&Path>) -> String {
    let t = &config.timing;
    let mut output = String::new();
    output.push_str("Timing\n");
    push_kv(&mut output, "poll_interval", format!("{}ms", t.poll_interval_ms));
    push_kv(
        &mut output,
        "removal_poll",
        format!("{}ms", t.removal_poll_interval_ms),
    );
    push_kv(&mut output, "delete_timeout", format!("{}ms", t.delete_timeout_ms));
    push_kv(&mut output, "confirm_timeout", format!("{}ms", t.confirm_timeout_ms));
    push_kv(&mut output, "removal_timeout", format!("{}ms", t.removal_timeout_ms));
    push_kv(&mut output, "settle_delay", format!("{}ms", t.settle_delay_ms));
    push_kv(&mut output, "recovery_delay", format!("{}ms", t.recovery_delay_ms));
    push_kv(&mut output, "start_delay", format!("{}ms", t.start_delay_ms));
    push_kv(
        &mut output,
        "yield",
        format!("every {} items, {}ms", t.yield_every, t.yield_pause_ms),
    );
    push_kv(&mut output, "watchdog", format!("{}ms", t.watchdog_timeout_ms));
    push_kv(&mut output, "terminal_hold", format!("{}ms", t.terminal_hold_ms));
    output.push('\n');

    output.push_str("Selectors\n");
    push_list(&mut output, "menu_trigger", &config.selectors.menu_trigger);
    push_list(&mut output, "overlay", &config.selectors.overlay);
    push_list(&mut output, "delete_control", &config.selectors.delete_control);
    push_list(&mut output, "confirm_control", &config.selectors.confirm_control);
    output.push('\n');

    output.push_str("Log\n");
    push_kv(&mut output, "execution_log", config.log.execution_log);
    output.push('\n');

    output.push_str("Source Path\n");
    push_kv(&mut output, "path", config_source_label(config_path));

    output
}

fn render_config_json(config: &ProjectConfig, config_path: Option<&Path>) -> Result<String> {
    let t = &config.timing;
    let payload = serde_json::json!({
        "timing": {
            "poll_interval_ms": t.poll_interval_ms,
            "removal_poll_interval_ms": t.removal_poll_interval_ms,
            "delete_timeout_ms": t.delete_timeout_ms,
            "confirm_timeout_ms": t.confirm_timeout_ms,
            "removal_timeout_ms": t.removal_timeout_ms,
            "settle_delay_ms": t.settle_delay_ms,
            "recovery_delay_ms": t.recovery_delay_ms,
            "start_delay_ms": t.start_delay_ms,
            "yield_every": t.yield_every,
            "yield_pause_ms": t.yield_pause_ms,
            "watchdog_timeout_ms": t.watchdog_timeout_ms,
            "terminal_hold_ms": t.terminal_hold_ms
        },
        "selectors": {
            "menu_trigger": &config.selectors.menu_trigger,
            "overlay": &config.selectors.overlay,
            "delete_control": &config.selectors.delete_control,
            "confirm_control": &config.selectors.confirm_control
        },
        "log": {
            "execution_log": config.log.execution_log
        },
        "source_path": config_source_label(config_path)
    });

    serde_json::to_string_pretty(&payload).context("failed to serialize config to JSON")
}

fn run_scenario(
    cwd: &Path,
    config: &ProjectConfig,
    config_path: Option<&Path>,
    scenario: &Path,
    no_log: bool,
    watchdog_secs: Option<u64>,
) -> Result<()> {
    let scenario = Scenario::load(scenario)?;
    let surface = scenario.into_surface();
    let items = surface.selected_items();

    let mut runtime = config.orchestrator_config();
    if let Some(secs) = watchdog_secs {
        runtime.watchdog_timeout = Duration::from_secs(secs);
    }
    let orchestrator = Arc::new(Orchestrator::new(surface, runtime));

    let on_interrupt = Arc::clone(&orchestrator);
    if let Err(e) = ctrlc::set_handler(move || {
        if on_interrupt.cancel() {
            println!("\x1b[36m[sweep]\x1b[0m cancelling after the current step...");
        }
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; cancellation unavailable");
    }

    let mut observers = ObserverSet::new();
    observers.push(Box::new(ConsoleObserver));
    if config.log.execution_log && !no_log {
        let log_dir = ProjectConfig::log_dir(cwd, config_path);
        info!(dir = %log_dir.display(), "writing execution log");
        observers.push(Box::new(BatchLogger::new(log_dir)));
    }

    let result = orchestrator.run_batch(items, &mut observers)?;
    let message = TerminalMessage::classify(&result);
    info!(
        state = ?result.state,
        affirmative = message.is_affirmative(),
        "sweep finished"
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let is_config_command = matches!(&cli.command, Command::Config { .. });

    let filter = match cli.verbose {
        0 if is_config_command => "sweep=warn",
        0 => "sweep=info",
        1 => "sweep=debug",
        _ => "sweep=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cwd = std::env::current_dir().context("failed to get current directory (was it deleted?)")?;
    let (config, config_path) = ProjectConfig::load(&cwd)?;

    if !is_config_command || cli.verbose > 0 {
        match config_path {
            Some(ref p) => info!("loaded config from {}", p.display()),
            None => info!("no .sweep/config.toml found, using defaults"),
        }
    }

    match cli.command {
        Command::Run {
            scenario,
            no_log,
            watchdog_secs,
        } => run_scenario(
            &cwd,
            &config,
            config_path.as_deref(),
            &scenario,
            no_log,
            watchdog_secs,
        ),
        Command::Config { json } => {
            if json {
                println!("{}", render_config_json(&config, config_path.as_deref())?);
            } else {
                print!("{}", render_config_human(&config, config_path.as_deref()));
            }
            Ok(())
        }
        Command::Completions { shell } => shell_completion::print(shell),
    }
}
