//! Diagnostic commands.

use console::style;
use scriptrun_core::config::SupervisorConfig;
use scriptrun_core::error::ConfigError;
use scriptrun_core::{paths, Screener};
use std::path::Path;
use std::process::{ExitCode, Stdio};
use std::time::Duration;

use crate::render::{render_check, render_warning};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Run the doctor command.
pub async fn run(config_path: Option<&Path>) -> anyhow::Result<ExitCode> {
    println!("scriptrun Doctor\n");

    let mut errors = 0;
    let mut warnings = 0;

    // Check directories
    println!("Checking directories...");

    match paths::base_dir() {
        Ok(dir) if dir.exists() => render_check(true, &format!("Base directory exists: {:?}", dir)),
        Ok(dir) => {
            render_warning(&format!("Base directory missing: {:?}", dir));
            warnings += 1;
        }
        Err(e) => {
            render_check(false, &format!("Failed to determine base directory: {}", e));
            errors += 1;
        }
    }

    // Check config
    println!("\nChecking configuration...");

    let loaded = match config_path {
        Some(path) => SupervisorConfig::load(path),
        None => SupervisorConfig::load_default(),
    };
    let mut config = match loaded {
        Ok(config) => {
            render_check(true, "Configuration loaded");
            config
        }
        Err(ConfigError::NotFound(_)) => {
            render_warning("Configuration file not found, using defaults");
            println!("    Run 'scriptrun config init' to create one");
            warnings += 1;
            SupervisorConfig::default()
        }
        Err(e) => {
            render_check(false, &format!("Configuration error: {}", e));
            errors += 1;
            SupervisorConfig::default()
        }
    };
    config.apply_env_overrides();

    match config.validate() {
        Ok(_) => render_check(true, "Configuration valid"),
        Err(e) => {
            render_check(false, &format!("Configuration invalid: {}", e));
            errors += 1;
        }
    }

    match Screener::from_config(&config.screen) {
        Ok(screener) if config.screen.enabled => render_check(
            true,
            &format!("Risk screen active ({} patterns)", screener.patterns().len()),
        ),
        Ok(_) => {
            render_warning("Risk screen disabled");
            warnings += 1;
        }
        Err(e) => {
            render_check(false, &format!("Risk screen failed to build: {}", e));
            errors += 1;
        }
    }

    // Check uploads directory
    println!("\nChecking uploads directory...");

    let uploads = &config.uploads.dir;
    if uploads.is_dir() {
        render_check(true, &format!("Uploads directory exists: {:?}", uploads));
    } else {
        render_warning(&format!(
            "Uploads directory missing (created on first run): {:?}",
            uploads
        ));
        warnings += 1;
    }

    // Check interpreter
    println!("\nChecking interpreter...");

    let interpreter = &config.execution.interpreter;
    match probe_interpreter(interpreter).await {
        Ok(version) => render_check(true, &format!("{} found: {}", interpreter, version)),
        Err(e) => {
            render_check(false, &format!("{} unavailable: {}", interpreter, e));
            errors += 1;
        }
    }

    // Summary
    println!("\n{}", style("Summary").bold());
    println!("  Errors: {}", if errors > 0 { style(errors).red() } else { style(errors).green() });
    println!("  Warnings: {}", if warnings > 0 { style(warnings).yellow() } else { style(warnings).green() });

    Ok(if errors > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Start the interpreter with `--version` and report the first line it prints.
async fn probe_interpreter(interpreter: &str) -> anyhow::Result<String> {
    let output = tokio::process::Command::new(interpreter)
        .arg("--version")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(PROBE_TIMEOUT, output)
        .await
        .map_err(|_| anyhow::anyhow!("no response within {}s", PROBE_TIMEOUT.as_secs()))??;

    // Older Pythons print the version on stderr
    let text = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).into_owned()
    } else {
        String::from_utf8_lossy(&output.stdout).into_owned()
    };
    Ok(text.lines().next().unwrap_or("version unknown").trim().to_string())
}
