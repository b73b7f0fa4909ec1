//! Terminal rendering utilities.
//!
//! Script output goes to the matching standard stream untouched; status
//! lines go to stderr so piping stdout captures only what the script printed.

use console::{style, Emoji};
use scriptrun_core::RiskVerdict;
use scriptrun_sandbox::{ExecutionEvent, ExecutionResult, StreamKind, TerminationReason};
use std::io::Write;

static CHECK: Emoji = Emoji("✓", "+");
static CROSS: Emoji = Emoji("✗", "x");
static WARN: Emoji = Emoji("⚠", "!");

/// Write one line of script output to the stream it came from.
pub fn render_event(event: &ExecutionEvent) {
    match event.stream {
        StreamKind::Stdout => {
            let mut out = std::io::stdout().lock();
            let _ = out.write_all(event.text.as_bytes());
            let _ = out.flush();
        }
        StreamKind::Stderr => {
            let mut err = std::io::stderr().lock();
            let _ = err.write_all(event.text.as_bytes());
            let _ = err.flush();
        }
    }
}

/// Write captured output of an aggregated run.
pub fn render_output(result: &ExecutionResult) {
    print!("{}", result.stdout);
    let _ = std::io::stdout().flush();
    eprint!("{}", result.stderr);
}

/// Render the closing status line of a run.
pub fn render_summary(result: &ExecutionResult) {
    let elapsed = format!("{:.2}s", result.elapsed().as_secs_f64());

    match result.termination_reason {
        TerminationReason::Completed => match result.exit_code {
            Some(0) => eprintln!(
                "{} {} {}",
                style(CHECK).green(),
                style("exited with code 0").dim(),
                style(elapsed).dim(),
            ),
            Some(code) => eprintln!(
                "{} exited with code {} {}",
                style(CROSS).red(),
                style(code).red().bold(),
                style(elapsed).dim(),
            ),
            None => eprintln!(
                "{} {} {}",
                style(CROSS).red(),
                result.detail.as_deref().unwrap_or("terminated"),
                style(elapsed).dim(),
            ),
        },
        // stderr was already shown, so only the synthesized message is printed
        _ => {
            let message = result.error_message().unwrap_or_default();
            eprintln!("{} {}", style(CROSS).red(), style(message.trim_end()).red());
        }
    }

    if result.truncated {
        eprintln!("{} output exceeded the configured cap", style(WARN).yellow());
    }
    if let Some(err) = &result.cleanup_error {
        eprintln!(
            "{} failed to remove staged script: {}",
            style(WARN).yellow(),
            err
        );
    }
}

/// Render a screen verdict.
pub fn render_verdict(verdict: &RiskVerdict) {
    match &verdict.message {
        _ if verdict.allowed => println!("{} No dangerous patterns found", style(CHECK).green()),
        Some(message) => println!("{} {}", style(CROSS).red(), style(message).red()),
        None => println!("{} Script rejected", style(CROSS).red()),
    }
}

/// Render a single check line.
pub fn render_check(ok: bool, message: &str) {
    let indicator = if ok {
        style(CHECK).green()
    } else {
        style(CROSS).red()
    };
    println!("  {} {}", indicator, message);
}

/// Render a warning line.
pub fn render_warning(message: &str) {
    println!("  {} {}", style(WARN).yellow(), message);
}
