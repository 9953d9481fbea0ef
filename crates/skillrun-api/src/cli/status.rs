//! System status dashboard command.

use anyhow::Result;
use console::style;

use skillrun_types::run::RunState;

use crate::state::AppState;

/// Display run counts by state and the runner configuration.
pub async fn status(state: &AppState, json: bool) -> Result<()> {
    let counts = state.run_service.state_counts().await?;
    let total: u64 = counts.iter().map(|(_, n)| n).sum();
    let runner = &state.config.runner;

    if json {
        let by_state: serde_json::Map<String, serde_json::Value> = counts
            .iter()
            .map(|(s, n)| (s.as_str().to_string(), serde_json::json!(n)))
            .collect();
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "runs": {
                "total": total,
                "by_state": by_state,
            },
            "runner": runner,
            "server": state.config.server,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!("  {} skillrun v{}", style("⚡").bold(), env!("CARGO_PKG_VERSION"));
    println!();

    println!("  {}", style("── Runs ──").dim());
    println!("  Total:     {}", style(total).bold());
    for (run_state, n) in &counts {
        let label = format!("{}:", capitalize(run_state.as_str()));
        let value = match run_state {
            RunState::Queued | RunState::Running => style(n).yellow(),
            RunState::Succeeded => style(n).green(),
            RunState::Failed => style(n).red(),
            RunState::Cancelled => style(n).dim(),
        };
        println!("  {label:<10} {value}");
    }
    println!();

    println!("  {}", style("── Runner ──").dim());
    println!("  Workers:        {}", runner.worker_count());
    println!("  Queue capacity: {}", runner.capacity());
    println!("  Exec timeout:   {}s", runner.execution_timeout().as_secs());
    println!("  Stale after:    {}s", runner.stale_after().as_secs());
    println!("  Max attempts:   {}", runner.attempt_limit());
    println!();

    println!("  {}", style("── System ──").dim());
    println!("  Data dir: {}", style(state.data_dir.display()).dim());
    println!("  Listen:   {}:{}", state.config.server.host, state.config.server.port);
    println!("  Database: {}", style("SQLite (WAL mode)").dim());
    println!();

    Ok(())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("queued"), "Queued");
        assert_eq!(capitalize(""), "");
    }
}
