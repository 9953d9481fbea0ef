//! One-shot reconciliation command.

use anyhow::Result;
use console::style;

use crate::state::AppState;

/// Sweep stale runs once.
///
/// Requeued runs are picked up by the next `skrun serve` (startup replay) or
/// by a running server's own sweep of stale queued runs.
pub async fn reconcile(state: &AppState, json: bool) -> Result<()> {
    let report = state.reconciler().sweep().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("  {} Reconciliation complete", style("✓").green().bold());
    println!("  Requeued:    {}", report.requeued);
    println!("  Failed:      {}", style(report.failed).red());
    println!("  Re-enqueued: {}", report.reenqueued);
    println!();
    Ok(())
}
