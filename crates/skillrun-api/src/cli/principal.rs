//! Principal management CLI commands: create, list.

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use skillrun_core::repository::principal::PrincipalRepository;
use skillrun_infra::crypto::api_key::{generate_api_key, hash_api_key};
use skillrun_types::principal::Principal;

use crate::state::AppState;

/// Create a principal and print its API key.
///
/// Only the key's SHA-256 digest is stored, so the plaintext is shown once.
pub async fn create_principal(state: &AppState, name: &str, json: bool) -> Result<()> {
    let name = name.trim();
    anyhow::ensure!(!name.is_empty(), "principal name cannot be empty");

    let principal = Principal::new(name);
    let api_key = generate_api_key();
    state
        .principals
        .create(&principal, &hash_api_key(&api_key))
        .await
        .with_context(|| format!("failed to create principal '{name}'"))?;

    tracing::info!(principal_id = %principal.id, name, "principal created");

    if json {
        println!(
            "{}",
            serde_json::json!({
                "id": principal.id,
                "name": principal.name,
                "created_at": principal.created_at,
                "api_key": api_key,
            })
        );
        return Ok(());
    }

    println!();
    println!(
        "  {} Principal '{}' created ({})",
        style("✓").green().bold(),
        style(&principal.name).bold(),
        style(principal.id).dim()
    );
    println!();
    println!("  API key (save this -- it won't be shown again):");
    println!();
    println!("  {}", style(&api_key).yellow().bold());
    println!();

    Ok(())
}

/// List all principals.
pub async fn list_principals(state: &AppState, json: bool) -> Result<()> {
    let principals = state.principals.list().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&principals)?);
        return Ok(());
    }

    if principals.is_empty() {
        println!();
        println!(
            "  {} No principals yet. Create one with: {}",
            style("i").blue().bold(),
            style("skrun principal create <name>").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Name").fg(Color::White),
        Cell::new("ID").fg(Color::White),
        Cell::new("Created").fg(Color::White),
    ]);

    for principal in &principals {
        table.add_row(vec![
            Cell::new(&principal.name).fg(Color::Cyan),
            Cell::new(principal.id),
            Cell::new(principal.created_at.format("%Y-%m-%d %H:%M")),
        ]);
    }

    println!("{table}");
    Ok(())
}
