use anyhow::{Context, Result};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use std::path::Path;
use std::sync::Arc;

use rolesync_core::batch::{BatchProgress, ProgressFn};
use rolesync_core::config::load_config;
use rolesync_core::registry::SyncRegistry;
use rolesync_core::{AuditRequest, DirectorySink, HttpNodeAdapter, SyncEngine};
use rolesync_types::models::{
    AppConfig, MemberId, NodeChange, NodeId, ReconciliationReport, SyncMode,
};

pub fn require_token(token: Option<String>) -> Result<String> {
    token
        .filter(|t| !t.trim().is_empty())
        .context("API token missing: pass --token or set ROLESYNC_TOKEN")
}

pub fn load(path: &Path) -> Result<AppConfig> {
    let (config, warnings) =
        load_config(path).with_context(|| format!("Failed to load {}", path.display()))?;
    for warning in &warnings {
        println!("{} {}", "warning:".yellow().bold(), warning);
    }
    Ok(config)
}

pub fn handle_check_config(path: &Path) -> Result<()> {
    let config = load(path)?;
    let registry = SyncRegistry::from_config(&config);

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    let mut header =
        vec![Cell::new("Sync ID"), Cell::new(format!("{} (main)", registry.main_node()))];
    header.extend(registry.synced_nodes().iter().map(Cell::new));
    table.set_header(header);

    for (sync_id, roles) in registry.groups() {
        let mut row = vec![Cell::new(sync_id)];
        for node in registry.nodes() {
            let on_node: Vec<String> =
                roles.iter().filter(|(n, _)| n == node).map(|(_, r)| r.to_string()).collect();
            row.push(if on_node.is_empty() {
                Cell::new("-").fg(Color::DarkGrey)
            } else {
                Cell::new(on_node.join(", "))
            });
        }
        table.add_row(row);
    }

    println!("{table}");
    println!(
        "\n{} {} synced nodes, direction {:?}",
        "✓".green(),
        config.synced_nodes.len(),
        config.direction
    );
    Ok(())
}

pub async fn handle_audit(
    config_path: &Path,
    token: Option<String>,
    node: String,
    mode: SyncMode,
    requester: String,
    json: bool,
) -> Result<()> {
    let config = load(config_path)?;
    let token = require_token(token)?;
    let adapter = Arc::new(HttpNodeAdapter::new(&config.api, token)?);
    let sink = Arc::new(DirectorySink::new(config.reports.output_dir.clone()));
    let progress: ProgressFn = Arc::new(|p: &BatchProgress| println!("{}", p.message().cyan()));
    let engine = SyncEngine::new(config, adapter, sink.clone(), Some(progress))?;

    let request =
        AuditRequest { node: NodeId::new(node), requester: MemberId::new(requester), mode };
    let report = engine.audit(&request).await?;

    if json {
        println!("{}", report.differences_json()?);
        return Ok(());
    }
    print_report(&report);
    println!("Report written to {}", sink.results_path(&report).display());
    Ok(())
}

fn print_report(report: &ReconciliationReport) {
    if report.members_with_differences.is_empty() {
        println!("{}", "No differences found.".green());
    } else {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Member", "Node", "Add", "Remove", "Failed"]);
        for member in &report.members_with_differences {
            for node in &member.nodes {
                let (add, remove, failed) = match &node.change {
                    NodeChange::Pending { roles_to_add, roles_to_remove } => {
                        (roles_to_add, roles_to_remove, None)
                    },
                    NodeChange::Applied { roles_added, roles_removed, failed } => {
                        (roles_added, roles_removed, Some(failed))
                    },
                };
                let failed = match failed {
                    Some(f) if !f.is_empty() => Cell::new(f.join("\n")).fg(Color::Red),
                    _ => Cell::new("-"),
                };
                table.add_row(vec![
                    Cell::new(&member.display_name),
                    Cell::new(&node.node_name),
                    Cell::new(add.join(", ")).fg(Color::Green),
                    Cell::new(remove.join(", ")).fg(Color::Yellow),
                    failed,
                ]);
            }
        }
        println!("{table}");
    }

    let problems = report.errors.iter().filter(|e| !e.is_skip()).count();
    if problems > 0 {
        println!("{} {} errors, see the error log", "!".red().bold(), problems);
    }
    println!("{}", report.summary());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_require_token() {
        assert!(require_token(None).is_err());
        assert!(require_token(Some("  ".into())).is_err());
        assert_eq!(require_token(Some("abc".into())).unwrap(), "abc");
    }

    #[test]
    fn test_check_config_accepts_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"{
                "mainNode": { "id": "main", "roles": [{ "id": "vip", "syncId": 5 }] },
                "syncedNodes": [{ "id": "a", "roles": [{ "id": "vip-a", "syncIds": [5] }] }]
            }"#,
        )
        .unwrap();
        handle_check_config(file.path()).unwrap();
    }

    #[test]
    fn test_check_config_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(handle_check_config(&dir.path().join("missing.json")).is_err());
    }
}
