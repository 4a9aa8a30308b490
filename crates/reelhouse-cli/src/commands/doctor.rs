//! Diagnostic command to check the recording setup.

use std::path::Path;

use reelhouse_archive::{catalog, Archive};
use reelhouse_core::Config;

use crate::AppContext;

fn check_dir(label: &str, dir: &Path) {
    println!("{}: {:?}", label, dir);
    if !dir.exists() {
        println!("  ✗ Does not exist (will be created on first use)");
        return;
    }
    match write_probe(dir) {
        Ok(()) => println!("  ✓ Exists and is writable"),
        Err(e) => println!("  ✗ Not writable: {}", e),
    }
}

fn write_probe(dir: &Path) -> std::io::Result<()> {
    let probe = dir.join(".reelhouse-doctor");
    std::fs::write(&probe, b"")?;
    std::fs::remove_file(&probe)
}

pub async fn run(ctx: &AppContext) -> anyhow::Result<()> {
    println!("Running diagnostics...\n");
    let config = &ctx.config;

    // Check config file
    let config_file = Config::config_dir().join("config.toml");
    println!("Config file: {:?}", config_file);
    if config_file.exists() {
        println!("  ✓ Exists");
    } else {
        println!("  ✗ Does not exist (defaults in use)");
    }

    // Validate
    println!("\nValidation:");
    let result = config.validate();
    if result.issues.is_empty() {
        println!("  ✓ No issues");
    } else {
        for issue in &result.issues {
            println!("  ✗ {}: {}", issue.field, issue.message);
        }
    }

    println!();
    check_dir("Recording root", &config.recording.root);
    if config.instant_replay.enabled {
        println!();
        check_dir("Instant replay directory", &config.instant_replay.dir);
    }

    // Archives
    println!("\nArchives:");
    let root = config.recording.root.clone();
    let extension = config.recording.extension.clone();
    let (total, corrupt) = tokio::task::spawn_blocking(move || {
        let entries = catalog::scan(&root, &extension);
        let corrupt = entries
            .iter()
            .filter(|e| Archive::read_metadata(&e.path).is_err())
            .count();
        (entries.len(), corrupt)
    })
    .await?;
    println!("  {} archive(s) found", total);
    if corrupt > 0 {
        println!("  ✗ {} unreadable (unsealed or damaged)", corrupt);
    }

    // Retention
    println!("\nRetention:");
    if config.retention.is_active() {
        println!(
            "  ✓ Sweeping archives older than {} day(s) every {}h",
            config.retention.days, config.retention.interval_hours
        );
    } else {
        println!("  ✗ Disabled");
    }

    println!("\nDiagnostics complete.");
    Ok(())
}
