//! One-shot retention sweep.

use std::time::{Duration, SystemTime};

use reelhouse_session::scheduler::run_sweeps;
use reelhouse_session::RetentionSweep;

use crate::AppContext;

pub async fn run(ctx: &AppContext, days: Option<i64>, dry_run: bool) -> anyhow::Result<()> {
    let config = &ctx.config;
    let days = days.unwrap_or(config.retention.days);
    let extension = &config.recording.extension;

    let mut sweeps = Vec::new();
    match RetentionSweep::days(&config.recording.root, extension, days) {
        Some(sweep) => sweeps.push(sweep.dry_run(dry_run)),
        None => println!("Retention disabled (days = {}); recordings are kept.", days),
    }

    let replay = &config.instant_replay;
    if replay.enabled && replay.expire_minutes > 0 {
        let max_age = Duration::from_secs(replay.expire_minutes as u64 * 60);
        sweeps.push(RetentionSweep::new(&replay.dir, extension, max_age).dry_run(dry_run));
    }

    if sweeps.is_empty() {
        return Ok(());
    }

    let report = tokio::task::spawn_blocking(move || run_sweeps(&sweeps, SystemTime::now())).await?;

    let verb = if dry_run { "Would delete" } else { "Deleted" };
    for path in &report.deleted {
        println!("  {} {}", verb, path.display());
    }
    for (path, error) in &report.failed {
        println!("  ✗ {}: {}", path.display(), error);
    }
    println!();
    println!(
        "{} {} archive(s), kept {}, {} failure(s).",
        verb,
        report.deleted.len(),
        report.kept,
        report.failed.len()
    );
    Ok(())
}
