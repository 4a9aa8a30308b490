//! List archives on disk.

use std::path::PathBuf;

use reelhouse_archive::{catalog, Archive};

use super::{format_duration, format_epoch_ms, format_size};
use crate::AppContext;

pub async fn run(ctx: &AppContext, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let root = dir.unwrap_or_else(|| ctx.config.recording.root.clone());
    let extension = &ctx.config.recording.extension;
    let entries = catalog::scan(&root, extension);

    if entries.is_empty() {
        println!("No archives found under {}", root.display());
        return Ok(());
    }

    println!("Archives under {} ({}):", root.display(), entries.len());
    println!();

    let mut corrupt = 0;
    for entry in &entries {
        let display = entry
            .path
            .strip_prefix(&root)
            .unwrap_or(&entry.path)
            .display()
            .to_string();
        match Archive::read_metadata(&entry.path) {
            Ok(meta) => println!(
                "  {}  {}  {:>10}  {:>9}  {}",
                format_epoch_ms(meta.date),
                meta.subject_name,
                format_duration(meta.duration),
                format_size(entry.len),
                display
            ),
            Err(e) => {
                corrupt += 1;
                tracing::debug!(path = %entry.path.display(), error = %e, "Unreadable archive");
                println!("  ✗ corrupt  {:>9}  {}", format_size(entry.len), display);
            }
        }
    }

    if corrupt > 0 {
        println!();
        println!("{} archive(s) could not be read; run `reelhouse inspect <path>` for details.", corrupt);
    }
    Ok(())
}
