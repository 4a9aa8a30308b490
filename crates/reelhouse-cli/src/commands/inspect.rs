//! Show the contents of one archive.

use std::path::Path;

use anyhow::Context;
use serde_json::json;

use reelhouse_archive::Archive;

use super::{format_duration, format_epoch_ms, format_size};

pub async fn run(path: &Path, as_json: bool) -> anyhow::Result<()> {
    let archive = Archive::open(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let payload_bytes: usize = archive.events.iter().map(|e| e.payload.len()).sum();

    if as_json {
        let out = json!({
            "path": archive.path,
            "metadata": archive.metadata,
            "eventCount": archive.events.len(),
            "payloadBytes": payload_bytes,
            "markers": archive.markers,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let meta = &archive.metadata;
    println!("Archive: {}", archive.path.display());
    println!();
    println!("Subject:    {}", meta.subject_name);
    println!("Key:        {}", meta.recording_key);
    println!("Server:     {}", meta.server_name);
    println!("Started:    {}", format_epoch_ms(meta.date));
    if let Some(ended) = meta.ended_at {
        println!("Ended:      {}", format_epoch_ms(ended));
    }
    println!("Duration:   {}", format_duration(meta.duration));
    println!(
        "Format:     {} v{} ({})",
        meta.file_format, meta.file_format_version, meta.generator
    );
    println!("Protocol:   {} / {}", meta.protocol, meta.host_version);
    println!();
    println!(
        "Events:     {} ({})",
        archive.events.len(),
        format_size(payload_bytes as u64)
    );

    if !archive.markers.is_empty() {
        println!();
        println!("Markers:");
        for marker in &archive.markers {
            println!("  {:>10}  {}", format_duration(marker.time as u64 / 1000), marker.name);
        }
    }
    Ok(())
}
