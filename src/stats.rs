//! Index statistics.
//!
//! Summarizes what the last `jmem ingest` produced: embedding model,
//! dimensionality, chunk counts per journal file, build time, and whether a
//! profile is cached. Used by `jmem stats`.

use anyhow::Result;

use crate::config::Config;
use crate::index::sqlite::index_path;
use crate::index::SqliteIndex;

/// Run the stats command: open the index and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let profile_status = if config.profile.cache_path.exists() {
        "cached"
    } else {
        "not generated"
    };

    println!("Journal Memory: Index Stats");
    println!("===========================");
    println!();

    let Some(index) = SqliteIndex::open(&config.index.dir).await? else {
        println!("  Index:       none (run `jmem ingest`)");
        println!("  Profile:     {} ({})", profile_status, config.profile.cache_path.display());
        println!();
        return Ok(());
    };

    let path = index_path(&config.index.dir);
    let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
    let meta = index.meta().clone();
    let per_source = index.chunks_per_source().await?;

    println!("  Index:       {}", path.display());
    println!("  Size:        {}", format_bytes(size));
    println!("  Built:       {}", format_ts_relative(meta.built_at.timestamp()));
    println!("  Model:       {} ({} dims)", meta.model, meta.dims);
    println!();
    println!("  Documents:   {}", per_source.len());
    println!("  Chunks:      {}", meta.chunk_count);
    println!("  Profile:     {} ({})", profile_status, config.profile.cache_path.display());

    if !per_source.is_empty() {
        println!();
        println!("  {:<40} {:>8}", "SOURCE", "CHUNKS");
        println!("  {}", "-".repeat(49));
        for (source, chunks) in &per_source {
            println!("  {:<40} {:>8}", source, chunks);
        }
    }

    println!();

    index.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    let (n, unit) = match delta {
        d if d < 0 => return format_ts_iso(ts),
        d if d < 60 => return "just now".to_string(),
        d if d < 3600 => (d / 60, "min"),
        d if d < 86400 => (d / 3600, "hour"),
        d if d < 86400 * 30 => (d / 86400, "day"),
        _ => return format_ts_iso(ts),
    };
    format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn relative_times() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 120), "2 mins ago");
        assert_eq!(format_ts_relative(now - 3600), "1 hour ago");
        assert_eq!(format_ts_relative(now + 1000), format_ts_iso(now + 1000));
    }
}
