use anyhow::Result;
use photosync_core::blob::ExistenceCheck;
use photosync_core::config::BlobConfig;
use photosync_core::{PhotoRecord, PhotoStore, SyncConfig};

use super::format_day;

/// Aggregated statistics over the metadata store.
#[derive(Debug, PartialEq)]
pub(crate) struct Summary {
    pub(crate) records: usize,
    pub(crate) albums: usize,
    /// Album keys of the oldest and newest albums.
    pub(crate) span: Option<(i64, i64)>,
}

pub(crate) fn summarize(records: &[PhotoRecord]) -> Summary {
    let mut keys: Vec<i64> = records.iter().map(|r| r.album_key).collect();
    keys.sort_unstable();
    keys.dedup();
    Summary {
        records: records.len(),
        albums: keys.len(),
        span: keys.first().copied().zip(keys.last().copied()),
    }
}

fn backend_display(blob: &BlobConfig) -> String {
    match blob {
        BlobConfig::Filesystem { root } => format!("filesystem ({})", root.display()),
        BlobConfig::S3 { bucket, .. } => format!("s3 ({bucket})"),
    }
}

pub fn run(config: &SyncConfig) -> Result<()> {
    let store = PhotoStore::open(&config.store_path)?;
    let summary = summarize(&store.all());

    let source = match &config.source_dir {
        Some(p) => p.display().to_string(),
        None => "not configured".to_string(),
    };
    let strategy = match config.existence_check {
        ExistenceCheck::Probe => "probe",
        ExistenceCheck::Listing => "listing",
    };

    println!();
    println!("  Photosync Status");
    println!("  ================");
    println!();
    println!("   Records:     {:>8}        Store:    {}", summary.records, config.store_path.display());
    println!("   Albums:      {:>8}        Source:   {}", summary.albums, source);
    println!("   Concurrency: {:>8}        Backend:  {}", config.concurrency, backend_display(&config.blob));
    println!("   Existence:   {:>8}", strategy);
    if let Some((oldest, newest)) = summary.span {
        println!("   Range:       {} .. {}", format_day(oldest), format_day(newest));
    }
    println!();
    Ok(())
}
