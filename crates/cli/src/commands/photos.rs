use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use photosync_core::SyncConfig;

/// Accept an album key as epoch seconds or as a `YYYY-MM-DD` day.
pub(crate) fn parse_album_key(input: &str) -> Result<i64> {
    if let Ok(seconds) = input.parse::<i64>() {
        return Ok(photosync_core::domain::album_key_for(seconds));
    }
    let day = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .with_context(|| format!("invalid album key '{input}': expected epoch seconds or YYYY-MM-DD"))?;
    let midnight = day
        .and_hms_opt(0, 0, 0)
        .context("midnight is always valid")?;
    Ok(midnight.and_utc().timestamp())
}

pub fn run(config: &SyncConfig, albums: &[String]) -> Result<()> {
    let keys = albums
        .iter()
        .map(|a| parse_album_key(a))
        .collect::<Result<HashSet<i64>>>()?;
    let gallery = config.open_gallery()?;
    let photos = gallery.list_photos(&keys)?;
    println!("{}", serde_json::to_string_pretty(&photos)?);
    Ok(())
}
