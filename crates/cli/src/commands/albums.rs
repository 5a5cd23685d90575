use std::collections::HashMap;

use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use photosync_core::query::list_albums;
use photosync_core::{PhotoRecord, PhotoStore, SyncConfig};

use super::format_day;

/// Photo count per album key.
pub(crate) fn album_counts(records: &[PhotoRecord]) -> HashMap<i64, usize> {
    let mut counts = HashMap::new();
    for record in records {
        *counts.entry(record.album_key).or_insert(0) += 1;
    }
    counts
}

pub fn run(config: &SyncConfig) -> Result<()> {
    let store = PhotoStore::open(&config.store_path)?;
    let albums = list_albums(&store);
    if albums.is_empty() {
        println!("No albums yet. Run 'photosync sync' first.");
        return Ok(());
    }
    let counts = album_counts(&store.all());

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![Cell::new("Day"), Cell::new("Album Key"), Cell::new("Photos")]);
    for key in albums {
        table.add_row(vec![
            Cell::new(format_day(key)),
            Cell::new(key),
            Cell::new(counts.get(&key).copied().unwrap_or(0)),
        ]);
    }
    println!("{table}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_album_counts() {
        let records = vec![
            PhotoRecord::new("a.jpg", 86_400 + 10),
            PhotoRecord::new("b.jpg", 86_400 + 20),
            PhotoRecord::new("c.jpg", 3 * 86_400),
        ];
        let counts = album_counts(&records);
        assert_eq!(counts[&86_400], 2);
        assert_eq!(counts[&(3 * 86_400)], 1);
    }

    #[test]
    fn test_album_counts_empty() {
        assert!(album_counts(&[]).is_empty());
    }
}
