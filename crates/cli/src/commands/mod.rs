pub mod albums;
pub mod photos;
pub mod status;
pub mod sync;

/// Render an album key (UTC midnight, epoch seconds) as `YYYY-MM-DD`.
pub(crate) fn format_day(album_key: i64) -> String {
    chrono::DateTime::from_timestamp(album_key, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| album_key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_day() {
        assert_eq!(format_day(0), "1970-01-01");
        assert_eq!(format_day(1_704_412_800), "2024-01-05");
    }

    #[test]
    fn test_format_day_out_of_range_falls_back() {
        assert_eq!(format_day(i64::MAX), i64::MAX.to_string());
    }
}
