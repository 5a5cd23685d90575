use std::fmt;

use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: i64 = 86_400;

/// One ingested source file. `filename` is the identity key and never changes
/// between runs; `album_key` is the UTC midnight of the capture day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRecord {
    pub filename: String,
    pub capture_time: i64,
    pub album_key: i64,
}

impl PhotoRecord {
    /// Build a record, deriving the album key from the capture time.
    pub fn new(filename: impl Into<String>, capture_time: i64) -> Self {
        Self {
            filename: filename.into(),
            capture_time,
            album_key: album_key_for(capture_time),
        }
    }
}

/// Truncate a timestamp to the start of its UTC calendar day.
/// Uses floor division so pre-1970 timestamps land on the right day too.
pub fn album_key_for(capture_time: i64) -> i64 {
    capture_time.div_euclid(SECONDS_PER_DAY) * SECONDS_PER_DAY
}

/// The three objects kept in the blob store for every source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Original,
    Thumbnail,
    Medium,
}

impl Variant {
    /// Processing order within a single file.
    pub const ALL: [Variant; 3] = [Variant::Original, Variant::Thumbnail, Variant::Medium];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Original => "original",
            Variant::Thumbnail => "thumbnail",
            Variant::Medium => "medium",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key prefixes for the three variants. An object key is `prefix + filename`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyPrefixes {
    pub image: String,
    pub thumb: String,
    pub medium: String,
}

impl Default for KeyPrefixes {
    fn default() -> Self {
        Self {
            image: "image/".to_string(),
            thumb: "thumb/".to_string(),
            medium: "medium/".to_string(),
        }
    }
}

impl KeyPrefixes {
    pub fn prefix(&self, variant: Variant) -> &str {
        match variant {
            Variant::Original => &self.image,
            Variant::Thumbnail => &self.thumb,
            Variant::Medium => &self.medium,
        }
    }

    pub fn key(&self, variant: Variant, filename: &str) -> String {
        format!("{}{}", self.prefix(variant), filename)
    }
}

/// Upload counters per variant for a single run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VariantCounts {
    pub original: usize,
    pub thumbnail: usize,
    pub medium: usize,
}

impl VariantCounts {
    pub fn bump(&mut self, variant: Variant) {
        match variant {
            Variant::Original => self.original += 1,
            Variant::Thumbnail => self.thumbnail += 1,
            Variant::Medium => self.medium += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.original + self.thumbnail + self.medium
    }

    pub fn merge(&mut self, other: &VariantCounts) {
        self.original += other.original;
        self.thumbnail += other.thumbnail;
        self.medium += other.medium;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap().timestamp()
    }

    #[test]
    fn test_album_key_same_day_shared() {
        let morning = ts(2024, 1, 5, 10, 0, 0);
        let night = ts(2024, 1, 5, 23, 0, 0);
        assert_eq!(album_key_for(morning), album_key_for(night));
        assert_eq!(album_key_for(morning), ts(2024, 1, 5, 0, 0, 0));
    }

    #[test]
    fn test_album_key_across_midnight_differs() {
        // Two minutes apart, different calendar days
        let before = ts(2024, 1, 5, 23, 59, 0);
        let after = ts(2024, 1, 6, 0, 1, 0);
        assert_ne!(album_key_for(before), album_key_for(after));
    }

    #[test]
    fn test_album_key_exact_midnight_is_fixed_point() {
        let midnight = ts(2023, 12, 31, 0, 0, 0);
        assert_eq!(album_key_for(midnight), midnight);
    }

    #[test]
    fn test_album_key_before_epoch() {
        let t = ts(1969, 12, 31, 18, 0, 0);
        assert_eq!(album_key_for(t), ts(1969, 12, 31, 0, 0, 0));
    }

    #[test]
    fn test_record_new_derives_album_key() {
        let record = PhotoRecord::new("a.jpg", ts(2024, 1, 5, 10, 0, 0));
        assert_eq!(record.album_key, ts(2024, 1, 5, 0, 0, 0));
    }

    #[test]
    fn test_record_json_field_names() {
        let record = PhotoRecord::new("a.jpg", 86_400 + 5);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"filename":"a.jpg","captureTime":86405,"albumKey":86400}"#
        );
    }

    #[test]
    fn test_prefix_keys() {
        let prefixes = KeyPrefixes::default();
        assert_eq!(prefixes.key(Variant::Original, "a.jpg"), "image/a.jpg");
        assert_eq!(prefixes.key(Variant::Thumbnail, "a.jpg"), "thumb/a.jpg");
        assert_eq!(prefixes.key(Variant::Medium, "a.jpg"), "medium/a.jpg");
    }

    #[test]
    fn test_variant_counts() {
        let mut counts = VariantCounts::default();
        counts.bump(Variant::Original);
        counts.bump(Variant::Medium);
        counts.bump(Variant::Medium);
        let mut total = VariantCounts::default();
        total.merge(&counts);
        total.merge(&counts);
        assert_eq!(total.medium, 4);
        assert_eq!(total.total(), 6);
    }
}
