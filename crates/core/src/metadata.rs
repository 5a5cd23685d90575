use std::io::BufReader;
use std::path::Path;

use exif::{In, Tag, Value};

use crate::domain::PhotoRecord;
use crate::error::{Error, Result};

/// Produces a record for a source file from its embedded metadata.
/// Failing here skips the file for the current run; no record is created.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, path: &Path, filename: &str) -> Result<PhotoRecord>;
}

/// Reads the capture time from EXIF tags.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExifExtractor;

/// Date tags in order of preference, each paired with its offset tag.
const DATE_TAGS: [(Tag, Tag); 3] = [
    (Tag::DateTimeOriginal, Tag::OffsetTimeOriginal),
    (Tag::DateTimeDigitized, Tag::OffsetTimeDigitized),
    (Tag::DateTime, Tag::OffsetTime),
];

impl MetadataExtractor for ExifExtractor {
    fn extract(&self, path: &Path, filename: &str) -> Result<PhotoRecord> {
        let capture_time = read_capture_time(path)?;
        Ok(PhotoRecord::new(filename, capture_time))
    }
}

/// Read the capture time (seconds since epoch, UTC) from a file's EXIF data.
/// Timestamps without an offset tag are taken as UTC.
pub fn read_capture_time(path: &Path) -> Result<i64> {
    let failed = |reason: String| Error::ExtractionFailed {
        path: path.to_path_buf(),
        reason,
    };

    let file = std::fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new()
        .read_from_container(&mut reader)
        .map_err(|e| failed(e.to_string()))?;

    for (date_tag, offset_tag) in DATE_TAGS {
        let Some(raw) = ascii_field(&exif, date_tag) else {
            continue;
        };
        let mut dt = match exif::DateTime::from_ascii(raw) {
            Ok(dt) => dt,
            Err(_) => continue,
        };
        if let Some(offset) = ascii_field(&exif, offset_tag) {
            // An unparseable offset leaves the timestamp as UTC
            let _ = dt.parse_offset(offset);
        }
        if let Some(ts) = to_timestamp(&dt) {
            return Ok(ts);
        }
    }

    Err(failed("no valid capture date tag".to_string()))
}

fn ascii_field(exif: &exif::Exif, tag: Tag) -> Option<&[u8]> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match field.value {
        Value::Ascii(ref parts) => parts.first().map(|p| p.as_slice()),
        _ => None,
    }
}

fn to_timestamp(dt: &exif::DateTime) -> Option<i64> {
    let naive = chrono::NaiveDate::from_ymd_opt(dt.year as i32, dt.month as u32, dt.day as u32)?
        .and_hms_opt(dt.hour as u32, dt.minute as u32, dt.second as u32)?;
    let offset_secs = dt.offset.map(|minutes| minutes as i64 * 60).unwrap_or(0);
    Some(naive.and_utc().timestamp() - offset_secs)
}
