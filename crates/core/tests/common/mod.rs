#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use exif::{In, Tag, Value};
use photosync_core::{BlobStore, Error, MetadataExtractor, PhotoRecord, Result};

/// In-memory blob store that counts calls and can be told to fail.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<BTreeMap<String, (Vec<u8>, String)>>,
    /// Remaining forced failures per key.
    fail_puts: Mutex<HashMap<String, usize>>,
    pub puts: AtomicUsize,
    pub probes: AtomicUsize,
    pub listings: AtomicUsize,
    pub fail_listing: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` uploads to `key` fail.
    pub fn fail_put(&self, key: &str, times: usize) {
        self.fail_puts.lock().unwrap().insert(key.to_string(), times);
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects.lock().unwrap().get(key).map(|(_, ct)| ct.clone())
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).map(|(bytes, _)| bytes.clone())
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

impl BlobStore for MemoryBlobStore {
    fn exists(&self, key: &str) -> Result<bool> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    fn put(&self, key: &str, content: &[u8], content_type: &str) -> Result<String> {
        {
            let mut failing = self.fail_puts.lock().unwrap();
            if let Some(remaining) = failing.get_mut(key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(Error::BlobUploadFailed {
                        key: key.to_string(),
                        message: "injected failure".to_string(),
                    });
                }
            }
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (content.to_vec(), content_type.to_string()));
        Ok(format!("mem://{key}"))
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Error::BlobListFailed("injected failure".to_string()));
        }
        Ok(self.keys())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Extractor with fixed capture times per filename; unknown names fail.
pub struct FixedTimes {
    times: HashMap<String, i64>,
    pub calls: AtomicUsize,
}

impl FixedTimes {
    pub fn new(entries: &[(&str, i64)]) -> Self {
        Self {
            times: entries.iter().map(|(n, t)| (n.to_string(), *t)).collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl MetadataExtractor for FixedTimes {
    fn extract(&self, path: &Path, filename: &str) -> Result<PhotoRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.times
            .get(filename)
            .map(|t| PhotoRecord::new(filename, *t))
            .ok_or_else(|| Error::ExtractionFailed {
                path: path.to_path_buf(),
                reason: "no capture time".to_string(),
            })
    }
}

/// Write a decodable JPEG with a colour pattern.
pub fn write_jpeg(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 3) as u8, (y * 3) as u8, ((x + y) * 2) as u8])
    });
    img.save(path).unwrap();
}

/// Write a JPEG carrying `DateTimeOriginal = date_time` ("YYYY:MM:DD HH:MM:SS").
pub fn write_jpeg_taken_at(path: &Path, date_time: &str) {
    write_jpeg(path, 64, 48);
    let jpeg = fs::read(path).unwrap();

    let field = exif::Field {
        tag: Tag::DateTimeOriginal,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![date_time.as_bytes().to_vec()]),
    };
    let mut writer = exif::experimental::Writer::new();
    writer.push_field(&field);
    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, false).unwrap();
    let tiff = tiff.into_inner();

    // SOI, then an APP1 Exif segment, then the rest of the original stream
    let mut out = vec![0xFF, 0xD8, 0xFF, 0xE1];
    out.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&jpeg[2..]);
    fs::write(path, out).unwrap();
}
