use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::blob::{BlobStore, ExistenceCheck, ExistenceChecker};
use crate::config::{
    DEFAULT_CONCURRENCY, DEFAULT_MEDIUM_HEIGHT, DEFAULT_THUMBNAIL_HEIGHT,
};
use crate::domain::{KeyPrefixes, Variant, VariantCounts};
use crate::error::{Error, Result};
use crate::metadata::MetadataExtractor;
use crate::resize::{DerivativeGenerator, TargetSize};
use crate::store::PhotoStore;

/// Knobs for a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Number of files processed at the same time.
    pub concurrency: usize,
    pub existence_check: ExistenceCheck,
    /// Rewrite the store file after every new record instead of only at the end.
    pub persist_each_insert: bool,
    pub prefixes: KeyPrefixes,
    pub thumbnail_height: u32,
    pub medium_height: u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            existence_check: ExistenceCheck::default(),
            persist_each_insert: false,
            prefixes: KeyPrefixes::default(),
            thumbnail_height: DEFAULT_THUMBNAIL_HEIGHT,
            medium_height: DEFAULT_MEDIUM_HEIGHT,
        }
    }
}

/// Shared flag checked before each file starts. Files already running finish.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress events, delivered from worker threads.
#[derive(Debug, Clone)]
pub enum SyncProgress {
    /// Discovery finished.
    Discovered { total: usize },
    /// A file left its worker.
    FileDone { filename: String, outcome: FileOutcome },
    /// All workers joined and the store was persisted.
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Metadata step succeeded; some variants may still have failed.
    Synced { created: bool, uploaded: usize, failed_variants: usize },
    /// Metadata could not be obtained; nothing else was attempted.
    Skipped,
    /// The run was cancelled before this file started.
    Cancelled,
}

/// A failure confined to one file, or to one variant of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileError {
    pub filename: String,
    pub variant: Option<Variant>,
    pub message: String,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub discovered: usize,
    /// Files whose metadata step succeeded.
    pub processed: usize,
    /// Files skipped because metadata extraction failed.
    pub failed: usize,
    pub cancelled: usize,
    pub records_created: usize,
    pub uploads: VariantCounts,
    pub errors: Vec<FileError>,
}

impl RunReport {
    /// No file or variant failed and nothing was cancelled.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.cancelled == 0
    }
}

/// A source file found during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path relative to the source directory, `/`-separated.
    pub filename: String,
}

struct FileReport {
    filename: String,
    outcome: FileOutcome,
    uploads: VariantCounts,
    errors: Vec<FileError>,
}

/// Walks a source directory and brings the metadata store and the blob store
/// up to date with it. Safe to re-run: every mutating step is preceded by a
/// lookup, so a second run over unchanged input does nothing.
pub struct IngestionPipeline {
    store: Arc<PhotoStore>,
    blobs: Arc<dyn BlobStore>,
    extractor: Arc<dyn MetadataExtractor>,
    generator: DerivativeGenerator,
    options: PipelineOptions,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<PhotoStore>,
        blobs: Arc<dyn BlobStore>,
        extractor: Arc<dyn MetadataExtractor>,
        generator: DerivativeGenerator,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            blobs,
            extractor,
            generator,
            options,
        }
    }

    pub fn store(&self) -> &PhotoStore {
        &self.store
    }

    pub fn run(&self, source_dir: &Path, erase_existing: bool) -> Result<RunReport> {
        self.run_with(source_dir, erase_existing, &CancelFlag::new(), None)
    }

    /// Run with a cancellation flag and an optional progress callback.
    ///
    /// Only discovery of the source directory, erasing the store and the final
    /// persist can fail the run; everything else is logged and reported.
    pub fn run_with(
        &self,
        source_dir: &Path,
        erase_existing: bool,
        cancel: &CancelFlag,
        progress: Option<&(dyn Fn(SyncProgress) + Sync)>,
    ) -> Result<RunReport> {
        let files = discover(source_dir)?;
        info!(source = %source_dir.display(), files = files.len(), "discovered source files");
        if let Some(cb) = progress {
            cb(SyncProgress::Discovered { total: files.len() });
        }

        if erase_existing {
            self.store.erase()?;
        }

        let checker = ExistenceChecker::new(Arc::clone(&self.blobs), self.options.existence_check);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.concurrency.max(1))
            .thread_name(|i| format!("photosync-worker-{i}"))
            .build()?;

        let reports: Vec<FileReport> = pool.install(|| {
            files
                .par_iter()
                .map(|file| {
                    let report = if cancel.is_cancelled() {
                        FileReport {
                            filename: file.filename.clone(),
                            outcome: FileOutcome::Cancelled,
                            uploads: VariantCounts::default(),
                            errors: Vec::new(),
                        }
                    } else {
                        self.process_file(file, &checker)
                    };
                    if let Some(cb) = progress {
                        cb(SyncProgress::FileDone {
                            filename: report.filename.clone(),
                            outcome: report.outcome.clone(),
                        });
                    }
                    report
                })
                .collect()
        });

        let mut report = RunReport {
            discovered: files.len(),
            ..RunReport::default()
        };
        for file_report in reports {
            match file_report.outcome {
                FileOutcome::Synced { created, .. } => {
                    report.processed += 1;
                    if created {
                        report.records_created += 1;
                    }
                }
                FileOutcome::Skipped => report.failed += 1,
                FileOutcome::Cancelled => report.cancelled += 1,
            }
            report.uploads.merge(&file_report.uploads);
            report.errors.extend(file_report.errors);
        }

        self.store.persist()?;
        info!(
            processed = report.processed,
            failed = report.failed,
            cancelled = report.cancelled,
            created = report.records_created,
            uploaded = report.uploads.total(),
            "sync run finished"
        );
        if let Some(cb) = progress {
            cb(SyncProgress::Complete);
        }
        Ok(report)
    }

    /// The unit of work for one file: make sure it has a record, then make
    /// sure each variant exists remotely.
    fn process_file(&self, file: &SourceFile, checker: &ExistenceChecker) -> FileReport {
        let mut report = FileReport {
            filename: file.filename.clone(),
            outcome: FileOutcome::Skipped,
            uploads: VariantCounts::default(),
            errors: Vec::new(),
        };

        let created = match self.ensure_record(file) {
            Ok(created) => created,
            Err(e) => {
                warn!(file = %file.filename, error = %e, "skipping file");
                report.errors.push(FileError {
                    filename: file.filename.clone(),
                    variant: None,
                    message: e.to_string(),
                });
                return report;
            }
        };

        let mut source: Option<Vec<u8>> = None;
        for variant in Variant::ALL {
            let key = self.options.prefixes.key(variant, &file.filename);
            match self.sync_variant(file, variant, &key, checker, &mut source) {
                Ok(true) => report.uploads.bump(variant),
                Ok(false) => {}
                Err(e) => {
                    warn!(file = %file.filename, %variant, %key, error = %e, "variant not synced");
                    report.errors.push(FileError {
                        filename: file.filename.clone(),
                        variant: Some(variant),
                        message: e.to_string(),
                    });
                }
            }
        }

        report.outcome = FileOutcome::Synced {
            created,
            uploaded: report.uploads.total(),
            failed_variants: report.errors.len(),
        };
        report
    }

    /// Look the file up, extracting and adding a record on a miss. Returns
    /// whether this call created the record. Losing an insert race to another
    /// worker counts as success.
    fn ensure_record(&self, file: &SourceFile) -> Result<bool> {
        if self.store.contains(&file.filename) {
            return Ok(false);
        }

        let record = self.extractor.extract(&file.path, &file.filename)?;
        let added = if self.options.persist_each_insert {
            self.store.add_and_persist(record)
        } else {
            self.store.add(record)
        };

        match added {
            Ok(()) => {
                debug!(file = %file.filename, "record created");
                Ok(true)
            }
            Err(Error::DuplicateRecord(_)) => {
                debug!(file = %file.filename, "record created concurrently, using existing");
                self.store.get(&file.filename).map(|_| false)
            }
            Err(e @ Error::PersistFailed { .. }) => {
                // The record is in memory; the final persist will write it.
                warn!(file = %file.filename, error = %e, "incremental persist failed");
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// Returns `Ok(true)` when the variant was uploaded, `Ok(false)` when it
    /// already existed.
    fn sync_variant(
        &self,
        file: &SourceFile,
        variant: Variant,
        key: &str,
        checker: &ExistenceChecker,
        source: &mut Option<Vec<u8>>,
    ) -> Result<bool> {
        if checker.exists(key)? {
            debug!(file = %file.filename, %variant, "already present");
            return Ok(false);
        }

        let bytes = match source.take() {
            Some(bytes) => bytes,
            None => fs::read(&file.path)?,
        };
        let result = self.upload_variant(file, variant, key, &bytes);
        *source = Some(bytes);
        result.map(|_| true)
    }

    fn upload_variant(&self, file: &SourceFile, variant: Variant, key: &str, bytes: &[u8]) -> Result<()> {
        let (content, content_type) = match variant {
            Variant::Original => (None, content_type_for(&file.path)),
            Variant::Thumbnail => (
                Some(self.generator.generate(bytes, TargetSize::height(self.options.thumbnail_height))?),
                "image/jpeg",
            ),
            Variant::Medium => (
                Some(self.generator.generate(bytes, TargetSize::height(self.options.medium_height))?),
                "image/jpeg",
            ),
        };
        let content = content.as_deref().unwrap_or(bytes);

        let url = self
            .blobs
            .put(key, content, content_type)
            .map_err(|e| match e {
                e @ Error::BlobUploadFailed { .. } => e,
                other => Error::BlobUploadFailed {
                    key: key.to_string(),
                    message: other.to_string(),
                },
            })?;
        debug!(file = %file.filename, %variant, %url, size = content.len(), "uploaded");
        Ok(())
    }
}

/// Recursively list ordinary files under `root`, sorted by path. Hidden
/// entries are skipped; unreadable entries are logged and skipped. Only an
/// unreadable root fails.
pub fn discover(root: &Path) -> Result<Vec<SourceFile>> {
    fs::read_dir(root).map_err(|source| Error::Discovery {
        path: root.to_path_buf(),
        source,
    })?;

    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'));

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            if !entry.file_type().is_dir() {
                debug!(path = %entry.path().display(), "skipping non-regular file");
            }
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        // Lossy names could map two files to one record key
        let Some(parts) = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<&str>>>()
        else {
            warn!(path = %entry.path().display(), "skipping file whose name is not valid UTF-8");
            continue;
        };
        files.push(SourceFile {
            path: entry.path().to_path_buf(),
            filename: parts.join("/"),
        });
    }
    Ok(files)
}

/// Content type for an original, from its extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "tif" | "tiff" => "image/tiff",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_recursive_and_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("2024/jan")).unwrap();
        fs::write(root.join("b.jpg"), b"b").unwrap();
        fs::write(root.join("a.jpg"), b"a").unwrap();
        fs::write(root.join("2024/jan/c.jpg"), b"c").unwrap();

        let names: Vec<String> = discover(root).unwrap().into_iter().map(|f| f.filename).collect();
        assert_eq!(names, vec!["2024/jan/c.jpg", "a.jpg", "b.jpg"]);
    }

    #[test]
    fn test_discover_skips_hidden() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join(".thumbs")).unwrap();
        fs::write(root.join(".thumbs/x.jpg"), b"x").unwrap();
        fs::write(root.join(".DS_Store"), b"x").unwrap();
        fs::write(root.join("a.jpg"), b"a").unwrap();

        let files = discover(root).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "a.jpg");
        assert_eq!(files[0].path, root.join("a.jpg"));
    }

    #[cfg(unix)]
    #[test]
    fn test_discover_skips_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::write(root.join(OsStr::from_bytes(b"a\xff.jpg")), b"1").unwrap();
        fs::write(root.join(OsStr::from_bytes(b"a\xfe.jpg")), b"2").unwrap();
        fs::write(root.join("b.jpg"), b"3").unwrap();

        let files = discover(root).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["b.jpg"]);
    }

    #[test]
    fn test_discover_missing_root_is_fatal() {
        let err = discover(Path::new("/nonexistent/photos")).unwrap_err();
        assert!(matches!(err, Error::Discovery { .. }));
    }

    #[test]
    fn test_discover_file_as_root_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.jpg");
        fs::write(&file, b"a").unwrap();
        assert!(matches!(discover(&file), Err(Error::Discovery { .. })));
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("a.png")), "image/png");
        assert_eq!(content_type_for(Path::new("a.tif")), "image/tiff");
        assert_eq!(content_type_for(Path::new("a.webp")), "image/webp");
        assert_eq!(content_type_for(Path::new("README")), "application/octet-stream");
    }

    #[test]
    fn test_cancel_flag_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_cancelled());
        clone.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_report_is_clean() {
        let mut report = RunReport::default();
        assert!(report.is_clean());
        report.cancelled = 1;
        assert!(!report.is_clean());
    }
}
