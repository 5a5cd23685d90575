//! Read side: albums and the photos in them, ready to serialize.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use serde::Serialize;

use crate::domain::{KeyPrefixes, PhotoRecord, Variant};
use crate::error::Result;
use crate::signing::UrlSigner;
use crate::store::PhotoStore;

/// A record plus the delivery URLs of its derivatives. Built per query and
/// never written back to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoEntry {
    #[serde(flatten)]
    pub record: PhotoRecord,
    pub thumb_url: String,
    pub medium_url: String,
}

/// Distinct album keys, most recent first.
pub fn list_albums(store: &PhotoStore) -> Vec<i64> {
    let keys: BTreeSet<i64> = store.all().iter().map(|r| r.album_key).collect();
    keys.into_iter().rev().collect()
}

/// Records in any of `album_keys`, most recent capture first. Equal capture
/// times fall back to filename order.
pub fn list_records(store: &PhotoStore, album_keys: &HashSet<i64>) -> Vec<PhotoRecord> {
    let mut records: Vec<PhotoRecord> = store
        .all()
        .into_iter()
        .filter(|r| album_keys.contains(&r.album_key))
        .collect();
    records.sort_by(|a, b| {
        b.capture_time
            .cmp(&a.capture_time)
            .then_with(|| a.filename.cmp(&b.filename))
    });
    records
}

/// Query entry point for the presentation layer.
pub struct Gallery {
    store: Arc<PhotoStore>,
    base_url: String,
    prefixes: KeyPrefixes,
    signer: Box<dyn UrlSigner>,
}

impl Gallery {
    pub fn new(
        store: Arc<PhotoStore>,
        base_url: impl Into<String>,
        prefixes: KeyPrefixes,
        signer: Box<dyn UrlSigner>,
    ) -> Self {
        Self {
            store,
            base_url: base_url.into(),
            prefixes,
            signer,
        }
    }

    pub fn list_albums(&self) -> Vec<i64> {
        list_albums(&self.store)
    }

    pub fn list_photos(&self, album_keys: &HashSet<i64>) -> Result<Vec<PhotoEntry>> {
        list_records(&self.store, album_keys)
            .into_iter()
            .map(|record| {
                let thumb_url = self.url_for(Variant::Thumbnail, &record.filename)?;
                let medium_url = self.url_for(Variant::Medium, &record.filename)?;
                Ok(PhotoEntry {
                    record,
                    thumb_url,
                    medium_url,
                })
            })
            .collect()
    }

    fn url_for(&self, variant: Variant, filename: &str) -> Result<String> {
        let key = self.prefixes.key(variant, filename);
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), key);
        self.signer.sign(&url)
    }
}
