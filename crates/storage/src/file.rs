//! File-backed page store
//!
//! Layout under the root directory:
//!
//! ```text
//! pages/<page_id>/page.json            background, scroll, height, next sequence
//! pages/<page_id>/strokes/<id>.json    stroke header (no points)
//! pages/<page_id>/strokes/<id>.bin     encoded points
//! pages/<page_id>/images/<id>.json
//! pages/<page_id>/preview.png
//! ```
//!
//! Stroke headers and image records carry a per-page sequence number taken
//! from `page.json` when written; loads return content sorted by it, which
//! is paint order.

use directories::ProjectDirs;
use inkpage_model::codec;
use inkpage_model::{
    Background, Color, Image, ImageId, Offset, PageContent, PageId, PageStore, Pen, Rect,
    StoreError, StoreResult, Stroke, StrokeId,
};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const PAGE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io(e) => StoreError::Io(e),
            StorageError::Serde(e) => StoreError::Corrupt {
                what: "page metadata".to_string(),
                reason: e.to_string(),
            },
            StorageError::NoDataDirectory => {
                StoreError::Backend("unable to resolve local data directory".to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PageEnvelope {
    version: u32,
    background: Background,
    scroll_y: f32,
    height: Option<f32>,
    #[serde(default)]
    next_seq: u64,
}

impl PageEnvelope {
    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

impl Default for PageEnvelope {
    fn default() -> Self {
        Self {
            version: PAGE_SCHEMA_VERSION,
            background: Background::Blank,
            scroll_y: 0.0,
            height: None,
            next_seq: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StrokeHeader {
    id: StrokeId,
    #[serde(default)]
    seq: u64,
    page_id: PageId,
    pen: Pen,
    width: f32,
    color: Color,
    max_pressure: f32,
    bounds: Rect,
    point_mask: u8,
}

impl StrokeHeader {
    fn of(stroke: &Stroke, seq: u64) -> Self {
        Self {
            id: stroke.id,
            seq,
            page_id: stroke.page_id,
            pen: stroke.pen,
            width: stroke.width,
            color: stroke.color,
            max_pressure: stroke.max_pressure,
            bounds: stroke.bounds,
            point_mask: stroke.point_mask().bits(),
        }
    }

    fn into_stroke(self, points: Vec<inkpage_model::StrokePoint>) -> Stroke {
        Stroke {
            id: self.id,
            page_id: self.page_id,
            pen: self.pen,
            width: self.width,
            color: self.color,
            max_pressure: self.max_pressure,
            bounds: self.bounds,
            points,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ImageRecord {
    #[serde(default)]
    seq: u64,
    #[serde(flatten)]
    image: Image,
}

/// Directory-per-page [`PageStore`]
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    blob_limit: usize,
}

impl FileStore {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs =
            ProjectDirs::from("dev", "Inkpage", "Inkpage").ok_or(StorageError::NoDataDirectory)?;
        Ok(Self::with_root(dirs.data_local_dir()))
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            blob_limit: codec::DEFAULT_MAX_PAYLOAD,
        }
    }

    pub fn with_blob_limit(mut self, limit: usize) -> Self {
        self.blob_limit = limit;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pages_dir(&self) -> PathBuf {
        self.root.join("pages")
    }

    fn page_dir(&self, page_id: PageId) -> PathBuf {
        self.pages_dir().join(page_id.to_string())
    }

    fn page_meta_path(&self, page_id: PageId) -> PathBuf {
        self.page_dir(page_id).join("page.json")
    }

    fn read_envelope(&self, page_id: PageId) -> Result<PageEnvelope, StorageError> {
        let path = self.page_meta_path(page_id);
        if !path.exists() {
            return Ok(PageEnvelope::default());
        }
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    fn write_envelope(&self, page_id: PageId, envelope: &PageEnvelope) -> Result<(), StorageError> {
        fs::create_dir_all(self.page_dir(page_id))?;
        write_atomic(
            &self.page_meta_path(page_id),
            &serde_json::to_vec_pretty(envelope)?,
        )?;
        Ok(())
    }

    /// Find the page directory holding `file_name` under `kind`
    fn locate(&self, kind: &str, file_name: &str) -> Result<Option<PathBuf>, StorageError> {
        let pages = self.pages_dir();
        if !pages.exists() {
            return Ok(None);
        }
        for entry in fs::read_dir(pages)? {
            let candidate = entry?.path().join(kind).join(file_name);
            if candidate.exists() {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    fn load_strokes(&self, page_id: PageId) -> StoreResult<Vec<Stroke>> {
        let dir = self.page_dir(page_id).join("strokes");
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut strokes = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let header: StrokeHeader =
                serde_json::from_slice(&fs::read(&path)?).map_err(StorageError::from)?;
            let blob_path = path.with_extension("bin");
            if !blob_path.exists() {
                tracing::warn!(stroke_id = %header.id, "skipping stroke without point data");
                continue;
            }
            // A single corrupt stroke is skipped, not the whole page
            match codec::decode(&fs::read(blob_path)?) {
                Ok(points) => strokes.push((header.seq, header.id, points, header)),
                Err(e) => tracing::warn!(stroke_id = %header.id, error = %e, "skipping corrupt stroke"),
            }
        }
        strokes.sort_by_key(|(seq, id, _, _)| (*seq, *id));
        Ok(strokes
            .into_iter()
            .map(|(_, _, points, header)| header.into_stroke(points))
            .collect())
    }

    fn load_images(&self, page_id: PageId) -> StoreResult<Vec<Image>> {
        let dir = self.page_dir(page_id).join("images");
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut records: Vec<ImageRecord> = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(path)?;
            records.push(serde_json::from_slice(&bytes).map_err(StorageError::from)?);
        }
        records.sort_by_key(|r| (r.seq, r.image.id));
        Ok(records.into_iter().map(|r| r.image).collect())
    }

    /// Write back every envelope touched by a batch
    fn store_envelopes(&self, envelopes: HashMap<PageId, PageEnvelope>) -> Result<(), StorageError> {
        for (page_id, envelope) in &envelopes {
            self.write_envelope(*page_id, envelope)?;
        }
        Ok(())
    }

    fn envelope_for<'a>(
        &self,
        envelopes: &'a mut HashMap<PageId, PageEnvelope>,
        page_id: PageId,
    ) -> Result<&'a mut PageEnvelope, StorageError> {
        Ok(match envelopes.entry(page_id) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => slot.insert(self.read_envelope(page_id)?),
        })
    }
}

impl PageStore for FileStore {
    fn load_page_content(&self, page_id: PageId) -> StoreResult<PageContent> {
        let envelope = self.read_envelope(page_id)?;
        Ok(PageContent {
            background: envelope.background,
            strokes: self.load_strokes(page_id)?,
            images: self.load_images(page_id)?,
            scroll: Offset::new(0.0, envelope.scroll_y),
            height: envelope.height,
        })
    }

    fn create_strokes(&self, strokes: &[Stroke]) -> StoreResult<()> {
        // Encode everything first so an oversize stroke writes nothing
        let mut encoded = Vec::with_capacity(strokes.len());
        for stroke in strokes {
            encoded.push(codec::encode_with_limit(&stroke.points, self.blob_limit)?);
        }

        let mut envelopes = HashMap::new();
        for (stroke, blob) in strokes.iter().zip(encoded) {
            let envelope = self.envelope_for(&mut envelopes, stroke.page_id)?;
            let seq = envelope.take_seq();
            let bottom = stroke.bounds.bottom;
            if envelope.height.map_or(true, |h| h < bottom) {
                envelope.height = Some(bottom);
            }

            let dir = self.page_dir(stroke.page_id).join("strokes");
            fs::create_dir_all(&dir)?;
            let header =
                serde_json::to_vec(&StrokeHeader::of(stroke, seq)).map_err(StorageError::from)?;
            write_atomic(&dir.join(format!("{}.bin", stroke.id)), &blob)?;
            write_atomic(&dir.join(format!("{}.json", stroke.id)), &header)?;
        }
        self.store_envelopes(envelopes)?;
        tracing::trace!(count = strokes.len(), "strokes written");
        Ok(())
    }

    fn delete_strokes(&self, ids: &[StrokeId]) -> StoreResult<()> {
        for id in ids {
            if let Some(path) = self.locate("strokes", &format!("{id}.json"))? {
                fs::remove_file(&path)?;
                let blob = path.with_extension("bin");
                if blob.exists() {
                    fs::remove_file(blob)?;
                }
            }
        }
        Ok(())
    }

    fn create_images(&self, images: &[Image]) -> StoreResult<()> {
        let mut envelopes = HashMap::new();
        for image in images {
            let seq = self.envelope_for(&mut envelopes, image.page_id)?.take_seq();
            let dir = self.page_dir(image.page_id).join("images");
            fs::create_dir_all(&dir)?;
            let record = ImageRecord {
                seq,
                image: image.clone(),
            };
            let bytes = serde_json::to_vec(&record).map_err(StorageError::from)?;
            write_atomic(&dir.join(format!("{}.json", image.id)), &bytes)?;
        }
        self.store_envelopes(envelopes)?;
        Ok(())
    }

    fn delete_images(&self, ids: &[ImageId]) -> StoreResult<()> {
        for id in ids {
            if let Some(path) = self.locate("images", &format!("{id}.json"))? {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn update_page_scroll(&self, page_id: PageId, scroll_y: f32) -> StoreResult<()> {
        let mut envelope = self.read_envelope(page_id)?;
        envelope.scroll_y = scroll_y;
        self.write_envelope(page_id, &envelope)?;
        Ok(())
    }

    fn save_preview(&self, page_id: PageId, png: &[u8]) -> StoreResult<()> {
        let dir = self.page_dir(page_id);
        fs::create_dir_all(&dir)?;
        write_atomic(&dir.join("preview.png"), png)?;
        Ok(())
    }

    fn load_preview(&self, page_id: PageId) -> StoreResult<Option<Vec<u8>>> {
        let path = self.page_dir(page_id).join("preview.png");
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }
}

/// Write through a sibling temp file and rename over the target
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}
