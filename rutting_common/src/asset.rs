//! The ordered set of images a batch is built from.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use image::ImageFormat;
use serde::Serialize;

/// MIME type given to camera snapshots; capture devices encode PNG.
pub const CAPTURE_MIME: &str = "image/png";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AssetOrigin {
    FileUpload,
    CaptureDevice,
}

/// Origin plus a per-origin sequence number. Never reused within a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AssetId {
    pub origin: AssetOrigin,
    pub seq: u64,
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin {
            AssetOrigin::FileUpload => write!(f, "file-{}", self.seq),
            AssetOrigin::CaptureDevice => write!(f, "capture-{}", self.seq),
        }
    }
}

/// One image eligible for submission. Immutable once created.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    id: AssetId,
    display_name: String,
    mime: String,
    bytes: Arc<[u8]>,
}

impl ImageAsset {
    pub fn id(&self) -> AssetId {
        self.id
    }

    pub fn origin(&self) -> AssetOrigin {
        self.id.origin
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn bytes(&self) -> &Arc<[u8]> {
        &self.bytes
    }
}

/// A picked file, before it joins the set.
#[derive(Debug, Clone)]
pub struct FileInput {
    pub name: String,
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl FileInput {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bytes,
            mime: mime.into(),
        }
    }

    /// Reads an image file from disk. Only files with a known image
    /// extension are accepted.
    pub fn read(path: &Path) -> Result<Self> {
        let format = ImageFormat::from_path(path)
            .with_context(|| format!("Not an image file: {path:?}"))?;
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("Path has no usable file name: {path:?}"))?
            .to_string();
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read {path:?}"))?;
        Ok(Self {
            name,
            bytes,
            mime: format.to_mime_type().to_string(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssetSet {
    assets: Vec<ImageAsset>,
    files_added: u64,
    captures_issued: u64,
}

impl AssetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one asset per file, keeping the given order.
    pub fn add_from_files(&mut self, files: impl IntoIterator<Item = FileInput>) -> Vec<AssetId> {
        files
            .into_iter()
            .map(|file| {
                self.files_added += 1;
                let id = AssetId {
                    origin: AssetOrigin::FileUpload,
                    seq: self.files_added,
                };
                self.assets.push(ImageAsset {
                    id,
                    display_name: file.name,
                    mime: file.mime,
                    bytes: file.bytes.into(),
                });
                id
            })
            .collect()
    }

    /// Appends a camera snapshot named `"{n}.png"`, where `n` counts every
    /// capture ever added to this set, removed ones included.
    pub fn add_from_capture(&mut self, bytes: Vec<u8>) -> AssetId {
        self.captures_issued += 1;
        let id = AssetId {
            origin: AssetOrigin::CaptureDevice,
            seq: self.captures_issued,
        };
        self.assets.push(ImageAsset {
            id,
            display_name: format!("{}.png", self.captures_issued),
            mime: CAPTURE_MIME.to_string(),
            bytes: bytes.into(),
        });
        id
    }

    pub fn remove(&mut self, id: AssetId) -> Option<ImageAsset> {
        let index = self.assets.iter().position(|asset| asset.id == id)?;
        Some(self.assets.remove(index))
    }

    /// Empties the set. The capture counter keeps running.
    pub fn clear(&mut self) {
        self.assets.clear();
    }

    pub fn get(&self, id: AssetId) -> Option<&ImageAsset> {
        self.assets.iter().find(|asset| asset.id == id)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageAsset> {
        self.assets.iter()
    }

    pub fn as_slice(&self) -> &[ImageAsset] {
        &self.assets
    }

    pub fn captures_issued(&self) -> u64 {
        self.captures_issued
    }
}
