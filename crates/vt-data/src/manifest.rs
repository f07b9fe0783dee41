use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use vt_types::{DataError, VtResult};

/// File name of the dataset manifest inside a dataset directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Shape of one clip tensor: frames x channels x height x width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameShape {
    pub frames: usize,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl FrameShape {
    pub fn new(frames: usize, channels: usize, height: usize, width: usize) -> Self {
        Self {
            frames,
            channels,
            height,
            width,
        }
    }

    /// Flattened element count of one clip.
    pub fn num_elements(&self) -> usize {
        self.frames * self.channels * self.height * self.width
    }
}

impl fmt::Display for FrameShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}x{}x{}",
            self.frames, self.channels, self.height, self.width
        )
    }
}

/// Per-split metadata: row count plus shard files relative to the dataset root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitMeta {
    pub num_examples: usize,
    pub files: Vec<String>,
}

/// Describes an on-disk pre-processed caption dataset.
///
/// The manifest is a single JSON document at the dataset root; each split's
/// examples live in the parquet shards it lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub name: String,
    pub frame_shape: FrameShape,
    pub caption_length: usize,
    pub splits: BTreeMap<String, SplitMeta>,
}

impl DatasetManifest {
    pub fn new(name: impl Into<String>, frame_shape: FrameShape, caption_length: usize) -> Self {
        Self {
            name: name.into(),
            frame_shape,
            caption_length,
            splits: BTreeMap::new(),
        }
    }

    /// Load the manifest from a dataset directory.
    pub fn load<P: AsRef<Path>>(dataset_dir: P) -> VtResult<Self> {
        let dir = dataset_dir.as_ref();
        if !dir.is_dir() {
            return Err(DataError::DatasetNotFound {
                path: dir.display().to_string(),
            }
            .into());
        }

        let manifest_path = dir.join(MANIFEST_FILE);
        let raw = std::fs::read_to_string(&manifest_path).map_err(|e| DataError::LoadingFailed {
            message: format!("Failed to read {}: {}", manifest_path.display(), e),
        })?;

        let manifest: DatasetManifest =
            serde_json::from_str(&raw).map_err(|e| DataError::ManifestInvalid {
                message: format!("{}: {}", manifest_path.display(), e),
            })?;

        Ok(manifest)
    }

    /// Write the manifest into a dataset directory, creating it if needed.
    pub fn save<P: AsRef<Path>>(&self, dataset_dir: P) -> VtResult<Self> {
        let dir = dataset_dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let manifest_path = dir.join(MANIFEST_FILE);
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(&manifest_path, raw).map_err(|e| DataError::WriteFailed {
            message: format!("Failed to write {}: {}", manifest_path.display(), e),
        })?;

        Ok(self.clone())
    }

    pub fn split(&self, name: &str) -> VtResult<&SplitMeta> {
        self.splits.get(name).ok_or_else(|| {
            DataError::SplitNotFound {
                split: name.to_string(),
            }
            .into()
        })
    }

    pub fn insert_split(&mut self, name: impl Into<String>, meta: SplitMeta) {
        self.splits.insert(name.into(), meta);
    }

    /// Structural checks that do not require reading any shard.
    pub fn validate(&self) -> VtResult<()> {
        if self.frame_shape.num_elements() == 0 {
            return Err(DataError::ManifestInvalid {
                message: format!("frame shape {} has zero elements", self.frame_shape),
            }
            .into());
        }
        if self.caption_length == 0 {
            return Err(DataError::ManifestInvalid {
                message: "caption_length must be positive".to_string(),
            }
            .into());
        }
        for (name, meta) in &self.splits {
            if meta.num_examples > 0 && meta.files.is_empty() {
                return Err(DataError::ManifestInvalid {
                    message: format!(
                        "split {} declares {} examples but lists no files",
                        name, meta.num_examples
                    ),
                }
                .into());
            }
        }
        Ok(())
    }
}
