use std::fmt;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use vt_types::{DataError, VtResult};

use crate::manifest::{DatasetManifest, SplitMeta};
use crate::storage;
use crate::subsample::{evenly_spaced_indices, ratio_count};

pub const TRAIN_SPLIT: &str = "train";
pub const VALIDATION_SPLIT: &str = "validation";

/// One training example: flattened clip tensor plus tokenized caption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionExample {
    pub pixel_values: Vec<f32>,
    pub labels: Vec<i64>,
}

/// A named, ordered collection of examples.
#[derive(Debug, Clone)]
pub struct Split {
    pub name: String,
    pub examples: Vec<CaptionExample>,
}

impl Split {
    pub fn new(name: impl Into<String>, examples: Vec<CaptionExample>) -> Self {
        Self {
            name: name.into(),
            examples,
        }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// New split holding copies of the rows at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> VtResult<Split> {
        let mut examples = Vec::with_capacity(indices.len());
        for &index in indices {
            let example =
                self.examples
                    .get(index)
                    .cloned()
                    .ok_or_else(|| DataError::InvalidFormat {
                        message: format!(
                            "Index {} out of bounds for split {} with {} examples",
                            index,
                            self.name,
                            self.examples.len()
                        ),
                    })?;
            examples.push(example);
        }
        Ok(Split::new(self.name.clone(), examples))
    }

    /// Keep one example in `ratio`, evenly spaced, never fewer than one.
    pub fn subsample_one_in(&self, ratio: usize) -> VtResult<Split> {
        if self.is_empty() {
            return Err(DataError::EmptySplit {
                split: self.name.clone(),
            }
            .into());
        }
        let count = ratio_count(self.len(), ratio);
        let indices = evenly_spaced_indices(self.len(), count);
        self.select(&indices)
    }
}

/// An in-memory caption dataset with its manifest and both splits.
#[derive(Debug, Clone)]
pub struct CaptionDataset {
    pub manifest: DatasetManifest,
    pub train: Split,
    pub validation: Split,
}

impl CaptionDataset {
    /// Load a pre-processed dataset directory: manifest plus the train and
    /// validation parquet shards. Shards of a split decode in parallel.
    pub fn load_from_disk<P: AsRef<Path>>(dataset_dir: P) -> VtResult<Self> {
        let dir = dataset_dir.as_ref();
        tracing::info!("Loading caption dataset from {}", dir.display());

        let manifest = DatasetManifest::load(dir)?;
        manifest.validate()?;

        let train = Self::load_split(dir, &manifest, TRAIN_SPLIT)?;
        let validation = Self::load_split(dir, &manifest, VALIDATION_SPLIT)?;

        let dataset = Self {
            manifest,
            train,
            validation,
        };
        tracing::info!("Loaded dataset: {}", dataset);
        Ok(dataset)
    }

    fn load_split(dir: &Path, manifest: &DatasetManifest, name: &str) -> VtResult<Split> {
        let meta = manifest.split(name)?;

        let shards: Vec<Vec<CaptionExample>> = meta
            .files
            .par_iter()
            .map(|file| storage::read_split_file(dir.join(file)))
            .collect::<VtResult<Vec<_>>>()?;
        let examples: Vec<CaptionExample> = shards.into_iter().flatten().collect();

        if examples.len() != meta.num_examples {
            return Err(DataError::Corruption {
                message: format!(
                    "Split {} manifest declares {} examples but shards hold {}",
                    name,
                    meta.num_examples,
                    examples.len()
                ),
            }
            .into());
        }

        let expected_pixels = manifest.frame_shape.num_elements();
        for (row, example) in examples.iter().enumerate() {
            if example.pixel_values.len() != expected_pixels {
                return Err(DataError::InvalidFormat {
                    message: format!(
                        "Split {} row {}: clip has {} elements, expected {} ({})",
                        name,
                        row,
                        example.pixel_values.len(),
                        expected_pixels,
                        manifest.frame_shape
                    ),
                }
                .into());
            }
            if example.labels.len() != manifest.caption_length {
                return Err(DataError::InvalidFormat {
                    message: format!(
                        "Split {} row {}: caption has {} tokens, expected {}",
                        name,
                        row,
                        example.labels.len(),
                        manifest.caption_length
                    ),
                }
                .into());
            }
        }

        Ok(Split::new(name, examples))
    }

    /// Write the dataset as a directory: manifest plus one shard per split.
    pub fn save_to_disk<P: AsRef<Path>>(&self, dataset_dir: P) -> VtResult<()> {
        let dir = dataset_dir.as_ref();

        let mut manifest = self.manifest.clone();
        for split in [&self.train, &self.validation] {
            let relative = format!("{}/data-00000.parquet", split.name);
            storage::write_split_file(dir.join(&relative), &split.examples)?;
            manifest.insert_split(
                split.name.clone(),
                SplitMeta {
                    num_examples: split.len(),
                    files: vec![relative],
                },
            );
        }
        manifest.save(dir)?;
        Ok(())
    }

    /// Subsample both splits one-in-`ratio`, updating manifest counts.
    pub fn subsample_one_in(&self, ratio: usize) -> VtResult<CaptionDataset> {
        let train = self.train.subsample_one_in(ratio)?;
        let validation = self.validation.subsample_one_in(ratio)?;

        let mut manifest = self.manifest.clone();
        for split in [&train, &validation] {
            if let Some(meta) = manifest.splits.get_mut(&split.name) {
                meta.num_examples = split.len();
            }
        }

        tracing::info!(
            "Subsampled dataset one-in-{}: train {} -> {}, validation {} -> {}",
            ratio,
            self.train.len(),
            train.len(),
            self.validation.len(),
            validation.len()
        );

        Ok(CaptionDataset {
            manifest,
            train,
            validation,
        })
    }
}

impl fmt::Display for CaptionDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (train: {}, validation: {}, clip {}, captions {} tokens)",
            self.manifest.name,
            self.train.len(),
            self.validation.len(),
            self.manifest.frame_shape,
            self.manifest.caption_length
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::FrameShape;
    use tempfile::TempDir;

    fn synthetic_dataset(train_rows: usize, validation_rows: usize) -> CaptionDataset {
        let shape = FrameShape::new(2, 1, 2, 2);
        let caption_length = 4;
        let make = |name: &str, rows: usize| {
            let examples = (0..rows)
                .map(|i| CaptionExample {
                    pixel_values: vec![i as f32 * 0.5; shape.num_elements()],
                    labels: vec![i as i64; caption_length],
                })
                .collect();
            Split::new(name, examples)
        };

        let mut manifest = DatasetManifest::new("synthetic", shape, caption_length);
        manifest.insert_split(
            TRAIN_SPLIT,
            SplitMeta {
                num_examples: train_rows,
                files: vec![format!("{}/data-00000.parquet", TRAIN_SPLIT)],
            },
        );
        manifest.insert_split(
            VALIDATION_SPLIT,
            SplitMeta {
                num_examples: validation_rows,
                files: vec![format!("{}/data-00000.parquet", VALIDATION_SPLIT)],
            },
        );

        CaptionDataset {
            manifest,
            train: make(TRAIN_SPLIT, train_rows),
            validation: make(VALIDATION_SPLIT, validation_rows),
        }
    }

    #[test]
    fn test_dataset_round_trip() {
        let dir = TempDir::new().unwrap();
        let dataset = synthetic_dataset(25, 10);
        dataset.save_to_disk(dir.path()).unwrap();

        let loaded = CaptionDataset::load_from_disk(dir.path()).unwrap();
        assert_eq!(loaded.train.len(), 25);
        assert_eq!(loaded.validation.len(), 10);
        assert_eq!(loaded.train.examples, dataset.train.examples);
        assert_eq!(loaded.validation.examples, dataset.validation.examples);
    }

    #[test]
    fn test_load_rejects_count_mismatch() {
        let dir = TempDir::new().unwrap();
        let dataset = synthetic_dataset(10, 5);
        dataset.save_to_disk(dir.path()).unwrap();

        // Corrupt the manifest count after writing.
        let mut manifest = DatasetManifest::load(dir.path()).unwrap();
        manifest.splits.get_mut(TRAIN_SPLIT).unwrap().num_examples = 11;
        manifest.save(dir.path()).unwrap();

        match CaptionDataset::load_from_disk(dir.path()).unwrap_err() {
            vt_types::VtError::Data(DataError::Corruption { .. }) => (),
            other => panic!("Expected Corruption, got: {:?}", other),
        }
    }

    #[test]
    fn test_load_rejects_shape_mismatch() {
        let dir = TempDir::new().unwrap();
        let dataset = synthetic_dataset(6, 3);
        dataset.save_to_disk(dir.path()).unwrap();

        let mut manifest = DatasetManifest::load(dir.path()).unwrap();
        manifest.frame_shape = FrameShape::new(2, 1, 2, 3);
        manifest.save(dir.path()).unwrap();

        match CaptionDataset::load_from_disk(dir.path()).unwrap_err() {
            vt_types::VtError::Data(DataError::InvalidFormat { message }) => {
                assert!(message.contains("elements"));
            }
            other => panic!("Expected InvalidFormat, got: {:?}", other),
        }
    }

    #[test]
    fn test_subsample_counts() {
        let dataset = synthetic_dataset(100, 40);
        let small = dataset.subsample_one_in(20).unwrap();

        assert_eq!(small.train.len(), 5);
        assert_eq!(small.validation.len(), 2);
        assert_eq!(small.manifest.split(TRAIN_SPLIT).unwrap().num_examples, 5);

        // First and last rows survive.
        assert_eq!(small.train.examples[0], dataset.train.examples[0]);
        assert_eq!(small.train.examples[4], dataset.train.examples[99]);
        assert_eq!(small.validation.examples[1], dataset.validation.examples[39]);
    }

    #[test]
    fn test_subsample_short_split_keeps_one() {
        let dataset = synthetic_dataset(7, 7);
        let small = dataset.subsample_one_in(20).unwrap();
        assert_eq!(small.train.len(), 1);
        assert_eq!(small.train.examples[0], dataset.train.examples[0]);
    }

    #[test]
    fn test_subsample_empty_split_errors() {
        let mut dataset = synthetic_dataset(10, 10);
        dataset.validation.examples.clear();

        match dataset.subsample_one_in(20).unwrap_err() {
            vt_types::VtError::Data(DataError::EmptySplit { split }) => {
                assert_eq!(split, VALIDATION_SPLIT);
            }
            other => panic!("Expected EmptySplit, got: {:?}", other),
        }
    }

    #[test]
    fn test_select_out_of_bounds() {
        let dataset = synthetic_dataset(3, 3);
        assert!(dataset.train.select(&[0, 5]).is_err());
    }
}
