use std::path::{Path, PathBuf};

use vt_types::{ModelError, VtResult};

/// Environment variable overriding the cache root.
pub const HOME_ENV: &str = "VIDTUNE_HOME";

/// Locates pretrained snapshots in the local cache.
///
/// Snapshots live under `<root>/models--<id>` with the `/` of a hub id
/// flattened to `--`. Resolution is strictly offline; a missing snapshot is
/// a typed error the caller propagates.
#[derive(Debug, Clone)]
pub struct PretrainedResolver {
    root: PathBuf,
}

impl PretrainedResolver {
    /// Resolver rooted at `$VIDTUNE_HOME`, falling back to the platform
    /// cache directory.
    pub fn from_env() -> Self {
        let root = std::env::var_os(HOME_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::cache_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("vidtune")
            });
        Self { root }
    }

    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshot_dir(&self, id: &str) -> PathBuf {
        self.root.join(format!("models--{}", id.replace('/', "--")))
    }

    /// Path of the snapshot for `id`, or `PretrainedNotFound`.
    pub fn require(&self, id: &str) -> VtResult<PathBuf> {
        let dir = self.snapshot_dir(id);
        if dir.is_dir() {
            tracing::debug!("Resolved pretrained snapshot {} at {}", id, dir.display());
            Ok(dir)
        } else {
            Err(ModelError::PretrainedNotFound {
                id: id.to_string(),
                path: dir.display().to_string(),
            }
            .into())
        }
    }
}
