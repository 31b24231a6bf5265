//! On-disk DAG cache
//!
//! Versioned bincode serialisation of a built DAG together with the
//! source paths it was baked from. A missing file and a stale or
//! truncated file are both expected conditions the caller recovers from
//! by rebuilding; only I/O on save surfaces as a hard error.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use meshlod_core::ClusterDag;

/// Bump when the serialised layout changes; older files rebake.
pub const DAG_CACHE_VERSION: u32 = 1;

const DAG_CACHE_MAGIC: [u8; 4] = *b"MLOD";

/// Source assets a DAG was baked from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPaths {
    pub obj: PathBuf,
    pub texture: PathBuf,
}

#[derive(Debug, Error)]
pub enum CacheError {
    /// No cache file yet; bake and save.
    #[error("cache file not present")]
    Miss,
    /// Unreadable, wrong magic/version, or truncated; treated like a
    /// miss by callers.
    #[error("cache file corrupt: {0}")]
    Corrupt(String),
}

#[derive(Serialize, Deserialize)]
struct CacheHeader {
    version: u32,
    paths: ModelPaths,
}

pub fn save_dag(path: &Path, dag: &ClusterDag, paths: &ModelPaths) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create cache directory {}", parent.display()))?;
    }
    let file = File::create(path)
        .with_context(|| format!("failed to create cache file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&DAG_CACHE_MAGIC)?;
    let header = CacheHeader {
        version: DAG_CACHE_VERSION,
        paths: paths.clone(),
    };
    bincode::serialize_into(&mut writer, &header).context("failed to write cache header")?;
    bincode::serialize_into(&mut writer, dag).context("failed to write cache payload")?;
    writer.flush()?;
    log::info!("saved DAG cache {}", path.display());
    Ok(())
}

pub fn load_dag(path: &Path) -> Result<(ClusterDag, ModelPaths), CacheError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(CacheError::Miss),
        Err(e) => return Err(CacheError::Corrupt(e.to_string())),
    };
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .map_err(|e| CacheError::Corrupt(e.to_string()))?;
    if magic != DAG_CACHE_MAGIC {
        return Err(CacheError::Corrupt("bad magic".into()));
    }

    let header: CacheHeader = bincode::deserialize_from(&mut reader)
        .map_err(|e| CacheError::Corrupt(e.to_string()))?;
    if header.version != DAG_CACHE_VERSION {
        return Err(CacheError::Corrupt(format!(
            "version {} (expected {DAG_CACHE_VERSION})",
            header.version
        )));
    }

    let dag: ClusterDag = bincode::deserialize_from(&mut reader)
        .map_err(|e| CacheError::Corrupt(e.to_string()))?;
    log::info!(
        "loaded DAG cache {} ({} clusters)",
        path.display(),
        dag.len()
    );
    Ok((dag, header.paths))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use meshlod_core::BoundingSphere;

    fn tiny_dag() -> ClusterDag {
        let parent_lists = vec![vec![1], vec![]];
        let positions = vec![vec![0.0; 9], vec![0.0; 9]];
        let normals = positions.clone();
        let uvs = vec![vec![0.0; 6], vec![0.0; 6]];
        let errors = vec![0.1, 0.2];
        let spheres = vec![
            BoundingSphere {
                center: Vec3::ZERO,
                radius: 0.5,
            };
            2
        ];
        ClusterDag::new(&parent_lists, positions, normals, uvs, errors, &spheres)
    }

    fn sample_paths() -> ModelPaths {
        ModelPaths {
            obj: PathBuf::from("data/model.obj"),
            texture: PathBuf::from("data/model.png"),
        }
    }

    #[test]
    fn missing_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_dag(&dir.path().join("nope.bin")).unwrap_err();
        assert!(matches!(err, CacheError::Miss));
    }

    #[test]
    fn garbage_is_corrupt_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.bin");
        fs::write(&path, b"not a cache at all").unwrap();
        let err = load_dag(&path).unwrap_err();
        assert!(matches!(err, CacheError::Corrupt(_)));
    }

    #[test]
    fn truncated_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.bin");
        save_dag(&path, &tiny_dag(), &sample_paths()).unwrap();
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        let err = load_dag(&path).unwrap_err();
        assert!(matches!(err, CacheError::Corrupt(_)));
    }

    #[test]
    fn save_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep/build/cache.bin");
        save_dag(&path, &tiny_dag(), &sample_paths()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn round_trip_preserves_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dag.bin");
        let dag = tiny_dag();
        let paths = sample_paths();
        save_dag(&path, &dag, &paths).unwrap();

        let (loaded, loaded_paths) = load_dag(&path).unwrap();
        assert_eq!(loaded_paths, paths);
        assert_eq!(loaded.len(), dag.len());
        assert_eq!(loaded.positions, dag.positions);
        assert_eq!(loaded.normals, dag.normals);
        assert_eq!(loaded.uvs, dag.uvs);
        assert_eq!(loaded.errors, dag.errors);
        assert_eq!(loaded.centers, dag.centers);
        assert_eq!(loaded.radii, dag.radii);
        assert_eq!(loaded.parents(0), dag.parents(0));
        assert_eq!(loaded.children(1), dag.children(1));
    }
}
