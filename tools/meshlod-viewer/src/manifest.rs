//! Viewer model table
//!
//! Read from `models.toml` next to the binary when present, otherwise
//! the built-in default table is used.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub obj: PathBuf,
    pub texture: PathBuf,
    pub cache: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub models: Vec<ModelEntry>,
    /// Instances are spawned in a grid x grid square.
    pub grid: u32,
    /// World-space spacing between instances.
    pub spacing: f32,
    /// Ignore existing caches and rebake every DAG.
    pub force_rebuild: bool,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            models: vec![ModelEntry {
                name: "cat".into(),
                obj: "data/Cat.obj/Cat.obj".into(),
                texture: "data/Cat.obj/Cat.png".into(),
                cache: "data/build/Cat.dag".into(),
            }],
            grid: 7,
            spacing: 5.0,
            force_rebuild: false,
        }
    }
}

impl Manifest {
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("no {} found, using the built-in model table", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let manifest: Manifest =
            toml::from_str(&text).with_context(|| format!("malformed {}", path.display()))?;
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_manifest() {
        let manifest: Manifest = toml::from_str(
            r#"
            grid = 3
            spacing = 2.5

            [[models]]
            name = "bunny"
            obj = "data/bunny.obj"
            texture = "data/bunny.png"
            cache = "data/build/bunny.dag"
            "#,
        )
        .unwrap();
        assert_eq!(manifest.grid, 3);
        assert_eq!(manifest.models.len(), 1);
        assert_eq!(manifest.models[0].name, "bunny");
        assert!(!manifest.force_rebuild);
    }

    #[test]
    fn default_table_is_populated() {
        let manifest = Manifest::default();
        assert_eq!(manifest.models.len(), 1);
        assert_eq!(manifest.grid, 7);
    }
}
