//! Asset loading and staging
//!
//! [`AssetStore`] bundles the memory pool, the scratch arena and the
//! [`AssetCatalog`] into one explicit context that is threaded through the
//! loader — there are no global arenas. Persistent geometry lives in the
//! catalog's arenas; transient bytes (raw model files) pass through the
//! scratch arena inside a scope that closes before the next directive.

pub mod catalog;
pub mod model_format;
pub mod scene_loader;

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::config::EngineConfig;
use crate::foundation::memory::{Arena, MemoryPool};

pub use catalog::{
    AssetCatalog, Bone, Model, ModelFlags, ModelKey, Skeleton, SkeletonKey, StageError,
    StagedGeometry,
};
pub use model_format::{ModelData, ModelFormatError, RiggedVertex, Vertex, VertexKind};
pub use scene_loader::{load_scene, load_scene_file, LoadReport, SceneError};

/// Source of raw asset bytes, the seam between the loader and the
/// filesystem. Tests and tools substitute an in-memory source.
pub trait AssetSource {
    /// Read the full contents of `path`.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Reads assets relative to a root directory, typically the scene file's.
#[derive(Debug)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    /// Source rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetSource for DirSource {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(self.root.join(path))
    }
}

/// In-memory asset source for tests and generated content.
#[derive(Debug, Default)]
pub struct MemorySource {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl MemorySource {
    /// Empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` under `path`.
    pub fn insert(&mut self, path: impl Into<PathBuf>, bytes: Vec<u8>) {
        self.files.insert(path.into(), bytes);
    }
}

impl AssetSource for MemorySource {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{}", path.display())))
    }
}

/// All load-time state: the page pool, the per-entity scratch arena and the
/// catalog of staged assets.
#[derive(Debug)]
pub struct AssetStore {
    /// Page pool backing every arena in the store
    pub pool: MemoryPool,
    /// Scratch arena for transient parse/decode bytes
    pub scratch: Arena,
    /// Staged geometry and registered models/skeletons
    pub catalog: AssetCatalog,
}

impl AssetStore {
    /// Build a store sized by `config`.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            pool: MemoryPool::new(config.memory.page_count, config.memory.page_size),
            scratch: Arena::new(),
            catalog: AssetCatalog::new(config.scene.max_models),
        }
    }

    /// Release every arena page back to the pool, clearing all loaded
    /// assets. The store is reusable afterwards.
    pub fn dispose(&mut self) {
        self.scratch.dispose(&mut self.pool);
        self.catalog.dispose(&mut self.pool);
    }
}

impl Default for AssetStore {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}
