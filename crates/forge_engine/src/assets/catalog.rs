//! Asset catalog: staged geometry, model registry, skeletons
//!
//! Geometry lives in four persistent arenas: one vertex and one index arena
//! per vertex kind (static, skinned). Staging appends a model's raw vertex
//! records and indices to the matching arenas and records element offsets
//! taken *before* the append. Indices are stored exactly as read from the
//! model file (0-based, model-local); the renderer rebases them at draw time
//! through the base-vertex draw parameter. Rebasing them here as well would
//! make draws read past the model's vertex range.

use std::collections::HashMap;

use bitflags::bitflags;
use nalgebra::Matrix4;
use slotmap::{new_key_type, SlotMap};
use thiserror::Error;

use crate::assets::model_format::{ModelData, VertexKind};
use crate::foundation::memory::{Arena, MemoryPool, PoolError};

bitflags! {
    /// Per-model feature bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ModelFlags: u32 {
        /// Vertices carry bone indices and blend weights
        const SKINNED = 1;
    }
}

impl ModelFlags {
    /// Vertex layout implied by these flags.
    pub fn vertex_kind(self) -> VertexKind {
        if self.contains(Self::SKINNED) {
            VertexKind::Skinned
        } else {
            VertexKind::Static
        }
    }
}

new_key_type! {
    /// Generational key of a registered [`Model`].
    pub struct ModelKey;
    /// Generational key of a registered [`Skeleton`].
    pub struct SkeletonKey;
}

/// Offsets of one staged mesh within the persistent geometry arenas, in
/// element units relative to the arena bank matching its vertex kind.
#[derive(Debug, Clone, Copy)]
pub struct StagedGeometry {
    /// Vertex layout the mesh was staged with
    pub kind: VertexKind,
    /// First vertex, in vertex elements
    pub vertex_offset: u32,
    /// First index, in index elements
    pub index_offset: u32,
    /// Number of staged vertices
    pub vertex_count: u32,
    /// Number of staged indices
    pub index_count: u32,
}

/// A registered model. Immutable once registered.
#[derive(Debug, Clone)]
pub struct Model {
    /// Number of indices to draw
    pub index_count: u32,
    /// First index in the index arena of this model's kind
    pub index_offset: u32,
    /// First vertex in the vertex arena of this model's kind; applied as the
    /// base-vertex parameter at draw time
    pub vertex_offset: u32,
    /// Feature bits
    pub flags: ModelFlags,
    /// Skeleton resolved at registration, when one was already known
    pub skeleton: Option<SkeletonKey>,
}

/// One joint transform of a [`Skeleton`].
#[derive(Debug, Clone)]
pub struct Bone {
    /// Joint name from the scene description
    pub name: String,
    /// Bind transform, column-major
    pub transform: Matrix4<f32>,
}

/// Named, ordered set of bones. Applying bones to a runtime pose belongs to
/// the animation subsystem, not the loader.
#[derive(Debug, Clone)]
pub struct Skeleton {
    /// Skeleton name used for `USE_SKELETON` lookups
    pub name: String,
    /// Joints in file order; vertex bone indices refer to positions here
    pub bones: Vec<Bone>,
}

/// Staging/registration errors
#[derive(Debug, Error)]
pub enum StageError {
    /// Geometry arena could not grow
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Model registry is full
    #[error("model capacity exceeded: at most {max} models may be registered")]
    TooManyModels {
        /// Configured registry capacity
        max: usize,
    },
}

/// Per-kind geometry arenas and element counters.
#[derive(Debug, Default)]
struct GeometryBank {
    vertex: Arena,
    index: Arena,
    vertex_count: u32,
    index_count: u32,
}

/// Owns every loaded asset: staged geometry, models, skeletons, name tables.
#[derive(Debug)]
pub struct AssetCatalog {
    banks: [GeometryBank; 2],
    models: SlotMap<ModelKey, Model>,
    model_names: HashMap<String, ModelKey>,
    skeletons: SlotMap<SkeletonKey, Skeleton>,
    skeleton_names: HashMap<String, SkeletonKey>,
    max_models: usize,
}

impl AssetCatalog {
    /// Create an empty catalog holding at most `max_models` models.
    pub fn new(max_models: usize) -> Self {
        Self {
            banks: Default::default(),
            models: SlotMap::with_key(),
            model_names: HashMap::new(),
            skeletons: SlotMap::with_key(),
            skeleton_names: HashMap::new(),
            max_models,
        }
    }

    /// Append a decoded mesh to the persistent geometry arenas.
    ///
    /// The returned offsets are the arenas' element counts before the
    /// append, so for a sequence of staged meshes of one kind the k-th
    /// offset is the sum of the previous counts.
    pub fn stage_geometry(
        &mut self,
        pool: &mut MemoryPool,
        data: &ModelData<'_>,
    ) -> Result<StagedGeometry, PoolError> {
        let bank = &mut self.banks[data.kind.bank()];
        let staged = StagedGeometry {
            kind: data.kind,
            vertex_offset: bank.vertex_count,
            index_offset: bank.index_count,
            vertex_count: data.vertex_count,
            index_count: data.index_count,
        };
        bank.vertex.push_bytes(pool, data.vertex_bytes)?;
        bank.index.push_bytes(pool, data.index_bytes)?;
        bank.vertex_count += data.vertex_count;
        bank.index_count += data.index_count;
        log::debug!(
            "staged {:?} geometry: {} vertices at {}, {} indices at {}",
            data.kind,
            staged.vertex_count,
            staged.vertex_offset,
            staged.index_count,
            staged.index_offset,
        );
        Ok(staged)
    }

    /// Register a model over previously staged geometry and index it by
    /// name. A duplicate name replaces the earlier entry with a warning; the
    /// earlier model's geometry stays staged but unreachable by name.
    pub fn register_model(
        &mut self,
        name: &str,
        geometry: StagedGeometry,
        flags: ModelFlags,
        skeleton: Option<SkeletonKey>,
    ) -> Result<ModelKey, StageError> {
        if self.models.len() >= self.max_models {
            return Err(StageError::TooManyModels {
                max: self.max_models,
            });
        }
        debug_assert_eq!(geometry.kind, flags.vertex_kind());
        let key = self.models.insert(Model {
            index_count: geometry.index_count,
            index_offset: geometry.index_offset,
            vertex_offset: geometry.vertex_offset,
            flags,
            skeleton,
        });
        if let Some(old) = self.model_names.insert(name.to_string(), key) {
            log::warn!("model '{name}' registered twice, replacing earlier entry");
            self.models.remove(old);
        }
        Ok(key)
    }

    /// Register a skeleton under `name`. A duplicate name replaces the
    /// earlier entry with a warning.
    pub fn register_skeleton(&mut self, name: &str, bones: Vec<Bone>) -> SkeletonKey {
        let key = self.skeletons.insert(Skeleton {
            name: name.to_string(),
            bones,
        });
        if let Some(old) = self.skeleton_names.insert(name.to_string(), key) {
            log::warn!("skeleton '{name}' registered twice, replacing earlier entry");
            self.skeletons.remove(old);
        }
        key
    }

    /// Look up a model by name.
    pub fn find_model(&self, name: &str) -> Option<ModelKey> {
        self.model_names.get(name).copied()
    }

    /// Look up a skeleton by name.
    pub fn find_skeleton(&self, name: &str) -> Option<SkeletonKey> {
        self.skeleton_names.get(name).copied()
    }

    /// Resolve a model key. Returns `None` for stale keys.
    pub fn model(&self, key: ModelKey) -> Option<&Model> {
        self.models.get(key)
    }

    /// Resolve a skeleton key. Returns `None` for stale keys.
    pub fn skeleton(&self, key: SkeletonKey) -> Option<&Skeleton> {
        self.skeletons.get(key)
    }

    /// Number of registered models.
    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    /// Number of registered skeletons.
    pub fn skeleton_count(&self) -> usize {
        self.skeletons.len()
    }

    /// Total staged vertices of one kind, in elements.
    pub fn vertex_count(&self, kind: VertexKind) -> u32 {
        self.banks[kind.bank()].vertex_count
    }

    /// Total staged indices of one kind, in elements.
    pub fn index_count(&self, kind: VertexKind) -> u32 {
        self.banks[kind.bank()].index_count
    }

    /// Used byte ranges of the vertex arena of one kind, in staging order.
    /// Concatenated, they form the contiguous GPU vertex buffer contents.
    pub fn vertex_chunks(&self, kind: VertexKind) -> impl Iterator<Item = &[u8]> {
        self.banks[kind.bank()].vertex.chunks()
    }

    /// Used byte ranges of the index arena of one kind, in staging order.
    pub fn index_chunks(&self, kind: VertexKind) -> impl Iterator<Item = &[u8]> {
        self.banks[kind.bank()].index.chunks()
    }

    /// Return all geometry pages to the pool. Registered models and
    /// skeletons are cleared as well; their offsets would dangle otherwise.
    pub fn dispose(&mut self, pool: &mut MemoryPool) {
        for bank in &mut self.banks {
            bank.vertex.dispose(pool);
            bank.index.dispose(pool);
            bank.vertex_count = 0;
            bank.index_count = 0;
        }
        self.models.clear();
        self.model_names.clear();
        self.skeletons.clear();
        self.skeleton_names.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::model_format::{self, test_support};

    fn stage_triangles(
        catalog: &mut AssetCatalog,
        pool: &mut MemoryPool,
        counts: &[(u32, u32)],
        kind: VertexKind,
    ) -> Vec<StagedGeometry> {
        counts
            .iter()
            .map(|&(vertices, indices)| {
                let vertex_bytes = vec![0u8; vertices as usize * kind.stride()];
                let index_bytes = vec![0u8; indices as usize * 4];
                let data = ModelData {
                    kind,
                    vertex_count: vertices,
                    index_count: indices,
                    vertex_bytes: &vertex_bytes,
                    index_bytes: &index_bytes,
                };
                catalog.stage_geometry(pool, &data).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_offsets_are_prefix_sums() {
        let mut pool = MemoryPool::with_defaults();
        let mut catalog = AssetCatalog::new(32);

        let staged = stage_triangles(
            &mut catalog,
            &mut pool,
            &[(3, 3), (8, 12), (100, 300)],
            VertexKind::Static,
        );
        assert_eq!(staged[0].vertex_offset, 0);
        assert_eq!(staged[0].index_offset, 0);
        assert_eq!(staged[1].vertex_offset, 3);
        assert_eq!(staged[1].index_offset, 3);
        assert_eq!(staged[2].vertex_offset, 11);
        assert_eq!(staged[2].index_offset, 15);
        assert_eq!(catalog.vertex_count(VertexKind::Static), 111);
        assert_eq!(catalog.index_count(VertexKind::Static), 315);
    }

    #[test]
    fn test_kinds_use_independent_arenas() {
        let mut pool = MemoryPool::with_defaults();
        let mut catalog = AssetCatalog::new(32);

        stage_triangles(&mut catalog, &mut pool, &[(5, 6)], VertexKind::Static);
        let skinned = stage_triangles(&mut catalog, &mut pool, &[(2, 3)], VertexKind::Skinned);

        // Skinned offsets start at zero despite earlier static staging.
        assert_eq!(skinned[0].vertex_offset, 0);
        assert_eq!(skinned[0].index_offset, 0);
        assert_eq!(catalog.vertex_count(VertexKind::Skinned), 2);
    }

    #[test]
    fn test_indices_are_stored_unrebased() {
        let mut pool = MemoryPool::with_defaults();
        let mut catalog = AssetCatalog::new(32);

        let (vertices, indices) = test_support::triangle();
        for _ in 0..2 {
            let bytes = test_support::encode(&vertices, &indices);
            let data = model_format::decode(&bytes, VertexKind::Static).unwrap();
            catalog.stage_geometry(&mut pool, &data).unwrap();
        }

        let index_bytes: Vec<u8> = catalog
            .index_chunks(VertexKind::Static)
            .flatten()
            .copied()
            .collect();
        let stored: Vec<u32> = index_bytes
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        // Second model's indices are still 0-based, not shifted by the
        // first model's 3 vertices.
        assert_eq!(stored, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_model_capacity_is_enforced() {
        let mut pool = MemoryPool::with_defaults();
        let mut catalog = AssetCatalog::new(1);

        let staged = stage_triangles(&mut catalog, &mut pool, &[(3, 3), (3, 3)], VertexKind::Static);
        assert!(catalog
            .register_model("a", staged[0], ModelFlags::empty(), None)
            .is_ok());
        match catalog.register_model("b", staged[1], ModelFlags::empty(), None) {
            Err(StageError::TooManyModels { max }) => assert_eq!(max, 1),
            other => panic!("expected capacity error, got {other:?}"),
        }
    }

    #[test]
    fn test_name_lookup_and_duplicate_replacement() {
        let mut pool = MemoryPool::with_defaults();
        let mut catalog = AssetCatalog::new(32);

        let staged = stage_triangles(&mut catalog, &mut pool, &[(3, 3), (6, 9)], VertexKind::Static);
        let first = catalog
            .register_model("cube", staged[0], ModelFlags::empty(), None)
            .unwrap();
        assert_eq!(catalog.find_model("cube"), Some(first));
        assert_eq!(catalog.find_model("sphere"), None);

        let second = catalog
            .register_model("cube", staged[1], ModelFlags::empty(), None)
            .unwrap();
        assert_eq!(catalog.find_model("cube"), Some(second));
        assert!(catalog.model(first).is_none()); // stale key
        assert_eq!(catalog.model(second).unwrap().vertex_offset, 3);
    }

    #[test]
    fn test_skeleton_registration() {
        let mut catalog = AssetCatalog::new(32);
        let key = catalog.register_skeleton(
            "biped",
            vec![Bone {
                name: "root".to_string(),
                transform: Matrix4::identity(),
            }],
        );
        assert_eq!(catalog.find_skeleton("biped"), Some(key));
        assert_eq!(catalog.skeleton(key).unwrap().bones.len(), 1);
    }

    #[test]
    fn test_dispose_returns_all_pages() {
        let mut pool = MemoryPool::new(8, 64);
        let mut catalog = AssetCatalog::new(32);
        stage_triangles(&mut catalog, &mut pool, &[(10, 30)], VertexKind::Static);
        assert!(pool.free_count() < 8);
        catalog.dispose(&mut pool);
        assert_eq!(pool.free_count(), 8);
        assert_eq!(catalog.model_count(), 0);
        assert_eq!(catalog.vertex_count(VertexKind::Static), 0);
    }
}
