//! # Forge Engine
//!
//! Core memory management and asset streaming for a hobby 3D engine.
//!
//! The crate covers the engine's reusable core, deliberately excluding the
//! graphics-API plumbing:
//!
//! - **Memory**: a page-based [`foundation::MemoryPool`] and bump
//!   [`foundation::Arena`]s with LIFO scope checkpoints
//! - **Assets**: the binary model format, the [`assets::AssetCatalog`] of
//!   staged geometry, and the scene description loader
//! - **Scene**: placed actors, append-only during load
//! - **Render**: the draw queue and geometry byte ranges handed to the
//!   external renderer each frame
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use forge_engine::prelude::*;
//! use std::path::Path;
//!
//! fn main() -> Result<(), SceneError> {
//!     let config = EngineConfig::default();
//!     let mut store = AssetStore::new(&config);
//!     let mut scene = Scene::with_capacity(config.scene.max_actors);
//!
//!     let report = load_scene_file(Path::new("scenes/level1.txt"), &mut store, &mut scene)?;
//!     log::info!("loaded {} actors, {} models", report.actors, report.models);
//!
//!     let mut queue = RenderQueue::new();
//!     queue.begin_frame();
//!     build_draw_commands(&scene, &store.catalog, &mut queue).expect("queue sized for scene");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod assets;
pub mod core;
pub mod foundation;
pub mod render;
pub mod scene;

/// Commonly used engine types
pub mod prelude {
    pub use crate::assets::{
        load_scene, load_scene_file, AssetCatalog, AssetSource, AssetStore, DirSource, LoadReport,
        Model, ModelFlags, ModelKey, SceneError, VertexKind,
    };
    pub use crate::core::config::{Config, EngineConfig};
    pub use crate::foundation::logging;
    pub use crate::foundation::memory::{Arena, ArenaSlot, MemoryPool, PoolError};
    pub use crate::render::{build_draw_commands, DrawCommand, Pipeline, RenderQueue};
    pub use crate::scene::{Actor, Scene};
}
