//! Renderer-facing draw queue
//!
//! The renderer is an external collaborator: per frame it signals
//! `begin_frame`, consumes the queued [`DrawCommand`]s and the catalog's
//! vertex/index byte ranges wholesale, and signals `end_frame`. Nothing in
//! here touches a graphics API.

use thiserror::Error;

use crate::assets::catalog::AssetCatalog;
use crate::assets::ModelFlags;
use crate::scene::Scene;

/// Fixed draw queue capacity per frame.
pub const MAX_DRAWS: usize = 128;

/// Pipeline selector for a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pipeline {
    /// Static geometry pipeline
    #[default]
    Static,
    /// Skinned geometry pipeline
    Skinned,
}

/// One draw, referencing staged geometry by arena offsets. `vertex_offset`
/// is applied as the base-vertex parameter so the model-local indices stay
/// valid without rebasing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DrawCommand {
    /// Per-object uniform slot
    pub uniform_slot: u32,
    /// Material id from the actor
    pub material: u32,
    /// Base vertex into the vertex arena of the draw's kind
    pub vertex_offset: u32,
    /// First index into the index arena of the draw's kind
    pub index_offset: u32,
    /// Number of indices to draw
    pub index_count: u32,
    /// Bone uniform offset; only meaningful for `Pipeline::Skinned`
    pub bone_offset: u32,
    /// Pipeline to bind
    pub pipeline: Pipeline,
}

/// Error returned when a frame queues more than [`MAX_DRAWS`] draws.
#[derive(Debug, Error)]
#[error("render queue full: at most {MAX_DRAWS} draws per frame")]
pub struct QueueFull;

/// Append-only per-frame draw list, reset by `begin_frame`.
#[derive(Debug, Default)]
pub struct RenderQueue {
    commands: Vec<DrawCommand>,
}

impl RenderQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self {
            commands: Vec::with_capacity(MAX_DRAWS),
        }
    }

    /// Frame-begin signal: drop last frame's draws.
    pub fn begin_frame(&mut self) {
        self.commands.clear();
    }

    /// Append one draw.
    pub fn push(&mut self, command: DrawCommand) -> Result<(), QueueFull> {
        if self.commands.len() >= MAX_DRAWS {
            return Err(QueueFull);
        }
        self.commands.push(command);
        Ok(())
    }

    /// Frame-end signal. The queue keeps its draws until the next
    /// `begin_frame` so the renderer can consume them after submission.
    pub fn end_frame(&self) {
        log::trace!("frame submitted with {} draws", self.commands.len());
    }

    /// Queued draws in submission order.
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Number of queued draws.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Queue one draw per actor with a resolved model. Actors whose model
/// reference is unresolved are skipped, as are stale model keys.
pub fn build_draw_commands(
    scene: &Scene,
    catalog: &AssetCatalog,
    queue: &mut RenderQueue,
) -> Result<usize, QueueFull> {
    let mut queued = 0;
    for (slot, actor) in scene.actors().iter().enumerate() {
        let Some(model) = actor.model.and_then(|key| catalog.model(key)) else {
            continue;
        };
        let pipeline = if model.flags.contains(ModelFlags::SKINNED) {
            Pipeline::Skinned
        } else {
            Pipeline::Static
        };
        queue.push(DrawCommand {
            uniform_slot: slot as u32,
            material: actor.material,
            vertex_offset: model.vertex_offset,
            index_offset: model.index_offset,
            index_count: model.index_count,
            bone_offset: 0,
            pipeline,
        })?;
        queued += 1;
    }
    Ok(queued)
}
