//! Scene: placed object instances
//!
//! Append-only during load, iterated read-only by the renderer. Capacity is
//! fixed at init; overflowing it aborts the load rather than reallocating,
//! matching the bounded/preallocated design of the rest of the engine.

use nalgebra::{Matrix4, Rotation3, Translation3, Vector3};
use thiserror::Error;

use crate::assets::catalog::ModelKey;

/// A placed instance of a model.
#[derive(Debug, Clone)]
pub struct Actor {
    /// World position
    pub position: [f32; 3],
    /// Euler rotation in radians, applied X then Y then Z
    pub rotation: [f32; 3],
    /// Per-axis scale
    pub scale: [f32; 3],
    /// Material id consumed by the renderer
    pub material: u32,
    /// Referenced model; `None` when the scene file named an unknown model.
    /// The renderer skips such actors.
    pub model: Option<ModelKey>,
}

impl Default for Actor {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            rotation: [0.0; 3],
            scale: [1.0; 3],
            material: 0,
            model: None,
        }
    }
}

impl Actor {
    /// Compose translation, rotation and scale into a world matrix.
    pub fn transform(&self) -> Matrix4<f32> {
        let translation = Translation3::from(Vector3::from(self.position));
        let rotation =
            Rotation3::from_euler_angles(self.rotation[0], self.rotation[1], self.rotation[2]);
        let scale = Matrix4::new_nonuniform_scaling(&Vector3::from(self.scale));
        translation.to_homogeneous() * rotation.to_homogeneous() * scale
    }
}

/// Error returned when a scene's fixed actor capacity is exceeded.
#[derive(Debug, Error)]
#[error("scene capacity exceeded: at most {capacity} actors")]
pub struct SceneFull {
    /// Configured actor capacity
    pub capacity: usize,
}

/// Fixed-capacity, append-only collection of actors.
#[derive(Debug)]
pub struct Scene {
    actors: Vec<Actor>,
    capacity: usize,
}

impl Scene {
    /// Create an empty scene holding at most `capacity` actors.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            actors: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an actor.
    pub fn add(&mut self, actor: Actor) -> Result<(), SceneFull> {
        if self.actors.len() >= self.capacity {
            return Err(SceneFull {
                capacity: self.capacity,
            });
        }
        self.actors.push(actor);
        Ok(())
    }

    /// All actors in load order.
    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    /// Number of actors.
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    /// Whether the scene holds no actors.
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
