use std::collections::BTreeMap;

use foundation::Id;
use foundation::math::Vec2;
use scene::components::{Drawable, ResourceId, Transform, UniformSet};
use scene::graph::{NodeId, SceneGraph};

/// Logical (CSS pixel) size of the drawing surface plus its pixel ratio.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SurfaceSize {
    pub width: f64,
    pub height: f64,
    pub pixel_ratio: f64,
}

impl SurfaceSize {
    pub fn new(width: f64, height: f64, pixel_ratio: f64) -> Self {
        Self {
            width: width.max(0.0),
            height: height.max(0.0),
            pixel_ratio,
        }
    }

    pub fn physical_width(&self) -> u32 {
        (self.width * self.pixel_ratio).round().max(1.0) as u32
    }

    pub fn physical_height(&self) -> u32 {
        (self.height * self.pixel_ratio).round().max(1.0) as u32
    }

    pub fn aspect(&self) -> f64 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }
}

impl Default for SurfaceSize {
    fn default() -> Self {
        Self::new(300.0, 150.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    Quad {
        program: &'static str,
        size: Vec2,
        uniforms: UniformSet,
    },
    Mesh {
        geometry: ResourceId,
        material: ResourceId,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawCommand {
    pub mount: Id,
    pub node: NodeId,
    pub z_order: i32,
    pub transform: Transform,
    pub command: RenderCommand,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderFrame {
    pub index: u64,
    pub size: SurfaceSize,
    pub clear_color: [f32; 4],
    pub view_proj: [[f32; 4]; 4],
    pub commands: Vec<DrawCommand>,
    /// Mounted contents left out because their view is off-screen.
    pub culled: usize,
}

/// Draw-ordering facts about one mounted content.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MountSlot {
    pub z_order: i32,
    /// Mount sequence number; earlier mounts draw first within a z-order.
    pub seq: u64,
    pub on_screen: bool,
}

pub struct Renderer;

impl Renderer {
    /// Draw commands for every visible node of every on-screen mount.
    ///
    /// Ordering contract:
    /// - Ascending `z_order`, then mount order.
    /// - Within one mount, scene traversal order.
    ///
    /// Returns the commands and the number of culled mounts. Nodes that no
    /// mount owns are not drawn.
    pub fn collect(graph: &SceneGraph, slots: &BTreeMap<Id, MountSlot>) -> (Vec<DrawCommand>, usize) {
        let culled = slots.values().filter(|s| !s.on_screen).count();
        let mut keyed: Vec<((i32, u64), DrawCommand)> = Vec::new();
        for visited in graph.collect() {
            let Some(owner) = visited.owner else {
                continue;
            };
            let Some(slot) = slots.get(owner) else {
                continue;
            };
            if !slot.on_screen {
                continue;
            }
            let command = match visited.drawable {
                Drawable::Group => continue,
                Drawable::Quad(q) => RenderCommand::Quad {
                    program: q.program,
                    size: q.size,
                    uniforms: q.uniforms.clone(),
                },
                Drawable::Mesh { geometry, material } => RenderCommand::Mesh {
                    geometry: *geometry,
                    material: *material,
                },
            };
            keyed.push((
                (slot.z_order, slot.seq),
                DrawCommand {
                    mount: owner.clone(),
                    node: visited.node,
                    z_order: slot.z_order,
                    transform: visited.world,
                    command,
                },
            ));
        }
        keyed.sort_by_key(|(key, _)| *key);
        (keyed.into_iter().map(|(_, c)| c).collect(), culled)
    }
}
