use foundation::Id;
use foundation::math::Vec3;
use foundation::math::precision::stable_total_cmp_f64;

use crate::graph::{NodeId, SceneGraph};

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, dir: Vec3) -> Self {
        Self { origin, dir }
    }

    pub fn at(&self, t: f64) -> Vec3 {
        self.origin + self.dir.scale(t)
    }

    /// Distance along the ray to the plane `z = z`, if it is ahead.
    pub fn hit_plane_z(&self, z: f64) -> Option<f64> {
        if self.dir.z.abs() < 1e-12 {
            return None;
        }
        let t = (z - self.origin.z) / self.dir.z;
        (t >= 0.0).then_some(t)
    }

    pub fn intersect_plane_z(&self, z: f64) -> Option<Vec3> {
        self.hit_plane_z(z).map(|t| self.at(t))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PickHit {
    pub node: NodeId,
    pub owner: Option<Id>,
    pub distance: f64,
    pub point: Vec3,
}

/// Nearest visible quad under `ray`.
///
/// Ordering contract:
/// - The closest hit along the ray wins.
/// - Equal distances resolve to the lower `NodeId::index()`.
pub fn pick(graph: &SceneGraph, ray: Ray) -> Option<PickHit> {
    let mut best: Option<PickHit> = None;
    for visited in graph.collect() {
        let Some(quad) = visited.drawable.as_quad() else {
            continue;
        };
        let center = visited.world.position;
        let Some(t) = ray.hit_plane_z(center.z) else {
            continue;
        };
        let point = ray.at(t);
        let half_w = 0.5 * quad.size.x * visited.world.scale.x.abs();
        let half_h = 0.5 * quad.size.y * visited.world.scale.y.abs();
        if (point.x - center.x).abs() > half_w || (point.y - center.y).abs() > half_h {
            continue;
        }

        let closer = match &best {
            None => true,
            Some(b) => stable_total_cmp_f64(t, b.distance)
                .then_with(|| visited.node.index().cmp(&b.node.index()))
                .is_lt(),
        };
        if closer {
            best = Some(PickHit {
                node: visited.node,
                owner: visited.owner.cloned(),
                distance: t,
                point,
            });
        }
    }
    best
}
