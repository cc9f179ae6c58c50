use foundation::math::{Vec2, Vec3};

/// Node placement relative to its parent. Quads lie in the node's XY plane.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub scale: Vec2,
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 0.0),
            scale: Vec2::new(1.0, 1.0),
        }
    }

    pub fn translate(position: Vec3) -> Self {
        Self {
            position,
            ..Self::identity()
        }
    }

    pub fn with_scale(mut self, scale: Vec2) -> Self {
        self.scale = scale;
        self
    }

    /// Composes `self` (parent) with `child`, yielding the child's world
    /// transform.
    pub fn then(&self, child: &Transform) -> Transform {
        Transform {
            position: Vec3::new(
                self.position.x + child.position.x * self.scale.x,
                self.position.y + child.position.y * self.scale.y,
                self.position.z + child.position.z,
            ),
            scale: Vec2::new(self.scale.x * child.scale.x, self.scale.y * child.scale.y),
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::Transform;
    use foundation::math::{Vec2, Vec3};

    #[test]
    fn identity_is_origin() {
        let transform = Transform::identity();
        assert_eq!(transform.position, Vec3::new(0.0, 0.0, 0.0));
        assert_eq!(transform.scale, Vec2::new(1.0, 1.0));
    }

    #[test]
    fn child_offsets_are_scaled_by_parent() {
        let parent = Transform::translate(Vec3::new(1.0, 1.0, 0.0)).with_scale(Vec2::new(2.0, 2.0));
        let child = Transform::translate(Vec3::new(0.5, -0.5, 0.25));
        let world = parent.then(&child);
        assert_eq!(world.position, Vec3::new(2.0, 0.0, 0.25));
        assert_eq!(world.scale, Vec2::new(2.0, 2.0));
    }
}
