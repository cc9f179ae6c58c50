use foundation::math::Vec2;

use crate::components::{ResourceId, UniformSet};

/// Shader-backed rectangle: the carrier of every effect primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct Quad {
    /// Key of the shader program in the GPU resource table.
    pub program: &'static str,
    /// World-space size before the node's scale.
    pub size: Vec2,
    pub uniforms: UniformSet,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Drawable {
    /// Structural node with no geometry of its own.
    Group,
    Quad(Quad),
    Mesh {
        geometry: ResourceId,
        material: ResourceId,
    },
}

impl Drawable {
    pub fn quad(program: &'static str, size: Vec2, uniforms: UniformSet) -> Self {
        Drawable::Quad(Quad {
            program,
            size,
            uniforms,
        })
    }

    pub fn as_quad(&self) -> Option<&Quad> {
        match self {
            Drawable::Quad(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_quad_mut(&mut self) -> Option<&mut Quad> {
        match self {
            Drawable::Quad(q) => Some(q),
            _ => None,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Drawable::Group)
    }
}

#[cfg(test)]
mod tests {
    use super::Drawable;
    use crate::components::UniformSet;
    use foundation::math::Vec2;

    #[test]
    fn quad_accessors() {
        let mut drawable = Drawable::quad("glass", Vec2::new(2.0, 1.0), UniformSet::default());
        assert_eq!(drawable.as_quad().map(|q| q.program), Some("glass"));
        drawable.as_quad_mut().unwrap().size = Vec2::new(1.0, 1.0);
        assert_eq!(drawable.as_quad().unwrap().size, Vec2::new(1.0, 1.0));
        assert!(Drawable::Group.is_group());
        assert!(Drawable::Group.as_quad().is_none());
    }
}
