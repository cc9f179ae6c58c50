//! Typed uniform sets.
//!
//! A [`UniformSet`] is built once from a schema of names and initial values.
//! The schema fixes each uniform's kind: later writes must use the same kind
//! and may only target declared names.

use std::fmt;

use crate::components::ResourceId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Color,
    Texture,
}

impl fmt::Display for UniformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UniformKind::Float => "float",
            UniformKind::Vec2 => "vec2",
            UniformKind::Vec3 => "vec3",
            UniformKind::Vec4 => "vec4",
            UniformKind::Color => "color",
            UniformKind::Texture => "texture",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    /// Linear RGBA.
    Color([f32; 4]),
    /// `None` while unbound (still loading, or failed).
    Texture(Option<ResourceId>),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Color(_) => UniformKind::Color,
            UniformValue::Texture(_) => UniformKind::Texture,
        }
    }

    fn is_finite(&self) -> bool {
        match self {
            UniformValue::Float(v) => v.is_finite(),
            UniformValue::Vec2(v) => v.iter().all(|c| c.is_finite()),
            UniformValue::Vec3(v) => v.iter().all(|c| c.is_finite()),
            UniformValue::Vec4(v) | UniformValue::Color(v) => v.iter().all(|c| c.is_finite()),
            UniformValue::Texture(_) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UniformError {
    Unknown(String),
    Duplicate(&'static str),
    KindMismatch {
        name: String,
        expected: UniformKind,
        found: UniformKind,
    },
    NonFinite(String),
}

impl fmt::Display for UniformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniformError::Unknown(name) => write!(f, "unknown uniform `{name}`"),
            UniformError::Duplicate(name) => write!(f, "uniform `{name}` declared twice"),
            UniformError::KindMismatch {
                name,
                expected,
                found,
            } => write!(f, "uniform `{name}` is {expected}, got {found}"),
            UniformError::NonFinite(name) => write!(f, "uniform `{name}` is not finite"),
        }
    }
}

impl std::error::Error for UniformError {}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformSet {
    /// Declaration order is kept: it is the packing order.
    entries: Vec<(&'static str, UniformValue)>,
}

impl UniformSet {
    pub fn new(schema: &[(&'static str, UniformValue)]) -> Result<Self, UniformError> {
        let mut entries: Vec<(&'static str, UniformValue)> = Vec::with_capacity(schema.len());
        for (name, value) in schema {
            if entries.iter().any(|(n, _)| n == name) {
                return Err(UniformError::Duplicate(*name));
            }
            if !value.is_finite() {
                return Err(UniformError::NonFinite((*name).to_string()));
            }
            entries.push((*name, *value));
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.entries.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn kind(&self, name: &str) -> Option<UniformKind> {
        self.get(name).map(UniformValue::kind)
    }

    pub fn float(&self, name: &str) -> Option<f32> {
        match self.get(name) {
            Some(UniformValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn texture(&self, name: &str) -> Option<ResourceId> {
        match self.get(name) {
            Some(UniformValue::Texture(t)) => *t,
            _ => None,
        }
    }

    pub fn set(&mut self, name: &str, value: UniformValue) -> Result<(), UniformError> {
        let Some((_, slot)) = self.entries.iter_mut().find(|(n, _)| *n == name) else {
            return Err(UniformError::Unknown(name.to_string()));
        };
        if slot.kind() != value.kind() {
            return Err(UniformError::KindMismatch {
                name: name.to_string(),
                expected: slot.kind(),
                found: value.kind(),
            });
        }
        if !value.is_finite() {
            return Err(UniformError::NonFinite(name.to_string()));
        }
        *slot = value;
        Ok(())
    }

    pub fn set_float(&mut self, name: &str, value: f64) -> Result<(), UniformError> {
        self.set(name, UniformValue::Float(value as f32))
    }

    pub fn set_vec2(&mut self, name: &str, x: f64, y: f64) -> Result<(), UniformError> {
        self.set(name, UniformValue::Vec2([x as f32, y as f32]))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &UniformValue)> {
        self.entries.iter().map(|(n, v)| (*n, v))
    }

    /// Textures referenced by this set, bound or not.
    pub fn texture_slots(&self) -> impl Iterator<Item = (&'static str, Option<ResourceId>)> + '_ {
        self.entries.iter().filter_map(|(n, v)| match v {
            UniformValue::Texture(t) => Some((*n, *t)),
            _ => None,
        })
    }

    /// Packs non-texture values into 16-byte slots (one vec4 per uniform),
    /// in declaration order. Unused lanes are zero.
    pub fn pack(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.entries.len() * 4);
        for (_, value) in &self.entries {
            let lanes: [f32; 4] = match *value {
                UniformValue::Float(v) => [v, 0.0, 0.0, 0.0],
                UniformValue::Vec2([x, y]) => [x, y, 0.0, 0.0],
                UniformValue::Vec3([x, y, z]) => [x, y, z, 0.0],
                UniformValue::Vec4(v) | UniformValue::Color(v) => v,
                UniformValue::Texture(_) => continue,
            };
            out.extend_from_slice(&lanes);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::{UniformError, UniformKind, UniformSet, UniformValue};
    use crate::components::ResourceId;
    use pretty_assertions::assert_eq;

    fn schema() -> UniformSet {
        UniformSet::new(&[
            ("uTime", UniformValue::Float(0.0)),
            ("uPointer", UniformValue::Vec2([0.0, 0.0])),
            ("uTexture", UniformValue::Texture(None)),
            ("uColor", UniformValue::Color([1.0, 1.0, 1.0, 1.0])),
        ])
        .unwrap()
    }

    #[test]
    fn writes_are_checked_against_schema() {
        let mut u = schema();
        u.set_float("uTime", 1.5).unwrap();
        assert_eq!(u.float("uTime"), Some(1.5));

        assert_eq!(
            u.set_float("uMissing", 1.0),
            Err(UniformError::Unknown("uMissing".into()))
        );
        assert_eq!(
            u.set_float("uPointer", 1.0),
            Err(UniformError::KindMismatch {
                name: "uPointer".into(),
                expected: UniformKind::Vec2,
                found: UniformKind::Float,
            })
        );
        assert_eq!(
            u.set_float("uTime", f64::NAN),
            Err(UniformError::NonFinite("uTime".into()))
        );
        assert_eq!(u.float("uTime"), Some(1.5));
    }

    #[test]
    fn schema_rejects_duplicates() {
        let err = UniformSet::new(&[
            ("uTime", UniformValue::Float(0.0)),
            ("uTime", UniformValue::Float(1.0)),
        ])
        .unwrap_err();
        assert_eq!(err, UniformError::Duplicate("uTime"));
    }

    #[test]
    fn textures_bind_by_resource() {
        let mut u = schema();
        assert_eq!(u.texture("uTexture"), None);
        u.set("uTexture", UniformValue::Texture(Some(ResourceId(7))))
            .unwrap();
        assert_eq!(u.texture("uTexture"), Some(ResourceId(7)));
        assert_eq!(
            u.texture_slots().collect::<Vec<_>>(),
            vec![("uTexture", Some(ResourceId(7)))]
        );
    }

    #[test]
    fn pack_uses_one_vec4_slot_per_value() {
        let mut u = schema();
        u.set_vec2("uPointer", 0.5, -0.5).unwrap();
        assert_eq!(
            u.pack(),
            vec![
                0.0, 0.0, 0.0, 0.0, //
                0.5, -0.5, 0.0, 0.0, //
                1.0, 1.0, 1.0, 1.0,
            ]
        );
    }
}
