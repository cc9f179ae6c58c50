//! Per-owner GPU resource bookkeeping.
//!
//! Every texture, geometry, material and program is registered under the
//! mount id that exclusively owns it, so unmounting can release exactly
//! that owner's resources. Textures load out-of-band: they start as
//! [`TextureState::Loading`] and are completed later.

use std::collections::BTreeMap;
use std::fmt;

use foundation::Id;
use scene::components::ResourceId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Texture,
    Geometry,
    Material,
    Program,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Texture => "texture",
            ResourceKind::Geometry => "geometry",
            ResourceKind::Material => "material",
            ResourceKind::Program => "program",
        };
        f.write_str(name)
    }
}

/// Decoded RGBA8 pixels.
#[derive(Clone, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl TextureData {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self {
            width,
            height,
            rgba,
        }
    }

    /// 1x1 opaque texel; stands in for a missing image.
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self::new(1, 1, rgba.to_vec())
    }

    pub fn aspect(&self) -> f64 {
        if self.height == 0 {
            1.0
        } else {
            f64::from(self.width) / f64::from(self.height)
        }
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.rgba.len() == self.width as usize * self.height as usize * 4
    }
}

impl fmt::Debug for TextureData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureData")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgba.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TextureState {
    Loading,
    Ready { width: u32, height: u32 },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceEntry {
    pub kind: ResourceKind,
    pub owner: Id,
    /// Source URL for textures, a descriptive name otherwise.
    pub label: String,
    pub texture: Option<TextureState>,
}

#[derive(Debug, Default)]
pub struct ResourceTable {
    entries: BTreeMap<ResourceId, ResourceEntry>,
    next: u64,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ResourceKind, owner: &Id, label: impl Into<String>) -> ResourceId {
        let id = ResourceId(self.next);
        self.next += 1;
        let texture = (kind == ResourceKind::Texture).then_some(TextureState::Loading);
        self.entries.insert(
            id,
            ResourceEntry {
                kind,
                owner: owner.clone(),
                label: label.into(),
                texture,
            },
        );
        id
    }

    pub fn get(&self, id: ResourceId) -> Option<&ResourceEntry> {
        self.entries.get(&id)
    }

    pub fn texture_state(&self, id: ResourceId) -> Option<&TextureState> {
        self.entries.get(&id).and_then(|e| e.texture.as_ref())
    }

    /// Moves a loading texture to its final state. Returns `false` when the
    /// texture is unknown (e.g. its owner already unmounted) or was already
    /// completed.
    pub fn complete_texture(&mut self, id: ResourceId, state: TextureState) -> bool {
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        match &entry.texture {
            Some(TextureState::Loading) => {
                entry.texture = Some(state);
                true
            }
            _ => false,
        }
    }

    /// Forgets every resource `owner` holds and returns their ids.
    pub fn release_owner(&mut self, owner: &Id) -> Vec<ResourceId> {
        let ids: Vec<ResourceId> = self
            .entries
            .iter()
            .filter(|(_, e)| &e.owner == owner)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            self.entries.remove(id);
        }
        ids
    }

    pub fn owned_by(&self, owner: &Id) -> usize {
        self.entries.values().filter(|e| &e.owner == owner).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
