//! Block descriptors: CMS-authored JSON naming an effect kind and its
//! configuration, mounted as the matching primitive.

use foundation::Id;
use gpu::{MountOptions, Stage};
use serde::Deserialize;

use crate::carousel::CarouselEffect;
use crate::distortion::DistortionEffect;
use crate::effect::{Effect, EffectError, EffectKind, parse_config};
use crate::fluid::FluidEffect;
use crate::glass::GlassEffect;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSpec {
    pub id: String,
    pub kind: EffectKind,
    #[serde(default)]
    pub config: serde_json::Value,
    /// View the block is anchored to; defaults to none (always on-screen).
    #[serde(default)]
    pub view: Option<String>,
    #[serde(default)]
    pub z_order: i32,
}

/// A page: every block it mounts, in mount order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PageSpec {
    pub blocks: Vec<BlockSpec>,
}

/// A mounted effect of any kind.
pub enum Block {
    Glass(GlassEffect),
    Fluid(FluidEffect),
    Distortion(DistortionEffect),
    Carousel(CarouselEffect),
}

impl Block {
    pub fn mount(stage: &Stage, spec: &BlockSpec) -> Result<Self, EffectError> {
        let mut opts = MountOptions::default().z_order(spec.z_order);
        if let Some(view) = &spec.view {
            opts = opts.view(view.as_str());
        }
        let id = Id::new(&spec.id);
        let block = match spec.kind {
            EffectKind::Glass => Block::Glass(GlassEffect::mount(stage, id, parse_config(&spec.config)?, opts)?),
            EffectKind::Fluid => Block::Fluid(FluidEffect::mount(stage, id, parse_config(&spec.config)?, opts)?),
            EffectKind::Distortion => {
                Block::Distortion(DistortionEffect::mount(stage, id, parse_config(&spec.config)?, opts)?)
            }
            EffectKind::Carousel => {
                Block::Carousel(CarouselEffect::mount(stage, id, parse_config(&spec.config)?, opts)?)
            }
        };
        Ok(block)
    }

    fn effect(&self) -> &dyn Effect {
        match self {
            Block::Glass(e) => e,
            Block::Fluid(e) => e,
            Block::Distortion(e) => e,
            Block::Carousel(e) => e,
        }
    }

    pub fn as_carousel(&self) -> Option<&CarouselEffect> {
        match self {
            Block::Carousel(c) => Some(c),
            _ => None,
        }
    }
}

impl Effect for Block {
    fn id(&self) -> &Id {
        self.effect().id()
    }

    fn kind(&self) -> EffectKind {
        self.effect().kind()
    }

    fn is_mounted(&self) -> bool {
        self.effect().is_mounted()
    }

    fn set_hover(&self, hovered: bool) -> Result<(), EffectError> {
        self.effect().set_hover(hovered)
    }
}
