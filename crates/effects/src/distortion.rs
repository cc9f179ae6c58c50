//! Distortion image plane: an image that ripples and scales up on hover.
//!
//! The image loads out-of-band. Until it is ready `uTexture` stays unbound;
//! if it fails, `uFallback` switches the shader to a neutral fill.

use std::cell::Cell;
use std::rc::Rc;

use foundation::Id;
use foundation::math::{Vec2, lerp};
use gpu::{MountOptions, Stage, TextureState};
use runtime::{AnimatedScalar, Subscription};
use scene::components::{ResourceId, UniformSet, UniformValue};
use serde::Deserialize;
use tracing::warn;

use crate::effect::{Effect, EffectBase, EffectError, EffectKind, EffectState, check_finite, ticker};
use crate::shaders;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DistortionConfig {
    pub src: String,
    pub strength: f64,
    pub hover_scale: f64,
    pub speed: f64,
}

impl Default for DistortionConfig {
    fn default() -> Self {
        Self {
            src: String::new(),
            strength: 0.25,
            hover_scale: 1.05,
            speed: 1.0,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ImageState {
    Loading,
    Bound,
    Fallback,
}

struct DistortionInner {
    base: EffectBase,
    config: DistortionConfig,
    texture: Option<ResourceId>,
    image: Cell<ImageState>,
    hover: AnimatedScalar,
}

impl EffectState for DistortionInner {
    fn base(&self) -> &EffectBase {
        &self.base
    }
}

impl DistortionInner {
    /// Binds the texture once it is ready, or falls back once it failed.
    fn poll_image(&self) {
        if self.image.get() != ImageState::Loading {
            return;
        }
        let state = self.texture.and_then(|t| self.base.handle.texture_state(t));
        match state {
            Some(TextureState::Loading) => {}
            Some(TextureState::Ready { width, height }) => {
                let aspect = if height == 0 {
                    1.0
                } else {
                    f64::from(width) / f64::from(height)
                };
                let texture = self.texture;
                self.base.write(|u| {
                    u.set("uTexture", UniformValue::Texture(texture))?;
                    u.set_float("uImageAspect", aspect)
                });
                self.image.set(ImageState::Bound);
            }
            // Failed, never requested, or released: the surface has already
            // logged the load failure itself.
            _ => self.fall_back(),
        }
    }

    fn fall_back(&self) {
        self.base.write(|u| u.set_float("uFallback", 1.0));
        self.image.set(ImageState::Fallback);
    }
}

pub struct DistortionEffect {
    _tick: Subscription,
    inner: Rc<DistortionInner>,
}

impl DistortionEffect {
    pub fn mount(
        stage: &Stage,
        id: impl Into<Id>,
        config: DistortionConfig,
        opts: MountOptions,
    ) -> Result<Self, EffectError> {
        check_finite("strength", config.strength)?;
        check_finite("hoverScale", config.hover_scale)?;
        check_finite("speed", config.speed)?;
        let id = id.into();
        let schema = [
            ("uTexture", UniformValue::Texture(None)),
            ("uFallback", UniformValue::Float(0.0)),
            ("uHover", UniformValue::Float(0.0)),
            ("uStrength", UniformValue::Float(config.strength as f32)),
            ("uScale", UniformValue::Float(1.0)),
            ("uTime", UniformValue::Float(0.0)),
            ("uPointer", UniformValue::Vec2([0.0, 0.0])),
            ("uImageAspect", UniformValue::Float(1.0)),
        ];
        let base = EffectBase::mount(
            stage,
            id.clone(),
            shaders::DISTORTION,
            Vec2::new(1.0, 1.0),
            &schema,
            opts,
        )?;
        let texture = if config.src.is_empty() {
            warn!(effect = %id, "distortion plane has no image source; using fallback");
            None
        } else {
            Some(base.handle.load_texture(&config.src)?)
        };
        let inner = Rc::new(DistortionInner {
            base,
            config,
            texture,
            image: Cell::new(ImageState::Loading),
            hover: AnimatedScalar::new(0.0),
        });
        if texture.is_none() {
            inner.fall_back();
        }
        let tick = ticker(stage, &inner, |plane, frame| {
            plane.poll_image();
            if !plane.base.on_screen() {
                return;
            }
            let time = plane.base.advance_time(frame.dt_s, plane.config.speed);
            let pointer = plane.base.pointer().ndc;
            let hover = plane.hover.get();
            let scale = lerp(1.0, plane.config.hover_scale, hover);
            plane.base.write(|u| {
                u.set_float("uTime", time)?;
                u.set_vec2("uPointer", pointer.x, pointer.y)?;
                u.set_float("uHover", hover)?;
                u.set_float("uScale", scale)
            });
        });
        Ok(Self { _tick: tick, inner })
    }

    /// The image texture, when a source was configured.
    pub fn texture(&self) -> Option<ResourceId> {
        self.inner.texture
    }

    pub fn is_fallback(&self) -> bool {
        self.inner.image.get() == ImageState::Fallback
    }

    pub fn uniforms(&self) -> Result<UniformSet, EffectError> {
        Ok(self.inner.base.handle.uniforms()?)
    }
}

impl Effect for DistortionEffect {
    fn id(&self) -> &Id {
        &self.inner.base.id
    }

    fn kind(&self) -> EffectKind {
        EffectKind::Distortion
    }

    fn is_mounted(&self) -> bool {
        self.inner.base.handle.is_mounted()
    }

    fn set_hover(&self, hovered: bool) -> Result<(), EffectError> {
        self.inner.base.hover_to(&self.inner.hover, hovered)
    }
}

#[cfg(test)]
mod tests {
    use super::{DistortionConfig, DistortionEffect};
    use crate::effect::Effect;
    use crate::effect::testing::{run, stage};
    use gpu::{MountOptions, SurfaceEvent, TextureData};
    use pretty_assertions::assert_eq;

    fn config(src: &str) -> DistortionConfig {
        DistortionConfig {
            src: src.to_string(),
            ..DistortionConfig::default()
        }
    }

    #[test]
    fn ready_texture_binds_with_its_aspect() {
        let (stage, _probe) = stage();
        let plane = DistortionEffect::mount(&stage, "img", config("a.jpg"), MountOptions::default())
            .unwrap();
        let tex = plane.texture().unwrap();
        let t = run(&stage, 0.0, 1, 0.016);
        assert_eq!(plane.uniforms().unwrap().texture("uTexture"), None);

        stage
            .surface()
            .complete_texture(tex, Ok(TextureData::new(2, 1, vec![0; 8])));
        run(&stage, t, 1, 0.016);
        let u = plane.uniforms().unwrap();
        assert_eq!(u.texture("uTexture"), Some(tex));
        assert_eq!(u.float("uImageAspect"), Some(2.0));
        assert_eq!(u.float("uFallback"), Some(0.0));
    }

    #[test]
    fn failed_texture_falls_back_and_keeps_drawing() {
        let (stage, probe) = stage();
        let plane = DistortionEffect::mount(&stage, "img", config("broken.jpg"), MountOptions::default())
            .unwrap();
        let tex = plane.texture().unwrap();
        let t = run(&stage, 0.0, 1, 0.016);
        stage.surface().complete_texture(tex, Err("decode error".into()));
        let drawn = probe.draws();
        run(&stage, t, 3, 0.016);

        assert!(plane.is_fallback());
        let u = plane.uniforms().unwrap();
        assert_eq!(u.float("uFallback"), Some(1.0));
        assert_eq!(u.texture("uTexture"), None);
        assert!(probe.draws() > drawn);
        let failures = stage
            .surface()
            .events()
            .into_iter()
            .filter(|e| matches!(e, SurfaceEvent::ResourceFailed { .. }))
            .count();
        assert_eq!(failures, 1);
    }

    #[test]
    fn missing_source_uses_fallback_immediately() {
        let (stage, _probe) = stage();
        let plane = DistortionEffect::mount(&stage, "img", config(""), MountOptions::default()).unwrap();
        assert!(plane.is_fallback());
        assert!(plane.texture().is_none());
        assert!(stage.surface().take_pending_loads().is_empty());
    }

    #[test]
    fn hover_scales_the_image() {
        let (stage, _probe) = stage();
        let plane = DistortionEffect::mount(&stage, "img", config("a.jpg"), MountOptions::default())
            .unwrap();
        plane.set_hover(true).unwrap();
        run(&stage, 0.0, 30, 0.05);
        let u = plane.uniforms().unwrap();
        assert_eq!(u.float("uHover"), Some(1.0));
        assert!((u.float("uScale").unwrap() - 1.05).abs() < 1e-6);
    }
}
