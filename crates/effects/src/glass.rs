//! Glass morphism.
//!
//! A variant names a fixed row of multipliers; the configured physical
//! parameters are scaled by that row to produce the uniforms. The table is a
//! visual contract and must not be tuned per call site.

use std::cell::RefCell;
use std::rc::Rc;

use foundation::Id;
use foundation::math::{Vec2, clamp01};
use gpu::{MountOptions, Stage};
use runtime::{AnimatedScalar, Subscription};
use scene::components::{UniformSet, UniformValue};
use serde::Deserialize;

use crate::effect::{Effect, EffectBase, EffectError, EffectKind, EffectState, check_finite, ticker};
use crate::shaders;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlassVariant {
    #[default]
    Card,
    Panel,
    Subtle,
    Frost,
    Liquid,
}

/// Multipliers a variant applies to the configured parameters.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GlassPreset {
    pub transmission: f64,
    pub roughness: f64,
    pub thickness: f64,
    pub ior: f64,
    pub chromatic_aberration: f64,
    pub distortion: f64,
}

impl GlassVariant {
    pub const fn preset(self) -> GlassPreset {
        let (transmission, roughness, thickness, ior, chromatic_aberration, distortion) = match self {
            GlassVariant::Card => (1.00, 1.00, 1.00, 1.00, 1.00, 1.00),
            GlassVariant::Panel => (0.95, 0.80, 0.60, 1.00, 0.50, 0.50),
            GlassVariant::Subtle => (0.90, 0.50, 0.30, 0.98, 0.25, 0.20),
            GlassVariant::Frost => (0.85, 2.00, 1.20, 1.00, 0.30, 0.40),
            GlassVariant::Liquid => (1.00, 0.00, 1.50, 1.05, 1.50, 2.00),
        };
        GlassPreset {
            transmission,
            roughness,
            thickness,
            ior,
            chromatic_aberration,
            distortion,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlassConfig {
    pub variant: GlassVariant,
    /// `0..1`; scales chromatic aberration and distortion.
    pub intensity: f64,
    pub thickness: f64,
    pub roughness: f64,
    pub transmission: f64,
    pub ior: f64,
    pub chromatic_aberration: f64,
    pub distortion: f64,
    pub scale: f64,
}

impl Default for GlassConfig {
    fn default() -> Self {
        Self {
            variant: GlassVariant::Card,
            intensity: 1.0,
            thickness: 1.0,
            roughness: 0.2,
            transmission: 1.0,
            ior: 1.5,
            chromatic_aberration: 0.05,
            distortion: 0.3,
            scale: 1.0,
        }
    }
}

/// Uniform values derived from a config through its variant's preset.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GlassParams {
    pub transmission: f64,
    pub roughness: f64,
    pub thickness: f64,
    pub ior: f64,
    pub chromatic_aberration: f64,
    pub distortion: f64,
    pub scale: f64,
}

impl GlassParams {
    pub fn resolve(config: &GlassConfig) -> Result<Self, EffectError> {
        for (name, value) in [
            ("intensity", config.intensity),
            ("thickness", config.thickness),
            ("roughness", config.roughness),
            ("transmission", config.transmission),
            ("ior", config.ior),
            ("chromaticAberration", config.chromatic_aberration),
            ("distortion", config.distortion),
            ("scale", config.scale),
        ] {
            check_finite(name, value)?;
        }
        let p = config.variant.preset();
        let intensity = clamp01(config.intensity);
        Ok(Self {
            transmission: p.transmission * config.transmission,
            roughness: p.roughness * config.roughness,
            thickness: p.thickness * config.thickness,
            ior: p.ior * config.ior,
            chromatic_aberration: p.chromatic_aberration * config.chromatic_aberration * intensity,
            distortion: p.distortion * config.distortion * intensity,
            scale: config.scale,
        })
    }

    fn write(&self, u: &mut UniformSet) -> Result<(), scene::components::UniformError> {
        u.set_float("uTransmission", self.transmission)?;
        u.set_float("uRoughness", self.roughness)?;
        u.set_float("uThickness", self.thickness)?;
        u.set_float("uIor", self.ior)?;
        u.set_float("uChromaticAberration", self.chromatic_aberration)?;
        u.set_float("uDistortion", self.distortion)?;
        u.set_float("uScale", self.scale)
    }
}

struct GlassInner {
    base: EffectBase,
    params: RefCell<GlassParams>,
    hover: AnimatedScalar,
}

impl EffectState for GlassInner {
    fn base(&self) -> &EffectBase {
        &self.base
    }
}

pub struct GlassEffect {
    _tick: Subscription,
    inner: Rc<GlassInner>,
}

impl GlassEffect {
    pub fn mount(
        stage: &Stage,
        id: impl Into<Id>,
        config: GlassConfig,
        opts: MountOptions,
    ) -> Result<Self, EffectError> {
        let params = GlassParams::resolve(&config)?;
        let f = |v: f64| UniformValue::Float(v as f32);
        let schema = [
            ("uTransmission", f(params.transmission)),
            ("uRoughness", f(params.roughness)),
            ("uThickness", f(params.thickness)),
            ("uIor", f(params.ior)),
            ("uChromaticAberration", f(params.chromatic_aberration)),
            ("uDistortion", f(params.distortion)),
            ("uScale", f(params.scale)),
            ("uTime", f(0.0)),
            ("uPointer", UniformValue::Vec2([0.0, 0.0])),
            ("uHover", f(0.0)),
        ];
        let size = Vec2::new(config.scale, config.scale);
        let base = EffectBase::mount(stage, id.into(), shaders::GLASS, size, &schema, opts)?;
        let inner = Rc::new(GlassInner {
            base,
            params: RefCell::new(params),
            hover: AnimatedScalar::new(0.0),
        });
        let tick = ticker(stage, &inner, |glass, frame| {
            if !glass.base.on_screen() {
                return;
            }
            let time = glass.base.advance_time(frame.dt_s, 1.0);
            let pointer = glass.base.pointer().ndc;
            let hover = glass.hover.get();
            glass.base.write(|u| {
                u.set_float("uTime", time)?;
                u.set_vec2("uPointer", pointer.x, pointer.y)?;
                u.set_float("uHover", hover)
            });
        });
        Ok(Self { _tick: tick, inner })
    }

    /// Switches variant or parameters; uniforms are rewritten at once.
    pub fn set_config(&self, config: &GlassConfig) -> Result<(), EffectError> {
        let params = GlassParams::resolve(config)?;
        self.inner.base.handle.update_uniforms(|u| params.write(u))?;
        *self.inner.params.borrow_mut() = params;
        Ok(())
    }

    pub fn params(&self) -> GlassParams {
        *self.inner.params.borrow()
    }

    pub fn hover(&self) -> f64 {
        self.inner.hover.get()
    }

    pub fn uniforms(&self) -> Result<UniformSet, EffectError> {
        Ok(self.inner.base.handle.uniforms()?)
    }
}

impl Effect for GlassEffect {
    fn id(&self) -> &Id {
        &self.inner.base.id
    }

    fn kind(&self) -> EffectKind {
        EffectKind::Glass
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
    use super::{GlassConfig, GlassEffect, GlassParams, GlassVariant};
    use crate::effect::testing::{run, stage};
    use crate::effect::{Effect, EffectError, HOVER_STATE};
    use foundation::Id;
    use gpu::MountOptions;
    use pretty_assertions::assert_eq;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn liquid_roughness_is_zero_for_any_input() {
        for roughness in [0.0, 0.2, 1.0, 7.5] {
            let params = GlassParams::resolve(&GlassConfig {
                variant: GlassVariant::Liquid,
                roughness,
                ..GlassConfig::default()
            })
            .unwrap();
            assert_eq!(params.roughness, 0.0);
        }
    }

    #[test]
    fn presets_scale_configured_values() {
        let config = GlassConfig {
            variant: GlassVariant::Frost,
            intensity: 0.5,
            ..GlassConfig::default()
        };
        let p = GlassParams::resolve(&config).unwrap();
        assert!(approx(p.transmission, 0.85));
        assert!(approx(p.roughness, 0.4));
        assert!(approx(p.thickness, 1.2));
        assert!(approx(p.ior, 1.5));
        assert!(approx(p.chromatic_aberration, 0.3 * 0.05 * 0.5));
        assert!(approx(p.distortion, 0.4 * 0.3 * 0.5));

        let subtle = GlassVariant::Subtle.preset();
        assert_eq!(
            (subtle.transmission, subtle.ior, subtle.distortion),
            (0.90, 0.98, 0.20)
        );
    }

    #[test]
    fn intensity_is_clamped_and_non_finite_input_rejected() {
        let p = GlassParams::resolve(&GlassConfig {
            intensity: 3.0,
            ..GlassConfig::default()
        })
        .unwrap();
        assert!(approx(p.distortion, 0.3));
        assert!(
            GlassParams::resolve(&GlassConfig {
                ior: f64::INFINITY,
                ..GlassConfig::default()
            })
            .is_err()
        );
    }

    #[test]
    fn config_parses_from_block_json() {
        let config: GlassConfig =
            serde_json::from_str(r#"{"variant":"panel","chromaticAberration":0.1}"#).unwrap();
        assert_eq!(config.variant, GlassVariant::Panel);
        assert_eq!(config.chromatic_aberration, 0.1);
        assert_eq!(config.ior, 1.5);
    }

    #[test]
    fn hover_animates_and_retargets_from_current_value() {
        let (stage, _probe) = stage();
        let glass = GlassEffect::mount(&stage, "card", GlassConfig::default(), MountOptions::default())
            .unwrap();
        glass.set_hover(true).unwrap();
        assert!(stage.tweens().is_active(&Id::from("card/hover")));
        assert!(stage.pointer().is_active(HOVER_STATE));

        let t = run(&stage, 0.0, 6, 0.05);
        let mid = glass.hover();
        assert!(mid > 0.0 && mid < 1.0);

        glass.set_hover(false).unwrap();
        assert!(!stage.pointer().is_active(HOVER_STATE));
        run(&stage, t, 1, 0.016);
        assert!(glass.hover() <= mid);

        run(&stage, t + 0.016, 20, 0.05);
        assert_eq!(glass.hover(), 0.0);
        assert!(!stage.tweens().is_active(&Id::from("card/hover")));
        let uniforms = glass.uniforms().unwrap();
        assert_eq!(uniforms.float("uHover"), Some(0.0));
    }

    #[test]
    fn hover_jumps_to_its_target_under_reduced_motion() {
        let (stage, _probe) = stage();
        stage.set_reduced_motion(true);
        let glass = GlassEffect::mount(&stage, "card", GlassConfig::default(), MountOptions::default())
            .unwrap();
        glass.set_hover(true).unwrap();
        assert_eq!(glass.hover(), 1.0);
        assert!(!stage.tweens().is_active(&Id::from("card/hover")));
        run(&stage, 0.0, 1, 0.016);
        assert_eq!(glass.uniforms().unwrap().float("uHover"), Some(1.0));
    }

    #[test]
    fn surface_unmount_leaves_the_effect_inert() {
        let (stage, _probe) = stage();
        let glass = GlassEffect::mount(&stage, "card", GlassConfig::default(), MountOptions::default())
            .unwrap();
        assert!(stage.surface().unmount(&Id::from("card")));
        assert!(!glass.is_mounted());
        assert!(matches!(glass.set_hover(true), Err(EffectError::Mount(_))));
        assert!(!stage.tweens().is_active(&Id::from("card/hover")));
        assert!(!stage.pointer().is_active(HOVER_STATE));
        run(&stage, 0.0, 3, 0.05);
        assert_eq!(glass.hover(), 0.0);
    }

    #[test]
    fn time_freezes_under_reduced_motion() {
        let (stage, _probe) = stage();
        let glass = GlassEffect::mount(&stage, "card", GlassConfig::default(), MountOptions::default())
            .unwrap();
        let t = run(&stage, 0.0, 5, 0.05);
        let before = glass.uniforms().unwrap().float("uTime").unwrap();
        assert!(before > 0.0);

        stage.set_reduced_motion(true);
        run(&stage, t, 5, 0.05);
        assert_eq!(glass.uniforms().unwrap().float("uTime"), Some(before));
    }

    #[test]
    fn variant_switch_rewrites_uniforms() {
        let (stage, _probe) = stage();
        let glass = GlassEffect::mount(&stage, "card", GlassConfig::default(), MountOptions::default())
            .unwrap();
        glass
            .set_config(&GlassConfig {
                variant: GlassVariant::Liquid,
                ..GlassConfig::default()
            })
            .unwrap();
        assert_eq!(glass.uniforms().unwrap().float("uRoughness"), Some(0.0));
        assert_eq!(glass.params().ior, 1.05 * 1.5);
    }

    #[test]
    fn dropping_the_effect_unmounts_and_stops_tweens() {
        let (stage, _probe) = stage();
        let glass = GlassEffect::mount(&stage, "card", GlassConfig::default(), MountOptions::default())
            .unwrap();
        glass.set_hover(true).unwrap();
        let listeners = stage.clock().listener_count();
        drop(glass);
        assert!(!stage.surface().is_mounted(&Id::from("card")));
        assert!(!stage.tweens().is_active(&Id::from("card/hover")));
        assert!(!stage.pointer().is_active(HOVER_STATE));
        assert_eq!(stage.clock().listener_count(), listeners - 1);
    }
}
