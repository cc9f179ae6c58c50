//! Fluid overlay: a soft trail that follows the pointer and fades out.

use std::cell::Cell;
use std::rc::Rc;

use foundation::Id;
use foundation::math::Vec2;
use gpu::{MountOptions, Stage};
use runtime::Subscription;
use scene::components::{UniformSet, UniformValue};
use serde::Deserialize;

use crate::effect::{Effect, EffectBase, EffectError, EffectKind, EffectState, check_finite, ticker};
use crate::shaders;

#[derive(Debug, Copy, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FluidConfig {
    pub intensity: f64,
    /// Fraction of velocity kept per 60 Hz frame.
    pub dissipation: f64,
    pub radius: f64,
    pub color: [f32; 4],
    pub speed: f64,
}

impl Default for FluidConfig {
    fn default() -> Self {
        Self {
            intensity: 1.0,
            dissipation: 0.96,
            radius: 0.2,
            color: [1.0, 1.0, 1.0, 1.0],
            speed: 1.0,
        }
    }
}

/// Decays `velocity` over `dt` seconds and adds this frame's pointer motion.
/// Decay is frame-rate independent: `dissipation` applies per 1/60 s.
pub fn step_velocity(velocity: Vec2, pointer_delta: Vec2, dissipation: f64, dt: f64) -> Vec2 {
    let decay = dissipation.clamp(0.0, 1.0).powf(dt * 60.0);
    velocity.scale(decay) + pointer_delta
}

struct FluidInner {
    base: EffectBase,
    config: FluidConfig,
    velocity: Cell<Vec2>,
    last_pointer: Cell<Option<Vec2>>,
}

impl EffectState for FluidInner {
    fn base(&self) -> &EffectBase {
        &self.base
    }
}

pub struct FluidEffect {
    _tick: Subscription,
    inner: Rc<FluidInner>,
}

impl FluidEffect {
    pub fn mount(
        stage: &Stage,
        id: impl Into<Id>,
        config: FluidConfig,
        opts: MountOptions,
    ) -> Result<Self, EffectError> {
        check_finite("intensity", config.intensity)?;
        check_finite("dissipation", config.dissipation)?;
        check_finite("radius", config.radius)?;
        check_finite("speed", config.speed)?;
        let schema = [
            ("uTime", UniformValue::Float(0.0)),
            ("uPointer", UniformValue::Vec2([0.0, 0.0])),
            ("uVelocity", UniformValue::Vec2([0.0, 0.0])),
            ("uIntensity", UniformValue::Float(config.intensity as f32)),
            ("uRadius", UniformValue::Float(config.radius as f32)),
            ("uColor", UniformValue::Color(config.color)),
            ("uDissipation", UniformValue::Float(config.dissipation as f32)),
        ];
        // Covers the whole surface at the default camera distance.
        let size = stage.surface().camera().visible_size_at(5.0);
        let base = EffectBase::mount(stage, id.into(), shaders::FLUID, size, &schema, opts)?;
        let inner = Rc::new(FluidInner {
            base,
            config,
            velocity: Cell::new(Vec2::ZERO),
            last_pointer: Cell::new(None),
        });
        let tick = ticker(stage, &inner, |fluid, frame| {
            if !fluid.base.on_screen() {
                return;
            }
            let time = fluid.base.advance_time(frame.dt_s, fluid.config.speed);
            let pointer = fluid.base.pointer().ndc;
            let delta = match fluid.last_pointer.replace(Some(pointer)) {
                Some(prev) if !fluid.base.reduced_motion() => pointer - prev,
                _ => Vec2::ZERO,
            };
            let velocity = step_velocity(
                fluid.velocity.get(),
                delta,
                fluid.config.dissipation,
                frame.dt_s,
            );
            fluid.velocity.set(velocity);
            fluid.base.write(|u| {
                u.set_float("uTime", time)?;
                u.set_vec2("uPointer", pointer.x, pointer.y)?;
                u.set_vec2("uVelocity", velocity.x, velocity.y)
            });
        });
        Ok(Self { _tick: tick, inner })
    }

    pub fn velocity(&self) -> Vec2 {
        self.inner.velocity.get()
    }

    pub fn time(&self) -> f64 {
        self.inner.base.time()
    }

    pub fn uniforms(&self) -> Result<UniformSet, EffectError> {
        Ok(self.inner.base.handle.uniforms()?)
    }
}

impl Effect for FluidEffect {
    fn id(&self) -> &Id {
        &self.inner.base.id
    }

    fn kind(&self) -> EffectKind {
        EffectKind::Fluid
    }

    fn is_mounted(&self) -> bool {
        self.inner.base.handle.is_mounted()
    }
}
