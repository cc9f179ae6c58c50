//! Shared effect plumbing: errors, the [`Effect`] trait and the mount and
//! per-frame services every primitive builds on.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::str::FromStr;

use foundation::Id;
use foundation::math::Vec2;
use gpu::{MountError, MountHandle, MountOptions, SharedSurface, Stage};
use runtime::{
    AnimatedScalar, Easing, Frame, Subscription, TimelineError, TweenEngine, TweenError,
    TweenOptions, priority,
};
use scene::components::{Drawable, UniformError, UniformSet, UniformValue};
use scene::graph::SceneNode;
use scene::{PointerBridge, PointerSnapshot, ViewRegistry};
use serde::Deserialize;
use tracing::warn;

/// Hover transitions: `<mount>/hover`, 0.6 s, exponential ease-out.
pub const HOVER_DURATION: f64 = 0.6;

/// Pointer state an effect holds while hovered.
pub const HOVER_STATE: &str = "-webgl";

#[derive(Debug, Clone, PartialEq)]
pub enum EffectError {
    Mount(MountError),
    Uniform(UniformError),
    Tween(TweenError),
    Timeline(TimelineError),
    /// The configuration could not be parsed or is out of range.
    Config(String),
    UnknownKind(String),
    NoSlides,
}

impl fmt::Display for EffectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectError::Mount(err) => write!(f, "mount: {err}"),
            EffectError::Uniform(err) => write!(f, "uniforms: {err}"),
            EffectError::Tween(err) => write!(f, "tween: {err}"),
            EffectError::Timeline(err) => write!(f, "timeline: {err}"),
            EffectError::Config(reason) => write!(f, "invalid effect config: {reason}"),
            EffectError::UnknownKind(kind) => write!(f, "unknown effect kind `{kind}`"),
            EffectError::NoSlides => write!(f, "carousel has no slides"),
        }
    }
}

impl std::error::Error for EffectError {}

impl From<MountError> for EffectError {
    fn from(err: MountError) -> Self {
        EffectError::Mount(err)
    }
}

impl From<UniformError> for EffectError {
    fn from(err: UniformError) -> Self {
        EffectError::Uniform(err)
    }
}

impl From<TweenError> for EffectError {
    fn from(err: TweenError) -> Self {
        EffectError::Tween(err)
    }
}

impl From<TimelineError> for EffectError {
    fn from(err: TimelineError) -> Self {
        EffectError::Timeline(err)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    Glass,
    Fluid,
    Distortion,
    Carousel,
}

impl EffectKind {
    pub fn name(self) -> &'static str {
        match self {
            EffectKind::Glass => "glass",
            EffectKind::Fluid => "fluid",
            EffectKind::Distortion => "distortion",
            EffectKind::Carousel => "carousel",
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EffectKind {
    type Err = EffectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "glass" => Ok(EffectKind::Glass),
            "fluid" => Ok(EffectKind::Fluid),
            "distortion" => Ok(EffectKind::Distortion),
            "carousel" => Ok(EffectKind::Carousel),
            other => Err(EffectError::UnknownKind(other.to_string())),
        }
    }
}

/// What every mounted primitive can do, whatever its kind.
pub trait Effect {
    fn id(&self) -> &Id;

    fn kind(&self) -> EffectKind;

    fn is_mounted(&self) -> bool;

    /// Starts the hover transition toward on or off. Kinds without a hover
    /// state ignore it.
    fn set_hover(&self, _hovered: bool) -> Result<(), EffectError> {
        Ok(())
    }
}

/// State and services every primitive shares: its mount, the stage handles
/// it reads each frame and its own effect time.
pub(crate) struct EffectBase {
    pub(crate) id: Id,
    pub(crate) handle: MountHandle,
    view: Option<Id>,
    surface: SharedSurface,
    views: ViewRegistry,
    pointer: PointerBridge,
    pub(crate) tweens: TweenEngine,
    time: Cell<f64>,
    update_failed: Cell<bool>,
    /// Cleared by an unmount hook, whoever unmounted the content.
    live: Rc<Cell<bool>>,
}

impl EffectBase {
    pub(crate) fn mount(
        stage: &Stage,
        id: Id,
        program: &'static str,
        size: Vec2,
        schema: &[(&'static str, UniformValue)],
        opts: MountOptions,
    ) -> Result<Self, EffectError> {
        let uniforms = UniformSet::new(schema)?;
        let view = opts.view.clone();
        let handle = stage.mount(id.clone(), SceneNode::new(Drawable::quad(program, size, uniforms)), opts)?;
        let live = Rc::new(Cell::new(true));
        let flag = Rc::clone(&live);
        handle.on_unmount(move |_| flag.set(false))?;
        Ok(Self {
            id,
            handle,
            view,
            surface: stage.surface().clone(),
            views: stage.views().clone(),
            pointer: stage.pointer().clone(),
            tweens: stage.tweens().clone(),
            time: Cell::new(0.0),
            update_failed: Cell::new(false),
            live,
        })
    }

    /// Whether the content is still mounted under this effect's handle.
    pub(crate) fn is_live(&self) -> bool {
        self.live.get()
    }

    /// Fails once the content was unmounted or replaced, so a stale effect
    /// never starts tweens under ids its successor now uses.
    pub(crate) fn ensure_mounted(&self) -> Result<(), EffectError> {
        if !self.is_live() {
            return Err(EffectError::Mount(MountError::Unmounted(self.id.clone())));
        }
        Ok(self.handle.ensure_owned()?)
    }

    /// Off-screen content skips its per-frame uniform work.
    pub(crate) fn on_screen(&self) -> bool {
        match &self.view {
            Some(view) => !self.views.contains(view) || self.views.is_visible(view),
            None => true,
        }
    }

    pub(crate) fn reduced_motion(&self) -> bool {
        self.surface.reduced_motion()
    }

    /// Advances effect time by `dt * speed`. Frozen under reduced motion.
    pub(crate) fn advance_time(&self, dt: f64, speed: f64) -> f64 {
        if !self.reduced_motion() {
            self.time.set(self.time.get() + dt * speed);
        }
        self.time.get()
    }

    pub(crate) fn time(&self) -> f64 {
        self.time.get()
    }

    pub(crate) fn pointer(&self) -> PointerSnapshot {
        self.pointer.snapshot()
    }

    /// Retargets `scalar` toward 1 or 0 from wherever it currently is.
    /// Under reduced motion it jumps straight there.
    pub(crate) fn hover_to(&self, scalar: &AnimatedScalar, hovered: bool) -> Result<(), EffectError> {
        self.ensure_mounted()?;
        if hovered {
            self.pointer.push_state(HOVER_STATE, &self.id);
        } else {
            self.pointer.pop_state(HOVER_STATE, &self.id);
        }
        let target = if hovered { 1.0 } else { 0.0 };
        if scalar.get() == target || self.reduced_motion() {
            self.tweens.stop(&self.id.child("hover"));
            scalar.set(target);
            return Ok(());
        }
        self.tweens.animate_scalar(
            self.id.child("hover"),
            scalar,
            target,
            HOVER_DURATION,
            TweenOptions::default()
                .ease(Easing::ExpoOut)
                .owner(self.id.clone()),
        )?;
        Ok(())
    }

    /// Writes uniforms through the mount handle. A failure is logged once;
    /// it means the handle went stale and the effect no longer draws.
    pub(crate) fn write(&self, f: impl FnOnce(&mut UniformSet) -> Result<(), UniformError>) {
        if let Err(err) = self.handle.update_uniforms(f) {
            if !self.update_failed.replace(true) {
                warn!(effect = %self.id, error = %err, "effect uniform update failed");
            }
        }
    }
}

/// Per-effect state that carries an [`EffectBase`].
pub(crate) trait EffectState: 'static {
    fn base(&self) -> &EffectBase;
}

/// Subscribes `update` at the effect tier for as long as `state` lives and
/// its content stays mounted.
pub(crate) fn ticker<S: EffectState>(
    stage: &Stage,
    state: &Rc<S>,
    mut update: impl FnMut(&S, Frame) + 'static,
) -> Subscription {
    let weak: Weak<S> = Rc::downgrade(state);
    stage.clock().subscribe(priority::EFFECTS, move |frame| {
        let Some(state) = weak.upgrade() else {
            return;
        };
        if state.base().is_live() {
            update(&state, frame);
        }
    })
}

/// Deserializes an effect configuration; `null` means all defaults.
pub(crate) fn parse_config<T>(value: &serde_json::Value) -> Result<T, EffectError>
where
    T: Default + for<'de> Deserialize<'de>,
{
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value.clone()).map_err(|err| EffectError::Config(err.to_string()))
}

pub(crate) fn check_finite(name: &str, value: f64) -> Result<f64, EffectError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EffectError::Config(format!("`{name}` must be finite")))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use gpu::{DrawBackend, RecordingBackend, Stage, StageConfig, SurfaceConfig};
    use foundation::time::Time;

    pub(crate) fn stage() -> (Stage, RecordingBackend) {
        let probe = RecordingBackend::new();
        let backend = probe.clone();
        let config = StageConfig {
            surface: SurfaceConfig {
                strict_mounts: false,
                ..SurfaceConfig::default()
            },
            ..StageConfig::default()
        };
        let stage = Stage::new(config, move || Ok(Box::new(backend) as Box<dyn DrawBackend>)).unwrap();
        stage.resize(800.0, 600.0, 1.0).unwrap();
        (stage, probe)
    }

    /// Ticks `n` frames of `dt` seconds starting after `from`.
    pub(crate) fn run(stage: &Stage, from: f64, n: usize, dt: f64) -> f64 {
        let mut t = from;
        for _ in 0..n {
            t += dt;
            stage.frame(Time(t));
        }
        t
    }
}
