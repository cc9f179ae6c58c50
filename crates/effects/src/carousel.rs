//! Carousel transition plane.
//!
//! Two textures (the current slide and the target) are blended by
//! `uProgress`, which a tween drives from 0 to 1 under `<mount>/progress`.
//! When the tween completes the target becomes current and `uProgress`
//! drops back to 0. Triggering another transition mid-flight commits the
//! in-flight target first, so the new transition starts from it.
//!
//! Autoplay is a looping timeline `<mount>/autoplay`. It belongs to the
//! mount, not the effect value: it is removed when the content unmounts,
//! and a stale effect (unmounted, or replaced under the same id) can no
//! longer start transitions.

use std::cell::Cell;
use std::rc::Rc;

use foundation::Id;
use foundation::math::Vec2;
use gpu::{MountOptions, Stage, TextureState};
use runtime::{AnimatedScalar, Easing, Subscription, TimelineOptions, TweenOptions};
use scene::components::{ResourceId, UniformSet, UniformValue};
use serde::Deserialize;
use tracing::warn;

use crate::effect::{Effect, EffectBase, EffectError, EffectKind, EffectState, check_finite, ticker};
use crate::shaders;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlideDirection {
    #[default]
    Next,
    Prev,
}

impl SlideDirection {
    fn sign(self) -> f64 {
        match self {
            SlideDirection::Next => 1.0,
            SlideDirection::Prev => -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CarouselConfig {
    pub slides: Vec<String>,
    /// Seconds per transition.
    pub duration: f64,
    /// Direction autoplay advances in.
    pub direction: SlideDirection,
    /// Seconds between automatic advances; `0` disables autoplay.
    pub autoplay: f64,
}

impl Default for CarouselConfig {
    fn default() -> Self {
        Self {
            slides: Vec::new(),
            duration: 1.2,
            direction: SlideDirection::Next,
            autoplay: 0.0,
        }
    }
}

struct CarouselInner {
    base: EffectBase,
    config: CarouselConfig,
    slides: Vec<ResourceId>,
    current: Cell<usize>,
    target: Cell<Option<usize>>,
    direction: Cell<SlideDirection>,
    progress: AnimatedScalar,
}

impl EffectState for CarouselInner {
    fn base(&self) -> &EffectBase {
        &self.base
    }
}

impl CarouselInner {
    fn progress_id(&self) -> Id {
        self.base.id.child("progress")
    }

    fn commit(&self) {
        if let Some(target) = self.target.take() {
            self.current.set(target);
        }
        self.progress.set(0.0);
    }

    fn ready(&self, slide: usize) -> Option<ResourceId> {
        let texture = *self.slides.get(slide)?;
        match self.base.handle.texture_state(texture) {
            Some(TextureState::Ready { .. }) => Some(texture),
            _ => None,
        }
    }

    fn write_uniforms(&self) {
        let current = self.current.get();
        let from = self.ready(current);
        let to = self.ready(self.target.get().unwrap_or(current));
        let progress = self.progress.get();
        let direction = self.direction.get().sign();
        self.base.write(|u| {
            u.set("uTextureFrom", UniformValue::Texture(from))?;
            u.set("uTextureTo", UniformValue::Texture(to))?;
            u.set_float("uProgress", progress)?;
            u.set_float("uDirection", direction)
        });
    }
}

/// Starts a transition toward the slide `pick` chooses from the current
/// slide and the slide count.
fn transition(
    inner: &Rc<CarouselInner>,
    pick: impl FnOnce(usize, usize) -> (usize, SlideDirection),
) -> Result<(), EffectError> {
    inner.base.ensure_mounted()?;
    inner.commit();
    let (to, direction) = pick(inner.current.get(), inner.slides.len());
    if to == inner.current.get() {
        inner.base.tweens.stop(&inner.progress_id());
        return Ok(());
    }
    inner.direction.set(direction);
    if inner.base.reduced_motion() {
        inner.base.tweens.stop(&inner.progress_id());
        inner.current.set(to);
        inner.write_uniforms();
        return Ok(());
    }
    inner.target.set(Some(to));
    let weak = Rc::downgrade(inner);
    inner.base.tweens.animate_scalar(
        inner.progress_id(),
        &inner.progress,
        1.0,
        inner.config.duration,
        TweenOptions::default()
            .ease(Easing::ExpoInOut)
            .owner(inner.base.id.clone())
            .on_complete(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.commit();
                }
            }),
    )?;
    Ok(())
}

pub struct CarouselEffect {
    _tick: Subscription,
    inner: Rc<CarouselInner>,
}

impl CarouselEffect {
    pub fn mount(
        stage: &Stage,
        id: impl Into<Id>,
        config: CarouselConfig,
        opts: MountOptions,
    ) -> Result<Self, EffectError> {
        if config.slides.is_empty() {
            return Err(EffectError::NoSlides);
        }
        if !(check_finite("duration", config.duration)? > 0.0) {
            return Err(EffectError::Config("`duration` must be positive".into()));
        }
        if !(check_finite("autoplay", config.autoplay)? >= 0.0) {
            return Err(EffectError::Config("`autoplay` must not be negative".into()));
        }
        let id = id.into();
        let schema = [
            ("uTextureFrom", UniformValue::Texture(None)),
            ("uTextureTo", UniformValue::Texture(None)),
            ("uProgress", UniformValue::Float(0.0)),
            ("uDirection", UniformValue::Float(1.0)),
        ];
        let base = EffectBase::mount(
            stage,
            id.clone(),
            shaders::CAROUSEL,
            Vec2::new(1.0, 1.0),
            &schema,
            opts,
        )?;
        let slides = config
            .slides
            .iter()
            .map(|src| base.handle.load_texture(src))
            .collect::<Result<Vec<_>, _>>()?;
        let inner = Rc::new(CarouselInner {
            base,
            direction: Cell::new(config.direction),
            config,
            slides,
            current: Cell::new(0),
            target: Cell::new(None),
            progress: AnimatedScalar::new(0.0),
        });

        if inner.config.autoplay > 0.0 {
            let timelines = stage.timelines().clone();
            let timeline = id.child("autoplay");
            let interval = inner.config.autoplay;
            timelines.create_timeline(
                timeline.clone(),
                interval,
                TimelineOptions {
                    looping: true,
                    ..TimelineOptions::default()
                },
            )?;
            let owned = timelines.clone();
            let name = timeline.clone();
            inner.base.handle.on_unmount(move |_| {
                owned.remove_timeline(&name);
            })?;
            let weak = Rc::downgrade(&inner);
            timelines.add_marker(&timeline, interval, move |_| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.base.reduced_motion() || !inner.base.on_screen() {
                    return;
                }
                let direction = inner.config.direction;
                if let Err(err) = transition(&inner, |c, n| step(c, n, direction)) {
                    warn!(effect = %inner.base.id, error = %err, "carousel autoplay failed");
                }
            })?;
        }

        let tick = ticker(stage, &inner, |carousel, _frame| {
            if carousel.base.on_screen() {
                carousel.write_uniforms();
            }
        });
        Ok(Self { _tick: tick, inner })
    }

    pub fn next(&self) -> Result<(), EffectError> {
        transition(&self.inner, |c, n| step(c, n, SlideDirection::Next))
    }

    pub fn prev(&self) -> Result<(), EffectError> {
        transition(&self.inner, |c, n| step(c, n, SlideDirection::Prev))
    }

    /// Transitions to slide `index` modulo the slide count.
    pub fn go_to(&self, index: usize) -> Result<(), EffectError> {
        transition(&self.inner, |current, n| {
            let to = index % n;
            let direction = if to >= current {
                SlideDirection::Next
            } else {
                SlideDirection::Prev
            };
            (to, direction)
        })
    }

    pub fn current(&self) -> usize {
        self.inner.current.get()
    }

    /// Slide being transitioned to, if a transition is in flight.
    pub fn target(&self) -> Option<usize> {
        self.inner.target.get()
    }

    pub fn progress(&self) -> f64 {
        self.inner.progress.get()
    }

    pub fn slides(&self) -> &[ResourceId] {
        &self.inner.slides
    }

    pub fn uniforms(&self) -> Result<UniformSet, EffectError> {
        Ok(self.inner.base.handle.uniforms()?)
    }
}

fn step(current: usize, count: usize, direction: SlideDirection) -> (usize, SlideDirection) {
    let to = match direction {
        SlideDirection::Next => (current + 1) % count,
        SlideDirection::Prev => (current + count - 1) % count,
    };
    (to, direction)
}

impl Effect for CarouselEffect {
    fn id(&self) -> &Id {
        &self.inner.base.id
    }

    fn kind(&self) -> EffectKind {
        EffectKind::Carousel
    }

    fn is_mounted(&self) -> bool {
        self.inner.base.handle.is_mounted()
    }
}

#[cfg(test)]
mod tests {
    use super::{CarouselConfig, CarouselEffect, SlideDirection};
    use crate::effect::testing::{run, stage};
    use crate::effect::{Effect, EffectError};
    use foundation::Id;
    use gpu::{MountOptions, TextureData};
    use pretty_assertions::assert_eq;

    fn three_slides() -> CarouselConfig {
        CarouselConfig {
            slides: vec!["a.jpg".into(), "b.jpg".into(), "c.jpg".into()],
            ..CarouselConfig::default()
        }
    }

    #[test]
    fn next_tweens_progress_then_commits() {
        let (stage, _probe) = stage();
        let carousel = CarouselEffect::mount(&stage, "slides", three_slides(), MountOptions::default())
            .unwrap();
        carousel.next().unwrap();
        assert_eq!(carousel.target(), Some(1));
        assert!(stage.tweens().is_active(&Id::from("slides/progress")));

        let t = run(&stage, 0.0, 10, 0.05);
        assert!(carousel.progress() > 0.0 && carousel.progress() < 1.0);
        assert_eq!(carousel.current(), 0);

        run(&stage, t, 30, 0.05);
        assert_eq!(carousel.current(), 1);
        assert_eq!(carousel.target(), None);
        assert_eq!(carousel.progress(), 0.0);
        assert_eq!(carousel.uniforms().unwrap().float("uProgress"), Some(0.0));
    }

    #[test]
    fn retrigger_commits_the_in_flight_target() {
        let (stage, _probe) = stage();
        let carousel = CarouselEffect::mount(&stage, "slides", three_slides(), MountOptions::default())
            .unwrap();
        carousel.next().unwrap();
        let t = run(&stage, 0.0, 8, 0.05);
        carousel.next().unwrap();
        assert_eq!(carousel.current(), 1);
        assert_eq!(carousel.target(), Some(2));
        assert_eq!(carousel.progress(), 0.0);

        run(&stage, t, 40, 0.05);
        assert_eq!(carousel.current(), 2);
    }

    #[test]
    fn indices_wrap_both_ways() {
        let (stage, _probe) = stage();
        let carousel = CarouselEffect::mount(&stage, "slides", three_slides(), MountOptions::default())
            .unwrap();
        carousel.prev().unwrap();
        assert_eq!(carousel.target(), Some(2));
        assert_eq!(
            carousel.uniforms().unwrap().float("uDirection"),
            Some(1.0),
            "uniforms follow on the next tick"
        );
        run(&stage, 0.0, 1, 0.016);
        assert_eq!(carousel.uniforms().unwrap().float("uDirection"), Some(-1.0));

        carousel.go_to(7).unwrap();
        assert_eq!(carousel.current(), 2);
        assert_eq!(carousel.target(), Some(1));
    }

    #[test]
    fn reduced_motion_switches_slides_instantly() {
        let (stage, _probe) = stage();
        stage.set_reduced_motion(true);
        let carousel = CarouselEffect::mount(&stage, "slides", three_slides(), MountOptions::default())
            .unwrap();
        carousel.next().unwrap();
        assert_eq!(carousel.current(), 1);
        assert_eq!(carousel.target(), None);
        assert!(!stage.tweens().is_active(&Id::from("slides/progress")));
    }

    #[test]
    fn ready_slides_bind_to_from_and_to() {
        let (stage, _probe) = stage();
        let carousel = CarouselEffect::mount(&stage, "slides", three_slides(), MountOptions::default())
            .unwrap();
        let slides = carousel.slides().to_vec();
        for tex in &slides {
            stage
                .surface()
                .complete_texture(*tex, Ok(TextureData::solid([0, 0, 0, 255])));
        }
        carousel.next().unwrap();
        run(&stage, 0.0, 2, 0.016);
        let u = carousel.uniforms().unwrap();
        assert_eq!(u.texture("uTextureFrom"), Some(slides[0]));
        assert_eq!(u.texture("uTextureTo"), Some(slides[1]));
    }

    #[test]
    fn autoplay_advances_on_its_interval() {
        let (stage, _probe) = stage();
        let carousel = CarouselEffect::mount(
            &stage,
            "slides",
            CarouselConfig {
                autoplay: 1.0,
                direction: SlideDirection::Prev,
                ..three_slides()
            },
            MountOptions::default(),
        )
        .unwrap();
        run(&stage, 0.0, 15, 0.05);
        assert_eq!(carousel.target(), None);
        run(&stage, 0.75, 10, 0.05);
        assert_eq!(carousel.target(), Some(2));

        drop(carousel);
        assert!(stage.timelines().is_empty());
    }

    #[test]
    fn surface_unmount_stops_autoplay_and_transitions() {
        let (stage, _probe) = stage();
        let carousel = CarouselEffect::mount(
            &stage,
            "c",
            CarouselConfig {
                autoplay: 0.5,
                ..three_slides()
            },
            MountOptions::default(),
        )
        .unwrap();
        assert!(stage.surface().unmount(&Id::from("c")));
        assert!(stage.timelines().is_empty());

        run(&stage, 0.0, 20, 0.05);
        assert!(!stage.tweens().is_active(&Id::from("c/progress")));
        assert_eq!(carousel.target(), None);
        assert!(matches!(carousel.next(), Err(EffectError::Mount(_))));
        assert!(!stage.tweens().is_active(&Id::from("c/progress")));
    }

    #[test]
    fn replaced_carousel_leaves_its_successor_running() {
        let (stage, _probe) = stage();
        let config = CarouselConfig {
            autoplay: 0.5,
            ..three_slides()
        };
        let first = CarouselEffect::mount(&stage, "c", config.clone(), MountOptions::default()).unwrap();
        let second = CarouselEffect::mount(&stage, "c", config, MountOptions::default()).unwrap();
        assert!(!first.is_mounted());
        assert_eq!(stage.timelines().len(), 1);
        assert!(first.go_to(2).is_err());

        drop(first);
        assert_eq!(stage.timelines().len(), 1);
        assert!(second.is_mounted());
        run(&stage, 0.0, 14, 0.05);
        assert_eq!(second.target(), Some(1));
    }

    #[test]
    fn empty_or_invalid_configs_are_rejected() {
        let (stage, _probe) = stage();
        assert!(matches!(
            CarouselEffect::mount(&stage, "a", CarouselConfig::default(), MountOptions::default()),
            Err(EffectError::NoSlides)
        ));
        assert!(matches!(
            CarouselEffect::mount(
                &stage,
                "b",
                CarouselConfig {
                    duration: 0.0,
                    ..three_slides()
                },
                MountOptions::default()
            ),
            Err(EffectError::Config(_))
        ));
    }
}
