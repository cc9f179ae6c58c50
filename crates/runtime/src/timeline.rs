//! Looping time cursors with one-shot markers.
//!
//! A timeline advances by `dt * speed` each frame. Markers fire once per
//! cycle when the cursor reaches them going forward; a loop wrap re-arms all
//! of them. Timelines can be paused one by one, or suspended as a group
//! while the frame clock keeps running for other consumers.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use foundation::Id;
use serde::Deserialize;

use crate::clock::{FrameClock, Subscription, priority};
use crate::frame::Frame;

/// Loop wraps processed one by one in a single update before the rest of a
/// huge step is folded into the current cycle.
const MAX_WRAPS_PER_UPDATE: u32 = 64;

type MarkerFn = Rc<RefCell<dyn FnMut(u64)>>;
type CompleteFn = Rc<RefCell<dyn FnMut()>>;

#[derive(Debug, Clone, PartialEq)]
pub enum TimelineError {
    UnknownTimeline(Id),
    NonPositiveDuration(f64),
    MarkerOutOfRange { time: f64, duration: f64 },
    InvalidSpeed(f64),
}

impl fmt::Display for TimelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimelineError::UnknownTimeline(id) => write!(f, "unknown timeline: {id}"),
            TimelineError::NonPositiveDuration(d) => {
                write!(f, "timeline duration must be positive, got {d}")
            }
            TimelineError::MarkerOutOfRange { time, duration } => {
                write!(f, "marker at {time} is outside 0..={duration}")
            }
            TimelineError::InvalidSpeed(s) => {
                write!(f, "timeline speed must be finite and non-negative, got {s}")
            }
        }
    }
}

impl std::error::Error for TimelineError {}

#[derive(Debug, Copy, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TimelineOptions {
    pub speed: f64,
    #[serde(rename = "loop")]
    pub looping: bool,
    pub autoplay: bool,
}

impl Default for TimelineOptions {
    fn default() -> Self {
        Self {
            speed: 1.0,
            looping: false,
            autoplay: true,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MarkerId(u64);

struct Marker {
    id: MarkerId,
    time: f64,
    triggered: bool,
    callback: MarkerFn,
}

struct Timeline {
    id: Id,
    serial: u64,
    duration: f64,
    current: f64,
    speed: f64,
    looping: bool,
    playing: bool,
    finished: bool,
    cycle: u64,
    /// Sorted by time, then insertion.
    markers: Vec<Marker>,
    on_complete: Option<CompleteFn>,
}

enum Fire {
    Marker(MarkerFn, u64),
    Complete(CompleteFn),
}

impl Timeline {
    fn fire_reached(&mut self, upto: f64, out: &mut Vec<(u64, Fire)>) {
        for m in self.markers.iter_mut() {
            if !m.triggered && m.time <= upto {
                m.triggered = true;
                out.push((self.serial, Fire::Marker(Rc::clone(&m.callback), self.cycle)));
            }
        }
    }

    fn advance(&mut self, step: f64, out: &mut Vec<(u64, Fire)>) {
        let mut remaining = step;
        let mut wraps = 0;
        loop {
            let end = self.current + remaining;
            if end < self.duration {
                self.current = end;
                self.fire_reached(end, out);
                return;
            }

            self.fire_reached(self.duration, out);
            remaining = end - self.duration;

            if !self.looping {
                self.current = self.duration;
                self.playing = false;
                self.finished = true;
                if let Some(cb) = &self.on_complete {
                    out.push((self.serial, Fire::Complete(Rc::clone(cb))));
                }
                return;
            }

            self.cycle += 1;
            self.current = 0.0;
            for m in self.markers.iter_mut() {
                m.triggered = false;
            }
            wraps += 1;
            if wraps >= MAX_WRAPS_PER_UPDATE {
                remaining %= self.duration;
            }
        }
    }

    fn rewind(&mut self) {
        self.current = 0.0;
        self.finished = false;
        for m in self.markers.iter_mut() {
            m.triggered = false;
        }
    }
}

#[derive(Default)]
struct TimelineState {
    timelines: Vec<Timeline>,
    suspended: bool,
    next_serial: u64,
    next_marker: u64,
}

impl TimelineState {
    fn get(&self, id: &Id) -> Option<&Timeline> {
        self.timelines.iter().find(|t| &t.id == id)
    }

    fn get_mut(&mut self, id: &Id) -> Result<&mut Timeline, TimelineError> {
        self.timelines
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| TimelineError::UnknownTimeline(id.clone()))
    }
}

/// Shared handle to the timeline registry.
#[derive(Clone, Default)]
pub struct Timelines {
    state: Rc<RefCell<TimelineState>>,
}

impl fmt::Debug for Timelines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.state.borrow();
        f.debug_struct("Timelines")
            .field("count", &s.timelines.len())
            .field("suspended", &s.suspended)
            .finish()
    }
}

impl Timelines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, clock: &FrameClock) -> Subscription {
        let timelines = self.clone();
        clock.subscribe(priority::TIMELINES, move |frame| timelines.update(frame))
    }

    /// Creates (or replaces) the timeline `id`.
    pub fn create_timeline(
        &self,
        id: impl Into<Id>,
        duration: f64,
        options: TimelineOptions,
    ) -> Result<(), TimelineError> {
        if !(duration > 0.0) || !duration.is_finite() {
            return Err(TimelineError::NonPositiveDuration(duration));
        }
        if !(options.speed >= 0.0) || !options.speed.is_finite() {
            return Err(TimelineError::InvalidSpeed(options.speed));
        }
        let id = id.into();
        let replaced = {
            let mut s = self.state.borrow_mut();
            let serial = s.next_serial;
            s.next_serial += 1;
            let timeline = Timeline {
                id: id.clone(),
                serial,
                duration,
                current: 0.0,
                speed: options.speed,
                looping: options.looping,
                playing: options.autoplay,
                finished: false,
                cycle: 0,
                markers: Vec::new(),
                on_complete: None,
            };
            match s.timelines.iter().position(|t| t.id == id) {
                Some(pos) => Some(std::mem::replace(&mut s.timelines[pos], timeline)),
                None => {
                    s.timelines.push(timeline);
                    None
                }
            }
        };
        if replaced.is_some() {
            tracing::debug!(timeline = %id, "timeline replaced");
        }
        Ok(())
    }

    /// Schedules `callback` at `time` seconds into each cycle. The callback
    /// receives the cycle number it fired in.
    pub fn add_marker(
        &self,
        timeline: &Id,
        time: f64,
        callback: impl FnMut(u64) + 'static,
    ) -> Result<MarkerId, TimelineError> {
        let mut s = self.state.borrow_mut();
        let id = MarkerId(s.next_marker);
        let tl = s.get_mut(timeline)?;
        if !time.is_finite() || time < 0.0 || time > tl.duration {
            return Err(TimelineError::MarkerOutOfRange {
                time,
                duration: tl.duration,
            });
        }
        let marker = Marker {
            id,
            time,
            // A marker behind the cursor waits for the next cycle.
            triggered: time < tl.current,
            callback: Rc::new(RefCell::new(callback)),
        };
        let at = tl.markers.partition_point(|m| m.time <= time);
        tl.markers.insert(at, marker);
        s.next_marker += 1;
        Ok(id)
    }

    pub fn remove_marker(&self, timeline: &Id, marker: MarkerId) -> bool {
        let removed = {
            let mut s = self.state.borrow_mut();
            let Ok(tl) = s.get_mut(timeline) else {
                return false;
            };
            tl.markers
                .iter()
                .position(|m| m.id == marker)
                .map(|pos| tl.markers.remove(pos))
        };
        removed.is_some()
    }

    /// Called once when a non-looping timeline reaches its end.
    pub fn on_complete(
        &self,
        timeline: &Id,
        callback: impl FnMut() + 'static,
    ) -> Result<(), TimelineError> {
        let mut s = self.state.borrow_mut();
        s.get_mut(timeline)?.on_complete = Some(Rc::new(RefCell::new(callback)));
        Ok(())
    }

    /// `Some(id)` plays one timeline (restarting it if it had finished);
    /// `None` lifts the group suspension.
    pub fn play(&self, timeline: Option<&Id>) -> Result<(), TimelineError> {
        let mut s = self.state.borrow_mut();
        match timeline {
            Some(id) => {
                let tl = s.get_mut(id)?;
                if tl.finished {
                    tl.rewind();
                }
                tl.playing = true;
            }
            None => s.suspended = false,
        }
        Ok(())
    }

    /// `Some(id)` pauses one timeline; `None` suspends all of them without
    /// touching their individual play state.
    pub fn pause(&self, timeline: Option<&Id>) -> Result<(), TimelineError> {
        let mut s = self.state.borrow_mut();
        match timeline {
            Some(id) => s.get_mut(id)?.playing = false,
            None => s.suspended = true,
        }
        Ok(())
    }

    /// Moves the cursor to `time` (clamped to the cycle). Markers before it
    /// count as already fired; markers at or after it are re-armed.
    pub fn seek(&self, timeline: &Id, time: f64) -> Result<(), TimelineError> {
        let mut s = self.state.borrow_mut();
        let tl = s.get_mut(timeline)?;
        let time = if time.is_finite() {
            time.clamp(0.0, tl.duration)
        } else {
            0.0
        };
        tl.current = time;
        tl.finished = false;
        for m in tl.markers.iter_mut() {
            m.triggered = m.time < time;
        }
        Ok(())
    }

    pub fn set_speed(&self, timeline: &Id, speed: f64) -> Result<(), TimelineError> {
        if !(speed >= 0.0) || !speed.is_finite() {
            return Err(TimelineError::InvalidSpeed(speed));
        }
        let mut s = self.state.borrow_mut();
        s.get_mut(timeline)?.speed = speed;
        Ok(())
    }

    pub fn remove_timeline(&self, timeline: &Id) -> bool {
        let removed = {
            let mut s = self.state.borrow_mut();
            s.timelines
                .iter()
                .position(|t| &t.id == timeline)
                .map(|pos| s.timelines.remove(pos))
        };
        removed.is_some()
    }

    pub fn current_time(&self, timeline: &Id) -> Option<f64> {
        self.state.borrow().get(timeline).map(|t| t.current)
    }

    /// Fraction of the current cycle elapsed, in `[0, 1]`.
    pub fn progress(&self, timeline: &Id) -> Option<f64> {
        self.state
            .borrow()
            .get(timeline)
            .map(|t| t.current / t.duration)
    }

    pub fn cycle(&self, timeline: &Id) -> Option<u64> {
        self.state.borrow().get(timeline).map(|t| t.cycle)
    }

    /// Whether `timeline` advances on the next frame.
    pub fn is_playing(&self, timeline: &Id) -> bool {
        let s = self.state.borrow();
        !s.suspended && s.get(timeline).is_some_and(|t| t.playing)
    }

    pub fn is_suspended(&self) -> bool {
        self.state.borrow().suspended
    }

    pub fn len(&self) -> usize {
        self.state.borrow().timelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn update(&self, frame: Frame) {
        let fired = {
            let mut s = self.state.borrow_mut();
            if s.suspended {
                return;
            }
            let mut fired = Vec::new();
            for tl in s.timelines.iter_mut().filter(|t| t.playing) {
                tl.advance(frame.dt_s * tl.speed, &mut fired);
            }
            fired
        };

        for (serial, fire) in fired {
            let alive = self
                .state
                .borrow()
                .timelines
                .iter()
                .any(|t| t.serial == serial);
            if !alive {
                continue;
            }
            match fire {
                Fire::Marker(cb, cycle) => match cb.try_borrow_mut() {
                    Ok(mut cb) => cb(cycle),
                    Err(_) => tracing::warn!("timeline marker callback re-entered"),
                },
                Fire::Complete(cb) => match cb.try_borrow_mut() {
                    Ok(mut cb) => cb(),
                    Err(_) => tracing::warn!("timeline completion callback re-entered"),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{TimelineError, TimelineOptions, Timelines};
    use crate::clock::{ClockConfig, FrameClock};
    use crate::frame::Frame;
    use foundation::Id;
    use foundation::time::Time;
    use pretty_assertions::assert_eq;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn looping() -> TimelineOptions {
        TimelineOptions {
            looping: true,
            ..TimelineOptions::default()
        }
    }

    fn spy() -> (Rc<RefCell<Vec<u64>>>, impl FnMut(u64) + 'static) {
        let hits = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&hits);
        (hits, move |cycle| sink.borrow_mut().push(cycle))
    }

    fn run(timelines: &Timelines, frame: &mut Frame, steps: usize, dt: f64) {
        for _ in 0..steps {
            *frame = frame.advance(dt);
            timelines.update(*frame);
        }
    }

    #[test]
    fn marker_fires_once_per_cycle_and_rearms_on_wrap() {
        let timelines = Timelines::new();
        let id = Id::from("hero");
        timelines.create_timeline(id.clone(), 10.0, looping()).unwrap();
        let (hits, cb) = spy();
        timelines.add_marker(&id, 5.0, cb).unwrap();

        let mut frame = Frame::start();
        run(&timelines, &mut frame, 12, 1.0);
        assert_eq!(frame.time, Time(12.0));
        assert_eq!(*hits.borrow(), vec![0]);

        run(&timelines, &mut frame, 3, 1.0);
        assert_eq!(*hits.borrow(), vec![0, 1]);
        assert_eq!(timelines.cycle(&id), Some(1));
        assert_eq!(timelines.current_time(&id), Some(5.0));
    }

    #[test]
    fn removed_marker_no_longer_fires() {
        let timelines = Timelines::new();
        let id = Id::from("t");
        timelines.create_timeline(id.clone(), 4.0, looping()).unwrap();
        let (kept, keep_cb) = spy();
        let (dropped, drop_cb) = spy();
        timelines.add_marker(&id, 1.0, keep_cb).unwrap();
        let marker = timelines.add_marker(&id, 2.0, drop_cb).unwrap();

        assert!(timelines.remove_marker(&id, marker));
        assert!(!timelines.remove_marker(&id, marker));
        assert!(!timelines.remove_marker(&Id::from("missing"), marker));

        let mut frame = Frame::start();
        run(&timelines, &mut frame, 3, 1.0);
        assert_eq!(*kept.borrow(), vec![0]);
        assert!(dropped.borrow().is_empty());
    }

    #[test]
    fn large_step_fires_each_crossed_cycle() {
        let timelines = Timelines::new();
        let id = Id::from("t");
        timelines.create_timeline(id.clone(), 1.0, looping()).unwrap();
        let (hits, cb) = spy();
        timelines.add_marker(&id, 0.5, cb).unwrap();

        let mut frame = Frame::start();
        run(&timelines, &mut frame, 1, 3.75);
        assert_eq!(*hits.borrow(), vec![0, 1, 2, 3]);
        assert_eq!(timelines.current_time(&id), Some(0.75));
    }

    #[test]
    fn non_looping_timeline_stops_and_completes_once() {
        let timelines = Timelines::new();
        let id = Id::from("intro");
        timelines
            .create_timeline(id.clone(), 2.0, TimelineOptions::default())
            .unwrap();
        let done = Rc::new(Cell::new(0));
        let d = Rc::clone(&done);
        timelines.on_complete(&id, move || d.set(d.get() + 1)).unwrap();
        let (hits, cb) = spy();
        timelines.add_marker(&id, 2.0, cb).unwrap();

        let mut frame = Frame::start();
        run(&timelines, &mut frame, 5, 1.0);
        assert_eq!(done.get(), 1);
        assert_eq!(*hits.borrow(), vec![0]);
        assert_eq!(timelines.progress(&id), Some(1.0));
        assert!(!timelines.is_playing(&id));

        timelines.play(Some(&id)).unwrap();
        assert_eq!(timelines.current_time(&id), Some(0.0));
    }

    #[test]
    fn group_suspend_is_independent_of_individual_state() {
        let timelines = Timelines::new();
        let a = Id::from("a");
        let b = Id::from("b");
        timelines.create_timeline(a.clone(), 10.0, looping()).unwrap();
        timelines
            .create_timeline(
                b.clone(),
                10.0,
                TimelineOptions {
                    autoplay: false,
                    ..looping()
                },
            )
            .unwrap();

        let mut frame = Frame::start();
        timelines.pause(None).unwrap();
        assert!(timelines.is_suspended());
        run(&timelines, &mut frame, 2, 1.0);
        assert_eq!(timelines.current_time(&a), Some(0.0));

        timelines.play(None).unwrap();
        assert!(!timelines.is_suspended());
        run(&timelines, &mut frame, 2, 1.0);
        assert_eq!(timelines.current_time(&a), Some(2.0));
        assert_eq!(timelines.current_time(&b), Some(0.0));

        timelines.pause(Some(&a)).unwrap();
        timelines.play(Some(&b)).unwrap();
        run(&timelines, &mut frame, 1, 1.0);
        assert_eq!(timelines.current_time(&a), Some(2.0));
        assert_eq!(timelines.current_time(&b), Some(1.0));
    }

    #[test]
    fn timelines_keep_running_while_clock_runs_and_stop_when_suspended() {
        let clock = FrameClock::new(ClockConfig { max_delta: 1.0 });
        let timelines = Timelines::new();
        let _sub = timelines.attach(&clock);
        let id = Id::from("bg");
        timelines.create_timeline(id.clone(), 10.0, looping()).unwrap();

        clock.tick(Time(0.0));
        clock.tick(Time(0.5));
        timelines.pause(None).unwrap();
        clock.tick(Time(1.0));
        assert_eq!(timelines.current_time(&id), Some(0.5));
        assert!(!clock.is_paused());
    }

    #[test]
    fn seek_rearms_markers_ahead_of_cursor() {
        let timelines = Timelines::new();
        let id = Id::from("t");
        timelines
            .create_timeline(id.clone(), 10.0, TimelineOptions::default())
            .unwrap();
        let (early, early_cb) = spy();
        let (late, late_cb) = spy();
        timelines.add_marker(&id, 2.0, early_cb).unwrap();
        timelines.add_marker(&id, 6.0, late_cb).unwrap();

        timelines.seek(&id, 4.0).unwrap();
        let mut frame = Frame::start();
        run(&timelines, &mut frame, 3, 1.0);
        assert!(early.borrow().is_empty());
        assert_eq!(*late.borrow(), vec![0]);

        timelines.seek(&id, 6.0).unwrap();
        run(&timelines, &mut frame, 1, 0.5);
        assert_eq!(*late.borrow(), vec![0, 0]);
    }

    #[test]
    fn speed_scales_advance() {
        let timelines = Timelines::new();
        let id = Id::from("t");
        timelines
            .create_timeline(
                id.clone(),
                10.0,
                TimelineOptions {
                    speed: 2.0,
                    ..TimelineOptions::default()
                },
            )
            .unwrap();
        let mut frame = Frame::start();
        run(&timelines, &mut frame, 1, 1.0);
        assert_eq!(timelines.current_time(&id), Some(2.0));
        timelines.set_speed(&id, 0.5).unwrap();
        run(&timelines, &mut frame, 1, 1.0);
        assert_eq!(timelines.current_time(&id), Some(2.5));
        assert_eq!(
            timelines.set_speed(&id, -1.0),
            Err(TimelineError::InvalidSpeed(-1.0))
        );
    }

    #[test]
    fn marker_callback_removing_its_timeline_stops_later_markers() {
        let timelines = Timelines::new();
        let id = Id::from("t");
        timelines
            .create_timeline(id.clone(), 10.0, TimelineOptions::default())
            .unwrap();
        let remover = timelines.clone();
        let rid = id.clone();
        timelines
            .add_marker(&id, 1.0, move |_| {
                remover.remove_timeline(&rid);
            })
            .unwrap();
        let (later, later_cb) = spy();
        timelines.add_marker(&id, 2.0, later_cb).unwrap();

        let mut frame = Frame::start();
        run(&timelines, &mut frame, 1, 3.0);
        assert!(later.borrow().is_empty());
        assert!(timelines.is_empty());
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let timelines = Timelines::new();
        let id = Id::from("t");
        assert_eq!(
            timelines.create_timeline(id.clone(), 0.0, TimelineOptions::default()),
            Err(TimelineError::NonPositiveDuration(0.0))
        );
        assert_eq!(
            timelines.add_marker(&id, 1.0, |_| {}).unwrap_err(),
            TimelineError::UnknownTimeline(id.clone())
        );
        timelines
            .create_timeline(id.clone(), 5.0, TimelineOptions::default())
            .unwrap();
        assert_eq!(
            timelines.add_marker(&id, 6.0, |_| {}).unwrap_err(),
            TimelineError::MarkerOutOfRange {
                time: 6.0,
                duration: 5.0
            }
        );
    }

    #[test]
    fn options_deserialize_loop_keyword() {
        let opts: TimelineOptions = serde_json::from_str(r#"{"loop":true,"speed":0.5}"#).unwrap();
        assert!(opts.looping);
        assert!(opts.autoplay);
        assert_eq!(opts.speed, 0.5);
    }
}
