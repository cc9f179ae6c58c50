use foundation::time::Time;

/// Per-tick frame metadata handed to every clock listener.
///
/// `time` is the clock's own elapsed time: paused spans and clamped stalls
/// do not count, so animations driven by it never jump on resume.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frame {
    /// 0-based index of the tick that produced this frame.
    pub index: u64,
    /// Seconds since the previous delivered frame (after clamping).
    pub dt_s: f64,
    /// Clock time at this frame (seconds).
    pub time: Time,
}

impl Frame {
    /// The frame observed before the first tick.
    pub fn start() -> Self {
        Self {
            index: 0,
            dt_s: 0.0,
            time: Time::ZERO,
        }
    }

    /// Builds the frame that follows `self` after `dt_s` seconds.
    pub fn advance(self, dt_s: f64) -> Self {
        Self {
            index: self.index + 1,
            dt_s,
            time: self.time.offset(dt_s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Frame;
    use foundation::time::Time;

    #[test]
    fn advance_accumulates_time_and_index() {
        let f1 = Frame::start().advance(0.5);
        let f2 = f1.advance(0.25);
        assert_eq!(f1.index, 1);
        assert_eq!(f2.index, 2);
        assert_eq!(f2.time, Time(0.75));
        assert_eq!(f2.dt_s, 0.25);
    }
}
