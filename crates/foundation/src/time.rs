/// Time primitives
#[derive(Copy, Clone, Debug, Default, PartialEq, PartialOrd)]
pub struct Time(pub f64); // seconds

impl Time {
    pub const ZERO: Time = Time(0.0);

    pub fn from_millis(ms: f64) -> Self {
        Self(ms / 1000.0)
    }

    pub fn seconds(self) -> f64 {
        self.0
    }

    /// Seconds elapsed since `earlier`; never negative.
    pub fn since(self, earlier: Time) -> f64 {
        (self.0 - earlier.0).max(0.0)
    }

    pub fn offset(self, seconds: f64) -> Self {
        Self(self.0 + seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::Time;

    #[test]
    fn since_is_clamped_to_zero() {
        assert_eq!(Time(2.0).since(Time(0.5)), 1.5);
        assert_eq!(Time(0.5).since(Time(2.0)), 0.0);
    }

    #[test]
    fn from_millis_converts_to_seconds() {
        assert_eq!(Time::from_millis(1500.0), Time(1.5));
        assert_eq!(Time(1.0).offset(0.25).seconds(), 1.25);
    }
}
