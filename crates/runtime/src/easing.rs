use std::f64::consts::PI;
use std::fmt;

use serde::Deserialize;

/// Easing curves mapping normalized progress `[0, 1]` onto `[0, 1]`.
///
/// Every built-in curve satisfies `ease(0) = 0` and `ease(1) = 1`. A
/// [`Easing::Custom`] curve is checked by [`Easing::validate`] before a tween
/// accepts it.
#[derive(Copy, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Easing {
    Linear,
    QuadIn,
    QuadOut,
    QuadInOut,
    CubicIn,
    CubicOut,
    CubicInOut,
    QuartOut,
    ExpoIn,
    #[default]
    ExpoOut,
    ExpoInOut,
    SineIn,
    SineOut,
    SineInOut,
    #[serde(skip)]
    Custom(fn(f64) -> f64),
}

impl Easing {
    /// Evaluates the curve. Input outside `[0, 1]` is clamped first.
    pub fn ease(&self, t: f64) -> f64 {
        let t = foundation::math::clamp01(t);
        match self {
            Easing::Linear => t,
            Easing::QuadIn => t * t,
            Easing::QuadOut => 1.0 - (1.0 - t) * (1.0 - t),
            Easing::QuadInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            Easing::CubicIn => t * t * t,
            Easing::CubicOut => 1.0 - (1.0 - t).powi(3),
            Easing::CubicInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
            Easing::QuartOut => 1.0 - (1.0 - t).powi(4),
            // The exponential forms never reach their endpoints exactly; pin them.
            Easing::ExpoIn => {
                if t <= 0.0 {
                    0.0
                } else {
                    2f64.powf(10.0 * t - 10.0)
                }
            }
            Easing::ExpoOut => {
                if t >= 1.0 {
                    1.0
                } else {
                    1.0 - 2f64.powf(-10.0 * t)
                }
            }
            Easing::ExpoInOut => {
                if t <= 0.0 {
                    0.0
                } else if t >= 1.0 {
                    1.0
                } else if t < 0.5 {
                    2f64.powf(20.0 * t - 10.0) / 2.0
                } else {
                    (2.0 - 2f64.powf(-20.0 * t + 10.0)) / 2.0
                }
            }
            Easing::SineIn => 1.0 - (t * PI / 2.0).cos(),
            Easing::SineOut => (t * PI / 2.0).sin(),
            Easing::SineInOut => -((PI * t).cos() - 1.0) / 2.0,
            Easing::Custom(f) => f(t),
        }
    }

    /// Checks the endpoint contract: `ease(0) = 0`, `ease(1) = 1`, finite
    /// output at the midpoint.
    pub fn validate(&self) -> bool {
        const EPS: f64 = 1e-9;
        let start = self.ease(0.0);
        let mid = self.ease(0.5);
        let end = self.ease(1.0);
        start.is_finite()
            && mid.is_finite()
            && end.is_finite()
            && start.abs() <= EPS
            && (end - 1.0).abs() <= EPS
    }

    pub fn name(&self) -> &'static str {
        match self {
            Easing::Linear => "linear",
            Easing::QuadIn => "quadIn",
            Easing::QuadOut => "quadOut",
            Easing::QuadInOut => "quadInOut",
            Easing::CubicIn => "cubicIn",
            Easing::CubicOut => "cubicOut",
            Easing::CubicInOut => "cubicInOut",
            Easing::QuartOut => "quartOut",
            Easing::ExpoIn => "expoIn",
            Easing::ExpoOut => "expoOut",
            Easing::ExpoInOut => "expoInOut",
            Easing::SineIn => "sineIn",
            Easing::SineOut => "sineOut",
            Easing::SineInOut => "sineInOut",
            Easing::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for Easing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::Easing;

    const BUILT_IN: [Easing; 14] = [
        Easing::Linear,
        Easing::QuadIn,
        Easing::QuadOut,
        Easing::QuadInOut,
        Easing::CubicIn,
        Easing::CubicOut,
        Easing::CubicInOut,
        Easing::QuartOut,
        Easing::ExpoIn,
        Easing::ExpoOut,
        Easing::ExpoInOut,
        Easing::SineIn,
        Easing::SineOut,
        Easing::SineInOut,
    ];

    #[test]
    fn built_in_curves_hit_endpoints_and_stay_in_range() {
        for easing in BUILT_IN {
            assert!(easing.validate(), "{easing:?} failed endpoint check");
            let mut prev = 0.0;
            for step in 0..=100 {
                let v = easing.ease(step as f64 / 100.0);
                assert!((0.0..=1.0).contains(&v), "{easing:?} out of range: {v}");
                assert!(v + 1e-12 >= prev, "{easing:?} not monotonic at {step}");
                prev = v;
            }
        }
    }

    #[test]
    fn default_is_expo_out() {
        assert!(matches!(Easing::default(), Easing::ExpoOut));
    }

    #[test]
    fn custom_curve_is_validated() {
        fn half(t: f64) -> f64 {
            t * 0.5
        }
        fn smooth(t: f64) -> f64 {
            t * t * (3.0 - 2.0 * t)
        }
        assert!(!Easing::Custom(half).validate());
        assert!(Easing::Custom(smooth).validate());
    }

    #[test]
    fn input_is_clamped() {
        assert_eq!(Easing::Linear.ease(-1.0), 0.0);
        assert_eq!(Easing::Linear.ease(3.0), 1.0);
    }

    #[test]
    fn deserializes_camel_case_names() {
        let e: Easing = serde_json::from_str("\"cubicInOut\"").unwrap();
        assert!(matches!(e, Easing::CubicInOut));
    }
}
