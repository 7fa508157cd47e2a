use std::fmt;
use std::time::Duration;

/// A rational number, used for stream time bases and frame rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    /// Numerator
    pub num: i32,
    /// Denominator
    pub den: i32,
}

impl Rational {
    /// Creates a new rational. A zero denominator marks an unknown value.
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Microsecond time base, used when a container gives no better one.
    pub const MICROS: Rational = Rational::new(1, 1_000_000);

    /// The 90 kHz clock of MPEG systems streams.
    pub const MPEG_90K: Rational = Rational::new(1, 90_000);

    /// Returns true if the denominator is zero.
    pub fn is_unknown(&self) -> bool {
        self.den == 0
    }

    /// Floating-point value, 0.0 when unknown.
    pub fn to_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }

    /// Swaps numerator and denominator (frame rate to frame duration).
    pub fn invert(&self) -> Rational {
        Rational::new(self.den, self.num)
    }

    /// Rescales `value` expressed in `self` units into `target` units,
    /// rounding to nearest.
    pub fn rescale(&self, value: i64, target: Rational) -> i64 {
        if self.is_unknown() || target.is_unknown() || target.num == 0 {
            return value;
        }
        let num = value as i128 * self.num as i128 * target.den as i128;
        let den = self.den as i128 * target.num as i128;
        let half = den.abs() / 2;
        let adjust = if (num < 0) == (den < 0) { half } else { -half };
        let rounded = (num + adjust) / den;
        rounded as i64
    }

    /// Converts a timestamp in `self` units into a wall-clock duration.
    /// Negative timestamps clamp to zero.
    pub fn to_duration(&self, value: i64) -> Duration {
        let micros = self.rescale(value, Rational::MICROS).max(0);
        Duration::from_micros(micros as u64)
    }
}

impl Default for Rational {
    fn default() -> Self {
        Rational::new(0, 1)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rescale() {
        let tb = Rational::new(1, 25);
        assert_eq!(tb.rescale(50, Rational::new(1, 1000)), 2000);
        assert_eq!(Rational::MPEG_90K.rescale(90_000, Rational::MICROS), 1_000_000);
        assert_eq!(Rational::new(1, 3).rescale(1, Rational::new(1, 1000)), 333);
        assert_eq!(Rational::new(1, 3).rescale(-1, Rational::new(1, 1000)), -333);
    }

    #[test]
    fn test_to_duration() {
        let tb = Rational::new(1, 44_100);
        assert_eq!(tb.to_duration(44_100), Duration::from_secs(1));
        assert_eq!(tb.to_duration(-10), Duration::ZERO);
    }

    #[test]
    fn test_unknown() {
        let r = Rational::new(1, 0);
        assert!(r.is_unknown());
        assert_eq!(r.to_f64(), 0.0);
        assert_eq!(r.rescale(7, Rational::MICROS), 7);
    }
}
