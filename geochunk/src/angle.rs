//! Fixed-point angles.
//!
//! An [`Angle`] is a signed count of micro-arc-second ticks. All bucketing
//! and key arithmetic runs on the integer tick count so that chunk
//! boundaries are exact and never drift. Decimal degrees and radians are
//! one-way views for geometry and display.

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Ticks in one arc-second (one tick is a micro-arc-second).
pub const TICKS_PER_ARC_SECOND: i64 = 1_000_000;

/// Ticks in one arc-minute.
pub const TICKS_PER_ARC_MINUTE: i64 = 60 * TICKS_PER_ARC_SECOND;

/// Ticks in one degree.
pub const TICKS_PER_DEGREE: i64 = 60 * TICKS_PER_ARC_MINUTE;

/// An exact angular value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Angle {
    ticks: i64,
}

impl Angle {
    /// The zero angle.
    pub const ZERO: Angle = Angle { ticks: 0 };

    /// Create an angle from a raw tick count.
    pub const fn from_ticks(ticks: i64) -> Self {
        Self { ticks }
    }

    /// Create an angle from a whole number of degrees.
    pub const fn from_whole_degrees(degrees: i64) -> Self {
        Self {
            ticks: degrees * TICKS_PER_DEGREE,
        }
    }

    /// Create an angle from degrees, arc-minutes and arc-seconds.
    ///
    /// The sign of `degrees` applies to the whole value.
    pub const fn from_dms(degrees: i64, minutes: i64, seconds: i64) -> Self {
        let magnitude = degrees.abs() * TICKS_PER_DEGREE
            + minutes * TICKS_PER_ARC_MINUTE
            + seconds * TICKS_PER_ARC_SECOND;
        Self {
            ticks: if degrees < 0 { -magnitude } else { magnitude },
        }
    }

    /// Create an angle from decimal degrees, rounding to the nearest tick.
    ///
    /// Returns `None` for NaN, infinities, or values too large to represent.
    pub fn try_from_degrees(degrees: f64) -> Option<Self> {
        if !degrees.is_finite() {
            return None;
        }
        let ticks = (degrees * TICKS_PER_DEGREE as f64).round();
        if ticks.abs() >= i64::MAX as f64 {
            return None;
        }
        Some(Self {
            ticks: ticks as i64,
        })
    }

    /// Create an angle from decimal degrees, rounding to the nearest tick.
    ///
    /// Non-finite input saturates; use [`Angle::try_from_degrees`] when the
    /// value comes from outside the program.
    pub fn from_degrees(degrees: f64) -> Self {
        Self {
            ticks: (degrees * TICKS_PER_DEGREE as f64).round() as i64,
        }
    }

    /// Returns the raw tick count.
    pub const fn ticks(self) -> i64 {
        self.ticks
    }

    /// Returns the value in decimal degrees.
    pub fn degrees(self) -> f64 {
        self.ticks as f64 / TICKS_PER_DEGREE as f64
    }

    /// Returns the value in radians.
    pub fn radians(self) -> f64 {
        self.degrees().to_radians()
    }

    /// Returns the absolute value.
    pub const fn abs(self) -> Self {
        Self {
            ticks: self.ticks.abs(),
        }
    }

    /// Floor division of two angles: how many whole `divisor`s fit below
    /// `self`, rounding toward negative infinity.
    ///
    /// Returns `None` when `divisor` is zero.
    pub fn floor_div(self, divisor: Angle) -> Option<i64> {
        floor_div(self.ticks, divisor.ticks)
    }

    /// Remainder of [`Angle::floor_div`]; always has the sign of `divisor`.
    pub fn floor_rem(self, divisor: Angle) -> Option<Angle> {
        let q = floor_div(self.ticks, divisor.ticks)?;
        Some(Angle::from_ticks(self.ticks - q * divisor.ticks))
    }

    /// Multiply by an integer, returning `None` on overflow.
    pub fn checked_mul(self, factor: i64) -> Option<Self> {
        self.ticks.checked_mul(factor).map(Angle::from_ticks)
    }

    /// Add two angles, returning `None` on overflow.
    pub fn checked_add(self, other: Angle) -> Option<Self> {
        self.ticks.checked_add(other.ticks).map(Angle::from_ticks)
    }
}

/// Integer floor division (rounds toward negative infinity).
pub(crate) fn floor_div(a: i64, b: i64) -> Option<i64> {
    if b == 0 {
        return None;
    }
    let q = a / b;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Some(q - 1)
    } else {
        Some(q)
    }
}

impl Add for Angle {
    type Output = Angle;

    fn add(self, rhs: Angle) -> Angle {
        Angle::from_ticks(self.ticks + rhs.ticks)
    }
}

impl Sub for Angle {
    type Output = Angle;

    fn sub(self, rhs: Angle) -> Angle {
        Angle::from_ticks(self.ticks - rhs.ticks)
    }
}

impl Neg for Angle {
    type Output = Angle;

    fn neg(self) -> Angle {
        Angle::from_ticks(-self.ticks)
    }
}

impl Mul<i64> for Angle {
    type Output = Angle;

    fn mul(self, rhs: i64) -> Angle {
        Angle::from_ticks(self.ticks * rhs)
    }
}

/// Scalar division rounds toward negative infinity, like [`Angle::floor_div`].
///
/// # Panics
///
/// Panics if `rhs` is zero.
impl Div<i64> for Angle {
    type Output = Angle;

    fn div(self, rhs: i64) -> Angle {
        match floor_div(self.ticks, rhs) {
            Some(q) => Angle::from_ticks(q),
            None => panic!("angle divided by zero"),
        }
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}°", self.degrees())
    }
}
