use std::fmt::{Debug, Display};

use num_traits::{Float as NumFloat, FloatConst, FromPrimitive};

/// Marker trait for the base floating-point types (`f32`, `f64`).
///
/// Bundles the numeric and utility traits needed throughout the crate, plus
/// the error function, which the standard library does not provide.
pub trait Float:
    NumFloat + FloatConst + FromPrimitive + Copy + Send + Sync + Default + Debug + Display + 'static
{
    /// The error function `erf(x)`.
    fn erf(self) -> Self;
}

impl Float for f32 {
    #[inline]
    fn erf(self) -> Self {
        libm::erff(self)
    }
}

impl Float for f64 {
    #[inline]
    fn erf(self) -> Self {
        libm::erf(self)
    }
}
