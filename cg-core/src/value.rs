//! Value and index types understood by the containers and the sparse library.
//!
//! Both traits are sealed: the set of supported element types is closed, and
//! every routine can resolve its behaviour from the associated constants at
//! compile time.

use bytemuck::{Pod, Zeroable};
use num_complex::Complex;
use num_traits::Num;
use std::fmt::{self, Debug, Display};
use std::ops::Neg;

mod private {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
    impl Sealed for num_complex::Complex<f32> {}
    impl Sealed for num_complex::Complex<f64> {}
    impl Sealed for i32 {}
    impl Sealed for i64 {}
}

/// Precision and field of a value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Real32,
    Real64,
    Complex32,
    Complex64,
}

impl ValueKind {
    pub const fn is_complex(self) -> bool {
        matches!(self, ValueKind::Complex32 | ValueKind::Complex64)
    }

    /// Double precision kinds need `SHADER_F64` on the accelerator.
    pub const fn is_double(self) -> bool {
        matches!(self, ValueKind::Real64 | ValueKind::Complex64)
    }

    /// WGSL scalar type of one component.
    pub const fn wgsl_scalar(self) -> &'static str {
        if self.is_double() {
            "f64"
        } else {
            "f32"
        }
    }

    /// WGSL type of one element.
    pub const fn wgsl_type(self) -> &'static str {
        match self {
            ValueKind::Real32 => "f32",
            ValueKind::Real64 => "f64",
            ValueKind::Complex32 => "vec2<f32>",
            ValueKind::Complex64 => "vec2<f64>",
        }
    }

    /// Short tag used in shader cache keys.
    pub const fn suffix(self) -> &'static str {
        match self {
            ValueKind::Real32 => "f32",
            ValueKind::Real64 => "f64",
            ValueKind::Complex32 => "c32",
            ValueKind::Complex64 => "c64",
        }
    }
}

/// Element type of dense blocks and sparse matrices.
pub trait ValueType:
    private::Sealed
    + Num
    + Neg<Output = Self>
    + Copy
    + Debug
    + Default
    + PartialEq
    + Pod
    + Zeroable
    + Send
    + Sync
    + 'static
{
    const KIND: ValueKind;
    const NAME: &'static str;

    fn conj(self) -> Self;

    /// Absolute value (modulus for complex numbers) in double precision.
    fn magnitude(self) -> f64;

    fn real_part(self) -> f64;

    fn imag_part(self) -> f64;

    /// Builds a value from its parts; the imaginary part is ignored by real types.
    fn from_parts(re: f64, im: f64) -> Self;
}

impl ValueType for f32 {
    const KIND: ValueKind = ValueKind::Real32;
    const NAME: &'static str = "f32";

    fn conj(self) -> Self {
        self
    }
    fn magnitude(self) -> f64 {
        f64::from(self.abs())
    }
    fn real_part(self) -> f64 {
        f64::from(self)
    }
    fn imag_part(self) -> f64 {
        0.0
    }
    fn from_parts(re: f64, _im: f64) -> Self {
        re as f32
    }
}

impl ValueType for f64 {
    const KIND: ValueKind = ValueKind::Real64;
    const NAME: &'static str = "f64";

    fn conj(self) -> Self {
        self
    }
    fn magnitude(self) -> f64 {
        self.abs()
    }
    fn real_part(self) -> f64 {
        self
    }
    fn imag_part(self) -> f64 {
        0.0
    }
    fn from_parts(re: f64, _im: f64) -> Self {
        re
    }
}

impl ValueType for Complex<f32> {
    const KIND: ValueKind = ValueKind::Complex32;
    const NAME: &'static str = "complex<f32>";

    fn conj(self) -> Self {
        Complex::conj(&self)
    }
    fn magnitude(self) -> f64 {
        f64::from(self.norm())
    }
    fn real_part(self) -> f64 {
        f64::from(self.re)
    }
    fn imag_part(self) -> f64 {
        f64::from(self.im)
    }
    fn from_parts(re: f64, im: f64) -> Self {
        Complex::new(re as f32, im as f32)
    }
}

impl ValueType for Complex<f64> {
    const KIND: ValueKind = ValueKind::Complex64;
    const NAME: &'static str = "complex<f64>";

    fn conj(self) -> Self {
        Complex::conj(&self)
    }
    fn magnitude(self) -> f64 {
        self.norm()
    }
    fn real_part(self) -> f64 {
        self.re
    }
    fn imag_part(self) -> f64 {
        self.im
    }
    fn from_parts(re: f64, im: f64) -> Self {
        Complex::new(re, im)
    }
}

/// Width of the row pointer / column index arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexWidth {
    I32,
    I64,
}

impl Display for IndexWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexWidth::I32 => write!(f, "32-bit"),
            IndexWidth::I64 => write!(f, "64-bit"),
        }
    }
}

/// Index type of sparse matrices.
pub trait IndexType:
    private::Sealed + Copy + Debug + Default + Ord + Pod + Zeroable + Send + Sync + 'static
{
    const WIDTH: IndexWidth;

    /// Converts to `usize`; negative indices map to `None`.
    fn to_usize(self) -> Option<usize>;

    fn from_usize(value: usize) -> Option<Self>;
}

impl IndexType for i32 {
    const WIDTH: IndexWidth = IndexWidth::I32;

    fn to_usize(self) -> Option<usize> {
        usize::try_from(self).ok()
    }
    fn from_usize(value: usize) -> Option<Self> {
        i32::try_from(value).ok()
    }
}

impl IndexType for i64 {
    const WIDTH: IndexWidth = IndexWidth::I64;

    fn to_usize(self) -> Option<usize> {
        usize::try_from(self).ok()
    }
    fn from_usize(value: usize) -> Option<Self> {
        i64::try_from(value).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn kinds_match_types() {
        assert_eq!(<f32 as ValueType>::KIND, ValueKind::Real32);
        assert_eq!(<Complex64 as ValueType>::KIND, ValueKind::Complex64);
        assert!(ValueKind::Complex32.is_complex());
        assert!(!ValueKind::Real64.is_complex());
        assert!(ValueKind::Complex64.is_double());
        assert_eq!(ValueKind::Complex32.wgsl_type(), "vec2<f32>");
        assert_eq!(ValueKind::Complex64.wgsl_scalar(), "f64");
    }

    #[test]
    fn complex_helpers() {
        let z = Complex64::new(3.0, -4.0);
        assert_eq!(ValueType::conj(z), Complex64::new(3.0, 4.0));
        assert_eq!(z.magnitude(), 5.0);
        assert_eq!(z.imag_part(), -4.0);
        assert_eq!(<Complex64 as ValueType>::from_parts(1.0, 2.0), Complex64::new(1.0, 2.0));
        assert_eq!(<f64 as ValueType>::from_parts(1.5, 9.0), 1.5);
    }

    #[test]
    fn index_conversions() {
        assert_eq!(<i32 as IndexType>::from_usize(7), Some(7));
        assert_eq!(<i32 as IndexType>::from_usize(usize::MAX), None);
        assert_eq!((-1i64).to_usize(), None);
        assert_eq!(IndexWidth::I64.to_string(), "64-bit");
    }
}
