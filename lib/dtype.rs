//! Element types for chain data.
//!
//! All tensor data is stored as [`Complex64`][C64]; a [`DType`] is carried
//! alongside it to record which numeric type the data is meant to represent.
//! Real types keep all imaginary parts at zero and are decomposed in real
//! arithmetic, and single-precision types round every stored element to
//! `f32`.

use std::{ fmt, str::FromStr };
use num_complex::Complex64 as C64;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DTypeError {
    /// Returned when a requested element type is not one of the four
    /// supported types.
    #[error("unsupported dtype {0:?}: expected one of float32, float64, complex64, complex128")]
    Unsupported(String),
}
pub type DTypeResult<T> = Result<T, DTypeError>;

/// Numeric element type of a chain.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum DType {
    Float32,
    Float64,
    Complex64,
    #[default]
    Complex128,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float32    => write!(f, "float32"),
            Self::Float64    => write!(f, "float64"),
            Self::Complex64  => write!(f, "complex64"),
            Self::Complex128 => write!(f, "complex128"),
        }
    }
}

impl FromStr for DType {
    type Err = DTypeError;

    fn from_str(s: &str) -> DTypeResult<Self> {
        match s {
            "float32" | "f32" => Ok(Self::Float32),
            "float64" | "f64" | "float" => Ok(Self::Float64),
            "complex64" | "c64" => Ok(Self::Complex64),
            "complex128" | "c128" | "complex" => Ok(Self::Complex128),
            _ => Err(DTypeError::Unsupported(s.to_string())),
        }
    }
}

impl DType {
    /// Return `true` if `self` is a real type.
    pub fn is_real(self) -> bool { matches!(self, Self::Float32 | Self::Float64) }

    /// Return `true` if `self` is a complex type.
    pub fn is_complex(self) -> bool { !self.is_real() }

    /// Return `true` if `self` is a single-precision type.
    pub fn is_single(self) -> bool {
        matches!(self, Self::Float32 | Self::Complex64)
    }

    /// Return the complex type of the same precision.
    pub fn to_complex(self) -> Self {
        match self {
            Self::Float32 | Self::Complex64 => Self::Complex64,
            Self::Float64 | Self::Complex128 => Self::Complex128,
        }
    }

    /// Return the smallest type able to hold values of both `self` and
    /// `other`.
    pub fn promote(self, other: Self) -> Self {
        let single = self.is_single() && other.is_single();
        match (self.is_real() && other.is_real(), single) {
            (true,  true ) => Self::Float32,
            (true,  false) => Self::Float64,
            (false, true ) => Self::Complex64,
            (false, false) => Self::Complex128,
        }
    }

    /// Return the type needed to hold the product of `self`-typed data with a
    /// scalar.
    pub fn promote_scalar(self, scalar: C64) -> Self {
        if self.is_real() && scalar.im != 0.0 { self.to_complex() } else { self }
    }

    /// Return `true` if `z` is representable exactly as a real number.
    pub fn admits(self, z: C64) -> bool { self.is_complex() || z.im == 0.0 }

    /// Round `z` to the precision and field of `self`.
    pub fn coerce(self, z: C64) -> C64 {
        match self {
            Self::Float32    => C64::new(z.re as f32 as f64, 0.0),
            Self::Float64    => C64::new(z.re, 0.0),
            Self::Complex64  => C64::new(z.re as f32 as f64, z.im as f32 as f64),
            Self::Complex128 => z,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::c;

    #[test]
    fn parse() {
        assert_eq!("float64".parse::<DType>().unwrap(), DType::Float64);
        assert_eq!("float".parse::<DType>().unwrap(),   DType::Float64);
        assert_eq!("c64".parse::<DType>().unwrap(),     DType::Complex64);
        assert_eq!("complex".parse::<DType>().unwrap(), DType::Complex128);
        assert!(matches!(
            "int32".parse::<DType>(),
            Err(DTypeError::Unsupported(s)) if s == "int32"
        ));
        assert!("raise".parse::<DType>().is_err());
    }

    #[test]
    fn promotion() {
        use DType::*;
        assert_eq!(Float32.promote(Float32),    Float32);
        assert_eq!(Float32.promote(Float64),    Float64);
        assert_eq!(Float64.promote(Complex64),  Complex128);
        assert_eq!(Complex64.promote(Float32),  Complex64);
        assert_eq!(Float64.promote_scalar(c!(-1.0)),   Float64);
        assert_eq!(Float64.promote_scalar(c!(i 1.0)),  Complex128);
        assert_eq!(Float32.promote_scalar(c!(i 1.0)),  Complex64);
    }

    #[test]
    fn coerce() {
        let z = c!(0.1, 0.2);
        assert_eq!(DType::Complex128.coerce(z), z);
        assert_eq!(DType::Float64.coerce(z), c!(0.1));
        assert_eq!(DType::Complex64.coerce(z).re, 0.1_f32 as f64);
        assert!(!DType::Float64.admits(z));
        assert!(DType::Complex64.admits(z));
    }
}
