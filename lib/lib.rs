#![allow(non_snake_case, non_upper_case_globals)]

//! This package provides canonical forms, compression, and structure-preserving
//! arithmetic for [matrix product states and operators][mps], the
//! one-dimensional tensor networks used to represent quantum many-body states
//! and operators compactly.
//!
//! - [`tensor`] provides a dense tensor with named indices, contracted over
//! all names two tensors have in common.
//! - [`linalg`] wraps the QR, singular value, and Hermitian eigenvalue
//! decompositions used to split a site tensor across one of its bonds, along
//! with the truncation policy applied to singular value spectra.
//! - [`chain`] implements the [`Chain`] itself: gauge-fixing sweeps,
//! orthogonality-center shifts, bond compression, direct-sum addition, and
//! partial traces and transposes.
//!
//! ```
//! use rand::{ SeedableRng, rngs::StdRng };
//! use tensor_chain::{ Chain, CompressOpts, GenOpts };
//!
//! let mut rng = StdRng::seed_from_u64(10546);
//! let psi = Chain::rand_state(10, 8, &GenOpts::default(), &mut rng).unwrap();
//! let mut sum = psi.add(&psi).unwrap();
//! assert_eq!(sum.max_bond(), 16);
//! sum.compress(&CompressOpts::default()).unwrap();
//! assert!(sum.max_bond() <= 8);
//! assert!((sum.inner(&psi).unwrap().re - 2.0).abs() < 1e-10);
//! ```
//!
//! [mps]: https://en.wikipedia.org/wiki/Matrix_product_state
//!
//! # Further reading
//! - U. Schollwöck, "The density-matrix renormalization group in the age of
//! matrix product states." [arXiv:1008.3477](https://arxiv.org/abs/1008.3477)
//! - R. Orús, "A practical introduction to tensor networks: matrix product
//! states and projected entangled pair states."
//! [arXiv:1306.2164](https://arxiv.org/abs/1306.2164)
//!

pub mod dtype;
pub mod tensor;
pub mod linalg;
pub mod chain;

pub use dtype::DType;
pub use tensor::Tensor;
pub use linalg::{ Absorb, CutoffMode, Method, Truncation };
pub use chain::{
    CanonicalForm,
    Chain,
    ChainError,
    ChainResult,
    CompressOpts,
    Dist,
    Form,
    GenOpts,
    Kind,
    Naming,
    PartialTraceOpts,
    SweepOpts,
};

pub extern crate num_complex;
/// Handy macro to create `num_complex::Complex64`s from more natural and
/// succinct syntax.
///
/// ```
/// use std::f64::consts::PI;
/// use num_complex::Complex64;
/// use tensor_chain::c;
///
/// assert_eq!( c!(i (-1.0)),    Complex64::new(0.0, -1.0)      );
/// assert_eq!( c!(e PI),        Complex64::cis(PI)             );
/// assert_eq!( c!(1.0),         Complex64::new(1.0, 0.0)       );
/// assert_eq!( c!(1.0 + i 1.0), Complex64::new(1.0, 1.0)       );
/// assert_eq!( c!(1.0 - i 1.0), Complex64::new(1.0, -1.0)      );
/// assert_eq!( c!(1.0 + 1.0 i), Complex64::new(1.0, 1.0)       );
/// assert_eq!( c!(1.0 - 1.0 i), Complex64::new(1.0, -1.0)      );
/// assert_eq!( c!(1.0, 1.0),    Complex64::new(1.0, 1.0)       );
/// assert_eq!( c!(1.0, e PI),   Complex64::from_polar(1.0, PI) );
/// ```
#[macro_export]
macro_rules! c {
    ( i $im:expr )
        => { $crate::num_complex::Complex64::new(0.0, $im) };
    ( e $ph:expr )
        => { $crate::num_complex::Complex64::cis($ph) };
    ( $re:expr )
        => { $crate::num_complex::Complex64::new($re, 0.0) };
    ( $re:literal + i $im:literal )
        => { $crate::num_complex::Complex64::new($re, $im) };
    ( $re:literal - i $im:literal )
        => { $crate::num_complex::Complex64::new($re, -$im) };
    ( $re:literal + $im:literal i )
        => { $crate::num_complex::Complex64::new($re, $im) };
    ( $re:literal - $im:literal i )
        => { $crate::num_complex::Complex64::new($re, -$im) };
    ( $r:expr, e $ph:expr )
        => { $crate::num_complex::Complex64::from_polar($r, $ph) };
    ( $re:expr, $im:expr )
        => { $crate::num_complex::Complex64::new($re, $im) };
}
