//! Bipartite matrix factorizations with optional truncation.
//!
//! Every gauge transform and every lossy truncation performed on a chain goes
//! through [`decompose`], which factors a matrix `M` into `left · right` using
//! one of three methods:
//! - [`Method::Qr`]: exact; the isometric factor is `Q` (or `Qᵀ` when
//!   absorbing to the left).
//! - [`Method::Svd`]: thin SVD `M = U S V†`, optionally truncated.
//! - [`Method::Eig`]: eigendecomposition of the Gram matrix `M M†` (or
//!   `M† M`), whose eigenvalues are squared singular values.
//!
//! Decompositions themselves are delegated to [`faer`]; inputs and outputs are
//! [`ndarray`] matrices.

use faer::{ Mat, Side, c64 };
use ndarray as nd;
use num_complex::Complex64 as C64;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum LinalgError {
    /// Returned when the singular value decomposition fails to converge.
    #[error("singular value decomposition failed to converge")]
    SvdNoConvergence,

    /// Returned when the self-adjoint eigendecomposition fails to converge.
    #[error("eigendecomposition failed to converge")]
    EigNoConvergence,
}
pub type LinalgResult<T> = Result<T, LinalgError>;

/// Factorization used to split a matrix.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Method {
    /// QR decomposition. Exact; never truncates.
    #[default]
    Qr,
    /// Thin singular value decomposition.
    Svd,
    /// Eigendecomposition of the implicit Gram matrix.
    Eig,
}

/// Where singular values are multiplied back in after a split.
///
/// The opposite factor is left isometric.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Absorb {
    /// `left = U S`, `right = V†`; `right` has orthonormal rows.
    Left,
    /// `left = U`, `right = S V†`; `left` has orthonormal columns.
    #[default]
    Right,
    /// `left = U √S`, `right = √S V†`; neither factor is isometric.
    Both,
}

/// How the `cutoff` of a [`Truncation`] is compared against singular values.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum CutoffMode {
    /// Keep values strictly greater than `cutoff`.
    Abs,
    /// Keep values strictly greater than `cutoff` times the largest value.
    #[default]
    Rel,
    /// Discard the longest tail whose summed squares are at most `cutoff`
    /// times the summed squares of all values.
    Sum2,
}

/// Singular value truncation policy.
///
/// `max_bond` is a hard cap applied after the cutoff, so whichever of the two
/// truncates more is binding. At least one value is always kept.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Truncation {
    pub cutoff: f64,
    pub mode: CutoffMode,
    pub max_bond: Option<usize>,
}

impl Default for Truncation {
    fn default() -> Self {
        Self { cutoff: 1e-10, mode: CutoffMode::Rel, max_bond: None }
    }
}

impl Truncation {
    /// Truncate only to a maximum number of singular values.
    pub fn max_bond(max_bond: usize) -> Self {
        Self { cutoff: 0.0, mode: CutoffMode::Abs, max_bond: Some(max_bond) }
    }

    /// Return the number of leading values of `svals` to keep.
    ///
    /// `svals` must be sorted in nonincreasing order.
    pub fn rank(&self, svals: &[f64]) -> usize {
        if svals.is_empty() { return 0; }
        let by_cutoff: usize =
            match self.mode {
                CutoffMode::Abs => {
                    svals.iter().take_while(|s| **s > self.cutoff).count()
                },
                CutoffMode::Rel => {
                    let thresh = self.cutoff * svals[0];
                    svals.iter().take_while(|s| **s > thresh).count()
                },
                CutoffMode::Sum2 => {
                    let total: f64 = svals.iter().map(|s| s * s).sum();
                    let budget = self.cutoff * total;
                    let mut tail = 0.0;
                    let mut k = svals.len();
                    while k > 0 {
                        let next = tail + svals[k - 1] * svals[k - 1];
                        if next > budget { break; }
                        tail = next;
                        k -= 1;
                    }
                    k
                },
            };
        let capped = self.max_bond.map_or(by_cutoff, |m| by_cutoff.min(m));
        capped.max(1)
    }
}

/// Result of [`decompose`]: `M ≈ left · right`.
#[derive(Clone, Debug)]
pub struct Split {
    pub left: nd::Array2<C64>,
    /// Retained singular values in nonincreasing order, if the method
    /// computes them.
    pub svals: Option<Vec<f64>>,
    pub right: nd::Array2<C64>,
}

impl Split {
    /// Return the size of the new inner dimension.
    pub fn rank(&self) -> usize { self.left.ncols() }
}

// faer kernels for the two fields a chain's data can be decomposed in
trait Field: Copy {
    fn from_c64(z: C64) -> Self;
    fn into_c64(self) -> C64;
    fn svd(m: &nd::Array2<C64>)
        -> LinalgResult<(nd::Array2<C64>, Vec<f64>, nd::Array2<C64>)>;
    fn qr(m: &nd::Array2<C64>) -> (nd::Array2<C64>, nd::Array2<C64>);
    fn eigh(m: &nd::Array2<C64>) -> LinalgResult<(Vec<f64>, nd::Array2<C64>)>;
}

fn to_faer<T: Field>(m: &nd::Array2<C64>) -> Mat<T> {
    Mat::from_fn(m.nrows(), m.ncols(), |i, j| T::from_c64(m[[i, j]]))
}

fn from_faer<T: Field>(m: faer::MatRef<'_, T>) -> nd::Array2<C64> {
    nd::Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)].into_c64())
}

macro_rules! impl_field {
    ( $t:ty, $from:expr, $into:expr, $re:expr ) => {
        impl Field for $t {
            fn from_c64(z: C64) -> Self { ($from)(z) }

            fn into_c64(self) -> C64 { ($into)(self) }

            fn svd(m: &nd::Array2<C64>)
                -> LinalgResult<(nd::Array2<C64>, Vec<f64>, nd::Array2<C64>)>
            {
                let svd = to_faer::<$t>(m).thin_svd()
                    .map_err(|_| LinalgError::SvdNoConvergence)?;
                let k = svd.U().ncols();
                let s: Vec<f64> = (0..k).map(|j| ($re)(svd.S()[j])).collect();
                Ok((from_faer(svd.U()), s, from_faer(svd.V())))
            }

            fn qr(m: &nd::Array2<C64>) -> (nd::Array2<C64>, nd::Array2<C64>) {
                let qr = to_faer::<$t>(m).qr();
                let q = qr.compute_thin_Q();
                (from_faer(q.as_ref()), from_faer(qr.thin_R()))
            }

            fn eigh(m: &nd::Array2<C64>)
                -> LinalgResult<(Vec<f64>, nd::Array2<C64>)>
            {
                let eig = to_faer::<$t>(m).self_adjoint_eigen(Side::Lower)
                    .map_err(|_| LinalgError::EigNoConvergence)?;
                let k = eig.U().ncols();
                let s: Vec<f64> = (0..k).map(|j| ($re)(eig.S()[j])).collect();
                Ok((s, from_faer(eig.U())))
            }
        }
    }
}

impl_field!(f64, |z: C64| z.re, |x: f64| C64::new(x, 0.0), |x: f64| x);
impl_field!(c64, |z: C64| z, |z: c64| z, |z: c64| z.re);

fn adjoint(m: &nd::Array2<C64>) -> nd::Array2<C64> {
    m.t().mapv(|z| z.conj())
}

fn scale_cols(m: &mut nd::Array2<C64>, w: &[f64]) {
    m.axis_iter_mut(nd::Axis(1)).zip(w)
        .for_each(|(mut col, x)| col.mapv_inplace(|z| z * *x));
}

fn scale_rows(m: &mut nd::Array2<C64>, w: &[f64]) {
    m.axis_iter_mut(nd::Axis(0)).zip(w)
        .for_each(|(mut row, x)| row.mapv_inplace(|z| z * *x));
}

// stable descending order of values: ties keep increasing index
fn descending(vals: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..vals.len()).collect();
    order.sort_by(|a, b| vals[*b].total_cmp(&vals[*a]));
    order
}

fn select_cols(m: &nd::Array2<C64>, cols: &[usize]) -> nd::Array2<C64> {
    m.select(nd::Axis(1), cols)
}

fn retained(svals: &[f64], trunc: Option<&Truncation>, max_rank: usize)
    -> usize
{
    let k = trunc.map_or(svals.len(), |t| t.rank(svals)).min(max_rank);
    if k < svals.len() {
        let discarded: f64 = svals[k..].iter().map(|s| s * s).sum();
        trace!(kept = k, of = svals.len(), discarded, "truncated spectrum");
    }
    k
}

/// Factor `m` into `left · right`.
///
/// The inner dimension is at most `min(rows, cols)`, further reduced by
/// `trunc` for [`Method::Svd`] and [`Method::Eig`]; [`Method::Qr`] ignores
/// `trunc` and treats [`Absorb::Both`] like [`Absorb::Right`]. If `real` is
/// `true`, imaginary parts of `m` are dropped and the factorization is
/// carried out over the reals.
pub fn decompose(
    m: &nd::Array2<C64>,
    method: Method,
    trunc: Option<&Truncation>,
    absorb: Absorb,
    real: bool,
) -> LinalgResult<Split>
{
    match method {
        Method::Qr => Ok(qr_split(m, absorb, real)),
        Method::Svd => svd_split(m, trunc, absorb, real),
        Method::Eig => eig_split(m, trunc, absorb, real),
    }
}

fn qr_split(m: &nd::Array2<C64>, absorb: Absorb, real: bool) -> Split {
    let qr = |a: &nd::Array2<C64>| {
        if real { <f64 as Field>::qr(a) } else { <c64 as Field>::qr(a) }
    };
    match absorb {
        Absorb::Left => {
            // m = (mᵀ)ᵀ = (q r)ᵀ = rᵀ qᵀ
            let (q, r) = qr(&m.t().to_owned());
            Split { left: r.reversed_axes(), svals: None, right: q.reversed_axes() }
        },
        Absorb::Right | Absorb::Both => {
            let (q, r) = qr(m);
            Split { left: q, svals: None, right: r }
        },
    }
}

fn svd_split(
    m: &nd::Array2<C64>,
    trunc: Option<&Truncation>,
    absorb: Absorb,
    real: bool,
) -> LinalgResult<Split>
{
    let (u, s, v) =
        if real { <f64 as Field>::svd(m)? } else { <c64 as Field>::svd(m)? };
    let order = descending(&s);
    let s: Vec<f64> = order.iter().map(|j| s[*j]).collect();
    let k = retained(&s, trunc, m.nrows().min(m.ncols()));
    let mut left = select_cols(&u, &order[..k]);
    let mut right = adjoint(&select_cols(&v, &order[..k]));
    let s: Vec<f64> = s[..k].to_vec();
    match absorb {
        Absorb::Left => scale_cols(&mut left, &s),
        Absorb::Right => scale_rows(&mut right, &s),
        Absorb::Both => {
            let sq: Vec<f64> = s.iter().map(|x| x.sqrt()).collect();
            scale_cols(&mut left, &sq);
            scale_rows(&mut right, &sq);
        },
    }
    Ok(Split { left, svals: Some(s), right })
}

fn eig_split(
    m: &nd::Array2<C64>,
    trunc: Option<&Truncation>,
    absorb: Absorb,
    real: bool,
) -> LinalgResult<Split>
{
    let eigh = |a: &nd::Array2<C64>| {
        if real { <f64 as Field>::eigh(a) } else { <c64 as Field>::eigh(a) }
    };
    let max_rank = m.nrows().min(m.ncols());
    let m_h = adjoint(m);
    let gram: nd::Array2<C64> =
        match absorb {
            Absorb::Left => m_h.dot(m),
            Absorb::Right | Absorb::Both => m.dot(&m_h),
        };
    let (lam, vecs) = eigh(&gram)?;
    // eigenvalues at the rounding floor of the Gram matrix are zero; their
    // square roots would otherwise survive any relative cutoff
    let lam_max = lam.iter().copied().fold(0.0, f64::max);
    let floor = lam_max * f64::EPSILON * gram.nrows() as f64;
    let order = descending(&lam);
    let s: Vec<f64> =
        order.iter()
        .map(|j| if lam[*j] > floor { lam[*j].sqrt() } else { 0.0 })
        .collect();
    let k = retained(&s, trunc, max_rank);
    let w = select_cols(&vecs, &order[..k]);
    let s: Vec<f64> = s[..k].to_vec();
    let (left, right) =
        match absorb {
            Absorb::Left => (m.dot(&w), adjoint(&w)),
            Absorb::Right => {
                let right = adjoint(&w).dot(m);
                (w, right)
            },
            Absorb::Both => {
                let mut right = adjoint(&w).dot(m);
                let mut left = w;
                let sq: Vec<f64> = s.iter().map(|x| x.sqrt()).collect();
                let inv: Vec<f64> =
                    sq.iter().map(|x| if *x > 0.0 { x.recip() } else { 0.0 })
                    .collect();
                scale_cols(&mut left, &sq);
                scale_rows(&mut right, &inv);
                (left, right)
            },
        };
    Ok(Split { left, svals: Some(s), right })
}

/// Eigendecomposition of a Hermitian matrix, with eigenvalues in
/// nondecreasing order and eigenvectors as the columns of the returned
/// matrix.
pub fn eigh(m: &nd::Array2<C64>) -> LinalgResult<(Vec<f64>, nd::Array2<C64>)> {
    <c64 as Field>::eigh(m)
}
