//! Lossy bond truncation, the singular value spectrum at a bond, and
//! zero-padding of bonds.

use std::str::FromStr;
use ndarray as nd;
use num_complex::Complex64 as C64;
use tracing::debug;
use crate::{
    linalg::{ self, Absorb, Method, Truncation },
    tensor::Tensor,
};
use super::{
    CanonicalForm,
    Chain,
    ChainError,
    ChainResult,
    bond,
    canonize::Dir,
};

/// Target shape of a compressed chain.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Form {
    /// Every site but the last is left-isometric.
    Left,
    /// Every site but the first is right-isometric.
    #[default]
    Right,
    /// No canonical structure. Bonds are truncated as for [`Form::Left`],
    /// after which a second, exact sweep from the right end redistributes the
    /// singular values according to [`CompressOpts::absorb`].
    Flat,
    /// The given site is the orthogonality center.
    Site(usize),
}

impl FromStr for Form {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "flat" => Ok(Self::Flat),
            other => other.parse::<usize>()
                .map(Self::Site)
                .map_err(|_| ChainError::InvalidForm(other.to_string())),
        }
    }
}

/// Options for compression.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CompressOpts {
    pub form: Form,
    /// Either [`Method::Svd`] or [`Method::Eig`]; [`Method::Qr`] cannot
    /// truncate and is treated as [`Method::Svd`].
    pub method: Method,
    pub trunc: Truncation,
    /// Where singular values go for [`Form::Flat`] and
    /// [`Chain::compress_bond`]; the other forms fix this themselves.
    pub absorb: Absorb,
}

impl Default for CompressOpts {
    fn default() -> Self {
        Self {
            form: Form::default(),
            method: Method::Svd,
            trunc: Truncation::default(),
            absorb: Absorb::Both,
        }
    }
}

impl CompressOpts {
    /// Default options with a hard cap on the bond dimension.
    pub fn max_bond(max_bond: usize) -> Self {
        Self { trunc: Truncation::max_bond(max_bond), ..Self::default() }
    }

    fn method(&self) -> Method {
        match self.method {
            Method::Qr => Method::Svd,
            m => m,
        }
    }
}

// copy `t` into a zero tensor in which index `idx` has dimension `k`
fn zero_pad(t: &Tensor, idx: &str, k: usize) -> ChainResult<Tensor> {
    let pos = t.index_pos(idx)
        .ok_or_else(|| crate::tensor::TensorError::MissingIndex(idx.to_string()))?;
    let mut shape: Vec<usize> = t.shape().to_vec();
    let d = shape[pos];
    shape[pos] = k;
    let mut data: nd::ArrayD<C64> = nd::ArrayD::zeros(shape);
    data.slice_each_axis_mut(|ax| {
        if ax.axis.index() == pos { nd::Slice::from(0..d) } else { nd::Slice::from(..) }
    })
    .assign(t.data());
    Ok(Tensor::new_unchecked(t.indices().to_vec(), data))
}

impl Chain {
    /// Compress every bond in a single left-to-right sweep.
    ///
    /// The chain is first brought into right-canonical form so that each
    /// truncation happens at the orthogonality center. Afterwards, every site
    /// but the last is left-isometric.
    pub fn left_compress(&mut self, opts: &CompressOpts) -> ChainResult<()> {
        let n = self.len();
        self.canonize(0, None)?;
        for i in 0..n - 1 {
            self.split_bond(
                i, Dir::Right, opts.method(), Some(&opts.trunc), Absorb::Right, None)?;
        }
        self.settle();
        Ok(())
    }

    /// Compress every bond in a single right-to-left sweep.
    ///
    /// Mirror image of [`Self::left_compress`]; afterwards, every site but the
    /// first is right-isometric.
    pub fn right_compress(&mut self, opts: &CompressOpts) -> ChainResult<()> {
        let n = self.len();
        self.canonize(n - 1, None)?;
        for i in (1..n).rev() {
            self.split_bond(
                i, Dir::Left, opts.method(), Some(&opts.trunc), Absorb::Left, None)?;
        }
        self.settle();
        Ok(())
    }

    /// Truncate every bond according to `opts`, leaving the chain in the
    /// requested [`Form`].
    ///
    /// Bond dimensions never increase. Fails without modifying `self` if the
    /// target site of [`Form::Site`] is out of range.
    pub fn compress(&mut self, opts: &CompressOpts) -> ChainResult<()> {
        let n = self.len();
        if let Form::Site(c) = opts.form { self.check_site(c)?; }
        debug!(form = ?opts.form, method = ?opts.method(), trunc = ?opts.trunc, "compress");
        match opts.form {
            Form::Left => self.left_compress(opts)?,
            Form::Right => self.right_compress(opts)?,
            Form::Site(c) => {
                self.left_compress(opts)?;
                self.canonize(c, None)?;
            },
            Form::Flat => {
                // truncate only at the orthogonality center, then move the
                // weight back without truncating
                self.left_compress(opts)?;
                if opts.absorb != Absorb::Right {
                    for i in (1..n).rev() {
                        self.split_bond(
                            i, Dir::Left, opts.method(), None, opts.absorb, None)?;
                    }
                }
                self.form = CanonicalForm::Uncanonical;
                self.settle();
            },
        }
        Ok(())
    }

    /// Return a compressed copy of `self`.
    pub fn compressed(&self, opts: &CompressOpts) -> ChainResult<Self> {
        let mut new = self.clone();
        new.compress(opts)?;
        Ok(new)
    }

    /// Truncate only the bond between sites `i` and `i + 1`.
    ///
    /// An orthogonality center is first established at `i` (or reused at
    /// `i + 1`). Singular values go where `opts.absorb` says, which determines
    /// the resulting form: [`Absorb::Right`] leaves the center at `i + 1`,
    /// [`Absorb::Left`] leaves it at `i`, and [`Absorb::Both`] leaves a gap of
    /// two sites between the left- and right-isometric parts.
    pub fn compress_bond(&mut self, i: usize, opts: &CompressOpts) -> ChainResult<()> {
        let n = self.len();
        if i + 1 >= n { return Err(ChainError::SiteOutOfRange(i + 1, n)); }
        if !self.form.is_center(i, n) {
            if self.form.is_center(i + 1, n) {
                self.shift_orthogonality_center(i + 1, i, None)?;
            } else {
                self.canonize(i, None)?;
            }
        }
        let svals = self.split_bond(
            i, Dir::Right, opts.method(), Some(&opts.trunc), opts.absorb, None)?;
        debug!(bond = i, kept = svals.as_ref().map(|s| s.len()), "compress bond");
        self.settle();
        Ok(())
    }

    /// Return the singular values across the bond between sites `i` and `i +
    /// 1` in nonincreasing order, without truncation.
    ///
    /// The orthogonality center is moved to site `i` first, reusing any
    /// existing canonical structure.
    pub fn singular_values(&mut self, i: usize) -> ChainResult<Vec<f64>> {
        let n = self.len();
        if i + 1 >= n { return Err(ChainError::SiteOutOfRange(i + 1, n)); }
        self.canonize(i, None)?;
        let b = bond(i);
        let site = &self.sites[i];
        let rows: Vec<&String> =
            site.indices().iter().filter(|idx| **idx != b).collect();
        let (mat, _, _) = site.to_matrix(&rows)?;
        let split = linalg::decompose(
            &mat, Method::Svd, None, Absorb::Right, self.dtype.is_real())?;
        Ok(split.svals.unwrap_or_default())
    }

    /// Zero-pad every bond of dimension less than `k` up to `k`.
    ///
    /// The represented object and the dtype are unchanged. If every bond is
    /// already at least `k`, this is a no-op; otherwise the padding breaks any
    /// isometries and the form is reset to [`CanonicalForm::Uncanonical`].
    pub fn expand_bond_dimension(&mut self, k: usize) -> ChainResult<()> {
        let n = self.len();
        let mut changed = false;
        for i in 0..n.saturating_sub(1) {
            let b = bond(i);
            if self.bond_dim(i)? >= k { continue; }
            let left = zero_pad(&self.sites[i], &b, k)?;
            let right = zero_pad(&self.sites[i + 1], &b, k)?;
            self.sites[i] = left;
            self.sites[i + 1] = right;
            changed = true;
        }
        if changed {
            debug!(k, "expanded bonds");
            self.form = CanonicalForm::Uncanonical;
        }
        Ok(())
    }

    /// Return a copy of `self` with every bond padded to at least `k`.
    pub fn expanded_bond_dimension(&self, k: usize) -> ChainResult<Self> {
        let mut new = self.clone();
        new.expand_bond_dimension(k)?;
        Ok(new)
    }
}

#[cfg(test)]
mod tests {
    use rand::{ SeedableRng, rngs::StdRng };
    use crate::{ c, linalg::CutoffMode };
    use super::*;
    use super::super::GenOpts;

    fn rand_state(rng: &mut StdRng, n: usize, chi: usize) -> Chain {
        Chain::rand_state(n, chi, &GenOpts::default(), rng).unwrap()
    }

    #[test]
    fn parse_forms() {
        assert_eq!("left".parse::<Form>().unwrap(), Form::Left);
        assert_eq!("right".parse::<Form>().unwrap(), Form::Right);
        assert_eq!("flat".parse::<Form>().unwrap(), Form::Flat);
        assert_eq!("4".parse::<Form>().unwrap(), Form::Site(4));
        assert!(matches!(
            "raise".parse::<Form>(),
            Err(ChainError::InvalidForm(s)) if s == "raise"
        ));
    }

    #[test]
    fn compress_sum_back_down() {
        let mut rng = StdRng::seed_from_u64(30);
        let p = rand_state(&mut rng, 8, 5);
        for method in [Method::Svd, Method::Eig] {
            for mode in [CutoffMode::Abs, CutoffMode::Rel, CutoffMode::Sum2] {
                let trunc = Truncation { mode, ..Truncation::default() };
                let opts = CompressOpts { method, trunc, ..CompressOpts::default() };
                let reference = p.compressed(&opts).unwrap();
                let mut pp = p.add(&p).unwrap();
                assert!(pp.bond_dims().iter().all(|d| *d == 10));
                pp.compress(&opts).unwrap();
                assert_eq!(pp.bond_dims(), reference.bond_dims());
                assert!(pp.max_bond() <= 5);
                assert!((pp.inner(&p).unwrap() - c!(2.0)).norm() < 1e-8);
            }
        }
    }

    #[test]
    fn compress_to_max_bond() {
        let mut rng = StdRng::seed_from_u64(31);
        let p = rand_state(&mut rng, 8, 6);
        let before = p.norm_squared().unwrap();
        for form in [Form::Left, Form::Right, Form::Site(3)] {
            let opts = CompressOpts { form, ..CompressOpts::max_bond(3) };
            let q = p.compressed(&opts).unwrap();
            assert!(q.bond_dims().iter().all(|d| *d <= 3));
            assert!(q.norm_squared().unwrap() < before);
        }
        // a cap above every bond truncates nothing
        let q = p.compressed(&CompressOpts::max_bond(13)).unwrap();
        assert!((q.norm_squared().unwrap() - before).abs() < 1e-12);
    }

    #[test]
    fn compressed_forms() {
        let mut rng = StdRng::seed_from_u64(32);
        let n = 8;
        let p = rand_state(&mut rng, n, 5);
        for (form, counts) in [
            ("left", (n - 1, 0)),
            ("right", (0, n - 1)),
            ("flat", (0, 0)),
            ("3", (3, n - 4)),
        ] {
            let opts = CompressOpts { form: form.parse().unwrap(), ..CompressOpts::default() };
            let q = p.compressed(&opts).unwrap();
            assert_eq!(q.count_canonized(), counts);
            assert!((q.norm_squared().unwrap() - 1.0).abs() < 1e-12);
            assert!((q.inner(&p).unwrap() - c!(1.0)).norm() < 1e-12);
        }
        let mut q = p.clone();
        let opts = CompressOpts { form: Form::Site(n), ..CompressOpts::default() };
        assert!(matches!(q.compress(&opts), Err(ChainError::SiteOutOfRange(8, 8))));
        assert_eq!(q, p);
    }

    #[test]
    fn flat_truncates_like_left() {
        let mut rng = StdRng::seed_from_u64(36);
        let p = rand_state(&mut rng, 10, 16);
        let left = CompressOpts { form: Form::Left, ..CompressOpts::max_bond(4) };
        let reference = p.compressed(&left).unwrap();
        let expected = reference.inner(&p).unwrap();
        let dense = reference.to_dense().unwrap();
        for method in [Method::Svd, Method::Eig] {
            for absorb in [Absorb::Left, Absorb::Right, Absorb::Both] {
                let opts = CompressOpts {
                    form: Form::Flat,
                    method,
                    absorb,
                    ..CompressOpts::max_bond(4)
                };
                let q = p.compressed(&opts).unwrap();
                assert_eq!(q.bond_dims(), reference.bond_dims());
                assert_eq!(q.form(), CanonicalForm::Uncanonical);
                assert!((q.inner(&p).unwrap() - expected).norm() < 1e-9);
                assert!(q.to_dense().unwrap().approx_eq(&dense, Some(1e-9)));
            }
        }
    }

    #[test]
    fn single_bond() {
        let mut rng = StdRng::seed_from_u64(33);
        let n = 6;
        let p = rand_state(&mut rng, n, 5);
        for (absorb, form) in [
            (Absorb::Right, CanonicalForm::CenterAt(3)),
            (Absorb::Left, CanonicalForm::CenterAt(2)),
            (Absorb::Both, CanonicalForm::Mixed { left_up_to: 2, right_from: 4 }),
        ] {
            let opts = CompressOpts { absorb, ..CompressOpts::max_bond(2) };
            let mut q = p.clone();
            q.compress_bond(2, &opts).unwrap();
            assert_eq!(q.bond_dim(2).unwrap(), 2);
            assert_eq!(q.form(), form);
            assert!(q.norm_squared().unwrap() < 1.0);
        }
        let mut q = p.clone();
        assert!(matches!(
            q.compress_bond(5, &CompressOpts::default()),
            Err(ChainError::SiteOutOfRange(6, 6))
        ));
    }

    #[test]
    fn spectrum_matches_dense() {
        let mut rng = StdRng::seed_from_u64(34);
        let n = 6;
        let mut p = rand_state(&mut rng, n, 4);
        let vec = p.to_dense_matrix().unwrap();
        for i in [1, 3] {
            let rows = 1 << (i + 1);
            let cols = 1 << (n - 1 - i);
            let mat = nd::Array2::from_shape_vec(
                (rows, cols), vec.iter().copied().collect()).unwrap();
            let dense = linalg::decompose(&mat, Method::Svd, None, Absorb::Right, false)
                .unwrap()
                .svals
                .unwrap();
            let svals = p.singular_values(i).unwrap();
            assert_eq!(p.count_canonized(), (i, n - 1 - i));
            assert!((svals.iter().map(|s| s * s).sum::<f64>() - 1.0).abs() < 1e-12);
            for (k, s) in dense.iter().enumerate() {
                let mine = svals.get(k).copied().unwrap_or(0.0);
                assert!((mine - s).abs() < 1e-10);
            }
        }
        assert!(matches!(p.singular_values(5), Err(ChainError::SiteOutOfRange(6, 6))));
    }

    #[test]
    fn expand_bonds() {
        let mut rng = StdRng::seed_from_u64(35);
        let mut p = rand_state(&mut rng, 7, 5);
        let other = rand_state(&mut rng, 7, 3);
        p.canonize(3, None).unwrap();

        // no-op when nothing is smaller
        let same = p.expanded_bond_dimension(2).unwrap();
        assert_eq!(same, p);

        let big = p.expanded_bond_dimension(13).unwrap();
        assert!(big.bond_dims().iter().all(|d| *d == 13));
        assert_eq!(big.dtype(), p.dtype());
        assert_eq!(big.form(), CanonicalForm::Uncanonical);
        assert!((big.norm_squared().unwrap() - p.norm_squared().unwrap()).abs() < 1e-12);
        assert!((big.inner(&other).unwrap() - p.inner(&other).unwrap()).norm() < 1e-12);
    }
}
