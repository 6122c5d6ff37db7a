//! Direct-sum addition, subtraction, and scalar multiplication.

use std::ops::{ Add, Sub };
use ndarray as nd;
use num_complex::Complex64 as C64;
use tracing::debug;
use crate::{ c, tensor::Tensor };
use super::{ CanonicalForm, Chain, ChainError, ChainResult, Form, CompressOpts };

// embed `a` and `b` block-diagonally along their first `nbonds` axes; all
// other axes must agree and are shared
fn direct_sum(a: &Tensor, b: &Tensor, nbonds: usize) -> Tensor {
    let shape: Vec<usize> =
        a.shape().iter().zip(b.shape()).enumerate()
        .map(|(k, (da, db))| if k < nbonds { da + db } else { *da })
        .collect();
    let mut data: nd::ArrayD<C64> = nd::ArrayD::zeros(shape);
    data.slice_each_axis_mut(|ax| {
        let k = ax.axis.index();
        if k < nbonds { nd::Slice::from(0..a.shape()[k]) } else { nd::Slice::from(..) }
    })
    .assign(a.data());
    data.slice_each_axis_mut(|ax| {
        let k = ax.axis.index();
        if k < nbonds { nd::Slice::from(a.shape()[k]..) } else { nd::Slice::from(..) }
    })
    .assign(b.data());
    Tensor::new_unchecked(a.indices().to_vec(), data)
}

impl Chain {
    /// Add `other` to `self` in place.
    ///
    /// Each bond of the result is the direct sum of the corresponding bonds of
    /// the operands, so bond dimensions add. Both chains must have the same
    /// kind, length, and physical indices. The result is
    /// [`CanonicalForm::Uncanonical`].
    pub fn add_inplace(&mut self, other: &Self) -> ChainResult<()> {
        self.check_compatible(other)?;
        let n = self.len();
        debug!(n, left = ?self.bond_dims(), right = ?other.bond_dims(), "direct sum");
        if n == 1 {
            let sum = self.sites[0].data() + other.sites[0].data();
            self.sites[0].data_mut().assign(&sum);
        } else {
            for (i, (a, b)) in self.sites.iter_mut().zip(&other.sites).enumerate() {
                let nbonds = usize::from(i > 0) + usize::from(i + 1 < n);
                *a = direct_sum(a, b, nbonds);
            }
        }
        self.dtype = self.dtype.promote(other.dtype);
        self.form = CanonicalForm::Uncanonical;
        self.settle();
        Ok(())
    }

    /// Return the sum of `self` and `other`.
    pub fn add(&self, other: &Self) -> ChainResult<Self> {
        let mut new = self.clone();
        new.add_inplace(other)?;
        Ok(new)
    }

    /// Subtract `other` from `self` in place.
    pub fn sub_inplace(&mut self, other: &Self) -> ChainResult<()> {
        self.check_compatible(other)?;
        self.add_inplace(&other.scaled(c!(-1.0)))
    }

    /// Return the difference of `self` and `other`.
    pub fn sub(&self, other: &Self) -> ChainResult<Self> {
        let mut new = self.clone();
        new.sub_inplace(other)?;
        Ok(new)
    }

    /// Multiply by a scalar in place.
    ///
    /// Only one site is modified: the orthogonality center if there is one
    /// (keeping the form), otherwise the first site.
    pub fn scale(&mut self, scalar: C64) {
        let n = self.len();
        match self.form.center(n) {
            Some(c) => self.sites[c].scalar_mul_inplace(scalar),
            None => {
                self.sites[0].scalar_mul_inplace(scalar);
                // a phase keeps an isometry isometric
                if (scalar.norm() - 1.0).abs() > f64::EPSILON {
                    self.form = self.form.touched(0, n);
                }
            },
        }
        self.dtype = self.dtype.promote_scalar(scalar);
        self.settle();
    }

    /// Return a copy of `self` multiplied by a scalar.
    pub fn scaled(&self, scalar: C64) -> Self {
        let mut new = self.clone();
        new.scale(scalar);
        new
    }

    /// Add `other` to `self` in place and compress the result.
    ///
    /// Only [`Form::Left`], [`Form::Right`], and [`Form::Site`] are accepted.
    /// A flat compression ends with no canonical structure to continue from,
    /// so it is rejected before anything is modified; call
    /// [`Self::add_inplace`] and [`Self::compress`] separately for that.
    pub fn add_and_compress(&mut self, other: &Self, opts: &CompressOpts)
        -> ChainResult<()>
    {
        match opts.form {
            Form::Flat => {
                return Err(ChainError::InvalidForm("flat".to_string()));
            },
            Form::Site(c) => { self.check_site(c)?; },
            Form::Left | Form::Right => { },
        }
        self.add_inplace(other)?;
        self.compress(opts)
    }
}

impl Add for &Chain {
    type Output = ChainResult<Chain>;

    fn add(self, rhs: Self) -> Self::Output { Chain::add(self, rhs) }
}

impl Sub for &Chain {
    type Output = ChainResult<Chain>;

    fn sub(self, rhs: Self) -> Self::Output { Chain::sub(self, rhs) }
}

#[cfg(test)]
mod tests {
    use rand::{ SeedableRng, rngs::StdRng };
    use crate::{ dtype::DType, chain::{ GenOpts, Kind } };
    use super::*;

    fn max_diff(a: &nd::Array2<C64>, b: &nd::Array2<C64>) -> f64 {
        (a - b).iter().map(|z| z.norm()).fold(0.0, f64::max)
    }

    #[test]
    fn add_doubles_overlap() {
        let mut rng = StdRng::seed_from_u64(40);
        let p = Chain::rand_state(10, 7, &GenOpts::default(), &mut rng).unwrap();
        let pp = p.add(&p).unwrap();
        assert_eq!(pp.bond_dims(), vec![14; 9]);
        assert_eq!(pp.form(), CanonicalForm::Uncanonical);
        assert_eq!(pp.upper_inds(), p.upper_inds());
        let expected = p.inner(&p).unwrap() * 2.0;
        assert!((pp.inner(&p).unwrap() - expected).norm() < 1e-10);

        let q = (&p + &p).unwrap();
        assert_eq!(q, pp);
    }

    #[test]
    fn sums_match_dense() {
        let mut rng = StdRng::seed_from_u64(41);
        let opts = GenOpts { normalize: false, ..GenOpts::default() };
        let a = Chain::rand_state(5, 3, &opts, &mut rng).unwrap();
        let b = Chain::rand_state(5, 4, &opts, &mut rng).unwrap();
        let (da, db) = (a.to_dense_matrix().unwrap(), b.to_dense_matrix().unwrap());

        let sum = a.add(&b).unwrap();
        assert_eq!(sum.bond_dims(), vec![7; 4]);
        assert!(max_diff(&sum.to_dense_matrix().unwrap(), &(&da + &db)) < 1e-10);

        let diff = (&a - &b).unwrap();
        assert!(max_diff(&diff.to_dense_matrix().unwrap(), &(&da - &db)) < 1e-10);

        let zero = a.sub(&a).unwrap();
        assert!(zero.norm().unwrap() < 1e-6);
    }

    #[test]
    fn operator_traces_subtract() {
        let mut rng = StdRng::seed_from_u64(42);
        let opts = GenOpts { phys_dim: 3, ..GenOpts::default() };
        let a = Chain::rand_operator(4, 2, &opts, &mut rng).unwrap();
        let b = Chain::rand_operator(4, 3, &opts, &mut rng).unwrap();
        let mut c = a.clone();
        c.sub_inplace(&b).unwrap();
        assert_eq!(c.kind(), Kind::Operator);
        let expected = a.trace().unwrap() - b.trace().unwrap();
        assert!((c.trace().unwrap() - expected).norm() < 1e-10);
    }

    #[test]
    fn single_site_sum() {
        let a = Chain::new_state([nd::array![c!(1.0), c!(2.0)].into_dyn()]).unwrap();
        let b = Chain::new_state([nd::array![c!(0.0, 1.0), c!(-2.0)].into_dyn()]).unwrap();
        let s = a.add(&b).unwrap();
        assert_eq!(s.site(0).unwrap().data()[[0]], c!(1.0, 1.0));
        assert_eq!(s.site(0).unwrap().data()[[1]], c!(0.0));
        assert_eq!(s.dtype(), DType::Complex128);
    }

    #[test]
    fn dtypes_promote() {
        let mut rng = StdRng::seed_from_u64(43);
        let real = GenOpts { dtype: DType::Float64, ..GenOpts::default() };
        let single = GenOpts { dtype: DType::Float32, ..GenOpts::default() };
        let a = Chain::rand_state(4, 2, &real, &mut rng).unwrap();
        let b = Chain::rand_state(4, 2, &single, &mut rng).unwrap();
        let c = Chain::rand_state(4, 2, &GenOpts::default(), &mut rng).unwrap();
        assert_eq!(a.add(&b).unwrap().dtype(), DType::Float64);
        assert_eq!(a.add(&c).unwrap().dtype(), DType::Complex128);
        assert_eq!(a.scaled(c!(0.0, 1.0)).dtype(), DType::Complex128);
        assert_eq!(a.scaled(c!(-2.0)).dtype(), DType::Float64);
    }

    #[test]
    fn mismatched_operands() {
        let mut rng = StdRng::seed_from_u64(44);
        let opts = GenOpts::default();
        let a = Chain::rand_state(4, 2, &opts, &mut rng).unwrap();
        let b = Chain::rand_state(5, 2, &opts, &mut rng).unwrap();
        assert!(matches!(a.add(&b), Err(ChainError::LengthMismatch(4, 5))));

        let mut c = Chain::rand_state(4, 2, &opts, &mut rng).unwrap();
        c.set_upper_ind_id("q{}").unwrap();
        assert!(matches!(a.add(&c), Err(ChainError::PhysicalMismatch(0))));

        let op = Chain::rand_operator(4, 2, &opts, &mut rng).unwrap();
        let mut a2 = a.clone();
        assert!(matches!(a2.sub_inplace(&op), Err(ChainError::KindMismatch { .. })));
        assert_eq!(a2, a);
    }

    #[test]
    fn scaling_keeps_center() {
        let mut rng = StdRng::seed_from_u64(45);
        let mut p = Chain::rand_state(6, 4, &GenOpts::default(), &mut rng).unwrap();
        p.canonize(3, None).unwrap();
        p.scale(c!(3.0));
        assert_eq!(p.count_canonized(), (3, 2));
        assert!((p.center_norm().unwrap() - 3.0).abs() < 1e-12);
        assert!((p.norm().unwrap() - 3.0).abs() < 1e-12);

        let mut q = Chain::rand_state(6, 4, &GenOpts::default(), &mut rng).unwrap();
        q.left_canonize(&Default::default(), None).unwrap();
        q.shift_orthogonality_center(5, 2, None).unwrap();
        q.compress_bond(4, &CompressOpts::max_bond(4)).unwrap();
        let form = q.form();
        q.scale(c!(0.0, 1.0));
        assert_eq!(q.form(), form);
    }

    #[test]
    fn add_then_compress() {
        let mut rng = StdRng::seed_from_u64(46);
        let p = Chain::rand_state(8, 5, &GenOpts::default(), &mut rng).unwrap();
        for form in [Form::Left, Form::Right, Form::Site(4)] {
            let mut q = p.clone();
            let opts = CompressOpts { form, ..CompressOpts::default() };
            q.add_and_compress(&p, &opts).unwrap();
            assert!(q.max_bond() <= 5);
            assert!((q.inner(&p).unwrap() - c!(2.0)).norm() < 1e-10);
        }
        let mut q = p.clone();
        let flat = CompressOpts { form: Form::Flat, ..CompressOpts::default() };
        assert!(matches!(
            q.add_and_compress(&p, &flat),
            Err(ChainError::InvalidForm(_))
        ));
        let far = CompressOpts { form: Form::Site(8), ..CompressOpts::default() };
        assert!(matches!(
            q.add_and_compress(&p, &far),
            Err(ChainError::SiteOutOfRange(8, 8))
        ));
        assert_eq!(q, p);
    }
}
