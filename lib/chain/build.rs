//! Construction of chains from raw arrays and random or deterministic
//! generators.

use ndarray::{ self as nd, Dimension };
use num_complex::Complex64 as C64;
use rand::Rng;
use rand_distr::{ StandardNormal, Uniform };
use tracing::debug;
use crate::{
    c,
    dtype::DType,
    tensor::Tensor,
};
use super::{
    CanonicalForm,
    Chain,
    ChainError,
    ChainResult,
    Kind,
    Naming,
    bond,
};

/// Distribution of randomly generated elements.
///
/// For complex dtypes, real and imaginary parts are drawn independently.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Dist {
    /// Standard normal distribution.
    #[default]
    Normal,
    /// Uniform distribution over `[-1, 1)`.
    Uniform,
}

/// Options for chain generators.
#[derive(Clone, Debug, PartialEq)]
pub struct GenOpts {
    /// Dimension of every physical index.
    pub phys_dim: usize,
    pub dtype: DType,
    pub dist: Dist,
    /// Rescale the result to unit norm (Frobenius norm for operators).
    pub normalize: bool,
    pub naming: Naming,
}

impl Default for GenOpts {
    fn default() -> Self {
        Self {
            phys_dim: 2,
            dtype: DType::Complex128,
            dist: Dist::Normal,
            normalize: true,
            naming: Naming::default(),
        }
    }
}

fn sample<R>(rng: &mut R, dist: Dist, dtype: DType) -> C64
where R: Rng + ?Sized
{
    let mut draw = || -> f64 {
        match dist {
            Dist::Normal => rng.sample(StandardNormal),
            Dist::Uniform => rng.sample(Uniform::new(-1.0, 1.0)),
        }
    };
    let re = draw();
    let im = if dtype.is_complex() { draw() } else { 0.0 };
    dtype.coerce(c!(re, im))
}

// shape of site `i` in a chain of `n` sites with uniform bond dimension
fn site_shape(i: usize, n: usize, bond_dim: usize, phys: &[usize]) -> Vec<usize> {
    let mut shape: Vec<usize> = Vec::with_capacity(4);
    if i > 0 { shape.push(bond_dim); }
    if i + 1 < n { shape.push(bond_dim); }
    shape.extend_from_slice(phys);
    shape
}

impl Chain {
    /// Build a chain from one array per site.
    ///
    /// Arrays must follow the site layout `[left bond?, right bond?, upper,
    /// lower?]`. The dtype is inferred as [`DType::Float64`] if every element is
    /// real and [`DType::Complex128`] otherwise; use [`Self::with_dtype`] to
    /// choose a different one. The result is [`CanonicalForm::Uncanonical`].
    pub fn from_arrays<I>(kind: Kind, arrays: I, naming: Naming)
        -> ChainResult<Self>
    where I: IntoIterator<Item = nd::ArrayD<C64>>
    {
        naming.validate()?;
        let arrays: Vec<nd::ArrayD<C64>> = arrays.into_iter().collect();
        let n = arrays.len();
        if n == 0 { return Err(ChainError::EmptyChain); }
        for (i, arr) in arrays.iter().enumerate() {
            let expected =
                kind.num_phys() + usize::from(i > 0) + usize::from(i + 1 < n);
            if arr.ndim() != expected {
                return Err(ChainError::SiteRank {
                    site: i,
                    expected,
                    found: arr.ndim(),
                });
            }
        }
        for i in 0..n.saturating_sub(1) {
            // right bond of site i is axis 1 except at the first site
            let r = arrays[i].shape()[usize::from(i > 0)];
            let l = arrays[i + 1].shape()[0];
            if r != l {
                return Err(ChainError::BondMismatch(i, i + 1, r, l));
            }
        }
        let dtype =
            if arrays.iter().flat_map(|a| a.iter()).all(|z| z.im == 0.0) {
                DType::Float64
            } else {
                DType::Complex128
            };
        let mut chain = Self {
            sites: Vec::with_capacity(n),
            kind,
            naming,
            labels: (0..n).collect(),
            dtype,
            form: CanonicalForm::Uncanonical,
        };
        let layouts: Vec<Vec<String>> = (0..n).map(|i| chain.layout(i)).collect();
        for (arr, layout) in arrays.into_iter().zip(layouts) {
            chain.sites.push(Tensor::new(layout, arr)?);
        }
        Ok(chain)
    }

    /// Build a state from one array per site.
    pub fn new_state<I>(arrays: I) -> ChainResult<Self>
    where I: IntoIterator<Item = nd::ArrayD<C64>>
    {
        Self::from_arrays(Kind::State, arrays, Naming::default())
    }

    /// Build an operator from one array per site.
    pub fn new_operator<I>(arrays: I) -> ChainResult<Self>
    where I: IntoIterator<Item = nd::ArrayD<C64>>
    {
        Self::from_arrays(Kind::Operator, arrays, Naming::default())
    }

    /// Change the nominal dtype of `self`, rounding stored data to match.
    ///
    /// Fails if `self` holds complex data and `dtype` is real.
    pub fn with_dtype(mut self, dtype: DType) -> ChainResult<Self> {
        for (i, site) in self.sites.iter().enumerate() {
            if !site.data().iter().all(|z| dtype.admits(*z)) {
                return Err(ChainError::DTypeMismatch(dtype, i));
            }
        }
        self.dtype = dtype;
        self.sites.iter_mut().for_each(|t| t.map_inplace(|z| dtype.coerce(z)));
        Ok(self)
    }

    // build a chain with uniform bond dimension, filling each site array from
    // `f(site, multi-index)`
    fn generate<F>(
        kind: Kind,
        n: usize,
        bond_dim: usize,
        opts: &GenOpts,
        mut f: F,
    ) -> ChainResult<Self>
    where F: FnMut(usize, &[usize]) -> C64
    {
        if n == 0 { return Err(ChainError::EmptyChain); }
        opts.naming.validate()?;
        let phys: Vec<usize> = vec![opts.phys_dim; kind.num_phys()];
        let mut chain = Self {
            sites: Vec::with_capacity(n),
            kind,
            naming: opts.naming.clone(),
            labels: (0..n).collect(),
            dtype: opts.dtype,
            form: CanonicalForm::Uncanonical,
        };
        for i in 0..n {
            let shape = site_shape(i, n, bond_dim, &phys);
            let data: nd::ArrayD<C64> =
                nd::ArrayD::from_shape_fn(shape, |idx| f(i, idx.slice()));
            let layout = chain.layout(i);
            chain.sites.push(Tensor::new(layout, data)?);
        }
        Ok(chain)
    }

    // divide every site by the n-th root of the total norm
    fn normalize_evenly(&mut self) -> ChainResult<()> {
        let norm = self.norm()?;
        if norm > 0.0 {
            let per_site = norm.powf(-1.0 / self.len() as f64);
            self.sites.iter_mut()
                .for_each(|t| t.scalar_mul_inplace(c!(per_site)));
            self.settle();
        }
        Ok(())
    }

    /// Generate a random state of `n` sites with every bond of dimension
    /// `bond_dim`.
    pub fn rand_state<R>(n: usize, bond_dim: usize, opts: &GenOpts, rng: &mut R)
        -> ChainResult<Self>
    where R: Rng + ?Sized
    {
        debug!(n, bond_dim, dtype = %opts.dtype, "random state");
        let mut chain =
            Self::generate(Kind::State, n, bond_dim, opts, |_, _| {
                sample(&mut *rng, opts.dist, opts.dtype)
            })?;
        if opts.normalize { chain.normalize_evenly()?; }
        Ok(chain)
    }

    /// Generate a random operator of `n` sites with every bond of dimension
    /// `bond_dim`.
    pub fn rand_operator<R>(n: usize, bond_dim: usize, opts: &GenOpts, rng: &mut R)
        -> ChainResult<Self>
    where R: Rng + ?Sized
    {
        debug!(n, bond_dim, dtype = %opts.dtype, "random operator");
        let mut chain =
            Self::generate(Kind::Operator, n, bond_dim, opts, |_, _| {
                sample(&mut *rng, opts.dist, opts.dtype)
            })?;
        if opts.normalize { chain.normalize_evenly()?; }
        Ok(chain)
    }

    /// Generate a random Hermitian operator.
    ///
    /// Each site is made Hermitian in its physical indices for every fixed
    /// value of its bonds, which makes the whole operator Hermitian.
    pub fn rand_herm_operator<R>(
        n: usize,
        bond_dim: usize,
        opts: &GenOpts,
        rng: &mut R,
    ) -> ChainResult<Self>
    where R: Rng + ?Sized
    {
        let unnormalized = GenOpts { normalize: false, ..opts.clone() };
        let mut chain = Self::rand_operator(n, bond_dim, &unnormalized, rng)?;
        for i in 0..n {
            let upper = chain.upper_ind(i);
            let lower = chain.lower_ind(i).unwrap_or_default();
            let site = &mut chain.sites[i];
            let mut adj = site.conj();
            adj.swap_roles(&upper, &lower)?;
            site.map_inplace(|z| z * 0.5);
            adj.map_inplace(|z| z * 0.5);
            let sum = site.data() + adj.data();
            site.data_mut().assign(&sum);
        }
        chain.settle();
        if opts.normalize { chain.normalize_evenly()?; }
        Ok(chain)
    }

    /// Generate the identity operator on `n` sites of dimension
    /// `opts.phys_dim`, with all bonds of dimension 1.
    pub fn identity_operator(n: usize, opts: &GenOpts) -> ChainResult<Self> {
        Self::generate(Kind::Operator, n, 1, opts, |_, idx| {
            let k = idx.len();
            if idx[k - 2] == idx[k - 1] { c!(1.0) } else { c!(0.0) }
        })
    }

    /// Generate the identity operator on the same physical space as `self`,
    /// with the same naming, labels and dtype.
    pub fn identity_like(&self) -> ChainResult<Self> {
        let n = self.len();
        let naming = self.naming.clone();
        let mut sites: Vec<Tensor> = Vec::with_capacity(n);
        for i in 0..n {
            let d = self.phys_dim(i)?;
            let shape = site_shape(i, n, 1, &[d, d]);
            let data: nd::ArrayD<C64> =
                nd::ArrayD::from_shape_fn(shape, |idx| {
                    let k = idx.ndim();
                    if idx[k - 2] == idx[k - 1] { c!(1.0) } else { c!(0.0) }
                });
            let mut layout: Vec<String> = Vec::with_capacity(4);
            if i > 0 { layout.push(bond(i - 1)); }
            if i + 1 < n { layout.push(bond(i)); }
            layout.push(super::fill(&naming.upper_ind_id, self.labels[i]));
            layout.push(super::fill(&naming.lower_ind_id, self.labels[i]));
            sites.push(Tensor::new(layout, data)?);
        }
        Ok(Self {
            sites,
            kind: Kind::Operator,
            naming,
            labels: self.labels.clone(),
            dtype: self.dtype,
            form: CanonicalForm::Uncanonical,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{ SeedableRng, rngs::StdRng };

    fn randn(rng: &mut StdRng, shape: &[usize]) -> nd::ArrayD<C64> {
        nd::ArrayD::from_shape_fn(shape, |_| {
            sample(rng, Dist::Normal, DType::Float64)
        })
    }

    #[test]
    fn state_from_arrays() {
        let mut rng = StdRng::seed_from_u64(0);
        let arrays: Vec<nd::ArrayD<C64>> =
            [vec![5, 2], vec![5, 5, 2], vec![5, 5, 2], vec![5, 5, 2], vec![5, 2]]
            .iter()
            .map(|s| randn(&mut rng, s))
            .collect();
        let mps = Chain::new_state(arrays).unwrap();
        assert_eq!(mps.len(), 5);
        assert_eq!(mps.kind(), Kind::State);
        assert_eq!(mps.dtype(), DType::Float64);
        assert_eq!(mps.bond_dims(), vec![5, 5, 5, 5]);
        assert_eq!(mps.upper_inds(), ["k0", "k1", "k2", "k3", "k4"]);
        assert_eq!(mps.form(), CanonicalForm::Uncanonical);
        assert!(mps.lower_inds().is_empty());
    }

    #[test]
    fn operator_from_arrays() {
        let mut rng = StdRng::seed_from_u64(1);
        let arrays: Vec<nd::ArrayD<C64>> =
            [vec![5, 2, 2], vec![5, 5, 2, 2], vec![5, 2, 2]]
            .iter()
            .map(|s| randn(&mut rng, s))
            .collect();
        let mpo = Chain::new_operator(arrays).unwrap();
        assert_eq!(mpo.upper_inds(), ["k0", "k1", "k2"]);
        assert_eq!(mpo.lower_inds(), ["b0", "b1", "b2"]);
        assert_eq!(mpo.site_tags(), ["I0", "I1", "I2"]);
    }

    #[test]
    fn single_site_chain() {
        let arr = nd::array![c!(1.0), c!(0.0, 1.0)].into_dyn();
        let mps = Chain::new_state([arr]).unwrap();
        assert_eq!(mps.len(), 1);
        assert_eq!(mps.dtype(), DType::Complex128);
        assert!(mps.bond_dims().is_empty());
        assert_eq!(mps.max_bond(), 1);
    }

    #[test]
    fn construction_errors() {
        assert!(matches!(
            Chain::new_state(Vec::<nd::ArrayD<C64>>::new()),
            Err(ChainError::EmptyChain)
        ));
        let bad_rank = vec![
            nd::ArrayD::zeros(vec![3, 2]),
            nd::ArrayD::zeros(vec![3, 2]),
            nd::ArrayD::zeros(vec![3, 2]),
        ];
        assert!(matches!(
            Chain::new_state(bad_rank),
            Err(ChainError::SiteRank { site: 1, expected: 3, found: 2 })
        ));
        let bad_bond = vec![
            nd::ArrayD::zeros(vec![3, 2]),
            nd::ArrayD::zeros(vec![4, 2]),
        ];
        assert!(matches!(
            Chain::new_state(bad_bond),
            Err(ChainError::BondMismatch(0, 1, 3, 4))
        ));
        let complex = vec![nd::array![c!(0.0, 1.0), c!(1.0)].into_dyn()];
        let mps = Chain::new_state(complex).unwrap();
        assert!(matches!(
            mps.with_dtype(DType::Float64),
            Err(ChainError::DTypeMismatch(DType::Float64, 0))
        ));
    }

    #[test]
    fn rand_state_dtypes() {
        let mut rng = StdRng::seed_from_u64(2);
        for name in ["float", "complex", "complex128", "float64", "float32"] {
            let dtype: DType = name.parse().unwrap();
            let opts = GenOpts { dtype, ..GenOpts::default() };
            let p = Chain::rand_state(10, 7, &opts, &mut rng).unwrap();
            assert_eq!(p.dtype(), dtype);
            if dtype.is_real() {
                assert!(p.site(7).unwrap().data().iter().all(|z| z.im == 0.0));
            }
            assert!((p.norm().unwrap() - 1.0).abs() < 1e-5);
        }
        assert!("raise".parse::<DType>().is_err());
    }

    #[test]
    fn rand_herm_is_hermitian() {
        let mut rng = StdRng::seed_from_u64(3);
        let opts = GenOpts { phys_dim: 3, dist: Dist::Uniform, ..GenOpts::default() };
        let op = Chain::rand_herm_operator(4, 3, &opts, &mut rng).unwrap();
        assert!((op.norm().unwrap() - 1.0).abs() < 1e-12);
        let m = op.to_dense_matrix().unwrap();
        let diff = (&m - &m.t().mapv(|z| z.conj()))
            .iter()
            .map(|z| z.norm())
            .fold(0.0, f64::max);
        assert!(diff < 1e-12);
        let tr = op.trace().unwrap();
        assert!(tr.norm() > 0.0);
        assert!(tr.im.abs() < 1e-12);
    }

    #[test]
    fn identities() {
        let opts = GenOpts { phys_dim: 3, dtype: DType::Float64, ..GenOpts::default() };
        let id = Chain::identity_operator(6, &opts).unwrap();
        assert_eq!(id.bond_dims(), vec![1; 5]);
        assert!((id.trace().unwrap() - c!(729.0)).norm() < 1e-9);

        let mut rng = StdRng::seed_from_u64(4);
        let mut opts = GenOpts { phys_dim: 3, ..GenOpts::default() };
        opts.naming.upper_ind_id = "foo{}".to_string();
        let op = Chain::rand_herm_operator(5, 2, &opts, &mut rng).unwrap();
        let like = op.identity_like().unwrap();
        assert_eq!(like.upper_inds(), op.upper_inds());
        assert!((like.trace().unwrap() - c!(243.0)).norm() < 1e-9);
    }
}
