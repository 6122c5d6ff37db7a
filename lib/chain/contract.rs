//! Full contractions: overlaps, norms, and dense reconstruction.

use ndarray as nd;
use num_complex::Complex64 as C64;
use crate::tensor::Tensor;
use super::{ Chain, ChainResult, bond };

impl Chain {
    /// Compute the overlap `Σ conj(self) · other` over all physical indices.
    ///
    /// For states this is `⟨self|other⟩`; for operators it is the
    /// Hilbert-Schmidt inner product `Tr(self† other)`. Both chains must have
    /// the same kind, length, and physical indices.
    pub fn inner(&self, other: &Self) -> ChainResult<C64> {
        self.check_compatible(other)?;
        let n = self.len();
        let primed = |i: usize| format!("{}'", bond(i));
        let mut bra: Vec<Tensor> = self.sites.iter().map(Tensor::conj).collect();
        for (i, t) in bra.iter_mut().enumerate() {
            if i > 0 { t.reindex(&bond(i - 1), &primed(i - 1))?; }
            if i + 1 < n { t.reindex(&bond(i), &primed(i))?; }
        }
        // sweep left to right, keeping the environment rank-2
        let mut env = bra[0].contract(&other.sites[0])?;
        for (b, k) in bra.iter().zip(&other.sites).skip(1) {
            env = env.contract(b)?.contract(k)?;
        }
        Ok(env.as_scalar().unwrap_or_default())
    }

    /// Return the squared norm `⟨self|self⟩`.
    pub fn norm_squared(&self) -> ChainResult<f64> {
        Ok(self.inner(self)?.re)
    }

    /// Return the norm of `self` (the Frobenius norm for operators).
    pub fn norm(&self) -> ChainResult<f64> {
        Ok(self.norm_squared()?.max(0.0).sqrt())
    }

    /// If `self` has an orthogonality center, return the norm of the tensor
    /// there, which equals the norm of the whole chain.
    pub fn center_norm(&self) -> Option<f64> {
        self.form.center(self.len()).map(|c| self.sites[c].norm())
    }

    /// Contract every bond, returning a single tensor whose indices are all
    /// upper indices followed by all lower indices, each in site order.
    ///
    /// The result has `d^n` (or `d^2n`) elements.
    pub fn to_dense(&self) -> ChainResult<Tensor> {
        let mut acc = self.sites[0].clone();
        for site in self.sites.iter().skip(1) {
            acc = acc.contract(site)?;
        }
        let order: Vec<String> =
            self.upper_inds().into_iter()
            .chain(self.lower_inds())
            .collect();
        acc.transpose_to(&order)?;
        Ok(acc)
    }

    /// Contract `self` to a dense matrix whose rows range over the upper
    /// indices and columns over the lower indices.
    ///
    /// A state gives a single column.
    pub fn to_dense_matrix(&self) -> ChainResult<nd::Array2<C64>> {
        let dense = self.to_dense()?;
        let (mat, _, _) = dense.to_matrix(&self.upper_inds())?;
        Ok(mat)
    }
}
