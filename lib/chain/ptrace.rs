//! Partial and full traces, and partial transposition.
//!
//! A partial trace keeps a subset of sites and contracts out the rest. Traced
//! sites of an operator have their upper and lower indices summed over; traced
//! sites of a state `|ψ⟩` are contracted against their conjugates, which
//! traces the density operator `|ψ⟩⟨ψ|` without ever forming it in full. In
//! both cases the traced tensors (now bond-only) are multiplied into the
//! nearest kept site, so the result is an operator chain over the kept sites
//! alone.

use rustc_hash::FxHashSet;
use num_complex::Complex64 as C64;
use tracing::debug;
use crate::tensor::Tensor;
use super::{
    CanonicalForm,
    Chain,
    ChainError,
    ChainResult,
    Kind,
    Naming,
    bond,
    check_template,
    fill,
};

/// Options for a partial trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartialTraceOpts {
    /// Template for the lower indices of the reduced operator.
    pub lower_ind_id: String,
    /// Relabel the kept sites `0..m` instead of keeping their original
    /// labels.
    pub rescale_sites: bool,
}

impl Default for PartialTraceOpts {
    fn default() -> Self {
        Self { lower_ind_id: "b{}".to_string(), rescale_sites: false }
    }
}

fn primed(idx: &str) -> String { format!("{idx}'") }

// fuse all indices shared by `left` and `right` into a single index `name`
fn fuse_shared(left: &mut Tensor, right: &mut Tensor, name: &str) -> ChainResult<()> {
    let others: Vec<String> =
        left.indices().iter()
        .filter(|idx| !right.has_index(idx))
        .cloned()
        .collect();
    let (mat, rows, shared) = left.to_matrix(&others)?;
    let dim: usize = shared.iter().map(|(_, d)| *d).product();
    let fused = (name.to_string(), dim);
    *left = Tensor::from_matrix(mat, &rows, &[fused.clone()])?;
    let shared: Vec<&String> = shared.iter().map(|(idx, _)| idx).collect();
    let (mat, _, cols) = right.to_matrix(&shared)?;
    *right = Tensor::from_matrix(mat, &[fused], &cols)?;
    Ok(())
}

impl Chain {
    /// Trace out every site not in `keep`, returning the reduced operator.
    ///
    /// For an operator, this sums over the upper and lower indices of each
    /// traced site. For a state `|ψ⟩`, this computes the reduced density
    /// operator of `|ψ⟩⟨ψ|`, whose bonds have squared dimension; keeping every
    /// site gives the full density operator.
    ///
    /// The reduced operator keeps the upper index template of `self` and uses
    /// `opts.lower_ind_id` for its lower indices. Kept sites retain their
    /// labels unless `opts.rescale_sites` is set, in which case they are
    /// relabeled `0..m` in order. The result is
    /// [`CanonicalForm::Uncanonical`].
    ///
    /// Fails if `keep` is empty or contains an out-of-range site.
    pub fn partial_trace(&self, keep: &[usize], opts: &PartialTraceOpts)
        -> ChainResult<Self>
    {
        let n = self.len();
        if keep.is_empty() {
            return Err(ChainError::InvalidKeep("no sites to keep".to_string()));
        }
        if let Some(bad) = keep.iter().find(|k| **k >= n) {
            return Err(ChainError::InvalidKeep(
                format!("site {bad} out of range for chain of length {n}")));
        }
        check_template(&opts.lower_ind_id)?;
        let naming = Naming {
            lower_ind_id: opts.lower_ind_id.clone(),
            ..self.naming.clone()
        };
        naming.validate()?;
        let keep: FxHashSet<usize> = keep.iter().copied().collect();
        let kept: Vec<usize> = (0..n).filter(|i| keep.contains(i)).collect();
        let labels: Vec<usize> =
            if opts.rescale_sites {
                (0..kept.len()).collect()
            } else {
                kept.iter().map(|i| self.labels[*i]).collect()
            };
        debug!(n, kept = ?kept, rescale = opts.rescale_sites, "partial trace");

        // one tensor per original site, with physical indices either traced
        // out or renamed for the reduced operator
        let mut new_label = labels.iter();
        let mut locals: Vec<Tensor> = Vec::with_capacity(n);
        for i in 0..n {
            let upper = self.upper_ind(i);
            let target = keep.contains(&i).then(|| new_label.next()).flatten();
            let local =
                match (self.kind, target) {
                    (Kind::Operator, None) => {
                        let lower = self.lower_ind(i).unwrap_or_default();
                        self.sites[i].trace_pair(&upper, &lower)?
                    },
                    (Kind::Operator, Some(l)) => {
                        let lower = self.lower_ind(i).unwrap_or_default();
                        let (new_u, new_l) =
                            (fill(&naming.upper_ind_id, *l), fill(&naming.lower_ind_id, *l));
                        let mut t = self.sites[i].clone();
                        t.map_indices(|idx| {
                            if idx == upper {
                                Some(new_u.clone())
                            } else if idx == lower {
                                Some(new_l.clone())
                            } else {
                                None
                            }
                        })?;
                        t
                    },
                    (Kind::State, target) => {
                        let mut bra = self.sites[i].conj();
                        bra.map_indices(|idx| (idx != upper).then(|| primed(idx)))?;
                        let mut ket = self.sites[i].clone();
                        if let Some(l) = target {
                            bra.reindex(&upper, &fill(&naming.lower_ind_id, *l))?;
                            ket.reindex(&upper, &fill(&naming.upper_ind_id, *l))?;
                        }
                        ket.contract(&bra)?
                    },
                };
            locals.push(local);
        }

        // absorb each run of traced sites into the next kept site, or the
        // last one for a trailing run
        let m = kept.len();
        let mut groups: Vec<Tensor> = Vec::with_capacity(m);
        let mut locals = locals.into_iter();
        for (p, k) in kept.iter().enumerate() {
            let end = if p + 1 == m { n - 1 } else { *k };
            let start = if p == 0 { 0 } else { kept[p - 1] + 1 };
            let mut acc: Option<Tensor> = None;
            for t in locals.by_ref().take(end + 1 - start) {
                acc = Some(match acc {
                    None => t,
                    Some(a) => a.contract(&t)?,
                });
            }
            if let Some(acc) = acc { groups.push(acc); }
        }
        for p in 0..m.saturating_sub(1) {
            let (head, tail) = groups.split_at_mut(p + 1);
            fuse_shared(&mut head[p], &mut tail[0], &bond(p))?;
        }

        let mut reduced = Self {
            sites: groups,
            kind: Kind::Operator,
            naming,
            labels,
            dtype: self.dtype,
            form: CanonicalForm::Uncanonical,
        };
        for p in 0..m { reduced.fix_layout(p)?; }
        reduced.settle();
        Ok(reduced)
    }

    /// Return the full trace of an operator.
    pub fn trace(&self) -> ChainResult<C64> {
        self.check_kind(Kind::Operator)?;
        let mut acc: Option<Tensor> = None;
        for i in 0..self.len() {
            let lower = self.lower_ind(i).unwrap_or_default();
            let t = self.sites[i].trace_pair(&self.upper_ind(i), &lower)?;
            acc = Some(match acc {
                None => t,
                Some(a) => a.contract(&t)?,
            });
        }
        Ok(acc.and_then(|t| t.as_scalar()).unwrap_or_default())
    }

    /// Transpose the physical indices of an operator at the given sites in
    /// place, exchanging the roles of their upper and lower indices.
    ///
    /// Index names continue to follow the naming templates. Repeated sites
    /// are transposed once.
    pub fn partial_transpose(&mut self, sites: &[usize]) -> ChainResult<()> {
        self.check_kind(Kind::Operator)?;
        sites.iter().try_for_each(|i| self.check_site(*i))?;
        let sites: FxHashSet<usize> = sites.iter().copied().collect();
        for i in sites.into_iter() {
            let upper = self.upper_ind(i);
            let lower = self.lower_ind(i).unwrap_or_default();
            self.sites[i].swap_roles(&upper, &lower)?;
        }
        self.form = CanonicalForm::Uncanonical;
        Ok(())
    }

    /// Return a copy of `self` partially transposed at the given sites.
    pub fn partial_transposed(&self, sites: &[usize]) -> ChainResult<Self> {
        let mut new = self.clone();
        new.partial_transpose(sites)?;
        Ok(new)
    }
}

#[cfg(test)]
mod tests {
    use ndarray as nd;
    use rand::{ SeedableRng, rngs::StdRng };
    use crate::{ c, chain::GenOpts, linalg };
    use super::*;

    fn adjoint_diff(m: &nd::Array2<C64>) -> f64 {
        (m - &m.t().mapv(|z| z.conj())).iter().map(|z| z.norm()).fold(0.0, f64::max)
    }

    // reduced density matrix of a dense state, with kept lower indices renamed
    // by `lower`
    fn dense_reduced(psi: &Chain, keep: &[usize], lower: &str) -> Tensor {
        let ket = psi.to_dense().unwrap();
        let mut bra = ket.conj();
        for k in keep {
            bra.reindex(&psi.upper_ind(*k), &fill(lower, *k)).unwrap();
        }
        ket.contract(&bra).unwrap()
    }

    #[test]
    fn reduced_state_matches_dense() {
        let mut rng = StdRng::seed_from_u64(50);
        let psi = Chain::rand_state(10, 4, &GenOpts::default(), &mut rng).unwrap();
        let keep = [2, 3, 4, 6, 8];
        let opts = PartialTraceOpts { lower_ind_id: "u{}".to_string(), ..Default::default() };
        let rho = psi.partial_trace(&keep, &opts).unwrap();
        assert_eq!(rho.kind(), Kind::Operator);
        assert_eq!(rho.len(), 5);
        assert_eq!(rho.upper_inds(), ["k2", "k3", "k4", "k6", "k8"]);
        assert_eq!(rho.lower_inds(), ["u2", "u3", "u4", "u6", "u8"]);
        assert_eq!(rho.form(), CanonicalForm::Uncanonical);
        assert!(rho.bond_dims().iter().all(|d| *d <= 16));

        assert!((rho.trace().unwrap() - c!(1.0)).norm() < 1e-12);
        let mat = rho.to_dense_matrix().unwrap();
        assert_eq!(mat.dim(), (32, 32));
        assert!(adjoint_diff(&mat) < 1e-12);
        let expected = dense_reduced(&psi, &keep, "u{}");
        assert!(rho.to_dense().unwrap().approx_eq(&expected, Some(1e-12)));

        let opts = PartialTraceOpts { rescale_sites: true, ..opts };
        let rho = psi.partial_trace(&keep, &opts).unwrap();
        assert_eq!(rho.upper_inds(), ["k0", "k1", "k2", "k3", "k4"]);
        assert_eq!(rho.lower_inds(), ["u0", "u1", "u2", "u3", "u4"]);
        assert_eq!(rho.site_tags(), ["I0", "I1", "I2", "I3", "I4"]);
        let mut dense = rho.to_dense().unwrap();
        dense.map_indices(|idx| {
            let (head, num) = idx.split_at(1);
            let p: usize = num.parse().ok()?;
            Some(format!("{head}{}", keep[p]))
        }).unwrap();
        assert!(dense.approx_eq(&expected, Some(1e-12)));
    }

    #[test]
    fn operator_and_state_paths_agree() {
        let mut rng = StdRng::seed_from_u64(51);
        let psi = Chain::rand_state(6, 3, &GenOpts::default(), &mut rng).unwrap();
        let everything: Vec<usize> = (0..6).collect();
        let full = psi.partial_trace(&everything, &Default::default()).unwrap();
        assert_eq!(full.bond_dims(), vec![9; 5]);
        assert!((full.trace().unwrap() - c!(1.0)).norm() < 1e-12);

        let keep = [0, 5];
        let a = full.partial_trace(&keep, &Default::default()).unwrap();
        let b = psi.partial_trace(&keep, &Default::default()).unwrap();
        assert!(a.to_dense().unwrap().approx_eq(&b.to_dense().unwrap(), Some(1e-12)));
        // traced sites at both ends are carried into the kept ones
        let mid = psi.partial_trace(&[3], &Default::default()).unwrap();
        assert_eq!(mid.len(), 1);
        assert_eq!(mid.site(0).unwrap().shape(), &[2, 2]);
        assert!((mid.trace().unwrap() - c!(1.0)).norm() < 1e-12);
    }

    #[test]
    fn operator_partial_trace() {
        let mut rng = StdRng::seed_from_u64(52);
        let opts = GenOpts { phys_dim: 3, ..GenOpts::default() };
        let op = Chain::rand_herm_operator(5, 2, &opts, &mut rng).unwrap();
        let keep = [1, 3];
        let red = op.partial_trace(&keep, &Default::default()).unwrap();
        assert!((red.trace().unwrap() - op.trace().unwrap()).norm() < 1e-12);
        assert!(adjoint_diff(&red.to_dense_matrix().unwrap()) < 1e-12);

        let mut expected = op.to_dense().unwrap();
        for i in [0, 2, 4] {
            expected = expected
                .trace_pair(&op.upper_ind(i), &op.lower_ind(i).unwrap())
                .unwrap();
        }
        assert!(red.to_dense().unwrap().approx_eq(&expected, Some(1e-12)));
    }

    #[test]
    fn invalid_keep() {
        let mut rng = StdRng::seed_from_u64(53);
        let psi = Chain::rand_state(4, 2, &GenOpts::default(), &mut rng).unwrap();
        let opts = PartialTraceOpts::default();
        assert!(matches!(psi.partial_trace(&[], &opts), Err(ChainError::InvalidKeep(_))));
        assert!(matches!(psi.partial_trace(&[1, 4], &opts), Err(ChainError::InvalidKeep(_))));
        let clash = PartialTraceOpts { lower_ind_id: "k{}".to_string(), ..opts };
        assert!(matches!(
            psi.partial_trace(&[1], &clash),
            Err(ChainError::InvalidTemplate(_))
        ));
        assert!(matches!(psi.trace(), Err(ChainError::KindMismatch { .. })));
        let mut psi2 = psi.clone();
        assert!(matches!(
            psi2.partial_transpose(&[0]),
            Err(ChainError::KindMismatch { .. })
        ));
    }

    #[test]
    fn partial_transpose_breaks_positivity() {
        let mut rng = StdRng::seed_from_u64(54);
        let psi = Chain::rand_state(8, 10, &GenOpts::default(), &mut rng).unwrap();
        let keep: Vec<usize> = (2..8).collect();
        let rho = psi.partial_trace(&keep, &Default::default()).unwrap();
        let m = rho.to_dense_matrix().unwrap();
        assert!(adjoint_diff(&m) < 1e-12);
        let (evals, _) = linalg::eigh(&m).unwrap();
        assert!(evals.iter().all(|e| *e > -1e-12));

        let pt = rho.partial_transposed(&[0, 1, 2]).unwrap();
        let mt = pt.to_dense_matrix().unwrap();
        assert!(adjoint_diff(&mt) < 1e-12);
        let (evals, _) = linalg::eigh(&mt).unwrap();
        assert!(evals[0] < -1e-6);

        let mut op = rho.clone();
        assert!(matches!(
            op.partial_transpose(&[6]),
            Err(ChainError::SiteOutOfRange(6, 6))
        ));
        assert_eq!(op, rho);
        // transposing twice restores the original
        op.partial_transpose(&[1, 4]).unwrap();
        op.partial_transpose(&[4, 1, 1]).unwrap();
        assert!(op.to_dense().unwrap().approx_eq(&rho.to_dense().unwrap(), None));
    }
}
