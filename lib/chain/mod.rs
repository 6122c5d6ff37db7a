//! Matrix product states and operators.
//!
//! A [`Chain`] is an ordered sequence of [`Tensor`]s in which each site is
//! connected to its neighbors by a single bond index and exposes one (for a
//! state) or two (for an operator) physical indices. Physical indices and site
//! tags are named from templates containing a `{}` placeholder, which is
//! replaced by the site's label.
//!
//! Site tensors are always stored with axes ordered as
//! ```text
//! [left bond?, right bond?, upper, lower?]
//! ```
//! where the left bond is absent at the first site, the right bond is absent
//! at the last, and the lower index is present only for operators. This is
//! also the layout expected by [`Chain::from_arrays`].
//!
//! Alongside its tensors, each chain carries a [`CanonicalForm`] describing
//! which of its sites are known to be isometries. Gauge transforms and
//! compressions keep this descriptor current; all other mutations reset it.

use itertools::Itertools;
use ndarray as nd;
use num_complex::Complex64 as C64;
use thiserror::Error;
use crate::{
    dtype::{ DType, DTypeError },
    linalg::LinalgError,
    tensor::{ Tensor, TensorError },
};

#[derive(Debug, Error)]
pub enum ChainError {
    /// Returned when attempting to build a chain with no sites.
    #[error("a chain must have at least one site")]
    EmptyChain,

    /// Returned when a site array does not have the rank implied by its
    /// position and the chain kind.
    #[error("site {site}: expected an array of rank {expected}, got rank {found}")]
    SiteRank { site: usize, expected: usize, found: usize },

    /// Returned when adjacent site arrays disagree on the size of their shared
    /// bond.
    #[error("bond between sites {0} and {1} has mismatched dimensions {2} and {3}")]
    BondMismatch(usize, usize, usize, usize),

    /// Returned when a site index is out of bounds.
    #[error("site {0} out of range for chain of length {1}")]
    SiteOutOfRange(usize, usize),

    /// Returned when a single-site gauge step is asked to push its remainder
    /// past the end of the chain.
    #[error("site {0} has no neighbor {1} to absorb its remainder")]
    NoNeighbor(usize, &'static str),

    /// Returned when a compression target form is unrecognized or not
    /// applicable.
    #[error("invalid form {0:?}: expected 'left', 'right', 'flat', or a site index")]
    InvalidForm(String),

    /// Returned when two chains that must have equal lengths don't.
    #[error("chain lengths {0} and {1} do not match")]
    LengthMismatch(usize, usize),

    /// Returned when two chains differ in physical dimension or index naming
    /// at a site.
    #[error("physical indices do not match at site {0}")]
    PhysicalMismatch(usize),

    /// Returned when an operation requires a chain of a different kind.
    #[error("expected {expected:?} chain, got {found:?}")]
    KindMismatch { expected: Kind, found: Kind },

    /// Returned when the set of sites to keep in a partial trace is invalid.
    #[error("invalid sites to keep: {0}")]
    InvalidKeep(String),

    /// Returned when a naming template has no `{}` placeholder or would make
    /// two indices of a site coincide.
    #[error("invalid naming template {0:?}")]
    InvalidTemplate(String),

    /// Returned when array data cannot be represented in a requested dtype.
    #[error("site {1}: data is not representable as {0}")]
    DTypeMismatch(DType, usize),

    /// Returned when an operation requires a site to be a valid orthogonality
    /// center and it isn't.
    #[error("site {0} is not an orthogonality center")]
    NotOrthogonalityCenter(usize),

    /// Returned when a paired bra chain does not match the shape of its ket.
    #[error("paired chain does not match at site {0}")]
    BraMismatch(usize),

    #[error("dtype error: {0}")]
    DTypeError(#[from] DTypeError),

    #[error("tensor error: {0}")]
    TensorError(#[from] TensorError),

    #[error("linear algebra error: {0}")]
    LinalgError(#[from] LinalgError),

    #[error("shape error: {0}")]
    ShapeError(#[from] nd::ShapeError),
}
pub type ChainResult<T> = Result<T, ChainError>;

pub mod form;
pub use form::CanonicalForm;

pub(crate) mod build;
pub use build::{ Dist, GenOpts };

pub(crate) mod contract;

pub(crate) mod canonize;
pub use canonize::SweepOpts;

pub(crate) mod compress;
pub use compress::{ CompressOpts, Form };

pub(crate) mod arith;

pub(crate) mod ptrace;
pub use ptrace::PartialTraceOpts;

/// Whether a chain represents a state (one physical index per site) or an
/// operator (two).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    State,
    Operator,
}

impl Kind {
    /// Return the number of physical indices per site.
    pub fn num_phys(self) -> usize {
        match self {
            Self::State => 1,
            Self::Operator => 2,
        }
    }
}

/// Naming templates for physical indices and site tags.
///
/// Each template must contain a `{}`, which is replaced by a site's label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Naming {
    /// Template for the upper (ket) physical index.
    pub upper_ind_id: String,
    /// Template for the lower (bra) physical index of operators.
    pub lower_ind_id: String,
    /// Template for site tags.
    pub site_tag_id: String,
}

impl Default for Naming {
    fn default() -> Self {
        Self {
            upper_ind_id: "k{}".to_string(),
            lower_ind_id: "b{}".to_string(),
            site_tag_id: "I{}".to_string(),
        }
    }
}

impl Naming {
    fn validate(&self) -> ChainResult<()> {
        check_template(&self.upper_ind_id)?;
        check_template(&self.lower_ind_id)?;
        check_template(&self.site_tag_id)?;
        if self.upper_ind_id == self.lower_ind_id {
            return Err(ChainError::InvalidTemplate(self.lower_ind_id.clone()));
        }
        Ok(())
    }
}

fn check_template(template: &str) -> ChainResult<()> {
    if template.contains("{}") {
        Ok(())
    } else {
        Err(ChainError::InvalidTemplate(template.to_string()))
    }
}

pub(crate) fn fill(template: &str, label: usize) -> String {
    template.replacen("{}", &label.to_string(), 1)
}

/// Name of the bond between sites `i` and `i + 1`.
pub(crate) fn bond(i: usize) -> String { format!("_bond{i}") }

/// A matrix product state or operator.
#[derive(Clone, Debug, PartialEq)]
pub struct Chain {
    pub(crate) sites: Vec<Tensor>,
    pub(crate) kind: Kind,
    pub(crate) naming: Naming,
    pub(crate) labels: Vec<usize>,
    pub(crate) dtype: DType,
    pub(crate) form: CanonicalForm,
}

impl Chain {
    /// Return the number of sites.
    pub fn len(&self) -> usize { self.sites.len() }

    /// Always `false`; chains have at least one site.
    pub fn is_empty(&self) -> bool { self.sites.is_empty() }

    /// Return the kind of object represented.
    pub fn kind(&self) -> Kind { self.kind }

    /// Return the nominal element type.
    pub fn dtype(&self) -> DType { self.dtype }

    /// Return the current naming templates.
    pub fn naming(&self) -> &Naming { &self.naming }

    /// Return the labels used to name each site's indices.
    pub fn labels(&self) -> &[usize] { &self.labels }

    /// Return the canonical-form descriptor.
    pub fn form(&self) -> CanonicalForm { self.form }

    /// Return the numbers of left- and right-canonical sites.
    pub fn count_canonized(&self) -> (usize, usize) {
        self.form.counts(self.len())
    }

    /// Return all site tensors in order.
    pub fn sites(&self) -> &[Tensor] { &self.sites }

    /// Return the tensor at site `i`.
    pub fn site(&self, i: usize) -> ChainResult<&Tensor> {
        self.check_site(i)?;
        Ok(&self.sites[i])
    }

    /// Return the tensor carrying the site tag `tag`, if any.
    pub fn site_by_tag(&self, tag: &str) -> Option<&Tensor> {
        self.labels.iter()
            .position(|l| fill(&self.naming.site_tag_id, *l) == tag)
            .map(|i| &self.sites[i])
    }

    /// Return a mutable view of the data at site `i`.
    ///
    /// Since arbitrary edits can break any gauge, the canonical form is reset
    /// to [`CanonicalForm::Uncanonical`].
    pub fn site_mut(&mut self, i: usize) -> ChainResult<nd::ArrayViewMutD<'_, C64>> {
        self.check_site(i)?;
        self.form = CanonicalForm::Uncanonical;
        Ok(self.sites[i].data_mut())
    }

    /// Return the name of the upper physical index at site `i`.
    pub fn upper_ind(&self, i: usize) -> String {
        fill(&self.naming.upper_ind_id, self.labels[i])
    }

    /// Return the name of the lower physical index at site `i`, if `self` is
    /// an operator.
    pub fn lower_ind(&self, i: usize) -> Option<String> {
        (self.kind == Kind::Operator)
            .then(|| fill(&self.naming.lower_ind_id, self.labels[i]))
    }

    /// Return the names of all upper physical indices.
    pub fn upper_inds(&self) -> Vec<String> {
        (0..self.len()).map(|i| self.upper_ind(i)).collect()
    }

    /// Return the names of all lower physical indices; empty for states.
    pub fn lower_inds(&self) -> Vec<String> {
        (0..self.len()).filter_map(|i| self.lower_ind(i)).collect()
    }

    /// Return the tags of all sites.
    pub fn site_tags(&self) -> Vec<String> {
        self.labels.iter().map(|l| fill(&self.naming.site_tag_id, *l)).collect()
    }

    /// Return the dimension of the bond between sites `i` and `i + 1`.
    pub fn bond_dim(&self, i: usize) -> ChainResult<usize> {
        if i + 1 >= self.len() {
            return Err(ChainError::SiteOutOfRange(i + 1, self.len()));
        }
        Ok(self.sites[i].index_dim(&bond(i)).unwrap_or(1))
    }

    /// Return the dimensions of all bonds, in order.
    pub fn bond_dims(&self) -> Vec<usize> {
        (0..self.len().saturating_sub(1))
            .map(|i| self.sites[i].index_dim(&bond(i)).unwrap_or(1))
            .collect()
    }

    /// Return the largest bond dimension, or 1 for a single-site chain.
    pub fn max_bond(&self) -> usize {
        self.bond_dims().into_iter().max().unwrap_or(1)
    }

    /// Return the dimension of the upper physical index at site `i`.
    pub fn phys_dim(&self, i: usize) -> ChainResult<usize> {
        self.check_site(i)?;
        Ok(self.sites[i].index_dim(&self.upper_ind(i)).unwrap_or(1))
    }

    /// Set the template for upper physical indices, renaming them on every
    /// site.
    pub fn set_upper_ind_id(&mut self, template: &str) -> ChainResult<()> {
        let naming = Naming { upper_ind_id: template.to_string(), ..self.naming.clone() };
        self.rename(naming)
    }

    /// Set the template for lower physical indices, renaming them on every
    /// site.
    pub fn set_lower_ind_id(&mut self, template: &str) -> ChainResult<()> {
        let naming = Naming { lower_ind_id: template.to_string(), ..self.naming.clone() };
        self.rename(naming)
    }

    /// Set the template for site tags.
    pub fn set_site_tag_id(&mut self, template: &str) -> ChainResult<()> {
        let naming = Naming { site_tag_id: template.to_string(), ..self.naming.clone() };
        self.rename(naming)
    }

    // rename all physical indices to follow `naming`, failing before any
    // change if the new names would be unusable
    pub(crate) fn rename(&mut self, naming: Naming) -> ChainResult<()> {
        naming.validate()?;
        let is_op = self.kind == Kind::Operator;
        let names = |templates: &Naming, label: usize| {
            (
                fill(&templates.upper_ind_id, label),
                is_op.then(|| fill(&templates.lower_ind_id, label)),
            )
        };
        let new_names: Vec<(String, Option<String>)> =
            self.labels.iter().map(|l| names(&naming, *l)).collect();
        let old_names: Vec<(String, Option<String>)> =
            self.labels.iter().map(|l| names(&self.naming, *l)).collect();
        let clash =
            new_names.iter()
            .flat_map(|(u, l)| std::iter::once(u.clone()).chain(l.clone()))
            .chain((0..self.len().saturating_sub(1)).map(bond))
            .duplicates()
            .next();
        if clash.is_some() {
            return Err(ChainError::InvalidTemplate(
                format!("{} / {}", naming.upper_ind_id, naming.lower_ind_id)
            ));
        }
        for ((site, (old_u, old_l)), (new_u, new_l)) in
            self.sites.iter_mut().zip(old_names).zip(new_names)
        {
            site.map_indices(|idx| {
                if idx == old_u {
                    Some(new_u.clone())
                } else if old_l.as_deref() == Some(idx) {
                    new_l.clone()
                } else {
                    None
                }
            })?;
        }
        self.naming = naming;
        Ok(())
    }

    /// Return the conjugate of `self`, the "bra" of a state.
    pub fn conj(&self) -> Self {
        Self {
            sites: self.sites.iter().map(Tensor::conj).collect(),
            ..self.clone()
        }
    }

    pub(crate) fn check_site(&self, i: usize) -> ChainResult<()> {
        if i < self.len() {
            Ok(())
        } else {
            Err(ChainError::SiteOutOfRange(i, self.len()))
        }
    }

    pub(crate) fn check_kind(&self, expected: Kind) -> ChainResult<()> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(ChainError::KindMismatch { expected, found: self.kind })
        }
    }

    // index order for site `i`
    pub(crate) fn layout(&self, i: usize) -> Vec<String> {
        let n = self.labels.len();
        let mut order: Vec<String> = Vec::with_capacity(4);
        if i > 0 { order.push(bond(i - 1)); }
        if i + 1 < n { order.push(bond(i)); }
        order.push(self.upper_ind(i));
        if let Some(lower) = self.lower_ind(i) { order.push(lower); }
        order
    }

    // restore the standard axis order at site `i`
    pub(crate) fn fix_layout(&mut self, i: usize) -> ChainResult<()> {
        let order = self.layout(i);
        self.sites[i].transpose_to(&order)?;
        Ok(())
    }

    // round stored data to the chain's dtype; only single-precision types
    // need any work
    pub(crate) fn settle(&mut self) {
        if self.dtype.is_single() {
            let dtype = self.dtype;
            self.sites.iter_mut()
                .for_each(|t| t.map_inplace(|z| dtype.coerce(z)));
        }
    }

    // validate that `other` can be combined site-by-site with `self`
    pub(crate) fn check_compatible(&self, other: &Self) -> ChainResult<()> {
        if self.kind != other.kind {
            return Err(ChainError::KindMismatch {
                expected: self.kind,
                found: other.kind,
            });
        }
        if self.len() != other.len() {
            return Err(ChainError::LengthMismatch(self.len(), other.len()));
        }
        for i in 0..self.len() {
            let same_names =
                self.upper_ind(i) == other.upper_ind(i)
                && self.lower_ind(i) == other.lower_ind(i);
            let same_dims =
                self.sites[i].index_dim(&self.upper_ind(i))
                    == other.sites[i].index_dim(&other.upper_ind(i))
                && self.lower_ind(i).map(|l| self.sites[i].index_dim(&l))
                    == other.lower_ind(i).map(|l| other.sites[i].index_dim(&l));
            if !same_names || !same_dims {
                return Err(ChainError::PhysicalMismatch(i));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{ SeedableRng, rngs::StdRng };

    #[test]
    fn templates_cascade() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut mps = Chain::rand_state(5, 3, &GenOpts::default(), &mut rng)
            .unwrap();
        assert_eq!(mps.upper_inds(), ["k0", "k1", "k2", "k3", "k4"]);
        mps.set_upper_ind_id("foo{}").unwrap();
        assert_eq!(mps.naming().upper_ind_id, "foo{}");
        assert!(mps.site(3).unwrap().has_index("foo3"));
        assert!(!mps.site(3).unwrap().has_index("k3"));
        assert!(mps.set_upper_ind_id("foo").is_err());
        assert_eq!(mps.upper_inds()[0], "foo0");

        mps.set_site_tag_id("S{}").unwrap();
        assert!(mps.site_by_tag("S2").is_some());
        assert!(mps.site_by_tag("I2").is_none());
    }

    #[test]
    fn operator_templates_cannot_collide() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut mpo = Chain::rand_operator(4, 2, &GenOpts::default(), &mut rng)
            .unwrap();
        assert_eq!(mpo.lower_inds(), ["b0", "b1", "b2", "b3"]);
        let before = mpo.clone();
        assert!(matches!(
            mpo.set_upper_ind_id("b{}"),
            Err(ChainError::InvalidTemplate(_))
        ));
        assert_eq!(mpo, before);
        mpo.set_lower_ind_id("bra{}").unwrap();
        assert!(mpo.site(0).unwrap().has_index("bra0"));
    }

    #[test]
    fn site_mut_resets_form() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut mps = Chain::rand_state(4, 3, &GenOpts::default(), &mut rng)
            .unwrap();
        mps.canonize(2, None).unwrap();
        assert_eq!(mps.count_canonized(), (2, 1));
        mps.site_mut(1).unwrap().fill(crate::c!(0.5));
        assert_eq!(mps.form(), CanonicalForm::Uncanonical);
        assert!(matches!(mps.site_mut(4), Err(ChainError::SiteOutOfRange(4, 4))));
    }
}
