//! Gauge transforms: single-site orthogonalization, sweeps, and orthogonality
//! center shifts.

use num_complex::Complex64 as C64;
use tracing::debug;
use crate::{
    linalg::{ self, Absorb, Method, Truncation },
    tensor::{ Leg, Tensor },
};
use super::{ Chain, ChainError, ChainResult, bond, form::Iso };

// temporary name for a bond while it is being replaced
const SWAP_BOND: &str = "_bond_swap";

/// Direction in which a site's remainder is pushed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Dir {
    /// Toward higher site indices.
    Right,
    /// Toward lower site indices.
    Left,
}

/// Options for a canonicalizing sweep.
///
/// For a left sweep, sites `from..to` are made left-isometric and the
/// remainder ends up at `to`; for a right sweep, sites `to + 1..=from` are made
/// right-isometric, again leaving the remainder at `to`. Unset endpoints
/// default to the ends of the chain.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct SweepOpts {
    pub from: Option<usize>,
    pub to: Option<usize>,
    /// Divide the final remainder by its norm.
    pub normalize: bool,
    pub method: Method,
}

impl SweepOpts {
    /// Sweep the whole chain, normalizing at the end.
    pub fn normalized() -> Self { Self { normalize: true, ..Self::default() } }
}

// the result of factoring one site against one of its bonds
struct Factored {
    site: Tensor,
    remainder: Tensor,
    svals: Option<Vec<f64>>,
}

impl Chain {
    // factor site `i` against the bond toward `dir`, without modifying
    // anything; the remainder carries the new bond and `SWAP_BOND` in place
    // of the old one
    fn factor_site(
        &self,
        i: usize,
        dir: Dir,
        method: Method,
        trunc: Option<&Truncation>,
        absorb: Absorb,
    ) -> ChainResult<Factored>
    {
        let real = self.dtype.is_real();
        let site = &self.sites[i];
        match dir {
            Dir::Right => {
                let b = bond(i);
                let rows: Vec<&String> =
                    site.indices().iter().filter(|idx| **idx != b).collect();
                let (mat, row_legs, col_legs) = site.to_matrix(&rows)?;
                let split = linalg::decompose(&mat, method, trunc, absorb, real)?;
                let k = split.rank();
                let chi = col_legs[0].1;
                let new_leg: Leg = (b.clone(), k);
                let site = Tensor::from_matrix(split.left, &row_legs, &[new_leg.clone()])?;
                let remainder = Tensor::from_matrix(
                    split.right, &[new_leg], &[(SWAP_BOND.to_string(), chi)])?;
                Ok(Factored { site, remainder, svals: split.svals })
            },
            Dir::Left => {
                let b = bond(i - 1);
                let (mat, row_legs, col_legs) = site.to_matrix(&[b.as_str()])?;
                let split = linalg::decompose(&mat, method, trunc, absorb, real)?;
                let k = split.rank();
                let chi = row_legs[0].1;
                let new_leg: Leg = (b.clone(), k);
                let site = Tensor::from_matrix(split.right, &[new_leg.clone()], &col_legs)?;
                let remainder = Tensor::from_matrix(
                    split.left, &[(SWAP_BOND.to_string(), chi)], &[new_leg])?;
                Ok(Factored { site, remainder, svals: split.svals })
            },
        }
    }

    // contract a remainder from `factor_site` into site `j` across the bond
    // `b` it replaces
    fn absorb_remainder(&mut self, j: usize, b: &str, remainder: &Tensor)
        -> ChainResult<()>
    {
        let mut target = self.sites[j].clone();
        target.reindex(b, SWAP_BOND)?;
        self.sites[j] = remainder.contract(&target)?;
        self.fix_layout(j)?;
        Ok(())
    }

    // rename the physical indices of a tensor taken from `from` at site `i`
    // to those of `self`
    fn adopt_phys(&self, t: &mut Tensor, from: &Chain, i: usize) -> ChainResult<()> {
        let (src_u, dst_u) = (from.upper_ind(i), self.upper_ind(i));
        let (src_l, dst_l) = (from.lower_ind(i), self.lower_ind(i));
        t.map_indices(|idx| {
            if idx == src_u {
                Some(dst_u.clone())
            } else if src_l.as_deref() == Some(idx) {
                dst_l.clone()
            } else {
                None
            }
        })?;
        Ok(())
    }

    pub(crate) fn check_bra(&self, bra: Option<&Chain>) -> ChainResult<()> {
        let Some(bra) = bra else { return Ok(()); };
        if bra.kind != self.kind {
            return Err(ChainError::KindMismatch {
                expected: self.kind,
                found: bra.kind,
            });
        }
        if bra.len() != self.len() {
            return Err(ChainError::LengthMismatch(self.len(), bra.len()));
        }
        for (i, (k, b)) in self.sites.iter().zip(&bra.sites).enumerate() {
            if k.shape() != b.shape() {
                return Err(ChainError::BraMismatch(i));
            }
        }
        Ok(())
    }

    /// Split the bond between site `i` and its neighbor toward `dir`.
    ///
    /// Site `i` is replaced by the left (for [`Dir::Right`]) or right (for
    /// [`Dir::Left`]) factor of its decomposition against that bond and the
    /// other factor is contracted into the neighbor. If `bra` is given, it
    /// receives the conjugate of the same transform. The canonical form is
    /// updated according to which factors are isometric.
    ///
    /// Callers are responsible for checking that the neighbor exists and that
    /// `bra` matches `self`.
    pub(crate) fn split_bond(
        &mut self,
        i: usize,
        dir: Dir,
        method: Method,
        trunc: Option<&Truncation>,
        absorb: Absorb,
        mut bra: Option<&mut Chain>,
    ) -> ChainResult<Option<Vec<f64>>>
    {
        let n = self.len();
        let (j, b) = match dir {
            Dir::Right => (i + 1, bond(i)),
            Dir::Left => (i - 1, bond(i - 1)),
        };
        let Factored { site, remainder, svals } =
            self.factor_site(i, dir, method, trunc, absorb)?;

        if let Some(bra) = bra.as_deref_mut() {
            let mut bra_site = site.conj();
            bra.adopt_phys(&mut bra_site, self, i)?;
            bra.sites[i] = bra_site;
            bra.fix_layout(i)?;
            bra.absorb_remainder(j, &b, &remainder.conj())?;
        }
        self.sites[i] = site;
        self.fix_layout(i)?;
        self.absorb_remainder(j, &b, &remainder)?;

        // which factors came out isometric: QR treats `Both` as `Right`
        let (site_iso, passed_iso) =
            match (dir, absorb) {
                (Dir::Right, Absorb::Right) => (true, false),
                (Dir::Right, Absorb::Both) => (method == Method::Qr, false),
                (Dir::Right, Absorb::Left) => (false, true),
                (Dir::Left, Absorb::Left) => (true, false),
                (Dir::Left, Absorb::Both) => (false, method == Method::Qr),
                (Dir::Left, Absorb::Right) => (false, true),
            };
        // an isometric remainder keeps an isometric neighbor isometric in
        // the same direction
        let neighbor_kept =
            passed_iso
            && match dir {
                Dir::Right => self.form.is_right_isometric(j, n),
                Dir::Left => self.form.is_left_isometric(j, n),
            };
        let iso =
            site_iso.then_some(match dir {
                Dir::Right => Iso::Left,
                Dir::Left => Iso::Right,
            });
        let form = self.form.after_split(i, iso, (!neighbor_kept).then_some(j), n);
        self.form = form;
        if let Some(bra) = bra { bra.form = form; }
        Ok(svals)
    }

    // divide site `i` (and the bra's) by its norm
    fn normalize_site(&mut self, i: usize, bra: Option<&mut Chain>) {
        let norm = self.sites[i].norm();
        if norm > 0.0 {
            self.sites[i].scalar_mul_inplace(C64::from(norm.recip()));
        }
        if let Some(bra) = bra {
            let norm = bra.sites[i].norm();
            if norm > 0.0 {
                bra.sites[i].scalar_mul_inplace(C64::from(norm.recip()));
            }
        }
    }

    /// Make site `i` left-isometric with a QR decomposition, pushing the
    /// remainder into site `i + 1`.
    ///
    /// The bond between the two shrinks if site `i` has fewer rows than
    /// columns when matricized against it.
    pub fn left_canonize_site(&mut self, i: usize, bra: Option<&mut Chain>)
        -> ChainResult<()>
    {
        self.check_site(i)?;
        if i + 1 == self.len() { return Err(ChainError::NoNeighbor(i, "to the right")); }
        self.check_bra(bra.as_deref())?;
        self.split_bond(i, Dir::Right, Method::Qr, None, Absorb::Right, bra)?;
        self.settle();
        Ok(())
    }

    /// Make site `i` right-isometric with a QR decomposition, pushing the
    /// remainder into site `i - 1`.
    pub fn right_canonize_site(&mut self, i: usize, bra: Option<&mut Chain>)
        -> ChainResult<()>
    {
        self.check_site(i)?;
        if i == 0 { return Err(ChainError::NoNeighbor(0, "to the left")); }
        self.check_bra(bra.as_deref())?;
        self.split_bond(i, Dir::Left, Method::Qr, None, Absorb::Left, bra)?;
        self.settle();
        Ok(())
    }

    /// Left-canonize a contiguous range of sites in order.
    ///
    /// Defaults sweep from site 0 to `n - 1`, leaving every site but the last
    /// left-isometric.
    pub fn left_canonize(&mut self, opts: &SweepOpts, mut bra: Option<&mut Chain>)
        -> ChainResult<()>
    {
        let n = self.len();
        let from = opts.from.unwrap_or(0);
        let to = opts.to.unwrap_or(n - 1);
        self.check_site(from)?;
        self.check_site(to)?;
        self.check_bra(bra.as_deref())?;
        debug!(from, to, method = ?opts.method, "left sweep");
        for i in from..to {
            self.split_bond(
                i, Dir::Right, opts.method, None, Absorb::Right, bra.as_deref_mut())?;
        }
        if opts.normalize { self.normalize_site(to, bra.as_deref_mut()); }
        self.settle();
        if let Some(bra) = bra { bra.settle(); }
        Ok(())
    }

    /// Right-canonize a contiguous range of sites in reverse order.
    ///
    /// Defaults sweep from site `n - 1` to 0, leaving every site but the
    /// first right-isometric.
    pub fn right_canonize(&mut self, opts: &SweepOpts, mut bra: Option<&mut Chain>)
        -> ChainResult<()>
    {
        let n = self.len();
        let from = opts.from.unwrap_or(n - 1);
        let to = opts.to.unwrap_or(0);
        self.check_site(from)?;
        self.check_site(to)?;
        self.check_bra(bra.as_deref())?;
        debug!(from, to, method = ?opts.method, "right sweep");
        for i in (to + 1..=from).rev() {
            self.split_bond(
                i, Dir::Left, opts.method, None, Absorb::Left, bra.as_deref_mut())?;
        }
        if opts.normalize { self.normalize_site(to, bra.as_deref_mut()); }
        self.settle();
        if let Some(bra) = bra { bra.settle(); }
        Ok(())
    }

    /// Put `self` in mixed canonical form with its orthogonality center at
    /// `center`.
    ///
    /// Sites already known to be isometric in the right direction are
    /// skipped, so moving an existing center costs only the distance moved.
    /// Afterwards, [`Self::count_canonized`] returns `(center, n - 1 -
    /// center)`.
    pub fn canonize(&mut self, center: usize, mut bra: Option<&mut Chain>)
        -> ChainResult<()>
    {
        let n = self.len();
        self.check_site(center)?;
        self.check_bra(bra.as_deref())?;
        let (l, r) = self.count_canonized();
        let left_from = l.min(center);
        let right_from = (n - 1 - r).max(center);
        debug!(center, left_from, right_from, "canonize");
        for i in left_from..center {
            self.split_bond(
                i, Dir::Right, Method::Qr, None, Absorb::Right, bra.as_deref_mut())?;
        }
        for i in (center + 1..=right_from).rev() {
            self.split_bond(
                i, Dir::Left, Method::Qr, None, Absorb::Left, bra.as_deref_mut())?;
        }
        self.settle();
        if let Some(bra) = bra { bra.settle(); }
        Ok(())
    }

    /// Move the orthogonality center from `current` to `new` with one QR
    /// step per site in between.
    ///
    /// Fails without modifying `self` if `current` is not a valid center.
    pub fn shift_orthogonality_center(
        &mut self,
        current: usize,
        new: usize,
        mut bra: Option<&mut Chain>,
    ) -> ChainResult<()>
    {
        let n = self.len();
        self.check_site(current)?;
        self.check_site(new)?;
        if !self.form.is_center(current, n) {
            return Err(ChainError::NotOrthogonalityCenter(current));
        }
        self.check_bra(bra.as_deref())?;
        debug!(current, new, "shift center");
        if new > current {
            for i in current..new {
                self.split_bond(
                    i, Dir::Right, Method::Qr, None, Absorb::Right, bra.as_deref_mut())?;
            }
        } else {
            for i in (new + 1..=current).rev() {
                self.split_bond(
                    i, Dir::Left, Method::Qr, None, Absorb::Left, bra.as_deref_mut())?;
            }
        }
        self.settle();
        if let Some(bra) = bra { bra.settle(); }
        Ok(())
    }
}
