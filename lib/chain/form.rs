//! Canonical-form bookkeeping for a chain.
//!
//! The descriptor tracks a contiguous prefix of left-isometric sites and a
//! contiguous suffix of right-isometric sites. Every gauge transform reports
//! which sites it made isometric and which it otherwise modified; everything
//! else about the chain's gauge is forgotten.

/// Canonical form of a chain of `n` sites.
///
/// A site `i` is left-isometric when contracting it with its conjugate over
/// everything except its right bond gives the identity on that bond, and
/// right-isometric symmetrically.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum CanonicalForm {
    /// Nothing is known about the gauge.
    #[default]
    Uncanonical,
    /// Sites `0..l` are left-isometric.
    LeftUpTo(usize),
    /// Sites `r..n` are right-isometric.
    RightFrom(usize),
    /// Sites `0..c` are left-isometric and sites `c + 1..n` are
    /// right-isometric, so that site `c` is the orthogonality center.
    CenterAt(usize),
    /// Sites `0..left_up_to` are left-isometric and sites `right_from..n` are
    /// right-isometric, with at least two sites in between.
    Mixed { left_up_to: usize, right_from: usize },
}

impl CanonicalForm {
    /// Build a descriptor from a count of left-isometric sites (from the
    /// left end) and right-isometric sites (from the right end).
    pub fn from_counts(left: usize, right: usize, n: usize) -> Self {
        match (left, right) {
            (0, 0) => Self::Uncanonical,
            (l, r) if n > 0 && l + r >= n - 1 => Self::CenterAt(l.min(n - 1)),
            (l, 0) => Self::LeftUpTo(l),
            (0, r) => Self::RightFrom(n - r),
            (l, r) => Self::Mixed { left_up_to: l, right_from: n - r },
        }
    }

    /// Return the number of left- and right-isometric sites.
    pub fn counts(self, n: usize) -> (usize, usize) {
        match self {
            Self::Uncanonical => (0, 0),
            Self::LeftUpTo(l) => (l, 0),
            Self::RightFrom(r) => (0, n.saturating_sub(r)),
            Self::CenterAt(c) => (c, n.saturating_sub(c + 1)),
            Self::Mixed { left_up_to, right_from }
                => (left_up_to, n.saturating_sub(right_from)),
        }
    }

    /// Return the orthogonality center, if the descriptor implies one.
    ///
    /// A single-site chain always has its center at site 0.
    pub fn center(self, n: usize) -> Option<usize> {
        if n == 1 { return Some(0); }
        match self {
            Self::CenterAt(c) => Some(c),
            _ => None,
        }
    }

    /// Return `true` if `site` is a valid orthogonality center.
    ///
    /// This is weaker than `self.center(n) == Some(site)`: for example, a
    /// chain whose first `n - 1` sites are left-isometric has a valid center at
    /// `n - 1`, but so does one whose first `n - 2` sites are left-isometric
    /// and whose last site is right-isometric.
    pub fn is_center(self, site: usize, n: usize) -> bool {
        if n == 1 { return site == 0; }
        let (l, r) = self.counts(n);
        site < n && l >= site && r + site + 1 >= n
    }

    pub(crate) fn is_left_isometric(self, site: usize, n: usize) -> bool {
        self.counts(n).0 > site
    }

    pub(crate) fn is_right_isometric(self, site: usize, n: usize) -> bool {
        let (_, r) = self.counts(n);
        r + site >= n
    }

    /// Site `site` was modified without regard to its gauge.
    pub(crate) fn touched(self, site: usize, n: usize) -> Self {
        let (l, r) = self.counts(n);
        Self::from_counts(l.min(site), r.min(n - 1 - site), n)
    }

    /// Site `site` was replaced by one factor of a decomposition, isometric on
    /// the side given by `iso` (if any), and the other factor was absorbed
    /// into `neighbor` (if that changed its gauge).
    ///
    /// All three updates are applied to the counts before any conversion
    /// back to a descriptor, since intermediate counts may overlap.
    pub(crate) fn after_split(
        self,
        site: usize,
        iso: Option<Iso>,
        neighbor: Option<usize>,
        n: usize,
    ) -> Self
    {
        let (mut l, mut r) = self.counts(n);
        l = l.min(site);
        r = r.min(n - 1 - site);
        match iso {
            Some(Iso::Left) if l == site => { l = site + 1; },
            Some(Iso::Right) if r == n - 1 - site => { r = n - site; },
            _ => { },
        }
        if let Some(j) = neighbor {
            l = l.min(j);
            r = r.min(n - 1 - j);
        }
        Self::from_counts(l, r, n)
    }
}

/// Side on which a factor is isometric.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Iso {
    Left,
    Right,
}
