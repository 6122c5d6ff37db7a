//! Labeled dense tensors.
//!
//! A [`Tensor`] is an n-dimensional array of complex numbers paired with a
//! name for each of its axes. Two tensors are contracted over every index name
//! they have in common, which is all the bookkeeping a chain of tensors needs:
//! bonds between neighboring sites are simply indices that appear on both.

use std::fmt;
use itertools::Itertools;
use ndarray as nd;
use num_complex::Complex64 as C64;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TensorError {
    /// Returned when an index name appears more than once on a single tensor.
    #[error("duplicate index {0:?}")]
    DuplicateIndex(String),

    /// Returned when the number of index names doesn't match the number of
    /// array axes.
    #[error("non-matching indices {0:?} and shape {1:?}")]
    IncompatibleShape(Box<[String]>, Box<[usize]>),

    /// Returned when a named index does not exist on a tensor.
    #[error("missing index {0:?}")]
    MissingIndex(String),

    /// Returned when a shared index has different sizes on two tensors.
    #[error("index {0:?} has mismatched dimensions {1} and {2}")]
    DimMismatch(String, usize, usize),

    /// Returned when a requested index ordering is not a permutation of the
    /// existing indices.
    #[error("index order {0:?} is not a permutation of {1:?}")]
    BadPermutation(Box<[String]>, Box<[String]>),

    #[error("shape error: {0}")]
    ShapeError(#[from] nd::ShapeError),
}
pub type TensorResult<T> = Result<T, TensorError>;

/// An index name paired with its dimension, used to describe the fused row or
/// column space of a matricized tensor.
pub type Leg = (String, usize);

/// A dense array with a name attached to each axis.
///
/// Names are unique within a tensor. A rank-0 tensor holds a single scalar.
/// No parallelism or GPU computation is offered; contractions are carried out
/// as a single matrix product after fusing the common and non-common axes of
/// each operand.
#[derive(Clone, PartialEq, Debug)]
pub struct Tensor {
    indices: Vec<String>,
    data: nd::ArrayD<C64>,
}

impl From<C64> for Tensor {
    fn from(val: C64) -> Self { Self::new_scalar(val) }
}

impl Tensor {
    /// Create a new tensor from an n-dimensional array.
    ///
    /// Fails if duplicate indices are provided or the number of indices does
    /// not match the number of array axes.
    pub fn new<I, S, D>(indices: I, array: nd::ArrayBase<S, D>)
        -> TensorResult<Self>
    where
        I: IntoIterator,
        I::Item: Into<String>,
        S: nd::DataOwned<Elem = C64>,
        D: nd::Dimension,
    {
        let indices: Vec<String> = indices.into_iter().map(Into::into).collect();
        if let Some(dup) = indices.iter().duplicates().next() {
            return Err(TensorError::DuplicateIndex(dup.clone()));
        }
        if indices.len() != array.ndim() {
            return Err(TensorError::IncompatibleShape(
                indices.into(),
                array.shape().into(),
            ));
        }
        Ok(Self { indices, data: array.into_owned().into_dyn() })
    }

    pub(crate) fn new_unchecked(indices: Vec<String>, data: nd::ArrayD<C64>)
        -> Self
    {
        Self { indices, data }
    }

    /// Create a new rank-0 (scalar) tensor.
    pub fn new_scalar(val: C64) -> Self {
        Self {
            indices: Vec::new(),
            data: nd::ArrayD::from_elem(nd::IxDyn(&[]), val),
        }
    }

    /// Create a tensor of zeros over a set of named legs.
    pub fn zeros(legs: &[Leg]) -> Self {
        let shape: Vec<usize> = legs.iter().map(|(_, d)| *d).collect();
        Self {
            indices: legs.iter().map(|(idx, _)| idx.clone()).collect(),
            data: nd::ArrayD::zeros(shape),
        }
    }

    /// If `self` has rank 0, return its value as a single scalar.
    pub fn as_scalar(&self) -> Option<C64> {
        self.indices.is_empty().then(|| self.data.iter().copied().sum())
    }

    /// Return the rank of `self`.
    pub fn rank(&self) -> usize { self.indices.len() }

    /// Return the index names of `self`, in axis order.
    pub fn indices(&self) -> &[String] { &self.indices }

    /// Return the shape of the underlying array.
    pub fn shape(&self) -> &[usize] { self.data.shape() }

    /// Return the underlying array.
    pub fn data(&self) -> &nd::ArrayD<C64> { &self.data }

    /// Return a mutable view of the underlying array.
    ///
    /// The view cannot change the shape of `self`.
    pub fn data_mut(&mut self) -> nd::ArrayViewMutD<'_, C64> {
        self.data.view_mut()
    }

    /// Return `true` if `self` has the given index.
    pub fn has_index(&self, index: &str) -> bool {
        self.indices.iter().any(|idx| idx == index)
    }

    /// Return the axis position of an index if it exists.
    pub fn index_pos(&self, index: &str) -> Option<usize> {
        self.indices.iter().position(|idx| idx == index)
    }

    /// Return the dimension of an index if it exists.
    pub fn index_dim(&self, index: &str) -> Option<usize> {
        self.index_pos(index).map(|k| self.data.shape()[k])
    }

    fn pos_or_err(&self, index: &str) -> TensorResult<usize> {
        self.index_pos(index)
            .ok_or_else(|| TensorError::MissingIndex(index.to_string()))
    }

    /// Rename a single index.
    ///
    /// Renaming to the same name is a no-op. Fails if `old` does not exist or
    /// `new` already names a different axis.
    pub fn reindex(&mut self, old: &str, new: &str) -> TensorResult<()> {
        if old == new { return Ok(()); }
        let k = self.pos_or_err(old)?;
        if self.has_index(new) {
            return Err(TensorError::DuplicateIndex(new.to_string()));
        }
        self.indices[k] = new.to_string();
        Ok(())
    }

    /// Rename indices according to a mapping function, leaving those for
    /// which it returns `None` untouched.
    pub fn map_indices<F>(&mut self, mut f: F) -> TensorResult<()>
    where F: FnMut(&str) -> Option<String>
    {
        let new: Vec<String> =
            self.indices.iter()
            .map(|idx| f(idx).unwrap_or_else(|| idx.clone()))
            .collect();
        if let Some(dup) = new.iter().duplicates().next() {
            return Err(TensorError::DuplicateIndex(dup.clone()));
        }
        self.indices = new;
        Ok(())
    }

    /// Reorder the axes of `self` to match `order`.
    pub fn transpose_to<S>(&mut self, order: &[S]) -> TensorResult<()>
    where S: AsRef<str>
    {
        let bad_perm = || {
            TensorError::BadPermutation(
                order.iter().map(|s| s.as_ref().to_string()).collect(),
                self.indices.clone().into(),
            )
        };
        if order.len() != self.indices.len() { return Err(bad_perm()); }
        let perm: Vec<usize> =
            order.iter()
            .map(|idx| self.index_pos(idx.as_ref()))
            .collect::<Option<Vec<usize>>>()
            .ok_or_else(bad_perm)?;
        if perm.iter().duplicates().next().is_some() { return Err(bad_perm()); }
        if perm.iter().enumerate().all(|(k, p)| k == *p) { return Ok(()); }
        self.data =
            self.data.view()
            .permuted_axes(perm.as_slice())
            .as_standard_layout()
            .into_owned();
        self.indices = order.iter().map(|s| s.as_ref().to_string()).collect();
        Ok(())
    }

    /// Swap the positions of two axes in the underlying array while keeping
    /// index names in place, exchanging the roles of the two indices.
    ///
    /// Fails if either index does not exist or their dimensions differ.
    pub fn swap_roles(&mut self, a: &str, b: &str) -> TensorResult<()> {
        let k_a = self.pos_or_err(a)?;
        let k_b = self.pos_or_err(b)?;
        let (d_a, d_b) = (self.data.shape()[k_a], self.data.shape()[k_b]);
        if d_a != d_b {
            return Err(TensorError::DimMismatch(b.to_string(), d_a, d_b));
        }
        self.data.swap_axes(k_a, k_b);
        self.data = self.data.as_standard_layout().into_owned();
        Ok(())
    }

    /// Return the element-wise conjugate of `self` as a new `Tensor`.
    pub fn conj(&self) -> Self {
        Self { indices: self.indices.clone(), data: self.data.mapv(|a| a.conj()) }
    }

    /// Conjugate the elements of `self` in place.
    pub fn conj_inplace(&mut self) { self.data.mapv_inplace(|a| a.conj()); }

    /// Multiply by a scalar, modifying `self` in place.
    pub fn scalar_mul_inplace(&mut self, scalar: C64) {
        self.data.mapv_inplace(|a| a * scalar);
    }

    /// Multiply by a scalar, consuming `self`.
    pub fn scalar_mul(mut self, scalar: C64) -> Self {
        self.scalar_mul_inplace(scalar);
        self
    }

    /// Apply a function to every element in place.
    pub fn map_inplace<F>(&mut self, mut f: F)
    where F: FnMut(C64) -> C64
    {
        self.data.mapv_inplace(&mut f);
    }

    /// Return the Frobenius norm of `self`.
    pub fn norm(&self) -> f64 {
        self.data.iter().map(|a| a.norm_sqr()).sum::<f64>().sqrt()
    }

    /// Contract `self` with `rhs` over all common indices.
    ///
    /// The result's indices comprise all non-common indices of `self`
    /// followed by those of `rhs`, each group in its original order.
    pub fn contract(&self, rhs: &Tensor) -> TensorResult<Tensor> {
        let mut comm_a: Vec<usize> = Vec::new();
        let mut comm_b: Vec<usize> = Vec::new();
        for (k_a, idx) in self.indices.iter().enumerate() {
            if let Some(k_b) = rhs.index_pos(idx) {
                let (d_a, d_b) = (self.data.shape()[k_a], rhs.data.shape()[k_b]);
                if d_a != d_b {
                    return Err(TensorError::DimMismatch(idx.clone(), d_a, d_b));
                }
                comm_a.push(k_a);
                comm_b.push(k_b);
            }
        }
        let free_a: Vec<usize> =
            (0..self.rank()).filter(|k| !comm_a.contains(k)).collect();
        let free_b: Vec<usize> =
            (0..rhs.rank()).filter(|k| !comm_b.contains(k)).collect();

        // move common axes to the right of a and the left of b, then fuse
        // everything down to a single matrix product
        let dim = |data: &nd::ArrayD<C64>, axes: &[usize]| -> usize {
            axes.iter().map(|k| data.shape()[*k]).product()
        };
        let dim_free_a = dim(&self.data, &free_a);
        let dim_comm = dim(&self.data, &comm_a);
        let dim_free_b = dim(&rhs.data, &free_b);
        let perm_a: Vec<usize> =
            free_a.iter().chain(comm_a.iter()).copied().collect();
        let perm_b: Vec<usize> =
            comm_b.iter().chain(free_b.iter()).copied().collect();
        let a: nd::Array2<C64> =
            self.data.view()
            .permuted_axes(perm_a.as_slice())
            .as_standard_layout()
            .into_owned()
            .into_shape((dim_free_a, dim_comm))?;
        let b: nd::Array2<C64> =
            rhs.data.view()
            .permuted_axes(perm_b.as_slice())
            .as_standard_layout()
            .into_owned()
            .into_shape((dim_comm, dim_free_b))?;
        let c: nd::Array2<C64> = a.dot(&b);

        let new_shape: Vec<usize> =
            free_a.iter().map(|k| self.data.shape()[*k])
            .chain(free_b.iter().map(|k| rhs.data.shape()[*k]))
            .collect();
        let new_idxs: Vec<String> =
            free_a.iter().map(|k| self.indices[*k].clone())
            .chain(free_b.iter().map(|k| rhs.indices[*k].clone()))
            .collect();
        let c: nd::ArrayD<C64> = c.into_shape(new_shape)?;
        Ok(Self { indices: new_idxs, data: c })
    }

    /// Sum over the diagonal of two equal-dimension indices, removing both.
    pub fn trace_pair(&self, a: &str, b: &str) -> TensorResult<Tensor> {
        let k_a = self.pos_or_err(a)?;
        let k_b = self.pos_or_err(b)?;
        let (d_a, d_b) = (self.data.shape()[k_a], self.data.shape()[k_b]);
        if d_a != d_b {
            return Err(TensorError::DimMismatch(b.to_string(), d_a, d_b));
        }
        let rest: Vec<usize> =
            (0..self.rank()).filter(|k| *k != k_a && *k != k_b).collect();
        let rest_shape: Vec<usize> =
            rest.iter().map(|k| self.data.shape()[*k]).collect();
        let rest_dim: usize = rest_shape.iter().product();
        let perm: Vec<usize> =
            rest.iter().copied().chain([k_a, k_b]).collect();
        let m: nd::Array3<C64> =
            self.data.view()
            .permuted_axes(perm.as_slice())
            .as_standard_layout()
            .into_owned()
            .into_shape((rest_dim, d_a, d_a))?;
        let diag: nd::Array1<C64> =
            (0..d_a)
            .map(|s| m.slice(nd::s![.., s, s]).to_owned())
            .fold(nd::Array1::zeros(rest_dim), |acc, col| acc + col);
        let indices: Vec<String> =
            rest.iter().map(|k| self.indices[*k].clone()).collect();
        Ok(Self { indices, data: diag.into_shape(rest_shape)? })
    }

    /// Fuse `self` into a matrix whose rows range over `rows` (in the given
    /// order) and whose columns range over all remaining indices (in their
    /// current order).
    ///
    /// The legs of both fused spaces are returned alongside the matrix so that
    /// factors can be unfused with [`Self::from_matrix`].
    pub fn to_matrix<S>(&self, rows: &[S])
        -> TensorResult<(nd::Array2<C64>, Vec<Leg>, Vec<Leg>)>
    where S: AsRef<str>
    {
        let row_pos: Vec<usize> =
            rows.iter()
            .map(|idx| self.pos_or_err(idx.as_ref()))
            .collect::<TensorResult<Vec<usize>>>()?;
        let col_pos: Vec<usize> =
            (0..self.rank()).filter(|k| !row_pos.contains(k)).collect();
        let leg = |k: &usize| (self.indices[*k].clone(), self.data.shape()[*k]);
        let row_legs: Vec<Leg> = row_pos.iter().map(leg).collect();
        let col_legs: Vec<Leg> = col_pos.iter().map(leg).collect();
        let nrows: usize = row_legs.iter().map(|(_, d)| d).product();
        let ncols: usize = col_legs.iter().map(|(_, d)| d).product();
        let perm: Vec<usize> =
            row_pos.iter().chain(col_pos.iter()).copied().collect();
        let mat: nd::Array2<C64> =
            self.data.view()
            .permuted_axes(perm.as_slice())
            .as_standard_layout()
            .into_owned()
            .into_shape((nrows, ncols))?;
        Ok((mat, row_legs, col_legs))
    }

    /// Unfuse a matrix into a tensor with the given row and column legs.
    pub fn from_matrix(mat: nd::Array2<C64>, rows: &[Leg], cols: &[Leg])
        -> TensorResult<Self>
    {
        let indices: Vec<String> =
            rows.iter().chain(cols).map(|(idx, _)| idx.clone()).collect();
        if let Some(dup) = indices.iter().duplicates().next() {
            return Err(TensorError::DuplicateIndex(dup.clone()));
        }
        let shape: Vec<usize> = rows.iter().chain(cols).map(|(_, d)| *d).collect();
        let data: nd::ArrayD<C64> =
            mat.as_standard_layout().into_owned().into_shape(shape)?;
        Ok(Self { indices, data })
    }

    /// Unwrap `self` into a list of indices and an ordinary N-dimensional
    /// array.
    pub fn into_raw(self) -> (Vec<String>, nd::ArrayD<C64>) {
        (self.indices, self.data)
    }

    /// Return `true` if `self` and `other` denote the same tensor, up to an
    /// optional threshold.
    ///
    /// Indices must match as a set; `other` is permuted to the index order of
    /// `self` before comparison. The modulus of the difference between any two
    /// corresponding elements must be less than `thresh`, which defaults to
    /// `1e-12`.
    pub fn approx_eq(&self, other: &Self, thresh: Option<f64>) -> bool {
        let eps = thresh.unwrap_or(1e-12);
        let mut other = other.clone();
        if other.transpose_to(self.indices.as_slice()).is_err() { return false; }
        self.data.shape() == other.data.shape()
            && self.data.iter().zip(other.data.iter())
                .all(|(l, r)| (*l - *r).norm() < eps)
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.data)?;
        write!(f, "\n{{ {} }}", self.indices.iter().join(", "))
    }
}
