//! Lazily generated matrices and vectors with explicit forgetting
//!
//! Entries are produced by a user-supplied generator on first access and
//! cached until [`OnDemandMatrix::forget`] (or [`OnDemandVector::forget`])
//! evicts them. Generators must be pure: a forgotten entry is regenerated
//! on the next access and any earlier mutation of it is lost.
//!
//! The caches use `RefCell`, so containers are not `Sync`. Generators are
//! shared behind `Arc` and may be cloned freely.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use mdarray::DTensor;

use crate::matrix::{MomentMatrix, WeightSource};

/// Generator of one row or column of an on-demand matrix
pub type SliceGenerator = Arc<dyn Fn(usize) -> Vec<f64> + Send + Sync>;

/// Generator of one entry of an on-demand vector
pub type ElementGenerator = Arc<dyn Fn(usize) -> f64 + Send + Sync>;

/// Which slices the generator of an [`OnDemandMatrix`] produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// `generator(i)` is row `i`
    ByRows,
    /// `generator(j)` is column `j`
    ByColumns,
}

impl Orientation {
    fn flipped(self) -> Self {
        match self {
            Orientation::ByRows => Orientation::ByColumns,
            Orientation::ByColumns => Orientation::ByRows,
        }
    }
}

/// Matrix whose rows (or columns) are generated on demand
///
/// Reads along the generator's orientation are cached. Reads across it
/// (a column of a by-rows matrix, say) use cached slices where present and
/// call the generator for the rest without caching.
pub struct OnDemandMatrix {
    nrows: usize,
    ncols: usize,
    orientation: Orientation,
    generator: SliceGenerator,
    cache: RefCell<HashMap<usize, Vec<f64>>>,
}

impl OnDemandMatrix {
    /// Matrix of shape `nrows × ncols` with `generator(i)` giving row `i`
    pub fn by_rows<F>(nrows: usize, ncols: usize, generator: F) -> Self
    where
        F: Fn(usize) -> Vec<f64> + Send + Sync + 'static,
    {
        Self::with_generator(nrows, ncols, Orientation::ByRows, Arc::new(generator))
    }

    /// Matrix of shape `nrows × ncols` with `generator(j)` giving column `j`
    ///
    /// A single row of such a matrix is gathered from every column, so
    /// reading it calls the generator `ncols` times. Prefer a by-rows
    /// generator for tall matrices that are downdated row by row; whole
    /// submatrices still read each column only once.
    pub fn by_columns<F>(nrows: usize, ncols: usize, generator: F) -> Self
    where
        F: Fn(usize) -> Vec<f64> + Send + Sync + 'static,
    {
        Self::with_generator(nrows, ncols, Orientation::ByColumns, Arc::new(generator))
    }

    /// Matrix sharing an existing generator
    pub fn with_generator(
        nrows: usize,
        ncols: usize,
        orientation: Orientation,
        generator: SliceGenerator,
    ) -> Self {
        Self {
            nrows,
            ncols,
            orientation,
            generator,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    /// Number of slices along the orientation, and the length of each
    fn extents(&self) -> (usize, usize) {
        match self.orientation {
            Orientation::ByRows => (self.nrows, self.ncols),
            Orientation::ByColumns => (self.ncols, self.nrows),
        }
    }

    fn generate(&self, k: usize) -> Vec<f64> {
        let (count, len) = self.extents();
        assert!(k < count, "slice index {} out of bounds for {}", k, count);
        let slice = (self.generator)(k);
        assert_eq!(
            slice.len(),
            len,
            "generator returned {} entries for slice {}, expected {}",
            slice.len(),
            k,
            len
        );
        slice
    }

    /// Slice `k` along the orientation, materialized and cached
    fn slice(&self, k: usize) -> Vec<f64> {
        if let Some(cached) = self.cache.borrow().get(&k) {
            return cached.clone();
        }
        let slice = self.generate(k);
        self.cache.borrow_mut().insert(k, slice.clone());
        slice
    }

    /// Slice `k` along the orientation without adding it to the cache
    fn peek(&self, k: usize) -> Vec<f64> {
        if let Some(cached) = self.cache.borrow().get(&k) {
            return cached.clone();
        }
        self.generate(k)
    }

    /// Entry `i` of every slice along the orientation
    fn across(&self, i: usize) -> Vec<f64> {
        let (count, _) = self.extents();
        (0..count).map(|k| self.peek(k)[i]).collect()
    }

    pub fn row(&self, i: usize) -> Vec<f64> {
        assert!(i < self.nrows, "row {} out of bounds for {}", i, self.nrows);
        match self.orientation {
            Orientation::ByRows => self.slice(i),
            Orientation::ByColumns => self.across(i),
        }
    }

    pub fn column(&self, j: usize) -> Vec<f64> {
        assert!(j < self.ncols, "column {} out of bounds for {}", j, self.ncols);
        match self.orientation {
            Orientation::ByRows => self.across(j),
            Orientation::ByColumns => self.slice(j),
        }
    }

    /// Element (i, j); materializes the slice that contains it
    pub fn get(&self, i: usize, j: usize) -> f64 {
        match self.orientation {
            Orientation::ByRows => self.slice(i)[j],
            Orientation::ByColumns => self.slice(j)[i],
        }
    }

    /// Evict slice `k` along the orientation; no-op if absent
    pub fn forget(&self, k: usize) {
        self.cache.borrow_mut().remove(&k);
    }

    pub fn forget_all(&self) {
        self.cache.borrow_mut().clear();
    }

    pub fn is_stored(&self, k: usize) -> bool {
        self.cache.borrow().contains_key(&k)
    }

    /// Number of currently materialized slices
    pub fn stored_count(&self) -> usize {
        self.cache.borrow().len()
    }

    /// Transpose without copying: the orientation flips and the shape swaps
    ///
    /// Rows of a by-rows matrix become columns of the result, so cached
    /// slices stay valid.
    pub fn transpose(self) -> Self {
        Self {
            nrows: self.ncols,
            ncols: self.nrows,
            orientation: self.orientation.flipped(),
            generator: self.generator,
            cache: self.cache,
        }
    }
}

impl fmt::Debug for OnDemandMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnDemandMatrix")
            .field("nrows", &self.nrows)
            .field("ncols", &self.ncols)
            .field("orientation", &self.orientation)
            .field("stored", &self.stored_count())
            .finish()
    }
}

impl MomentMatrix for OnDemandMatrix {
    fn nrows(&self) -> usize {
        self.nrows
    }

    fn ncols(&self) -> usize {
        self.ncols
    }

    fn row(&self, i: usize) -> Vec<f64> {
        OnDemandMatrix::row(self, i)
    }

    fn column(&self, j: usize) -> Vec<f64> {
        OnDemandMatrix::column(self, j)
    }

    fn forget_row(&self, i: usize) {
        if self.orientation == Orientation::ByRows {
            self.forget(i);
        }
    }

    fn forget_column(&self, j: usize) {
        if self.orientation == Orientation::ByColumns {
            self.forget(j);
        }
    }

    fn peek_row(&self, i: usize) -> Vec<f64> {
        assert!(i < self.nrows, "row {} out of bounds for {}", i, self.nrows);
        match self.orientation {
            Orientation::ByRows => self.peek(i),
            Orientation::ByColumns => self.across(i),
        }
    }

    fn peek_column(&self, j: usize) -> Vec<f64> {
        assert!(j < self.ncols, "column {} out of bounds for {}", j, self.ncols);
        match self.orientation {
            Orientation::ByRows => self.across(j),
            Orientation::ByColumns => self.peek(j),
        }
    }

    // Each column of a by-columns matrix is generated once, uncached, and
    // gathered at the requested rows.
    fn submatrix(&self, indices: &[usize]) -> DTensor<f64, 2> {
        match self.orientation {
            Orientation::ByRows => {
                let rows: Vec<Vec<f64>> = indices.iter().map(|&i| self.row(i)).collect();
                DTensor::<f64, 2>::from_fn([indices.len(), self.ncols], |idx| rows[idx[0]][idx[1]])
            }
            Orientation::ByColumns => {
                for &i in indices {
                    assert!(i < self.nrows, "row {} out of bounds for {}", i, self.nrows);
                }
                let columns: Vec<Vec<f64>> = (0..self.ncols).map(|j| self.peek(j)).collect();
                DTensor::<f64, 2>::from_fn([indices.len(), self.ncols], |idx| {
                    columns[idx[1]][indices[idx[0]]]
                })
            }
        }
    }

    // Streams slices through the generator so that a full pass does not
    // populate the cache.
    fn weighted_column_sums(&self, indices: &[usize], weights: &[f64]) -> Vec<f64> {
        assert_eq!(
            indices.len(),
            weights.len(),
            "indices.len()={} must equal weights.len()={}",
            indices.len(),
            weights.len()
        );

        match self.orientation {
            Orientation::ByRows => {
                let mut sums = vec![0.0; self.ncols];
                for (&i, &w) in indices.iter().zip(weights.iter()) {
                    if w == 0.0 {
                        continue;
                    }
                    for (s, x) in sums.iter_mut().zip(self.peek(i)) {
                        *s += w * x;
                    }
                }
                sums
            }
            Orientation::ByColumns => (0..self.ncols)
                .map(|j| {
                    let column = self.peek(j);
                    indices
                        .iter()
                        .zip(weights.iter())
                        .map(|(&i, &w)| column[i] * w)
                        .sum::<f64>()
                })
                .collect(),
        }
    }
}

/// Vector whose entries are generated on demand
///
/// [`set`](OnDemandVector::set) writes only to the cache; forgetting the
/// entry restores the generated value.
pub struct OnDemandVector {
    len: usize,
    generator: ElementGenerator,
    cache: RefCell<HashMap<usize, f64>>,
}

impl OnDemandVector {
    pub fn new<F>(len: usize, generator: F) -> Self
    where
        F: Fn(usize) -> f64 + Send + Sync + 'static,
    {
        Self::with_generator(len, Arc::new(generator))
    }

    pub fn with_generator(len: usize, generator: ElementGenerator) -> Self {
        Self {
            len,
            generator,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, i: usize) -> f64 {
        assert!(i < self.len, "index {} out of bounds for {}", i, self.len);
        *self
            .cache
            .borrow_mut()
            .entry(i)
            .or_insert_with(|| (self.generator)(i))
    }

    /// Entry `i` without caching it; a stored entry is returned as is
    pub fn peek(&self, i: usize) -> f64 {
        assert!(i < self.len, "index {} out of bounds for {}", i, self.len);
        if let Some(&stored) = self.cache.borrow().get(&i) {
            return stored;
        }
        (self.generator)(i)
    }

    pub fn set(&self, i: usize, value: f64) {
        assert!(i < self.len, "index {} out of bounds for {}", i, self.len);
        self.cache.borrow_mut().insert(i, value);
    }

    pub fn forget(&self, i: usize) {
        self.cache.borrow_mut().remove(&i);
    }

    pub fn stored_count(&self) -> usize {
        self.cache.borrow().len()
    }
}

impl fmt::Debug for OnDemandVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnDemandVector")
            .field("len", &self.len)
            .field("stored", &self.stored_count())
            .finish()
    }
}

impl WeightSource for OnDemandVector {
    fn len(&self) -> usize {
        self.len
    }

    fn get(&self, i: usize) -> f64 {
        OnDemandVector::get(self, i)
    }

    fn peek(&self, i: usize) -> f64 {
        OnDemandVector::peek(self, i)
    }

    fn forget(&self, i: usize) {
        OnDemandVector::forget(self, i);
    }
}

#[cfg(test)]
#[path = "ondemand_tests.rs"]
mod tests;
