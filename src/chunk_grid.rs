//! Regular chunk grid arithmetic.
//!
//! Chunks along an axis start at multiples of the chunk size;
//! the last chunk along an axis is clipped to the array shape.

use crate::error::RequestError;

/// Product of `values`, or `None` if it overflows `usize`.
pub(crate) fn checked_product(values: &[usize]) -> Option<usize> {
    values.iter().try_fold(1usize, |acc, &v| acc.checked_mul(v))
}

/// Number of chunks along each axis, `ceil(shape / chunk_shape)`.
///
/// Empty for a zero-dimensional array, which has a single chunk.
pub fn grid_shape(shape: &[usize], chunk_shape: &[usize]) -> Vec<usize> {
    shape
        .iter()
        .zip(chunk_shape)
        .map(|(&s, &c)| s.div_ceil(c))
        .collect()
}

/// The part of the array covered by the chunk at `coord`.
///
/// The extent of a trailing chunk is clipped to `shape`, so it may be shorter than `chunk_shape`.
pub fn chunk_coverage(coord: &[usize], chunk_shape: &[usize], shape: &[usize]) -> Region {
    let (start, extent) = coord
        .iter()
        .zip(chunk_shape)
        .zip(shape)
        .map(|((&c, &cs), &s)| {
            let start = c * cs;
            let end = (start + cs).min(s);
            (start, end.saturating_sub(start))
        })
        .unzip();
    Region {
        start,
        shape: extent,
    }
}

/// The chunk coordinates intersecting `region`, as a region of the chunk grid.
///
/// `region` must be non-empty along every axis.
pub fn chunks_in_region(region: &Region, chunk_shape: &[usize]) -> Region {
    let (start, shape) = region
        .start
        .iter()
        .zip(&region.shape)
        .zip(chunk_shape)
        .map(|((&s, &n), &cs)| {
            let min = s / cs;
            let max = (s + n - 1) / cs;
            (min, max - min + 1)
        })
        .unzip();
    Region { start, shape }
}

/// An axis-aligned block: `start` and `shape` per axis.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Region {
    start: Vec<usize>,
    shape: Vec<usize>,
}

impl Region {
    /// # Errors
    /// Returns [`RequestError::DimensionalityMismatch`] if `start` and `shape` differ in length.
    pub fn new(start: Vec<usize>, shape: Vec<usize>) -> Result<Self, RequestError> {
        if start.len() != shape.len() {
            return Err(RequestError::DimensionalityMismatch {
                expected: start.len(),
                got: shape.len(),
            });
        }
        Ok(Self { start, shape })
    }

    /// The whole of an array with `shape`.
    pub fn full(shape: &[usize]) -> Self {
        Self {
            start: vec![0; shape.len()],
            shape: shape.to_vec(),
        }
    }

    pub fn start(&self) -> &[usize] {
        &self.start
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Exclusive end along each axis.
    pub fn end(&self) -> Vec<usize> {
        self.start
            .iter()
            .zip(&self.shape)
            .map(|(s, n)| s + n)
            .collect()
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements, or `None` if it exceeds `usize`.
    pub fn num_elements(&self) -> Option<usize> {
        checked_product(&self.shape)
    }

    /// Check the region is inside an array of `array_shape`.
    ///
    /// A region may only be empty along an axis where the array is empty.
    ///
    /// # Errors
    /// Returns [`RequestError`] if the rank differs, an axis is empty
    /// where the array is not, or the region extends past the array.
    pub fn validate(&self, array_shape: &[usize]) -> Result<(), RequestError> {
        if self.rank() != array_shape.len() {
            return Err(RequestError::DimensionalityMismatch {
                expected: array_shape.len(),
                got: self.rank(),
            });
        }
        for (axis, ((&start, &shape), &array_shape)) in self
            .start
            .iter()
            .zip(&self.shape)
            .zip(array_shape)
            .enumerate()
        {
            if shape == 0 && array_shape != 0 {
                return Err(RequestError::EmptyRegion { axis });
            }
            if start.checked_add(shape).is_none_or(|end| end > array_shape) {
                return Err(RequestError::OutOfBounds {
                    axis,
                    start,
                    shape,
                    array_shape,
                });
            }
        }
        Ok(())
    }

    /// The intersection of two regions, or `None` if they are disjoint along any axis.
    pub fn overlap(&self, other: &Region) -> Option<Region> {
        let mut start = Vec::with_capacity(self.rank());
        let mut shape = Vec::with_capacity(self.rank());
        for ((&a_start, a_end), (&b_start, b_end)) in self
            .start
            .iter()
            .zip(self.end())
            .zip(other.start.iter().zip(other.end()))
        {
            let lo = a_start.max(b_start);
            let hi = a_end.min(b_end);
            if lo >= hi {
                return None;
            }
            start.push(lo);
            shape.push(hi - lo);
        }
        Some(Region { start, shape })
    }

    /// This region's start, offset so that `origin` is the zero point.
    ///
    /// `origin` must not exceed `start` along any axis.
    pub fn offset_from(&self, origin: &[usize]) -> Vec<usize> {
        self.start.iter().zip(origin).map(|(s, o)| s - o).collect()
    }

    /// Iterate over every index in the region in row-major (lexicographic) order.
    pub fn indices(&self) -> Indices {
        Indices::new(self.start.clone(), self.end())
    }
}

/// Row-major odometer over the indices of a region.
///
/// The last axis turns fastest; a carry resets an axis to its start.
#[derive(Debug, Clone)]
pub struct Indices {
    start: Vec<usize>,
    end: Vec<usize>,
    next: Option<Vec<usize>>,
}

impl Indices {
    fn new(start: Vec<usize>, end: Vec<usize>) -> Self {
        let empty = start.iter().zip(&end).any(|(s, e)| s >= e);
        let next = (!empty).then(|| start.clone());
        Self { start, end, next }
    }
}

impl Iterator for Indices {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        let mut following = current.clone();
        for axis in (0..following.len()).rev() {
            following[axis] += 1;
            if following[axis] < self.end[axis] {
                self.next = Some(following);
                return Some(current);
            }
            following[axis] = self.start[axis];
        }
        Some(current)
    }
}
