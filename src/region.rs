//! Reading an axis-aligned region by stitching together the chunks that cover it.
//!
//! Chunks are fetched, decoded and copied independently. Distinct chunks
//! intersect a region in disjoint sub-volumes, so chunk copies write disjoint
//! byte ranges of the output and may run in parallel.

use std::cmp::Ordering;

use bytes::Bytes;
use log::{debug, trace, warn};
use rayon::prelude::*;
use unsafe_cell_slice::UnsafeCellSlice;

use crate::chunk_grid::{Region, chunk_coverage, chunks_in_region};
use crate::chunk_key_encoding::chunk_key;
use crate::codec::{Compressor, decompress};
use crate::error::{CodecError, Error, RequestError, Result};
use crate::metadata::{ArrayMetadata, Order};
use crate::options::ReadOptions;
use crate::storage::ChunkStore;

/// An array's chunks: where they live and how to decode them.
pub(crate) struct ChunkSource<'a, S: ?Sized> {
    pub(crate) store: &'a S,
    pub(crate) metadata: &'a ArrayMetadata,
    pub(crate) compressor: Option<&'a Compressor>,
}

impl<S: ChunkStore + ?Sized> ChunkSource<'_, S> {
    /// Fetch and decode the chunk at `coord`.
    ///
    /// Returns `None` if the chunk is not stored. A decoded chunk always holds
    /// exactly one nominal chunk of elements.
    pub(crate) fn retrieve(&self, coord: &[usize], options: &ReadOptions) -> Result<Option<Bytes>> {
        if options.is_aborted() {
            return Err(Error::Cancelled);
        }
        let key = chunk_key(coord, self.metadata.dimension_separator());
        let Some(encoded) = self
            .store
            .get(&key)
            .map_err(|e| Error::storage(key.as_str(), e))?
        else {
            trace!("chunk {key} missing");
            return Ok(None);
        };
        let encoded_len = encoded.len();
        let mut decoded = decompress(self.compressor, encoded)?;

        let expected = self.metadata.chunk_byte_size();
        match decoded.len().cmp(&expected) {
            Ordering::Less => {
                return Err(CodecError::UnexpectedSize {
                    key,
                    expected,
                    actual: decoded.len(),
                }
                .into());
            }
            Ordering::Greater => {
                warn!(
                    "chunk {key} decoded to {} bytes, truncating to {expected}",
                    decoded.len()
                );
                decoded.truncate(expected);
            }
            Ordering::Equal => {}
        }
        trace!("chunk {key}: {encoded_len} -> {expected} bytes");
        Ok(Some(decoded))
    }

    /// Read `region` into a new row-major buffer.
    ///
    /// The region is validated before any chunk is fetched.
    /// Missing chunks leave their part of the output at the fill value.
    /// Any failure aborts the read.
    pub(crate) fn read_region(&self, region: &Region, options: &ReadOptions) -> Result<Vec<u8>> {
        let metadata = self.metadata;
        region.validate(metadata.shape())?;

        let size = metadata.element_size();
        let len = region
            .num_elements()
            .and_then(|n| n.checked_mul(size))
            .ok_or_else(|| RequestError::RegionTooLarge {
                shape: region.shape().to_vec(),
            })?;
        if len == 0 {
            return Ok(Vec::new());
        }
        let mut out = vec![0u8; len];
        let fill = metadata.fill_element();
        if fill.iter().any(|&b| b != 0) {
            for element in out.chunks_exact_mut(size) {
                element.copy_from_slice(fill);
            }
        }

        if region.rank() == 0 {
            if let Some(chunk) = self.retrieve(&[], options)? {
                out.copy_from_slice(&chunk);
            }
            return Ok(out);
        }

        let chunk_shape = metadata.chunk_shape();
        let chunks = chunks_in_region(region, chunk_shape);
        let coords: Vec<Vec<usize>> = chunks.indices().collect();
        debug!(
            "reading region {:?}+{:?} from {} chunk(s)",
            region.start(),
            region.shape(),
            coords.len()
        );

        let src_strides = match metadata.order() {
            Order::RowMajor => row_major_strides(chunk_shape),
            Order::ColumnMajor => column_major_strides(chunk_shape),
        };
        let dst_strides = row_major_strides(region.shape());

        {
            let out_slice = UnsafeCellSlice::new(&mut out);
            let copy_chunk = |coord: &Vec<usize>| -> Result<()> {
                let Some(chunk) = self.retrieve(coord, options)? else {
                    return Ok(());
                };
                let coverage = chunk_coverage(coord, chunk_shape, metadata.shape());
                let Some(overlap) = coverage.overlap(region) else {
                    return Ok(());
                };
                copy_strided(
                    &chunk,
                    &Strided {
                        strides: &src_strides,
                        offset: &overlap.offset_from(coverage.start()),
                    },
                    &Strided {
                        strides: &dst_strides,
                        offset: &overlap.offset_from(region.start()),
                    },
                    overlap.shape(),
                    size,
                    |range, bytes| {
                        // SAFETY: chunks intersect the region in disjoint sub-volumes
                        unsafe { out_slice.index_mut(range).copy_from_slice(bytes) }
                    },
                );
                Ok(())
            };

            let concurrent_target = options.concurrent_target();
            if concurrent_target <= 1 || coords.len() <= 1 {
                coords.iter().try_for_each(copy_chunk)?;
            } else {
                let per_task = coords.len().div_ceil(concurrent_target);
                coords
                    .par_chunks(per_task)
                    .try_for_each(|group| group.iter().try_for_each(&copy_chunk))?;
            }
        }
        Ok(out)
    }
}

/// Element strides of a row-major (C order) buffer of `shape`.
pub(crate) fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for axis in (1..shape.len()).rev() {
        strides[axis - 1] = strides[axis] * shape[axis];
    }
    strides
}

/// Element strides of a column-major (F order) buffer of `shape`.
pub(crate) fn column_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for axis in 1..shape.len() {
        strides[axis] = strides[axis - 1] * shape[axis - 1];
    }
    strides
}

/// Placement of a sub-volume within a buffer, in elements.
pub(crate) struct Strided<'a> {
    pub(crate) strides: &'a [usize],
    pub(crate) offset: &'a [usize],
}

impl Strided<'_> {
    fn element_index(&self, outer: &[usize]) -> usize {
        outer
            .iter()
            .zip(self.offset)
            .zip(self.strides)
            .map(|((i, o), s)| (i + o) * s)
            .sum()
    }
}

/// Copy a sub-volume of `extent` elements from `src` to a destination.
///
/// Each copied run is passed to `write` with its destination byte range.
/// Along the innermost axis, whole rows are copied at once when both sides are contiguous.
pub(crate) fn copy_strided(
    src: &[u8],
    src_layout: &Strided,
    dst_layout: &Strided,
    extent: &[usize],
    element_size: usize,
    mut write: impl FnMut(std::ops::Range<usize>, &[u8]),
) {
    let Some((&inner, outer)) = extent.split_last() else {
        return;
    };
    let rank = extent.len();
    let src_inner = src_layout.strides[rank - 1];
    let dst_inner = dst_layout.strides[rank - 1];
    let contiguous = src_inner == 1 && dst_inner == 1;

    for index in Region::full(outer).indices() {
        let mut outer_index = index;
        outer_index.push(0);
        let src_start = src_layout.element_index(&outer_index) * element_size;
        let dst_start = dst_layout.element_index(&outer_index) * element_size;
        if contiguous {
            let len = inner * element_size;
            write(dst_start..dst_start + len, &src[src_start..src_start + len]);
        } else {
            for i in 0..inner {
                let s = src_start + i * src_inner * element_size;
                let d = dst_start + i * dst_inner * element_size;
                write(d..d + element_size, &src[s..s + element_size]);
            }
        }
    }
}
