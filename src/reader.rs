//! The public read API over one Zarr V2 array.

use log::debug;

use crate::chunk_grid::{Region, grid_shape};
use crate::codec::Compressor;
use crate::error::{Error, RequestError, Result};
use crate::metadata::{ArrayMetadata, ZARRAY_KEY};
use crate::options::ReadOptions;
use crate::region::ChunkSource;
use crate::storage::ChunkStore;

/// Reads a Zarr V2 array from a [`ChunkStore`].
///
/// All returned buffers are flat, row-major, and hold elements in the
/// array's own encoding (see [`ArrayMetadata::data_type`]).
/// Use [`crate::data_type::elements`] for a typed view.
///
/// Reads take `&self` and may run concurrently; only the batch cursor needs `&mut self`.
pub struct Reader<S> {
    store: S,
    metadata: ArrayMetadata,
    compressor: Option<Compressor>,
    options: ReadOptions,
    batch_position: usize,
}

impl<S: ChunkStore> Reader<S> {
    /// Open the array whose `.zarray` is at the root of `store`.
    ///
    /// # Errors
    /// Returns [`Error::MissingMetadata`] if there is no `.zarray`,
    /// or an error if it cannot be fetched, parsed or validated.
    pub fn open(store: S) -> Result<Self> {
        let bytes = store
            .get(ZARRAY_KEY)
            .map_err(|e| Error::storage(ZARRAY_KEY, e))?
            .ok_or_else(|| Error::MissingMetadata(ZARRAY_KEY.to_string()))?;
        let metadata = ArrayMetadata::from_json(&bytes)?;
        Self::new(store, metadata)
    }

    /// Read an array described by already-parsed `metadata`.
    ///
    /// # Errors
    /// Returns [`Error::Codec`] if the compressor is unsupported or misconfigured.
    pub fn new(store: S, metadata: ArrayMetadata) -> Result<Self> {
        let compressor = metadata
            .compressor()
            .map(Compressor::from_metadata)
            .transpose()?;
        debug!(
            "opened array: shape {:?}, chunks {:?}, dtype {}, compressor {}",
            metadata.shape(),
            metadata.chunk_shape(),
            metadata.data_type(),
            compressor.as_ref().map_or("none", Compressor::id),
        );
        Ok(Self {
            store,
            metadata,
            compressor,
            options: ReadOptions::default(),
            batch_position: 0,
        })
    }

    /// Use `options` for reads without explicit options.
    #[must_use]
    pub fn with_options(mut self, options: ReadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ReadOptions {
        &self.options
    }

    pub fn metadata(&self) -> &ArrayMetadata {
        &self.metadata
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn source(&self) -> ChunkSource<'_, S> {
        ChunkSource {
            store: &self.store,
            metadata: &self.metadata,
            compressor: self.compressor.as_ref(),
        }
    }

    /// Read the whole array.
    ///
    /// # Errors
    /// Returns an error if any chunk cannot be fetched or decoded.
    pub fn read_full(&self) -> Result<Vec<u8>> {
        self.read_full_opt(&self.options)
    }

    /// Explicit options version of [`read_full`](Reader::read_full).
    #[allow(clippy::missing_errors_doc)]
    pub fn read_full_opt(&self, options: &ReadOptions) -> Result<Vec<u8>> {
        self.read(&Region::full(self.metadata.shape()), options)
    }

    /// Read the block of `shape` elements starting at `start`.
    ///
    /// # Errors
    /// Returns [`Error::Request`] without touching the store if the region
    /// is not inside the array, or an error if any chunk cannot be fetched or decoded.
    pub fn read_region(&self, start: &[usize], shape: &[usize]) -> Result<Vec<u8>> {
        self.read_region_opt(start, shape, &self.options)
    }

    /// Explicit options version of [`read_region`](Reader::read_region).
    #[allow(clippy::missing_errors_doc)]
    pub fn read_region_opt(
        &self,
        start: &[usize],
        shape: &[usize],
        options: &ReadOptions,
    ) -> Result<Vec<u8>> {
        let region = Region::new(start.to_vec(), shape.to_vec())?;
        self.read(&region, options)
    }

    fn read(&self, region: &Region, options: &ReadOptions) -> Result<Vec<u8>> {
        self.source().read_region(region, options)
    }

    /// Decode one chunk, as stored: nominal chunk shape, in the array's memory order.
    ///
    /// A missing chunk reads as zeros.
    ///
    /// # Errors
    /// Returns [`RequestError::InvalidChunkCoordinate`] if `coord` is outside the chunk grid.
    pub fn read_chunk(&self, coord: &[usize]) -> Result<Vec<u8>> {
        self.read_chunk_opt(coord, &self.options)
    }

    /// Explicit options version of [`read_chunk`](Reader::read_chunk).
    #[allow(clippy::missing_errors_doc)]
    pub fn read_chunk_opt(&self, coord: &[usize], options: &ReadOptions) -> Result<Vec<u8>> {
        let grid = grid_shape(self.metadata.shape(), self.metadata.chunk_shape());
        if coord.len() != grid.len() {
            return Err(RequestError::DimensionalityMismatch {
                expected: grid.len(),
                got: coord.len(),
            }
            .into());
        }
        if coord.iter().zip(&grid).any(|(c, g)| c >= g) {
            return Err(RequestError::InvalidChunkCoordinate {
                coord: coord.to_vec(),
                grid,
            }
            .into());
        }
        Ok(match self.source().retrieve(coord, options)? {
            Some(chunk) => chunk.to_vec(),
            None => vec![0; self.metadata.chunk_byte_size()],
        })
    }

    /// Read the next `n` rows along the first axis, or fewer at the end of the array.
    ///
    /// Returns `Ok(None)` once every row has been read.
    /// The cursor only advances when a batch is read successfully.
    ///
    /// # Errors
    /// Returns [`RequestError::NotBatchable`] for a zero-dimensional array,
    /// [`RequestError::ZeroBatchSize`] if `n` is 0, or an error if any chunk
    /// cannot be fetched or decoded.
    pub fn next_batch(&mut self, n: usize) -> Result<Option<Vec<u8>>> {
        let options = self.options.clone();
        self.next_batch_opt(n, &options)
    }

    /// Explicit options version of [`next_batch`](Reader::next_batch).
    #[allow(clippy::missing_errors_doc)]
    pub fn next_batch_opt(&mut self, n: usize, options: &ReadOptions) -> Result<Option<Vec<u8>>> {
        let Some((region, rows)) = self.batch_region(self.batch_position, n)? else {
            return Ok(None);
        };
        let out = self.read(&region, options)?;
        self.batch_position += rows;
        Ok(Some(out))
    }

    /// The first-axis index the next batch starts at.
    pub fn batch_position(&self) -> usize {
        self.batch_position
    }

    /// Rewind the batch cursor to the first row.
    pub fn reset_batches(&mut self) {
        self.batch_position = 0;
    }

    /// Iterate over the array in batches of `n` rows, from the first row.
    ///
    /// Independent of the [`next_batch`](Reader::next_batch) cursor.
    /// Iteration stops after the first error.
    ///
    /// # Errors
    /// Returns [`RequestError::NotBatchable`] for a zero-dimensional array,
    /// or [`RequestError::ZeroBatchSize`] if `n` is 0.
    pub fn batches(&self, n: usize) -> Result<Batches<'_, S>> {
        self.batch_region(0, n)?;
        Ok(Batches {
            reader: self,
            n,
            position: 0,
            failed: false,
        })
    }

    fn batch_region(&self, position: usize, n: usize) -> Result<Option<(Region, usize)>> {
        let shape = self.metadata.shape();
        let Some((&len, rest)) = shape.split_first() else {
            return Err(RequestError::NotBatchable.into());
        };
        if n == 0 {
            return Err(RequestError::ZeroBatchSize.into());
        }
        if position >= len {
            return Ok(None);
        }
        let rows = n.min(len - position);
        let mut start = vec![0; shape.len()];
        start[0] = position;
        let mut region_shape = Vec::with_capacity(shape.len());
        region_shape.push(rows);
        region_shape.extend_from_slice(rest);
        Ok(Some((Region::new(start, region_shape)?, rows)))
    }

    /// Release the store.
    pub fn close(self) {
        debug!("closing array reader");
    }
}

#[cfg(feature = "filesystem")]
impl Reader<crate::storage::ZarrsStore<zarrs::filesystem::FilesystemStore>> {
    /// Open the array in the directory at `path`.
    ///
    /// # Errors
    /// Returns [`Error::Storage`] if `path` is not a usable directory,
    /// otherwise as [`Reader::open`].
    pub fn open_filesystem(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let store = zarrs::filesystem::FilesystemStore::new(path).map_err(|e| {
            Error::storage(
                path.display().to_string(),
                zarrs::storage::StorageError::Other(e.to_string()),
            )
        })?;
        Self::open(crate::storage::ZarrsStore::new(store))
    }
}

/// Batches of rows along the first axis, from [`Reader::batches`].
pub struct Batches<'a, S> {
    reader: &'a Reader<S>,
    n: usize,
    position: usize,
    failed: bool,
}

impl<S: ChunkStore> Iterator for Batches<'_, S> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let result = self
            .reader
            .batch_region(self.position, self.n)
            .and_then(|batch| {
                batch
                    .map(|(region, rows)| {
                        self.reader
                            .read(&region, &self.reader.options)
                            .map(|out| (out, rows))
                    })
                    .transpose()
            });
        match result {
            Ok(Some((out, rows))) => {
                self.position += rows;
                Some(Ok(out))
            }
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
