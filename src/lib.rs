//! Read-only access to Zarr V2 arrays.
//!
//! A [`Reader`] opens the `.zarray` descriptor of an array in any
//! [`ChunkStore`](storage::ChunkStore), then reads the whole array, an
//! axis-aligned region, single chunks, or successive batches of rows.
//! Chunks which are not stored read as the array's fill value.
//!
//! ```no_run
//! use zarrs::filesystem::FilesystemStore;
//! use zarrs_v2_reader::{Reader, storage::ZarrsStore};
//!
//! let store = ZarrsStore::new(FilesystemStore::new("data")?).with_prefix("group/array");
//! let reader = Reader::open(store)?;
//! let block = reader.read_region(&[0, 0], &[16, 16])?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
mod chunk;
pub mod chunk_grid;
pub mod chunk_key_encoding;
pub mod codec;
pub mod data_type;
mod error;
pub mod metadata;
pub mod options;
mod reader;
mod region;
pub mod storage;

pub use zarrs;

pub use error::{CodecError, ConfigurationError, Error, RequestError, Result};
pub use options::{CancellationToken, ReadOptions};
pub use reader::{Batches, Reader};
