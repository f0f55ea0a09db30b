//! Per-chunk decompression, dispatched on the `.zarray` compressor.
//!
//! `null` means chunks are stored raw. Unknown compressor ids are rejected
//! rather than passed through.

use std::ffi::c_void;
use std::io::Read;

use bytes::Bytes;
use log::trace;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chunk::BloscHeader;
use crate::error::CodecError;
use crate::metadata::CompressorMetadata;

/// Compressor ids this reader decodes.
pub const SUPPORTED_COMPRESSORS: &[&str] = &["blosc", "bz2", "gzip", "zlib", "zstd"];

const BLOSC_CNAMES: &[&str] = &["blosclz", "lz4", "lz4hc", "snappy", "zlib", "zstd"];

/// A supported compressor and its configuration.
///
/// Only the frame format matters for decoding; levels are validated but otherwise unused.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "lowercase")]
pub enum Compressor {
    Blosc {
        #[serde(default = "default_blosc_cname")]
        cname: String,
        #[serde(default = "default_blosc_clevel")]
        clevel: u8,
        /// -1 automatic, 0 none, 1 byte shuffle, 2 bit shuffle.
        #[serde(default = "default_blosc_shuffle")]
        shuffle: i8,
        /// 0 means automatic.
        #[serde(default)]
        blocksize: usize,
    },
    Bz2 {
        #[serde(default = "default_bz2_level")]
        level: u32,
    },
    Gzip {
        #[serde(default = "default_deflate_level")]
        level: u32,
    },
    Zlib {
        #[serde(default = "default_deflate_level")]
        level: u32,
    },
    Zstd {
        #[serde(default = "default_zstd_level")]
        level: i32,
        #[serde(default)]
        checksum: bool,
    },
}

fn default_blosc_cname() -> String {
    "lz4".to_string()
}

fn default_blosc_clevel() -> u8 {
    5
}

fn default_blosc_shuffle() -> i8 {
    1
}

fn default_bz2_level() -> u32 {
    9
}

fn default_deflate_level() -> u32 {
    1
}

fn default_zstd_level() -> i32 {
    1
}

impl Compressor {
    /// Resolve a descriptor compressor entry.
    ///
    /// # Errors
    /// Returns [`CodecError::UnsupportedCompressor`] for an unknown id, or
    /// [`CodecError::InvalidConfiguration`] if the fields are invalid for a known one.
    pub fn from_metadata(metadata: &CompressorMetadata) -> Result<Self, CodecError> {
        let id = metadata.id.as_str();
        let Some(&codec) = SUPPORTED_COMPRESSORS.iter().find(|&&c| c == id) else {
            return Err(CodecError::UnsupportedCompressor(id.to_string()));
        };
        let mut object = metadata.configuration.clone();
        object.insert("id".to_string(), Value::from(id));
        let out: Self = serde_json::from_value(Value::Object(object)).map_err(|e| {
            CodecError::InvalidConfiguration {
                codec,
                reason: e.to_string(),
            }
        })?;
        out.validate()?;
        Ok(out)
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::Blosc { .. } => "blosc",
            Self::Bz2 { .. } => "bz2",
            Self::Gzip { .. } => "gzip",
            Self::Zlib { .. } => "zlib",
            Self::Zstd { .. } => "zstd",
        }
    }

    fn validate(&self) -> Result<(), CodecError> {
        let invalid = |reason: String| {
            Err(CodecError::InvalidConfiguration {
                codec: self.id(),
                reason,
            })
        };
        match self {
            Self::Blosc {
                cname,
                clevel,
                shuffle,
                ..
            } => {
                if !BLOSC_CNAMES.contains(&cname.as_str()) {
                    return invalid(format!("unknown cname {cname:?}"));
                }
                if *clevel > 9 {
                    return invalid(format!("clevel {clevel} not in 0..=9"));
                }
                if !(-1..=2).contains(shuffle) {
                    return invalid(format!("shuffle {shuffle} not in -1..=2"));
                }
            }
            Self::Bz2 { level } if !(1..=9).contains(level) => {
                return invalid(format!("level {level} not in 1..=9"));
            }
            Self::Gzip { level } | Self::Zlib { level } if *level > 9 => {
                return invalid(format!("level {level} not in 0..=9"));
            }
            Self::Zstd { level, .. } if *level > 22 => {
                return invalid(format!("level {level} above 22"));
            }
            _ => {}
        }
        Ok(())
    }

    /// Decompress one encoded chunk.
    ///
    /// # Errors
    /// Returns [`CodecError::DecompressionFailed`] if `encoded` is not a valid frame.
    pub fn decode(&self, encoded: &[u8]) -> Result<Vec<u8>, CodecError> {
        let codec = self.id();
        let mut out = Vec::new();
        match self {
            Self::Blosc { .. } => return blosc_decompress(encoded),
            Self::Bz2 { .. } => bzip2::read::BzDecoder::new(encoded).read_to_end(&mut out),
            Self::Gzip { .. } => flate2::read::GzDecoder::new(encoded).read_to_end(&mut out),
            Self::Zlib { .. } => flate2::read::ZlibDecoder::new(encoded).read_to_end(&mut out),
            Self::Zstd { .. } => zstd::stream::read::Decoder::new(encoded)
                .and_then(|mut decoder| decoder.read_to_end(&mut out)),
        }
        .map_err(|e| CodecError::failed(codec, e))?;
        Ok(out)
    }
}

/// Decompress chunk bytes with an optional compressor.
///
/// Raw chunks are returned without copying.
///
/// # Errors
/// Returns [`CodecError::DecompressionFailed`] if decoding fails.
pub fn decompress(compressor: Option<&Compressor>, encoded: Bytes) -> Result<Bytes, CodecError> {
    match compressor {
        None => Ok(encoded),
        Some(c) => c.decode(&encoded).map(Bytes::from),
    }
}

fn blosc_decompress(encoded: &[u8]) -> Result<Vec<u8>, CodecError> {
    let header = BloscHeader::from_bytes(encoded)?;
    trace!(
        "blosc frame v{}: {} -> {} bytes, typesize {}, blocksize {}, shuffle {:?}, memcpyed {}",
        header.version,
        header.cbytes,
        header.nbytes,
        header.typesize,
        header.blocksize,
        header.shuffle(),
        header.memcpyed()
    );

    let mut destsize: usize = 0;
    // SAFETY: `encoded` is valid for `encoded.len()` bytes and `destsize` is a valid out pointer.
    let valid = unsafe {
        blosc_src::blosc_cbuffer_validate(
            encoded.as_ptr().cast::<c_void>(),
            encoded.len(),
            &raw mut destsize,
        )
    };
    if valid != 0 || destsize != header.decompressed_len() {
        return Err(CodecError::failed("blosc", "invalid blosc frame"));
    }

    let mut out = vec![0u8; destsize];
    // SAFETY: `out` is writable for `destsize` bytes, the frame was validated above.
    // The context variant holds no global state, so concurrent calls are sound.
    let written = unsafe {
        blosc_src::blosc_decompress_ctx(
            encoded.as_ptr().cast::<c_void>(),
            out.as_mut_ptr().cast::<c_void>(),
            destsize,
            1,
        )
    };
    let written = usize::try_from(written)
        .map_err(|_| CodecError::failed("blosc", format!("decoder returned {written}")))?;
    out.truncate(written);
    Ok(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::ffi::{CString, c_char, c_int};
    use std::io::Write;

    use super::*;

    /// Blosc-compress `bytes`, for building fixtures.
    pub(crate) fn blosc_compress(
        bytes: &[u8],
        cname: &str,
        clevel: c_int,
        shuffle: c_int,
        typesize: usize,
    ) -> Vec<u8> {
        let destsize = bytes.len() + blosc_src::BLOSC_MAX_OVERHEAD as usize;
        let mut out = vec![0u8; destsize];
        let cname = CString::new(cname).unwrap();
        let written = unsafe {
            blosc_src::blosc_compress_ctx(
                clevel,
                shuffle,
                typesize,
                bytes.len(),
                bytes.as_ptr().cast::<c_void>(),
                out.as_mut_ptr().cast::<c_void>(),
                destsize,
                cname.as_ptr().cast::<c_char>(),
                0,
                1,
            )
        };
        assert!(written > 0, "blosc compression failed");
        out.truncate(written as usize);
        out
    }

    /// Encode `bytes` in the frame format of `compressor`, for building fixtures.
    pub(crate) fn compress(compressor: &Compressor, bytes: &[u8]) -> Vec<u8> {
        match compressor {
            Compressor::Blosc {
                cname,
                clevel,
                shuffle,
                ..
            } => blosc_compress(bytes, cname, c_int::from(*clevel), c_int::from(*shuffle), 4),
            Compressor::Bz2 { level } => {
                let mut out = Vec::new();
                bzip2::read::BzEncoder::new(bytes, bzip2::Compression::new(*level))
                    .read_to_end(&mut out)
                    .unwrap();
                out
            }
            Compressor::Gzip { level } => {
                let mut enc =
                    flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::new(*level));
                enc.write_all(bytes).unwrap();
                enc.finish().unwrap()
            }
            Compressor::Zlib { level } => {
                let mut enc =
                    flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::new(*level));
                enc.write_all(bytes).unwrap();
                enc.finish().unwrap()
            }
            Compressor::Zstd { level, .. } => zstd::stream::encode_all(bytes, *level).unwrap(),
        }
    }

    fn compressor(json: Value) -> Result<Compressor, CodecError> {
        Compressor::from_metadata(&serde_json::from_value(json).unwrap())
    }

    fn sample_f32(n: usize) -> Vec<u8> {
        (0..n)
            .flat_map(|i| (i as f32 * 0.25 - 3.0).to_le_bytes())
            .collect()
    }

    #[test]
    fn resolve_compressors() {
        use serde_json::json;

        assert_eq!(
            compressor(json!({"id": "zlib", "level": 1})).unwrap(),
            Compressor::Zlib { level: 1 }
        );
        assert_eq!(
            compressor(json!({"id": "blosc", "cname": "zstd", "clevel": 1, "shuffle": 2, "blocksize": 0}))
                .unwrap(),
            Compressor::Blosc {
                cname: "zstd".to_string(),
                clevel: 1,
                shuffle: 2,
                blocksize: 0
            }
        );
        assert_eq!(
            compressor(json!({"id": "zstd"})).unwrap(),
            Compressor::Zstd {
                level: 1,
                checksum: false
            }
        );
        assert!(matches!(
            compressor(json!({"id": "lzma"})),
            Err(CodecError::UnsupportedCompressor(id)) if id == "lzma"
        ));
        assert!(matches!(
            compressor(json!({"id": "blosc", "cname": "brotli"})),
            Err(CodecError::InvalidConfiguration { codec: "blosc", .. })
        ));
        assert!(matches!(
            compressor(json!({"id": "gzip", "level": "high"})),
            Err(CodecError::InvalidConfiguration { codec: "gzip", .. })
        ));
        assert!(matches!(
            compressor(json!({"id": "bz2", "level": 0})),
            Err(CodecError::InvalidConfiguration { codec: "bz2", .. })
        ));
    }

    #[test]
    fn round_trip_each_codec() {
        let data = sample_f32(1000);
        let compressors = [
            Compressor::Zlib { level: 1 },
            Compressor::Gzip { level: 5 },
            Compressor::Zstd {
                level: 3,
                checksum: false,
            },
            Compressor::Bz2 { level: 9 },
            Compressor::Blosc {
                cname: "lz4".to_string(),
                clevel: 5,
                shuffle: 0,
                blocksize: 0,
            },
        ];
        for c in &compressors {
            let encoded = compress(c, &data);
            assert_eq!(c.decode(&encoded).unwrap(), data, "{}", c.id());
        }
    }

    #[test]
    fn blosc_unshuffle() {
        // lengths that are not a multiple of the typesize leave trailing bytes unshuffled
        for len in [1, 7, 64, 4099, 100_003] {
            let data: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();
            for cname in ["blosclz", "lz4", "zstd", "zlib"] {
                for (shuffle, typesize) in [(0, 4), (1, 2), (1, 4), (1, 8), (2, 4), (2, 8)] {
                    let encoded = blosc_compress(&data, cname, 5, shuffle, typesize);
                    let decoded = blosc_decompress(&encoded).unwrap();
                    assert_eq!(
                        decoded, data,
                        "cname {cname}, shuffle {shuffle}, typesize {typesize}, len {len}"
                    );
                }
            }
        }
    }

    #[test]
    fn blosc_header_reports_shuffle() {
        let data = sample_f32(256);
        let encoded = blosc_compress(&data, "lz4", 5, 1, 4);
        let header = BloscHeader::from_bytes(&encoded).unwrap();
        assert_eq!(header.decompressed_len(), data.len());
        assert_eq!(header.typesize, 4);
        assert_eq!(header.shuffle(), crate::chunk::BloscShuffle::Byte);
    }

    #[test]
    fn corrupt_frames_fail() {
        let data = sample_f32(64);
        let zlib = Compressor::Zlib { level: 1 };
        assert!(matches!(
            zlib.decode(&data),
            Err(CodecError::DecompressionFailed { codec: "zlib", .. })
        ));

        let mut encoded = blosc_compress(&data, "lz4", 5, 1, 4);
        encoded.truncate(encoded.len() - 4);
        assert!(matches!(
            blosc_decompress(&encoded),
            Err(CodecError::DecompressionFailed { codec: "blosc", .. })
        ));
    }

    #[test]
    fn raw_passes_through() {
        let data = Bytes::from(sample_f32(4));
        let out = decompress(None, data.clone()).unwrap();
        assert_eq!(out, data);
        assert_eq!(out.as_ptr(), data.as_ptr());
    }
}
