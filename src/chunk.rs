use crate::error::CodecError;

const BLOSC_HEADER_LEN: usize = 16;

const FLAG_SHUFFLE: u8 = 0x1;
const FLAG_MEMCPYED: u8 = 0x2;
const FLAG_BITSHUFFLE: u8 = 0x4;

/// Fixed 16-byte header at the start of every blosc frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BloscHeader {
    pub(crate) version: u8,
    pub(crate) flags: u8,
    /// Element size the shuffle filter groups bytes by.
    pub(crate) typesize: u8,
    /// Decompressed length.
    pub(crate) nbytes: u32,
    pub(crate) blocksize: u32,
    /// Compressed length including this header.
    pub(crate) cbytes: u32,
}

/// Byte-plane filter applied before compression; undone by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BloscShuffle {
    None,
    Byte,
    Bit,
}

impl BloscHeader {
    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let Some(header) = bytes.get(..BLOSC_HEADER_LEN) else {
            return Err(CodecError::failed(
                "blosc",
                format!("frame of {} bytes is shorter than the header", bytes.len()),
            ));
        };
        let u32_at = |offset: usize| {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&header[offset..offset + 4]);
            u32::from_le_bytes(buf)
        };
        let out = Self {
            version: header[0],
            flags: header[2],
            typesize: header[3],
            nbytes: u32_at(4),
            blocksize: u32_at(8),
            cbytes: u32_at(12),
        };
        if out.cbytes as usize > bytes.len() {
            return Err(CodecError::failed(
                "blosc",
                format!(
                    "header declares {} compressed bytes, frame has {}",
                    out.cbytes,
                    bytes.len()
                ),
            ));
        }
        if out.typesize == 0 {
            return Err(CodecError::failed("blosc", "header declares typesize 0"));
        }
        Ok(out)
    }

    pub(crate) fn shuffle(&self) -> BloscShuffle {
        if self.flags & FLAG_BITSHUFFLE != 0 && self.typesize > 1 {
            BloscShuffle::Bit
        } else if self.flags & FLAG_SHUFFLE != 0 {
            BloscShuffle::Byte
        } else {
            BloscShuffle::None
        }
    }

    /// Whether the payload is stored uncompressed.
    pub(crate) fn memcpyed(&self) -> bool {
        self.flags & FLAG_MEMCPYED != 0
    }

    pub(crate) fn decompressed_len(&self) -> usize {
        self.nbytes as usize
    }
}
