use std::fmt::{self, Write};

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Separator between chunk coordinates in a chunk key.
///
/// Set by the `dimension_separator` field of `.zarray`, `.` when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChunkKeySeparator {
    #[default]
    #[serde(rename = ".")]
    Dot,
    #[serde(rename = "/")]
    Slash,
}

impl ChunkKeySeparator {
    pub fn as_char(self) -> char {
        match self {
            Self::Dot => '.',
            Self::Slash => '/',
        }
    }
}

impl TryFrom<&str> for ChunkKeySeparator {
    type Error = ConfigurationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "." => Ok(Self::Dot),
            "/" => Ok(Self::Slash),
            s => Err(ConfigurationError::InvalidDimensionSeparator(s.to_string())),
        }
    }
}

impl fmt::Display for ChunkKeySeparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char(self.as_char())
    }
}

/// Key of the chunk at `coord`, relative to the array root.
///
/// A zero-dimensional array has a single chunk keyed `"0"`.
pub fn chunk_key(coord: &[usize], separator: ChunkKeySeparator) -> String {
    match coord {
        [] => "0".to_string(),
        [idx] => idx.to_string(),
        [first, rest @ ..] => {
            let mut s = String::with_capacity(coord.len() * 2);
            s.push_str(&first.to_string());
            for idx in rest {
                s.push(separator.as_char());
                s.push_str(&idx.to_string());
            }
            s
        }
    }
}
