use half::f16;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    chunk_grid::checked_product,
    chunk_key_encoding::ChunkKeySeparator,
    data_type::{Kind, TypeDescriptor},
    error::ConfigurationError,
};

/// Key of the array descriptor, relative to the array root.
pub const ZARRAY_KEY: &str = ".zarray";

/// Representation of the `.zarray` descriptor, as stored.
///
/// Convert to [`ArrayMetadata`] to validate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZarrayMetadata {
    /// Must be 2.
    pub zarr_format: i64,
    /// Array shape.
    pub shape: Vec<usize>,
    /// Chunk shape.
    pub chunks: Vec<usize>,
    /// NumPy type string, e.g. `<f4`.
    pub dtype: String,
    /// Chunk compressor, or `null` for raw chunks.
    pub compressor: Option<CompressorMetadata>,
    /// Value of array positions with no stored chunk.
    #[serde(default)]
    pub fill_value: Value,
    /// `"C"` (row-major) or `"F"` (column-major) layout within each chunk.
    #[serde(default = "default_order")]
    pub order: String,
    /// Must be absent, `null`, or empty.
    #[serde(default)]
    pub filters: Option<Vec<Value>>,
    /// `"."` or `"/"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_separator: Option<String>,
}

fn default_order() -> String {
    "C".to_string()
}

/// A compressor entry: an `id` plus codec-specific fields.
///
/// ```json
/// {"id": "blosc", "cname": "lz4", "clevel": 5, "shuffle": 1}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressorMetadata {
    pub id: String,
    #[serde(flatten)]
    pub configuration: serde_json::Map<String, Value>,
}

impl CompressorMetadata {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            configuration: Default::default(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.configuration.insert(key.into(), value.into());
        self
    }
}

/// Memory order of elements within a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    RowMajor,
    ColumnMajor,
}

impl TryFrom<&str> for Order {
    type Error = ConfigurationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "C" => Ok(Self::RowMajor),
            "F" => Ok(Self::ColumnMajor),
            s => Err(ConfigurationError::InvalidOrder(s.to_string())),
        }
    }
}

/// Validated, immutable description of one array.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayMetadata {
    format_version: i64,
    shape: Vec<usize>,
    chunk_shape: Vec<usize>,
    data_type: TypeDescriptor,
    compressor: Option<CompressorMetadata>,
    fill_value: Value,
    fill_element: Vec<u8>,
    order: Order,
    dimension_separator: ChunkKeySeparator,
}

impl ArrayMetadata {
    /// Validate descriptor fields.
    ///
    /// # Errors
    /// Returns [`ConfigurationError`] if the format version is not 2,
    /// `shape` and `chunk_shape` differ in length, a chunk dimension is zero,
    /// `dtype` is unsupported, or `fill_value` cannot be encoded as `dtype`.
    pub fn new(
        format_version: i64,
        shape: Vec<usize>,
        chunk_shape: Vec<usize>,
        dtype: &str,
        compressor: Option<CompressorMetadata>,
        fill_value: Value,
        order: Order,
    ) -> Result<Self, ConfigurationError> {
        if format_version != 2 {
            return Err(ConfigurationError::UnsupportedFormatVersion(format_version));
        }
        if shape.len() != chunk_shape.len() {
            return Err(ConfigurationError::RankMismatch {
                shape,
                chunks: chunk_shape,
            });
        }
        if let Some(axis) = chunk_shape.iter().position(|&n| n == 0) {
            return Err(ConfigurationError::ZeroChunkDimension { axis });
        }
        let data_type = TypeDescriptor::parse(dtype)?;
        if checked_product(&chunk_shape)
            .and_then(|n| n.checked_mul(data_type.size()))
            .is_none()
        {
            return Err(ConfigurationError::ChunkTooLarge {
                chunks: chunk_shape,
            });
        }
        let fill_element = encode_fill_value(&fill_value, &data_type).map_err(|reason| {
            ConfigurationError::InvalidFillValue {
                value: fill_value.clone(),
                reason,
            }
        })?;

        Ok(Self {
            format_version,
            shape,
            chunk_shape,
            data_type,
            compressor,
            fill_value,
            fill_element,
            order,
            dimension_separator: ChunkKeySeparator::default(),
        })
    }

    pub fn with_dimension_separator(mut self, separator: ChunkKeySeparator) -> Self {
        self.dimension_separator = separator;
        self
    }

    /// Parse and validate `.zarray` JSON.
    ///
    /// # Errors
    /// Returns [`crate::Error::SerdeJson`] if the JSON does not match [`ZarrayMetadata`],
    /// or [`crate::Error::Configuration`] if it fails validation.
    pub fn from_json(bytes: &[u8]) -> crate::Result<Self> {
        let zarray: ZarrayMetadata = serde_json::from_slice(bytes)?;
        Ok(zarray.try_into()?)
    }

    pub fn format_version(&self) -> i64 {
        self.format_version
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn chunk_shape(&self) -> &[usize] {
        &self.chunk_shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn data_type(&self) -> &TypeDescriptor {
        &self.data_type
    }

    pub fn element_size(&self) -> usize {
        self.data_type.size()
    }

    pub fn compressor(&self) -> Option<&CompressorMetadata> {
        self.compressor.as_ref()
    }

    /// The fill value exactly as it appeared in the descriptor.
    pub fn fill_value(&self) -> &Value {
        &self.fill_value
    }

    /// The fill value encoded as one little-endian element.
    pub fn fill_element(&self) -> &[u8] {
        &self.fill_element
    }

    pub fn order(&self) -> Order {
        self.order
    }

    pub fn dimension_separator(&self) -> ChunkKeySeparator {
        self.dimension_separator
    }

    /// Number of elements in the array, or `None` if it exceeds `usize`.
    pub fn num_elements(&self) -> Option<usize> {
        checked_product(&self.shape)
    }

    /// Number of elements in a nominal (unclipped) chunk.
    pub fn chunk_num_elements(&self) -> usize {
        self.chunk_shape.iter().product()
    }

    /// Decoded size of a nominal chunk in bytes.
    pub fn chunk_byte_size(&self) -> usize {
        self.chunk_num_elements() * self.element_size()
    }
}

impl TryFrom<ZarrayMetadata> for ArrayMetadata {
    type Error = ConfigurationError;

    fn try_from(value: ZarrayMetadata) -> Result<Self, Self::Error> {
        if let Some(filters) = &value.filters {
            if !filters.is_empty() {
                return Err(ConfigurationError::UnsupportedFilters(filters.len()));
            }
        }
        let order = Order::try_from(value.order.as_str())?;
        let separator = value
            .dimension_separator
            .as_deref()
            .map(ChunkKeySeparator::try_from)
            .transpose()?
            .unwrap_or_default();
        let out = Self::new(
            value.zarr_format,
            value.shape,
            value.chunks,
            &value.dtype,
            value.compressor,
            value.fill_value,
            order,
        )?
        .with_dimension_separator(separator);
        Ok(out)
    }
}

impl From<&ArrayMetadata> for ZarrayMetadata {
    fn from(value: &ArrayMetadata) -> Self {
        Self {
            zarr_format: value.format_version,
            shape: value.shape.clone(),
            chunks: value.chunk_shape.clone(),
            dtype: value.data_type.to_string(),
            compressor: value.compressor.clone(),
            fill_value: value.fill_value.clone(),
            order: match value.order {
                Order::RowMajor => "C",
                Order::ColumnMajor => "F",
            }
            .to_string(),
            filters: None,
            dimension_separator: Some(value.dimension_separator.to_string()),
        }
    }
}

fn float_from_json(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("{n} is not representable as a float")),
        Value::String(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            s => Err(format!("unrecognised float string {s:?}")),
        },
        v => Err(format!("expected a number, got {v}")),
    }
}

fn encode_float(v: f64, width: u8) -> Vec<u8> {
    match width {
        2 => f16::from_f64(v).to_le_bytes().to_vec(),
        4 => (v as f32).to_le_bytes().to_vec(),
        _ => v.to_le_bytes().to_vec(),
    }
}

/// Encode a descriptor fill value as a single element of `data_type`.
fn encode_fill_value(value: &Value, data_type: &TypeDescriptor) -> Result<Vec<u8>, String> {
    let width = data_type.byte_width();
    let bits = u32::from(width) * 8;
    if value.is_null() {
        return Ok(vec![0; data_type.size()]);
    }
    match data_type.kind() {
        Kind::Bool => match value {
            Value::Bool(b) => Ok(vec![u8::from(*b)]),
            Value::Number(n) => match n.as_u64() {
                Some(v @ (0 | 1)) => Ok(vec![v as u8]),
                _ => Err(format!("{n} is not a boolean")),
            },
            v => Err(format!("expected a boolean, got {v}")),
        },
        Kind::SignedInt => {
            let v = value
                .as_i64()
                .ok_or_else(|| format!("expected an integer, got {value}"))?;
            if bits < 64 {
                let min = -(1i64 << (bits - 1));
                let max = (1i64 << (bits - 1)) - 1;
                if v < min || v > max {
                    return Err(format!("{v} out of range for {bits}-bit integer"));
                }
            }
            Ok(v.to_le_bytes()[..data_type.size()].to_vec())
        }
        Kind::UnsignedInt => {
            let v = value
                .as_u64()
                .ok_or_else(|| format!("expected a non-negative integer, got {value}"))?;
            if bits < 64 && v >= (1u64 << bits) {
                return Err(format!("{v} out of range for {bits}-bit unsigned integer"));
            }
            Ok(v.to_le_bytes()[..data_type.size()].to_vec())
        }
        Kind::Float => Ok(encode_float(float_from_json(value)?, width)),
        Kind::Complex => {
            let (re, im) = match value {
                Value::Array(parts) if parts.len() == 2 => {
                    (float_from_json(&parts[0])?, float_from_json(&parts[1])?)
                }
                Value::Array(parts) => {
                    return Err(format!("expected [re, im], got {} values", parts.len()));
                }
                v => (float_from_json(v)?, 0.0),
            };
            let mut out = encode_float(re, width / 2);
            out.extend(encode_float(im, width / 2));
            Ok(out)
        }
    }
}
