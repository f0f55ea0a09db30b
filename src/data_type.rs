//! NumPy-style type strings (`<f4`, `|b1`, ...) and typed views over decoded bytes.
//!
//! The read engine is byte-oriented and never interprets element values.
//! [`elements`] is a thin typed layer over a returned buffer.

use std::{fmt, str::FromStr};

use half::f16;
use num_complex::Complex;

/// Element kind, the second character of a type string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Bool,
    SignedInt,
    UnsignedInt,
    Float,
    Complex,
}

impl Kind {
    fn from_code(code: char) -> Option<Self> {
        match code {
            'b' => Some(Self::Bool),
            'i' => Some(Self::SignedInt),
            'u' => Some(Self::UnsignedInt),
            'f' => Some(Self::Float),
            'c' => Some(Self::Complex),
            _ => None,
        }
    }

    fn code(self) -> char {
        match self {
            Self::Bool => 'b',
            Self::SignedInt => 'i',
            Self::UnsignedInt => 'u',
            Self::Float => 'f',
            Self::Complex => 'c',
        }
    }

    /// Byte widths this reader decodes for the kind.
    pub fn supported_widths(self) -> &'static [u8] {
        match self {
            Self::Bool => &[1],
            Self::SignedInt | Self::UnsignedInt => &[1, 2, 4, 8],
            Self::Float => &[2, 4, 8],
            Self::Complex => &[8, 16],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
    /// `|`, only meaningful for single-byte kinds.
    NotApplicable,
}

impl ByteOrder {
    fn marker(self) -> char {
        match self {
            Self::LittleEndian => '<',
            Self::BigEndian => '>',
            Self::NotApplicable => '|',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataTypeError {
    #[error("unsupported byte order in dtype {0:?}")]
    UnsupportedByteOrder(String),
    #[error("unsupported kind in dtype {0:?}")]
    UnsupportedKind(String),
    #[error("malformed width in dtype {0:?}")]
    MalformedWidth(String),
}

/// Decoded form of a type string.
///
/// Big-endian encodings are rejected rather than decoded,
/// so every accepted descriptor is little-endian or single-byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    kind: Kind,
    byte_width: u8,
    byte_order: ByteOrder,
}

impl TypeDescriptor {
    /// Parse a type string such as `<f4`.
    ///
    /// # Errors
    /// - [`DataTypeError::UnsupportedByteOrder`] for `>` (big-endian), an unknown marker,
    ///   or `|` on a multi-byte kind.
    /// - [`DataTypeError::UnsupportedKind`] for an unknown kind code.
    /// - [`DataTypeError::MalformedWidth`] if the width is missing, not decimal,
    ///   or not a width the kind supports.
    pub fn parse(s: &str) -> Result<Self, DataTypeError> {
        let mut chars = s.chars();
        let byte_order = match chars.next() {
            Some('<') => ByteOrder::LittleEndian,
            Some('|') => ByteOrder::NotApplicable,
            _ => return Err(DataTypeError::UnsupportedByteOrder(s.to_string())),
        };
        let kind = chars
            .next()
            .and_then(Kind::from_code)
            .ok_or_else(|| DataTypeError::UnsupportedKind(s.to_string()))?;

        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DataTypeError::MalformedWidth(s.to_string()));
        }
        let byte_width: u8 = digits
            .parse()
            .map_err(|_| DataTypeError::MalformedWidth(s.to_string()))?;
        if !kind.supported_widths().contains(&byte_width) {
            return Err(DataTypeError::MalformedWidth(s.to_string()));
        }
        if byte_order == ByteOrder::NotApplicable && byte_width != 1 {
            return Err(DataTypeError::UnsupportedByteOrder(s.to_string()));
        }

        Ok(Self {
            kind,
            byte_width,
            byte_order,
        })
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn byte_width(&self) -> u8 {
        self.byte_width
    }

    /// Element size in bytes.
    pub fn size(&self) -> usize {
        usize::from(self.byte_width)
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }
}

impl FromStr for TypeDescriptor {
    type Err = DataTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.byte_order.marker(),
            self.kind.code(),
            self.byte_width
        )
    }
}

/// A Rust type that can view elements of a decoded buffer.
pub trait Element: Sized {
    const KIND: Kind;
    const WIDTH: u8;

    /// Decode one element from exactly [`Self::WIDTH`] little-endian bytes.
    fn from_le_slice(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($ty:ty, $kind:expr) => {
        impl Element for $ty {
            const KIND: Kind = $kind;
            const WIDTH: u8 = size_of::<$ty>() as u8;

            fn from_le_slice(bytes: &[u8]) -> Self {
                let mut buf = [0u8; size_of::<$ty>()];
                buf.copy_from_slice(bytes);
                <$ty>::from_le_bytes(buf)
            }
        }
    };
}

impl_element!(i8, Kind::SignedInt);
impl_element!(i16, Kind::SignedInt);
impl_element!(i32, Kind::SignedInt);
impl_element!(i64, Kind::SignedInt);
impl_element!(u8, Kind::UnsignedInt);
impl_element!(u16, Kind::UnsignedInt);
impl_element!(u32, Kind::UnsignedInt);
impl_element!(u64, Kind::UnsignedInt);
impl_element!(f16, Kind::Float);
impl_element!(f32, Kind::Float);
impl_element!(f64, Kind::Float);

impl Element for bool {
    const KIND: Kind = Kind::Bool;
    const WIDTH: u8 = 1;

    fn from_le_slice(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

impl<T: Element> Element for Complex<T> {
    const KIND: Kind = Kind::Complex;
    const WIDTH: u8 = T::WIDTH * 2;

    fn from_le_slice(bytes: &[u8]) -> Self {
        let (re, im) = bytes.split_at(usize::from(T::WIDTH));
        Complex::new(T::from_le_slice(re), T::from_le_slice(im))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
    #[error("cannot view {descriptor} elements as {element}")]
    TypeMismatch {
        descriptor: TypeDescriptor,
        element: &'static str,
    },
    #[error("buffer of {len} bytes is not a whole number of {width}-byte elements")]
    PartialElement { len: usize, width: usize },
}

/// View a decoded buffer as a vector of `T`.
///
/// # Errors
/// Returns [`ViewError`] if `T` does not match the descriptor's kind and width,
/// or `bytes` is not a whole number of elements.
pub fn elements<T: Element>(descriptor: &TypeDescriptor, bytes: &[u8]) -> Result<Vec<T>, ViewError> {
    if descriptor.kind() != T::KIND || descriptor.byte_width() != T::WIDTH {
        return Err(ViewError::TypeMismatch {
            descriptor: *descriptor,
            element: std::any::type_name::<T>(),
        });
    }
    let width = descriptor.size();
    if bytes.len() % width != 0 {
        return Err(ViewError::PartialElement {
            len: bytes.len(),
            width,
        });
    }
    Ok(bytes.chunks_exact(width).map(T::from_le_slice).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_supported() {
        let f4 = TypeDescriptor::parse("<f4").unwrap();
        assert_eq!(f4.kind(), Kind::Float);
        assert_eq!(f4.byte_width(), 4);
        assert_eq!(f4.byte_order(), ByteOrder::LittleEndian);

        let i8 = TypeDescriptor::parse("<i8").unwrap();
        assert_eq!(
            (i8.kind(), i8.byte_width(), i8.byte_order()),
            (Kind::SignedInt, 8, ByteOrder::LittleEndian)
        );

        let b1 = TypeDescriptor::parse("|b1").unwrap();
        assert_eq!(
            (b1.kind(), b1.byte_width(), b1.byte_order()),
            (Kind::Bool, 1, ByteOrder::NotApplicable)
        );

        let c16: TypeDescriptor = "<c16".parse().unwrap();
        assert_eq!(c16.size(), 16);
        assert_eq!(c16.to_string(), "<c16");
    }

    #[test]
    fn parse_rejected() {
        assert!(matches!(
            TypeDescriptor::parse(">f4"),
            Err(DataTypeError::UnsupportedByteOrder(_))
        ));
        assert!(matches!(
            TypeDescriptor::parse("|f4"),
            Err(DataTypeError::UnsupportedByteOrder(_))
        ));
        assert!(matches!(
            TypeDescriptor::parse(""),
            Err(DataTypeError::UnsupportedByteOrder(_))
        ));
        assert!(matches!(
            TypeDescriptor::parse("<x4"),
            Err(DataTypeError::UnsupportedKind(_))
        ));
        assert!(matches!(
            TypeDescriptor::parse("<i"),
            Err(DataTypeError::MalformedWidth(_))
        ));
        assert!(matches!(
            TypeDescriptor::parse("<f3"),
            Err(DataTypeError::MalformedWidth(_))
        ));
        assert!(matches!(
            TypeDescriptor::parse("<i+4"),
            Err(DataTypeError::MalformedWidth(_))
        ));
        assert!(matches!(
            TypeDescriptor::parse("<b2"),
            Err(DataTypeError::MalformedWidth(_))
        ));
    }

    #[test]
    fn typed_views() {
        let descriptor = TypeDescriptor::parse("<f4").unwrap();
        let bytes: Vec<u8> = [1.5f32, -2.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(elements::<f32>(&descriptor, &bytes).unwrap(), vec![1.5, -2.0]);
        assert!(matches!(
            elements::<i32>(&descriptor, &bytes),
            Err(ViewError::TypeMismatch { .. })
        ));
        assert!(matches!(
            elements::<f32>(&descriptor, &bytes[..5]),
            Err(ViewError::PartialElement { len: 5, width: 4 })
        ));

        let descriptor = TypeDescriptor::parse("<c8").unwrap();
        let bytes: Vec<u8> = [3.0f32, 4.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(
            elements::<Complex<f32>>(&descriptor, &bytes).unwrap(),
            vec![Complex::new(3.0, 4.0)]
        );

        let descriptor = TypeDescriptor::parse("|b1").unwrap();
        assert_eq!(
            elements::<bool>(&descriptor, &[0, 1, 2]).unwrap(),
            vec![false, true, true]
        );
    }
}
