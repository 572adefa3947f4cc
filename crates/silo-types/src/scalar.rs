use serde::{Deserialize, Serialize};
use std::fmt;

/// A scalar or array value as stored in a dataset or attribute.
///
/// This is the leaf vocabulary the container codec understands. Container
/// formats distinguish element types, so the variants are explicit rather
/// than funneled through a generic JSON-like value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    IntVec(Vec<i64>),
    FloatVec(Vec<f64>),
    TextVec(Vec<String>),
}

impl Scalar {
    /// Element count: 1 for scalars, the vector length for arrays.
    pub fn len(&self) -> usize {
        match self {
            Scalar::IntVec(v) => v.len(),
            Scalar::FloatVec(v) => v.len(),
            Scalar::TextVec(v) => v.len(),
            Scalar::Bytes(v) => v.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the text content, if this is a text scalar.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Scalar::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Sub-range of an array value (inclusive start, exclusive end, clamped).
    /// Scalars are returned whole.
    pub fn slice(&self, start: usize, end: usize) -> Scalar {
        fn clamp<T: Clone>(v: &[T], start: usize, end: usize) -> Vec<T> {
            let end = end.min(v.len());
            let start = start.min(end);
            v[start..end].to_vec()
        }
        match self {
            Scalar::IntVec(v) => Scalar::IntVec(clamp(v, start, end)),
            Scalar::FloatVec(v) => Scalar::FloatVec(clamp(v, start, end)),
            Scalar::TextVec(v) => Scalar::TextVec(clamp(v, start, end)),
            Scalar::Bytes(v) => Scalar::Bytes(clamp(v, start, end)),
            other => other.clone(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(n) => write!(f, "{n}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Text(s) => f.write_str(s),
            Scalar::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Scalar::IntVec(v) => write!(f, "<{} ints>", v.len()),
            Scalar::FloatVec(v) => write!(f, "<{} floats>", v.len()),
            Scalar::TextVec(v) => write!(f, "<{} strings>", v.len()),
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Text(v)
    }
}

impl From<Vec<i64>> for Scalar {
    fn from(v: Vec<i64>) -> Self {
        Scalar::IntVec(v)
    }
}

impl From<Vec<f64>> for Scalar {
    fn from(v: Vec<f64>) -> Self {
        Scalar::FloatVec(v)
    }
}

impl From<Vec<u8>> for Scalar {
    fn from(v: Vec<u8>) -> Self {
        Scalar::Bytes(v)
    }
}
