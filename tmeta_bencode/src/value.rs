use std::collections::BTreeMap;

use crate::error::{ConvertError, ConvertResult};

/// A decoded (or hand-built) bencode value.
///
/// `Dict` is backed by a `BTreeMap<Vec<u8>, BencodeValue>` rather than
/// an insertion-ordered map: `Vec<u8>`'s `Ord` impl is byte-lexicographic,
/// so iterating a `BTreeMap` already yields keys in the strict ascending
/// order BEP-3 requires on the wire. The ordering invariant becomes a
/// structural property of the type instead of something the encoder has
/// to re-derive by sorting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BencodeValue {
    Int(i64),
    Str(Vec<u8>),
    List(Vec<BencodeValue>),
    Dict(BTreeMap<Vec<u8>, BencodeValue>),
}

impl BencodeValue {
    pub fn int(value: i64) -> BencodeValue {
        BencodeValue::Int(value)
    }

    pub fn bytes<B: Into<Vec<u8>>>(value: B) -> BencodeValue {
        BencodeValue::Str(value.into())
    }

    pub fn list(values: Vec<BencodeValue>) -> BencodeValue {
        BencodeValue::List(values)
    }

    pub fn dict(map: BTreeMap<Vec<u8>, BencodeValue>) -> BencodeValue {
        BencodeValue::Dict(map)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            BencodeValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            BencodeValue::Str(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_list(&self) -> Option<&[BencodeValue]> {
        match self {
            BencodeValue::List(xs) => Some(xs),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, BencodeValue>> {
        match self {
            BencodeValue::Dict(m) => Some(m),
            _ => None,
        }
    }

    /// Look up `key` in `self`, returning an error if `self` is not a
    /// dictionary or the key is absent.
    pub fn lookup(&self, key: &[u8]) -> ConvertResult<&BencodeValue> {
        self.as_dict()
            .and_then(|m| m.get(key))
            .ok_or_else(|| ConvertError::MissingKey { key: key.to_vec() })
    }

    pub fn lookup_int(&self, key: &[u8]) -> ConvertResult<i64> {
        self.lookup(key)?.as_int().ok_or_else(|| ConvertError::WrongType {
            key: key.to_vec(),
            expected: "integer",
        })
    }

    pub fn lookup_bytes(&self, key: &[u8]) -> ConvertResult<&[u8]> {
        self.lookup(key)?.as_bytes().ok_or_else(|| ConvertError::WrongType {
            key: key.to_vec(),
            expected: "byte string",
        })
    }

    pub fn lookup_str(&self, key: &[u8]) -> ConvertResult<&str> {
        self.lookup(key)?.as_str().ok_or_else(|| ConvertError::WrongType {
            key: key.to_vec(),
            expected: "utf8 byte string",
        })
    }

    pub fn lookup_list(&self, key: &[u8]) -> ConvertResult<&[BencodeValue]> {
        self.lookup(key)?.as_list().ok_or_else(|| ConvertError::WrongType {
            key: key.to_vec(),
            expected: "list",
        })
    }

    pub fn lookup_dict(&self, key: &[u8]) -> ConvertResult<&BTreeMap<Vec<u8>, BencodeValue>> {
        self.lookup(key)?.as_dict().ok_or_else(|| ConvertError::WrongType {
            key: key.to_vec(),
            expected: "dictionary",
        })
    }
}

/// Construct a `BencodeValue::Int`.
#[macro_export]
macro_rules! ben_int {
    ($val:expr) => {
        $crate::BencodeValue::Int($val)
    };
}

/// Construct a `BencodeValue::Str` from anything convertible to bytes.
#[macro_export]
macro_rules! ben_bytes {
    ($val:expr) => {
        $crate::BencodeValue::Str(::std::convert::AsRef::<[u8]>::as_ref($val).to_vec())
    };
}

/// Construct a `BencodeValue::List` from a list of values.
#[macro_export]
macro_rules! ben_list {
    ( $( $val:expr ),* $(,)? ) => {{
        let mut list = ::std::vec::Vec::new();
        $( list.push($val); )*
        $crate::BencodeValue::List(list)
    }};
}

/// Construct a `BencodeValue::Dict` from `key => value` pairs. Keys are
/// inserted into a `BTreeMap`, so they end up in ascending order
/// regardless of the order they're written here.
#[macro_export]
macro_rules! ben_map {
    ( $( $key:expr => $val:expr ),* $(,)? ) => {{
        let mut map = ::std::collections::BTreeMap::new();
        $( map.insert(::std::convert::AsRef::<[u8]>::as_ref($key).to_vec(), $val); )*
        $crate::BencodeValue::Dict(map)
    }};
}
