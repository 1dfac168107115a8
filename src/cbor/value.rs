//! The [`Value`] tree that sits between typed CTAP2 structures and the raw
//! CBOR bytes on the wire, plus its encode/decode implementation.

use crate::error::{Error, InvalidErrorKind, ProtocolErrorKind};
use std::cmp::Ordering;

/// A decoded (or to-be-encoded) CBOR value, restricted to the subset CTAP2
/// requires.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// An unsigned integer (CBOR major type 0)
    Uint(u64),
    /// A negative integer, stored as the (positive) magnitude `-1 - n`
    /// (CBOR major type 1); so `Nint(0)` encodes the CBOR value `-1`.
    Nint(u64),
    /// A byte string (major type 2)
    Bytes(Vec<u8>),
    /// A UTF-8 text string (major type 3)
    Text(String),
    /// An array (major type 4), order-preserving
    Array(Vec<Value>),
    /// A map (major type 5). Stored as an ordered list of entries: the
    /// decoder preserves insertion order for round-trip fidelity, while the
    /// encoder always re-sorts into canonical order before emitting.
    Map(Vec<(Value, Value)>),
    /// `false`/`true` (major type 7)
    Bool(bool),
    /// `null` (major type 7)
    Null,
}

impl Value {
    /// Build a map value from an entry list (any order; the encoder sorts)
    pub fn map(entries: Vec<(Value, Value)>) -> Self {
        Value::Map(entries)
    }

    /// Look up an entry in a [`Value::Map`] by an unsigned integer key
    pub fn get_uint(&self, key: u64) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries
                .iter()
                .find(|(k, _)| matches!(k, Value::Uint(n) if *n == key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Look up an entry in a [`Value::Map`] by a text key
    pub fn get_text(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries
                .iter()
                .find(|(k, _)| matches!(k, Value::Text(t) if t == key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// View this value as a byte string
    pub fn as_bytes(&self) -> Result<&[u8], Error> {
        match self {
            Value::Bytes(b) => Ok(b),
            _ => fail!(
                ProtocolErrorKind::UnexpectedTag,
                "expected a CBOR byte string"
            ),
        }
    }

    /// View this value as a text string
    pub fn as_text(&self) -> Result<&str, Error> {
        match self {
            Value::Text(t) => Ok(t),
            _ => fail!(ProtocolErrorKind::UnexpectedTag, "expected a CBOR text string"),
        }
    }

    /// View this value as an array
    pub fn as_array(&self) -> Result<&[Value], Error> {
        match self {
            Value::Array(a) => Ok(a),
            _ => fail!(ProtocolErrorKind::UnexpectedTag, "expected a CBOR array"),
        }
    }

    /// View this value as a map's entry list
    pub fn as_map(&self) -> Result<&[(Value, Value)], Error> {
        match self {
            Value::Map(m) => Ok(m),
            _ => fail!(ProtocolErrorKind::UnexpectedTag, "expected a CBOR map"),
        }
    }

    /// View this value as a bool
    pub fn as_bool(&self) -> Result<bool, Error> {
        match self {
            Value::Bool(b) => Ok(*b),
            _ => fail!(ProtocolErrorKind::UnexpectedTag, "expected a CBOR bool"),
        }
    }

    /// Decode this value as an unsigned integer in `u64` range
    pub fn as_u64(&self) -> Result<u64, Error> {
        match self {
            Value::Uint(n) => Ok(*n),
            _ => fail!(ProtocolErrorKind::UnexpectedTag, "expected a CBOR uint"),
        }
    }

    /// Decode this value as a signed integer, rejecting anything that does
    /// not fit in `i32`: CTAP2 never needs wider integers, and values that
    /// don't fit at this boundary are rejected rather than truncated.
    pub fn as_i32(&self) -> Result<i32, Error> {
        let wide: i64 = match self {
            Value::Uint(n) => *n as i64,
            Value::Nint(n) => -1 - (*n as i64),
            _ => fail!(ProtocolErrorKind::UnexpectedTag, "expected a CBOR integer"),
        };
        i32::try_from(wide).map_err(|_| {
            Error::Invalid(InvalidErrorKind::Other(format!(
                "integer {wide} does not fit in i32"
            )))
        })
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Uint(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        if n >= 0 {
            Value::Uint(n as u64)
        } else {
            Value::Nint((-1 - n) as u64)
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Major type byte (top 3 bits of the initial byte)
const MT_UINT: u8 = 0 << 5;
const MT_NINT: u8 = 1 << 5;
const MT_BYTES: u8 = 2 << 5;
const MT_TEXT: u8 = 3 << 5;
const MT_ARRAY: u8 = 4 << 5;
const MT_MAP: u8 = 5 << 5;
const MT_SIMPLE: u8 = 7 << 5;

fn encode_head(major: u8, arg: u64, out: &mut Vec<u8>) {
    if arg < 24 {
        out.push(major | arg as u8);
    } else if arg <= u8::MAX as u64 {
        out.push(major | 24);
        out.push(arg as u8);
    } else if arg <= u16::MAX as u64 {
        out.push(major | 25);
        out.extend_from_slice(&(arg as u16).to_be_bytes());
    } else if arg <= u32::MAX as u64 {
        out.push(major | 26);
        out.extend_from_slice(&(arg as u32).to_be_bytes());
    } else {
        out.push(major | 27);
        out.extend_from_slice(&arg.to_be_bytes());
    }
}

/// Rank used for canonical map-key ordering: unsigned int < negative int <
/// byte string < text string < false < true.
fn canonical_rank(v: &Value) -> u8 {
    match v {
        Value::Uint(_) => 0,
        Value::Nint(_) => 1,
        Value::Bytes(_) => 2,
        Value::Text(_) => 3,
        Value::Bool(false) => 4,
        Value::Bool(true) => 5,
        // Arrays/maps/null are never used as CTAP2 map keys; rank them
        // last so any that do appear sort deterministically.
        Value::Array(_) => 6,
        Value::Map(_) => 7,
        Value::Null => 8,
    }
}

fn canonical_key_bytes(v: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(v, &mut out);
    out
}

pub(super) fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Uint(n) => encode_head(MT_UINT, *n, out),
        Value::Nint(n) => encode_head(MT_NINT, *n, out),
        Value::Bytes(b) => {
            encode_head(MT_BYTES, b.len() as u64, out);
            out.extend_from_slice(b);
        }
        Value::Text(s) => {
            encode_head(MT_TEXT, s.len() as u64, out);
            out.extend_from_slice(s.as_bytes());
        }
        Value::Array(items) => {
            encode_head(MT_ARRAY, items.len() as u64, out);
            for item in items {
                encode_into(item, out);
            }
        }
        Value::Map(entries) => {
            let mut keyed: Vec<(Vec<u8>, &Value, &Value)> = entries
                .iter()
                .map(|(k, v)| (canonical_key_bytes(k), k, v))
                .collect();
            keyed.sort_by(|(ab, ak, _), (bb, bk, _)| {
                match canonical_rank(ak).cmp(&canonical_rank(bk)) {
                    Ordering::Equal => match ab.len().cmp(&bb.len()) {
                        Ordering::Equal => ab.cmp(bb),
                        other => other,
                    },
                    other => other,
                }
            });
            encode_head(MT_MAP, keyed.len() as u64, out);
            for (key_bytes, _, v) in keyed {
                out.extend_from_slice(&key_bytes);
                encode_into(v, out);
            }
        }
        Value::Bool(false) => out.push(MT_SIMPLE | 20),
        Value::Bool(true) => out.push(MT_SIMPLE | 21),
        Value::Null => out.push(MT_SIMPLE | 22),
    }
}

/// A simple forward-only byte cursor used by the decoder.
pub(super) struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(super) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(super) fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub(super) fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        if self.bytes.len() - self.pos < n {
            fail!(ProtocolErrorKind::MalformedResponse, "truncated CBOR value");
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_one(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }
}

/// Decode the `(major, additional-info-as-u64)` head and return the
/// argument value (length, integer magnitude, or count depending on type).
fn decode_head(cursor: &mut Cursor<'_>) -> Result<(u8, u64), Error> {
    let initial = cursor.take_one()?;
    let major = initial & 0xE0;
    let info = initial & 0x1F;
    let arg = match info {
        0..=23 => u64::from(info),
        24 => u64::from(cursor.take(1)?[0]),
        25 => {
            let b = cursor.take(2)?;
            u64::from(u16::from_be_bytes([b[0], b[1]]))
        }
        26 => {
            let b = cursor.take(4)?;
            u64::from(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        }
        27 => {
            let b = cursor.take(8)?;
            u64::from_be_bytes(b.try_into().unwrap())
        }
        _ => fail!(
            ProtocolErrorKind::MalformedResponse,
            "reserved or indefinite-length CBOR encoding is not supported"
        ),
    };
    Ok((major, arg))
}

pub(super) fn decode_value(cursor: &mut Cursor<'_>) -> Result<Value, Error> {
    let start = cursor.pos;
    let (major, arg) = decode_head(cursor)?;
    match major {
        m if m == MT_UINT => Ok(Value::Uint(arg)),
        m if m == MT_NINT => Ok(Value::Nint(arg)),
        m if m == MT_BYTES => Ok(Value::Bytes(cursor.take(arg as usize)?.to_vec())),
        m if m == MT_TEXT => {
            let bytes = cursor.take(arg as usize)?;
            let text = std::str::from_utf8(bytes).map_err(|_| {
                Error::Protocol(ProtocolErrorKind::MalformedResponse)
            })?;
            Ok(Value::Text(text.to_owned()))
        }
        m if m == MT_ARRAY => {
            let mut items = Vec::with_capacity(arg as usize);
            for _ in 0..arg {
                items.push(decode_value(cursor)?);
            }
            Ok(Value::Array(items))
        }
        m if m == MT_MAP => {
            let mut entries = Vec::with_capacity(arg as usize);
            for _ in 0..arg {
                let key = decode_value(cursor)?;
                let val = decode_value(cursor)?;
                entries.push((key, val));
            }
            Ok(Value::Map(entries))
        }
        m if m == MT_SIMPLE => match arg {
            20 => Ok(Value::Bool(false)),
            21 => Ok(Value::Bool(true)),
            22 => Ok(Value::Null),
            23 => fail!(
                ProtocolErrorKind::MalformedResponse,
                "CBOR undefined value is not supported"
            ),
            25 | 26 | 27 => fail!(
                ProtocolErrorKind::MalformedResponse,
                "CBOR floats are rejected"
            ),
            _ => fail!(
                ProtocolErrorKind::MalformedResponse,
                "unsupported CBOR simple value"
            ),
        },
        _ => {
            cursor.pos = start;
            fail!(ProtocolErrorKind::MalformedResponse, "unknown CBOR major type")
        }
    }
}
