//! CBOR subset required by CTAP2, with canonical map ordering.
//!
//! This is a hand-rolled codec rather than a dependency on an external CBOR
//! crate: the canonical map-ordering invariant this crate tests against is
//! easiest to guarantee by owning the encode/decode boundary outright.
//!
//! Supported major types: unsigned/negative integers, byte strings, text
//! strings, arrays, maps, booleans and null. Floats are rejected on decode.

mod value;

pub use value::Value;

use crate::error::{Error, ProtocolErrorKind};

/// Encode a [`Value`] to its canonical CBOR byte representation.
///
/// Maps are always emitted in canonical key order (see [`Value::Map`]'s
/// documentation); all other types have only one valid encoding in this
/// subset.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    value::encode_into(value, &mut out);
    out
}

/// Decode a single [`Value`] from `bytes`, requiring the entire input be
/// consumed.
pub fn decode(bytes: &[u8]) -> Result<Value, Error> {
    let mut cursor = value::Cursor::new(bytes);
    let value = value::decode_value(&mut cursor)?;
    if !cursor.is_empty() {
        fail!(
            ProtocolErrorKind::MalformedResponse,
            "trailing bytes after CBOR value"
        );
    }
    Ok(value)
}

/// Decode a single [`Value`] from the front of `bytes`, returning the value
/// and the unconsumed remainder. Used where CTAP2 embeds CBOR after a
/// fixed-size prefix (e.g. a command byte).
pub fn decode_prefix(bytes: &[u8]) -> Result<(Value, &[u8]), Error> {
    let mut cursor = value::Cursor::new(bytes);
    let value = value::decode_value(&mut cursor)?;
    let consumed = cursor.position();
    Ok((value, &bytes[consumed..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_scalars() {
        for v in [
            Value::from(0u64),
            Value::from(23u64),
            Value::from(24u64),
            Value::from(255u64),
            Value::from(256u64),
            Value::from(65535u64),
            Value::from(65536u64),
            Value::from(-1i64),
            Value::from(-24i64),
            Value::from(-25i64),
            Value::Bool(true),
            Value::Bool(false),
            Value::Null,
            Value::Bytes(vec![1, 2, 3]),
            Value::Text("hello".into()),
        ] {
            let encoded = encode(&v);
            assert_eq!(decode(&encoded).unwrap(), v);
        }
    }

    #[test]
    fn roundtrip_array_and_map() {
        let v = Value::Array(vec![Value::from(1u64), Value::Text("x".into())]);
        assert_eq!(decode(&encode(&v)).unwrap(), v);

        let m = Value::map(vec![
            (Value::from(1u64), Value::Text("rp".into())),
            (Value::from(2u64), Value::Text("user".into())),
        ]);
        assert_eq!(decode(&encode(&m)).unwrap(), m);
    }

    #[test]
    fn canonical_map_ordering_by_type_rank_then_length_then_bytes() {
        // Insert out of canonical order; encoder must still emit sorted.
        let m = Value::map(vec![
            (Value::Text("zz".into()), Value::from(1u64)),
            (Value::from(2u64), Value::from(2u64)),
            (Value::from(1u64), Value::from(3u64)),
            (Value::Bytes(vec![0]), Value::from(4u64)),
            (Value::Bool(false), Value::from(5u64)),
        ]);
        let encoded = encode(&m);
        // unsigned(1), unsigned(2), bytes([0]), text("zz"), false
        let expected = {
            let mut out = Vec::new();
            out.push(0xA5); // map(5)
            out.extend(encode(&Value::from(1u64)));
            out.extend(encode(&Value::from(3u64)));
            out.extend(encode(&Value::from(2u64)));
            out.extend(encode(&Value::from(2u64)));
            out.extend(encode(&Value::Bytes(vec![0])));
            out.extend(encode(&Value::from(4u64)));
            out.extend(encode(&Value::Text("zz".into())));
            out.extend(encode(&Value::from(1u64)));
            out.extend(encode(&Value::Bool(false)));
            out.extend(encode(&Value::from(5u64)));
            out
        };
        assert_eq!(encoded, expected);
    }

    #[test]
    fn encode_decode_encode_is_stable() {
        let m = Value::map(vec![
            (Value::from(3u64), Value::from(1u64)),
            (Value::from(1u64), Value::from(2u64)),
        ]);
        let once = encode(&m);
        let decoded = decode(&once).unwrap();
        let twice = encode(&decoded);
        assert_eq!(once, twice);
    }

    #[test]
    fn decoder_preserves_insertion_order_for_round_trip() {
        // Decoder must not silently re-sort what it reads back; only the
        // encoder enforces canonical order.
        let mut bytes = vec![0xA2u8];
        bytes.extend(encode(&Value::from(5u64)));
        bytes.extend(encode(&Value::from(1u64)));
        bytes.extend(encode(&Value::from(1u64)));
        bytes.extend(encode(&Value::from(2u64)));
        let decoded = decode(&bytes).unwrap();
        match decoded {
            Value::Map(entries) => {
                assert_eq!(entries[0].0, Value::from(5u64));
                assert_eq!(entries[1].0, Value::from(1u64));
            }
            _ => panic!("expected map"),
        }
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = encode(&Value::from(1u64));
        bytes.push(0xFF);
        assert!(decode(&bytes).is_err());
    }
}
