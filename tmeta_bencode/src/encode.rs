//! A total (infallible) bencode encoder.
//!
//! Every [`BencodeValue`] that exists is already well-formed, so encoding
//! never fails; the only invariant the encoder has to uphold is emitting
//! dictionary keys in ascending order, which the `BTreeMap` backing
//! `BencodeValue::Dict` gives us for free by iterating in key order.

use crate::value::BencodeValue;

/// Encode `value` to its canonical bencoded byte representation.
pub fn encode(value: &BencodeValue) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

fn encode_into(value: &BencodeValue, out: &mut Vec<u8>) {
    match value {
        BencodeValue::Int(n) => {
            out.push(b'i');
            out.extend(n.to_string().into_bytes());
            out.push(b'e');
        }
        BencodeValue::Str(bytes) => {
            out.extend(bytes.len().to_string().into_bytes());
            out.push(b':');
            out.extend(bytes);
        }
        BencodeValue::List(items) => {
            out.push(b'l');
            for item in items {
                encode_into(item, out);
            }
            out.push(b'e');
        }
        BencodeValue::Dict(map) => {
            out.push(b'd');
            for (key, value) in map {
                encode_into(&BencodeValue::Str(key.clone()), out);
                encode_into(value, out);
            }
            out.push(b'e');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode;
    use crate::{ben_bytes, ben_int, ben_list, ben_map};

    #[test]
    fn encodes_integer() {
        assert_eq!(encode(&BencodeValue::Int(42)), b"i42e");
    }

    #[test]
    fn encodes_negative_integer() {
        assert_eq!(encode(&BencodeValue::Int(-42)), b"i-42e");
    }

    #[test]
    fn encodes_bytes() {
        assert_eq!(encode(&BencodeValue::Str(b"spam".to_vec())), b"4:spam");
    }

    #[test]
    fn encodes_list() {
        let value = ben_list!(ben_bytes!(b"spam"), ben_int!(42));
        assert_eq!(encode(&value), b"l4:spami42ee");
    }

    #[test]
    fn encodes_dict_keys_in_ascending_order_regardless_of_insertion_order() {
        let value = ben_map! {
            b"zzz" => ben_int!(1),
            b"aaa" => ben_int!(2),
        };
        assert_eq!(encode(&value), b"d3:aaai2e3:zzzi1ee");
    }

    #[test]
    fn round_trips_arbitrary_nested_values() {
        let original = b"d8:announce20:udp://tracker.com:804:infod6:lengthi1024e4:name4:test12:piece lengthi16384eee";
        let decoded = decode(original).unwrap();
        assert_eq!(encode(&decoded), original);
    }
}
